// src/packages/python.rs

use crate::core::cmake_var::{CMakeVar, Value, VarKind};
use crate::core::config_arg::{ArgSpec, ArgType, ConfigArgument};
use crate::core::error::{ConfigureError, ConfigureResult};
use crate::core::package::{ConfigureContext, Package};
use crate::system::executor;
use std::path::PathBuf;

const PYTHON3_EXECUTABLE: CMakeVar = CMakeVar::new("Python3_EXECUTABLE", VarKind::Executable);

/// Extracts `3.11.4` from `Python 3.11.4`.
pub fn parse_python_version(output: &str) -> Option<String> {
    let version = output.trim().strip_prefix("Python")?.trim();
    let numeric = version
        .split('.')
        .next()
        .is_some_and(|major| !major.is_empty() && major.chars().all(|c| c.is_ascii_digit()));
    numeric.then(|| version.to_string())
}

#[derive(Debug)]
pub struct Python {
    with_python: ConfigArgument,
    /// Interpreters tried in order, by name or path.
    candidates: Vec<String>,
    executable: Option<PathBuf>,
    version: Option<String>,
}

impl Default for Python {
    fn default() -> Self {
        Self::new()
    }
}

impl Python {
    pub fn new() -> Self {
        Self::with_candidates(["python3", "python"])
    }

    pub fn with_candidates<I, S>(candidates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            with_python: ConfigArgument::new(
                "--with-python",
                ArgSpec::new("with_python", ArgType::Bool).help("Build with Python bindings."),
            )
            .primary(),
            candidates: candidates.into_iter().map(Into::into).collect(),
            executable: None,
            version: None,
        }
    }

    fn locate(&self, ctx: &ConfigureContext<'_>) -> Result<(PathBuf, String), String> {
        let cwd = &ctx.project().project_dir;
        for candidate in &self.candidates {
            let Ok(path) = which::which(candidate) else {
                log::debug!("Python interpreter '{}' not found", candidate);
                continue;
            };
            match executor::run_and_capture(&path, &["--version"], cwd) {
                Ok(output) => {
                    let text = if output.stdout.trim().is_empty() {
                        output.stderr
                    } else {
                        output.stdout
                    };
                    if let Some(version) = parse_python_version(&text) {
                        return Ok((path, version));
                    }
                    log::debug!("Could not parse Python version from {:?}", text.trim());
                }
                Err(e) => log::debug!("Probing {} failed: {}", path.display(), e),
            }
        }
        Err(format!(
            "Could not locate a Python interpreter (tried {})",
            self.candidates.join(", ")
        ))
    }
}

impl Package for Python {
    fn name(&self) -> &str {
        "Python"
    }

    fn arguments(&self) -> Vec<ConfigArgument> {
        vec![self.with_python.clone()]
    }

    fn configure(&mut self, ctx: &mut ConfigureContext<'_>) -> ConfigureResult<()> {
        let (path, version) = match self.locate(ctx) {
            Ok(found) => found,
            Err(reason) if ctx.is_user_set(&self.with_python) => {
                return Err(ConfigureError::package(
                    "Python",
                    format!(
                        "{}. You have explicitly requested Python via {}",
                        reason, self.with_python.name
                    ),
                ));
            }
            Err(reason) => {
                return Err(ConfigureError::package(
                    "Python",
                    format!("{}. Another package enabled Python implicitly", reason),
                ));
            }
        };
        log::info!("Python: found version {} at {}", version, path.display());

        ctx.set_variable(PYTHON3_EXECUTABLE, path.as_path())?;
        self.executable = Some(path);
        self.version = Some(version);
        Ok(())
    }

    fn summarize(&self) -> Vec<(String, String)> {
        let executable = self
            .executable
            .as_ref()
            .map(|path| path.display().to_string())
            .unwrap_or_default();
        vec![
            ("Executable".to_string(), executable),
            ("Version".to_string(), self.version.clone().unwrap_or_default()),
        ]
    }
}
