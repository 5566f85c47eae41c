// src/packages/cmake.rs

use crate::constants::{CMAKE_COMMAND_VAR_NAME, CMAKE_GENERATOR_VAR_NAME};
use crate::core::cmake_var::{CMakeVar, Value, VarKind};
use crate::core::config_arg::{ArgSpec, ArgType, ConfigArgument};
use crate::core::error::{ConfigureError, ConfigureResult};
use crate::core::package::{ConfigureContext, Package};
use crate::packages::{EnvLookup, find_program, first_env};
use crate::system::executor;
use std::path::PathBuf;

const CMAKE_COMMAND: CMakeVar = CMakeVar::new(CMAKE_COMMAND_VAR_NAME, VarKind::Executable).with_prefix("");
const CMAKE_GENERATOR: CMakeVar =
    CMakeVar::new(CMAKE_GENERATOR_VAR_NAME, VarKind::String).with_prefix("-G");

const GENERATORS: [&str; 2] = ["Ninja", "Unix Makefiles"];

/// Extracts the numeric version from `cmake --version` output.
///
/// `cmake version 3.27.4-gdfbe7aa-dirty` yields `3.27.4`.
pub fn parse_cmake_version(output: &str) -> Option<String> {
    let word = output.lines().next()?.split_whitespace().nth(2)?;
    let version = word.split('-').next()?;
    let numeric = !version.is_empty()
        && version
            .split('.')
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()));
    numeric.then(|| version.to_string())
}

fn default_generator(env: &EnvLookup<'_>) -> Option<String> {
    if let Some(generator) = first_env(env, &["CMAKE_GENERATOR"]) {
        if GENERATORS.contains(&generator.as_str()) {
            return Some(generator);
        }
        log::warn!(
            "Ignoring CMAKE_GENERATOR='{}' from the environment, expected one of {:?}",
            generator,
            GENERATORS
        );
    }
    if find_program(&["ninja"]).is_some() {
        return Some("Ninja".to_string());
    }
    if find_program(&["make", "gmake", "gnumake"]).is_some() {
        return Some("Unix Makefiles".to_string());
    }
    None
}

/// The always-active package that picks the CMake executable and generator.
#[derive(Debug)]
pub struct CMake {
    executable: ConfigArgument,
    generator: ConfigArgument,
    version: Option<String>,
    summary: Vec<(String, String)>,
}

impl CMake {
    pub fn from_env(env: &EnvLookup<'_>) -> Self {
        Self::new(find_program(&["cmake"]), default_generator(env))
    }

    /// Builds the package from already probed defaults.
    pub fn new(executable: Option<PathBuf>, generator: Option<String>) -> Self {
        let mut executable_spec = ArgSpec::new("cmake_executable", ArgType::Executable)
            .metavar("EXE")
            .help("Path to CMake executable (if not on PATH).")
            .default_opt(executable.map(Value::Path));
        if executable_spec.default.is_none() {
            executable_spec = executable_spec.required();
        }

        let mut generator_spec = ArgSpec::new("cmake_generator", ArgType::String)
            .choices(GENERATORS)
            .help("The CMake build generator")
            .default_opt(generator.map(Value::Str));
        if generator_spec.default.is_none() {
            generator_spec = generator_spec.required();
        }

        Self {
            executable: ConfigArgument::new("--cmake-executable", executable_spec)
                .cmake_var(CMAKE_COMMAND),
            generator: ConfigArgument::new("--cmake-generator", generator_spec)
                .cmake_var(CMAKE_GENERATOR),
            version: None,
            summary: Vec::new(),
        }
    }

    fn probe_version(&self, ctx: &ConfigureContext<'_>) -> ConfigureResult<String> {
        let Some(Value::Path(cmake)) = ctx.variable(CMAKE_COMMAND.name) else {
            return Err(ConfigureError::package(
                "CMake",
                "no CMake executable, pass --cmake-executable",
            ));
        };
        let output = executor::run_and_capture(cmake, &["--version"], &ctx.project().project_dir)?;
        parse_cmake_version(&output.stdout).ok_or_else(|| {
            ConfigureError::package(
                "CMake",
                format!(
                    "unknown CMake version in {:?}, expected a dot-separated numeric version",
                    output.stdout.lines().next().unwrap_or_default()
                ),
            )
        })
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }
}

impl Package for CMake {
    fn name(&self) -> &str {
        "CMake"
    }

    fn arguments(&self) -> Vec<ConfigArgument> {
        vec![self.executable.clone(), self.generator.clone()]
    }

    fn configure(&mut self, ctx: &mut ConfigureContext<'_>) -> ConfigureResult<()> {
        ctx.set_variable_if_set(&self.executable)?;
        ctx.set_variable_if_set(&self.generator)?;

        let version = self.probe_version(ctx)?;
        log::info!("CMake executable version: {}", version);
        ctx.add_substitution("CMAKE_VERSION", version.clone());

        let text = |name: &str| ctx.variable(name).map(Value::to_string).unwrap_or_default();
        self.summary = vec![
            ("Executable".to_string(), text(CMAKE_COMMAND.name)),
            ("Version".to_string(), version.clone()),
            ("Generator".to_string(), text(CMAKE_GENERATOR.name)),
        ];
        self.version = Some(version);
        Ok(())
    }

    fn summarize(&self) -> Vec<(String, String)> {
        self.summary.clone()
    }
}
