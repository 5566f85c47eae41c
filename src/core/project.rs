// src/core/project.rs

use crate::constants::CMAKE_BUILD_DIRNAME;
use crate::core::error::{ConfigureError, ConfigureResult};
use crate::models::ProjectConfig;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// The identity of the project being configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectIdentity {
    pub name: String,
    /// Name of the arch variable, e.g. `LEGATE_ARCH`.
    pub arch_name: String,
    /// Name of the project directory variable, e.g. `LEGATE_DIR`.
    pub dir_name: String,
    pub project_dir: PathBuf,
    pub src_dir: PathBuf,
    /// Absolute path of the configuration file template.
    pub template: PathBuf,
}

impl ProjectIdentity {
    pub fn new(
        name: impl Into<String>,
        arch_name: impl Into<String>,
        dir_name: impl Into<String>,
        project_dir: impl Into<PathBuf>,
        template: impl Into<PathBuf>,
    ) -> Self {
        let project_dir = project_dir.into();
        Self {
            name: name.into(),
            arch_name: arch_name.into(),
            dir_name: dir_name.into(),
            src_dir: project_dir.clone(),
            project_dir,
            template: template.into(),
        }
    }

    /// Checks the naming rules for the arch variable.
    pub fn validate(&self) -> ConfigureResult<()> {
        let invalid = |reason: &str| ConfigureError::declaration(&self.arch_name, reason);
        if self.name.trim().is_empty() {
            return Err(ConfigureError::declaration(&self.name, "project name must not be empty"));
        }
        if self.arch_name != self.arch_name.to_uppercase() {
            return Err(invalid("arch name must be upper case"));
        }
        if !self.arch_name.ends_with("ARCH") {
            return Err(invalid("arch name must end with 'ARCH'"));
        }
        if self.arch_name.starts_with('-') || self.arch_name.ends_with('_') {
            return Err(invalid("arch name must not start with '-' or end with '_'"));
        }
        if self.dir_name.is_empty() {
            return Err(ConfigureError::declaration(&self.name, "project dir name must not be empty"));
        }
        Ok(())
    }

    pub fn name_upper(&self) -> String {
        self.name.to_uppercase()
    }

    /// The `--<ARCH_NAME>` flag, kept in the variable's original case.
    pub fn arch_flag(&self) -> String {
        format!("--{}", self.arch_name)
    }

    pub fn arch_dir(&self, arch: &str) -> PathBuf {
        self.project_dir.join(arch)
    }

    pub fn cmake_dir(&self, arch: &str) -> PathBuf {
        self.arch_dir(arch).join(CMAKE_BUILD_DIRNAME)
    }
}

/// Where the project arch value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueProvenance {
    CommandLine,
    Environment,
    Generated,
}

impl fmt::Display for ValueProvenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::CommandLine => "command line",
            Self::Environment => "environment",
            Self::Generated => "generated",
        };
        f.write_str(text)
    }
}

/// The resolved project arch together with its provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchValue {
    pub value: String,
    pub provenance: ValueProvenance,
}

fn resolve_path(base: &Path, raw: &Path) -> ConfigureResult<PathBuf> {
    let text = raw.to_string_lossy();
    let expanded = shellexpand::full(&text).map_err(|e| ConfigureError::ProjectFile {
        path: raw.to_path_buf(),
        reason: e.to_string(),
    })?;
    let path = Path::new(expanded.as_ref());
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };
    Ok(dunce::simplified(&std::path::absolute(joined)?).to_path_buf())
}

/// Loads and validates a `forgeconf.toml` project file.
///
/// Relative paths in the file are resolved against the file's directory.
pub fn load_project_file(path: &Path) -> ConfigureResult<ProjectIdentity> {
    log::debug!("Loading project file {}", path.display());
    let content = fs::read_to_string(path)?;
    let config: ProjectConfig = toml::from_str(&content).map_err(|e| ConfigureError::TomlParse {
        path: path.to_path_buf(),
        source: e,
    })?;

    let file_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let project_dir = match &config.dir {
        Some(dir) => resolve_path(file_dir, dir)?,
        None => resolve_path(file_dir, Path::new("."))?,
    };
    let src_dir = match &config.src_dir {
        Some(dir) => resolve_path(&project_dir, dir)?,
        None => project_dir.clone(),
    };
    let template = resolve_path(&project_dir, &config.template)?;

    let identity = ProjectIdentity {
        name: config.name,
        arch_name: config.arch_name,
        dir_name: config.dir_name,
        project_dir,
        src_dir,
        template,
    };
    identity.validate().map_err(|e| ConfigureError::ProjectFile {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    Ok(identity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn identity(arch_name: &str) -> ProjectIdentity {
        ProjectIdentity::new("Demo", arch_name, "DEMO_DIR", "/tmp/demo", "/tmp/demo/cfg.in")
    }

    #[test]
    fn test_arch_name_rules() {
        assert!(identity("DEMO_ARCH").validate().is_ok());
        assert!(identity("demo_arch").validate().is_err());
        assert!(identity("DEMO_NAME").validate().is_err());
        assert!(identity("-DEMO_ARCH").validate().is_err());
    }

    #[test]
    fn test_derived_paths() {
        let id = identity("DEMO_ARCH");
        assert_eq!(id.name_upper(), "DEMO");
        assert_eq!(id.arch_flag(), "--DEMO_ARCH");
        assert_eq!(id.arch_dir("arch-linux"), PathBuf::from("/tmp/demo/arch-linux"));
        assert_eq!(
            id.cmake_dir("arch-linux"),
            PathBuf::from("/tmp/demo/arch-linux/cmake_build")
        );
    }

    #[test]
    fn test_load_project_file_resolves_relative_paths() {
        // --- Setup ---
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("forgeconf.toml");
        fs::write(
            &file,
            r#"
name = "Demo"
arch_name = "DEMO_ARCH"
dir_name = "DEMO_DIR"
template = "config/demo.json.in"
src_dir = "src"
"#,
        )
        .unwrap();

        // --- Execute ---
        let id = load_project_file(&file).unwrap();

        // --- Assert ---
        let root = dunce::simplified(&std::path::absolute(dir.path()).unwrap()).to_path_buf();
        assert_eq!(id.project_dir, root);
        assert_eq!(id.src_dir, root.join("src"));
        assert_eq!(id.template, root.join("config").join("demo.json.in"));
    }

    #[test]
    fn test_load_project_file_rejects_bad_input() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("forgeconf.toml");

        fs::write(&file, "name = ").unwrap();
        assert!(matches!(
            load_project_file(&file),
            Err(ConfigureError::TomlParse { .. })
        ));

        fs::write(
            &file,
            "name = \"Demo\"\narch_name = \"demo\"\ndir_name = \"DEMO_DIR\"\ntemplate = \"t.in\"\n",
        )
        .unwrap();
        let err = load_project_file(&file).unwrap_err();
        assert!(matches!(err, ConfigureError::ProjectFile { .. }));
        assert!(err.to_string().contains("upper case"));
    }
}
