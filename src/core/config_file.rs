// src/core/config_file.rs

use crate::constants::CONFIGURE_EXECUTABLE_KEY;
use crate::core::error::{ConfigureError, ConfigureResult};
use crate::core::project::ProjectIdentity;
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

lazy_static! {
    static ref PLACEHOLDER_RE: Regex =
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("Failed to compile placeholder regex");
    static ref CMAKE_CACHE_ENTRY_RE: Regex =
        Regex::new(r"^(?P<name>[A-Za-z_0-9\-]+):(?P<type>[A-Z]+)\s*=\s*(?P<value>.*)$")
            .expect("Failed to compile CMake cache regex");
}

/// The project configuration file: a `${KEY}` template rendered after configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFile {
    template: PathBuf,
    default_subst: BTreeMap<String, String>,
}

impl ConfigFile {
    /// Fails with `TemplateNotFound` unless `template` is an existing regular file.
    pub fn new(template: &Path) -> ConfigureResult<Self> {
        if !template.is_file() {
            return Err(ConfigureError::TemplateNotFound {
                path: template.to_path_buf(),
            });
        }
        let template = dunce::simplified(&std::path::absolute(template)?).to_path_buf();

        let mut default_subst = BTreeMap::new();
        let executable = std::env::current_exe()
            .map(|exe| exe.display().to_string())
            .unwrap_or_default();
        default_subst.insert(CONFIGURE_EXECUTABLE_KEY.to_string(), executable);

        Ok(Self {
            template,
            default_subst,
        })
    }

    pub fn template_file(&self) -> &Path {
        &self.template
    }

    /// The template path with its last extension removed, e.g. `foo.bar.baz.in` -> `foo.bar.baz`.
    pub fn project_variables_file(&self) -> PathBuf {
        self.template.with_extension("")
    }

    /// Substitutions that are always available, before any package contributes.
    pub fn default_substitutions(&self) -> &BTreeMap<String, String> {
        &self.default_subst
    }

    /// Adds the project identity keys to the default substitutions.
    pub fn seed_identity(&mut self, project: &ProjectIdentity, arch: &str) {
        let project_dir = project.project_dir.display().to_string();
        let entries = [
            ("PROJECT_NAME", project.name.clone()),
            ("PROJECT_NAME_UPPER", project.name_upper()),
            ("PROJECT_ARCH_NAME", project.arch_name.clone()),
            ("PROJECT_ARCH", arch.to_string()),
            ("PROJECT_DIR_NAME", project.dir_name.clone()),
            ("PROJECT_DIR", project_dir.clone()),
            (project.arch_name.as_str(), arch.to_string()),
            (project.dir_name.as_str(), project_dir),
        ];
        for (key, value) in entries {
            self.default_subst.insert(key.to_string(), value);
        }
    }

    /// Reads the template and substitutes every known placeholder.
    pub fn render_template(&self, subst: &BTreeMap<String, String>) -> ConfigureResult<String> {
        let text = fs::read_to_string(&self.template)?;
        Ok(render(&text, subst))
    }

    /// Writes `rendered` to `dest_dir` under the project variables file name.
    pub fn write(&self, dest_dir: &Path, rendered: &str) -> ConfigureResult<PathBuf> {
        let file_name = self
            .project_variables_file()
            .file_name()
            .map(PathBuf::from)
            .ok_or_else(|| ConfigureError::TemplateNotFound {
                path: self.template.clone(),
            })?;
        let dest = dest_dir.join(file_name);
        fs::write(&dest, rendered)?;
        log::info!("Wrote project file: {}", dest.display());
        Ok(dest)
    }
}

/// Replaces `${KEY}` placeholders found in `subst`. Unknown placeholders are kept verbatim.
pub fn render(text: &str, subst: &BTreeMap<String, String>) -> String {
    PLACEHOLDER_RE
        .replace_all(text, |caps: &Captures<'_>| {
            let whole = caps.get(0).map_or("", |m| m.as_str());
            caps.get(1)
                .and_then(|key| subst.get(key.as_str()))
                .cloned()
                .unwrap_or_else(|| whole.to_string())
        })
        .into_owned()
}

/// Reads every `NAME:TYPE=VALUE` entry of a `CMakeCache.txt`.
///
/// A missing cache yields an empty map.
pub fn read_cmake_cache(path: &Path) -> ConfigureResult<BTreeMap<String, String>> {
    if !path.is_file() {
        return Ok(BTreeMap::new());
    }
    let content = fs::read_to_string(path)?;
    let entries = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("//") && !line.starts_with('#'))
        .filter_map(|line| CMAKE_CACHE_ENTRY_RE.captures(line))
        .filter_map(|caps| {
            let name = caps.name("name")?.as_str().to_string();
            let value = caps.name("value")?.as_str().to_string();
            Some((name, value))
        })
        .collect();
    Ok(entries)
}
