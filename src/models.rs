// src/models.rs

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

// --- PROJECT FILE ---

/// The on-disk `forgeconf.toml` describing a project's identity.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ProjectConfig {
    /// Human readable project name, e.g. "Legate".
    pub name: String,
    /// Name of the arch variable, e.g. `LEGATE_ARCH`.
    pub arch_name: String,
    /// Name of the project directory variable, e.g. `LEGATE_DIR`.
    pub dir_name: String,
    /// Configuration file template, relative to the project directory.
    pub template: PathBuf,
    /// Project root. Defaults to the directory holding the project file.
    #[serde(default)]
    pub dir: Option<PathBuf>,
    /// Source directory handed to CMake. Defaults to the project root.
    #[serde(default)]
    pub src_dir: Option<PathBuf>,
}

// --- GENERATED ARTIFACTS ---

/// The recorded CMake invocation, reused by later configure runs.
///
/// Fields are declared in alphabetical order so the serialized keys come out sorted.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CMakeCommandSpec {
    #[serde(rename = "BUILD_DIR")]
    pub build_dir: String,
    #[serde(rename = "CMAKE_COMMANDS")]
    pub cmake_commands: Vec<String>,
    #[serde(rename = "CMAKE_EXECUTABLE")]
    pub cmake_executable: String,
    #[serde(rename = "CMAKE_GENERATOR")]
    pub cmake_generator: String,
    #[serde(rename = "SOURCE_DIR")]
    pub source_dir: String,
}

/// A single exported build variable.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ExportedVariable {
    /// CMake cache type, e.g. `BOOL`.
    #[serde(rename = "type")]
    pub type_str: String,
    pub value: String,
    /// The package that wrote the variable.
    pub owner: String,
}

/// Every build variable of a run, keyed by variable name.
pub type ExportedVariables = BTreeMap<String, ExportedVariable>;
