// src/core/error.rs

use crate::core::cmake_var::VarKind;
use crate::system::executor::ExecutionError;
use std::path::PathBuf;
use thiserror::Error;

/// Every failure a configuration run can produce.
#[derive(Error, Debug)]
pub enum ConfigureError {
    /// A package declared a malformed argument or group. This is a bug in the package.
    #[error("Invalid declaration for '{name}': {reason}")]
    ArgumentDeclaration { name: String, reason: String },

    /// An exclusive group was declared with too few members.
    #[error("Must supply at least 2 arguments to exclusive group '{group}', got {count}")]
    Length { group: String, count: usize },

    /// Bad user input on the command line.
    #[error("{message}")]
    CliUsage {
        message: String,
        #[source]
        source: Option<clap::Error>,
    },

    /// An executable-kind variable could not be resolved on the search path.
    #[error("Executable '{program}' for variable '{var}' could not be found")]
    ExecutableNotFound { var: String, program: String },

    /// A value is incompatible with the kind of the variable it was assigned to.
    #[error("Cannot use {value:?} for {kind} variable '{var}': {reason}")]
    TypeMismatch {
        var: String,
        kind: VarKind,
        value: String,
        reason: String,
    },

    /// A package failed its own discovery or validation.
    #[error("Package '{package}' failed to configure: {message}")]
    PackageConfiguration { package: String, message: String },

    /// Two writes targeted the same build variable.
    #[error("Build variable '{name}' was set by package '{first}' and again by package '{second}'")]
    VariableCollision {
        name: String,
        first: String,
        second: String,
    },

    /// The configuration file template is missing or is not a regular file.
    #[error("Configuration template '{}' does not exist or is not a regular file", path.display())]
    TemplateNotFound { path: PathBuf },

    /// The user asked for a configuration that cannot be produced as-is.
    #[error("Configuration is not satisfiable: {0}")]
    Unsatisfiable(String),

    /// A manager phase was invoked before the phases it depends on.
    #[error("{0}")]
    WrongOrder(String),

    #[error("Failed to parse TOML file at '{}': {source}", path.display())]
    TomlParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid project file '{}': {reason}", path.display())]
    ProjectFile { path: PathBuf, reason: String },

    #[error("Filesystem Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON Error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

impl ConfigureError {
    /// Builds a usage error that did not originate in the argument parser.
    pub fn usage(message: impl Into<String>) -> Self {
        Self::CliUsage {
            message: message.into(),
            source: None,
        }
    }

    /// Builds a package configuration error.
    pub fn package(package: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PackageConfiguration {
            package: package.into(),
            message: message.into(),
        }
    }

    /// Builds an argument declaration error.
    pub fn declaration(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ArgumentDeclaration {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

impl From<clap::Error> for ConfigureError {
    fn from(err: clap::Error) -> Self {
        Self::CliUsage {
            message: err.to_string().trim_end().to_string(),
            source: Some(err),
        }
    }
}

/// Result alias used across the library.
pub type ConfigureResult<T> = Result<T, ConfigureError>;
