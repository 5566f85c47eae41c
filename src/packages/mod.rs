//! # Default Packages
//!
//! The packages a `forgeconf` binary ships with. The core project package is always
//! active and owns the project-wide flags; CMake is always active; CUDA and Python
//! are optional and switched on by their primary flags.
//!
//! Argument defaults are probed from the host when a package is constructed. Every
//! constructor takes an environment lookup so tests can fake the host.

pub mod cmake;
pub mod cuda;
pub mod main_package;
pub mod python;

use crate::core::error::ConfigureResult;
use crate::core::package::PackageRegistry;
use crate::core::project::ProjectIdentity;
use std::path::PathBuf;

/// Reads one environment variable.
pub type EnvLookup<'a> = dyn Fn(&str) -> Option<String> + 'a;

/// The process environment.
pub fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// The first non-empty value among `names`.
pub(crate) fn first_env(env: &EnvLookup<'_>, names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| env(name))
        .find(|value| !value.trim().is_empty())
}

/// The first of `programs` found on the search path.
pub(crate) fn find_program(programs: &[&str]) -> Option<PathBuf> {
    programs
        .iter()
        .find_map(|program| which::which(program).ok())
}

/// Registers every default package for `project`, probing the process environment.
pub fn default_registry(project: &ProjectIdentity) -> ConfigureResult<PackageRegistry> {
    default_registry_with(project, &process_env)
}

pub fn default_registry_with(
    project: &ProjectIdentity,
    env: &EnvLookup<'_>,
) -> ConfigureResult<PackageRegistry> {
    Ok(PackageRegistry::new()
        .register(main_package::CoreProject::from_env(project, env)?)
        .register(cmake::CMake::from_env(env))
        .register(cuda::Cuda::from_env(env))
        .register(python::Python::new()))
}
