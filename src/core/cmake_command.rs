// src/core/cmake_command.rs

use crate::constants::{CMAKE_COMMAND_VAR_NAME, CMAKE_GENERATOR_VAR_NAME};
use crate::core::cmake_var::Value;
use crate::core::error::ConfigureResult;
use crate::core::project::ProjectIdentity;
use crate::core::variables::VariableStore;
use crate::models::CMakeCommandSpec;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Everything besides the build variables that goes into the recorded CMake invocation.
#[derive(Debug, Clone, Copy)]
pub struct CommandInputs<'a> {
    pub project: &'a ProjectIdentity,
    pub arch: &'a str,
    /// The argv the configure run was started with.
    pub orig_argv: &'a [String],
    /// Extra arguments contributed by packages, e.g. `--trace`.
    pub cmake_arguments: &'a [String],
    /// The verbatim tail after `--`.
    pub extra_argv: &'a [String],
}

/// Builds the generic part of the CMake invocation, without executable, generator or dirs.
pub fn create_cmake_commands(
    inputs: &CommandInputs<'_>,
    variables: &VariableStore,
    quote: bool,
) -> ConfigureResult<Vec<String>> {
    let project = inputs.project;
    let configure_options = shlex::try_join(inputs.orig_argv.iter().map(String::as_str))
        .unwrap_or_else(|_| inputs.orig_argv.join(" "));

    let mut commands = vec!["--log-context".to_string(), "--log-level=DEBUG".to_string()];
    commands.extend(inputs.cmake_arguments.iter().cloned());
    commands.extend([
        "-DFORGECONF:BOOL=ON".to_string(),
        format!("-D{}:STRING='{}'", project.arch_name, inputs.arch),
        format!(
            "-D{}:PATH='{}'",
            project.dir_name,
            project.project_dir.display()
        ),
        format!(
            "-D{}_CONFIGURE_OPTIONS:STRING={}",
            project.name_upper(),
            configure_options
        ),
    ]);
    commands.extend(
        variables.command_line(quote, &[CMAKE_COMMAND_VAR_NAME, CMAKE_GENERATOR_VAR_NAME])?,
    );
    commands.extend(inputs.extra_argv.iter().cloned());
    Ok(commands)
}

/// Builds the command spec persisted in the CMake build directory.
pub fn build_command_spec(
    inputs: &CommandInputs<'_>,
    variables: &VariableStore,
) -> ConfigureResult<CMakeCommandSpec> {
    let project = inputs.project;
    Ok(CMakeCommandSpec {
        build_dir: project.cmake_dir(inputs.arch).display().to_string(),
        cmake_commands: create_cmake_commands(inputs, variables, true)?,
        cmake_executable: variable_text(variables, CMAKE_COMMAND_VAR_NAME)
            .unwrap_or_else(|| "cmake".to_string()),
        cmake_generator: variable_text(variables, CMAKE_GENERATOR_VAR_NAME).unwrap_or_default(),
        source_dir: project.src_dir.display().to_string(),
    })
}

/// The full argv for running CMake directly, for logging and the summary.
pub fn full_command_line(spec: &CMakeCommandSpec) -> Vec<String> {
    let mut argv = vec![
        spec.cmake_executable.clone(),
        "-S".to_string(),
        spec.source_dir.clone(),
        "-B".to_string(),
        spec.build_dir.clone(),
    ];
    if !spec.cmake_generator.is_empty() {
        argv.push(format!("-G{}", spec.cmake_generator));
    }
    argv.extend(spec.cmake_commands.iter().cloned());
    argv
}

fn merge_unique(old: Vec<String>, new: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    old.into_iter()
        .chain(new)
        .filter(|command| seen.insert(command.clone()))
        .collect()
}

/// Writes `spec` to `path`, merging with the commands of an existing spec file.
///
/// Commands are de-duplicated in first-seen order, so `--foo=1 --foo=2` both survive.
pub fn write_command_spec(
    mut spec: CMakeCommandSpec,
    path: &Path,
) -> ConfigureResult<CMakeCommandSpec> {
    if path.is_file() {
        log::debug!("Command file {} already exists, merging", path.display());
        let old: CMakeCommandSpec = serde_json::from_str(&fs::read_to_string(path)?)?;
        spec.cmake_commands = merge_unique(old.cmake_commands, spec.cmake_commands);
    }
    log::info!("Saving configure command to {}", path.display());
    fs::write(path, serde_json::to_string_pretty(&spec)?)?;
    Ok(spec)
}

/// The rendered value of a variable, if it was set to something.
pub fn variable_text(variables: &VariableStore, name: &str) -> Option<String> {
    let assignment = variables.get(name)?;
    let value: &Value = assignment.value.as_ref()?;
    assignment.var.render(value).ok()
}
