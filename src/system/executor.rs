// src/system/executor.rs

use std::path::Path;
use std::process::{Command as StdCommand, Stdio};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Command could not be parsed: {0}")]
    CommandParse(String),
    #[error("No command specified to run.")]
    EmptyCommand,
    #[error("Command '{0}' could not be executed: {1}")]
    CommandFailed(String, std::io::Error),
    #[error("Command '{command}' exited with code {code:?}: {stderr}")]
    NonZeroExitStatus {
        command: String,
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },
    #[error("Command '{command}' produced output that was not valid UTF-8")]
    InvalidUtf8Output {
        command: String,
        #[source]
        source: std::string::FromUtf8Error,
    },
}

/// Captured output of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Parses `command_line` with shell quoting rules, runs it in `cwd` and captures its output.
///
/// Used for short probes (git, compiler versions) whose output feeds the configure log.
pub fn execute_and_capture_output(
    command_line: &str,
    cwd: &Path,
) -> Result<CommandOutput, ExecutionError> {
    let trimmed_command = command_line.trim();
    let parts = shlex::split(trimmed_command)
        .ok_or_else(|| ExecutionError::CommandParse(trimmed_command.to_string()))?;
    let Some((program, args)) = parts.split_first() else {
        return Err(ExecutionError::EmptyCommand);
    };
    run_and_capture(Path::new(program), args, cwd)
}

/// Runs `program` with `args` in `cwd`, capturing stdout and stderr.
///
/// A non-zero exit status is an error that carries both streams.
pub fn run_and_capture<S: AsRef<str>>(
    program: &Path,
    args: &[S],
    cwd: &Path,
) -> Result<CommandOutput, ExecutionError> {
    let display = std::iter::once(program.display().to_string())
        .chain(args.iter().map(|a| a.as_ref().to_string()))
        .collect::<Vec<_>>()
        .join(" ");
    log::debug!("Running '{}' in {}", display, cwd.display());

    let output = StdCommand::new(program)
        .args(args.iter().map(AsRef::as_ref))
        .current_dir(dunce::simplified(cwd))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| ExecutionError::CommandFailed(display.clone(), e))?;

    let stdout = String::from_utf8(output.stdout).map_err(|e| ExecutionError::InvalidUtf8Output {
        command: display.clone(),
        source: e,
    })?;
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    if !output.status.success() {
        return Err(ExecutionError::NonZeroExitStatus {
            command: display,
            code: output.status.code(),
            stdout,
            stderr,
        });
    }

    Ok(CommandOutput { stdout, stderr })
}
