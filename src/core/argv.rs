// src/core/argv.rs

use crate::core::error::{ConfigureError, ConfigureResult};
use std::collections::BTreeSet;

/// The token separating configure arguments from the tail forwarded to CMake.
pub const ARGV_SEPARATOR: &str = "--";

/// The flag part of a token, `--foo=x` -> `--foo`.
pub(crate) fn flag_name(token: &str) -> &str {
    token.split('=').next().unwrap_or(token)
}

/// A dash-leading token whose name part holds whitespace (`"-O2 -g"`) is a value.
fn is_flag(token: &str) -> bool {
    token.starts_with('-') && !flag_name(token).contains(char::is_whitespace)
}

/// Splits `argv` at the first `--` into the configure arguments and the CMake tail.
///
/// Every separator token (compared after trimming whitespace) is dropped, so
/// `a -- b -- c` yields `([a], [b, c])`.
pub fn partition_argv(argv: &[String]) -> (Vec<String>, Vec<String>) {
    let mut main_argv = Vec::new();
    let mut rest_argv = Vec::new();
    let mut found_sep = false;

    for arg in argv {
        if arg.trim() == ARGV_SEPARATOR {
            found_sep = true;
            continue;
        }
        if found_sep {
            rest_argv.push(arg.clone());
        } else {
            main_argv.push(arg.clone());
        }
    }

    (main_argv, rest_argv)
}

/// Removes every occurrence of the flags in `remove` from `argv`.
///
/// A matching flag (`--foo` or `--foo=x`) is removed together with every following
/// token up to the next flag, so `--foo 1 2` disappears entirely.
pub fn prune_command_line_args(
    argv: &[String],
    remove: &BTreeSet<String>,
) -> ConfigureResult<Vec<String>> {
    if let Some(bad) = remove.iter().find(|name| !is_flag(name)) {
        return Err(ConfigureError::usage(format!(
            "Argument '{}' must start with '-'",
            bad
        )));
    }
    if remove.is_empty() {
        return Ok(argv.to_vec());
    }

    let mut pruned = Vec::with_capacity(argv.len());
    let mut tokens = argv.iter().peekable();
    while let Some(arg) = tokens.next() {
        if remove.contains(flag_name(arg)) {
            while tokens.next_if(|next| !is_flag(next)).is_some() {}
            continue;
        }
        pruned.push(arg.clone());
    }
    Ok(pruned)
}

/// Keeps only the last occurrence of every flag in `argv`, together with its values.
///
/// Each flag keeps the position of its first occurrence. Leading positional tokens
/// stay first; positional tokens after a flag are treated as that flag's values.
pub fn deduplicate_command_line_args(argv: &[String]) -> Vec<String> {
    // Slot 0 collects positional tokens that precede the first flag.
    let mut slots: Vec<(Option<&str>, Vec<&String>)> = vec![(None, Vec::new())];
    let mut current = 0;

    for arg in argv {
        if is_flag(arg) {
            let name = flag_name(arg);
            current = match slots.iter().position(|(slot, _)| *slot == Some(name)) {
                Some(index) => {
                    if let Some((_, values)) = slots.get_mut(index) {
                        values.clear();
                    }
                    index
                }
                None => {
                    slots.push((Some(name), Vec::new()));
                    slots.len() - 1
                }
            };
        }
        if let Some((_, values)) = slots.get_mut(current) {
            values.push(arg);
        }
    }

    slots
        .into_iter()
        .flat_map(|(_, values)| values.into_iter().cloned())
        .collect()
}

/// Converts a command-line flag into its parser destination, e.g. `--with-cuda` -> `with_cuda`.
pub fn flag_to_dest(flag: &str) -> String {
    flag.trim_start_matches('-').to_lowercase().replace('-', "_")
}

/// Converts a parser destination back into its long flag, e.g. `with_cuda` -> `--with-cuda`.
pub fn dest_to_flag(dest: &str) -> String {
    format!("--{}", dest.replace('_', "-"))
}
