//! # Configuration Arguments
//!
//! A [`ConfigArgument`] is a command-line flag declared by a package. It couples the
//! parser-level description of the flag ([`ArgSpec`]) with the CMake variable it feeds,
//! and with the flags that steer package activation and reconfigure persistence.
//!
//! Arguments are registered on a shared clap [`Command`] built at run time. Every
//! argument parses into a [`Value`], so the manager can treat all flags uniformly.

use crate::core::cmake_var::{CMakeVar, Value, VarKind};
use crate::core::error::{ConfigureError, ConfigureResult};
use clap::{Arg, ArgAction, ArgGroup, Command};
use std::fmt;
use std::path::PathBuf;

/// How the raw command-line text of an argument is converted into a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgType {
    /// `--flag` alone or `--flag=<yes|no|1|0|...>`.
    Bool,
    Int,
    String,
    Path,
    /// A single string split shell-style into a list (`"-O2 -g"` -> `["-O2", "-g"]`).
    /// The value may start with `-`.
    List,
    /// A program name or path; resolved when bound to a variable.
    Executable,
}

impl fmt::Display for ArgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::String => "str",
            Self::Path => "path",
            Self::List => "list",
            Self::Executable => "executable",
        };
        f.write_str(name)
    }
}

/// Number of values an argument accepts per occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nargs {
    /// Zero or one value; a bare flag takes the argument's `const_value`.
    Optional,
    /// Any number of values, including none.
    ZeroOrMore,
    /// At least one value.
    OneOrMore,
    Exactly(usize),
}

/// Parser-level description of a flag. `None` fields mean "not provided".
#[derive(Debug, Clone, PartialEq)]
pub struct ArgSpec {
    /// Parser id and namespace key, e.g. `with_cuda`.
    pub dest: String,
    pub arg_type: ArgType,
    /// Used when the flag is absent. Not "set on the command line".
    pub default: Option<Value>,
    pub nargs: Option<Nargs>,
    /// Value of a bare flag that accepts an optional value.
    pub const_value: Option<String>,
    pub help: String,
    /// Placeholder shown in `--help`.
    pub metavar: Option<String>,
    /// Accepted raw values; empty means anything goes.
    pub choices: Vec<String>,
    pub required: bool,
}

impl ArgSpec {
    pub fn new(dest: impl Into<String>, arg_type: ArgType) -> Self {
        Self {
            dest: dest.into(),
            arg_type,
            default: None,
            nargs: None,
            const_value: None,
            help: String::new(),
            metavar: None,
            choices: Vec::new(),
            required: false,
        }
    }

    pub fn help(mut self, help: impl Into<String>) -> Self {
        self.help = help.into();
        self
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Sets the default only when one is available, e.g. from an environment probe.
    pub fn default_opt(mut self, value: Option<Value>) -> Self {
        self.default = value;
        self
    }

    pub fn nargs(mut self, nargs: Nargs) -> Self {
        self.nargs = Some(nargs);
        self
    }

    pub fn const_value(mut self, value: impl Into<String>) -> Self {
        self.const_value = Some(value.into());
        self
    }

    pub fn metavar(mut self, metavar: impl Into<String>) -> Self {
        self.metavar = Some(metavar.into());
        self
    }

    pub fn choices<I, S>(mut self, choices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.choices = choices.into_iter().map(Into::into).collect();
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Parses the textual boolean forms accepted on the command line.
pub fn parse_bool_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "yes" | "true" | "t" | "y" | "1" | "on" => Some(true),
        "no" | "false" | "f" | "n" | "0" | "off" | "" => Some(false),
        _ => None,
    }
}

/// Converts one raw command-line value according to `arg_type`, checking `choices` first.
pub fn parse_value(arg_type: ArgType, choices: &[String], raw: &str) -> Result<Value, String> {
    if !choices.is_empty() && !choices.iter().any(|choice| choice == raw) {
        return Err(format!(
            "invalid choice: '{}' (choose from {})",
            raw,
            quoted_list(choices)
        ));
    }

    match arg_type {
        ArgType::Bool => parse_bool_flag(raw)
            .map(Value::Bool)
            .ok_or_else(|| format!("Boolean value expected, got '{}'", raw)),
        ArgType::Int => raw
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|e| format!("invalid integer '{}': {}", raw, e)),
        ArgType::String | ArgType::Executable => Ok(Value::Str(raw.to_string())),
        ArgType::Path => Ok(Value::Path(PathBuf::from(raw))),
        ArgType::List => shlex::split(raw)
            .map(Value::List)
            .ok_or_else(|| format!("could not split '{}' into a list", raw)),
    }
}

fn quoted_list(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("'{}'", item))
        .collect::<Vec<_>>()
        .join(", ")
}

/// A command-line flag declared by a package.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigArgument {
    /// The flag as typed by the user, e.g. `--with-cuda`.
    pub name: String,
    pub spec: ArgSpec,
    pub cmake_var: Option<CMakeVar>,
    /// Never persisted into reconfigure scripts (e.g. `--with-clean`).
    pub ephemeral: bool,
    /// A truthy value supplied by the user enables the owning package.
    pub enables_package: bool,
    /// The final word on enabling or disabling the owning package.
    pub primary: bool,
}

impl ConfigArgument {
    pub fn new(name: impl Into<String>, spec: ArgSpec) -> Self {
        Self {
            name: name.into(),
            spec,
            cmake_var: None,
            ephemeral: false,
            enables_package: false,
            primary: false,
        }
    }

    pub fn cmake_var(mut self, var: CMakeVar) -> Self {
        self.cmake_var = Some(var);
        self
    }

    pub fn ephemeral(mut self) -> Self {
        self.ephemeral = true;
        self
    }

    pub fn enables_package(mut self) -> Self {
        self.enables_package = true;
        self
    }

    /// Marks this as the package's primary switch, which also makes it an enabler.
    pub fn primary(mut self) -> Self {
        self.primary = true;
        self.enables_package = true;
        self
    }

    pub fn dest(&self) -> &str {
        &self.spec.dest
    }

    /// The flag without its leading dashes, as registered on the parser.
    pub fn flag(&self) -> &str {
        self.name.trim_start_matches('-')
    }

    /// Checks the declaration invariants. A failure is a bug in the declaring package.
    pub fn validate(&self) -> ConfigureResult<()> {
        if !self.name.starts_with('-') || self.flag().is_empty() {
            return Err(ConfigureError::declaration(
                &self.name,
                "argument names must start with '-' and name a flag",
            ));
        }
        let dest = self.dest();
        if dest.is_empty() || !dest.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(ConfigureError::declaration(
                &self.name,
                format!("invalid destination '{}'", dest),
            ));
        }
        if self.primary && !self.enables_package {
            return Err(ConfigureError::declaration(
                &self.name,
                "a primary argument must also enable its package",
            ));
        }
        if let Some(var) = &self.cmake_var
            && self.spec.arg_type == ArgType::Bool
            && var.kind != VarKind::Bool
        {
            return Err(ConfigureError::declaration(
                &self.name,
                format!("boolean argument bound to {} variable '{}'", var.kind, var.name),
            ));
        }
        if let Some(Value::Str(default)) = &self.spec.default
            && !self.spec.choices.is_empty()
            && !self.spec.choices.contains(default)
        {
            return Err(ConfigureError::declaration(
                &self.name,
                format!("default '{}' is not one of the declared choices", default),
            ));
        }
        Ok(())
    }

    fn help_text(&self) -> String {
        let spec = &self.spec;
        let mut help = spec.help.clone();
        if !spec.choices.is_empty() {
            help.push_str(&format!(" [choices: {}]", spec.choices.join(", ")));
        }
        if let Some(default) = &spec.default {
            help.push_str(&format!(" [default: {}]", default));
        }
        help.trim().to_string()
    }

    /// Builds the clap argument for this flag. Every argument parses into a [`Value`].
    pub fn to_clap_arg(&self) -> Arg {
        let spec = &self.spec;
        let flag = self.flag();
        let mut arg = Arg::new(spec.dest.clone())
            .action(ArgAction::Set)
            .help(self.help_text())
            .required(spec.required);

        let mut short = flag.chars();
        arg = match (short.next(), short.next()) {
            (Some(c), None) if !self.name.starts_with("--") => arg.short(c),
            _ => arg.long(flag.to_string()),
        };

        let arg_type = spec.arg_type;
        let choices = spec.choices.clone();
        arg = arg.value_parser(move |raw: &str| parse_value(arg_type, &choices, raw));

        if arg_type == ArgType::Bool {
            // `--flag` alone means true, `--flag=<bool>` is explicit.
            let missing = spec.const_value.clone().unwrap_or_else(|| "true".to_string());
            return arg
                .num_args(0..=1)
                .default_missing_value(missing)
                .value_name(spec.metavar.clone().unwrap_or_else(|| "bool".to_string()));
        }

        if let Some(metavar) = &spec.metavar {
            arg = arg.value_name(metavar.clone());
        }
        if arg_type == ArgType::List {
            // Compiler flags: `--CFLAGS "-O2 -g"` must not read `-O2` as a flag.
            arg = arg.allow_hyphen_values(true);
        }
        // A const value only makes sense when the flag may appear without a value.
        let nargs = match (spec.nargs, &spec.const_value) {
            (None, Some(_)) => Some(Nargs::Optional),
            (nargs, _) => nargs,
        };
        arg = match nargs {
            Some(Nargs::Optional) => arg.num_args(0..=1),
            Some(Nargs::ZeroOrMore) => arg.num_args(0..),
            Some(Nargs::OneOrMore) => arg.num_args(1..),
            Some(Nargs::Exactly(n)) => arg.num_args(n),
            None => arg,
        };
        if let Some(const_value) = &spec.const_value
            && matches!(nargs, Some(Nargs::Optional | Nargs::ZeroOrMore))
        {
            arg = arg.default_missing_value(const_value.clone());
        }
        arg
    }

    /// Registers exactly one argument on `parser`.
    pub fn add_to_parser(&self, parser: Command) -> Command {
        log::debug!("Registering argument '{}' (dest '{}')", self.name, self.dest());
        parser.arg(self.to_clap_arg())
    }
}

/// A set of arguments of which at most one may be given on the command line.
#[derive(Debug, Clone, PartialEq)]
pub struct ExclusiveArgumentGroup {
    pub name: String,
    pub required: bool,
    group: Vec<(String, ConfigArgument)>,
}

impl ExclusiveArgumentGroup {
    /// Creates a group from `(logical name, argument)` pairs. At least two members are needed.
    pub fn new<I, S>(name: impl Into<String>, required: bool, members: I) -> ConfigureResult<Self>
    where
        I: IntoIterator<Item = (S, ConfigArgument)>,
        S: Into<String>,
    {
        let name = name.into();
        let group: Vec<(String, ConfigArgument)> = members
            .into_iter()
            .map(|(key, arg)| (key.into(), arg))
            .collect();

        if group.len() < 2 {
            return Err(ConfigureError::Length {
                group: name,
                count: group.len(),
            });
        }
        for (index, (key, _)) in group.iter().enumerate() {
            if group.iter().skip(index + 1).any(|(other, _)| other == key) {
                return Err(ConfigureError::declaration(
                    &name,
                    format!("duplicate group member '{}'", key),
                ));
            }
        }

        Ok(Self {
            name,
            required,
            group,
        })
    }

    /// Looks up a member by its logical name.
    pub fn get(&self, key: &str) -> Option<&ConfigArgument> {
        self.group
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, arg)| arg)
    }

    pub fn members(&self) -> impl Iterator<Item = &ConfigArgument> {
        self.group.iter().map(|(_, arg)| arg)
    }

    /// Registers every member and a clap group rejecting more than one of them.
    pub fn add_to_parser(&self, parser: Command) -> Command {
        let parser = self
            .members()
            .fold(parser, |parser, arg| arg.add_to_parser(parser));
        let dests: Vec<String> = self.members().map(|arg| arg.dest().to_string()).collect();
        parser.group(
            ArgGroup::new(self.name.clone())
                .args(dests)
                .multiple(false)
                .required(self.required),
        )
    }
}
