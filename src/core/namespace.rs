// src/core/namespace.rs

use crate::core::cmake_var::Value;
use crate::core::config_arg::{ArgType, ConfigArgument, Nargs};
use clap::ArgMatches;
use clap::parser::ValueSource;
use std::collections::HashMap;

/// The resolved value of one configuration argument.
#[derive(Debug, Clone, PartialEq)]
pub struct ClArg {
    pub name: String,
    pub value: Option<Value>,
    /// True when the user typed the flag; false when the value is a default.
    pub cl_set: bool,
}

impl ClArg {
    pub fn new(name: impl Into<String>, value: Option<Value>, cl_set: bool) -> Self {
        Self {
            name: name.into(),
            value,
            cl_set,
        }
    }

    /// Whether the value is present and truthy.
    pub fn is_truthy(&self) -> bool {
        self.value.as_ref().is_some_and(Value::is_truthy)
    }
}

/// Parsed command-line values keyed by argument destination.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Namespace {
    args: HashMap<String, ClArg>,
}

impl Namespace {
    /// Resolves every argument in `arguments` from the parser output.
    ///
    /// Values the user did not type fall back to the declared default. Unset booleans
    /// without a default resolve to `false`.
    pub fn from_matches(matches: &ArgMatches, arguments: &[&ConfigArgument]) -> Self {
        let mut namespace = Self::default();
        for arg in arguments {
            let dest = arg.dest();
            let cl_set = matches.value_source(dest) == Some(ValueSource::CommandLine);
            let parsed = if cl_set { collect_values(matches, arg) } else { None };

            let value = match parsed {
                Some(value) => Some(value),
                None if cl_set => None,
                None => match (&arg.spec.default, arg.spec.arg_type) {
                    (Some(default), _) => Some(default.clone()),
                    (None, ArgType::Bool) => Some(Value::Bool(false)),
                    (None, _) => None,
                },
            };
            log::debug!("Resolved '{}' = {:?} (command line: {})", dest, value, cl_set);
            namespace.insert(ClArg::new(dest, value, cl_set));
        }
        namespace
    }

    pub fn insert(&mut self, arg: ClArg) {
        self.args.insert(arg.name.clone(), arg);
    }

    pub fn get(&self, dest: &str) -> Option<&ClArg> {
        self.args.get(dest)
    }

    pub fn value(&self, dest: &str) -> Option<&Value> {
        self.get(dest).and_then(|arg| arg.value.as_ref())
    }

    pub fn is_user_set(&self, dest: &str) -> bool {
        self.get(dest).is_some_and(|arg| arg.cl_set)
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }
}

fn collect_values(matches: &ArgMatches, arg: &ConfigArgument) -> Option<Value> {
    let values: Vec<Value> = matches
        .try_get_many::<Value>(arg.dest())
        .ok()
        .flatten()
        .map(|values| values.cloned().collect())
        .unwrap_or_default();

    let multi = matches!(
        arg.spec.nargs,
        Some(Nargs::ZeroOrMore | Nargs::OneOrMore | Nargs::Exactly(2..))
    );
    if multi {
        let items = values.iter().flat_map(Value::to_list).collect();
        return Some(Value::List(items));
    }
    values.into_iter().next_back()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config_arg::ArgSpec;
    use clap::Command;

    fn arguments() -> Vec<ConfigArgument> {
        vec![
            ConfigArgument::new("--with-foo", ArgSpec::new("with_foo", ArgType::Bool)),
            ConfigArgument::new(
                "--num-threads",
                ArgSpec::new("num_threads", ArgType::Int).default(Value::Int(4)),
            ),
            ConfigArgument::new("--prefix", ArgSpec::new("prefix", ArgType::Path)),
            ConfigArgument::new(
                "--arches",
                ArgSpec::new("arches", ArgType::String).nargs(Nargs::OneOrMore),
            ),
        ]
    }

    fn resolve(argv: &[&str]) -> Namespace {
        let args = arguments();
        let cmd = args.iter().fold(
            Command::new("test").no_binary_name(true),
            |cmd, arg| arg.add_to_parser(cmd),
        );
        let matches = cmd.try_get_matches_from(argv).unwrap();
        let refs: Vec<&ConfigArgument> = args.iter().collect();
        Namespace::from_matches(&matches, &refs)
    }

    #[test]
    fn test_defaults_are_not_user_set() {
        let ns = resolve(&[]);

        assert_eq!(ns.len(), 4);
        assert_eq!(ns.value("with_foo"), Some(&Value::Bool(false)));
        assert!(!ns.is_user_set("with_foo"));
        assert_eq!(ns.value("num_threads"), Some(&Value::Int(4)));
        assert!(!ns.is_user_set("num_threads"));
        assert_eq!(ns.value("prefix"), None);
    }

    #[test]
    fn test_command_line_values_are_user_set() {
        // --- Execute ---
        let ns = resolve(&["--with-foo", "--num-threads=8", "--arches", "70", "80"]);

        // --- Assert ---
        assert!(ns.is_user_set("with_foo"));
        assert!(ns.get("with_foo").is_some_and(ClArg::is_truthy));
        assert_eq!(ns.value("num_threads"), Some(&Value::Int(8)));
        assert_eq!(
            ns.value("arches"),
            Some(&Value::List(vec!["70".to_string(), "80".to_string()]))
        );
        assert!(!ns.is_user_set("prefix"));
    }

    #[test]
    fn test_explicit_false_is_still_user_set() {
        let ns = resolve(&["--with-foo=0"]);
        let arg = ns.get("with_foo").unwrap();
        assert!(arg.cl_set);
        assert!(!arg.is_truthy());
    }
}
