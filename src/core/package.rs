//! # Packages
//!
//! A [`Package`] is a pluggable unit of configuration: it declares command-line
//! arguments, decides whether it is enabled, and writes build variables when it is
//! configured. Packages never talk to each other directly. Everything they read or
//! write goes through the [`ConfigureContext`] handed out by the manager.

use crate::core::cmake_var::{CMakeVar, Value};
use crate::core::config_arg::{ConfigArgument, ExclusiveArgumentGroup};
use crate::core::error::{ConfigureError, ConfigureResult};
use crate::core::namespace::{ClArg, Namespace};
use crate::core::project::{ArchValue, ProjectIdentity};
use crate::core::variables::VariableStore;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Lifecycle of a package within one configure run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageState {
    Unconfigured,
    Active,
    Inactive,
    Configured,
    Summarized,
}

/// Outcome of a package's activation predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnableState {
    pub value: bool,
    /// True when the decision came from a flag the user typed.
    pub explicit: bool,
}

impl EnableState {
    pub fn explicitly_disabled(&self) -> bool {
        self.explicit && !self.value
    }
}

pub trait Package: fmt::Debug {
    /// Unique display name, e.g. `CUDA`.
    fn name(&self) -> &str;

    /// Every argument this package declares, outside of exclusive groups.
    fn arguments(&self) -> Vec<ConfigArgument>;

    fn exclusive_groups(&self) -> Vec<ExclusiveArgumentGroup> {
        Vec::new()
    }

    /// Names of packages that must be active whenever this one is.
    fn dependencies(&self) -> Vec<&'static str> {
        Vec::new()
    }

    /// Arguments plus the members of every exclusive group.
    fn all_arguments(&self) -> Vec<ConfigArgument> {
        let mut arguments = self.arguments();
        for group in self.exclusive_groups() {
            arguments.extend(group.members().cloned());
        }
        arguments
    }

    /// Decides whether the package is enabled. `None` means it is always active.
    ///
    /// A primary flag typed by the user decides outright. Otherwise any other enabling
    /// flag typed with a truthy value turns the package on. Otherwise the primary
    /// flag's default applies.
    fn enable_state(&self, namespace: &Namespace) -> Option<EnableState> {
        let arguments = self.all_arguments();
        let enablers: Vec<&ConfigArgument> =
            arguments.iter().filter(|arg| arg.enables_package).collect();
        if enablers.is_empty() {
            return None;
        }

        let truthy = |arg: &ConfigArgument| namespace.get(arg.dest()).is_some_and(ClArg::is_truthy);
        let primary = enablers.iter().copied().find(|arg| arg.primary);

        if let Some(primary) = primary
            && namespace.is_user_set(primary.dest())
        {
            return Some(EnableState {
                value: truthy(primary),
                explicit: true,
            });
        }
        if enablers
            .iter()
            .any(|arg| !arg.primary && namespace.is_user_set(arg.dest()) && truthy(*arg))
        {
            return Some(EnableState {
                value: true,
                explicit: true,
            });
        }
        Some(EnableState {
            value: primary.is_some_and(truthy),
            explicit: false,
        })
    }

    /// Probes the environment and writes build variables. Only called for active packages.
    fn configure(&mut self, ctx: &mut ConfigureContext<'_>) -> ConfigureResult<()>;

    /// Ordered `(label, value)` pairs describing the configured state. Must not probe.
    fn summarize(&self) -> Vec<(String, String)>;
}

/// The ordered set of packages a manager runs.
#[derive(Debug, Default)]
pub struct PackageRegistry {
    packages: Vec<Box<dyn Package>>,
}

impl PackageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, package: impl Package + 'static) -> Self {
        self.add(Box::new(package));
        self
    }

    pub fn add(&mut self, package: Box<dyn Package>) {
        log::debug!("Registered package '{}'", package.name());
        self.packages.push(package);
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.packages.iter().map(|p| p.name()).collect()
    }

    pub fn into_packages(self) -> Vec<Box<dyn Package>> {
        self.packages
    }
}

/// Everything a package may touch while it is being configured.
#[derive(Debug)]
pub struct ConfigureContext<'a> {
    package: &'a str,
    project: &'a ProjectIdentity,
    namespace: &'a Namespace,
    active: &'a BTreeSet<String>,
    variables: &'a mut VariableStore,
    substitutions: &'a mut BTreeMap<String, String>,
    cmake_arguments: &'a mut Vec<String>,
    arch: &'a mut Option<ArchValue>,
}

impl<'a> ConfigureContext<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        package: &'a str,
        project: &'a ProjectIdentity,
        namespace: &'a Namespace,
        active: &'a BTreeSet<String>,
        variables: &'a mut VariableStore,
        substitutions: &'a mut BTreeMap<String, String>,
        cmake_arguments: &'a mut Vec<String>,
        arch: &'a mut Option<ArchValue>,
    ) -> Self {
        Self {
            package,
            project,
            namespace,
            active,
            variables,
            substitutions,
            cmake_arguments,
            arch,
        }
    }

    pub fn package_name(&self) -> &str {
        self.package
    }

    pub fn project(&self) -> &ProjectIdentity {
        self.project
    }

    /// The resolved command-line argument behind `arg`.
    pub fn cl_arg(&self, arg: &ConfigArgument) -> ConfigureResult<&ClArg> {
        self.namespace.get(arg.dest()).ok_or_else(|| {
            ConfigureError::package(
                self.package,
                format!("argument '{}' was never registered", arg.name),
            )
        })
    }

    pub fn value(&self, arg: &ConfigArgument) -> Option<&Value> {
        self.namespace.value(arg.dest())
    }

    pub fn is_user_set(&self, arg: &ConfigArgument) -> bool {
        self.namespace.is_user_set(arg.dest())
    }

    /// A build variable written by this or an earlier package.
    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.value(name)
    }

    pub fn is_active(&self, package: &str) -> bool {
        self.active.contains(package)
    }

    pub fn set_variable(&mut self, var: CMakeVar, value: impl Into<Value>) -> ConfigureResult<()> {
        self.variables.set(self.package, var, &value.into())
    }

    /// Writes the argument's bound variable when the argument has a value.
    pub fn set_variable_if_set(&mut self, arg: &ConfigArgument) -> ConfigureResult<bool> {
        let Some(var) = arg.cmake_var else {
            return Err(ConfigureError::package(
                self.package,
                format!("argument '{}' is not bound to a build variable", arg.name),
            ));
        };
        match self.namespace.value(arg.dest()).cloned() {
            Some(value) => self.set_variable(var, value).map(|()| true),
            None => Ok(false),
        }
    }

    /// Writes the argument's bound variable only when the user typed the flag.
    pub fn set_variable_if_user_set(&mut self, arg: &ConfigArgument) -> ConfigureResult<bool> {
        if !self.is_user_set(arg) {
            return Ok(false);
        }
        self.set_variable_if_set(arg)
    }

    pub fn append_variable(&mut self, var: CMakeVar, items: &[String]) -> ConfigureResult<()> {
        self.variables.append(self.package, var, items)
    }

    /// Publishes the project arch value. Only one package may do so.
    pub fn set_project_arch(&mut self, arch: ArchValue) -> ConfigureResult<()> {
        if arch.value.trim().is_empty() {
            return Err(ConfigureError::package(
                self.package,
                format!("{} must not be empty", self.project.arch_name),
            ));
        }
        if let Some(existing) = self.arch.as_ref() {
            return Err(ConfigureError::package(
                self.package,
                format!("project arch was already set to '{}'", existing.value),
            ));
        }
        log::info!(
            "Using {}='{}' ({})",
            self.project.arch_name,
            arch.value,
            arch.provenance
        );
        *self.arch = Some(arch);
        Ok(())
    }

    pub fn project_arch(&self) -> Option<&ArchValue> {
        self.arch.as_ref()
    }

    /// Adds a template substitution that is not a build variable.
    pub fn add_substitution(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.substitutions.insert(key.into(), value.into());
    }

    /// Adds a raw argument to the recorded CMake invocation.
    pub fn add_cmake_argument(&mut self, argument: impl Into<String>) {
        self.cmake_arguments.push(argument.into());
    }
}

/// Formats a package summary as a titled block of aligned `label: value` rows.
pub fn format_package_summary(title: &str, lines: &[(String, String)]) -> String {
    let width = lines
        .iter()
        .map(|(label, _)| label.chars().count() + 1)
        .max()
        .unwrap_or(0);

    let mut out = format!("{}:", title);
    for (label, value) in lines {
        let label = format!("{}:", label);
        let mut rows = value.lines();
        let first = rows.next().unwrap_or_default();
        let row = format!("  {:<width$} {}", label, first, width = width);
        out.push('\n');
        out.push_str(row.trim_end());
        for continuation in rows {
            let row = format!("  {:<width$} {}", "", continuation, width = width);
            out.push('\n');
            out.push_str(row.trim_end());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cmake_var::VarKind;
    use crate::core::config_arg::{ArgSpec, ArgType};

    #[derive(Debug)]
    struct Widget {
        with_widget: ConfigArgument,
        with_widget_dir: ConfigArgument,
    }

    impl Widget {
        fn new(default_on: bool) -> Self {
            Self {
                with_widget: ConfigArgument::new(
                    "--with-widget",
                    ArgSpec::new("with_widget", ArgType::Bool).default(default_on),
                )
                .primary(),
                with_widget_dir: ConfigArgument::new(
                    "--with-widget-dir",
                    ArgSpec::new("with_widget_dir", ArgType::Path),
                )
                .cmake_var(CMakeVar::new("Widget_ROOT", VarKind::Path))
                .enables_package(),
            }
        }
    }

    impl Package for Widget {
        fn name(&self) -> &str {
            "Widget"
        }

        fn arguments(&self) -> Vec<ConfigArgument> {
            vec![self.with_widget.clone(), self.with_widget_dir.clone()]
        }

        fn configure(&mut self, _ctx: &mut ConfigureContext<'_>) -> ConfigureResult<()> {
            Ok(())
        }

        fn summarize(&self) -> Vec<(String, String)> {
            Vec::new()
        }
    }

    fn namespace(entries: &[(&str, Option<Value>, bool)]) -> Namespace {
        let mut ns = Namespace::default();
        for (name, value, cl_set) in entries {
            ns.insert(ClArg::new(*name, value.clone(), *cl_set));
        }
        ns
    }

    #[test]
    fn test_primary_flag_has_the_final_word() {
        let ns = namespace(&[
            ("with_widget", Some(Value::Bool(false)), true),
            ("with_widget_dir", Some(Value::from("/opt/widget")), true),
        ]);
        let state = Widget::new(true).enable_state(&ns).unwrap();
        assert!(!state.value);
        assert!(state.explicitly_disabled());
    }

    #[test]
    fn test_secondary_enabler_turns_package_on() {
        let ns = namespace(&[
            ("with_widget", Some(Value::Bool(false)), false),
            ("with_widget_dir", Some(Value::from("/opt/widget")), true),
        ]);
        let state = Widget::new(false).enable_state(&ns).unwrap();
        assert_eq!(state, EnableState { value: true, explicit: true });
    }

    #[test]
    fn test_primary_default_applies_when_nothing_is_typed() {
        let ns = namespace(&[
            ("with_widget", Some(Value::Bool(true)), false),
            ("with_widget_dir", None, false),
        ]);
        let state = Widget::new(true).enable_state(&ns).unwrap();
        assert_eq!(state, EnableState { value: true, explicit: false });
    }

    #[test]
    fn test_format_package_summary_aligns_labels() {
        // --- Setup ---
        let lines = vec![
            ("Version".to_string(), "12.4".to_string()),
            ("Architectures".to_string(), "80;90".to_string()),
            ("Flags".to_string(), "-O3\n-g".to_string()),
        ];

        // --- Execute ---
        let summary = format_package_summary("CUDA", &lines);

        // --- Assert ---
        let expected = "CUDA:\n  Version:       12.4\n  Architectures: 80;90\n  Flags:         -O3\n                 -g";
        assert_eq!(summary, expected);
    }

    #[test]
    fn test_registry_keeps_registration_order() {
        let registry = PackageRegistry::new().register(Widget::new(false));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.names(), vec!["Widget"]);
    }
}
