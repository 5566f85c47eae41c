//! # Configuration Manager
//!
//! The [`ConfigurationManager`] drives one configure run through its phases:
//!
//! 1. **`new`**: validates every package declaration, rejects colliding destinations or
//!    flags, and assembles the shared command-line parser. Nothing user-supplied is
//!    looked at yet, so declaration bugs surface before any parsing.
//! 2. **`setup`**: normalizes argv (partition off the CMake tail, de-duplicate) and parses it.
//! 3. **`resolve_activation`**: decides which packages are active, forcing dependencies
//!    on until a fixed point, and computes the configure order.
//! 4. **`configure`**: runs every active package against a [`ConfigureContext`].
//! 5. **`finalize`**: computes every artifact in memory, applies the arch directory
//!    policy, and only then writes files.
//!
//! Calling a phase before the ones it depends on is a `WrongOrder` error.

use crate::constants::{
    CMAKE_CACHE_FILENAME, CMAKE_COMMAND_SPEC_FILENAME, EXPORTED_VARIABLES_FILENAME, FORCE_DEST,
    RECONFIGURE_DEST, WITH_CLEAN_DEST,
};
use crate::core::argv::{deduplicate_command_line_args, partition_argv};
use crate::core::cmake_command::{
    CommandInputs, build_command_spec, full_command_line, write_command_spec,
};
use crate::core::cmake_var::{Value, shell_quote};
use crate::core::config_arg::ConfigArgument;
use crate::core::config_file::{ConfigFile, read_cmake_cache};
use crate::core::error::{ConfigureError, ConfigureResult};
use crate::core::namespace::Namespace;
use crate::core::package::{
    ConfigureContext, EnableState, Package, PackageRegistry, PackageState, format_package_summary,
};
use crate::core::project::{ArchValue, ProjectIdentity, ValueProvenance};
use crate::core::reconfigure::{reconfigure_file_name, render_script, sanitized_argv, write_script};
use crate::core::variables::VariableStore;
use crate::system::executor;
use clap::Command;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

/// Flags that clap registers on its own.
const RESERVED_DESTS: [&str; 2] = ["help", "version"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Phase {
    Created,
    Parsed,
    Resolved,
    Configured,
    Finalized,
}

impl Phase {
    fn call(self) -> &'static str {
        match self {
            Self::Created => "new()",
            Self::Parsed => "setup()",
            Self::Resolved => "resolve_activation()",
            Self::Configured => "configure()",
            Self::Finalized => "finalize()",
        }
    }
}

#[derive(Debug)]
struct PackageSlot {
    package: Box<dyn Package>,
    /// Every argument of the package, exclusive group members included.
    arguments: Vec<ConfigArgument>,
    state: PackageState,
    enable: Option<EnableState>,
}

impl PackageSlot {
    fn name(&self) -> &str {
        self.package.name()
    }
}

/// What `finalize` produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationReport {
    pub arch: ArchValue,
    pub arch_dir: PathBuf,
    /// The rendered configuration file.
    pub project_file: PathBuf,
    pub variables_file: PathBuf,
    pub command_spec_file: PathBuf,
    pub reconfigure_script: PathBuf,
    /// The full CMake invocation the build should run.
    pub cmake_command: Vec<String>,
    /// Per-package summaries, in configure order.
    pub summary: String,
    /// Shell `export` lines for the arch and project dir variables.
    pub exports: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArchDirAction {
    Create,
    Reuse,
    Clean,
}

#[derive(Debug)]
pub struct ConfigurationManager {
    project: ProjectIdentity,
    packages: Vec<PackageSlot>,
    parser: Command,
    config_file: ConfigFile,
    orig_argv: Vec<String>,
    main_argv: Vec<String>,
    extra_argv: Vec<String>,
    ephemeral_args: BTreeSet<String>,
    phase: Phase,
    namespace: Namespace,
    active: BTreeSet<String>,
    order: Vec<usize>,
    variables: VariableStore,
    substitutions: BTreeMap<String, String>,
    cmake_arguments: Vec<String>,
    arch: Option<ArchValue>,
}

impl ConfigurationManager {
    /// Validates every declaration and builds the shared parser.
    ///
    /// `argv` is the process argv without the program name.
    pub fn new(
        argv: Vec<String>,
        project: ProjectIdentity,
        registry: PackageRegistry,
    ) -> ConfigureResult<Self> {
        project.validate()?;

        let mut packages: Vec<PackageSlot> = Vec::with_capacity(registry.len());
        for package in registry.into_packages() {
            if packages.iter().any(|slot| slot.name() == package.name()) {
                return Err(ConfigureError::declaration(
                    package.name(),
                    "package registered more than once",
                ));
            }
            let arguments = package.all_arguments();
            packages.push(PackageSlot {
                package,
                arguments,
                state: PackageState::Unconfigured,
                enable: None,
            });
        }

        check_declarations(&packages)?;
        let parser = build_parser(&project, &packages);

        let ephemeral_args: BTreeSet<String> = packages
            .iter()
            .flat_map(|slot| slot.arguments.iter())
            .filter(|arg| arg.ephemeral)
            .map(|arg| arg.name.clone())
            .collect();

        let config_file = ConfigFile::new(&project.template)?;

        let (main_argv, extra_argv) = partition_argv(&argv);
        let main_argv = deduplicate_command_line_args(&main_argv);

        Ok(Self {
            project,
            packages,
            parser,
            config_file,
            orig_argv: argv,
            main_argv,
            extra_argv,
            ephemeral_args,
            phase: Phase::Created,
            namespace: Namespace::default(),
            active: BTreeSet::new(),
            order: Vec::new(),
            variables: VariableStore::new(),
            substitutions: BTreeMap::new(),
            cmake_arguments: Vec::new(),
            arch: None,
        })
    }

    fn require_phase(&self, expected: Phase) -> ConfigureResult<()> {
        if self.phase < expected {
            return Err(ConfigureError::WrongOrder(format!(
                "Must call {} first",
                expected.call()
            )));
        }
        if self.phase > expected {
            return Err(ConfigureError::WrongOrder(format!(
                "{} was already called",
                self.phase.call()
            )));
        }
        Ok(())
    }

    // --- Accessors ---

    pub fn project(&self) -> &ProjectIdentity {
        &self.project
    }

    /// The argv the run was started with.
    pub fn argv(&self) -> &[String] {
        &self.orig_argv
    }

    /// The normalized configure arguments handed to the parser.
    pub fn main_argv(&self) -> &[String] {
        &self.main_argv
    }

    /// The verbatim tail after `--`, forwarded to CMake.
    pub fn extra_argv(&self) -> &[String] {
        &self.extra_argv
    }

    pub fn ephemeral_args(&self) -> &BTreeSet<String> {
        &self.ephemeral_args
    }

    pub fn config_file(&self) -> &ConfigFile {
        &self.config_file
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn variables(&self) -> &VariableStore {
        &self.variables
    }

    pub fn arch(&self) -> Option<&ArchValue> {
        self.arch.as_ref()
    }

    pub fn is_active(&self, package: &str) -> bool {
        self.active.contains(package)
    }

    pub fn package_state(&self, package: &str) -> Option<PackageState> {
        self.packages
            .iter()
            .find(|slot| slot.name() == package)
            .map(|slot| slot.state)
    }

    /// Package names in the order they were (or will be) configured.
    pub fn configure_order(&self) -> Vec<&str> {
        self.order
            .iter()
            .filter_map(|idx| self.packages.get(*idx))
            .map(PackageSlot::name)
            .collect()
    }

    // --- Phases ---

    /// Logs the run preamble and parses the normalized argv.
    pub fn setup(&mut self) -> ConfigureResult<()> {
        self.require_phase(Phase::Created)?;
        self.log_preamble();

        let matches = self.parser.try_get_matches_from_mut(&self.main_argv)?;
        let arguments: Vec<&ConfigArgument> = self
            .packages
            .iter()
            .flat_map(|slot| slot.arguments.iter())
            .collect();
        self.namespace = Namespace::from_matches(&matches, &arguments);

        self.phase = Phase::Parsed;
        Ok(())
    }

    fn log_preamble(&self) {
        log::info!("Configuring {}", self.project.name);
        log::info!("Command line: {:?}", self.orig_argv);
        log::info!("Extra CMake arguments: {:?}", self.extra_argv);
        if let Ok(cwd) = std::env::current_dir() {
            log::info!("Working directory: {}", cwd.display());
        }
        self.log_git_info();
    }

    fn log_git_info(&self) {
        if which::which("git").is_err() {
            log::debug!("'git' command not found, likely not a development repository");
            return;
        }
        let dir = &self.project.project_dir;
        let Ok(branch) = executor::execute_and_capture_output("git branch --show-current", dir) else {
            log::debug!("{} is not a git repository", dir.display());
            return;
        };
        let mut branch = branch.stdout.trim().to_string();
        if branch.is_empty() {
            branch = "<detached HEAD>".to_string();
        }
        let Ok(commit) = executor::execute_and_capture_output("git rev-parse HEAD", dir) else {
            return;
        };
        log::info!("Git branch: {}", branch);
        log::info!("Git commit: {}", commit.stdout.trim());
    }

    /// Decides which packages are active and the order they are configured in.
    pub fn resolve_activation(&mut self) -> ConfigureResult<()> {
        self.require_phase(Phase::Parsed)?;

        let mut active = BTreeSet::new();
        for slot in &mut self.packages {
            slot.enable = slot.package.enable_state(&self.namespace);
            let on = slot.enable.is_none_or(|state| state.value);
            log::debug!("Package '{}' enable state: {:?}", slot.name(), slot.enable);
            if on {
                active.insert(slot.name().to_string());
            }
        }

        let deps = self.dependency_indices()?;

        // Forced dependencies, until nothing changes.
        loop {
            let mut changed = false;
            for (idx, slot) in self.packages.iter().enumerate() {
                if !active.contains(slot.name()) {
                    continue;
                }
                for dep in deps.get(idx).into_iter().flatten() {
                    let Some(dep_slot) = self.packages.get(*dep) else {
                        continue;
                    };
                    if active.contains(dep_slot.name()) {
                        continue;
                    }
                    if dep_slot.enable.is_some_and(|state| state.explicitly_disabled()) {
                        return Err(ConfigureError::package(
                            slot.name(),
                            format!(
                                "requires package '{}', but it was explicitly disabled",
                                dep_slot.name()
                            ),
                        ));
                    }
                    log::info!("Package '{}' enables its dependency '{}'", slot.name(), dep_slot.name());
                    active.insert(dep_slot.name().to_string());
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }

        for slot in &mut self.packages {
            slot.state = if active.contains(slot.name()) {
                PackageState::Active
            } else {
                PackageState::Inactive
            };
        }

        let names: Vec<&str> = self.packages.iter().map(PackageSlot::name).collect();
        let mut marks = vec![Mark::Unvisited; names.len()];
        let mut order = Vec::with_capacity(names.len());
        for (idx, name) in names.iter().enumerate() {
            if active.contains(*name) {
                visit(idx, &names, &deps, &mut marks, &mut order)?;
            }
        }

        log::info!(
            "Active packages: {}",
            order
                .iter()
                .filter_map(|idx| names.get(*idx))
                .copied()
                .collect::<Vec<_>>()
                .join(", ")
        );
        self.order = order;
        self.active = active;
        self.phase = Phase::Resolved;
        Ok(())
    }

    fn dependency_indices(&self) -> ConfigureResult<Vec<Vec<usize>>> {
        self.packages
            .iter()
            .map(|slot| {
                slot.package
                    .dependencies()
                    .into_iter()
                    .map(|dep| {
                        self.packages
                            .iter()
                            .position(|other| other.name() == dep)
                            .ok_or_else(|| {
                                ConfigureError::package(
                                    slot.name(),
                                    format!("requires unknown package '{}'", dep),
                                )
                            })
                    })
                    .collect()
            })
            .collect()
    }

    /// Configures every active package, dependencies first.
    pub fn configure(&mut self) -> ConfigureResult<()> {
        self.require_phase(Phase::Resolved)?;

        let Self {
            project,
            packages,
            namespace,
            active,
            order,
            variables,
            substitutions,
            cmake_arguments,
            arch,
            ..
        } = self;

        for idx in order.iter() {
            let Some(slot) = packages.get_mut(*idx) else {
                continue;
            };
            let name = slot.name().to_string();
            log::info!("Configuring package '{}'", name);
            let mut ctx = ConfigureContext::new(
                &name,
                project,
                namespace,
                active,
                variables,
                substitutions,
                cmake_arguments,
                arch,
            );
            slot.package.configure(&mut ctx)?;
            slot.state = PackageState::Configured;
        }

        if self.arch.is_none() {
            let value = format!("arch-{}", std::env::consts::OS);
            log::info!("No package published {}, using '{}'", self.project.arch_name, value);
            self.arch = Some(ArchValue {
                value,
                provenance: ValueProvenance::Generated,
            });
        }

        self.phase = Phase::Configured;
        Ok(())
    }

    fn flag_set(&self, dest: &str) -> bool {
        self.namespace.value(dest).is_some_and(Value::is_truthy)
    }

    fn check_arch_dir(&self, arch_dir: &Path) -> ConfigureResult<ArchDirAction> {
        let name = &self.project.name;
        if !arch_dir.exists() {
            return Ok(ArchDirAction::Create);
        }
        if !arch_dir.is_dir() {
            return Err(ConfigureError::Unsatisfiable(format!(
                "{} arch directory {} already exists, but is not a directory. Please move or delete this file before re-running configure!",
                name,
                arch_dir.display()
            )));
        }

        if self.flag_set(WITH_CLEAN_DEST) {
            let arch_real = dunce::canonicalize(arch_dir)?;
            let project_real = dunce::canonicalize(&self.project.project_dir)?;
            if project_real.starts_with(&arch_real) {
                return Err(ConfigureError::Unsatisfiable(format!(
                    "Arch dir {} is either the same as or a parent of the project dir ({}). Refusing to delete it.",
                    arch_dir.display(),
                    self.project.project_dir.display()
                )));
            }
            return Ok(ArchDirAction::Clean);
        }
        if self.flag_set(RECONFIGURE_DEST) {
            log::debug!("Reconfiguring, so an existing arch dir is expected");
            return Ok(ArchDirAction::Reuse);
        }
        let arch = arch_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if !self.project.cmake_dir(&arch).join(CMAKE_CACHE_FILENAME).exists() {
            log::debug!("No CMake cache in {}, treating it as a new configuration", arch_dir.display());
            return Ok(ArchDirAction::Reuse);
        }
        if self.flag_set(FORCE_DEST) {
            log::info!("Forcing configuration, ignoring existing arch dir");
            return Ok(ArchDirAction::Reuse);
        }

        Err(ConfigureError::Unsatisfiable(format!(
            "{name} arch directory {dir} already exists and would be overwritten by this configure command. If you:\n\n  \
             1. Meant to update an existing configuration, use {script} in place of configure.\n  \
             2. Meant to create a new configuration, re-run configure with --{arch_name}='some-other-name'.\n  \
             3. Meant to redo the current arch from scratch, re-run configure with --with-clean.\n  \
             4. Know what you are doing, re-run configure with --force.\n",
            name = name,
            dir = arch_dir.display(),
            script = reconfigure_file_name(&arch),
            arch_name = self.project.arch_name,
        )))
    }

    fn prepare_arch_dir(&self, arch_dir: &Path, action: ArchDirAction) -> ConfigureResult<()> {
        if action == ArchDirAction::Clean {
            log::warn!("--with-clean specified, deleting contents of {}!", arch_dir.display());
            fs::remove_dir_all(arch_dir)?;
        }
        fs::create_dir_all(arch_dir)?;
        Ok(())
    }

    /// Renders every artifact and writes them. Nothing is written if any step fails.
    pub fn finalize(&mut self) -> ConfigureResult<ConfigurationReport> {
        self.require_phase(Phase::Configured)?;
        let arch = self
            .arch
            .clone()
            .ok_or_else(|| ConfigureError::WrongOrder("Must call configure() first".to_string()))?;
        let arch_dir = self.project.arch_dir(&arch.value);
        let cmake_dir = self.project.cmake_dir(&arch.value);
        let action = self.check_arch_dir(&arch_dir)?;

        // --- Everything in memory first ---
        self.config_file.seed_identity(&self.project, &arch.value);
        let mut subst = read_cmake_cache(&cmake_dir.join(CMAKE_CACHE_FILENAME))?;
        subst.extend(self.config_file.default_substitutions().clone());
        subst.extend(self.substitutions.clone());
        subst.extend(self.variables.rendered()?);
        let rendered = self.config_file.render_template(&subst)?;
        let exported = serde_json::to_string_pretty(&self.variables.exported()?)?;

        let inputs = CommandInputs {
            project: &self.project,
            arch: &arch.value,
            orig_argv: &self.orig_argv,
            cmake_arguments: &self.cmake_arguments,
            extra_argv: &self.extra_argv,
        };
        let command_spec = build_command_spec(&inputs, &self.variables)?;

        let (main_argv, _) = partition_argv(&self.orig_argv);
        let replay = sanitized_argv(
            &main_argv,
            &self.ephemeral_args,
            &self.extra_argv,
            &self.project.arch_flag(),
            &arch.value,
        )?;
        let executable = std::env::current_exe().unwrap_or_else(|_| PathBuf::from("forgeconf"));
        let script = render_script(&executable, &self.project.project_dir, &replay);

        let summary = self.summarize();
        let exports = vec![
            format!("export {}={}", self.project.arch_name, shell_quote(&arch.value)),
            format!(
                "export {}={}",
                self.project.dir_name,
                shell_quote(&self.project.project_dir.display().to_string())
            ),
        ];

        // --- Then the filesystem ---
        self.prepare_arch_dir(&arch_dir, action)?;
        fs::create_dir_all(&cmake_dir)?;
        let project_file = self.config_file.write(&arch_dir, &rendered)?;
        let variables_file = arch_dir.join(EXPORTED_VARIABLES_FILENAME);
        fs::write(&variables_file, exported)?;
        let command_spec_file = cmake_dir.join(CMAKE_COMMAND_SPEC_FILENAME);
        let command_spec = write_command_spec(command_spec, &command_spec_file)?;
        let reconfigure_script = write_script(&self.project, &arch.value, &script)?;

        let cmake_command = full_command_line(&command_spec);
        log::debug!("Built CMake arguments:\n- {}", cmake_command.join("\n- "));

        self.phase = Phase::Finalized;
        Ok(ConfigurationReport {
            arch,
            arch_dir,
            project_file,
            variables_file,
            command_spec_file,
            reconfigure_script,
            cmake_command,
            summary,
            exports,
        })
    }

    fn summarize(&mut self) -> String {
        let mut blocks = Vec::new();
        for idx in &self.order {
            let Some(slot) = self.packages.get_mut(*idx) else {
                continue;
            };
            let lines = slot.package.summarize();
            slot.state = PackageState::Summarized;
            if !lines.is_empty() {
                blocks.push(format_package_summary(slot.name(), &lines));
            }
        }
        blocks.join("\n\n")
    }

    /// Runs every phase in order.
    pub fn run(&mut self) -> ConfigureResult<ConfigurationReport> {
        self.setup()?;
        self.resolve_activation()?;
        self.configure()?;
        self.finalize()
    }
}

fn check_declarations(packages: &[PackageSlot]) -> ConfigureResult<()> {
    let mut dests: HashMap<String, &str> = RESERVED_DESTS
        .iter()
        .map(|dest| (dest.to_string(), "<builtin>"))
        .collect();
    let mut flags: HashMap<String, &str> = HashMap::new();

    for slot in packages {
        for arg in &slot.arguments {
            arg.validate()?;
            if let Some(owner) = dests.insert(arg.dest().to_string(), slot.name()) {
                return Err(ConfigureError::declaration(
                    &arg.name,
                    format!(
                        "destination '{}' is declared by both '{}' and '{}'",
                        arg.dest(),
                        owner,
                        slot.name()
                    ),
                ));
            }
            if let Some(owner) = flags.insert(arg.flag().to_string(), slot.name()) {
                return Err(ConfigureError::declaration(
                    &arg.name,
                    format!("flag is declared by both '{}' and '{}'", owner, slot.name()),
                ));
            }
        }
    }

    // Group ids share the parser's id space with every destination.
    let mut groups: HashMap<String, &str> = HashMap::new();
    for slot in packages {
        for group in slot.package.exclusive_groups() {
            if let Some(owner) = dests.get(&group.name) {
                return Err(ConfigureError::declaration(
                    &group.name,
                    format!(
                        "exclusive group name collides with a destination of '{}'",
                        owner
                    ),
                ));
            }
            if let Some(owner) = groups.insert(group.name.clone(), slot.name()) {
                return Err(ConfigureError::declaration(
                    &group.name,
                    format!(
                        "exclusive group is declared by both '{}' and '{}'",
                        owner,
                        slot.name()
                    ),
                ));
            }
        }
    }
    Ok(())
}

fn build_parser(project: &ProjectIdentity, packages: &[PackageSlot]) -> Command {
    let mut parser = Command::new(project.name.clone())
        .no_binary_name(true)
        .args_override_self(true)
        .version(env!("CARGO_PKG_VERSION"))
        .about(format!("Configure {}", project.name));

    for slot in packages {
        parser = parser.next_help_heading(slot.name().to_string());
        parser = slot
            .package
            .arguments()
            .iter()
            .fold(parser, |parser, arg| arg.add_to_parser(parser));
        parser = slot
            .package
            .exclusive_groups()
            .iter()
            .fold(parser, |parser, group| group.add_to_parser(parser));
    }
    parser
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    Visiting,
    Done,
}

fn visit(
    idx: usize,
    names: &[&str],
    deps: &[Vec<usize>],
    marks: &mut [Mark],
    order: &mut Vec<usize>,
) -> ConfigureResult<()> {
    let name = names.get(idx).copied().unwrap_or_default();
    match marks.get(idx) {
        Some(Mark::Done) | None => return Ok(()),
        Some(Mark::Visiting) => {
            return Err(ConfigureError::package(name, "dependency cycle detected"));
        }
        Some(Mark::Unvisited) => {}
    }
    if let Some(mark) = marks.get_mut(idx) {
        *mark = Mark::Visiting;
    }
    for dep in deps.get(idx).into_iter().flatten() {
        visit(*dep, names, deps, marks, order)?;
    }
    if let Some(mark) = marks.get_mut(idx) {
        *mark = Mark::Done;
    }
    order.push(idx);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cmake_var::{CMakeVar, VarKind};
    use crate::core::config_arg::{ArgSpec, ArgType, ExclusiveArgumentGroup};
    use tempfile::TempDir;

    const FOO: CMakeVar = CMakeVar::new("FOO", VarKind::String);
    const BAR: CMakeVar = CMakeVar::new("BAR", VarKind::String);

    /// Writes a fixed value to one variable, optionally gated by a primary flag.
    #[derive(Debug)]
    struct Writer {
        name: &'static str,
        var: CMakeVar,
        value: &'static str,
        switch: Option<ConfigArgument>,
        deps: Vec<&'static str>,
        read: Option<&'static str>,
        seen: Option<Value>,
    }

    impl Writer {
        fn new(name: &'static str, var: CMakeVar, value: &'static str) -> Self {
            Self {
                name,
                var,
                value,
                switch: None,
                deps: Vec::new(),
                read: None,
                seen: None,
            }
        }

        fn optional(mut self, flag: &str) -> Self {
            let dest = crate::core::argv::flag_to_dest(flag);
            self.switch = Some(ConfigArgument::new(flag, ArgSpec::new(dest, ArgType::Bool)).primary());
            self
        }

        fn depends_on(mut self, dep: &'static str) -> Self {
            self.deps.push(dep);
            self
        }

        fn reads(mut self, var: &'static str) -> Self {
            self.read = Some(var);
            self
        }
    }

    impl Package for Writer {
        fn name(&self) -> &str {
            self.name
        }

        fn arguments(&self) -> Vec<ConfigArgument> {
            self.switch.iter().cloned().collect()
        }

        fn dependencies(&self) -> Vec<&'static str> {
            self.deps.clone()
        }

        fn configure(&mut self, ctx: &mut ConfigureContext<'_>) -> ConfigureResult<()> {
            if let Some(var) = self.read {
                self.seen = ctx.variable(var).cloned();
            }
            ctx.set_variable(self.var, self.value)
        }

        fn summarize(&self) -> Vec<(String, String)> {
            vec![(self.var.name.to_string(), self.value.to_string())]
        }
    }

    /// Declares the arch dir policy flags the manager consults.
    #[derive(Debug)]
    struct Policy;

    impl Package for Policy {
        fn name(&self) -> &str {
            "Policy"
        }

        fn arguments(&self) -> Vec<ConfigArgument> {
            vec![
                ConfigArgument::new("--reconfigure", ArgSpec::new(RECONFIGURE_DEST, ArgType::Bool))
                    .ephemeral(),
            ]
        }

        fn exclusive_groups(&self) -> Vec<ExclusiveArgumentGroup> {
            ExclusiveArgumentGroup::new(
                "clean_or_force",
                false,
                [
                    (
                        "with_clean",
                        ConfigArgument::new("--with-clean", ArgSpec::new(WITH_CLEAN_DEST, ArgType::Bool))
                            .ephemeral(),
                    ),
                    (
                        "force",
                        ConfigArgument::new("--force", ArgSpec::new(FORCE_DEST, ArgType::Bool))
                            .ephemeral(),
                    ),
                ],
            )
            .into_iter()
            .collect()
        }

        fn configure(&mut self, _ctx: &mut ConfigureContext<'_>) -> ConfigureResult<()> {
            Ok(())
        }

        fn summarize(&self) -> Vec<(String, String)> {
            Vec::new()
        }
    }

    /// Declares one exclusive group over two switches.
    #[derive(Debug)]
    struct Grouped {
        name: &'static str,
        group: &'static str,
    }

    impl Package for Grouped {
        fn name(&self) -> &str {
            self.name
        }

        fn arguments(&self) -> Vec<ConfigArgument> {
            Vec::new()
        }

        fn exclusive_groups(&self) -> Vec<ExclusiveArgumentGroup> {
            let switch = |flag: &str| {
                let dest = crate::core::argv::flag_to_dest(flag);
                ConfigArgument::new(flag, ArgSpec::new(dest, ArgType::Bool))
            };
            let prefix = self.name.to_lowercase();
            ExclusiveArgumentGroup::new(
                self.group,
                false,
                [
                    ("fast", switch(&format!("--{}-fast", prefix))),
                    ("slow", switch(&format!("--{}-slow", prefix))),
                ],
            )
            .into_iter()
            .collect()
        }

        fn configure(&mut self, _ctx: &mut ConfigureContext<'_>) -> ConfigureResult<()> {
            Ok(())
        }

        fn summarize(&self) -> Vec<(String, String)> {
            Vec::new()
        }
    }

    struct Fixture {
        dir: TempDir,
        project: ProjectIdentity,
    }

    fn fixture(template: &str) -> Fixture {
        let dir = TempDir::new().unwrap();
        let template_path = dir.path().join("demo.cfg.in");
        fs::write(&template_path, template).unwrap();
        let project =
            ProjectIdentity::new("Demo", "DEMO_ARCH", "DEMO_DIR", dir.path(), template_path);
        Fixture { dir, project }
    }

    fn argv(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn manager(fx: &Fixture, args: &[&str], registry: PackageRegistry) -> ConfigurationManager {
        ConfigurationManager::new(argv(args), fx.project.clone(), registry).unwrap()
    }

    #[test]
    fn test_variable_collision_aborts_without_output() {
        // --- Setup ---
        let fx = fixture("FOO=${FOO}\n");
        let registry = PackageRegistry::new()
            .register(Writer::new("Alpha", FOO, "1"))
            .register(Writer::new("Beta", FOO, "2"));
        let mut mgr = manager(&fx, &[], registry);

        // --- Execute ---
        let err = mgr.run().unwrap_err();

        // --- Assert ---
        assert!(matches!(
            &err,
            ConfigureError::VariableCollision { name, first, second }
                if name == "FOO" && first == "Alpha" && second == "Beta"
        ));
        let arch_dir = fx.dir.path().join(format!("arch-{}", std::env::consts::OS));
        assert!(!arch_dir.exists());
        let entries: Vec<_> = fs::read_dir(fx.dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1, "only the template should exist");
    }

    #[test]
    fn test_full_run_writes_every_artifact() {
        // --- Setup ---
        let fx = fixture("name=${PROJECT_NAME}\nfoo=${FOO}\narch=${DEMO_ARCH}\nkeep=${UNKNOWN}\n");
        let registry = PackageRegistry::new()
            .register(Policy)
            .register(Writer::new("Alpha", FOO, "hello"));
        let mut mgr = manager(&fx, &["--", "-DEXTRA=1"], registry);

        // --- Execute ---
        let report = mgr.run().unwrap();

        // --- Assert ---
        let arch = format!("arch-{}", std::env::consts::OS);
        assert_eq!(report.arch.value, arch);
        assert_eq!(report.arch.provenance, ValueProvenance::Generated);
        assert_eq!(report.project_file, fx.dir.path().join(&arch).join("demo.cfg"));
        assert_eq!(
            fs::read_to_string(&report.project_file).unwrap(),
            format!("name=Demo\nfoo=hello\narch={}\nkeep=${{UNKNOWN}}\n", arch)
        );
        assert!(report.variables_file.is_file());
        assert!(report.command_spec_file.is_file());
        assert!(report.reconfigure_script.is_file());
        assert_eq!(report.cmake_command.last().map(String::as_str), Some("-DEXTRA=1"));
        assert!(report.summary.contains("Alpha:\n  FOO: hello"));
        assert_eq!(report.exports.first(), Some(&format!("export DEMO_ARCH={}", arch)));
        assert_eq!(mgr.package_state("Alpha"), Some(PackageState::Summarized));
    }

    #[test]
    fn test_optional_package_needs_its_switch() {
        let fx = fixture("");
        let registry = PackageRegistry::new().register(Writer::new("Gadget", FOO, "x").optional("--with-gadget"));

        let mut off = manager(&fx, &[], registry);
        off.setup().unwrap();
        off.resolve_activation().unwrap();
        assert!(!off.is_active("Gadget"));
        assert_eq!(off.package_state("Gadget"), Some(PackageState::Inactive));

        let registry = PackageRegistry::new().register(Writer::new("Gadget", FOO, "x").optional("--with-gadget"));
        let mut on = manager(&fx, &["--with-gadget"], registry);
        on.setup().unwrap();
        on.resolve_activation().unwrap();
        on.configure().unwrap();
        assert!(on.is_active("Gadget"));
        assert_eq!(on.variables().value("FOO"), Some(&Value::from("x")));
    }

    #[test]
    fn test_dependencies_are_forced_on_and_configured_first() {
        // --- Setup ---
        let fx = fixture("");
        let registry = PackageRegistry::new()
            .register(Writer::new("App", FOO, "app").depends_on("Lib").reads("BAR"))
            .register(Writer::new("Lib", BAR, "lib").optional("--with-lib"));
        let mut mgr = manager(&fx, &[], registry);

        // --- Execute ---
        mgr.setup().unwrap();
        mgr.resolve_activation().unwrap();
        mgr.configure().unwrap();

        // --- Assert ---
        assert!(mgr.is_active("Lib"));
        assert_eq!(mgr.configure_order(), vec!["Lib", "App"]);
        assert_eq!(mgr.variables().owner("BAR"), Some("Lib"));
    }

    #[test]
    fn test_explicitly_disabled_dependency_is_fatal() {
        let fx = fixture("");
        let registry = PackageRegistry::new()
            .register(Writer::new("App", FOO, "app").depends_on("Lib"))
            .register(Writer::new("Lib", BAR, "lib").optional("--with-lib"));
        let mut mgr = manager(&fx, &["--with-lib=0"], registry);

        mgr.setup().unwrap();
        let err = mgr.resolve_activation().unwrap_err();
        assert!(matches!(err, ConfigureError::PackageConfiguration { .. }));
        assert!(err.to_string().contains("explicitly disabled"));
    }

    #[test]
    fn test_unknown_dependency_and_cycles_are_fatal() {
        let fx = fixture("");
        let registry = PackageRegistry::new().register(Writer::new("App", FOO, "app").depends_on("Missing"));
        let mut mgr = manager(&fx, &[], registry);
        mgr.setup().unwrap();
        assert!(mgr.resolve_activation().unwrap_err().to_string().contains("unknown package 'Missing'"));

        let registry = PackageRegistry::new()
            .register(Writer::new("A", FOO, "a").depends_on("B"))
            .register(Writer::new("B", BAR, "b").depends_on("A"));
        let mut mgr = manager(&fx, &[], registry);
        mgr.setup().unwrap();
        assert!(mgr.resolve_activation().unwrap_err().to_string().contains("cycle"));
    }

    #[test]
    fn test_colliding_destinations_fail_before_parsing() {
        let fx = fixture("");
        let registry = PackageRegistry::new()
            .register(Writer::new("One", FOO, "1").optional("--with-thing"))
            .register(Writer::new("Two", BAR, "2").optional("--with-thing"));

        let err = ConfigurationManager::new(argv(&["--bogus"]), fx.project.clone(), registry).unwrap_err();

        assert!(matches!(err, ConfigureError::ArgumentDeclaration { .. }));
        assert!(err.to_string().contains("'One' and 'Two'"));
    }

    #[test]
    fn test_group_name_colliding_with_own_destination_is_rejected() {
        // --- Setup ---
        let fx = fixture("");
        let registry = PackageRegistry::new().register(Grouped {
            name: "Speed",
            group: "speed_fast",
        });

        // --- Execute ---
        let err = ConfigurationManager::new(Vec::new(), fx.project.clone(), registry).unwrap_err();

        // --- Assert ---
        assert!(matches!(err, ConfigureError::ArgumentDeclaration { .. }));
        assert!(err.to_string().contains("collides with a destination of 'Speed'"));
    }

    #[test]
    fn test_group_declared_twice_is_rejected() {
        let fx = fixture("");
        let registry = PackageRegistry::new()
            .register(Grouped { name: "Left", group: "mode" })
            .register(Grouped { name: "Right", group: "mode" });

        let err = ConfigurationManager::new(Vec::new(), fx.project.clone(), registry).unwrap_err();

        assert!(err.to_string().contains("declared by both 'Left' and 'Right'"));
    }

    #[test]
    fn test_exports_quote_project_dir_for_the_shell() {
        // --- Setup ---
        let outer = TempDir::new().unwrap();
        let project_dir = outer.path().join("it's here");
        fs::create_dir_all(&project_dir).unwrap();
        let template = project_dir.join("demo.cfg.in");
        fs::write(&template, "").unwrap();
        let project = ProjectIdentity::new("Demo", "DEMO_ARCH", "DEMO_DIR", project_dir.clone(), template);
        let registry = PackageRegistry::new().register(Writer::new("Alpha", FOO, "x"));

        // --- Execute ---
        let mut mgr = ConfigurationManager::new(Vec::new(), project, registry).unwrap();
        let report = mgr.run().unwrap();

        // --- Assert ---
        let line = report.exports.get(1).unwrap();
        let value = line.strip_prefix("export DEMO_DIR=").unwrap();
        assert_eq!(
            shlex::split(value),
            Some(vec![project_dir.display().to_string()])
        );
    }

    #[test]
    fn test_duplicate_package_names_are_rejected() {
        let fx = fixture("");
        let registry = PackageRegistry::new()
            .register(Writer::new("Same", FOO, "1"))
            .register(Writer::new("Same", BAR, "2"));
        let err = ConfigurationManager::new(Vec::new(), fx.project.clone(), registry).unwrap_err();
        assert!(matches!(err, ConfigureError::ArgumentDeclaration { .. }));
    }

    #[test]
    fn test_missing_template_fails_at_construction() {
        let fx = fixture("");
        let mut project = fx.project.clone();
        project.template = fx.dir.path().join("missing.in");
        let err = ConfigurationManager::new(Vec::new(), project, PackageRegistry::new()).unwrap_err();
        assert!(matches!(err, ConfigureError::TemplateNotFound { .. }));
    }

    #[test]
    fn test_user_errors_are_cli_usage() {
        let fx = fixture("");
        let mut unknown = manager(&fx, &["--bogus"], PackageRegistry::new().register(Policy));
        assert!(matches!(unknown.setup(), Err(ConfigureError::CliUsage { .. })));

        let mut both = manager(&fx, &["--force", "--with-clean"], PackageRegistry::new().register(Policy));
        assert!(matches!(both.setup(), Err(ConfigureError::CliUsage { .. })));
    }

    #[test]
    fn test_phases_must_run_in_order() {
        let fx = fixture("");
        let mut mgr = manager(&fx, &[], PackageRegistry::new());

        let err = mgr.configure().unwrap_err();
        assert!(matches!(err, ConfigureError::WrongOrder(_)));
        assert_eq!(err.to_string(), "Must call resolve_activation() first");

        assert_eq!(mgr.finalize().unwrap_err().to_string(), "Must call configure() first");
        assert_eq!(mgr.resolve_activation().unwrap_err().to_string(), "Must call setup() first");

        mgr.setup().unwrap();
        assert_eq!(mgr.setup().unwrap_err().to_string(), "setup() was already called");
    }

    #[test]
    fn test_argv_is_partitioned_then_deduplicated() {
        let fx = fixture("");
        let mgr = manager(
            &fx,
            &["--with-lib=0", "--with-lib", "--", "-DA=1", "-DA=1"],
            PackageRegistry::new(),
        );
        assert_eq!(mgr.main_argv(), argv(&["--with-lib"]).as_slice());
        assert_eq!(mgr.extra_argv(), argv(&["-DA=1", "-DA=1"]).as_slice());
    }

    #[test]
    fn test_existing_cmake_cache_requires_force() {
        // --- Setup ---
        let fx = fixture("");
        let arch = format!("arch-{}", std::env::consts::OS);
        let cmake_dir = fx.project.cmake_dir(&arch);
        fs::create_dir_all(&cmake_dir).unwrap();
        fs::write(cmake_dir.join(CMAKE_CACHE_FILENAME), "FOO:STRING=old\n").unwrap();

        // --- Execute ---
        let blocked = manager(&fx, &[], PackageRegistry::new().register(Policy)).run();
        let forced = manager(&fx, &["--force"], PackageRegistry::new().register(Policy)).run();
        let cleaned = manager(&fx, &["--with-clean"], PackageRegistry::new().register(Policy)).run();

        // --- Assert ---
        let err = blocked.unwrap_err();
        assert!(matches!(err, ConfigureError::Unsatisfiable(_)));
        assert!(err.to_string().contains("--with-clean"));
        assert!(forced.is_ok());
        assert!(cleaned.is_ok());
        assert!(!cmake_dir.join(CMAKE_CACHE_FILENAME).exists());
    }

    #[test]
    fn test_reconfigure_script_drops_ephemeral_flags() {
        let fx = fixture("");
        let mut mgr = manager(&fx, &["--force"], PackageRegistry::new().register(Policy));
        let report = mgr.run().unwrap();

        let script = fs::read_to_string(&report.reconfigure_script).unwrap();
        assert!(!script.contains("--force"));
        assert!(script.contains("--reconfigure"));
        assert!(script.contains("--DEMO_ARCH="));
    }
}
