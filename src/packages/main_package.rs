// src/packages/main_package.rs

use crate::constants::{BUILD_TYPE_DEST, FORCE_DEST, RECONFIGURE_DEST, RECONFIGURE_FLAG, WITH_CLEAN_DEST};
use crate::core::argv::flag_to_dest;
use crate::core::cmake_var::{CMakeVar, Value, VarKind};
use crate::core::config_arg::{ArgSpec, ArgType, ConfigArgument, ExclusiveArgumentGroup, Nargs};
use crate::core::error::{ConfigureError, ConfigureResult};
use crate::core::package::{ConfigureContext, Package};
use crate::core::project::{ArchValue, ProjectIdentity, ValueProvenance};
use crate::packages::{EnvLookup, find_program, first_env};
use std::path::PathBuf;

pub const CMAKE_BUILD_TYPE: CMakeVar = CMakeVar::new("CMAKE_BUILD_TYPE", VarKind::String);
const BUILD_SHARED_LIBS: CMakeVar = CMakeVar::new("BUILD_SHARED_LIBS", VarKind::Bool);
const CMAKE_BUILD_PARALLEL_LEVEL: CMakeVar = CMakeVar::new("CMAKE_BUILD_PARALLEL_LEVEL", VarKind::Int);
const CMAKE_C_COMPILER: CMakeVar = CMakeVar::new("CMAKE_C_COMPILER", VarKind::Executable);
const CMAKE_CXX_COMPILER: CMakeVar = CMakeVar::new("CMAKE_CXX_COMPILER", VarKind::Executable);
const CMAKE_C_FLAGS: CMakeVar = CMakeVar::new("CMAKE_C_FLAGS", VarKind::List);
const CMAKE_CXX_FLAGS: CMakeVar = CMakeVar::new("CMAKE_CXX_FLAGS", VarKind::List);
const CMAKE_INSTALL_PREFIX: CMakeVar = CMakeVar::new("CMAKE_INSTALL_PREFIX", VarKind::Path);
const CMAKE_EXPORT_COMPILE_COMMANDS: CMakeVar =
    CMakeVar::new("CMAKE_EXPORT_COMPILE_COMMANDS", VarKind::Bool);
const CMAKE_COLOR_DIAGNOSTICS: CMakeVar = CMakeVar::new("CMAKE_COLOR_DIAGNOSTICS", VarKind::Bool);
const CMAKE_COLOR_MAKEFILE: CMakeVar = CMakeVar::new("CMAKE_COLOR_MAKEFILE", VarKind::Bool);

/// `--build-type` choices and the CMake build type each one selects.
///
/// `debug-sanitizer` is still a CMake `Debug` build; the project applies sanitizer
/// flags itself based on the raw choice.
const BUILD_TYPES: [(&str, &str); 5] = [
    ("debug", "Debug"),
    ("release", "Release"),
    ("release-debug", "RelWithDebInfo"),
    ("relwithdebinfo", "RelWithDebInfo"),
    ("debug-sanitizer", "Debug"),
];

/// `--debug-configure` levels, lowest first. Each level includes the ones below it.
const DEBUG_CONFIGURE_LEVELS: [(&str, &str); 3] = [
    ("debug-find", "--debug-find"),
    ("trace", "--trace"),
    ("trace-expand", "--trace-expand"),
];

/// Maps a `--build-type` choice to its CMake build type.
pub fn cmake_build_type(choice: &str) -> Option<&'static str> {
    let choice = choice.to_lowercase();
    BUILD_TYPES
        .iter()
        .find(|(name, _)| *name == choice)
        .map(|(_, cmake)| *cmake)
}

/// Default C and C++ flags for a CMake build type.
pub fn default_language_flags(build_type: &str) -> Vec<String> {
    let flags: &[&str] = match build_type {
        "Debug" => &["-O0", "-g", "-g3"],
        "RelWithDebInfo" => &["-O0", "-g", "-g3", "-O3"],
        _ => &["-O3"],
    };
    flags.iter().map(|flag| flag.to_string()).collect()
}

/// The CMake flags enabled by a `--debug-configure` level.
pub fn debug_configure_flags(level: &str) -> Vec<String> {
    let Some(index) = DEBUG_CONFIGURE_LEVELS
        .iter()
        .position(|(name, _)| *name == level)
    else {
        return Vec::new();
    };
    DEBUG_CONFIGURE_LEVELS
        .iter()
        .take(index + 1)
        .map(|(_, flag)| flag.to_string())
        .collect()
}

fn detect_num_threads(env: &EnvLookup<'_>) -> i64 {
    if let Some(level) = first_env(env, &["CMAKE_BUILD_PARALLEL_LEVEL"])
        && let Ok(level) = level.trim().parse::<i64>()
    {
        return level;
    }
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    i64::try_from(cpus).unwrap_or(1).saturating_sub(1).max(1)
}

fn guess_compiler(env: &EnvLookup<'_>, env_names: &[&str], programs: &[&str]) -> Option<Value> {
    first_env(env, env_names)
        .map(Value::Str)
        .or_else(|| find_program(programs).map(Value::Path))
}

/// The always-active package carrying the project-wide flags.
#[derive(Debug)]
pub struct CoreProject {
    name: String,
    arch_name: String,
    /// The arch value found in the environment at startup.
    env_arch: Option<String>,
    arch: ConfigArgument,
    build_type: ConfigArgument,
    library_linkage: ConfigArgument,
    num_threads: ConfigArgument,
    with_cc: ConfigArgument,
    with_cxx: ConfigArgument,
    cflags: ConfigArgument,
    cxxflags: ConfigArgument,
    prefix: ConfigArgument,
    debug_configure: ConfigArgument,
    reconfigure: ConfigArgument,
    clean_or_force: ExclusiveArgumentGroup,
    summary: Vec<(String, String)>,
}

impl CoreProject {
    pub fn from_env(project: &ProjectIdentity, env: &EnvLookup<'_>) -> ConfigureResult<Self> {
        let arch_flag = project.arch_flag();
        let default_build_type = first_env(env, &["CMAKE_BUILD_TYPE"])
            .map(|value| value.to_lowercase())
            .filter(|value| cmake_build_type(value).is_some())
            .unwrap_or_else(|| "release".to_string());

        let clean_or_force = ExclusiveArgumentGroup::new(
            "clean_or_force",
            false,
            [
                (
                    "with_clean",
                    ConfigArgument::new(
                        "--with-clean",
                        ArgSpec::new(WITH_CLEAN_DEST, ArgType::Bool)
                            .help("Discard all existing configuration and start fresh"),
                    )
                    .ephemeral(),
                ),
                (
                    "force",
                    ConfigArgument::new(
                        "--force",
                        ArgSpec::new(FORCE_DEST, ArgType::Bool).help(
                            "Proceed even if configure believes doing so would be erroneous",
                        ),
                    )
                    .ephemeral(),
                ),
            ],
        )?;

        Ok(Self {
            name: project.name.clone(),
            arch_name: project.arch_name.clone(),
            env_arch: env(&project.arch_name),
            arch: ConfigArgument::new(
                arch_flag.clone(),
                ArgSpec::new(flag_to_dest(&arch_flag), ArgType::String)
                    .metavar("ARCH")
                    .help(format!(
                        "{} build directory. Any name unique inside {} works. Generated from the configure arguments if not passed.",
                        project.name,
                        project.project_dir.display()
                    )),
            ),
            build_type: ConfigArgument::new(
                "--build-type",
                ArgSpec::new(BUILD_TYPE_DEST, ArgType::String)
                    .choices(BUILD_TYPES.iter().map(|(name, _)| *name))
                    .default(default_build_type)
                    .help("Set the default build type"),
            )
            .cmake_var(CMAKE_BUILD_TYPE),
            library_linkage: ConfigArgument::new(
                "--library-linkage",
                ArgSpec::new("library_linkage", ArgType::String)
                    .choices(["shared", "static"])
                    .default("shared")
                    .help("Set the default linkage strategy for built libraries"),
            )
            .cmake_var(BUILD_SHARED_LIBS),
            num_threads: ConfigArgument::new(
                "--num-threads",
                ArgSpec::new("num_threads", ArgType::Int)
                    .default(detect_num_threads(env))
                    .help("Number of threads with which to compile"),
            )
            .cmake_var(CMAKE_BUILD_PARALLEL_LEVEL),
            with_cc: ConfigArgument::new(
                "--with-cc",
                ArgSpec::new("cc", ArgType::Executable)
                    .default_opt(guess_compiler(env, &["CC", "CMAKE_C_COMPILER"], &["cc"]))
                    .help("Specify C compiler"),
            )
            .cmake_var(CMAKE_C_COMPILER),
            with_cxx: ConfigArgument::new(
                "--with-cxx",
                ArgSpec::new("cxx", ArgType::Executable)
                    .default_opt(guess_compiler(
                        env,
                        &["CXX", "CMAKE_CXX_COMPILER"],
                        &["c++", "CC", "CXX", "cxx"],
                    ))
                    .help("Specify C++ compiler"),
            )
            .cmake_var(CMAKE_CXX_COMPILER),
            cflags: ConfigArgument::new(
                "--CFLAGS",
                ArgSpec::new("cflags", ArgType::List).help("C compiler flags"),
            )
            .cmake_var(CMAKE_C_FLAGS),
            cxxflags: ConfigArgument::new(
                "--CXXFLAGS",
                ArgSpec::new("cxxflags", ArgType::List).help("C++ compiler flags"),
            )
            .cmake_var(CMAKE_CXX_FLAGS),
            prefix: ConfigArgument::new(
                "--prefix",
                ArgSpec::new("prefix", ArgType::Path)
                    .help("Default installation prefix. Defaults to /usr/local on Unix."),
            )
            .cmake_var(CMAKE_INSTALL_PREFIX),
            debug_configure: ConfigArgument::new(
                "--debug-configure",
                ArgSpec::new("debug_configure", ArgType::String)
                    .nargs(Nargs::Optional)
                    .const_value("debug-find")
                    .choices(DEBUG_CONFIGURE_LEVELS.iter().map(|(name, _)| *name))
                    .help("Pass extra debugging flags to CMake. Higher levels include the lower ones."),
            )
            .ephemeral(),
            reconfigure: ConfigArgument::new(
                RECONFIGURE_FLAG,
                ArgSpec::new(RECONFIGURE_DEST, ArgType::Bool)
                    .help("Set by generated reconfigure scripts"),
            )
            .ephemeral(),
            clean_or_force,
            summary: Vec::new(),
        })
    }

    fn resolve_arch(&self, ctx: &ConfigureContext<'_>) -> ConfigureResult<ArchValue> {
        let cl_arch = if ctx.is_user_set(&self.arch) {
            ctx.value(&self.arch).map(Value::to_string)
        } else {
            None
        };

        match (cl_arch, &self.env_arch) {
            (Some(cl), Some(env)) => {
                if &cl != env {
                    log::warn!(
                        "{} is set to '{}' in the environment, but '{}' on the command line. Using the command line value.",
                        self.arch_name,
                        env,
                        cl
                    );
                }
                Ok(ArchValue {
                    value: cl,
                    provenance: ValueProvenance::CommandLine,
                })
            }
            (Some(cl), None) => Ok(ArchValue {
                value: cl,
                provenance: ValueProvenance::CommandLine,
            }),
            (None, Some(env)) => Ok(ArchValue {
                value: env.clone(),
                provenance: ValueProvenance::Environment,
            }),
            (None, None) => {
                let mut parts = vec!["arch".to_string(), std::env::consts::OS.to_lowercase()];
                if ctx.is_active("Python") {
                    parts.push("py".to_string());
                }
                if ctx.is_active("CUDA") {
                    parts.push("cuda".to_string());
                }
                let build_type = ctx
                    .value(&self.build_type)
                    .map(|value| value.to_string().to_lowercase())
                    .unwrap_or_else(|| "release".to_string());
                parts.push(build_type);
                Ok(ArchValue {
                    value: parts.join("-"),
                    provenance: ValueProvenance::Generated,
                })
            }
        }
    }

    fn configure_language(
        &self,
        ctx: &mut ConfigureContext<'_>,
        compiler: &ConfigArgument,
        flags: &ConfigArgument,
        build_type: &str,
    ) -> ConfigureResult<(String, String)> {
        ctx.set_variable_if_user_set(compiler)?;
        let var = flags.cmake_var.unwrap_or(CMAKE_C_FLAGS);
        let items = if ctx.is_user_set(flags) {
            ctx.value(flags).map(Value::to_list).unwrap_or_default()
        } else {
            default_language_flags(build_type)
        };
        ctx.append_variable(var, &items)?;

        let executable = compiler
            .cmake_var
            .and_then(|var| ctx.variable(var.name))
            .or(compiler.spec.default.as_ref())
            .map(Value::to_string)
            .unwrap_or_else(|| "(unknown)".to_string());
        let flags = ctx
            .variable(var.name)
            .map(Value::to_string)
            .unwrap_or_default();
        Ok((executable, flags))
    }
}

impl Package for CoreProject {
    fn name(&self) -> &str {
        &self.name
    }

    fn arguments(&self) -> Vec<ConfigArgument> {
        vec![
            self.arch.clone(),
            self.build_type.clone(),
            self.library_linkage.clone(),
            self.num_threads.clone(),
            self.with_cc.clone(),
            self.with_cxx.clone(),
            self.cflags.clone(),
            self.cxxflags.clone(),
            self.prefix.clone(),
            self.debug_configure.clone(),
            self.reconfigure.clone(),
        ]
    }

    fn exclusive_groups(&self) -> Vec<ExclusiveArgumentGroup> {
        vec![self.clean_or_force.clone()]
    }

    fn configure(&mut self, ctx: &mut ConfigureContext<'_>) -> ConfigureResult<()> {
        let arch = self.resolve_arch(ctx)?;
        ctx.set_project_arch(arch.clone())?;

        let choice = ctx
            .value(&self.build_type)
            .map(Value::to_string)
            .unwrap_or_else(|| "release".to_string());
        let build_type = cmake_build_type(&choice).ok_or_else(|| {
            ConfigureError::package(&self.name, format!("unknown build type '{}'", choice))
        })?;
        ctx.set_variable(CMAKE_BUILD_TYPE, build_type)?;

        ctx.set_variable(CMAKE_EXPORT_COMPILE_COMMANDS, true)?;
        ctx.set_variable(CMAKE_COLOR_DIAGNOSTICS, true)?;
        ctx.set_variable(CMAKE_COLOR_MAKEFILE, true)?;
        ctx.set_variable_if_set(&self.num_threads)?;

        let shared = ctx
            .value(&self.library_linkage)
            .is_none_or(|linkage| linkage.as_str() == Some("shared"));
        ctx.set_variable(BUILD_SHARED_LIBS, shared)?;
        ctx.set_variable_if_set(&self.prefix)?;

        if let Some(level) = ctx.value(&self.debug_configure).map(Value::to_string) {
            for flag in debug_configure_flags(&level) {
                ctx.add_cmake_argument(flag);
            }
        }

        let (cc, cflags) = self.configure_language(ctx, &self.with_cc, &self.cflags, build_type)?;
        let (cxx, cxxflags) =
            self.configure_language(ctx, &self.with_cxx, &self.cxxflags, build_type)?;

        let text = |name: &str| {
            ctx.variable(name)
                .map(Value::to_string)
                .unwrap_or_default()
        };
        let project_dir: PathBuf = ctx.project().project_dir.clone();
        self.summary = vec![
            (format!("{} Dir", self.name), project_dir.display().to_string()),
            (format!("{} Arch", self.name), arch.value),
            ("Build type".to_string(), text(CMAKE_BUILD_TYPE.name)),
            (
                "Num Build Threads".to_string(),
                text(CMAKE_BUILD_PARALLEL_LEVEL.name),
            ),
            ("Install prefix".to_string(), text(CMAKE_INSTALL_PREFIX.name)),
            ("C Compiler".to_string(), cc),
            ("Global C Flags".to_string(), cflags),
            ("C++ Compiler".to_string(), cxx),
            ("Global C++ Flags".to_string(), cxxflags),
        ];
        Ok(())
    }

    fn summarize(&self) -> Vec<(String, String)> {
        self.summary.clone()
    }
}
