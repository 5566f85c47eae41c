// src/packages/cuda.rs

use crate::core::cmake_var::{CMakeVar, Value, VarKind};
use crate::core::config_arg::{ArgSpec, ArgType, ConfigArgument};
use crate::core::error::{ConfigureError, ConfigureResult};
use crate::core::package::{ConfigureContext, Package};
use crate::packages::main_package::{CMAKE_BUILD_TYPE, default_language_flags};
use crate::packages::{EnvLookup, find_program, first_env};
use crate::system::executor;

const CUDA_TOOLKIT_ROOT: CMakeVar = CMakeVar::new("CUDAToolkit_ROOT", VarKind::Path);
const CMAKE_CUDA_COMPILER: CMakeVar = CMakeVar::new("CMAKE_CUDA_COMPILER", VarKind::Executable);
const CMAKE_CUDA_FLAGS: CMakeVar = CMakeVar::new("CMAKE_CUDA_FLAGS", VarKind::List);
const CMAKE_CUDA_ARCHITECTURES: CMakeVar =
    CMakeVar::new("CMAKE_CUDA_ARCHITECTURES", VarKind::SemicolonList);

const ARCH_NAMES: [(&str, &str); 7] = [
    ("pascal", "60"),
    ("volta", "70"),
    ("turing", "75"),
    ("ampere", "80"),
    ("ada", "89"),
    ("hopper", "90"),
    ("blackwell", "100"),
];

/// Maps a `--cuda-arch` value to CMake architectures.
///
/// Entries are separated by `,` or by `;`, the CMake list form used by `CUDAARCHS`.
/// Names are matched case-insensitively; anything else (`80`, `all-major`, `native`)
/// passes through lower-cased. Empty entries are dropped.
pub fn map_cuda_arch_names(value: &str) -> Vec<String> {
    value
        .split([',', ';'])
        .map(|arch| arch.trim().to_lowercase())
        .filter(|arch| !arch.is_empty())
        .map(|arch| {
            ARCH_NAMES
                .iter()
                .find(|(name, _)| *name == arch)
                .map_or(arch.clone(), |(_, number)| number.to_string())
        })
        .collect()
}

/// Default CUDA flags: the host flags of the build type, forwarded to the host compiler.
pub fn default_cuda_flags(build_type: &str) -> Vec<String> {
    let host = default_language_flags(build_type);
    let debug = matches!(build_type, "Debug" | "RelWithDebInfo");
    let forwarded = host
        .iter()
        .map(|flag| format!("--compiler-options={}", crate::core::cmake_var::shell_quote(flag)));
    debug
        .then(|| "-g".to_string())
        .into_iter()
        .chain(forwarded)
        .collect()
}

#[derive(Debug)]
pub struct Cuda {
    with_cuda: ConfigArgument,
    cuda_dir: ConfigArgument,
    cudac: ConfigArgument,
    cudaflags: ConfigArgument,
    cuda_arch: ConfigArgument,
    summary: Vec<(String, String)>,
}

impl Cuda {
    pub fn from_env(env: &EnvLookup<'_>) -> Self {
        let nvcc = find_program(&["nvcc"]);
        let compiler = first_env(env, &["CUDAC", "CMAKE_CUDA_COMPILER"])
            .map(Value::Str)
            .or_else(|| nvcc.clone().map(Value::Path))
            .or_else(|| find_program(&["cudac"]).map(Value::Path));
        let arch = first_env(env, &["CUDAARCHS", "CMAKE_CUDA_ARCHITECTURES"])
            .unwrap_or_else(|| "all-major".to_string());

        Self::new(
            nvcc.is_some(),
            first_env(env, &["CUDA_HOME"]).map(Value::Str),
            compiler,
            arch,
        )
    }

    /// Builds the package from already probed defaults.
    pub fn new(
        enabled_by_default: bool,
        cuda_dir: Option<Value>,
        compiler: Option<Value>,
        arch: String,
    ) -> Self {
        Self {
            with_cuda: ConfigArgument::new(
                "--with-cuda",
                ArgSpec::new("with_cuda", ArgType::Bool)
                    .default(enabled_by_default)
                    .help("Build with CUDA support."),
            )
            .primary(),
            cuda_dir: ConfigArgument::new(
                "--with-cuda-dir",
                ArgSpec::new("cuda_dir", ArgType::Path)
                    .default_opt(cuda_dir)
                    .help("Path to CUDA installation directory."),
            )
            .cmake_var(CUDA_TOOLKIT_ROOT)
            .enables_package(),
            cudac: ConfigArgument::new(
                "--with-cudac",
                ArgSpec::new("cudac", ArgType::Executable)
                    .default_opt(compiler)
                    .help("Specify CUDA compiler"),
            )
            .cmake_var(CMAKE_CUDA_COMPILER)
            .enables_package(),
            cudaflags: ConfigArgument::new(
                "--CUDAFLAGS",
                ArgSpec::new("cudaflags", ArgType::List).help("CUDA compiler flags"),
            )
            .cmake_var(CMAKE_CUDA_FLAGS),
            cuda_arch: ConfigArgument::new(
                "--cuda-arch",
                ArgSpec::new("cuda_arch", ArgType::String)
                    .default(arch)
                    .help(
                        "Target GPU architectures: 'all-major', 'all', 'native', a comma-separated \
                         list of numbers ('70,80') or of names ('ampere,hopper')",
                    ),
            )
            .cmake_var(CMAKE_CUDA_ARCHITECTURES),
            summary: Vec::new(),
        }
    }
}

impl Package for Cuda {
    fn name(&self) -> &str {
        "CUDA"
    }

    fn arguments(&self) -> Vec<ConfigArgument> {
        vec![
            self.with_cuda.clone(),
            self.cuda_dir.clone(),
            self.cudac.clone(),
            self.cudaflags.clone(),
            self.cuda_arch.clone(),
        ]
    }

    fn dependencies(&self) -> Vec<&'static str> {
        vec!["CMake"]
    }

    fn configure(&mut self, ctx: &mut ConfigureContext<'_>) -> ConfigureResult<()> {
        ctx.set_variable_if_set(&self.cudac)?;
        let Some(Value::Path(compiler)) = ctx.variable(CMAKE_CUDA_COMPILER.name).cloned() else {
            return Err(ConfigureError::package(
                "CUDA",
                "could not locate a CUDA compiler, pass --with-cudac",
            ));
        };

        let build_type = ctx
            .variable(CMAKE_BUILD_TYPE.name)
            .map(Value::to_string)
            .unwrap_or_else(|| "Release".to_string());
        let flags = if ctx.is_user_set(&self.cudaflags) {
            ctx.value(&self.cudaflags).map(Value::to_list).unwrap_or_default()
        } else {
            default_cuda_flags(&build_type)
        };
        ctx.append_variable(CMAKE_CUDA_FLAGS, &flags)?;

        if let Some(arch) = ctx.value(&self.cuda_arch).map(Value::to_string) {
            ctx.append_variable(CMAKE_CUDA_ARCHITECTURES, &map_cuda_arch_names(&arch))?;
        }
        ctx.set_variable_if_user_set(&self.cuda_dir)?;

        let output = executor::run_and_capture(&compiler, &["--version"], &ctx.project().project_dir)?;
        let version = output.stdout.trim().lines().last().unwrap_or_default().to_string();
        log::info!("CUDA compiler {}: {}", compiler.display(), version);

        let text = |name: &str| ctx.variable(name).map(Value::to_string).unwrap_or_default();
        let mut summary = vec![("Architectures".to_string(), text(CMAKE_CUDA_ARCHITECTURES.name))];
        if let Some(dir) = ctx.variable(CUDA_TOOLKIT_ROOT.name) {
            summary.push(("CUDA Dir".to_string(), dir.to_string()));
        }
        summary.push(("Executable".to_string(), compiler.display().to_string()));
        summary.push(("Version".to_string(), version));
        summary.push(("Flags".to_string(), text(CMAKE_CUDA_FLAGS.name)));
        self.summary = summary;
        Ok(())
    }

    fn summarize(&self) -> Vec<(String, String)> {
        self.summary.clone()
    }
}
