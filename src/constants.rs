// src/constants.rs

/// The name of the project file that declares a project's identity.
pub const PROJECT_CONFIG_FILENAME: &str = "forgeconf.toml";

/// Environment variable that overrides the location of the project file.
pub const PROJECT_FILE_ENV: &str = "FORGECONF_PROJECT_FILE";

/// The name of the CMake build directory inside an arch directory.
pub const CMAKE_BUILD_DIRNAME: &str = "cmake_build";

/// The name of the CMake cache file inside the CMake build directory.
pub const CMAKE_CACHE_FILENAME: &str = "CMakeCache.txt";

/// The name of the JSON file holding the recorded CMake invocation.
pub const CMAKE_COMMAND_SPEC_FILENAME: &str = "cmake_command_spec.json";

/// The name of the JSON file holding every exported build variable.
pub const EXPORTED_VARIABLES_FILENAME: &str = "variables.json";

/// Substitution key for the path of the running configure executable.
pub const CONFIGURE_EXECUTABLE_KEY: &str = "CONFIGURE_EXECUTABLE";

// Destinations of the core project arguments the manager itself consults.
pub const WITH_CLEAN_DEST: &str = "with_clean";
pub const FORCE_DEST: &str = "force";
pub const RECONFIGURE_DEST: &str = "reconfigure";
pub const BUILD_TYPE_DEST: &str = "build_type";

/// Flag passed by generated reconfigure scripts.
pub const RECONFIGURE_FLAG: &str = "--reconfigure";

// Build variables with a dedicated place in the recorded CMake invocation.
pub const CMAKE_COMMAND_VAR_NAME: &str = "CMAKE_COMMAND";
pub const CMAKE_GENERATOR_VAR_NAME: &str = "CMAKE_GENERATOR";
