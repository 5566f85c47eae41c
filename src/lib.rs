//! # forgeconf
//!
//! A configure front-end for CMake projects. Command-line options are declared
//! by pluggable packages, mapped onto typed CMake cache variables, and used to
//! render the project's configuration files.

pub mod constants;
pub mod core;
pub mod models;
pub mod packages;
pub mod system;
