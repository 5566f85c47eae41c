//! # System Interaction Layer
//!
//! This module is the boundary between the configure logic and the operating system.
//!
//! ## Modules
//!
//! - **`executor`**: Spawns short-lived external processes (git, compilers, `cmake --version`)
//!   and captures their output. Shell-style command lines are split with `shlex`, and
//!   failures carry the exit code together with both output streams.

pub mod executor;
