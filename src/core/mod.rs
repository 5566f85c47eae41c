// src/core/mod.rs

pub mod argv;
pub mod cmake_command;
pub mod cmake_var;
pub mod config_arg;
pub mod config_file;
pub mod error;
pub mod manager;
pub mod namespace;
pub mod package;
pub mod project;
pub mod reconfigure;
pub mod variables;
