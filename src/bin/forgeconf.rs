// src/bin/forgeconf.rs

use anyhow::{Context, Result, bail};
use colored::*;
use forgeconf::{
    constants::{PROJECT_CONFIG_FILENAME, PROJECT_FILE_ENV},
    core::{
        error::ConfigureError, manager::ConfigurationManager, project::load_project_file,
    },
    packages::default_registry,
};
use std::env;
use std::path::PathBuf;

/// Finds the project file: `$FORGECONF_PROJECT_FILE`, else `forgeconf.toml` in the working directory.
fn locate_project_file() -> Result<PathBuf> {
    let path = match env::var(PROJECT_FILE_ENV) {
        Ok(path) if !path.trim().is_empty() => PathBuf::from(path),
        _ => env::current_dir()
            .context("Could not determine the current working directory")?
            .join(PROJECT_CONFIG_FILENAME),
    };
    if !path.is_file() {
        bail!(
            "No project file found at '{}'. Run configure from the project root or set {}.",
            path.display(),
            PROJECT_FILE_ENV
        );
    }
    Ok(path)
}

fn run(argv: Vec<String>) -> Result<()> {
    let project_file = locate_project_file()?;
    let project = load_project_file(&project_file)
        .with_context(|| format!("Failed to load project file '{}'", project_file.display()))?;
    log::debug!("Loaded project: {:?}", project);

    let registry = default_registry(&project)?;
    let mut manager = ConfigurationManager::new(argv, project, registry)?;
    let report = manager.run()?;

    println!("{}", report.summary);
    println!();
    println!(
        "{} {} ({})",
        "Configured".green().bold(),
        report.arch.value.cyan(),
        report.arch.provenance
    );
    println!("  Project file:     {}", report.project_file.display());
    println!("  Variables:        {}", report.variables_file.display());
    println!("  CMake command:    {}", report.command_spec_file.display());
    println!("  Reconfigure with: {}", report.reconfigure_script.display());
    println!();
    println!("{}", "Export these to use this configuration by default:".dimmed());
    for line in &report.exports {
        println!("  {}", line);
    }
    Ok(())
}

/// The entry point. Forwards the raw argv, untouched, so the `--` tail reaches CMake verbatim.
fn main() {
    env_logger::init();
    let argv: Vec<String> = env::args().skip(1).collect();

    if let Err(e) = run(argv) {
        // Parser errors and --help are printed by clap itself, with its exit code.
        if let Some(ConfigureError::CliUsage {
            source: Some(clap_err),
            ..
        }) = e.downcast_ref::<ConfigureError>()
        {
            clap_err.exit();
        }
        eprintln!("\n{}: {:#}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}
