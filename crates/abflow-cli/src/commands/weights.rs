use crate::cli::{WeightsArgs, WeightsCommands};
use crate::error::Result;
use crate::weights::{WEIGHTS_ENV_VAR, WeightsManager};
use std::path::Path;
use tracing::warn;

pub async fn run(args: WeightsArgs) -> Result<()> {
    match args.command {
        WeightsCommands::Path => handle_path(),
        WeightsCommands::SetPath { path } => handle_set_path(&path),
        WeightsCommands::ResetPath => handle_reset_path(),
        WeightsCommands::List => handle_list(),
    }
}

fn warn_if_overridden() {
    if std::env::var_os(WEIGHTS_ENV_VAR).is_some_and(|v| !v.is_empty()) {
        warn!("{WEIGHTS_ENV_VAR} is set and takes precedence over the persisted path.");
        eprintln!("Note: {WEIGHTS_ENV_VAR} is set and takes precedence over the persisted path.");
    }
}

fn handle_path() -> Result<()> {
    let manager = WeightsManager::new()?;
    println!("{}", manager.get_weights_path().display());
    Ok(())
}

fn handle_set_path(path: &Path) -> Result<()> {
    WeightsManager::set_custom_path(path)?;
    let manager = WeightsManager::new()?;
    println!(
        "✓ Weights path set to: {}",
        manager.get_weights_path().display()
    );
    warn_if_overridden();
    Ok(())
}

fn handle_reset_path() -> Result<()> {
    WeightsManager::reset_path()?;
    let manager = WeightsManager::new()?;
    println!(
        "✓ Weights path reset to: {}",
        manager.get_weights_path().display()
    );
    warn_if_overridden();
    Ok(())
}

fn handle_list() -> Result<()> {
    let manager = WeightsManager::new()?;
    println!("Weights directory: {}", manager.get_weights_path().display());
    for (name, path, present) in manager.list() {
        let status = if present { "✓" } else { "✗ missing" };
        println!("  {:<12} {:<10} {}", name.as_str(), status, path.display());
    }
    Ok(())
}
