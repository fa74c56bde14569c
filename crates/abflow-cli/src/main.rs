mod cli;
mod commands;
mod config;
mod error;
mod logging;
mod ui;
mod utils;
mod weights;

use crate::cli::{Cli, Commands};
use crate::error::{CliError, Result};
use crate::ui::UiManager;
use abflow::engine::error::EngineError;
use clap::Parser;
use tokio::task;
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() {
    if let Err(e) = run_app().await {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        eprintln!("\n❌ Error: {}", e);
        std::process::exit(exit_code(&e));
    }
}

/// 130 for an interrupted run (as a shell reports SIGINT), 2 for unusable input.
fn exit_code(error: &CliError) -> i32 {
    match error {
        CliError::Engine(EngineError::Cancelled) => 130,
        CliError::Argument(_) | CliError::Config(_) | CliError::Engine(EngineError::Config(_)) => 2,
        _ => 1,
    }
}

async fn run_app() -> Result<()> {
    let (ui_manager, ui_sender, shutdown_sender) = UiManager::new();
    let ui_handle = task::spawn(ui_manager.run());

    let cli = Cli::parse();
    logging::setup_logging(cli.verbose, cli.quiet, cli.log_file.clone())?;

    let (panic_hook, eyre_hook) = color_eyre::config::HookBuilder::default().into_hooks();
    eyre_hook.install().map_err(|e| CliError::Other(e.into()))?;
    std::panic::set_hook(Box::new(move |pi| {
        error!("{}", panic_hook.panic_report(pi));
    }));

    info!("abflow v{}", env!("CARGO_PKG_VERSION"));
    debug!("Parsed arguments: {:?}", &cli);

    if let Some(num_threads) = cli.threads {
        debug!(num_threads, "Configuring the rayon global pool");
        rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build_global()
            .map_err(|e| CliError::Argument(format!("Cannot use {num_threads} threads: {e}")))?;
    }

    let command_result = match cli.command {
        Commands::Run(args) => commands::run::run(args, ui_sender).await,
        Commands::Hlt(args) => commands::hlt::run(args).await,
        Commands::Qv(args) => commands::qv::run(args).await,
        Commands::Weights(args) => commands::weights::run(args).await,
    };

    if let Err(e) = &command_result {
        error!("Command failed: {}", e);
    }

    if shutdown_sender.send(true).is_err() {
        warn!("UI manager exited before the shutdown signal.");
    }
    ui_handle
        .await
        .map_err(|e| CliError::Other(anyhow::anyhow!("UI task failed: {}", e)))?;

    command_result
}
