use crate::error::{CliError, Result};
use std::fs::File;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, filter::LevelFilter, fmt, prelude::*};

/// Full filter directives (`RUST_LOG` syntax) that replace the `-v`/`-q` levels.
pub const LOG_ENV_VAR: &str = "ABFLOW_LOG";

fn level_for(verbosity: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::ERROR;
    }
    match verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// `-v` raises the level of abflow's own targets only; dependencies stay at WARN.
fn directives(verbosity: u8, quiet: bool) -> String {
    let level = level_for(verbosity, quiet);
    let floor = level.min(LevelFilter::WARN);
    format!("{floor},abflow={level}").to_lowercase()
}

fn build_filter(verbosity: u8, quiet: bool) -> Result<EnvFilter> {
    let spec = match std::env::var(LOG_ENV_VAR) {
        Ok(value) if !value.trim().is_empty() => value,
        _ => directives(verbosity, quiet),
    };
    EnvFilter::try_new(&spec)
        .map_err(|e| CliError::Config(format!("Invalid log filter '{spec}': {e}")))
}

pub fn setup_logging(verbosity: u8, quiet: bool, log_file: Option<PathBuf>) -> Result<()> {
    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact();

    let file_layer = match log_file {
        Some(path) => Some(
            fmt::layer()
                .with_writer(File::create(&path).map_err(CliError::Io)?)
                .with_ansi(false)
                .with_thread_ids(true),
        ),
        None => None,
    };

    tracing_subscriber::registry()
        .with(build_filter(verbosity, quiet)?)
        .with(console)
        .with(file_layer)
        .init();
    Ok(())
}
