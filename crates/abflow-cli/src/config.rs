//! Pipeline configuration for the `run` command: built-in defaults, then the TOML file,
//! then `--set` overrides, then dedicated command-line flags.

mod builder;
mod defaults;
mod file;
mod models;

pub use builder::build_config;
pub use models::{AppConfig, StageCommand};

#[cfg(test)]
pub(crate) use builder::tests::{PIPELINE, base_run_args, weights, write_pipeline};
