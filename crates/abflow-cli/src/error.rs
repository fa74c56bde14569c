use abflow::core::io::quiver::QuiverError;
use abflow::engine::error::EngineError;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Quiver archive: {0}")]
    Archive(#[from] QuiverError),

    #[error("Pipeline configuration: {0}")]
    Config(String),

    #[error("Model checkpoints: {0}")]
    Weights(String),

    #[error("Cannot process '{path}': {source}", path = path.display())]
    FileParsing {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Argument(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
