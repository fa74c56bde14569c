use thiserror::Error;

use super::config::ConfigError;
use super::hotspots::HotspotError;
use super::loop_spec::LoopSpecError;
use super::stage::StageKind;
use super::state::StateError;
use crate::core::io::quiver::QuiverError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Initialization failed: {0}")]
    Initialization(String),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid loop specification: {0}")]
    LoopSpec(#[from] LoopSpecError),

    #[error("Invalid hotspots: {0}")]
    Hotspot(#[from] HotspotError),

    #[error("Archive error: {0}")]
    Archive(#[from] QuiverError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Run state error: {0}")]
    State(#[from] StateError),

    #[error("Cannot resume: stored {field} is {stored}, requested {requested}")]
    ResumeMismatch {
        field: &'static str,
        stored: String,
        requested: String,
    },

    #[error("Every item of the {stage} stage failed ({failed} item(s))")]
    StageFatal { stage: StageKind, failed: usize },

    #[error("Run cancelled")]
    Cancelled,

    #[error("Internal logic error: {0}")]
    Internal(String),
}
