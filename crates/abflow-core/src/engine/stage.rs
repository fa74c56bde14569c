use super::hotspots::{HotspotError, HotspotRef};
use super::loop_spec::LoopSpec;
use crate::core::io::quiver::QuiverError;
use crate::core::models::loops::LoopLabel;
use crate::core::models::metadata::MetadataError;
use crate::core::models::record::{FixedResidues, RecordError, StructureRecord, TargetStructure};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    Backbone,
    Sequence,
    Prediction,
}

impl StageKind {
    pub const ALL: [StageKind; 3] = [Self::Backbone, Self::Sequence, Self::Prediction];

    /// Mixed into the base seed so that the stages draw independent streams.
    pub fn salt(self) -> u64 {
        match self {
            Self::Backbone => 0x6261_636b,
            Self::Sequence => 0x7365_7175,
            Self::Prediction => 0x7072_6564,
        }
    }

    pub fn archive_name(self) -> &'static str {
        match self {
            Self::Backbone => "backbone.qv",
            Self::Sequence => "sequence.qv",
            Self::Prediction => "prediction.qv",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Backbone => "backbone",
            Self::Sequence => "sequence",
            Self::Prediction => "prediction",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs of one backbone-generation call.
#[derive(Debug, Clone)]
pub struct BackboneRequest {
    pub tag: String,
    pub target: TargetStructure,
    pub framework: StructureRecord,
    pub loop_spec: LoopSpec,
    /// Lengths sampled for the ranged loops of `loop_spec`.
    pub loop_lengths: BTreeMap<LoopLabel, usize>,
    pub hotspots: Vec<HotspotRef>,
    pub checkpoint: PathBuf,
    pub diffusion_steps: u32,
    pub final_step: Option<u32>,
    pub deterministic: bool,
    pub seed: u64,
}

/// Inputs of one sequence-design call.
#[derive(Debug, Clone)]
pub struct SequenceRequest {
    pub tag: String,
    pub record: StructureRecord,
    pub loops: BTreeSet<LoopLabel>,
    pub fixed_residues: Vec<FixedResidues>,
    pub sequences_per_structure: usize,
    pub temperature: f64,
    pub omit_amino_acids: String,
    pub deterministic: bool,
    pub seed: u64,
    pub checkpoint: PathBuf,
}

/// Inputs of one structure-prediction call.
#[derive(Debug, Clone)]
pub struct PredictionRequest {
    pub tag: String,
    pub record: StructureRecord,
    pub recycles: u32,
    pub hotspot_proportion: f64,
    pub hotspots: Vec<HotspotRef>,
    pub seed: u64,
    pub checkpoint: PathBuf,
}

#[derive(Debug, Clone)]
pub enum StageRequest {
    Backbone(BackboneRequest),
    Sequence(SequenceRequest),
    Prediction(PredictionRequest),
}

impl StageRequest {
    pub fn kind(&self) -> StageKind {
        match self {
            Self::Backbone(_) => StageKind::Backbone,
            Self::Sequence(_) => StageKind::Sequence,
            Self::Prediction(_) => StageKind::Prediction,
        }
    }

    pub fn tag(&self) -> &str {
        match self {
            Self::Backbone(r) => &r.tag,
            Self::Sequence(r) => &r.tag,
            Self::Prediction(r) => &r.tag,
        }
    }

    pub fn seed(&self) -> u64 {
        match self {
            Self::Backbone(r) => r.seed,
            Self::Sequence(r) => r.seed,
            Self::Prediction(r) => r.seed,
        }
    }
}

#[derive(Debug, Error)]
pub enum StageError {
    #[error("Failed to launch '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Stage process exited with {status}: {stderr}")]
    Process { status: String, stderr: String },
    #[error("Stage produced no output archive at {0}")]
    MissingOutput(PathBuf),
    #[error("Stage produced an empty output archive")]
    EmptyOutput,
    #[error("Stage output is unreadable: {0}")]
    Output(#[from] QuiverError),
    #[error("Expected {expected} output record(s), got {found}")]
    UnexpectedOutputCount { expected: usize, found: usize },
    #[error("Adapter for the {adapter} stage cannot serve a {request} request")]
    WrongStage {
        adapter: StageKind,
        request: StageKind,
    },
    #[error("Failed to prepare stage inputs: {0}")]
    Request(String),
    #[error("Input structure is unusable: {0}")]
    Record(#[from] RecordError),
    #[error("Hotspot selection failed: {0}")]
    Hotspot(#[from] HotspotError),
    #[error("Invalid output metadata: {0}")]
    Metadata(#[from] MetadataError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Model(String),
}

/// A uniform call boundary around one external predictive model.
///
/// Adapters are constructed with their own configuration and invoked once per item. A
/// returned error marks only that item as failed.
pub trait StageAdapter {
    fn kind(&self) -> StageKind;

    fn invoke(&mut self, request: StageRequest) -> Result<Vec<StructureRecord>, StageError>;
}

impl<A: StageAdapter + ?Sized> StageAdapter for Box<A> {
    fn kind(&self) -> StageKind {
        (**self).kind()
    }

    fn invoke(&mut self, request: StageRequest) -> Result<Vec<StructureRecord>, StageError> {
        (**self).invoke(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_salts_are_distinct() {
        let salts: BTreeSet<u64> = StageKind::ALL.iter().map(|k| k.salt()).collect();
        assert_eq!(salts.len(), 3);
    }

    #[test]
    fn stage_kind_serializes_lowercase() {
        #[derive(Serialize, Deserialize)]
        struct Wrapper {
            kind: StageKind,
        }
        let text = toml::to_string(&Wrapper {
            kind: StageKind::Prediction,
        })
        .unwrap();
        assert_eq!(text.trim(), "kind = \"prediction\"");
        let back: Wrapper = toml::from_str(&text).unwrap();
        assert_eq!(back.kind, StageKind::Prediction);
    }
}
