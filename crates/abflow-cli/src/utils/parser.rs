use abflow::engine::stage::StageKind;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error(
        "Unknown checkpoint name '{0}'. Expected one of 'rfdiffusion', 'proteinmpnn', 'rf2' or a path."
    )]
    UnknownCheckpoint(String),

    #[error("Checkpoint '{name}' belongs to the {expected} stage, not the {found} stage.")]
    WrongStage {
        name: String,
        expected: StageKind,
        found: StageKind,
    },
}

/// The model checkpoints known by logical name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointName {
    RfDiffusion,
    ProteinMpnn,
    Rf2,
}

impl CheckpointName {
    pub const ALL: [CheckpointName; 3] = [
        CheckpointName::RfDiffusion,
        CheckpointName::ProteinMpnn,
        CheckpointName::Rf2,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CheckpointName::RfDiffusion => "rfdiffusion",
            CheckpointName::ProteinMpnn => "proteinmpnn",
            CheckpointName::Rf2 => "rf2",
        }
    }

    pub fn file_name(self) -> &'static str {
        match self {
            CheckpointName::RfDiffusion => "RFdiffusion_Ab.pt",
            CheckpointName::ProteinMpnn => "ProteinMPNN_v48_noise_0.2.pt",
            CheckpointName::Rf2 => "RF2_ab.pt",
        }
    }

    pub fn stage(self) -> StageKind {
        match self {
            CheckpointName::RfDiffusion => StageKind::Backbone,
            CheckpointName::ProteinMpnn => StageKind::Sequence,
            CheckpointName::Rf2 => StageKind::Prediction,
        }
    }
}

impl fmt::Display for CheckpointName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckpointName {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|name| name.as_str() == wanted)
            .ok_or_else(|| ParseError::UnknownCheckpoint(s.to_string()))
    }
}

/// A checkpoint setting that is not a path is a logical name.
pub fn looks_like_path(value: &str) -> bool {
    std::path::Path::new(value).is_absolute() || value.contains(['/', '\\']) || value.ends_with(".pt")
}

/// Parses a logical checkpoint name and checks it suits `stage`.
pub fn parse_checkpoint_name(value: &str, stage: StageKind) -> Result<CheckpointName, ParseError> {
    let name: CheckpointName = value.parse()?;
    if name.stage() != stage {
        return Err(ParseError::WrongStage {
            name: value.to_string(),
            expected: name.stage(),
            found: stage,
        });
    }
    Ok(name)
}
