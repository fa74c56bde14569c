use super::chain::ChainRole;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A complementarity-determining region (CDR) loop label.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum LoopLabel {
    H1,
    H2,
    H3,
    L1,
    L2,
    L3,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown loop label '{0}' (expected one of H1, H2, H3, L1, L2, L3)")]
pub struct ParseLoopLabelError(pub String);

impl LoopLabel {
    pub const ALL: [LoopLabel; 6] = [
        LoopLabel::H1,
        LoopLabel::H2,
        LoopLabel::H3,
        LoopLabel::L1,
        LoopLabel::L2,
        LoopLabel::L3,
    ];

    /// The chain a loop with this label belongs to.
    pub fn chain_role(self) -> ChainRole {
        match self {
            LoopLabel::H1 | LoopLabel::H2 | LoopLabel::H3 => ChainRole::Heavy,
            LoopLabel::L1 | LoopLabel::L2 | LoopLabel::L3 => ChainRole::Light,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LoopLabel::H1 => "H1",
            LoopLabel::H2 => "H2",
            LoopLabel::H3 => "H3",
            LoopLabel::L1 => "L1",
            LoopLabel::L2 => "L2",
            LoopLabel::L3 => "L3",
        }
    }
}

impl FromStr for LoopLabel {
    type Err = ParseLoopLabelError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "H1" => Ok(LoopLabel::H1),
            "H2" => Ok(LoopLabel::H2),
            "H3" => Ok(LoopLabel::H3),
            "L1" => Ok(LoopLabel::L1),
            "L2" => Ok(LoopLabel::L2),
            "L3" => Ok(LoopLabel::L3),
            _ => Err(ParseLoopLabelError(s.to_string())),
        }
    }
}

impl fmt::Display for LoopLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
