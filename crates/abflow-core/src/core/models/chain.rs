use super::residue::Residue;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The role a chain plays in an HLT structure.
///
/// The derived ordering is the mandated HLT chain order: Heavy, then Light, then Target.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum ChainRole {
    Heavy,
    Light,
    Target,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid chain label '{0}' (expected one of H, L, T)")]
pub struct ParseChainRoleError(pub String);

impl ChainRole {
    /// The single-character chain identifier used in HLT files.
    pub fn letter(self) -> char {
        match self {
            ChainRole::Heavy => 'H',
            ChainRole::Light => 'L',
            ChainRole::Target => 'T',
        }
    }

    pub fn from_letter(letter: char) -> Result<Self, ParseChainRoleError> {
        match letter {
            'H' => Ok(ChainRole::Heavy),
            'L' => Ok(ChainRole::Light),
            'T' => Ok(ChainRole::Target),
            other => Err(ParseChainRoleError(other.to_string())),
        }
    }

    pub fn is_antibody(self) -> bool {
        matches!(self, ChainRole::Heavy | ChainRole::Light)
    }
}

impl FromStr for ChainRole {
    type Err = ParseChainRoleError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "h" | "heavy" => Ok(ChainRole::Heavy),
            "l" | "light" => Ok(ChainRole::Light),
            "t" | "target" => Ok(ChainRole::Target),
            _ => Err(ParseChainRoleError(s.to_string())),
        }
    }
}

impl fmt::Display for ChainRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                ChainRole::Heavy => "Heavy",
                ChainRole::Light => "Light",
                ChainRole::Target => "Target",
            }
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Chain {
    pub role: ChainRole,           // Role of the chain within the complex
    pub residues: Vec<Residue>,    // Residues in chain order; index + 1 is the chain-local position
}

impl Chain {
    pub fn new(role: ChainRole, residues: Vec<Residue>) -> Self {
        Self { role, residues }
    }

    pub fn len(&self) -> usize {
        self.residues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.residues.is_empty()
    }

    /// One-letter sequence of the chain.
    pub fn sequence(&self) -> String {
        self.residues.iter().map(Residue::one_letter).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_order_as_hlt() {
        let mut roles = vec![ChainRole::Target, ChainRole::Light, ChainRole::Heavy];
        roles.sort();
        assert_eq!(
            roles,
            vec![ChainRole::Heavy, ChainRole::Light, ChainRole::Target]
        );
    }

    #[test]
    fn letters_round_trip() {
        for role in [ChainRole::Heavy, ChainRole::Light, ChainRole::Target] {
            assert_eq!(ChainRole::from_letter(role.letter()), Ok(role));
        }
        assert_eq!(
            ChainRole::from_letter('A'),
            Err(ParseChainRoleError("A".into()))
        );
    }

    #[test]
    fn from_str_accepts_letters_and_names() {
        assert_eq!("heavy".parse::<ChainRole>(), Ok(ChainRole::Heavy));
        assert_eq!("L".parse::<ChainRole>(), Ok(ChainRole::Light));
        assert_eq!("Target".parse::<ChainRole>(), Ok(ChainRole::Target));
        assert!("antigen".parse::<ChainRole>().is_err());
    }

    #[test]
    fn sequence_uses_one_letter_codes() {
        let chain = Chain::new(
            ChainRole::Heavy,
            vec![Residue::new("GLU"), Residue::new("VAL"), Residue::new("UNK")],
        );
        assert_eq!(chain.sequence(), "EVX");
        assert_eq!(chain.len(), 3);
    }
}
