use crate::core::models::chain::ChainRole;
use crate::core::models::record::StructureRecord;
use itertools::Itertools;
use kiddo::{KdTree, SquaredEuclidean};
use rand::Rng;
use rand::seq::index;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum HotspotError {
    #[error("Reveal proportion must lie in [0, 1], got {0}")]
    InvalidProportion(f64),
    #[error("Malformed hotspot '{0}' (expected T<position>, e.g. T305)")]
    MalformedToken(String),
    #[error("Hotspot T{position} is outside the target (1..={target_len})")]
    OutOfRange { position: usize, target_len: usize },
}

/// A target residue addressed by its 1-based position across the concatenated Target
/// chains, written `T<position>`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct HotspotRef {
    pub position: usize,
}

impl HotspotRef {
    pub fn new(position: usize) -> Self {
        Self { position }
    }

    /// Parses a comma-separated list such as `T305,T456`.
    pub fn parse_list(s: &str) -> Result<Vec<Self>, HotspotError> {
        s.split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::parse)
            .collect()
    }

    /// Renders a list back into its comma-separated form.
    pub fn join(hotspots: &[Self]) -> String {
        hotspots.iter().join(",")
    }

    pub fn validate(&self, target_len: usize) -> Result<(), HotspotError> {
        if self.position == 0 || self.position > target_len {
            return Err(HotspotError::OutOfRange {
                position: self.position,
                target_len,
            });
        }
        Ok(())
    }
}

impl FromStr for HotspotRef {
    type Err = HotspotError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || HotspotError::MalformedToken(s.to_string());
        let digits = s
            .trim()
            .strip_prefix(['T', 't'])
            .ok_or_else(malformed)?;
        let position: usize = digits.parse().map_err(|_| malformed())?;
        if position == 0 {
            return Err(malformed());
        }
        Ok(Self { position })
    }
}

impl TryFrom<String> for HotspotRef {
    type Error = HotspotError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<HotspotRef> for String {
    fn from(hotspot: HotspotRef) -> Self {
        hotspot.to_string()
    }
}

impl fmt::Display for HotspotRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.position)
    }
}

/// Selects `round(p * n)` of the `n` candidates without replacement.
///
/// The selected items keep their relative candidate order. `p = 0` always yields an
/// empty set and `p = 1` the full candidate set; half-way products round away from zero.
///
/// # Errors
///
/// Returns [`HotspotError::InvalidProportion`] unless `0 <= p <= 1`.
pub fn select<T: Clone, R: Rng + ?Sized>(
    candidates: &[T],
    proportion: f64,
    rng: &mut R,
) -> Result<Vec<T>, HotspotError> {
    if !(0.0..=1.0).contains(&proportion) {
        return Err(HotspotError::InvalidProportion(proportion));
    }
    let n = candidates.len();
    let k = ((proportion * n as f64).round() as usize).min(n);
    let mut picked = index::sample(rng, n, k).into_vec();
    picked.sort_unstable();
    Ok(picked.into_iter().map(|i| candidates[i].clone()).collect())
}

/// Target residues in contact with the designed loops.
///
/// A target residue is a candidate when its representative atom (CB, or CA for glycine)
/// lies within `cutoff` Angstroms of the representative atom of any loop residue.
/// Returns target-local references in target order; empty when the record has no
/// loops or no target.
pub fn contact_candidates(record: &StructureRecord, cutoff: f64) -> Vec<HotspotRef> {
    let loop_points: Vec<[f64; 3]> = record
        .all_loop_positions()
        .into_iter()
        .filter_map(|pos| record.residue_at(pos))
        .filter_map(|residue| residue.representative_atom())
        .map(|atom| [atom.position.x, atom.position.y, atom.position.z])
        .collect();
    if loop_points.is_empty() {
        return Vec::new();
    }

    let kdtree: KdTree<f64, 3> = (&loop_points).into();
    let cutoff_sq = cutoff * cutoff;
    let offset = record.target_offset();

    record
        .residues()
        .filter(|(_, role, _)| *role == ChainRole::Target)
        .filter_map(|(absolute, _, residue)| {
            let atom = residue.representative_atom()?;
            let query = [atom.position.x, atom.position.y, atom.position.z];
            let nearest = kdtree.nearest_one::<SquaredEuclidean>(&query);
            (nearest.distance <= cutoff_sq).then(|| HotspotRef::new(absolute - offset))
        })
        .collect()
}
