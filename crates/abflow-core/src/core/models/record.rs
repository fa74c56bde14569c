use super::chain::{Chain, ChainRole};
use super::loops::LoopLabel;
use super::metadata::Metadata;
use super::residue::Residue;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("A structure record must contain a Heavy chain")]
    MissingHeavyChain,
    #[error("Chain order violates Heavy, Light, Target: found {found}")]
    ChainOrder { found: String },
    #[error("Chain #{index} ({role}) has no residues")]
    EmptyChain { index: usize, role: ChainRole },
    #[error("Residue {position} of chain #{index} ({name}) has no atoms")]
    EmptyResidue {
        index: usize,
        position: usize,
        name: String,
    },
    #[error("Structure has {count} residues; absolute numbering allows at most {max}", max = MAX_RESIDUES)]
    TooManyResidues { count: usize },
    #[error("Loop {label} has no residue positions")]
    EmptyLoop { label: LoopLabel },
    #[error("Loop {label} references position {position}, outside the structure (1..={total})")]
    LoopOutOfRange {
        label: LoopLabel,
        position: usize,
        total: usize,
    },
    #[error("Loop {label} references position {position}, which is not in its {expected} chain")]
    LoopOutsideChain {
        label: LoopLabel,
        position: usize,
        expected: ChainRole,
    },
    #[error("Fixed-residue computation requires an H-L-T or H-T chain layout, found {found}")]
    UnsupportedLayout { found: String },
    #[error("A target structure must contain only Target chains, found {found}")]
    NotATarget { found: String },
}

/// Largest residue count a structure may have: HLT files number residues absolutely and
/// the PDB residue-number field holds four digits.
pub const MAX_RESIDUES: usize = 9999;

fn layout_string(chains: &[Chain]) -> String {
    chains.iter().map(|c| c.role.letter()).collect()
}

/// Checks that every chain and every residue carries content and that the whole
/// structure fits the residue-number field.
fn validate_contents(chains: &[Chain]) -> Result<(), RecordError> {
    for (index, chain) in chains.iter().enumerate() {
        if chain.is_empty() {
            return Err(RecordError::EmptyChain {
                index,
                role: chain.role,
            });
        }
        if let Some(offset) = chain.residues.iter().position(|r| r.atoms.is_empty()) {
            return Err(RecordError::EmptyResidue {
                index,
                position: offset + 1,
                name: chain.residues[offset].name.clone(),
            });
        }
    }
    let count: usize = chains.iter().map(Chain::len).sum();
    if count > MAX_RESIDUES {
        return Err(RecordError::TooManyResidues { count });
    }
    Ok(())
}

/// Chain-local, 1-indexed residue positions that must keep their identity in one chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedResidues {
    pub chain_index: usize,
    pub role: ChainRole,
    pub positions: Vec<usize>,
}

/// One molecular structure with HLT chain roles, CDR loop annotations and metadata.
///
/// A record is validated on construction and is not mutated structurally afterwards:
/// the chain layout and loop positions are fixed, and a stage that changes a structure
/// produces a new record. Only the tag and the metadata may be updated in place by
/// the current owner.
#[derive(Debug, Clone, PartialEq)]
pub struct StructureRecord {
    tag: String,
    chains: Vec<Chain>,
    /// Absolute (cross-chain), 1-based, sorted and deduplicated residue positions.
    loops: BTreeMap<LoopLabel, Vec<usize>>,
    metadata: Metadata,
}

impl StructureRecord {
    /// Creates a record after checking every HLT invariant.
    ///
    /// # Arguments
    ///
    /// * `tag` - The record name, unique within a batch. May be empty for untagged data.
    /// * `chains` - Chains in file order. Must be Heavy, then an optional Light, then any
    ///   number of Target chains.
    /// * `loops` - Absolute 1-based positions per loop label, in any order.
    ///
    /// # Errors
    ///
    /// Returns a [`RecordError`] if the chain order is wrong, a chain or residue is empty,
    /// the structure exceeds [`MAX_RESIDUES`], or a loop position lies outside the chain
    /// its label belongs to.
    pub fn new(
        tag: impl Into<String>,
        chains: Vec<Chain>,
        loops: BTreeMap<LoopLabel, Vec<usize>>,
    ) -> Result<Self, RecordError> {
        Self::validate_chain_order(&chains)?;
        validate_contents(&chains)?;

        let mut record = Self {
            tag: tag.into(),
            chains,
            loops: BTreeMap::new(),
            metadata: Metadata::new(),
        };

        let total = record.total_len();
        for (label, positions) in loops {
            let positions: Vec<usize> = positions
                .into_iter()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            if positions.is_empty() {
                return Err(RecordError::EmptyLoop { label });
            }
            let expected = label.chain_role();
            for &position in &positions {
                let chain_index = record
                    .locate(position)
                    .map(|(index, _)| index)
                    .ok_or(RecordError::LoopOutOfRange {
                        label,
                        position,
                        total,
                    })?;
                if record.chains[chain_index].role != expected {
                    return Err(RecordError::LoopOutsideChain {
                        label,
                        position,
                        expected,
                    });
                }
            }
            record.loops.insert(label, positions);
        }

        Ok(record)
    }

    fn validate_chain_order(chains: &[Chain]) -> Result<(), RecordError> {
        let Some(first) = chains.first() else {
            return Err(RecordError::MissingHeavyChain);
        };
        if first.role != ChainRole::Heavy {
            return if chains.iter().any(|c| c.role == ChainRole::Heavy) {
                Err(RecordError::ChainOrder {
                    found: layout_string(chains),
                })
            } else {
                Err(RecordError::MissingHeavyChain)
            };
        }

        // Heavy and Light appear at most once; Target may repeat. The derived role
        // ordering matches the mandated chain order.
        for pair in chains.windows(2) {
            let (prev, next) = (pair[0].role, pair[1].role);
            let ok = prev < next || (prev == ChainRole::Target && next == ChainRole::Target);
            if !ok {
                return Err(RecordError::ChainOrder {
                    found: layout_string(chains),
                });
            }
        }
        Ok(())
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn set_tag(&mut self, tag: impl Into<String>) {
        self.tag = tag.into();
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    pub fn chains(&self) -> &[Chain] {
        &self.chains
    }

    pub fn heavy(&self) -> &Chain {
        // `new` guarantees the first chain is Heavy.
        &self.chains[0]
    }

    pub fn light(&self) -> Option<&Chain> {
        self.chains.iter().find(|c| c.role == ChainRole::Light)
    }

    pub fn targets(&self) -> impl Iterator<Item = &Chain> {
        self.chains.iter().filter(|c| c.role == ChainRole::Target)
    }

    pub fn has_light(&self) -> bool {
        self.light().is_some()
    }

    pub fn has_target(&self) -> bool {
        self.targets().next().is_some()
    }

    pub fn loops(&self) -> &BTreeMap<LoopLabel, Vec<usize>> {
        &self.loops
    }

    pub fn loop_positions(&self, label: LoopLabel) -> Option<&[usize]> {
        self.loops.get(&label).map(Vec::as_slice)
    }

    /// Number of annotated residues per loop label.
    pub fn loop_lengths(&self) -> BTreeMap<LoopLabel, usize> {
        self.loops
            .iter()
            .map(|(label, positions)| (*label, positions.len()))
            .collect()
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Total residue count across all chains.
    pub fn total_len(&self) -> usize {
        self.chains.iter().map(Chain::len).sum()
    }

    /// Absolute position of the first residue of every chain, in chain order.
    pub fn chain_starts(&self) -> Vec<usize> {
        let mut start = 1;
        self.chains
            .iter()
            .map(|chain| {
                let current = start;
                start += chain.len();
                current
            })
            .collect()
    }

    /// Maps an absolute 1-based position to `(chain index, chain-local 1-based position)`.
    ///
    /// # Return
    ///
    /// Returns `None` if the position is zero or past the last residue.
    pub fn locate(&self, absolute: usize) -> Option<(usize, usize)> {
        if absolute == 0 {
            return None;
        }
        let mut offset = 0;
        for (index, chain) in self.chains.iter().enumerate() {
            if absolute <= offset + chain.len() {
                return Some((index, absolute - offset));
            }
            offset += chain.len();
        }
        None
    }

    pub fn residue_at(&self, absolute: usize) -> Option<&Residue> {
        self.locate(absolute)
            .map(|(chain, local)| &self.chains[chain].residues[local - 1])
    }

    /// Iterates over `(absolute position, chain role, residue)` in file order.
    pub fn residues(&self) -> impl Iterator<Item = (usize, ChainRole, &Residue)> {
        self.chains
            .iter()
            .flat_map(|chain| chain.residues.iter().map(move |r| (chain.role, r)))
            .enumerate()
            .map(|(i, (role, residue))| (i + 1, role, residue))
    }

    /// Absolute positions of every residue in chains with the given role.
    pub fn positions_of(&self, role: ChainRole) -> Vec<usize> {
        self.residues()
            .filter(|(_, r, _)| *r == role)
            .map(|(pos, _, _)| pos)
            .collect()
    }

    /// Absolute positions of every residue covered by any loop annotation.
    pub fn all_loop_positions(&self) -> BTreeSet<usize> {
        self.loops.values().flatten().copied().collect()
    }

    /// One-letter sequence of the whole structure, chains concatenated in order.
    pub fn sequence(&self) -> String {
        self.chains.iter().map(Chain::sequence).collect()
    }

    /// Per-chain one-letter sequences in chain order.
    pub fn chain_sequences(&self) -> Vec<(ChainRole, String)> {
        self.chains.iter().map(|c| (c.role, c.sequence())).collect()
    }

    /// Computes the residues that must NOT be redesigned, chain by chain.
    ///
    /// Every antibody residue outside the requested loops is fixed, and every target
    /// chain is fully fixed. Requested labels that are not annotated on this record are
    /// ignored, leaving their chain fully fixed at those positions.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::UnsupportedLayout`] unless the chain layout is H-L-T or H-T
    /// (one or more target chains).
    pub fn fixed_residues(
        &self,
        design: &BTreeSet<LoopLabel>,
    ) -> Result<Vec<FixedResidues>, RecordError> {
        if !self.has_target() {
            return Err(RecordError::UnsupportedLayout {
                found: layout_string(&self.chains),
            });
        }

        let designed: BTreeSet<usize> = self
            .loops
            .iter()
            .filter(|(label, _)| design.contains(label))
            .flat_map(|(_, positions)| positions.iter().copied())
            .collect();

        let starts = self.chain_starts();
        Ok(self
            .chains
            .iter()
            .zip(starts)
            .enumerate()
            .map(|(chain_index, (chain, start))| {
                let positions = (1..=chain.len())
                    .filter(|local| {
                        chain.role == ChainRole::Target
                            || !designed.contains(&(start + local - 1))
                    })
                    .collect();
                FixedResidues {
                    chain_index,
                    role: chain.role,
                    positions,
                }
            })
            .collect())
    }
}

/// A target-only structure (one or more Target chains), the antigen given to backbone
/// generation.
///
/// Residues are addressed by their target-local, 1-based position across the
/// concatenated Target chains.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetStructure {
    tag: String,
    chains: Vec<Chain>,
}

impl TargetStructure {
    pub fn new(tag: impl Into<String>, chains: Vec<Chain>) -> Result<Self, RecordError> {
        if chains.is_empty() || chains.iter().any(|c| c.role != ChainRole::Target) {
            return Err(RecordError::NotATarget {
                found: layout_string(&chains),
            });
        }
        validate_contents(&chains)?;
        Ok(Self {
            tag: tag.into(),
            chains,
        })
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn set_tag(&mut self, tag: impl Into<String>) {
        self.tag = tag.into();
    }

    pub fn chains(&self) -> &[Chain] {
        &self.chains
    }

    pub fn len(&self) -> usize {
        self.chains.iter().map(Chain::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StructureRecord {
    /// Number of antibody residues preceding the first Target residue.
    pub fn target_offset(&self) -> usize {
        self.chains
            .iter()
            .filter(|c| c.role.is_antibody())
            .map(Chain::len)
            .sum()
    }

    /// Total residue count of all Target chains.
    pub fn target_len(&self) -> usize {
        self.targets().map(Chain::len).sum()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::models::atom::Atom;
    use nalgebra::Point3;

    pub(crate) fn residue(name: &str, x: f64) -> Residue {
        Residue::with_atoms(
            name,
            vec![
                Atom::new("N", Point3::new(x, 0.0, 0.0)),
                Atom::new("CA", Point3::new(x + 1.0, 0.5, 0.0)),
                Atom::new("C", Point3::new(x + 2.0, 0.0, 0.0)),
                Atom::new("O", Point3::new(x + 2.5, -1.0, 0.0)),
                Atom::new("CB", Point3::new(x + 1.0, 1.5, 0.5)),
            ],
        )
    }

    pub(crate) fn chain(role: ChainRole, len: usize, offset: f64) -> Chain {
        let names = ["GLY", "SER", "TYR", "ALA", "ARG"];
        Chain::new(
            role,
            (0..len)
                .map(|i| residue(names[i % names.len()], offset + i as f64 * 4.0))
                .collect(),
        )
    }

    /// Heavy(10) + Light(8) + Target(6) with H3 at 4..=6 and L1 at 12..=13.
    pub(crate) fn sample_record() -> StructureRecord {
        let mut loops = BTreeMap::new();
        loops.insert(LoopLabel::H3, vec![6, 4, 5]);
        loops.insert(LoopLabel::L1, vec![12, 13]);
        StructureRecord::new(
            "sample",
            vec![
                chain(ChainRole::Heavy, 10, 0.0),
                chain(ChainRole::Light, 8, 100.0),
                chain(ChainRole::Target, 6, 200.0),
            ],
            loops,
        )
        .unwrap()
    }

    #[test]
    fn new_sorts_loop_positions() {
        let record = sample_record();
        assert_eq!(record.loop_positions(LoopLabel::H3), Some(&[4, 5, 6][..]));
        assert_eq!(record.total_len(), 24);
        assert_eq!(record.chain_starts(), vec![1, 11, 19]);
    }

    #[test]
    fn new_rejects_missing_heavy_chain() {
        let result = StructureRecord::new(
            "x",
            vec![chain(ChainRole::Light, 3, 0.0)],
            BTreeMap::new(),
        );
        assert_eq!(result, Err(RecordError::MissingHeavyChain));
    }

    #[test]
    fn new_rejects_wrong_chain_order() {
        let result = StructureRecord::new(
            "x",
            vec![
                chain(ChainRole::Heavy, 3, 0.0),
                chain(ChainRole::Target, 3, 0.0),
                chain(ChainRole::Light, 3, 0.0),
            ],
            BTreeMap::new(),
        );
        assert_eq!(
            result,
            Err(RecordError::ChainOrder {
                found: "HTL".into()
            })
        );
    }

    #[test]
    fn new_accepts_multiple_targets_but_not_two_heavies() {
        let ok = StructureRecord::new(
            "x",
            vec![
                chain(ChainRole::Heavy, 3, 0.0),
                chain(ChainRole::Target, 3, 0.0),
                chain(ChainRole::Target, 2, 0.0),
            ],
            BTreeMap::new(),
        );
        assert!(ok.is_ok());
        let bad = StructureRecord::new(
            "x",
            vec![chain(ChainRole::Heavy, 3, 0.0), chain(ChainRole::Heavy, 3, 0.0)],
            BTreeMap::new(),
        );
        assert!(matches!(bad, Err(RecordError::ChainOrder { .. })));
    }

    #[test]
    fn new_rejects_loops_outside_their_chain() {
        let mut loops = BTreeMap::new();
        loops.insert(LoopLabel::H1, vec![4]);
        let result = StructureRecord::new(
            "x",
            vec![chain(ChainRole::Heavy, 3, 0.0), chain(ChainRole::Light, 3, 0.0)],
            loops.clone(),
        );
        assert_eq!(
            result,
            Err(RecordError::LoopOutsideChain {
                label: LoopLabel::H1,
                position: 4,
                expected: ChainRole::Heavy
            })
        );

        loops.insert(LoopLabel::H1, vec![7]);
        let result = StructureRecord::new(
            "x",
            vec![chain(ChainRole::Heavy, 3, 0.0), chain(ChainRole::Light, 3, 0.0)],
            loops,
        );
        assert!(matches!(result, Err(RecordError::LoopOutOfRange { position: 7, total: 6, .. })));
    }

    #[test]
    fn new_rejects_residues_without_atoms() {
        let mut heavy = chain(ChainRole::Heavy, 3, 0.0);
        heavy.residues[1] = Residue::new("SER");
        let mut loops = BTreeMap::new();
        loops.insert(LoopLabel::H3, vec![3]);
        assert_eq!(
            StructureRecord::new("x", vec![heavy], loops),
            Err(RecordError::EmptyResidue {
                index: 0,
                position: 2,
                name: "SER".into()
            })
        );

        let mut target = chain(ChainRole::Target, 2, 0.0);
        target.residues[0].atoms.clear();
        assert!(matches!(
            TargetStructure::new("t", vec![target]),
            Err(RecordError::EmptyResidue { index: 0, position: 1, .. })
        ));
    }

    #[test]
    fn residue_count_is_bounded_by_the_number_field() {
        let at_limit = StructureRecord::new(
            "x",
            vec![
                chain(ChainRole::Heavy, 5, 0.0),
                chain(ChainRole::Target, MAX_RESIDUES - 5, 0.0),
            ],
            BTreeMap::new(),
        );
        assert!(at_limit.is_ok());

        let over = StructureRecord::new(
            "x",
            vec![
                chain(ChainRole::Heavy, 5, 0.0),
                chain(ChainRole::Target, MAX_RESIDUES - 4, 0.0),
            ],
            BTreeMap::new(),
        );
        assert_eq!(
            over,
            Err(RecordError::TooManyResidues {
                count: MAX_RESIDUES + 1
            })
        );
        assert!(matches!(
            TargetStructure::new("t", vec![chain(ChainRole::Target, MAX_RESIDUES + 1, 0.0)]),
            Err(RecordError::TooManyResidues { .. })
        ));
    }

    #[test]
    fn locate_maps_absolute_to_chain_local() {
        let record = sample_record();
        assert_eq!(record.locate(1), Some((0, 1)));
        assert_eq!(record.locate(11), Some((1, 1)));
        assert_eq!(record.locate(24), Some((2, 6)));
        assert_eq!(record.locate(0), None);
        assert_eq!(record.locate(25), None);
    }

    #[test]
    fn fixed_residues_are_chain_local_and_target_is_fully_fixed() {
        let record = sample_record();
        let design: BTreeSet<_> = [LoopLabel::H3, LoopLabel::L1].into_iter().collect();
        let fixed = record.fixed_residues(&design).unwrap();
        assert_eq!(fixed.len(), 3);
        assert_eq!(fixed[0].positions, vec![1, 2, 3, 7, 8, 9, 10]);
        assert_eq!(fixed[1].positions, vec![1, 4, 5, 6, 7, 8]);
        assert_eq!(fixed[2].positions, (1..=6).collect::<Vec<_>>());
    }

    #[test]
    fn fixed_residues_ignores_loops_not_requested() {
        let record = sample_record();
        let design: BTreeSet<_> = [LoopLabel::H3].into_iter().collect();
        let fixed = record.fixed_residues(&design).unwrap();
        assert_eq!(fixed[1].positions, (1..=8).collect::<Vec<_>>());
    }

    #[test]
    fn fixed_residues_requires_a_target() {
        let record = StructureRecord::new(
            "x",
            vec![chain(ChainRole::Heavy, 3, 0.0)],
            BTreeMap::new(),
        )
        .unwrap();
        assert_eq!(
            record.fixed_residues(&BTreeSet::new()),
            Err(RecordError::UnsupportedLayout { found: "H".into() })
        );
    }

    #[test]
    fn target_offset_counts_antibody_residues() {
        let record = sample_record();
        assert_eq!(record.target_offset(), 18);
        assert_eq!(record.target_len(), 6);
    }

    #[test]
    fn target_structure_rejects_antibody_chains() {
        assert!(TargetStructure::new("t", vec![chain(ChainRole::Target, 4, 0.0)]).is_ok());
        assert_eq!(
            TargetStructure::new("t", vec![chain(ChainRole::Heavy, 4, 0.0)]),
            Err(RecordError::NotATarget { found: "H".into() })
        );
        assert!(TargetStructure::new("t", vec![]).is_err());
    }

    #[test]
    fn sequence_concatenates_chains() {
        let record = sample_record();
        assert_eq!(record.sequence().len(), 24);
        assert!(record.sequence().starts_with("GSYAR"));
    }
}
