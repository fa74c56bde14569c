//! Conversion of Chothia-numbered antibody/antigen complexes into HLT records.

use super::pdb::{self, AtomRecord, PdbError, PdbLine};
use crate::core::models::atom::Atom;
use crate::core::models::chain::{Chain, ChainRole};
use crate::core::models::loops::LoopLabel;
use crate::core::models::record::{RecordError, StructureRecord};
use crate::core::models::residue::Residue;
use crate::core::utils::identifiers;
use std::collections::{BTreeMap, HashMap};
use std::io::{self, BufRead};
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_HEAVY_CROP: isize = 115;
pub const DEFAULT_LIGHT_CROP: isize = 110;

#[derive(Debug, Error)]
pub enum ChothiaError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Pdb(#[from] PdbError),
    #[error("Chain '{0}' has no standard amino-acid residues in the input structure")]
    ChainNotFound(char),
    #[error("Invalid target crop '{0}': expected chain:start-end[,chain:start-end...]")]
    InvalidCrop(String),
    #[error("Converted structure is not valid HLT: {0}")]
    Record(#[from] RecordError),
}

/// Inclusive Chothia residue windows of the CDR loops.
pub fn chothia_window(label: LoopLabel) -> (isize, isize) {
    match label {
        LoopLabel::H1 => (26, 32),
        LoopLabel::H2 => (52, 56),
        LoopLabel::H3 => (95, 102),
        LoopLabel::L1 => (24, 34),
        LoopLabel::L2 => (50, 56),
        LoopLabel::L3 => (89, 97),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChothiaOptions {
    pub heavy: char,
    pub light: Option<char>,
    pub targets: Vec<char>,
    /// Keep the whole Fab instead of cropping after `heavy_crop`/`light_crop`.
    pub whole_fab: bool,
    pub heavy_crop: isize,
    pub light_crop: isize,
    pub target_crops: BTreeMap<char, (isize, isize)>,
}

impl ChothiaOptions {
    pub fn new(heavy: char) -> Self {
        Self {
            heavy,
            light: None,
            targets: Vec::new(),
            whole_fab: false,
            heavy_crop: DEFAULT_HEAVY_CROP,
            light_crop: DEFAULT_LIGHT_CROP,
            target_crops: BTreeMap::new(),
        }
    }
}

/// Parses `A:5-90,B:10-200` into per-chain inclusive residue ranges.
pub fn parse_target_crops(s: &str) -> Result<BTreeMap<char, (isize, isize)>, ChothiaError> {
    let invalid = || ChothiaError::InvalidCrop(s.to_string());
    let mut crops = BTreeMap::new();
    for entry in s.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (chain, range) = entry.split_once(':').ok_or_else(invalid)?;
        let mut chars = chain.trim().chars();
        let (Some(chain), None) = (chars.next(), chars.next()) else {
            return Err(invalid());
        };
        // Split on the separating dash, allowing a negative start.
        let split_at = range
            .char_indices()
            .skip(1)
            .find(|(_, c)| *c == '-')
            .map(|(i, _)| i)
            .ok_or_else(invalid)?;
        let start: isize = range[..split_at].trim().parse().map_err(|_| invalid())?;
        let end: isize = range[split_at + 1..].trim().parse().map_err(|_| invalid())?;
        if start > end {
            return Err(invalid());
        }
        crops.insert(chain, (start, end));
    }
    Ok(crops)
}

struct NumberedResidue {
    number: isize,
    residue: Residue,
}

fn read_chains(reader: &mut impl BufRead) -> Result<HashMap<char, Vec<NumberedResidue>>, ChothiaError> {
    let mut chains: HashMap<char, Vec<NumberedResidue>> = HashMap::new();
    let mut last_key: Option<(char, isize, char)> = None;

    for (index, line_res) in reader.lines().enumerate() {
        let line = line_res?;
        let record: AtomRecord = match pdb::parse_line(&line, index + 1)? {
            PdbLine::Atom(atom) => atom,
            // First model only.
            PdbLine::End => break,
            _ => continue,
        };
        if !identifiers::is_standard_residue(&record.res_name)
            || !matches!(record.alt_loc, ' ' | 'A')
        {
            continue;
        }

        let key = (record.chain_id, record.res_seq, record.insertion_code);
        let residues = chains.entry(record.chain_id).or_default();
        if last_key != Some(key) || residues.is_empty() {
            residues.push(NumberedResidue {
                number: record.res_seq,
                residue: Residue::new(&record.res_name),
            });
            last_key = Some(key);
        }
        if let Some(current) = residues.last_mut() {
            let mut atom = Atom::new(&record.name, record.position);
            atom.occupancy = record.occupancy;
            atom.b_factor = record.b_factor;
            if !record.element.is_empty() {
                atom.element = record.element;
            }
            current.residue.atoms.push(atom);
        }
    }
    Ok(chains)
}

/// Converts a Chothia-numbered structure into an HLT record.
///
/// Only the 20 standard amino acids are kept. Heavy and light chains are cropped after
/// the configured Chothia residue unless `whole_fab` is set, target chains are cropped to
/// their optional ranges and concatenated into a single Target chain, residues are
/// renumbered absolutely, and CDR loops are annotated from the Chothia windows.
pub fn convert(
    reader: &mut impl BufRead,
    options: &ChothiaOptions,
) -> Result<StructureRecord, ChothiaError> {
    let mut source = read_chains(reader)?;
    let mut take = |id: char| source.remove(&id).ok_or(ChothiaError::ChainNotFound(id));

    let mut loops: BTreeMap<LoopLabel, Vec<usize>> = BTreeMap::new();
    let mut chains = Vec::new();
    let mut absolute = 1;

    let antibody = [
        (ChainRole::Heavy, Some(options.heavy), options.heavy_crop),
        (ChainRole::Light, options.light, options.light_crop),
    ];
    for (role, id, crop) in antibody {
        let Some(id) = id else { continue };
        let labels: Vec<LoopLabel> = LoopLabel::ALL
            .into_iter()
            .filter(|l| l.chain_role() == role)
            .collect();
        let mut residues = Vec::new();
        for numbered in take(id)? {
            if !options.whole_fab && numbered.number > crop {
                continue;
            }
            for label in &labels {
                let (start, end) = chothia_window(*label);
                if (start..=end).contains(&numbered.number) {
                    loops.entry(*label).or_default().push(absolute);
                }
            }
            residues.push(numbered.residue);
            absolute += 1;
        }
        debug!(chain = %id, ?role, residues = residues.len(), "Converted antibody chain");
        chains.push(Chain::new(role, residues));
    }

    for id in options.target_crops.keys() {
        if !options.targets.contains(id) {
            warn!(chain = %id, "Crop given for a chain that is not a target; ignoring it");
        }
    }

    let mut target = Vec::new();
    for &id in &options.targets {
        let range = options.target_crops.get(&id);
        target.extend(
            take(id)?
                .into_iter()
                .filter(|n| range.is_none_or(|(start, end)| (*start..=*end).contains(&n.number)))
                .map(|n| n.residue),
        );
    }
    if !target.is_empty() {
        chains.push(Chain::new(ChainRole::Target, target));
    }

    Ok(StructureRecord::new(String::new(), chains, loops)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;
    use std::io::{BufReader, Cursor};

    fn line(serial: usize, res: &str, chain: char, seq: isize, icode: char) -> String {
        pdb::format_atom(&AtomRecord {
            hetero: false,
            serial,
            name: "CA".into(),
            alt_loc: ' ',
            res_name: res.into(),
            chain_id: chain,
            res_seq: seq,
            insertion_code: icode,
            position: Point3::new(seq as f64, 0.0, 0.0),
            occupancy: 1.0,
            b_factor: 0.0,
            element: "C".into(),
        })
    }

    fn input() -> String {
        let mut lines = Vec::new();
        let mut serial = 1;
        for seq in 24..=34 {
            lines.push(line(serial, "SER", 'B', seq, ' '));
            serial += 1;
        }
        lines.push(line(serial, "GLY", 'B', 100, ' '));
        lines.push(line(serial + 1, "GLY", 'B', 100, 'A'));
        lines.push(line(serial + 2, "TYR", 'B', 116, ' '));
        lines.push(line(serial + 3, "HOH", 'B', 300, ' '));
        lines.push(line(serial + 4, "ALA", 'C', 23, ' '));
        lines.push(line(serial + 5, "ALA", 'C', 24, ' '));
        lines.push(line(serial + 6, "LYS", 'A', 5, ' '));
        lines.push(line(serial + 7, "LYS", 'A', 6, ' '));
        lines.push(line(serial + 8, "LYS", 'A', 7, ' '));
        lines.join("\n")
    }

    fn run(options: &ChothiaOptions) -> Result<StructureRecord, ChothiaError> {
        convert(&mut BufReader::new(Cursor::new(input().into_bytes())), options)
    }

    #[test]
    fn converts_with_crops_windows_and_renumbering() {
        let mut options = ChothiaOptions::new('B');
        options.light = Some('C');
        options.targets = vec!['A'];
        options.target_crops = parse_target_crops("A:6-7").unwrap();
        let record = run(&options).unwrap();

        // 11 residues 24..=34, 100, 100A; 116 is cropped and HOH dropped.
        assert_eq!(record.heavy().len(), 13);
        assert_eq!(record.light().unwrap().len(), 2);
        assert_eq!(record.targets().next().unwrap().len(), 2);
        assert_eq!(record.loop_positions(LoopLabel::H1), Some(&[3, 4, 5, 6, 7, 8, 9][..]));
        assert_eq!(record.loop_positions(LoopLabel::H3), Some(&[12, 13][..]));
        assert_eq!(record.loop_positions(LoopLabel::L1), Some(&[15][..]));
        assert!(record.loop_positions(LoopLabel::H2).is_none());
    }

    #[test]
    fn whole_fab_keeps_residues_past_the_crop() {
        let mut options = ChothiaOptions::new('B');
        options.whole_fab = true;
        let record = run(&options).unwrap();
        assert_eq!(record.heavy().len(), 14);
        assert!(!record.has_light());
    }

    #[test]
    fn missing_chain_is_an_error() {
        let mut options = ChothiaOptions::new('B');
        options.light = Some('Z');
        assert!(matches!(run(&options), Err(ChothiaError::ChainNotFound('Z'))));
    }

    #[test]
    fn parse_target_crops_accepts_multiple_chains() {
        let crops = parse_target_crops("A:5-90, B:-3-10").unwrap();
        assert_eq!(crops.get(&'A'), Some(&(5, 90)));
        assert_eq!(crops.get(&'B'), Some(&(-3, 10)));
        assert!(parse_target_crops("").unwrap().is_empty());
    }

    #[test]
    fn parse_target_crops_rejects_malformed_entries() {
        for bad in ["A5-90", "AB:5-90", "A:5", "A:x-9", "A:9-5"] {
            assert!(
                matches!(parse_target_crops(bad), Err(ChothiaError::InvalidCrop(_))),
                "{bad} should be rejected"
            );
        }
    }
}
