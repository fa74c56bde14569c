use super::pdb::{self, AtomRecord, PdbError, PdbLine};
use super::traits::StructureFile;
use crate::core::models::atom::Atom;
use crate::core::models::chain::{Chain, ChainRole};
use crate::core::models::loops::LoopLabel;
use crate::core::models::metadata::{Metadata, MetadataError};
use crate::core::models::record::{RecordError, StructureRecord, TargetStructure};
use crate::core::models::residue::Residue;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;
use thiserror::Error;

const LABEL_REMARK: &str = "PDBinfo-LABEL:";
const META_REMARK: &str = "PDBinfo-META:";

#[derive(Debug, Error)]
pub enum HltError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Pdb(#[from] PdbError),
    #[error("Line {line}: chain label '{chain}' is not one of H, L, T")]
    UnknownChain { line: usize, chain: char },
    #[error("Line {line}: malformed loop annotation '{content}'")]
    MalformedRemark { line: usize, content: String },
    #[error("Line {line}: invalid metadata remark: {source}")]
    InvalidMetadata {
        line: usize,
        #[source]
        source: MetadataError,
    },
    #[error("Invalid HLT structure: {0}")]
    Record(#[from] RecordError),
}

/// The HLT convention: a PDB variant whose chains are labelled H, L and T in that order,
/// with trailing `REMARK PDBinfo-LABEL` lines marking CDR loop residues by absolute
/// position.
pub struct HltFile;

#[derive(Default)]
struct ChainBuilder {
    chains: Vec<Chain>,
    current: Option<Chain>,
    current_residue: Option<(isize, char)>,
}

impl ChainBuilder {
    fn push_atom(&mut self, record: AtomRecord, role: ChainRole) {
        let starts_chain = self.current.as_ref().is_none_or(|c| c.role != role);
        if starts_chain {
            self.close_chain();
            self.current = Some(Chain::new(role, Vec::new()));
        }
        let Some(chain) = self.current.as_mut() else {
            return;
        };

        let key = (record.res_seq, record.insertion_code);
        if starts_chain || self.current_residue != Some(key) {
            chain.residues.push(Residue::new(&record.res_name));
            self.current_residue = Some(key);
        }
        if let Some(residue) = chain.residues.last_mut() {
            let mut atom = Atom::new(&record.name, record.position);
            atom.occupancy = record.occupancy;
            atom.b_factor = record.b_factor;
            if !record.element.is_empty() {
                atom.element = record.element;
            }
            residue.atoms.push(atom);
        }
    }

    fn close_chain(&mut self) {
        if let Some(chain) = self.current.take() {
            self.chains.push(chain);
        }
        self.current_residue = None;
    }

    fn finish(mut self) -> Vec<Chain> {
        self.close_chain();
        self.chains
    }
}

/// Parses the tokens following `PDBinfo-LABEL:`. Accepts `<start> <label> <end>` and the
/// per-residue form `<pos> <label>`.
fn parse_label_remark(rest: &str) -> Option<(LoopLabel, usize, usize)> {
    let tokens: Vec<&str> = rest.split_whitespace().collect();
    let (start, label, end) = match tokens.as_slice() {
        [pos, label] => (*pos, *label, *pos),
        [start, label, end] => (*start, *label, *end),
        _ => return None,
    };
    let start: usize = start.parse().ok()?;
    let end: usize = end.parse().ok()?;
    let label: LoopLabel = label.parse().ok()?;
    (start >= 1 && start <= end).then_some((label, start, end))
}

/// Splits sorted positions into inclusive contiguous runs.
fn contiguous_runs(positions: &[usize]) -> Vec<(usize, usize)> {
    let mut runs: Vec<(usize, usize)> = Vec::new();
    for &pos in positions {
        match runs.last_mut() {
            Some((_, end)) if *end + 1 == pos => *end = pos,
            _ => runs.push((pos, pos)),
        }
    }
    runs
}

struct ParsedHlt {
    chains: Vec<Chain>,
    loops: BTreeMap<LoopLabel, Vec<usize>>,
    metadata: Metadata,
}

impl HltFile {
    fn write_chains(chains: &[Chain], writer: &mut impl Write) -> io::Result<()> {
        let mut serial = 1;
        let mut absolute: isize = 1;
        for chain in chains {
            for residue in &chain.residues {
                for atom in &residue.atoms {
                    let line = pdb::format_atom(&AtomRecord {
                        hetero: false,
                        serial,
                        name: atom.name.clone(),
                        alt_loc: ' ',
                        res_name: residue.name.clone(),
                        chain_id: chain.role.letter(),
                        res_seq: absolute,
                        insertion_code: ' ',
                        position: atom.position,
                        occupancy: atom.occupancy,
                        b_factor: atom.b_factor,
                        element: atom.element.clone(),
                    });
                    writeln!(writer, "{line}")?;
                    serial += 1;
                }
                absolute += 1;
            }
            writeln!(writer, "TER")?;
        }
        Ok(())
    }

    /// Writes the atoms, chain terminators and loop remarks, without metadata remarks.
    ///
    /// This is the body stored inside archive entries, where metadata travels on the
    /// entry's score line instead.
    pub fn write_structure(record: &StructureRecord, writer: &mut impl Write) -> io::Result<()> {
        Self::write_chains(record.chains(), writer)?;
        for (label, positions) in record.loops() {
            for (start, end) in contiguous_runs(positions) {
                writeln!(writer, "REMARK {LABEL_REMARK} {start:4} {label} {end}")?;
            }
        }
        Ok(())
    }

    fn write_metadata(metadata: &Metadata, writer: &mut impl Write) -> io::Result<()> {
        for (key, value) in metadata.iter() {
            writeln!(writer, "REMARK {META_REMARK} {key} {value}")?;
        }
        Ok(())
    }

    pub fn write_target(target: &TargetStructure, writer: &mut impl Write) -> io::Result<()> {
        Self::write_chains(target.chains(), writer)?;
        writeln!(writer, "END")
    }

    /// Reads a target-only HLT file: every chain must be labelled T and no loops may be
    /// annotated.
    pub fn read_target(reader: &mut impl BufRead) -> Result<TargetStructure, HltError> {
        let parsed = Self::parse(reader)?;
        if let Some(label) = parsed.loops.keys().next() {
            return Err(HltError::Record(RecordError::LoopOutsideChain {
                label: *label,
                position: parsed.loops[label][0],
                expected: label.chain_role(),
            }));
        }
        Ok(TargetStructure::new(String::new(), parsed.chains)?)
    }

    pub fn read_target_from_path(path: impl AsRef<Path>) -> Result<TargetStructure, HltError> {
        let path = path.as_ref();
        let mut reader = BufReader::new(File::open(path)?);
        let mut target = Self::read_target(&mut reader)?;
        if let Some(stem) = path.file_stem() {
            target.set_tag(stem.to_string_lossy());
        }
        Ok(target)
    }

    fn parse(reader: &mut impl BufRead) -> Result<ParsedHlt, HltError> {
        let mut builder = ChainBuilder::default();
        let mut loops: BTreeMap<LoopLabel, Vec<usize>> = BTreeMap::new();
        let mut metadata = Metadata::new();

        for (index, line_res) in reader.lines().enumerate() {
            let line = line_res?;
            let line_num = index + 1;
            match pdb::parse_line(&line, line_num)? {
                PdbLine::Atom(atom) => {
                    let role = ChainRole::from_letter(atom.chain_id).map_err(|_| {
                        HltError::UnknownChain {
                            line: line_num,
                            chain: atom.chain_id,
                        }
                    })?;
                    builder.push_atom(atom, role);
                }
                PdbLine::Ter => builder.close_chain(),
                PdbLine::Remark(remark) => {
                    if let Some(rest) = remark.strip_prefix(LABEL_REMARK) {
                        let (label, start, end) =
                            parse_label_remark(rest).ok_or_else(|| HltError::MalformedRemark {
                                line: line_num,
                                content: line.clone(),
                            })?;
                        loops.entry(label).or_default().extend(start..=end);
                    } else if let Some(rest) = remark.strip_prefix(META_REMARK) {
                        let (key, value) = rest
                            .trim()
                            .split_once(char::is_whitespace)
                            .ok_or_else(|| HltError::MalformedRemark {
                                line: line_num,
                                content: line.clone(),
                            })?;
                        metadata
                            .insert(key, value.trim())
                            .map_err(|source| HltError::InvalidMetadata {
                                line: line_num,
                                source,
                            })?;
                    }
                }
                PdbLine::End | PdbLine::Other(_) => {}
            }
        }

        Ok(ParsedHlt {
            chains: builder.finish(),
            loops,
            metadata,
        })
    }
}

impl StructureFile for HltFile {
    type Error = HltError;

    fn read_from(reader: &mut impl BufRead) -> Result<StructureRecord, Self::Error> {
        let parsed = Self::parse(reader)?;
        let record = StructureRecord::new(String::new(), parsed.chains, parsed.loops)?;
        Ok(record.with_metadata(parsed.metadata))
    }

    fn write_to(record: &StructureRecord, writer: &mut impl Write) -> Result<(), Self::Error> {
        Self::write_structure(record, writer)?;
        Self::write_metadata(record.metadata(), writer)?;
        writeln!(writer, "END")?;
        Ok(())
    }
}
