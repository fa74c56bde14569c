//! # Core Models Module
//!
//! Data structures describing one designed (or input) antibody/target complex.
//!
//! - [`atom`] - A single atom with coordinates and per-atom scalar columns
//! - [`residue`] - An ordered group of atoms with a residue type
//! - [`chain`] - Chain roles (Heavy, Light, Target) and their residues
//! - [`loops`] - CDR loop labels
//! - [`metadata`] - Free-form key/value metadata attached to a record
//! - [`record`] - The `StructureRecord` that enforces HLT chain order and loop invariants
//!
//! ```ignore
//! use abflow::core::models::{chain::{Chain, ChainRole}, record::StructureRecord};
//!
//! let record = StructureRecord::new("design_0", vec![Chain::new(ChainRole::Heavy, residues)], loops)?;
//! ```

pub mod atom;
pub mod chain;
pub mod loops;
pub mod metadata;
pub mod record;
pub mod residue;
