//! # Core Module
//!
//! Fundamental data structures and file formats shared by every stage of a design campaign.
//!
//! - **Structure Representation** ([`models`]) - Atoms, residues, role-labelled chains, loop
//!   labels, metadata and the `StructureRecord` that ties them together
//! - **File I/O** ([`io`]) - PDB columns, the HLT convention, Chothia conversion and the
//!   Quiver archive
//! - **Identifiers** ([`utils`]) - Residue name tables

pub mod io;
pub mod models;
pub mod utils;
