//! Provides input/output functionality for structure files and archives.
//!
//! This module contains the fixed-column PDB record codec, the HLT convention built on
//! top of it, a converter from Chothia-numbered antibody structures into HLT, and the
//! Quiver single-file archive used to move batches of structures between design stages.

pub mod chothia;
pub mod hlt;
pub mod pdb;
pub mod quiver;
pub mod traits;
