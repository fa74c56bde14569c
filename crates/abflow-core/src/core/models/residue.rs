use super::atom::Atom;
use crate::core::utils::identifiers;

/// A residue: a residue type plus its atoms in file order.
///
/// The residue's position is implicit. It is the 1-based index of the residue inside its
/// chain; the absolute (cross-chain) position is derived by the owning `StructureRecord`.
#[derive(Debug, Clone, PartialEq)]
pub struct Residue {
    pub name: String,
    pub atoms: Vec<Atom>,
}

impl Residue {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.trim().to_ascii_uppercase(),
            atoms: Vec::new(),
        }
    }

    pub fn with_atoms(name: &str, atoms: Vec<Atom>) -> Self {
        let mut residue = Self::new(name);
        residue.atoms = atoms;
        residue
    }

    pub fn atom(&self, name: &str) -> Option<&Atom> {
        self.atoms.iter().find(|a| a.name == name)
    }

    /// One-letter code of the residue, `X` for anything non-standard.
    pub fn one_letter(&self) -> char {
        identifiers::three_to_one(&self.name).unwrap_or('X')
    }

    /// The atom used as the residue's side-chain representative: CB, or CA for glycine
    /// and for residues whose CB is missing.
    pub fn representative_atom(&self) -> Option<&Atom> {
        self.atom("CB").or_else(|| self.atom("CA"))
    }
}
