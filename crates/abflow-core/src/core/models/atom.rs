use nalgebra::Point3;

/// Represents an atom of a residue as it appears in a structure file.
///
/// Only the columns that survive a round trip through the HLT convention are kept:
/// the atom name, the element symbol, the coordinates and the two per-atom scalar
/// columns (occupancy and B-factor). Structure prediction stages commonly write a
/// per-residue confidence into the B-factor column.
#[derive(Debug, Clone, PartialEq)]
pub struct Atom {
    /// The name of the atom (e.g., "CA", "N", "OG1").
    pub name: String,
    /// The element symbol (e.g., "C", "N"); may be empty if the source file omitted it.
    pub element: String,
    /// The 3D coordinates of the atom in Angstroms.
    pub position: Point3<f64>,
    /// Occupancy column.
    pub occupancy: f64,
    /// B-factor column.
    pub b_factor: f64,
}

impl Atom {
    /// Creates a new `Atom` with full occupancy and a zero B-factor.
    ///
    /// The element is inferred from the first alphabetic character of the name,
    /// which holds for the standard amino-acid atom names.
    ///
    /// # Arguments
    ///
    /// * `name` - The name of the atom.
    /// * `position` - The 3D coordinates of the atom.
    pub fn new(name: &str, position: Point3<f64>) -> Self {
        let element = name
            .trim()
            .chars()
            .find(|c| c.is_ascii_alphabetic())
            .map(|c| c.to_string())
            .unwrap_or_default();
        Self {
            name: name.trim().to_string(),
            element,
            position,
            occupancy: 1.0,
            b_factor: 0.0,
        }
    }

    pub fn is_hydrogen(&self) -> bool {
        matches!(self.element.as_str(), "H" | "D")
    }
}
