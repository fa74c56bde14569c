use phf::{Map, phf_map};

static THREE_TO_ONE: Map<&'static str, char> = phf_map! {
    "ALA" => 'A', "ARG" => 'R', "ASN" => 'N', "ASP" => 'D', "CYS" => 'C',
    "GLN" => 'Q', "GLU" => 'E', "GLY" => 'G', "HIS" => 'H', "ILE" => 'I',
    "LEU" => 'L', "LYS" => 'K', "MET" => 'M', "PHE" => 'F', "PRO" => 'P',
    "SER" => 'S', "THR" => 'T', "TRP" => 'W', "TYR" => 'Y', "VAL" => 'V',
};

static ONE_TO_THREE: Map<char, &'static str> = phf_map! {
    'A' => "ALA", 'R' => "ARG", 'N' => "ASN", 'D' => "ASP", 'C' => "CYS",
    'Q' => "GLN", 'E' => "GLU", 'G' => "GLY", 'H' => "HIS", 'I' => "ILE",
    'L' => "LEU", 'K' => "LYS", 'M' => "MET", 'F' => "PHE", 'P' => "PRO",
    'S' => "SER", 'T' => "THR", 'W' => "TRP", 'Y' => "TYR", 'V' => "VAL",
};

pub fn three_to_one(name: &str) -> Option<char> {
    THREE_TO_ONE.get(name.trim()).copied()
}

pub fn one_to_three(code: char) -> Option<&'static str> {
    ONE_TO_THREE.get(&code.to_ascii_uppercase()).copied()
}

/// Whether the residue name is one of the 20 standard amino acids.
pub fn is_standard_residue(name: &str) -> bool {
    THREE_TO_ONE.contains_key(name.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_to_one_maps_standard_residues() {
        assert_eq!(three_to_one("GLY"), Some('G'));
        assert_eq!(three_to_one(" TRP "), Some('W'));
        assert_eq!(three_to_one("HOH"), None);
    }

    #[test]
    fn one_to_three_is_case_insensitive() {
        assert_eq!(one_to_three('k'), Some("LYS"));
        assert_eq!(one_to_three('X'), None);
    }

    #[test]
    fn is_standard_residue_rejects_ligands_and_variants() {
        assert!(is_standard_residue("HIS"));
        assert!(!is_standard_residue("HSE"));
        assert!(!is_standard_residue("NAG"));
    }

    #[test]
    fn tables_are_consistent() {
        for code in "ACDEFGHIKLMNPQRSTVWY".chars() {
            let three = one_to_three(code).unwrap();
            assert_eq!(three_to_one(three), Some(code));
        }
    }
}
