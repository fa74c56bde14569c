use nalgebra::Point3;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum PdbError {
    #[error("Parse error on line {line}: {kind}")]
    Parse { line: usize, kind: PdbParseErrorKind },
}

#[derive(Debug, Error, PartialEq)]
pub enum PdbParseErrorKind {
    #[error("Invalid integer format in columns {columns} (value: '{value}')")]
    InvalidInt { columns: String, value: String },
    #[error("Invalid float format in columns {columns} (value: '{value}')")]
    InvalidFloat { columns: String, value: String },
    #[error("Required field in columns {columns} is empty")]
    MissingRequiredField { columns: String },
    #[error("Line is too short for ATOM/HETATM record (must be at least 54 chars)")]
    LineTooShort,
}

/// One `ATOM` or `HETATM` record, column by column.
#[derive(Debug, Clone, PartialEq)]
pub struct AtomRecord {
    pub hetero: bool,
    pub serial: usize,
    pub name: String,
    pub alt_loc: char,
    pub res_name: String,
    pub chain_id: char,
    pub res_seq: isize,
    pub insertion_code: char,
    pub position: Point3<f64>,
    pub occupancy: f64,
    pub b_factor: f64,
    pub element: String,
}

/// A classified PDB line.
#[derive(Debug, Clone, PartialEq)]
pub enum PdbLine {
    Atom(AtomRecord),
    Ter,
    End,
    Remark(String),
    Other(String),
}

fn slice_and_trim(line: &str, start: usize, end: usize) -> &str {
    line.get(start..end.min(line.len())).unwrap_or("").trim()
}

fn column_char(line: &str, index: usize) -> char {
    line.get(index..index + 1)
        .and_then(|s| s.chars().next())
        .unwrap_or(' ')
}

fn parse_float(line: &str, start: usize, end: usize, line_num: usize) -> Result<f64, PdbError> {
    let value = slice_and_trim(line, start, end);
    value.parse().map_err(|_| PdbError::Parse {
        line: line_num,
        kind: PdbParseErrorKind::InvalidFloat {
            columns: format!("{}-{}", start + 1, end),
            value: value.into(),
        },
    })
}

fn parse_optional_float(
    line: &str,
    start: usize,
    end: usize,
    line_num: usize,
    default: f64,
) -> Result<f64, PdbError> {
    if slice_and_trim(line, start, end).is_empty() {
        Ok(default)
    } else {
        parse_float(line, start, end, line_num)
    }
}

/// Parses one line of a PDB file. `line_num` is 1-based and only used in errors.
pub fn parse_line(line: &str, line_num: usize) -> Result<PdbLine, PdbError> {
    let record_type = slice_and_trim(line, 0, 6);
    match record_type {
        "ATOM" | "HETATM" => parse_atom(line, line_num, record_type == "HETATM").map(PdbLine::Atom),
        "TER" => Ok(PdbLine::Ter),
        "END" | "ENDMDL" => Ok(PdbLine::End),
        "REMARK" => Ok(PdbLine::Remark(line.get(6..).unwrap_or("").trim().to_string())),
        _ => Ok(PdbLine::Other(line.to_string())),
    }
}

fn parse_atom(line: &str, line_num: usize, hetero: bool) -> Result<AtomRecord, PdbError> {
    if line.len() < 54 {
        return Err(PdbError::Parse {
            line: line_num,
            kind: PdbParseErrorKind::LineTooShort,
        });
    }

    let serial_str = slice_and_trim(line, 6, 11);
    let serial: usize = serial_str.parse().map_err(|_| PdbError::Parse {
        line: line_num,
        kind: PdbParseErrorKind::InvalidInt {
            columns: "7-11".into(),
            value: serial_str.into(),
        },
    })?;

    let name = slice_and_trim(line, 12, 16);
    if name.is_empty() {
        return Err(PdbError::Parse {
            line: line_num,
            kind: PdbParseErrorKind::MissingRequiredField {
                columns: "13-16".into(),
            },
        });
    }

    let res_name = slice_and_trim(line, 17, 20);
    if res_name.is_empty() {
        return Err(PdbError::Parse {
            line: line_num,
            kind: PdbParseErrorKind::MissingRequiredField {
                columns: "18-20".into(),
            },
        });
    }

    let res_seq_str = slice_and_trim(line, 22, 26);
    let res_seq: isize = res_seq_str.parse().map_err(|_| PdbError::Parse {
        line: line_num,
        kind: PdbParseErrorKind::InvalidInt {
            columns: "23-26".into(),
            value: res_seq_str.into(),
        },
    })?;

    let x = parse_float(line, 30, 38, line_num)?;
    let y = parse_float(line, 38, 46, line_num)?;
    let z = parse_float(line, 46, 54, line_num)?;
    let occupancy = parse_optional_float(line, 54, 60, line_num, 1.0)?;
    let b_factor = parse_optional_float(line, 60, 66, line_num, 0.0)?;

    Ok(AtomRecord {
        hetero,
        serial,
        name: name.to_string(),
        alt_loc: column_char(line, 16),
        res_name: res_name.to_string(),
        chain_id: column_char(line, 21),
        res_seq,
        insertion_code: column_char(line, 26),
        position: Point3::new(x, y, z),
        occupancy,
        b_factor,
        element: slice_and_trim(line, 76, 78).to_string(),
    })
}

/// Formats an atom as a standard 80-column record.
pub fn format_atom(atom: &AtomRecord) -> String {
    let name = if atom.name.len() < 4 {
        format!(" {:<3}", atom.name)
    } else {
        atom.name.clone()
    };
    format!(
        "{:<6}{:>5} {:<4}{}{:>3} {}{:>4}{}   {:>8.3}{:>8.3}{:>8.3}{:>6.2}{:>6.2}          {:>2}  ",
        if atom.hetero { "HETATM" } else { "ATOM" },
        atom.serial % 100_000,
        name,
        atom.alt_loc,
        atom.res_name,
        atom.chain_id,
        atom.res_seq,
        atom.insertion_code,
        atom.position.x,
        atom.position.y,
        atom.position.z,
        atom.occupancy,
        atom.b_factor,
        atom.element,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINE: &str =
        "ATOM      2  CA  GLU H   1      12.345  -6.789  10.111  1.00 25.50           C  ";

    #[test]
    fn parse_line_reads_every_column() {
        let PdbLine::Atom(atom) = parse_line(LINE, 1).unwrap() else {
            panic!("expected atom");
        };
        assert!(!atom.hetero);
        assert_eq!(atom.serial, 2);
        assert_eq!(atom.name, "CA");
        assert_eq!(atom.res_name, "GLU");
        assert_eq!(atom.chain_id, 'H');
        assert_eq!(atom.res_seq, 1);
        assert_eq!(atom.insertion_code, ' ');
        assert_eq!(atom.position, Point3::new(12.345, -6.789, 10.111));
        assert_eq!(atom.occupancy, 1.0);
        assert_eq!(atom.b_factor, 25.5);
        assert_eq!(atom.element, "C");
    }

    #[test]
    fn format_atom_reproduces_standard_columns() {
        let PdbLine::Atom(atom) = parse_line(LINE, 1).unwrap() else {
            panic!("expected atom");
        };
        let formatted = format_atom(&atom);
        assert_eq!(formatted.len(), 80);
        assert_eq!(formatted.trim_end(), LINE.trim_end());
    }

    #[test]
    fn four_character_names_start_at_column_13() {
        let atom = AtomRecord {
            hetero: false,
            serial: 1,
            name: "HD21".into(),
            alt_loc: ' ',
            res_name: "ASN".into(),
            chain_id: 'L',
            res_seq: 7,
            insertion_code: 'A',
            position: Point3::new(0.0, 0.0, 0.0),
            occupancy: 1.0,
            b_factor: 0.0,
            element: "H".into(),
        };
        let line = format_atom(&atom);
        assert_eq!(&line[12..16], "HD21");
        assert_eq!(&line[26..27], "A");
        let PdbLine::Atom(parsed) = parse_line(&line, 1).unwrap() else {
            panic!("expected atom");
        };
        assert_eq!(parsed, atom);
    }

    #[test]
    fn short_records_use_default_occupancy_and_b_factor() {
        let line = &LINE[..54];
        let PdbLine::Atom(atom) = parse_line(line, 3).unwrap() else {
            panic!("expected atom");
        };
        assert_eq!(atom.occupancy, 1.0);
        assert_eq!(atom.b_factor, 0.0);
        assert_eq!(atom.element, "");
    }

    #[test]
    fn malformed_coordinates_report_line_and_columns() {
        let bad = LINE.replace("12.345", "12.3x5");
        let err = parse_line(&bad, 9).unwrap_err();
        assert_eq!(
            err,
            PdbError::Parse {
                line: 9,
                kind: PdbParseErrorKind::InvalidFloat {
                    columns: "31-38".into(),
                    value: "12.3x5".into()
                }
            }
        );
        assert_eq!(
            parse_line("ATOM      1  CA", 2),
            Err(PdbError::Parse {
                line: 2,
                kind: PdbParseErrorKind::LineTooShort
            })
        );
    }

    #[test]
    fn classifies_non_atom_lines() {
        assert_eq!(parse_line("TER", 1), Ok(PdbLine::Ter));
        assert_eq!(parse_line("END", 1), Ok(PdbLine::End));
        assert_eq!(
            parse_line("REMARK PDBinfo-LABEL:   26 H1", 1),
            Ok(PdbLine::Remark("PDBinfo-LABEL:   26 H1".into()))
        );
        assert!(matches!(parse_line("HEADER x", 1), Ok(PdbLine::Other(_))));
    }
}
