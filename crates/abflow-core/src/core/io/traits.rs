use crate::core::models::record::StructureRecord;
use std::error::Error;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Defines the interface for reading and writing structure file formats.
///
/// Implementors handle format-specific parsing and serialization of a
/// [`StructureRecord`]; the path helpers are shared.
pub trait StructureFile {
    /// The error type for I/O operations.
    type Error: Error + From<io::Error>;

    /// Reads a structure record from a buffered reader.
    ///
    /// # Arguments
    ///
    /// * `reader` - The buffered reader to read from.
    ///
    /// # Return
    ///
    /// Returns the parsed record. Formats that do not carry a name return an empty tag.
    ///
    /// # Errors
    ///
    /// Returns an error if parsing fails or I/O operations encounter issues.
    fn read_from(reader: &mut impl BufRead) -> Result<StructureRecord, Self::Error>;

    /// Writes a structure record to a writer.
    ///
    /// # Arguments
    ///
    /// * `record` - The record to write.
    /// * `writer` - The writer to output to.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails or I/O operations encounter issues.
    fn write_to(record: &StructureRecord, writer: &mut impl Write) -> Result<(), Self::Error>;

    /// Reads a structure record from a file path.
    ///
    /// The record's tag is set to the file stem when the format itself carries no tag.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or parsing fails.
    fn read_from_path<P: AsRef<Path>>(path: P) -> Result<StructureRecord, Self::Error> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        let mut record = Self::read_from(&mut reader)?;
        if record.tag().is_empty() {
            if let Some(stem) = path.file_stem() {
                record.set_tag(stem.to_string_lossy());
            }
        }
        Ok(record)
    }

    /// Writes a structure record to a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or writing fails.
    fn write_to_path<P: AsRef<Path>>(
        record: &StructureRecord,
        path: P,
    ) -> Result<(), Self::Error> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        Self::write_to(record, &mut writer)?;
        writer.flush()?;
        Ok(())
    }
}
