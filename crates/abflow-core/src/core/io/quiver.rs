//! The Quiver archive: many named HLT structures plus per-entry metadata in one text file.
//!
//! ```text
//! QV_TAG design_0
//! QV_SCORE design_0 seed=42|H3_length=9
//! ATOM      1  N   GLU H   1 ...
//! ...
//! QV_TAG design_1
//! ...
//! ```
//!
//! An entry starts with a `QV_TAG` line, optionally followed by one `QV_SCORE` line
//! carrying `key=value` pairs separated by `|`, and then the structure body. The tag
//! index is always rebuilt from the file itself by a single linear scan.

use super::hlt::{HltError, HltFile};
use super::traits::StructureFile;
use crate::core::models::metadata::Metadata;
use crate::core::models::record::StructureRecord;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

const TAG_KEYWORD: &str = "QV_TAG";
const SCORE_KEYWORD: &str = "QV_SCORE";

#[derive(Debug, Error)]
pub enum QuiverError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Tag '{0}' is already present")]
    DuplicateTag(String),
    #[error("Tag '{0}' not found")]
    NotFound(String),
    #[error("Corrupt archive {path}, line {line}: {reason}")]
    Corrupt {
        path: PathBuf,
        line: usize,
        reason: String,
    },
    #[error("Invalid tag '{0}': tags must be non-empty and contain no whitespace")]
    InvalidTag(String),
    #[error("Entry '{tag}' has an invalid body: {reason}")]
    InvalidBody { tag: String, reason: String },
    #[error("Chunk size must be at least 1")]
    InvalidChunkSize,
    #[error("Refusing to overwrite the source archive {0}")]
    SameAsSource(PathBuf),
    #[error("Entry '{tag}' could not be decoded: {source}")]
    Entry {
        tag: String,
        #[source]
        source: HltError,
    },
    #[error("Failed to write score table: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Clone)]
struct IndexEntry {
    tag: String,
    metadata: Metadata,
    start: u64,
    body_start: u64,
    end: u64,
}

/// A file-backed archive with an in-memory tag index.
///
/// Only [`append`](Quiver::append) and its raw variant modify the file. Every other
/// operation that produces an archive writes a new file and leaves the source untouched.
#[derive(Debug)]
pub struct Quiver {
    path: PathBuf,
    entries: Vec<IndexEntry>,
    lookup: HashMap<String, usize>,
}

/// Result of extracting entries into loose files.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExtractSummary {
    pub written: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
    pub missing: Vec<String>,
}

/// One row per entry, first column `tag`, then the union of metadata keys in order of
/// first appearance. Missing values are empty strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl ScoreTable {
    pub fn write_tsv(&self, writer: impl Write) -> Result<(), csv::Error> {
        let mut wtr = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_writer(writer);
        wtr.write_record(&self.columns)?;
        for row in &self.rows {
            wtr.write_record(row)?;
        }
        wtr.flush()?;
        Ok(())
    }
}

fn validate_tag(tag: &str) -> Result<(), QuiverError> {
    if tag.is_empty() || tag.chars().any(char::is_whitespace) {
        return Err(QuiverError::InvalidTag(tag.to_string()));
    }
    Ok(())
}

/// Returns the remainder of `line` if it starts with `keyword` as a whole word.
fn strip_keyword<'a>(line: &'a str, keyword: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(keyword)?;
    (rest.is_empty() || rest.starts_with(char::is_whitespace)).then_some(rest)
}

fn validate_body(tag: &str, body: &str) -> Result<(), QuiverError> {
    if body.trim().is_empty() {
        return Err(QuiverError::InvalidBody {
            tag: tag.to_string(),
            reason: "body is empty".into(),
        });
    }
    if body
        .lines()
        .any(|l| strip_keyword(l, TAG_KEYWORD).is_some() || strip_keyword(l, SCORE_KEYWORD).is_some())
    {
        return Err(QuiverError::InvalidBody {
            tag: tag.to_string(),
            reason: format!("body contains a {TAG_KEYWORD} or {SCORE_KEYWORD} line"),
        });
    }
    Ok(())
}

/// Serializes one entry. Returns the bytes and the offset of the body within them.
fn encode_entry(tag: &str, metadata: &Metadata, body: &str) -> (Vec<u8>, u64) {
    let mut header = format!("{TAG_KEYWORD} {tag}\n");
    if !metadata.is_empty() {
        header.push_str(&format!(
            "{SCORE_KEYWORD} {tag} {}\n",
            metadata.to_score_string()
        ));
    }
    let body_offset = header.len() as u64;
    let mut bytes = header.into_bytes();
    bytes.extend_from_slice(body.as_bytes());
    if !body.ends_with('\n') {
        bytes.push(b'\n');
    }
    (bytes, body_offset)
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// Writes a file atomically: a temporary file in the destination directory is renamed
/// over `dest` once fully written.
fn write_atomically(
    dest: &Path,
    fill: impl FnOnce(&mut BufWriter<&mut File>) -> Result<(), QuiverError>,
) -> Result<(), QuiverError> {
    let dir = match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        fill(&mut writer)?;
        writer.flush()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(dest).map_err(|e| QuiverError::Io(e.error))?;
    Ok(())
}

impl Quiver {
    /// Creates a new, empty archive, truncating any existing file at `path`.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, QuiverError> {
        let path = path.as_ref().to_path_buf();
        File::create(&path)?;
        Ok(Self {
            path,
            entries: Vec::new(),
            lookup: HashMap::new(),
        })
    }

    /// Opens an existing archive and builds its tag index.
    ///
    /// # Errors
    ///
    /// Returns [`QuiverError::Corrupt`] if the file is truncated, holds content outside an
    /// entry, an entry without a body, a misplaced score line, or a repeated tag.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, QuiverError> {
        let path = path.as_ref().to_path_buf();
        let entries = Self::scan(&path)?;
        let lookup = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.tag.clone(), i))
            .collect();
        debug!(path = %path.display(), entries = entries.len(), "Opened archive");
        Ok(Self {
            path,
            entries,
            lookup,
        })
    }

    pub fn open_or_create(path: impl AsRef<Path>) -> Result<Self, QuiverError> {
        if path.as_ref().exists() {
            Self::open(path)
        } else {
            Self::create(path)
        }
    }

    /// Rebuilds the tag index from the file contents.
    pub fn reindex(&mut self) -> Result<(), QuiverError> {
        *self = Self::open(&self.path)?;
        Ok(())
    }

    fn scan(path: &Path) -> Result<Vec<IndexEntry>, QuiverError> {
        struct Pending {
            entry: IndexEntry,
            line: usize,
            body_lines: usize,
            has_score: bool,
        }

        let corrupt = |line: usize, reason: String| QuiverError::Corrupt {
            path: path.to_path_buf(),
            line,
            reason,
        };
        let finish = |pending: Pending, end: u64| -> Result<IndexEntry, QuiverError> {
            if pending.body_lines == 0 {
                return Err(corrupt(
                    pending.line,
                    format!("entry '{}' has no structure lines", pending.entry.tag),
                ));
            }
            Ok(IndexEntry {
                end,
                ..pending.entry
            })
        };

        let mut reader = BufReader::new(File::open(path)?);
        let mut entries = Vec::new();
        let mut seen = HashSet::new();
        let mut current: Option<Pending> = None;
        let mut offset = 0u64;
        let mut line_num = 0;
        let mut line = String::new();

        loop {
            line.clear();
            let read = reader.read_line(&mut line)?;
            if read == 0 {
                break;
            }
            line_num += 1;
            let line_start = offset;
            offset += read as u64;
            if !line.ends_with('\n') {
                return Err(corrupt(line_num, "truncated entry (missing final newline)".into()));
            }
            let content = line.trim_end_matches(['\n', '\r']);

            if let Some(rest) = strip_keyword(content, TAG_KEYWORD) {
                if let Some(pending) = current.take() {
                    entries.push(finish(pending, line_start)?);
                }
                let tag = rest.trim();
                if tag.is_empty() || tag.contains(char::is_whitespace) {
                    return Err(corrupt(line_num, format!("malformed tag line '{content}'")));
                }
                if !seen.insert(tag.to_string()) {
                    return Err(corrupt(line_num, format!("duplicate tag '{tag}'")));
                }
                current = Some(Pending {
                    entry: IndexEntry {
                        tag: tag.to_string(),
                        metadata: Metadata::new(),
                        start: line_start,
                        body_start: offset,
                        end: offset,
                    },
                    line: line_num,
                    body_lines: 0,
                    has_score: false,
                });
            } else if let Some(rest) = strip_keyword(content, SCORE_KEYWORD) {
                let Some(pending) = current.as_mut().filter(|p| p.body_lines == 0 && !p.has_score)
                else {
                    return Err(corrupt(line_num, "score line outside an entry header".into()));
                };
                let mut fields = rest.split_whitespace();
                if fields.next() != Some(pending.entry.tag.as_str()) {
                    return Err(corrupt(
                        line_num,
                        format!("score line does not match tag '{}'", pending.entry.tag),
                    ));
                }
                let scores = fields.collect::<Vec<_>>().join("");
                pending.entry.metadata = Metadata::parse_score_string(&scores)
                    .map_err(|e| corrupt(line_num, e.to_string()))?;
                pending.entry.body_start = offset;
                pending.has_score = true;
            } else {
                let Some(pending) = current.as_mut() else {
                    return Err(corrupt(line_num, format!("content before the first {TAG_KEYWORD}")));
                };
                pending.body_lines += 1;
            }
        }

        if let Some(pending) = current.take() {
            entries.push(finish(pending, offset)?);
        }
        Ok(entries)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.lookup.contains_key(tag)
    }

    /// Tags in archive (append) order.
    pub fn list_tags(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.tag.clone()).collect()
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.tag.as_str())
    }

    /// The metadata stored on an entry's score line.
    pub fn metadata(&self, tag: &str) -> Result<&Metadata, QuiverError> {
        self.entry(tag).map(|e| &e.metadata)
    }

    /// Size in bytes of the archive as currently indexed.
    pub fn byte_len(&self) -> u64 {
        self.entries.last().map_or(0, |e| e.end)
    }

    fn entry(&self, tag: &str) -> Result<&IndexEntry, QuiverError> {
        self.lookup
            .get(tag)
            .map(|&i| &self.entries[i])
            .ok_or_else(|| QuiverError::NotFound(tag.to_string()))
    }

    /// Appends a record under `tag` with the given metadata.
    ///
    /// # Errors
    ///
    /// Returns [`QuiverError::DuplicateTag`] if the tag is already present; the file is
    /// not touched in that case.
    pub fn append(
        &mut self,
        tag: &str,
        record: &StructureRecord,
        metadata: &Metadata,
    ) -> Result<(), QuiverError> {
        validate_tag(tag)?;
        if self.contains(tag) {
            return Err(QuiverError::DuplicateTag(tag.to_string()));
        }
        let mut body = Vec::new();
        HltFile::write_structure(record, &mut body)?;
        let body = String::from_utf8_lossy(&body);
        self.append_unchecked(tag, metadata, &body)
    }

    /// Appends a record under its own tag and metadata.
    pub fn append_record(&mut self, record: &StructureRecord) -> Result<(), QuiverError> {
        self.append(record.tag(), record, record.metadata())
    }

    /// Appends an already-serialized structure body verbatim.
    pub fn append_raw(
        &mut self,
        tag: &str,
        metadata: &Metadata,
        body: &str,
    ) -> Result<(), QuiverError> {
        validate_tag(tag)?;
        if self.contains(tag) {
            return Err(QuiverError::DuplicateTag(tag.to_string()));
        }
        validate_body(tag, body)?;
        self.append_unchecked(tag, metadata, body)
    }

    fn append_unchecked(
        &mut self,
        tag: &str,
        metadata: &Metadata,
        body: &str,
    ) -> Result<(), QuiverError> {
        let (bytes, body_offset) = encode_entry(tag, metadata, body);
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        let start = file.metadata()?.len();
        file.write_all(&bytes)?;
        file.sync_data()?;

        self.lookup.insert(tag.to_string(), self.entries.len());
        self.entries.push(IndexEntry {
            tag: tag.to_string(),
            metadata: metadata.clone(),
            start,
            body_start: start + body_offset,
            end: start + bytes.len() as u64,
        });
        Ok(())
    }

    fn read_body(&self, file: &mut File, entry: &IndexEntry) -> Result<String, QuiverError> {
        let stale = || QuiverError::Corrupt {
            path: self.path.clone(),
            line: 0,
            reason: format!("index for '{}' does not match the file contents", entry.tag),
        };
        file.seek(SeekFrom::Start(entry.start))?;
        let mut buf = vec![0; (entry.end - entry.start) as usize];
        file.read_exact(&mut buf).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => stale(),
            _ => QuiverError::Io(e),
        })?;
        let text = String::from_utf8(buf).map_err(|_| stale())?;
        let header = format!("{TAG_KEYWORD} {}", entry.tag);
        if text.lines().next().map(str::trim_end) != Some(header.as_str()) {
            return Err(stale());
        }
        let body_offset = (entry.body_start - entry.start) as usize;
        Ok(text.get(body_offset..).ok_or_else(stale)?.to_string())
    }

    fn decode(&self, entry: &IndexEntry, body: &str) -> Result<StructureRecord, QuiverError> {
        let record = HltFile::read_from(&mut body.as_bytes()).map_err(|source| QuiverError::Entry {
            tag: entry.tag.clone(),
            source,
        })?;
        let mut metadata = record.metadata().clone();
        metadata.extend_from(&entry.metadata);
        Ok(record.with_tag(entry.tag.clone()).with_metadata(metadata))
    }

    /// Returns the raw structure lines of an entry byte-for-byte.
    pub fn extract_lines(&self, tag: &str) -> Result<String, QuiverError> {
        let entry = self.entry(tag)?;
        let mut file = File::open(&self.path)?;
        self.read_body(&mut file, entry)
    }

    /// Decodes one entry. The returned record carries the entry's tag, and its metadata
    /// is the union of any metadata remarks in the body and the entry's score line.
    pub fn extract(&self, tag: &str) -> Result<StructureRecord, QuiverError> {
        let entry = self.entry(tag)?;
        let mut file = File::open(&self.path)?;
        let body = self.read_body(&mut file, entry)?;
        self.decode(entry, &body)
    }

    /// Lazily decodes every entry in archive order. Each call opens a fresh handle.
    pub fn extract_all(&self) -> Result<Entries<'_>, QuiverError> {
        Ok(Entries {
            archive: self,
            file: File::open(&self.path)?,
            next: 0,
        })
    }

    fn write_entries<'a>(
        &self,
        selected: impl IntoIterator<Item = (&'a IndexEntry, &'a str)>,
        writer: &mut impl Write,
    ) -> Result<usize, QuiverError> {
        let mut file = File::open(&self.path)?;
        let mut count = 0;
        for (entry, new_tag) in selected {
            let body = self.read_body(&mut file, entry)?;
            let (bytes, _) = encode_entry(new_tag, &entry.metadata, &body);
            writer.write_all(&bytes)?;
            count += 1;
        }
        Ok(count)
    }

    fn check_destination(&self, dest: &Path) -> Result<(), QuiverError> {
        if same_file(&self.path, dest) {
            return Err(QuiverError::SameAsSource(dest.to_path_buf()));
        }
        Ok(())
    }

    /// Writes the entries named in `tags` to `writer`, in archive order.
    ///
    /// # Return
    ///
    /// Returns the requested tags that are not in the archive, in request order.
    pub fn slice_to<S: AsRef<str>>(
        &self,
        tags: &[S],
        writer: &mut impl Write,
    ) -> Result<Vec<String>, QuiverError> {
        let wanted: HashSet<&str> = tags.iter().map(AsRef::as_ref).collect();
        let mut missing = Vec::new();
        let mut reported = HashSet::new();
        for tag in tags.iter().map(AsRef::as_ref) {
            if !self.contains(tag) && reported.insert(tag) {
                missing.push(tag.to_string());
            }
        }
        let selected = self
            .entries
            .iter()
            .filter(|e| wanted.contains(e.tag.as_str()))
            .map(|e| (e, e.tag.as_str()));
        self.write_entries(selected, writer)?;
        Ok(missing)
    }

    /// Writes a new archive at `dest` holding only the named entries.
    pub fn slice<S: AsRef<str>>(
        &self,
        tags: &[S],
        dest: impl AsRef<Path>,
    ) -> Result<(Quiver, Vec<String>), QuiverError> {
        let dest = dest.as_ref();
        self.check_destination(dest)?;
        let mut missing = Vec::new();
        write_atomically(dest, |w| {
            missing = self.slice_to(tags, w)?;
            Ok(())
        })?;
        Ok((Quiver::open(dest)?, missing))
    }

    fn renamed_tags<'a>(
        &'a self,
        mapping: &'a BTreeMap<String, String>,
    ) -> Result<Vec<(&'a IndexEntry, &'a str)>, QuiverError> {
        for (old, new) in mapping {
            if !self.contains(old) {
                return Err(QuiverError::NotFound(old.clone()));
            }
            validate_tag(new)?;
        }
        let renamed: Vec<(&IndexEntry, &str)> = self
            .entries
            .iter()
            .map(|e| (e, mapping.get(&e.tag).map_or(e.tag.as_str(), String::as_str)))
            .collect();
        let mut seen = HashSet::new();
        for (_, tag) in &renamed {
            if !seen.insert(*tag) {
                return Err(QuiverError::DuplicateTag(tag.to_string()));
            }
        }
        Ok(renamed)
    }

    /// Writes every entry to `writer`, renaming tags per `mapping` (old to new). Unmapped
    /// tags keep their names; score lines follow the new tag.
    pub fn rename_to(
        &self,
        mapping: &BTreeMap<String, String>,
        writer: &mut impl Write,
    ) -> Result<(), QuiverError> {
        let renamed = self.renamed_tags(mapping)?;
        self.write_entries(renamed, writer)?;
        Ok(())
    }

    /// Writes a renamed copy of the archive at `dest`.
    ///
    /// # Errors
    ///
    /// Returns [`QuiverError::NotFound`] for a mapping key absent from the archive and
    /// [`QuiverError::DuplicateTag`] if two entries would end up with the same tag. Both
    /// are detected before anything is written.
    pub fn rename(
        &self,
        mapping: &BTreeMap<String, String>,
        dest: impl AsRef<Path>,
    ) -> Result<Quiver, QuiverError> {
        let dest = dest.as_ref();
        self.check_destination(dest)?;
        let renamed = self.renamed_tags(mapping)?;
        write_atomically(dest, |w| self.write_entries(renamed, w).map(|_| ()))?;
        Quiver::open(dest)
    }

    /// Splits the archive into consecutive chunks of at most `chunk_size` entries, written
    /// as `<prefix>_<n>.qv` (n from 0) in `out_dir`.
    pub fn split(
        &self,
        chunk_size: usize,
        out_dir: impl AsRef<Path>,
        prefix: &str,
    ) -> Result<Vec<Quiver>, QuiverError> {
        if chunk_size == 0 {
            return Err(QuiverError::InvalidChunkSize);
        }
        let out_dir = out_dir.as_ref();
        fs::create_dir_all(out_dir)?;
        let mut parts = Vec::new();
        for (n, chunk) in self.entries.chunks(chunk_size).enumerate() {
            let dest = out_dir.join(format!("{prefix}_{n}.qv"));
            self.check_destination(&dest)?;
            write_atomically(&dest, |w| {
                self.write_entries(chunk.iter().map(|e| (e, e.tag.as_str())), w)
                    .map(|_| ())
            })?;
            parts.push(Quiver::open(&dest)?);
        }
        debug!(parts = parts.len(), chunk_size, "Split archive");
        Ok(parts)
    }

    /// Writes the entries of every input, in input order, to `writer`.
    ///
    /// # Errors
    ///
    /// Returns [`QuiverError::DuplicateTag`] before writing anything if a tag occurs in
    /// more than one input.
    pub fn concat_to(inputs: &[Quiver], writer: &mut impl Write) -> Result<(), QuiverError> {
        let mut seen = HashSet::new();
        for tag in inputs.iter().flat_map(Quiver::tags) {
            if !seen.insert(tag) {
                return Err(QuiverError::DuplicateTag(tag.to_string()));
            }
        }
        for input in inputs {
            input.write_entries(input.entries.iter().map(|e| (e, e.tag.as_str())), writer)?;
        }
        Ok(())
    }

    pub fn concat(inputs: &[Quiver], dest: impl AsRef<Path>) -> Result<Quiver, QuiverError> {
        let dest = dest.as_ref();
        for input in inputs {
            input.check_destination(dest)?;
        }
        write_atomically(dest, |w| Self::concat_to(inputs, w))?;
        Quiver::open(dest)
    }

    /// Rewrites the archive in place, keeping only entries for which `keep` returns true.
    ///
    /// The replacement is written to a temporary file and renamed over the archive.
    pub fn retain(self, keep: impl Fn(&str) -> bool) -> Result<Quiver, QuiverError> {
        if self.entries.iter().all(|e| keep(&e.tag)) {
            return Ok(self);
        }
        let selected: Vec<_> = self
            .entries
            .iter()
            .filter(|e| keep(&e.tag))
            .map(|e| (e, e.tag.as_str()))
            .collect();
        write_atomically(&self.path, |w| self.write_entries(selected, w).map(|_| ()))?;
        Quiver::open(&self.path)
    }

    /// Discards every byte past `len` (an earlier [`byte_len`](Quiver::byte_len)) before
    /// opening. Used to drop a partially written trailing entry.
    pub fn open_truncated(path: impl AsRef<Path>, len: u64) -> Result<Self, QuiverError> {
        let path = path.as_ref();
        let file = OpenOptions::new().write(true).open(path)?;
        if file.metadata()?.len() > len {
            debug!(path = %path.display(), len, "Truncating archive to last committed entry");
            file.set_len(len)?;
            file.sync_all()?;
        }
        Self::open(path)
    }

    pub fn score_table(&self) -> ScoreTable {
        let mut columns = vec!["tag".to_string()];
        let mut positions: HashMap<&str, usize> = HashMap::new();
        for entry in &self.entries {
            for (key, _) in entry.metadata.iter() {
                if !positions.contains_key(key) {
                    positions.insert(key, columns.len());
                    columns.push(key.to_string());
                }
            }
        }
        let rows = self
            .entries
            .iter()
            .map(|entry| {
                let mut row = vec![String::new(); columns.len()];
                row[0] = entry.tag.clone();
                for (key, value) in entry.metadata.iter() {
                    row[positions[key]] = value.to_string();
                }
                row
            })
            .collect();
        ScoreTable { columns, rows }
    }

    /// Builds an archive at `dest` from loose HLT files. Each tag is the file stem and each
    /// body is copied verbatim after checking that it decodes.
    pub fn from_files<P: AsRef<Path>>(
        paths: &[P],
        dest: impl AsRef<Path>,
    ) -> Result<Quiver, QuiverError> {
        let mut archive = Quiver::create(dest)?;
        for path in paths {
            let (tag, body) = read_loose_file(path.as_ref())?;
            archive.append_raw(&tag, &Metadata::new(), &body)?;
        }
        Ok(archive)
    }

    /// Extracts entries as `<prefix><tag>.pdb` files in `dir`.
    ///
    /// Entries without score metadata are written byte-for-byte; entries with metadata are
    /// re-encoded so the metadata survives as HLT remarks. Existing files are skipped
    /// unless `force` is set.
    pub fn extract_to_dir<S: AsRef<str>>(
        &self,
        tags: Option<&[S]>,
        dir: impl AsRef<Path>,
        prefix: &str,
        force: bool,
    ) -> Result<ExtractSummary, QuiverError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let mut summary = ExtractSummary::default();
        let selected: Vec<&str> = match tags {
            Some(tags) => tags.iter().map(AsRef::as_ref).collect(),
            None => self.tags().collect(),
        };

        for tag in selected {
            let Ok(entry) = self.entry(tag) else {
                summary.missing.push(tag.to_string());
                continue;
            };
            let path = dir.join(format!("{prefix}{tag}.pdb"));
            if path.exists() && !force {
                summary.skipped.push(path);
                continue;
            }
            if entry.metadata.is_empty() {
                fs::write(&path, self.extract_lines(tag)?)?;
            } else {
                let record = self.extract(tag)?;
                HltFile::write_to_path(&record, &path).map_err(|source| QuiverError::Entry {
                    tag: tag.to_string(),
                    source,
                })?;
            }
            summary.written.push(path);
        }
        Ok(summary)
    }
}

/// Reads a loose structure file for archiving: returns its stem as the tag and its text,
/// after checking that the text decodes as HLT.
pub fn read_loose_file(path: &Path) -> Result<(String, String), QuiverError> {
    let tag = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    validate_tag(&tag)?;
    let body = fs::read_to_string(path)?;
    HltFile::read_from(&mut body.as_bytes()).map_err(|source| QuiverError::Entry {
        tag: tag.clone(),
        source,
    })?;
    validate_body(&tag, &body)?;
    Ok((tag, body))
}

/// Writes `(tag, body)` pairs from [`read_loose_file`] as archive entries without scores.
///
/// # Errors
///
/// Returns [`QuiverError::DuplicateTag`] before writing anything if two files share a stem.
pub fn write_loose_entries(
    entries: &[(String, String)],
    writer: &mut impl Write,
) -> Result<(), QuiverError> {
    let mut seen = HashSet::new();
    for (tag, _) in entries {
        if !seen.insert(tag.as_str()) {
            return Err(QuiverError::DuplicateTag(tag.clone()));
        }
    }
    let empty = Metadata::new();
    for (tag, body) in entries {
        let (bytes, _) = encode_entry(tag, &empty, body);
        writer.write_all(&bytes)?;
    }
    Ok(())
}

/// Lazy iterator over decoded entries, returned by [`Quiver::extract_all`].
pub struct Entries<'a> {
    archive: &'a Quiver,
    file: File,
    next: usize,
}

impl Iterator for Entries<'_> {
    type Item = Result<StructureRecord, QuiverError>;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.archive.entries.get(self.next)?;
        self.next += 1;
        Some(
            self.archive
                .read_body(&mut self.file, entry)
                .and_then(|body| self.archive.decode(entry, &body)),
        )
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.archive.entries.len() - self.next;
        (remaining, Some(remaining))
    }
}
