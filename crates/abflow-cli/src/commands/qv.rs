use crate::cli::{QvArgs, QvCommands};
use crate::error::{CliError, Result};
use crate::utils::input::{tags_from_args_or_stdin, with_output};
use abflow::core::io::quiver::{self, ExtractSummary, Quiver, QuiverError};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub async fn run(args: QvArgs) -> Result<()> {
    match args.command {
        QvCommands::Ls { archive } => handle_ls(&archive),
        QvCommands::Extract {
            archive,
            output_dir,
            prefix,
            force,
        } => handle_extract(&archive, output_dir, &prefix, force),
        QvCommands::ExtractSpecific {
            archive,
            tags,
            output_dir,
            force,
        } => {
            let tags = tags_from_args_or_stdin(tags, "tags")?;
            handle_extract_specific(&archive, &tags, output_dir, force)
        }
        QvCommands::Slice {
            archive,
            tags,
            output,
        } => {
            let tags = tags_from_args_or_stdin(tags, "tags")?;
            handle_slice(&archive, &tags, output.as_deref())
        }
        QvCommands::Split {
            archive,
            chunk_size,
            output_dir,
            prefix,
        } => handle_split(&archive, chunk_size, output_dir, &prefix),
        QvCommands::Rename {
            archive,
            new_tags,
            output,
        } => {
            let new_tags = tags_from_args_or_stdin(new_tags, "new tag names")?;
            handle_rename(&archive, new_tags, output.as_deref())
        }
        QvCommands::Scorefile { archive, output } => handle_scorefile(&archive, output.as_deref()),
        QvCommands::FromPdbs { files, output } => handle_from_pdbs(&files, output.as_deref()),
        QvCommands::Concat { archives, output } => handle_concat(&archives, output.as_deref()),
    }
}

fn open(path: &Path) -> Result<Quiver> {
    debug!("Opening archive {:?}", path);
    Ok(Quiver::open(path)?)
}

fn output_dir_or_cwd(dir: Option<PathBuf>) -> Result<PathBuf> {
    match dir {
        Some(dir) => Ok(dir),
        None => Ok(std::env::current_dir()?),
    }
}

fn report_extract(summary: &ExtractSummary) {
    for path in &summary.skipped {
        eprintln!("File {} already exists, skipping", path.display());
    }
    for tag in &summary.missing {
        eprintln!("Warning: Tag {tag} not found in archive");
    }
    println!("Successfully extracted {} PDB file(s)", summary.written.len());
    if !summary.skipped.is_empty() {
        eprintln!(
            "Skipped {} existing file(s) (use --force to overwrite)",
            summary.skipped.len()
        );
    }
}

fn handle_ls(path: &Path) -> Result<()> {
    let archive = open(path)?;
    with_output(None, |w| {
        for tag in archive.tags() {
            writeln!(w, "{tag}")?;
        }
        Ok(())
    })
}

fn handle_extract(path: &Path, dir: Option<PathBuf>, prefix: &str, force: bool) -> Result<()> {
    let archive = open(path)?;
    let dir = output_dir_or_cwd(dir)?;
    let summary = archive.extract_to_dir(None::<&[String]>, &dir, prefix, force)?;
    info!(written = summary.written.len(), "Extracted archive {:?}", path);
    report_extract(&summary);
    Ok(())
}

fn handle_extract_specific(
    path: &Path,
    tags: &[String],
    dir: Option<PathBuf>,
    force: bool,
) -> Result<()> {
    let archive = open(path)?;
    let dir = output_dir_or_cwd(dir)?;
    let summary = archive.extract_to_dir(Some(tags), &dir, "", force)?;
    report_extract(&summary);
    Ok(())
}

fn handle_slice(path: &Path, tags: &[String], output: Option<&Path>) -> Result<()> {
    let archive = open(path)?;
    if !tags.iter().any(|t| archive.contains(t)) {
        return Err(CliError::Argument(
            "None of the specified tags were found".to_string(),
        ));
    }
    let missing = match output {
        Some(dest) => archive.slice(tags, dest)?.1,
        None => {
            let mut missing = Vec::new();
            with_output(None, |mut w| {
                missing = archive.slice_to(tags, &mut w)?;
                Ok(())
            })?;
            missing
        }
    };
    if !missing.is_empty() {
        eprintln!(
            "Warning: {} tag(s) not found: {}",
            missing.len(),
            missing.join(", ")
        );
    }
    Ok(())
}

fn handle_split(path: &Path, chunk_size: usize, dir: Option<PathBuf>, prefix: &str) -> Result<()> {
    let archive = open(path)?;
    let dir = output_dir_or_cwd(dir)?;
    let parts = archive.split(chunk_size, &dir, prefix)?;
    println!(
        "Split {} structures into {} file(s) in {}",
        archive.len(),
        parts.len(),
        dir.display()
    );
    Ok(())
}

/// Pairs every tag, in archive order, with its replacement.
fn rename_mapping(archive: &Quiver, new_tags: Vec<String>) -> Result<BTreeMap<String, String>> {
    if new_tags.len() != archive.len() {
        return Err(CliError::Argument(format!(
            "Number of tags in file ({}) does not match number of new tags provided ({})",
            archive.len(),
            new_tags.len()
        )));
    }
    Ok(archive
        .tags()
        .map(str::to_string)
        .zip(new_tags)
        .filter(|(old, new)| old != new)
        .collect())
}

fn handle_rename(path: &Path, new_tags: Vec<String>, output: Option<&Path>) -> Result<()> {
    let archive = open(path)?;
    let mapping = rename_mapping(&archive, new_tags)?;
    match output {
        Some(dest) => {
            archive.rename(&mapping, dest)?;
        }
        None => with_output(None, |mut w| Ok(archive.rename_to(&mapping, &mut w)?))?,
    }
    Ok(())
}

fn handle_scorefile(path: &Path, output: Option<&Path>) -> Result<()> {
    let archive = open(path)?;
    let table = archive.score_table();
    if table.columns.len() <= 1 {
        return Err(CliError::Argument(
            "No score lines found in archive".to_string(),
        ));
    }
    with_output(output, |mut w| {
        table.write_tsv(&mut w).map_err(QuiverError::from)?;
        Ok(())
    })
}

/// Reads and validates the loose files in parallel, keeping argument order.
fn read_loose_files(files: &[PathBuf]) -> Result<Vec<(String, String)>> {
    let entries = files
        .par_iter()
        .map(|path| quiver::read_loose_file(path))
        .collect::<std::result::Result<Vec<_>, QuiverError>>()?;
    Ok(entries)
}

fn handle_from_pdbs(files: &[PathBuf], output: Option<&Path>) -> Result<()> {
    let entries = read_loose_files(files)?;
    info!(files = entries.len(), "Read loose structure files");
    with_output(output, |mut w| Ok(quiver::write_loose_entries(&entries, &mut w)?))
}

fn handle_concat(paths: &[PathBuf], output: Option<&Path>) -> Result<()> {
    let archives = paths
        .iter()
        .map(|p| open(p))
        .collect::<Result<Vec<_>>>()?;
    match output {
        Some(dest) => {
            let merged = Quiver::concat(&archives, dest)?;
            eprintln!("Wrote {} entries to {}", merged.len(), dest.display());
        }
        None => with_output(None, |mut w| Ok(Quiver::concat_to(&archives, &mut w)?))?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use abflow::core::io::hlt::HltFile;
    use abflow::core::io::traits::StructureFile;
    use std::fs;
    use tempfile::tempdir;

    const BODY: &str = "\
ATOM      1  CA  GLY H   1       0.000   0.000   0.000  1.00  0.00           C
TER
END
";

    fn loose_files(dir: &Path, stems: &[&str]) -> Vec<PathBuf> {
        stems
            .iter()
            .map(|stem| {
                let path = dir.join(format!("{stem}.pdb"));
                fs::write(&path, BODY).unwrap();
                path
            })
            .collect()
    }

    #[test]
    fn from_pdbs_then_rename_and_extract() {
        let dir = tempdir().unwrap();
        let files = loose_files(dir.path(), &["a", "b"]);
        let qv_path = dir.path().join("all.qv");
        handle_from_pdbs(&files, Some(&qv_path)).unwrap();
        assert_eq!(open(&qv_path).unwrap().list_tags(), vec!["a", "b"]);

        let renamed = dir.path().join("renamed.qv");
        handle_rename(&qv_path, vec!["x".into(), "b".into()], Some(&renamed)).unwrap();
        let archive = open(&renamed).unwrap();
        assert_eq!(archive.list_tags(), vec!["x", "b"]);

        let out = dir.path().join("pdbs");
        handle_extract(&renamed, Some(out.clone()), "", false).unwrap();
        assert_eq!(fs::read_to_string(out.join("x.pdb")).unwrap(), BODY);
        assert!(HltFile::read_from_path(out.join("b.pdb")).is_ok());
    }

    #[test]
    fn rename_requires_one_new_tag_per_entry() {
        let dir = tempdir().unwrap();
        let files = loose_files(dir.path(), &["a", "b"]);
        let qv_path = dir.path().join("all.qv");
        handle_from_pdbs(&files, Some(&qv_path)).unwrap();
        let archive = open(&qv_path).unwrap();
        assert!(matches!(
            rename_mapping(&archive, vec!["only".into()]),
            Err(CliError::Argument(_))
        ));
        let mapping = rename_mapping(&archive, vec!["a".into(), "c".into()]).unwrap();
        assert_eq!(mapping, BTreeMap::from([("b".to_string(), "c".to_string())]));
    }

    #[test]
    fn slice_rejects_selections_with_no_known_tags() {
        let dir = tempdir().unwrap();
        let files = loose_files(dir.path(), &["a"]);
        let qv_path = dir.path().join("one.qv");
        handle_from_pdbs(&files, Some(&qv_path)).unwrap();
        let dest = dir.path().join("slice.qv");
        assert!(matches!(
            handle_slice(&qv_path, &["zzz".to_string()], Some(&dest)),
            Err(CliError::Argument(_))
        ));
        handle_slice(&qv_path, &["a".to_string(), "zzz".to_string()], Some(&dest)).unwrap();
        assert_eq!(open(&dest).unwrap().list_tags(), vec!["a"]);
    }

    #[test]
    fn split_and_concat_round_trip_through_files() {
        let dir = tempdir().unwrap();
        let files = loose_files(dir.path(), &["a", "b", "c"]);
        let qv_path = dir.path().join("all.qv");
        handle_from_pdbs(&files, Some(&qv_path)).unwrap();

        let parts_dir = dir.path().join("parts");
        handle_split(&qv_path, 2, Some(parts_dir.clone()), "chunk").unwrap();
        let parts = [parts_dir.join("chunk_0.qv"), parts_dir.join("chunk_1.qv")];
        let merged = dir.path().join("merged.qv");
        handle_concat(&parts, Some(&merged)).unwrap();
        assert_eq!(fs::read(&merged).unwrap(), fs::read(&qv_path).unwrap());
    }

    #[test]
    fn scorefile_requires_score_lines() {
        let dir = tempdir().unwrap();
        let files = loose_files(dir.path(), &["a"]);
        let qv_path = dir.path().join("plain.qv");
        handle_from_pdbs(&files, Some(&qv_path)).unwrap();
        let out = dir.path().join("scores.tsv");
        assert!(matches!(
            handle_scorefile(&qv_path, Some(&out)),
            Err(CliError::Argument(_))
        ));
    }

    #[test]
    fn from_pdbs_reports_duplicate_stems() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("nested");
        fs::create_dir_all(&nested).unwrap();
        let mut files = loose_files(dir.path(), &["a"]);
        files.extend(loose_files(&nested, &["a"]));
        assert!(matches!(
            read_loose_files(&files).and_then(|entries| {
                let mut sink = Vec::new();
                Ok(quiver::write_loose_entries(&entries, &mut sink)?)
            }),
            Err(CliError::Archive(QuiverError::DuplicateTag(_)))
        ));
    }
}
