use crate::cli::{ConvertArgs, HltArgs, HltCommands};
use crate::error::{CliError, Result};
use abflow::core::io::chothia::{self, ChothiaOptions};
use abflow::core::io::hlt::HltFile;
use abflow::core::io::traits::StructureFile;
use abflow::core::models::record::StructureRecord;
use std::fmt::Write as _;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub async fn run(args: HltArgs) -> Result<()> {
    match args.command {
        HltCommands::Check { files } => handle_check(&files),
        HltCommands::Convert(args) => handle_convert(&args),
    }
}

fn describe(record: &StructureRecord) -> String {
    let mut out = record
        .chains()
        .iter()
        .map(|c| format!("{}({})", c.role.letter(), c.len()))
        .collect::<Vec<_>>()
        .join(" ");
    for (label, positions) in record.loops() {
        if let (Some(first), Some(last)) = (positions.first(), positions.last()) {
            let _ = write!(out, "  {label} {first}-{last} ({})", positions.len());
        }
    }
    if !record.metadata().is_empty() {
        let _ = write!(out, "  [{} metadata key(s)]", record.metadata().len());
    }
    out
}

fn check_file(path: &Path) -> std::result::Result<String, String> {
    match HltFile::read_from_path(path) {
        Ok(record) => Ok(describe(&record)),
        Err(structure_err) => match HltFile::read_target_from_path(path) {
            Ok(target) => Ok(format!("target only, T({})", target.len())),
            Err(_) => Err(structure_err.to_string()),
        },
    }
}

fn handle_check(files: &[PathBuf]) -> Result<()> {
    let mut failed = 0;
    for path in files {
        match check_file(path) {
            Ok(summary) => println!("✓ {}: {}", path.display(), summary),
            Err(reason) => {
                warn!("{} is not valid HLT: {}", path.display(), reason);
                println!("✗ {}: {}", path.display(), reason);
                failed += 1;
            }
        }
    }
    if failed > 0 {
        return Err(CliError::Argument(format!(
            "{failed} of {} file(s) are not valid HLT",
            files.len()
        )));
    }
    Ok(())
}

fn options_from_args(args: &ConvertArgs) -> Result<ChothiaOptions> {
    let mut options = ChothiaOptions::new(args.heavy);
    options.light = args.light;
    options.targets = args.target.clone();
    options.whole_fab = args.whole_fab;
    if let Some(crop) = args.hcrop {
        options.heavy_crop = crop;
    }
    if let Some(crop) = args.lcrop {
        options.light_crop = crop;
    }
    if let Some(crops) = &args.target_crop {
        options.target_crops =
            chothia::parse_target_crops(crops).map_err(|e| CliError::Argument(e.to_string()))?;
    }
    Ok(options)
}

fn handle_convert(args: &ConvertArgs) -> Result<()> {
    let options = options_from_args(args)?;
    info!("Converting {:?} with {:?}", &args.input, &options);

    let mut reader = BufReader::new(File::open(&args.input)?);
    let record = chothia::convert(&mut reader, &options).map_err(|e| CliError::FileParsing {
        path: args.input.clone(),
        source: e.into(),
    })?;

    HltFile::write_to_path(&record, &args.output).map_err(|e| CliError::FileParsing {
        path: args.output.clone(),
        source: e.into(),
    })?;
    println!("✓ {}: {}", args.output.display(), describe(&record));
    Ok(())
}
