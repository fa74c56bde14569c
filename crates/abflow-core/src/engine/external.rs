//! A [`StageAdapter`] that runs an external program once per item.
//!
//! For every request the adapter prepares a scratch directory holding the HLT inputs and
//! a `request.toml` manifest, then runs `<program> <args...> <request.toml>` with the
//! manifest path also exported as `ABFLOW_REQUEST`. The program must write its results
//! as a Quiver archive at the manifest's `output` path (`output.qv` next to the manifest).

use super::hotspots::HotspotRef;
use super::stage::{
    BackboneRequest, PredictionRequest, SequenceRequest, StageAdapter, StageError, StageKind,
    StageRequest,
};
use crate::core::io::hlt::HltFile;
use crate::core::io::quiver::Quiver;
use crate::core::io::traits::StructureFile;
use crate::core::models::record::StructureRecord;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, warn};

pub const REQUEST_ENV_VAR: &str = "ABFLOW_REQUEST";
pub const REQUEST_FILE_NAME: &str = "request.toml";
pub const OUTPUT_FILE_NAME: &str = "output.qv";

const STDERR_TAIL_LINES: usize = 20;

#[derive(Serialize)]
struct BackboneManifest<'a> {
    stage: StageKind,
    tag: &'a str,
    seed: u64,
    checkpoint: &'a Path,
    target: PathBuf,
    framework: PathBuf,
    output: PathBuf,
    loop_spec: String,
    hotspots: &'a [HotspotRef],
    diffusion_steps: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    final_step: Option<u32>,
    deterministic: bool,
    loop_lengths: BTreeMap<String, usize>,
}

#[derive(Serialize)]
struct FixedChain {
    index: usize,
    chain: char,
    positions: Vec<usize>,
}

#[derive(Serialize)]
struct SequenceManifest<'a> {
    stage: StageKind,
    tag: &'a str,
    seed: u64,
    checkpoint: &'a Path,
    input: PathBuf,
    output: PathBuf,
    loops: Vec<String>,
    sequences_per_structure: usize,
    temperature: f64,
    omit_amino_acids: &'a str,
    deterministic: bool,
    fixed_residues: Vec<FixedChain>,
}

#[derive(Serialize)]
struct PredictionManifest<'a> {
    stage: StageKind,
    tag: &'a str,
    seed: u64,
    checkpoint: &'a Path,
    input: PathBuf,
    output: PathBuf,
    recycles: u32,
    hotspot_proportion: f64,
    hotspots: &'a [HotspotRef],
}

#[derive(Debug, Clone)]
pub struct ExternalStage {
    kind: StageKind,
    program: String,
    args: Vec<String>,
    scratch_root: PathBuf,
    keep_scratch: bool,
}

impl ExternalStage {
    pub fn new(
        kind: StageKind,
        program: impl Into<String>,
        args: Vec<String>,
        scratch_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            kind,
            program: program.into(),
            args,
            scratch_root: scratch_root.into(),
            keep_scratch: false,
        }
    }

    /// Leaves each item's scratch directory in place after the call.
    pub fn keep_scratch(mut self, keep: bool) -> Self {
        self.keep_scratch = keep;
        self
    }

    /// Item directories live at `<scratch_root>/<stage>/<tag>`.
    pub fn scratch_root(&self) -> &Path {
        &self.scratch_root
    }

    fn scratch_dir(&self, tag: &str) -> PathBuf {
        let safe: String = tag
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.scratch_root.join(self.kind.as_str()).join(safe)
    }

    fn write_manifest(path: &Path, manifest: &impl Serialize) -> Result<(), StageError> {
        let text = toml::to_string(manifest).map_err(|e| StageError::Request(e.to_string()))?;
        fs::write(path, text)?;
        Ok(())
    }

    fn prepare(&self, request: &StageRequest, dir: &Path) -> Result<PathBuf, StageError> {
        let manifest_path = dir.join(REQUEST_FILE_NAME);
        let output = dir.join(OUTPUT_FILE_NAME);
        match request {
            StageRequest::Backbone(r) => {
                let target = dir.join("target.pdb");
                write_target(r, &target)?;
                let framework = dir.join("framework.pdb");
                write_record(&r.framework, &framework)?;
                Self::write_manifest(
                    &manifest_path,
                    &BackboneManifest {
                        stage: StageKind::Backbone,
                        tag: &r.tag,
                        seed: r.seed,
                        checkpoint: &r.checkpoint,
                        target,
                        framework,
                        output,
                        loop_spec: r.loop_spec.to_string(),
                        hotspots: &r.hotspots,
                        diffusion_steps: r.diffusion_steps,
                        final_step: r.final_step,
                        deterministic: r.deterministic,
                        loop_lengths: r
                            .loop_lengths
                            .iter()
                            .map(|(label, len)| (label.to_string(), *len))
                            .collect(),
                    },
                )?;
            }
            StageRequest::Sequence(r) => {
                let input = dir.join("input.pdb");
                write_record(&r.record, &input)?;
                Self::write_manifest(&manifest_path, &sequence_manifest(r, input, output))?;
            }
            StageRequest::Prediction(r) => {
                let input = dir.join("input.pdb");
                write_record(&r.record, &input)?;
                Self::write_manifest(&manifest_path, &prediction_manifest(r, input, output))?;
            }
        }
        Ok(manifest_path)
    }

    fn run(&self, manifest: &Path, dir: &Path) -> Result<(), StageError> {
        debug!(program = %self.program, manifest = %manifest.display(), "Launching stage process");
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(manifest)
            .env(REQUEST_ENV_VAR, manifest)
            .current_dir(dir)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| StageError::Spawn {
                program: self.program.clone(),
                source,
            })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let lines: Vec<&str> = stderr.lines().collect();
            let tail = lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join("\n");
            return Err(StageError::Process {
                status: output.status.to_string(),
                stderr: tail,
            });
        }
        Ok(())
    }

    fn collect(dir: &Path) -> Result<Vec<StructureRecord>, StageError> {
        let path = dir.join(OUTPUT_FILE_NAME);
        if !path.is_file() {
            return Err(StageError::MissingOutput(path));
        }
        let archive = Quiver::open(&path)?;
        if archive.is_empty() {
            return Err(StageError::EmptyOutput);
        }
        Ok(archive.extract_all()?.collect::<Result<Vec<_>, _>>()?)
    }
}

fn write_record(record: &StructureRecord, path: &Path) -> Result<(), StageError> {
    HltFile::write_to_path(record, path).map_err(|e| StageError::Request(e.to_string()))
}

fn write_target(request: &BackboneRequest, path: &Path) -> Result<(), StageError> {
    let mut writer = BufWriter::new(File::create(path)?);
    HltFile::write_target(&request.target, &mut writer)?;
    writer.flush()?;
    Ok(())
}

fn sequence_manifest(r: &SequenceRequest, input: PathBuf, output: PathBuf) -> SequenceManifest<'_> {
    SequenceManifest {
        stage: StageKind::Sequence,
        tag: &r.tag,
        seed: r.seed,
        checkpoint: &r.checkpoint,
        input,
        output,
        loops: r.loops.iter().map(ToString::to_string).collect(),
        sequences_per_structure: r.sequences_per_structure,
        temperature: r.temperature,
        omit_amino_acids: &r.omit_amino_acids,
        deterministic: r.deterministic,
        fixed_residues: r
            .fixed_residues
            .iter()
            .map(|f| FixedChain {
                index: f.chain_index,
                chain: f.role.letter(),
                positions: f.positions.clone(),
            })
            .collect(),
    }
}

fn prediction_manifest(
    r: &PredictionRequest,
    input: PathBuf,
    output: PathBuf,
) -> PredictionManifest<'_> {
    PredictionManifest {
        stage: StageKind::Prediction,
        tag: &r.tag,
        seed: r.seed,
        checkpoint: &r.checkpoint,
        input,
        output,
        recycles: r.recycles,
        hotspot_proportion: r.hotspot_proportion,
        hotspots: &r.hotspots,
    }
}

impl StageAdapter for ExternalStage {
    fn kind(&self) -> StageKind {
        self.kind
    }

    fn invoke(&mut self, request: StageRequest) -> Result<Vec<StructureRecord>, StageError> {
        if request.kind() != self.kind {
            return Err(StageError::WrongStage {
                adapter: self.kind,
                request: request.kind(),
            });
        }
        // The child runs inside `dir`, so every path handed to it must be absolute.
        let dir = std::path::absolute(self.scratch_dir(request.tag()))?;
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        fs::create_dir_all(&dir)?;

        let manifest = self.prepare(&request, &dir)?;
        let result = self
            .run(&manifest, &dir)
            .and_then(|()| Self::collect(&dir));

        if !self.keep_scratch {
            if let Err(e) = fs::remove_dir_all(&dir) {
                warn!(dir = %dir.display(), "Failed to remove scratch directory: {}", e);
            }
        }
        result
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::core::models::metadata::Metadata;
    use crate::core::models::record::tests::sample_record;
    use tempfile::tempdir;

    fn prediction_request() -> StageRequest {
        StageRequest::Prediction(PredictionRequest {
            tag: "design_0_dldesign_0".into(),
            record: sample_record(),
            recycles: 3,
            hotspot_proportion: 0.5,
            hotspots: vec![HotspotRef::new(2)],
            seed: 99,
            checkpoint: "rf2.pt".into(),
        })
    }

    fn shell(kind: StageKind, script: &str, scratch: &Path) -> ExternalStage {
        ExternalStage::new(
            kind,
            "sh",
            vec!["-c".into(), script.into(), "stage".into()],
            scratch,
        )
    }

    #[test]
    fn reads_records_from_output_archive() {
        let dir = tempdir().unwrap();
        let canned = dir.path().join("canned.qv");
        let mut qv = Quiver::create(&canned).unwrap();
        let mut meta = Metadata::new();
        meta.insert("plddt", "0.91").unwrap();
        qv.append("predicted", &sample_record(), &meta).unwrap();

        let script = format!(
            "grep -q 'recycles = 3' \"$1\" && cp '{}' \"$(dirname \"$1\")/output.qv\"",
            canned.display()
        );
        let mut stage = shell(StageKind::Prediction, &script, &dir.path().join("scratch"));
        let records = stage.invoke(prediction_request()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].metadata().get("plddt"), Some("0.91"));
        assert!(!dir.path().join("scratch/prediction/design_0_dldesign_0").exists());
    }

    #[test]
    fn relative_scratch_root_yields_absolute_paths() {
        let outputs = tempdir().unwrap();
        let canned = outputs.path().join("canned.qv");
        Quiver::create(&canned)
            .unwrap()
            .append("predicted", &sample_record(), &Metadata::new())
            .unwrap();

        let scratch = tempfile::Builder::new()
            .prefix("scratch")
            .tempdir_in(".")
            .unwrap();
        let relative = PathBuf::from(scratch.path().file_name().unwrap());
        assert!(relative.is_relative());

        let script = format!(
            "test -f \"$1\" && test -f \"$ABFLOW_REQUEST\" || exit 7; \
             output=$(sed -n 's/^output = \"\\(.*\\)\"$/\\1/p' \"$1\"); \
             cp '{}' \"$output\"",
            canned.display()
        );
        let mut stage = shell(StageKind::Prediction, &script, &relative);
        let records = stage.invoke(prediction_request()).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn manifest_and_inputs_are_written() {
        let dir = tempdir().unwrap();
        let mut stage = shell(StageKind::Prediction, "exit 0", dir.path()).keep_scratch(true);
        let result = stage.invoke(prediction_request());
        assert!(matches!(result, Err(StageError::MissingOutput(_))));

        let item = dir.path().join("prediction/design_0_dldesign_0");
        let manifest = fs::read_to_string(item.join(REQUEST_FILE_NAME)).unwrap();
        assert!(manifest.contains("stage = \"prediction\""));
        assert!(manifest.contains("hotspots = [\"T2\"]"));
        assert!(manifest.contains("seed = 99"));
        let input = HltFile::read_from_path(item.join("input.pdb")).unwrap();
        assert_eq!(input.loops(), sample_record().loops());
    }

    #[test]
    fn nonzero_exit_reports_stderr_tail() {
        let dir = tempdir().unwrap();
        let mut stage = shell(StageKind::Prediction, "echo out of memory >&2; exit 3", dir.path());
        match stage.invoke(prediction_request()) {
            Err(StageError::Process { stderr, .. }) => assert_eq!(stderr, "out of memory"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn empty_output_archive_is_an_error() {
        let dir = tempdir().unwrap();
        let mut stage = shell(
            StageKind::Prediction,
            ": > \"$(dirname \"$1\")/output.qv\"",
            dir.path(),
        );
        assert!(matches!(
            stage.invoke(prediction_request()),
            Err(StageError::EmptyOutput)
        ));
    }

    #[test]
    fn rejects_requests_for_other_stages() {
        let dir = tempdir().unwrap();
        let mut stage = shell(StageKind::Backbone, "exit 0", dir.path());
        assert!(matches!(
            stage.invoke(prediction_request()),
            Err(StageError::WrongStage {
                adapter: StageKind::Backbone,
                request: StageKind::Prediction
            })
        ));
    }
}
