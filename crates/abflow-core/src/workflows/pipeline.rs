use crate::core::io::quiver::{ExtractSummary, Quiver, QuiverError};
use crate::core::models::metadata::Metadata;
use crate::core::models::record::{StructureRecord, TargetStructure};
use crate::engine::config::PipelineConfig;
use crate::engine::error::EngineError;
use crate::engine::hotspots::{self, HotspotRef};
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::rmsd;
use crate::engine::seeding::{derive_seed, derive_tag_seed, rng_for};
use crate::engine::stage::{
    BackboneRequest, PredictionRequest, SequenceRequest, StageAdapter, StageError, StageKind,
    StageRequest,
};
use crate::engine::state::{ItemState, ItemStatus, RunState, STATE_FILE_NAME};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, instrument, warn};

/// The starting structures of a campaign.
#[derive(Debug, Clone)]
pub struct PipelineInputs {
    pub target: TargetStructure,
    /// Antibody framework (Heavy and optionally Light chains) with its loops annotated.
    pub framework: StructureRecord,
}

/// One adapter per stage, borrowed for the duration of a run.
pub struct StageAdapters<'a> {
    pub backbone: &'a mut dyn StageAdapter,
    pub sequence: &'a mut dyn StageAdapter,
    pub prediction: &'a mut dyn StageAdapter,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSummary {
    pub kind: StageKind,
    /// Items completed by an earlier run and not attempted again.
    pub skipped: usize,
    pub attempted: usize,
    pub done: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSummary {
    pub stages: Vec<StageSummary>,
    pub final_archive: PathBuf,
    pub final_tags: Vec<String>,
}

/// Runs backbone generation, sequence design and structure prediction over a batch.
///
/// Each stage is one pass over its items, so every surviving item finishes a stage
/// before the next stage starts. The run state is checkpointed after every item
/// transition, and each stage's outputs are appended to its own archive in the run
/// directory.
///
/// # Arguments
///
/// * `inputs` - The target and the annotated antibody framework.
/// * `config` - Batch size, base seed, run directory and per-stage parameters.
/// * `adapters` - The external model wrappers, one per stage.
/// * `reporter` - Receives progress events.
/// * `cancel` - Checked between items; when set the run stops with
///   [`EngineError::Cancelled`] and can be resumed later.
///
/// # Errors
///
/// Fails before dispatching anything if the inputs do not fit the configuration or the
/// stored run state does not match it. During the run, an individual item failure is
/// recorded and skipped; only a stage in which every item failed aborts the batch.
#[instrument(skip_all, name = "pipeline_workflow")]
pub fn run(
    inputs: &PipelineInputs,
    config: &PipelineConfig,
    adapters: StageAdapters<'_>,
    reporter: &ProgressReporter,
    cancel: &AtomicBool,
) -> Result<PipelineSummary, EngineError> {
    reporter.phase("Preparation");
    validate_inputs(inputs, config, &adapters)?;
    fs::create_dir_all(&config.run_dir)?;

    let state_path = config.run_dir.join(STATE_FILE_NAME);
    let (state, fresh) = load_or_init_state(&state_path, config)?;
    state.save(&state_path)?;
    reporter.report(Progress::PhaseFinish);

    let mut orchestrator = Orchestrator {
        inputs,
        config,
        reporter,
        cancel,
        state,
        state_path,
        fresh,
    };

    let StageAdapters {
        backbone,
        sequence,
        prediction,
    } = adapters;
    let stages = vec![
        orchestrator.run_stage(StageKind::Backbone, backbone)?,
        orchestrator.run_stage(StageKind::Sequence, sequence)?,
        orchestrator.run_stage(StageKind::Prediction, prediction)?,
    ];

    let final_archive = orchestrator.archive_path(StageKind::Prediction);
    let final_tags = Quiver::open(&final_archive)?.list_tags();
    info!(designs = final_tags.len(), "Pipeline finished");
    Ok(PipelineSummary {
        stages,
        final_archive,
        final_tags,
    })
}

/// Writes every final (prediction-stage) record of a run as a loose HLT file.
pub fn export(run_dir: &Path, dest: &Path, force: bool) -> Result<ExtractSummary, EngineError> {
    let archive = Quiver::open(run_dir.join(StageKind::Prediction.archive_name()))?;
    let summary = archive.extract_to_dir(None::<&[&str]>, dest, "", force)?;
    info!(
        written = summary.written.len(),
        skipped = summary.skipped.len(),
        "Exported final designs"
    );
    Ok(summary)
}

fn validate_inputs(
    inputs: &PipelineInputs,
    config: &PipelineConfig,
    adapters: &StageAdapters<'_>,
) -> Result<(), EngineError> {
    for (adapter, expected) in [
        (&*adapters.backbone, StageKind::Backbone),
        (&*adapters.sequence, StageKind::Sequence),
        (&*adapters.prediction, StageKind::Prediction),
    ] {
        if adapter.kind() != expected {
            return Err(EngineError::Initialization(format!(
                "a {} adapter was supplied for the {expected} stage",
                adapter.kind()
            )));
        }
    }
    if inputs.framework.has_target() {
        return Err(EngineError::Initialization(
            "the framework must contain only antibody chains".into(),
        ));
    }
    config.backbone.loop_spec.validate_against(&inputs.framework)?;
    for hotspot in &config.backbone.hotspots {
        hotspot.validate(inputs.target.len())?;
    }
    Ok(())
}

fn load_or_init_state(
    path: &Path,
    config: &PipelineConfig,
) -> Result<(RunState, bool), EngineError> {
    if !path.exists() {
        if config.resume {
            info!("No previous run state found; starting a new run");
        }
        return Ok((RunState::new(config.base_seed, config.num_designs), true));
    }
    if !config.resume {
        return Err(EngineError::Initialization(format!(
            "{} already holds a run; resume it or choose another directory",
            config.run_dir.display()
        )));
    }

    let state = RunState::load(path)?;
    if state.base_seed != config.base_seed {
        return Err(EngineError::ResumeMismatch {
            field: "base_seed",
            stored: state.base_seed.to_string(),
            requested: config.base_seed.to_string(),
        });
    }
    if state.num_designs != config.num_designs {
        return Err(EngineError::ResumeMismatch {
            field: "num_designs",
            stored: state.num_designs.to_string(),
            requested: config.num_designs.to_string(),
        });
    }
    info!(run_dir = %config.run_dir.display(), "Resuming run");
    Ok((state, false))
}

fn parent_stage(kind: StageKind) -> Option<StageKind> {
    match kind {
        StageKind::Backbone => None,
        StageKind::Sequence => Some(StageKind::Backbone),
        StageKind::Prediction => Some(StageKind::Sequence),
    }
}

/// Applies the carried-forward metadata in order: parent, model output, then stamps.
fn finish_output(
    record: StructureRecord,
    tag: String,
    parent: Option<&Metadata>,
    stamps: &Metadata,
) -> StructureRecord {
    let mut metadata = parent.cloned().unwrap_or_default();
    metadata.extend_from(record.metadata());
    metadata.extend_from(stamps);
    record.with_tag(tag).with_metadata(metadata)
}

struct Orchestrator<'a, 'r> {
    inputs: &'a PipelineInputs,
    config: &'a PipelineConfig,
    reporter: &'a ProgressReporter<'r>,
    cancel: &'a AtomicBool,
    state: RunState,
    state_path: PathBuf,
    fresh: bool,
}

impl Orchestrator<'_, '_> {
    fn archive_path(&self, kind: StageKind) -> PathBuf {
        self.config.run_dir.join(kind.archive_name())
    }

    fn save(&self) -> Result<(), EngineError> {
        Ok(self.state.save(&self.state_path)?)
    }

    /// Creates the stage's items: one per design for backbone generation, otherwise one
    /// per output of a completed parent item that has no item yet.
    fn ensure_items(&mut self, kind: StageKind) {
        let base_seed = self.config.base_seed;
        match parent_stage(kind) {
            None => {
                let stage = self.state.stage_mut(kind);
                if stage.items.is_empty() {
                    stage.items = (0..self.config.num_designs as u64)
                        .map(|ordinal| {
                            ItemState::new(
                                ordinal,
                                format!("{}_{ordinal}", self.config.tag_prefix),
                                derive_seed(base_seed, kind.salt(), ordinal),
                                None,
                            )
                        })
                        .collect();
                }
            }
            Some(parent) => {
                let inputs: Vec<(String, String)> = self
                    .state
                    .stage(parent)
                    .map(|s| {
                        s.done_outputs()
                            .into_iter()
                            .map(|(item, tag)| (item.tag.clone(), tag.to_string()))
                            .collect()
                    })
                    .unwrap_or_default();
                let stage = self.state.stage_mut(kind);
                let known: HashSet<String> = stage.items.iter().map(|i| i.tag.clone()).collect();
                for (parent_tag, tag) in inputs {
                    if known.contains(&tag) {
                        continue;
                    }
                    let seed = derive_tag_seed(base_seed, kind.salt(), &tag);
                    let ordinal = stage.items.len() as u64;
                    stage
                        .items
                        .push(ItemState::new(ordinal, tag, seed, Some(parent_tag)));
                }
            }
        }
    }

    /// Opens the stage archive, dropping anything not backed by a `Done` item: bytes past
    /// the last committed append and entries of items that did not finish.
    fn open_stage_archive(&self, kind: StageKind) -> Result<Quiver, EngineError> {
        let path = self.archive_path(kind);
        let Some(stage) = self.state.stage(kind) else {
            return Err(EngineError::Internal(format!("no state for the {kind} stage")));
        };
        if self.fresh || (!path.exists() && stage.committed_bytes == 0) {
            return Ok(Quiver::create(&path)?);
        }
        if !path.exists() {
            return Err(EngineError::Initialization(format!(
                "archive {} is missing but the run state records committed entries",
                path.display()
            )));
        }
        let committed: HashSet<&str> = stage.done_outputs().into_iter().map(|(_, t)| t).collect();
        let archive = Quiver::open_truncated(&path, stage.committed_bytes)?;
        let before = archive.len();
        let archive = archive.retain(|tag| committed.contains(tag))?;
        if archive.len() != before {
            info!(
                stage = %kind,
                purged = before - archive.len(),
                "Purged entries of unfinished items"
            );
        }
        Ok(archive)
    }

    fn run_stage(
        &mut self,
        kind: StageKind,
        adapter: &mut dyn StageAdapter,
    ) -> Result<StageSummary, EngineError> {
        self.reporter.phase(kind.to_string());
        let parent = match parent_stage(kind) {
            Some(p) => Some(Quiver::open(self.archive_path(p))?),
            None => None,
        };
        self.ensure_items(kind);
        let mut archive = self.open_stage_archive(kind)?;
        self.state.stage_mut(kind).committed_bytes = archive.byte_len();
        self.save()?;

        let pending: Vec<usize> = self
            .state
            .stage_mut(kind)
            .items
            .iter()
            .enumerate()
            .filter(|(_, item)| !item.is_done())
            .map(|(index, _)| index)
            .collect();
        let total = self.state.stage_mut(kind).items.len();
        let skipped = total - pending.len();
        if skipped > 0 {
            info!(stage = %kind, skipped, "Skipping items completed by an earlier run");
        }
        info!(stage = %kind, items = pending.len(), "Starting stage");
        self.reporter.report(Progress::TaskStart {
            total_steps: pending.len() as u64,
        });

        for index in pending.iter().copied() {
            if self.cancel.load(Ordering::SeqCst) {
                warn!(stage = %kind, "Cancellation requested; stopping before the next item");
                self.save()?;
                return Err(EngineError::Cancelled);
            }

            let item = {
                let item = &mut self.state.stage_mut(kind).items[index];
                item.status = ItemStatus::Running;
                item.attempts += 1;
                item.error = None;
                item.clone()
            };
            self.save()?;
            self.reporter.status(item.tag.as_str());
            debug!(stage = %kind, tag = %item.tag, seed = item.seed, "Dispatching item");

            let committed = archive.byte_len();
            let outcome = self
                .process_item(kind, &item, parent.as_ref(), &mut *adapter)
                .and_then(|outputs| commit(&mut archive, &outputs));

            match outcome {
                Ok(tags) => {
                    let stage = self.state.stage_mut(kind);
                    stage.committed_bytes = archive.byte_len();
                    let entry = &mut stage.items[index];
                    entry.status = ItemStatus::Done;
                    entry.outputs = tags;
                }
                Err(e) => {
                    warn!(stage = %kind, tag = %item.tag, "Item failed: {}", e);
                    self.reporter
                        .report(Progress::Message(format!("{} failed: {e}", item.tag)));
                    if fs::metadata(archive.path())?.len() != committed {
                        archive = Quiver::open_truncated(archive.path().to_path_buf(), committed)?;
                    }
                    let entry = &mut self.state.stage_mut(kind).items[index];
                    entry.status = ItemStatus::Failed;
                    entry.error = Some(e.to_string());
                }
            }
            self.save()?;
            self.reporter.report(Progress::TaskIncrement { amount: 1 });
        }
        self.reporter.report(Progress::TaskFinish);

        let stage = self.state.stage_mut(kind);
        let done = stage.count(ItemStatus::Done);
        let failed = stage.count(ItemStatus::Failed);
        info!(stage = %kind, done, failed, "Stage finished");
        self.reporter.report(Progress::PhaseFinish);

        if total > 0 && done == 0 {
            return Err(EngineError::StageFatal {
                stage: kind,
                failed,
            });
        }
        Ok(StageSummary {
            kind,
            skipped,
            attempted: pending.len(),
            done,
            failed,
        })
    }

    fn process_item(
        &self,
        kind: StageKind,
        item: &ItemState,
        parent: Option<&Quiver>,
        adapter: &mut dyn StageAdapter,
    ) -> Result<Vec<StructureRecord>, StageError> {
        let parent_archive = || {
            parent.ok_or_else(|| StageError::Request(format!("no input archive for {kind}")))
        };
        match kind {
            StageKind::Backbone => self.run_backbone(item, adapter),
            StageKind::Sequence => self.run_sequence(item, parent_archive()?, adapter),
            StageKind::Prediction => self.run_prediction(item, parent_archive()?, adapter),
        }
    }

    fn run_backbone(
        &self,
        item: &ItemState,
        adapter: &mut dyn StageAdapter,
    ) -> Result<Vec<StructureRecord>, StageError> {
        let cfg = &self.config.backbone;
        let mut rng = rng_for(item.seed);
        let loop_lengths = cfg.loop_spec.sample(&mut rng);
        let hotspots = hotspots::select(&cfg.hotspots, cfg.hotspot_proportion, &mut rng)?;

        let mut stamps = Metadata::new();
        stamps.insert("source_tag", &item.tag)?;
        stamps.insert("backbone_seed", item.seed)?;
        for label in cfg.loop_spec.labels() {
            let length = loop_lengths.get(&label).copied().or_else(|| {
                self.inputs
                    .framework
                    .loop_positions(label)
                    .map(<[usize]>::len)
            });
            if let Some(length) = length {
                stamps.insert(format!("{label}_length"), length)?;
            }
        }
        if !hotspots.is_empty() {
            stamps.insert("backbone_hotspots", HotspotRef::join(&hotspots))?;
        }

        let records = adapter.invoke(StageRequest::Backbone(BackboneRequest {
            tag: item.tag.clone(),
            target: self.inputs.target.clone(),
            framework: self.inputs.framework.clone(),
            loop_spec: cfg.loop_spec.clone(),
            loop_lengths,
            hotspots,
            checkpoint: cfg.checkpoint.clone(),
            diffusion_steps: cfg.diffusion_steps,
            final_step: cfg.final_step,
            deterministic: cfg.deterministic,
            seed: item.seed,
        }))?;
        if records.is_empty() {
            return Err(StageError::EmptyOutput);
        }

        let single = records.len() == 1;
        Ok(records
            .into_iter()
            .enumerate()
            .map(|(k, record)| {
                let tag = if single {
                    item.tag.clone()
                } else {
                    format!("{}_{k}", item.tag)
                };
                finish_output(record, tag, None, &stamps)
            })
            .collect())
    }

    fn run_sequence(
        &self,
        item: &ItemState,
        parent: &Quiver,
        adapter: &mut dyn StageAdapter,
    ) -> Result<Vec<StructureRecord>, StageError> {
        let cfg = &self.config.sequence;
        let record = parent.extract(&item.tag)?;
        let loops = self.config.sequence_loops();
        let fixed_residues = record.fixed_residues(&loops)?;
        let inherited = record.metadata().clone();

        let records = adapter.invoke(StageRequest::Sequence(SequenceRequest {
            tag: item.tag.clone(),
            record,
            loops,
            fixed_residues,
            sequences_per_structure: cfg.sequences_per_structure,
            temperature: cfg.temperature,
            omit_amino_acids: cfg.omit_amino_acids.clone(),
            deterministic: cfg.deterministic,
            seed: item.seed,
            checkpoint: cfg.checkpoint.clone(),
        }))?;
        if records.len() != cfg.sequences_per_structure {
            return Err(StageError::UnexpectedOutputCount {
                expected: cfg.sequences_per_structure,
                found: records.len(),
            });
        }

        let mut stamps = Metadata::new();
        stamps.insert("sequence_seed", item.seed)?;
        Ok(records
            .into_iter()
            .enumerate()
            .map(|(k, record)| {
                let tag = format!("{}_{}_{k}", item.tag, self.config.name_tag);
                finish_output(record, tag, Some(&inherited), &stamps)
            })
            .collect())
    }

    fn run_prediction(
        &self,
        item: &ItemState,
        parent: &Quiver,
        adapter: &mut dyn StageAdapter,
    ) -> Result<Vec<StructureRecord>, StageError> {
        let cfg = &self.config.prediction;
        let designed = parent.extract(&item.tag)?;
        let mut rng = rng_for(item.seed);
        let candidates = hotspots::contact_candidates(&designed, cfg.contact_cutoff);
        let hotspots = hotspots::select(&candidates, cfg.hotspot_proportion, &mut rng)?;

        let mut stamps = Metadata::new();
        stamps.insert("prediction_seed", item.seed)?;
        if !hotspots.is_empty() {
            stamps.insert("prediction_hotspots", HotspotRef::join(&hotspots))?;
        }

        let mut records = adapter.invoke(StageRequest::Prediction(PredictionRequest {
            tag: item.tag.clone(),
            record: designed.clone(),
            recycles: cfg.recycles,
            hotspot_proportion: cfg.hotspot_proportion,
            hotspots,
            seed: item.seed,
            checkpoint: cfg.checkpoint.clone(),
        }))?;
        if records.len() != 1 {
            return Err(StageError::UnexpectedOutputCount {
                expected: 1,
                found: records.len(),
            });
        }
        let Some(predicted) = records.pop() else {
            return Err(StageError::EmptyOutput);
        };

        if cfg.compute_metrics {
            match rmsd::compute(&designed, &predicted) {
                Ok(metrics) => {
                    for (key, value) in metrics.to_pairs() {
                        stamps.insert(key, value)?;
                    }
                }
                Err(e) => warn!(tag = %item.tag, "Skipping filter metrics: {}", e),
            }
        }
        Ok(vec![finish_output(
            predicted,
            item.tag.clone(),
            Some(designed.metadata()),
            &stamps,
        )])
    }
}

/// Appends all outputs of one item, refusing the whole set if any tag collides.
fn commit(archive: &mut Quiver, outputs: &[StructureRecord]) -> Result<Vec<String>, StageError> {
    let mut seen = HashSet::new();
    for record in outputs {
        if archive.contains(record.tag()) || !seen.insert(record.tag()) {
            return Err(QuiverError::DuplicateTag(record.tag().to_string()).into());
        }
    }
    for record in outputs {
        archive.append_record(record)?;
    }
    Ok(outputs.iter().map(|r| r.tag().to_string()).collect())
}
