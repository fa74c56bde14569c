use super::hotspots::HotspotRef;
use super::loop_spec::LoopSpec;
use crate::core::models::loops::LoopLabel;
use crate::core::utils::identifiers;
use std::collections::BTreeSet;
use std::path::PathBuf;
use thiserror::Error;

pub const DEFAULT_TAG_PREFIX: &str = "design";
pub const DEFAULT_NAME_TAG: &str = "dldesign";
pub const DEFAULT_SEQUENCES_PER_STRUCTURE: usize = 1;
pub const DEFAULT_TEMPERATURE: f64 = 0.1;
pub const DEFAULT_OMIT_AMINO_ACIDS: &str = "CX";
pub const DEFAULT_RECYCLES: u32 = 10;
pub const DEFAULT_CONTACT_CUTOFF: f64 = 10.0;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Invalid value for parameter '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

fn invalid(name: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidParameter {
        name,
        reason: reason.into(),
    }
}

fn check_proportion(name: &'static str, value: f64) -> Result<f64, ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(invalid(name, format!("{value} is outside [0, 1]")))
    }
}

fn check_name(name: &'static str, value: String) -> Result<String, ConfigError> {
    if value.is_empty() || value.chars().any(|c| c.is_whitespace() || c == '|') {
        Err(invalid(name, format!("'{value}' must be non-empty without whitespace")))
    } else {
        Ok(value)
    }
}

/// Parameters of the backbone-generation stage.
#[derive(Debug, Clone, PartialEq)]
pub struct BackboneConfig {
    pub checkpoint: PathBuf,
    pub loop_spec: LoopSpec,
    pub hotspots: Vec<HotspotRef>,
    /// Share of `hotspots` revealed to each design.
    pub hotspot_proportion: f64,
    /// Number of diffusion steps. Always explicit; the model's own default is not assumed.
    pub diffusion_steps: u32,
    pub final_step: Option<u32>,
    pub deterministic: bool,
}

#[derive(Default)]
pub struct BackboneConfigBuilder {
    checkpoint: Option<PathBuf>,
    loop_spec: Option<LoopSpec>,
    hotspots: Vec<HotspotRef>,
    hotspot_proportion: Option<f64>,
    diffusion_steps: Option<u32>,
    final_step: Option<u32>,
    deterministic: bool,
}

impl BackboneConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn checkpoint(mut self, path: PathBuf) -> Self {
        self.checkpoint = Some(path);
        self
    }
    pub fn loop_spec(mut self, spec: LoopSpec) -> Self {
        self.loop_spec = Some(spec);
        self
    }
    pub fn hotspots(mut self, hotspots: Vec<HotspotRef>) -> Self {
        self.hotspots = hotspots;
        self
    }
    pub fn hotspot_proportion(mut self, proportion: f64) -> Self {
        self.hotspot_proportion = Some(proportion);
        self
    }
    pub fn diffusion_steps(mut self, steps: u32) -> Self {
        self.diffusion_steps = Some(steps);
        self
    }
    pub fn final_step(mut self, step: Option<u32>) -> Self {
        self.final_step = step;
        self
    }
    pub fn deterministic(mut self, deterministic: bool) -> Self {
        self.deterministic = deterministic;
        self
    }

    pub fn build(self) -> Result<BackboneConfig, ConfigError> {
        let diffusion_steps = self
            .diffusion_steps
            .ok_or(ConfigError::MissingParameter("diffusion_steps"))?;
        if diffusion_steps == 0 {
            return Err(invalid("diffusion_steps", "must be at least 1"));
        }
        if let Some(step) = self.final_step {
            if step == 0 || step > diffusion_steps {
                return Err(invalid(
                    "final_step",
                    format!("{step} is outside 1..={diffusion_steps}"),
                ));
            }
        }
        Ok(BackboneConfig {
            checkpoint: self
                .checkpoint
                .ok_or(ConfigError::MissingParameter("backbone checkpoint"))?,
            loop_spec: self
                .loop_spec
                .ok_or(ConfigError::MissingParameter("loop_spec"))?,
            hotspots: self.hotspots,
            hotspot_proportion: check_proportion(
                "backbone hotspot_proportion",
                self.hotspot_proportion.unwrap_or(1.0),
            )?,
            diffusion_steps,
            final_step: self.final_step,
            deterministic: self.deterministic,
        })
    }
}

/// Parameters of the sequence-design stage.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceConfig {
    pub checkpoint: PathBuf,
    /// Loops to redesign; `None` redesigns the loops named by the backbone loop spec.
    pub loops: Option<BTreeSet<LoopLabel>>,
    pub sequences_per_structure: usize,
    pub temperature: f64,
    pub omit_amino_acids: String,
    pub deterministic: bool,
}

#[derive(Default)]
pub struct SequenceConfigBuilder {
    checkpoint: Option<PathBuf>,
    loops: Option<BTreeSet<LoopLabel>>,
    sequences_per_structure: Option<usize>,
    temperature: Option<f64>,
    omit_amino_acids: Option<String>,
    deterministic: bool,
}

impl SequenceConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn checkpoint(mut self, path: PathBuf) -> Self {
        self.checkpoint = Some(path);
        self
    }
    pub fn loops(mut self, loops: Option<BTreeSet<LoopLabel>>) -> Self {
        self.loops = loops;
        self
    }
    pub fn sequences_per_structure(mut self, n: usize) -> Self {
        self.sequences_per_structure = Some(n);
        self
    }
    pub fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }
    pub fn omit_amino_acids(mut self, codes: impl Into<String>) -> Self {
        self.omit_amino_acids = Some(codes.into());
        self
    }
    pub fn deterministic(mut self, deterministic: bool) -> Self {
        self.deterministic = deterministic;
        self
    }

    pub fn build(self) -> Result<SequenceConfig, ConfigError> {
        let sequences_per_structure = self
            .sequences_per_structure
            .unwrap_or(DEFAULT_SEQUENCES_PER_STRUCTURE);
        if sequences_per_structure == 0 {
            return Err(invalid("sequences_per_structure", "must be at least 1"));
        }
        let temperature = self.temperature.unwrap_or(DEFAULT_TEMPERATURE);
        if !(temperature > 0.0 && temperature.is_finite()) {
            return Err(invalid("temperature", format!("{temperature} must be positive")));
        }
        let omit_amino_acids = self
            .omit_amino_acids
            .unwrap_or_else(|| DEFAULT_OMIT_AMINO_ACIDS.to_string())
            .to_ascii_uppercase();
        if let Some(bad) = omit_amino_acids
            .chars()
            .find(|&c| c != 'X' && identifiers::one_to_three(c).is_none())
        {
            return Err(invalid(
                "omit_amino_acids",
                format!("'{bad}' is not a one-letter amino-acid code"),
            ));
        }
        Ok(SequenceConfig {
            checkpoint: self
                .checkpoint
                .ok_or(ConfigError::MissingParameter("sequence checkpoint"))?,
            loops: self.loops,
            sequences_per_structure,
            temperature,
            omit_amino_acids,
            deterministic: self.deterministic,
        })
    }
}

/// Parameters of the structure-prediction (filtering) stage.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionConfig {
    pub checkpoint: PathBuf,
    pub recycles: u32,
    /// Share of contact hotspots revealed to the predictor. Always explicit.
    pub hotspot_proportion: f64,
    /// Distance (Angstroms) defining a target residue as in contact with the loops.
    pub contact_cutoff: f64,
    pub compute_metrics: bool,
}

#[derive(Default)]
pub struct PredictionConfigBuilder {
    checkpoint: Option<PathBuf>,
    recycles: Option<u32>,
    hotspot_proportion: Option<f64>,
    contact_cutoff: Option<f64>,
    compute_metrics: Option<bool>,
}

impl PredictionConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn checkpoint(mut self, path: PathBuf) -> Self {
        self.checkpoint = Some(path);
        self
    }
    pub fn recycles(mut self, recycles: u32) -> Self {
        self.recycles = Some(recycles);
        self
    }
    pub fn hotspot_proportion(mut self, proportion: f64) -> Self {
        self.hotspot_proportion = Some(proportion);
        self
    }
    pub fn contact_cutoff(mut self, cutoff: f64) -> Self {
        self.contact_cutoff = Some(cutoff);
        self
    }
    pub fn compute_metrics(mut self, enabled: bool) -> Self {
        self.compute_metrics = Some(enabled);
        self
    }

    pub fn build(self) -> Result<PredictionConfig, ConfigError> {
        let recycles = self.recycles.unwrap_or(DEFAULT_RECYCLES);
        if recycles == 0 {
            return Err(invalid("recycles", "must be at least 1"));
        }
        let contact_cutoff = self.contact_cutoff.unwrap_or(DEFAULT_CONTACT_CUTOFF);
        if !(contact_cutoff > 0.0 && contact_cutoff.is_finite()) {
            return Err(invalid("contact_cutoff", format!("{contact_cutoff} must be positive")));
        }
        Ok(PredictionConfig {
            checkpoint: self
                .checkpoint
                .ok_or(ConfigError::MissingParameter("prediction checkpoint"))?,
            recycles,
            hotspot_proportion: check_proportion(
                "prediction hotspot_proportion",
                self.hotspot_proportion
                    .ok_or(ConfigError::MissingParameter("prediction hotspot_proportion"))?,
            )?,
            contact_cutoff,
            compute_metrics: self.compute_metrics.unwrap_or(true),
        })
    }
}

/// Everything needed to drive one design campaign.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub run_dir: PathBuf,
    pub num_designs: usize,
    pub base_seed: u64,
    /// Stage-1 items are tagged `<tag_prefix>_<ordinal>`.
    pub tag_prefix: String,
    /// Stage-2 outputs are tagged `<parent>_<name_tag>_<k>`.
    pub name_tag: String,
    pub resume: bool,
    pub backbone: BackboneConfig,
    pub sequence: SequenceConfig,
    pub prediction: PredictionConfig,
}

impl PipelineConfig {
    /// The loops redesigned by the sequence stage.
    pub fn sequence_loops(&self) -> BTreeSet<LoopLabel> {
        self.sequence
            .loops
            .clone()
            .unwrap_or_else(|| self.backbone.loop_spec.labels())
    }
}

#[derive(Default)]
pub struct PipelineConfigBuilder {
    run_dir: Option<PathBuf>,
    num_designs: Option<usize>,
    base_seed: Option<u64>,
    tag_prefix: Option<String>,
    name_tag: Option<String>,
    resume: bool,
    backbone: Option<BackboneConfig>,
    sequence: Option<SequenceConfig>,
    prediction: Option<PredictionConfig>,
}

impl PipelineConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run_dir(mut self, path: PathBuf) -> Self {
        self.run_dir = Some(path);
        self
    }
    pub fn num_designs(mut self, n: usize) -> Self {
        self.num_designs = Some(n);
        self
    }
    pub fn base_seed(mut self, seed: u64) -> Self {
        self.base_seed = Some(seed);
        self
    }
    pub fn tag_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.tag_prefix = Some(prefix.into());
        self
    }
    pub fn name_tag(mut self, name_tag: impl Into<String>) -> Self {
        self.name_tag = Some(name_tag.into());
        self
    }
    pub fn resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }
    pub fn backbone(mut self, config: BackboneConfig) -> Self {
        self.backbone = Some(config);
        self
    }
    pub fn sequence(mut self, config: SequenceConfig) -> Self {
        self.sequence = Some(config);
        self
    }
    pub fn prediction(mut self, config: PredictionConfig) -> Self {
        self.prediction = Some(config);
        self
    }

    pub fn build(self) -> Result<PipelineConfig, ConfigError> {
        let num_designs = self
            .num_designs
            .ok_or(ConfigError::MissingParameter("num_designs"))?;
        if num_designs == 0 {
            return Err(invalid("num_designs", "must be at least 1"));
        }
        let base_seed = self
            .base_seed
            .ok_or(ConfigError::MissingParameter("base_seed"))?;
        if base_seed > i64::MAX as u64 {
            return Err(invalid("base_seed", format!("{base_seed} exceeds {}", i64::MAX)));
        }
        Ok(PipelineConfig {
            run_dir: self.run_dir.ok_or(ConfigError::MissingParameter("run_dir"))?,
            num_designs,
            base_seed,
            tag_prefix: check_name(
                "tag_prefix",
                self.tag_prefix
                    .unwrap_or_else(|| DEFAULT_TAG_PREFIX.to_string()),
            )?,
            name_tag: check_name(
                "name_tag",
                self.name_tag.unwrap_or_else(|| DEFAULT_NAME_TAG.to_string()),
            )?,
            resume: self.resume,
            backbone: self
                .backbone
                .ok_or(ConfigError::MissingParameter("backbone"))?,
            sequence: self
                .sequence
                .ok_or(ConfigError::MissingParameter("sequence"))?,
            prediction: self
                .prediction
                .ok_or(ConfigError::MissingParameter("prediction"))?,
        })
    }
}
