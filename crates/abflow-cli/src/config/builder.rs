use super::defaults::DefaultsConfig;
use super::file::FileConfig;
use super::models::{AppConfig, StageCommand};
use crate::cli::RunArgs;
use crate::error::{CliError, Result};
use crate::utils::parser;
use crate::weights::WeightsManager;
use abflow::core::models::loops::LoopLabel;
use abflow::engine::config as core_config;
use abflow::engine::hotspots::HotspotRef;
use abflow::engine::loop_spec::LoopSpec;
use abflow::engine::stage::StageKind;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

pub fn build_config(args: &RunArgs, weights: &WeightsManager) -> Result<AppConfig> {
    let defaults = DefaultsConfig::default();

    let file_config = match &args.config {
        Some(path) => FileConfig::from_file(path)?,
        None => FileConfig::default(),
    };
    let mut file_config = apply_set_values(file_config, &args.set_values)?;

    let run_file = file_config.run.take().unwrap_or_default();
    let inputs_file = file_config.inputs.take().unwrap_or_default();
    let backbone_file = file_config.backbone.take().unwrap_or_default();
    let sequence_file = file_config.sequence.take().unwrap_or_default();
    let prediction_file = file_config.prediction.take().unwrap_or_default();

    let target_path = resolve_input(
        args.target.as_deref(),
        inputs_file.target.as_deref(),
        "inputs.target",
        &file_config,
    )?;
    let framework_path = resolve_input(
        args.framework.as_deref(),
        inputs_file.framework.as_deref(),
        "inputs.framework",
        &file_config,
    )?;

    let num_designs = args
        .num_designs
        .or(run_file.num_designs)
        .unwrap_or(defaults.num_designs);
    let base_seed = args.seed.or(run_file.seed).ok_or_else(|| {
        CliError::Config(
            "A base seed is required either as `run.seed` in the config file or via --seed."
                .to_string(),
        )
    })?;

    let loop_expression = backbone_file.loops.as_deref().ok_or_else(|| {
        CliError::Config("`backbone.loops` is required, e.g. \"H1:7,H2:6,H3:5-13\".".to_string())
    })?;
    let loop_spec =
        LoopSpec::parse(loop_expression).map_err(|e| CliError::Config(e.to_string()))?;
    let hotspots = match backbone_file.hotspots.as_deref() {
        Some(list) => HotspotRef::parse_list(list).map_err(|e| CliError::Config(e.to_string()))?,
        None => Vec::new(),
    };
    let sequence_loops = sequence_file
        .loops
        .as_deref()
        .map(parse_loop_labels)
        .transpose()?;

    let mut backbone = core_config::BackboneConfigBuilder::new()
        .checkpoint(resolve_checkpoint(
            backbone_file.checkpoint.as_deref(),
            &defaults.backbone_checkpoint,
            StageKind::Backbone,
            weights,
            &file_config,
        )?)
        .loop_spec(loop_spec)
        .hotspots(hotspots)
        .final_step(backbone_file.final_step)
        .deterministic(backbone_file.deterministic.unwrap_or(defaults.deterministic));
    if let Some(proportion) = backbone_file.hotspot_proportion {
        backbone = backbone.hotspot_proportion(proportion);
    }
    if let Some(steps) = backbone_file.diffusion_steps {
        backbone = backbone.diffusion_steps(steps);
    }

    let mut sequence = core_config::SequenceConfigBuilder::new()
        .checkpoint(resolve_checkpoint(
            sequence_file.checkpoint.as_deref(),
            &defaults.sequence_checkpoint,
            StageKind::Sequence,
            weights,
            &file_config,
        )?)
        .loops(sequence_loops)
        .deterministic(sequence_file.deterministic.unwrap_or(defaults.deterministic));
    if let Some(n) = sequence_file.sequences_per_structure {
        sequence = sequence.sequences_per_structure(n);
    }
    if let Some(temperature) = sequence_file.temperature {
        sequence = sequence.temperature(temperature);
    }
    if let Some(codes) = sequence_file.omit_amino_acids {
        sequence = sequence.omit_amino_acids(codes);
    }

    let mut prediction = core_config::PredictionConfigBuilder::new().checkpoint(resolve_checkpoint(
        prediction_file.checkpoint.as_deref(),
        &defaults.prediction_checkpoint,
        StageKind::Prediction,
        weights,
        &file_config,
    )?);
    if let Some(recycles) = prediction_file.recycles {
        prediction = prediction.recycles(recycles);
    }
    if let Some(proportion) = prediction_file.hotspot_proportion {
        prediction = prediction.hotspot_proportion(proportion);
    }
    if let Some(cutoff) = prediction_file.contact_cutoff {
        prediction = prediction.contact_cutoff(cutoff);
    }
    if let Some(enabled) = prediction_file.compute_metrics {
        prediction = prediction.compute_metrics(enabled);
    }

    let mut pipeline = core_config::PipelineConfigBuilder::new()
        .run_dir(args.output.clone())
        .num_designs(num_designs)
        .base_seed(base_seed)
        .resume(args.resume)
        .backbone(build_stage(backbone.build())?)
        .sequence(build_stage(sequence.build())?)
        .prediction(build_stage(prediction.build())?);
    if let Some(prefix) = run_file.tag_prefix {
        pipeline = pipeline.tag_prefix(prefix);
    }
    if let Some(name_tag) = run_file.name_tag {
        pipeline = pipeline.name_tag(name_tag);
    }
    let core_config = build_stage(pipeline.build())?;

    let scratch_dir = match run_file.scratch_dir.as_deref() {
        Some(dir) => file_config.anchor(dir),
        None => args.output.join(&defaults.scratch_dir_name),
    };

    Ok(AppConfig {
        target_path,
        framework_path,
        backbone_command: stage_command(backbone_file.command, StageKind::Backbone)?,
        sequence_command: stage_command(sequence_file.command, StageKind::Sequence)?,
        prediction_command: stage_command(prediction_file.command, StageKind::Prediction)?,
        scratch_dir,
        keep_scratch: args.keep_scratch || run_file.keep_scratch.unwrap_or(defaults.keep_scratch),
        core_config,
    })
}

fn build_stage<T>(result: std::result::Result<T, core_config::ConfigError>) -> Result<T> {
    result.map_err(|e| CliError::Config(e.to_string()))
}

fn stage_command(command: Option<Vec<String>>, stage: StageKind) -> Result<StageCommand> {
    let mut parts = command.unwrap_or_default().into_iter();
    let program = parts.next().filter(|p| !p.trim().is_empty()).ok_or_else(|| {
        CliError::Config(format!(
            "`{stage}.command` is required: the program (and arguments) wrapping the {stage} model."
        ))
    })?;
    Ok(StageCommand {
        program,
        args: parts.collect(),
    })
}

fn parse_loop_labels(list: &str) -> Result<BTreeSet<LoopLabel>> {
    list.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| LoopLabel::from_str(t).map_err(|e| CliError::Config(e.to_string())))
        .collect()
}

fn resolve_input(
    cli_arg: Option<&Path>,
    file_arg: Option<&Path>,
    key: &str,
    file_config: &FileConfig,
) -> Result<PathBuf> {
    let path = match (cli_arg, file_arg) {
        (Some(path), _) => path.to_path_buf(),
        (None, Some(path)) => file_config.anchor(path),
        (None, None) => {
            return Err(CliError::Config(format!(
                "`{key}` is required either in the config file or via CLI argument."
            )));
        }
    };
    if !path.exists() {
        return Err(CliError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Provided path does not exist: {}", path.display()),
        )));
    }
    Ok(path)
}

fn resolve_checkpoint(
    file_arg: Option<&str>,
    default_arg: &str,
    stage: StageKind,
    weights: &WeightsManager,
    file_config: &FileConfig,
) -> Result<PathBuf> {
    let name_or_path = file_arg.unwrap_or(default_arg);

    if parser::looks_like_path(name_or_path) {
        let path = file_config.anchor(Path::new(name_or_path));
        if !path.exists() {
            return Err(CliError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Provided checkpoint does not exist: {}", path.display()),
            )));
        }
        return Ok(path);
    }

    let name = parser::parse_checkpoint_name(name_or_path, stage)
        .map_err(|e| CliError::Argument(e.to_string()))?;
    let resolved = weights.resolve(name);
    if !resolved.exists() {
        return Err(CliError::Weights(format!(
            "Checkpoint file does not exist: {:?}.\nHint: place the checkpoints in the directory shown by 'abflow weights path', or set ABFLOW_WEIGHTS.",
            resolved
        )));
    }
    debug!(stage = %stage, path = ?resolved, "Resolved checkpoint");
    Ok(resolved)
}

fn parse_value<T: FromStr>(key: &str, value: &str, kind: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        CliError::Config(format!("Invalid {kind} value for {key}: {value}"))
    })
}

fn apply_set_values(mut config: FileConfig, set_values: &[String]) -> Result<FileConfig> {
    for kv_pair in set_values {
        let Some((key, value)) = kv_pair.split_once('=') else {
            return Err(CliError::Config(format!(
                "Invalid --set format: '{kv_pair}'. Expected KEY=VALUE."
            )));
        };
        let key = key.trim();

        match key {
            _ if key.starts_with("run.") => {
                let run = config.run.get_or_insert_with(Default::default);
                match key {
                    "run.num-designs" => run.num_designs = Some(parse_value(key, value, "integer")?),
                    "run.seed" => run.seed = Some(parse_value(key, value, "integer")?),
                    "run.tag-prefix" => run.tag_prefix = Some(value.to_string()),
                    "run.name-tag" => run.name_tag = Some(value.to_string()),
                    "run.keep-scratch" => {
                        run.keep_scratch = Some(parse_value(key, value, "boolean")?)
                    }
                    _ => return Err(unsupported_key(key)),
                }
            }
            "inputs.target" => {
                config.inputs.get_or_insert_with(Default::default).target =
                    Some(PathBuf::from(value))
            }
            "inputs.framework" => {
                config.inputs.get_or_insert_with(Default::default).framework =
                    Some(PathBuf::from(value))
            }
            _ if key.starts_with("backbone.") => {
                let backbone = config.backbone.get_or_insert_with(Default::default);
                match key {
                    "backbone.checkpoint" => backbone.checkpoint = Some(value.to_string()),
                    "backbone.loops" => backbone.loops = Some(value.to_string()),
                    "backbone.hotspots" => backbone.hotspots = Some(value.to_string()),
                    "backbone.hotspot-proportion" => {
                        backbone.hotspot_proportion = Some(parse_value(key, value, "float")?)
                    }
                    "backbone.diffusion-steps" => {
                        backbone.diffusion_steps = Some(parse_value(key, value, "integer")?)
                    }
                    "backbone.final-step" => {
                        backbone.final_step = Some(parse_value(key, value, "integer")?)
                    }
                    "backbone.deterministic" => {
                        backbone.deterministic = Some(parse_value(key, value, "boolean")?)
                    }
                    _ => return Err(unsupported_key(key)),
                }
            }
            _ if key.starts_with("sequence.") => {
                let sequence = config.sequence.get_or_insert_with(Default::default);
                match key {
                    "sequence.checkpoint" => sequence.checkpoint = Some(value.to_string()),
                    "sequence.loops" => sequence.loops = Some(value.to_string()),
                    "sequence.sequences-per-structure" => {
                        sequence.sequences_per_structure = Some(parse_value(key, value, "integer")?)
                    }
                    "sequence.temperature" => {
                        sequence.temperature = Some(parse_value(key, value, "float")?)
                    }
                    "sequence.omit-amino-acids" => {
                        sequence.omit_amino_acids = Some(value.to_string())
                    }
                    "sequence.deterministic" => {
                        sequence.deterministic = Some(parse_value(key, value, "boolean")?)
                    }
                    _ => return Err(unsupported_key(key)),
                }
            }
            _ if key.starts_with("prediction.") => {
                let prediction = config.prediction.get_or_insert_with(Default::default);
                match key {
                    "prediction.checkpoint" => prediction.checkpoint = Some(value.to_string()),
                    "prediction.recycles" => {
                        prediction.recycles = Some(parse_value(key, value, "integer")?)
                    }
                    "prediction.hotspot-proportion" => {
                        prediction.hotspot_proportion = Some(parse_value(key, value, "float")?)
                    }
                    "prediction.contact-cutoff" => {
                        prediction.contact_cutoff = Some(parse_value(key, value, "float")?)
                    }
                    "prediction.compute-metrics" => {
                        prediction.compute_metrics = Some(parse_value(key, value, "boolean")?)
                    }
                    _ => return Err(unsupported_key(key)),
                }
            }
            _ => return Err(unsupported_key(key)),
        }
    }
    Ok(config)
}

fn unsupported_key(key: &str) -> CliError {
    CliError::Config(format!("Unsupported configuration key for --set: '{key}'"))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use abflow::engine::loop_spec::LoopLength;
    use once_cell::sync::Lazy;
    use std::fs;
    use tempfile::{TempDir, tempdir};

    static WEIGHTS: Lazy<TempDir> = Lazy::new(|| {
        let dir = tempdir().expect("create weights dir");
        for name in ["RFdiffusion_Ab.pt", "ProteinMPNN_v48_noise_0.2.pt", "RF2_ab.pt"] {
            fs::write(dir.path().join(name), b"").expect("write checkpoint");
        }
        dir
    });

    pub(crate) fn weights() -> WeightsManager {
        WeightsManager::with_custom_path(WEIGHTS.path().to_path_buf())
    }

    pub(crate) const PIPELINE: &str = r#"
        [run]
        seed = 42
        num-designs = 3

        [inputs]
        target = "target.pdb"
        framework = "framework.pdb"

        [backbone]
        command = ["python", "backbone.py", "--gpu"]
        loops = "H1:7,H3:5-13"
        hotspots = "T10,T12"
        diffusion-steps = 50

        [sequence]
        command = ["mpnn-stage"]

        [prediction]
        command = ["rf2-stage"]
        hotspot-proportion = 0.1
    "#;

    pub(crate) fn write_pipeline(dir: &Path, contents: &str) -> PathBuf {
        fs::write(dir.join("target.pdb"), b"").unwrap();
        fs::write(dir.join("framework.pdb"), b"").unwrap();
        let path = dir.join("pipeline.toml");
        fs::write(&path, contents).unwrap();
        path
    }

    pub(crate) fn base_run_args(config: Option<PathBuf>) -> RunArgs {
        RunArgs {
            config,
            output: PathBuf::from("runs/test"),
            target: None,
            framework: None,
            num_designs: None,
            seed: None,
            resume: false,
            keep_scratch: false,
            export_dir: None,
            force: false,
            set_values: vec![],
        }
    }

    #[test]
    fn file_values_build_a_complete_config() {
        let dir = tempdir().unwrap();
        let args = base_run_args(Some(write_pipeline(dir.path(), PIPELINE)));

        let app = build_config(&args, &weights()).expect("build ok");
        let cfg = &app.core_config;

        assert_eq!(app.target_path, dir.path().join("target.pdb"));
        assert_eq!(cfg.num_designs, 3);
        assert_eq!(cfg.base_seed, 42);
        assert_eq!(cfg.backbone.diffusion_steps, 50);
        assert_eq!(cfg.backbone.hotspots, vec![HotspotRef::new(10), HotspotRef::new(12)]);
        assert_eq!(
            cfg.backbone.loop_spec.get(LoopLabel::H3),
            Some(LoopLength::Range { min: 5, max: 13 })
        );
        assert_eq!(cfg.backbone.checkpoint, WEIGHTS.path().join("RFdiffusion_Ab.pt"));
        assert_eq!(cfg.prediction.checkpoint, WEIGHTS.path().join("RF2_ab.pt"));
        assert_eq!(cfg.sequence.sequences_per_structure, 1);
        assert_eq!(cfg.tag_prefix, "design");
        assert_eq!(app.backbone_command.program, "python");
        assert_eq!(app.backbone_command.args, vec!["backbone.py", "--gpu"]);
        assert_eq!(app.scratch_dir, PathBuf::from("runs/test/scratch"));
    }

    #[test]
    fn cli_flags_override_set_values_which_override_the_file() {
        let dir = tempdir().unwrap();
        let mut args = base_run_args(Some(write_pipeline(dir.path(), PIPELINE)));
        args.set_values = vec![
            "run.num-designs=7".to_string(),
            "run.seed=5".to_string(),
            "backbone.diffusion-steps=25".to_string(),
            "sequence.sequences-per-structure=4".to_string(),
            "sequence.loops=H3".to_string(),
            "prediction.recycles=3".to_string(),
        ];
        args.num_designs = Some(2);

        let app = build_config(&args, &weights()).expect("build ok");
        let cfg = &app.core_config;

        assert_eq!(cfg.num_designs, 2);
        assert_eq!(cfg.base_seed, 5);
        assert_eq!(cfg.backbone.diffusion_steps, 25);
        assert_eq!(cfg.sequence.sequences_per_structure, 4);
        assert_eq!(cfg.sequence.loops, Some(BTreeSet::from([LoopLabel::H3])));
        assert_eq!(cfg.prediction.recycles, 3);
    }

    #[test]
    fn missing_diffusion_steps_is_a_config_error() {
        let dir = tempdir().unwrap();
        let contents = PIPELINE.replace("diffusion-steps = 50", "");
        let args = base_run_args(Some(write_pipeline(dir.path(), &contents)));
        let err = build_config(&args, &weights()).unwrap_err();
        assert!(matches!(err, CliError::Config(msg) if msg.contains("diffusion_steps")));
    }

    #[test]
    fn missing_prediction_hotspot_proportion_is_a_config_error() {
        let dir = tempdir().unwrap();
        let contents = PIPELINE.replace("hotspot-proportion = 0.1", "");
        let args = base_run_args(Some(write_pipeline(dir.path(), &contents)));
        let err = build_config(&args, &weights()).unwrap_err();
        assert!(matches!(err, CliError::Config(msg) if msg.contains("hotspot_proportion")));
    }

    #[test]
    fn missing_seed_and_command_are_reported() {
        let dir = tempdir().unwrap();
        let no_seed = PIPELINE.replace("seed = 42", "");
        let args = base_run_args(Some(write_pipeline(dir.path(), &no_seed)));
        assert!(matches!(build_config(&args, &weights()), Err(CliError::Config(_))));

        let no_command = PIPELINE.replace("command = [\"rf2-stage\"]", "");
        let args = base_run_args(Some(write_pipeline(dir.path(), &no_command)));
        let err = build_config(&args, &weights()).unwrap_err();
        assert!(matches!(err, CliError::Config(msg) if msg.contains("prediction.command")));
    }

    #[test]
    fn checkpoint_names_must_match_their_stage() {
        let dir = tempdir().unwrap();
        let mut args = base_run_args(Some(write_pipeline(dir.path(), PIPELINE)));
        args.set_values = vec!["backbone.checkpoint=rf2".to_string()];
        assert!(matches!(
            build_config(&args, &weights()),
            Err(CliError::Argument(_))
        ));
    }

    #[test]
    fn checkpoint_paths_are_taken_verbatim_when_present() {
        let dir = tempdir().unwrap();
        let custom = dir.path().join("custom_rf2.pt");
        fs::write(&custom, b"").unwrap();
        let mut args = base_run_args(Some(write_pipeline(dir.path(), PIPELINE)));
        args.set_values = vec![format!("prediction.checkpoint={}", custom.display())];

        let app = build_config(&args, &weights()).expect("build ok");
        assert_eq!(app.core_config.prediction.checkpoint, custom);

        args.set_values = vec!["prediction.checkpoint=/no/such/file.pt".to_string()];
        assert!(matches!(build_config(&args, &weights()), Err(CliError::Io(_))));
    }

    #[test]
    fn unsupported_and_malformed_set_values_are_rejected() {
        for bad in ["backbone.diffuser-t=50", "run.num-designs", "prediction.recycles=many"] {
            let result = apply_set_values(FileConfig::default(), &[bad.to_string()]);
            assert!(matches!(result, Err(CliError::Config(_))), "{bad}");
        }
    }

    #[test]
    fn missing_input_file_is_reported() {
        let dir = tempdir().unwrap();
        let mut args = base_run_args(Some(write_pipeline(dir.path(), PIPELINE)));
        args.target = Some(dir.path().join("absent.pdb"));
        assert!(matches!(build_config(&args, &weights()), Err(CliError::Io(_))));
    }
}
