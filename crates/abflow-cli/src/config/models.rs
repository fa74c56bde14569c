use abflow::engine::config::PipelineConfig;
use std::path::PathBuf;

/// The program (and leading arguments) wrapping one stage's model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageCommand {
    pub program: String,
    pub args: Vec<String>,
}

#[derive(Debug)]
pub struct AppConfig {
    pub target_path: PathBuf,
    pub framework_path: PathBuf,
    pub backbone_command: StageCommand,
    pub sequence_command: StageCommand,
    pub prediction_command: StageCommand,
    pub scratch_dir: PathBuf,
    pub keep_scratch: bool,
    pub core_config: PipelineConfig,
}
