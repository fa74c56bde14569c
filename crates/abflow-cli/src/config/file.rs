use crate::error::{CliError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileRunConfig {
    pub num_designs: Option<usize>,
    pub seed: Option<u64>,
    pub tag_prefix: Option<String>,
    pub name_tag: Option<String>,
    pub scratch_dir: Option<PathBuf>,
    pub keep_scratch: Option<bool>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct FileInputsConfig {
    pub target: Option<PathBuf>,
    pub framework: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileBackboneConfig {
    pub checkpoint: Option<String>,
    pub command: Option<Vec<String>>,
    pub loops: Option<String>,
    pub hotspots: Option<String>,
    pub hotspot_proportion: Option<f64>,
    pub diffusion_steps: Option<u32>,
    pub final_step: Option<u32>,
    pub deterministic: Option<bool>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileSequenceConfig {
    pub checkpoint: Option<String>,
    pub command: Option<Vec<String>>,
    pub loops: Option<String>,
    pub sequences_per_structure: Option<usize>,
    pub temperature: Option<f64>,
    pub omit_amino_acids: Option<String>,
    pub deterministic: Option<bool>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FilePredictionConfig {
    pub checkpoint: Option<String>,
    pub command: Option<Vec<String>>,
    pub recycles: Option<u32>,
    pub hotspot_proportion: Option<f64>,
    pub contact_cutoff: Option<f64>,
    pub compute_metrics: Option<bool>,
}

/// The pipeline TOML file. Every key is optional here; required values are enforced once
/// all layers are merged.
#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub run: Option<FileRunConfig>,
    pub inputs: Option<FileInputsConfig>,
    pub backbone: Option<FileBackboneConfig>,
    pub sequence: Option<FileSequenceConfig>,
    pub prediction: Option<FilePredictionConfig>,
    /// Directory relative file paths are resolved against. Not read from the file.
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

impl FileConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        let mut config: FileConfig =
            toml::from_str(&content).map_err(|e| CliError::FileParsing {
                path: path.to_path_buf(),
                source: e.into(),
            })?;
        config.base_dir = path.parent().map(Path::to_path_buf);
        Ok(config)
    }

    /// Anchors a path taken from the file at the file's directory.
    pub fn anchor(&self, path: &Path) -> PathBuf {
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn full_file_parses_with_kebab_case_keys() {
        let toml = r#"
            [run]
            num-designs = 4
            seed = 11
            tag-prefix = "ab"

            [inputs]
            target = "target.pdb"
            framework = "framework.pdb"

            [backbone]
            command = ["python", "rfdiffusion_stage.py"]
            loops = "H1:7,H3:5-13"
            hotspots = "T305,T456"
            diffusion-steps = 50

            [sequence]
            sequences-per-structure = 2
            omit-amino-acids = "C"

            [prediction]
            hotspot-proportion = 0.1
            compute-metrics = false
        "#;
        let config: FileConfig = toml::from_str(toml).unwrap();
        let run = config.run.unwrap();
        assert_eq!(run.num_designs, Some(4));
        assert_eq!(run.tag_prefix.as_deref(), Some("ab"));
        let backbone = config.backbone.unwrap();
        assert_eq!(backbone.diffusion_steps, Some(50));
        assert_eq!(backbone.command.unwrap().len(), 2);
        assert_eq!(config.sequence.unwrap().sequences_per_structure, Some(2));
        assert_eq!(config.prediction.unwrap().compute_metrics, Some(false));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(toml::from_str::<FileConfig>("[backbone]\ndiffuser-t = 50\n").is_err());
        assert!(toml::from_str::<FileConfig>("[extras]\n").is_err());
    }

    #[test]
    fn relative_paths_are_anchored_at_the_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pipeline.toml");
        fs::write(&path, "[inputs]\ntarget = \"t.pdb\"\n").unwrap();

        let config = FileConfig::from_file(&path).unwrap();
        assert_eq!(config.anchor(Path::new("t.pdb")), dir.path().join("t.pdb"));
        assert_eq!(config.anchor(Path::new("/abs/t.pdb")), PathBuf::from("/abs/t.pdb"));
    }

    #[test]
    fn syntax_errors_name_the_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        fs::write(&path, "[run\n").unwrap();
        match FileConfig::from_file(&path) {
            Err(CliError::FileParsing { path: p, .. }) => assert_eq!(p, path),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
