use crate::error::{CliError, Result};
use crate::utils::parser::CheckpointName;
use directories::ProjectDirs;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const WEIGHTS_ENV_VAR: &str = "ABFLOW_WEIGHTS";

/// Locates the directory holding the model checkpoints.
///
/// The directory comes from `ABFLOW_WEIGHTS` if set, else from a path persisted with
/// `abflow weights set-path`, else from the OS data directory.
#[derive(Debug)]
pub struct WeightsManager {
    base_path: PathBuf,
}

impl WeightsManager {
    pub fn new() -> Result<Self> {
        let path = Self::determine_weights_path()?;
        debug!("WeightsManager initialized with path: {:?}", &path);
        Ok(Self { base_path: path })
    }

    pub fn with_custom_path(path: PathBuf) -> Self {
        Self { base_path: path }
    }

    pub fn get_weights_path(&self) -> &Path {
        &self.base_path
    }

    pub fn set_custom_path(path: &Path) -> Result<()> {
        let config_path = Self::get_path_config_file()?;
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()?.join(path)
        };
        fs::write(config_path, absolute.to_string_lossy().as_bytes()).map_err(CliError::from)
    }

    pub fn reset_path() -> Result<()> {
        if let Ok(config_path) = Self::get_path_config_file() {
            if config_path.exists() {
                fs::remove_file(config_path)?;
            }
        }
        Ok(())
    }

    pub fn resolve(&self, name: CheckpointName) -> PathBuf {
        self.base_path.join(name.file_name())
    }

    /// Every known checkpoint with its resolved path and whether the file exists.
    pub fn list(&self) -> Vec<(CheckpointName, PathBuf, bool)> {
        CheckpointName::ALL
            .into_iter()
            .map(|name| {
                let path = self.resolve(name);
                let present = path.is_file();
                (name, path, present)
            })
            .collect()
    }

    fn determine_weights_path() -> Result<PathBuf> {
        if let Some(value) = std::env::var_os(WEIGHTS_ENV_VAR).filter(|v| !v.is_empty()) {
            return Ok(PathBuf::from(value));
        }
        match Self::get_path_config_file() {
            Ok(config_path) if config_path.exists() => {
                let custom_path_str = fs::read_to_string(&config_path)?.trim().to_string();
                if custom_path_str.is_empty() {
                    warn!("Custom path config file is empty, falling back to default path.");
                    Self::get_default_weights_path()
                } else {
                    Ok(PathBuf::from(custom_path_str))
                }
            }
            _ => Self::get_default_weights_path(),
        }
    }

    fn project_dirs() -> Option<ProjectDirs> {
        ProjectDirs::from("org", "abflow", "abflow")
    }

    fn get_path_config_file() -> Result<PathBuf> {
        Self::project_dirs()
            .map(|dirs| dirs.config_dir().join("path.conf"))
            .ok_or_else(|| CliError::Weights("Could not determine config directory path.".to_string()))
    }

    fn get_default_weights_path() -> Result<PathBuf> {
        Self::project_dirs()
            .map(|dirs| dirs.data_dir().join("weights"))
            .ok_or_else(|| {
                CliError::Weights("Could not determine default weights directory path.".to_string())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::tempdir;

    #[test]
    fn logical_names_resolve_inside_the_weights_directory() {
        let dir = tempdir().unwrap();
        let manager = WeightsManager::with_custom_path(dir.path().to_path_buf());
        assert_eq!(
            manager.resolve(CheckpointName::Rf2),
            dir.path().join("RF2_ab.pt")
        );
        assert_eq!(
            manager.resolve(CheckpointName::ProteinMpnn),
            dir.path().join("ProteinMPNN_v48_noise_0.2.pt")
        );
    }

    #[test]
    fn list_reports_which_checkpoints_are_present() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("RFdiffusion_Ab.pt"), b"").unwrap();
        let manager = WeightsManager::with_custom_path(dir.path().to_path_buf());

        let listed = manager.list();
        assert_eq!(listed.len(), 3);
        assert!(listed[0].2);
        assert!(!listed[1].2);
        assert!(!listed[2].2);
    }

    #[test]
    #[serial]
    fn environment_variable_takes_precedence() {
        let dir = tempdir().unwrap();
        // SAFETY: tests touching the process environment are serialized.
        unsafe { std::env::set_var(WEIGHTS_ENV_VAR, dir.path()) };
        let manager = WeightsManager::new().unwrap();
        unsafe { std::env::remove_var(WEIGHTS_ENV_VAR) };
        assert_eq!(manager.get_weights_path(), dir.path());
    }
}
