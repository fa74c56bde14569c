//! Per-item, per-stage run state and its on-disk checkpoint (`run_state.toml`).

use super::stage::StageKind;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

pub const STATE_FILE_NAME: &str = "run_state.toml";
pub const STATE_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Failed to serialize run state: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Failed to parse run state: {0}")]
    Deserialize(#[from] toml::de::Error),
    #[error("Unsupported run state version {found} (expected {STATE_VERSION})")]
    UnsupportedVersion { found: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Pending,
    Running,
    Done,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemState {
    pub ordinal: u64,
    pub tag: String,
    pub seed: u64,
    pub status: ItemStatus,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Tags this item appended to the stage archive.
    #[serde(default)]
    pub outputs: Vec<String>,
}

impl ItemState {
    pub fn new(ordinal: u64, tag: impl Into<String>, seed: u64, parent: Option<String>) -> Self {
        Self {
            ordinal,
            tag: tag.into(),
            seed,
            status: ItemStatus::Pending,
            attempts: 0,
            parent,
            error: None,
            outputs: Vec::new(),
        }
    }

    pub fn is_done(&self) -> bool {
        self.status == ItemStatus::Done
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageState {
    pub kind: StageKind,
    /// Archive length in bytes after the last committed append.
    pub committed_bytes: u64,
    #[serde(default)]
    pub items: Vec<ItemState>,
}

impl StageState {
    pub fn new(kind: StageKind) -> Self {
        Self {
            kind,
            committed_bytes: 0,
            items: Vec::new(),
        }
    }

    pub fn count(&self, status: ItemStatus) -> usize {
        self.items.iter().filter(|i| i.status == status).count()
    }

    /// Output tags of every `Done` item, in item order.
    pub fn done_outputs(&self) -> Vec<(&ItemState, &str)> {
        self.items
            .iter()
            .filter(|i| i.is_done())
            .flat_map(|item| item.outputs.iter().map(move |o| (item, o.as_str())))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub version: u32,
    pub base_seed: u64,
    pub num_designs: usize,
    pub stages: Vec<StageState>,
}

impl RunState {
    pub fn new(base_seed: u64, num_designs: usize) -> Self {
        Self {
            version: STATE_VERSION,
            base_seed,
            num_designs,
            stages: StageKind::ALL.iter().map(|&k| StageState::new(k)).collect(),
        }
    }

    pub fn stage(&self, kind: StageKind) -> Option<&StageState> {
        self.stages.iter().find(|s| s.kind == kind)
    }

    /// Returns the stage entry, creating it if an older file lacks it.
    pub fn stage_mut(&mut self, kind: StageKind) -> &mut StageState {
        let index = match self.stages.iter().position(|s| s.kind == kind) {
            Some(index) => index,
            None => {
                self.stages.push(StageState::new(kind));
                self.stages.sort_by_key(|s| s.kind);
                self.stages
                    .iter()
                    .position(|s| s.kind == kind)
                    .unwrap_or_default()
            }
        };
        &mut self.stages[index]
    }

    /// Loads a checkpoint. Items interrupted while `Running` are reset to `Pending`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StateError> {
        let text = fs::read_to_string(path)?;
        let mut state: RunState = toml::from_str(&text)?;
        if state.version != STATE_VERSION {
            return Err(StateError::UnsupportedVersion {
                found: state.version,
            });
        }
        for item in state.stages.iter_mut().flat_map(|s| s.items.iter_mut()) {
            if item.status == ItemStatus::Running {
                debug!(tag = %item.tag, "Resetting interrupted item to pending");
                item.status = ItemStatus::Pending;
            }
        }
        Ok(state)
    }

    /// Writes the checkpoint atomically: a temporary sibling file is persisted over `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), StateError> {
        let path = path.as_ref();
        let text = toml::to_string(self)?;
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(text.as_bytes())?;
        tmp.as_file().sync_data()?;
        tmp.persist(path).map_err(|e| StateError::Io(e.error))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn populated() -> RunState {
        let mut state = RunState::new(42, 2);
        let stage = state.stage_mut(StageKind::Backbone);
        let mut done = ItemState::new(0, "design_0", 11, None);
        done.status = ItemStatus::Done;
        done.outputs.push("design_0".into());
        let mut running = ItemState::new(1, "design_1", 12, None);
        running.status = ItemStatus::Running;
        running.attempts = 1;
        stage.items = vec![done, running];
        stage.committed_bytes = 1234;
        state
    }

    #[test]
    fn save_then_load_resets_running_items() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(STATE_FILE_NAME);
        let state = populated();
        state.save(&path).unwrap();

        let loaded = RunState::load(&path).unwrap();
        let stage = loaded.stage(StageKind::Backbone).unwrap();
        assert_eq!(stage.committed_bytes, 1234);
        assert_eq!(stage.items[0].status, ItemStatus::Done);
        assert_eq!(stage.items[1].status, ItemStatus::Pending);
        assert_eq!(stage.items[1].attempts, 1);
        assert_eq!(stage.items[1].seed, 12);
    }

    #[test]
    fn save_overwrites_existing_checkpoint() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(STATE_FILE_NAME);
        RunState::new(1, 1).save(&path).unwrap();
        populated().save(&path).unwrap();
        assert_eq!(RunState::load(&path).unwrap().base_seed, 42);
    }

    #[test]
    fn rejects_unknown_version() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(STATE_FILE_NAME);
        let mut state = RunState::new(1, 1);
        state.version = 99;
        state.save(&path).unwrap();
        assert!(matches!(
            RunState::load(&path),
            Err(StateError::UnsupportedVersion { found: 99 })
        ));
    }

    #[test]
    fn done_outputs_skip_unfinished_items() {
        let state = populated();
        let outputs: Vec<&str> = state
            .stage(StageKind::Backbone)
            .unwrap()
            .done_outputs()
            .into_iter()
            .map(|(_, tag)| tag)
            .collect();
        assert_eq!(outputs, vec!["design_0"]);
    }
}
