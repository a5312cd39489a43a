use crate::protocol::AppSnapshot;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

/// The slice of state that survives restarts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistentState {
    pub volume: f32,
}

pub struct StateManager {
    state: Arc<RwLock<AppSnapshot>>,
    state_file: PathBuf,
}

impl StateManager {
    /// Builds the initial snapshot. A saved volume overrides `default_volume`.
    pub fn new(state_file: PathBuf, default_volume: f32) -> Self {
        let volume = Self::load_persistent(&state_file)
            .map(|p| p.volume)
            .unwrap_or(default_volume);

        let mut state = AppSnapshot {
            rev: 1,
            ..AppSnapshot::default()
        };
        state.playback.volume = volume.clamp(0.0, 1.0);

        Self {
            state: Arc::new(RwLock::new(state)),
            state_file,
        }
    }

    pub async fn get_state(&self) -> AppSnapshot {
        self.state.read().await.clone()
    }

    /// Applies `f` and bumps `rev`. Returns the new snapshot.
    pub async fn update<F>(&self, f: F) -> AppSnapshot
    where
        F: FnOnce(&mut AppSnapshot),
    {
        let mut state = self.state.write().await;
        f(&mut state);
        state.rev += 1;
        state.clone()
    }

    /// Writes the persistent slice to disk.
    pub async fn save(&self) -> anyhow::Result<()> {
        let persistent = {
            let state = self.state.read().await;
            PersistentState {
                volume: state.playback.volume,
            }
        };

        if let Some(parent) = self.state_file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_string_pretty(&persistent)?;
        tokio::fs::write(&self.state_file, json).await?;
        Ok(())
    }

    pub fn load_persistent(state_file: &Path) -> Option<PersistentState> {
        let content = std::fs::read_to_string(state_file).ok()?;
        serde_json::from_str::<PersistentState>(&content).ok()
    }
}
