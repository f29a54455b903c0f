/// Engine configuration.
/// Hosts usually embed this in their own settings; `load_config` reads a
/// standalone JSON file for tools and tests.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// What to do with the board when a move request fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RollbackStrategy {
    /// Restore the pre-move snapshot, then re-apply everything that landed after it.
    #[default]
    Replay,
    /// Restore the pre-move snapshot, then refetch the whole board.
    Refetch,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    #[serde(default = "default_move_timeout_ms")]
    pub move_timeout_ms: u64,
    #[serde(default)]
    pub rollback: RollbackStrategy,
    /// Emergency-search recoveries tolerated before the board asks for a resync.
    #[serde(default = "default_resync_after_recoveries")]
    pub resync_after_recoveries: u32,
    #[serde(default = "default_client_id")]
    pub client_id: String,
}

fn default_move_timeout_ms() -> u64 {
    15_000
}

fn default_resync_after_recoveries() -> u32 {
    3
}

fn default_client_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            move_timeout_ms: default_move_timeout_ms(),
            rollback: RollbackStrategy::default(),
            resync_after_recoveries: default_resync_after_recoveries(),
            client_id: default_client_id(),
        }
    }
}

impl EngineConfig {
    pub fn move_timeout(&self) -> Duration {
        Duration::from_millis(self.move_timeout_ms)
    }
}

/// Load config from path. Returns defaults if the file is missing or broken.
pub fn load_config(path: &Path) -> EngineConfig {
    match fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
            log::warn!(
                "[lexera.moves.config] Failed to parse config {}: {}",
                path.display(),
                e
            );
            EngineConfig::default()
        }),
        Err(_) => {
            log::info!(
                "[lexera.moves.config] No config at {}, using defaults",
                path.display()
            );
            EngineConfig::default()
        }
    }
}
