use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Engine tunables; every field has a default so partial YAML works.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Seconds between timed cycles; 0 sleeps until woken.
    pub idle_timeout_secs: u64,
    pub sync_on_startup: bool,
    pub remove_missing_files: bool,
    pub index_untagged_files: bool,
    pub progress_interval: u64,
    pub refresh_interval: u64,
    pub optimize_batch_size: usize,
    pub thumbnail_dir: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 3600,
            sync_on_startup: true,
            remove_missing_files: true,
            index_untagged_files: true,
            progress_interval: 25,
            refresh_interval: 100,
            optimize_batch_size: 1000,
            thumbnail_dir: "thumbs".to_string(),
        }
    }
}

impl SyncConfig {
    pub fn idle_timeout(&self) -> Option<Duration> {
        if self.idle_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.idle_timeout_secs))
        }
    }
}
