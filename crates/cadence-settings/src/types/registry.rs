//! Registry and idle-sweep settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Limits and housekeeping for the session registry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RegistrySettings {
    /// Sessions idle longer than this are deleted by the sweeper.
    pub idle_timeout_secs: u64,
    /// How often the sweeper scans activity timestamps.
    pub sweep_interval_secs: u64,
    /// Maximum number of concurrently registered sessions.
    pub max_sessions: usize,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 600,
            sweep_interval_secs: 60,
            max_sessions: 32,
        }
    }
}

impl RegistrySettings {
    /// Idle timeout as a `Duration`.
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Sweep interval as a `Duration`.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}
