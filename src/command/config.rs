// History configuration

use serde::{Deserialize, Serialize};

/// Tunable limits for a CommandHistory
///
/// Limits are enforced after every non-transactional push and again
/// whenever the configuration changes, so tightening a limit takes
/// effect retroactively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Maximum number of entries kept on the undo stack
    pub max_history_size: usize,

    /// Soft ceiling for the summed memory estimate of both stacks
    pub max_memory_bytes: usize,

    /// Whether the memory ceiling is enforced at all
    pub enable_memory_cleanup: bool,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_history_size: 50,
            max_memory_bytes: 50 * 1024 * 1024,
            enable_memory_cleanup: true,
        }
    }
}

/// Partial configuration change, merged by CommandHistory::update_config
///
/// Fields left as `None` keep their current value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryConfigUpdate {
    pub max_history_size: Option<usize>,
    pub max_memory_bytes: Option<usize>,
    pub enable_memory_cleanup: Option<bool>,
}

impl HistoryConfig {
    /// Merge a partial update into this configuration
    pub fn apply(&mut self, update: HistoryConfigUpdate) {
        if let Some(max_history_size) = update.max_history_size {
            self.max_history_size = max_history_size;
        }
        if let Some(max_memory_bytes) = update.max_memory_bytes {
            self.max_memory_bytes = max_memory_bytes;
        }
        if let Some(enable_memory_cleanup) = update.enable_memory_cleanup {
            self.enable_memory_cleanup = enable_memory_cleanup;
        }
    }
}
