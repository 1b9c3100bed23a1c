// HistoryState - read-only snapshot of a CommandHistory
//
// The snapshot is informational only: the UI uses it to enable or
// disable the Undo/Redo affordances and to render status text. It is
// serializable so hosts can ship it across an IPC boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Point-in-time view of the history stacks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryState {
    /// Entries on the undo stack
    pub undo_count: usize,

    /// Entries on the redo stack
    pub redo_count: usize,

    /// Whether undo() would do anything
    pub can_undo: bool,

    /// Whether redo() would do anything
    pub can_redo: bool,

    /// Entries across both stacks
    pub total_entries: usize,

    /// Summed memory estimate over both stacks
    pub estimated_memory_bytes: usize,

    /// Whether a transaction is currently buffering commands
    pub transaction_open: bool,

    /// Description of the most recently executed command
    pub last_executed: Option<String>,

    /// When the most recent command executed
    pub last_executed_at: Option<DateTime<Utc>>,

    /// Description of the entry undo() would revert next
    pub next_undo: Option<String>,

    /// Description of the entry redo() would re-apply next
    pub next_redo: Option<String>,
}
