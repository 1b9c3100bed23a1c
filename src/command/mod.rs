// Command Pattern engine for Undo/Redo
//
// This module implements the Command Pattern that backs undo/redo for
// all document edits. Every state-changing operation goes through a
// Command handed to the CommandHistory.
//
// Architecture:
// - Command trait: defines execute(), undo(), optional redo()/merge
// - CompositeCommand: groups N commands into one atomic history entry
// - CommandHistory: owns the undo/redo stacks, transactions, eviction
//
// Integration with the editor:
// - Domain code (field edits, bookmark edits, link edits) implements
//   Command and is the only code that touches real document state
// - The UI executes commands through the history and subscribes to
//   HistoryEvent notifications to drive its Undo/Redo affordances
// - Commands capture their own undo snapshot; the engine only
//   orchestrates ordering, storage and lifecycle

pub mod composite;
pub mod config;
pub mod manager;
pub mod state;
pub mod trait_def;

pub use composite::CompositeCommand;
pub use config::{HistoryConfig, HistoryConfigUpdate};
pub use manager::{CommandHistory, HistoryEvent};
pub use state::HistoryState;
pub use trait_def::{BASE_COMMAND_OVERHEAD, Command, CommandError, CommandResult, FnCommand};
