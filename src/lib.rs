// DocForge history - in-process undo/redo engine for the structured-document editor

pub mod command;

// Re-export commonly used types for convenience
pub use command::{
    BASE_COMMAND_OVERHEAD, Command, CommandError, CommandHistory, CommandResult, CompositeCommand,
    FnCommand, HistoryConfig, HistoryConfigUpdate, HistoryEvent, HistoryState,
};
