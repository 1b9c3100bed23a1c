// Command trait definition

use std::any::Any;

use thiserror::Error;

/// Result type for command operations
pub type CommandResult<T = ()> = Result<T, CommandError>;

/// Accounting cost assumed for a command that does not report its own
/// memory estimate. Used purely for eviction bookkeeping.
pub const BASE_COMMAND_OVERHEAD: usize = 1024;

/// Errors that can occur during command execution or history bookkeeping
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// Command execution failed
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    /// Undo operation failed
    #[error("undo failed: {0}")]
    UndoFailed(String),

    /// Redo operation failed
    #[error("redo failed: {0}")]
    RedoFailed(String),

    /// Another execute/undo/redo is still in flight on this history
    #[error("history is busy with another operation")]
    Busy,

    /// The command's resources were released; it must never run again
    #[error("command has been disposed")]
    Disposed,

    /// A transaction was opened while one is already open (caller bug)
    #[error("a transaction is already open: {0}")]
    TransactionAlreadyOpen(String),

    /// Commit or rollback was called with no open transaction (caller bug)
    #[error("no transaction is open")]
    NoTransactionOpen,
}

/// Trait for reversible edit operations
///
/// All state-changing operations in the editor should implement this
/// trait. A command is self-contained: it captures whatever handle or
/// snapshot it needs to mutate its target and to restore the exact
/// pre-execution state later. The history engine owns a command once
/// it is handed over and only talks to it through this trait.
///
/// # Thread Safety
/// Commands must be `Send` as the history may be shared across threads.
///
/// # Example
/// ```
/// use std::any::Any;
/// use std::sync::{Arc, Mutex};
/// use docforge_history::{Command, CommandError, CommandResult};
///
/// struct RenameBookmark {
///     store: Arc<Mutex<Vec<String>>>,
///     index: usize,
///     new_name: String,
///     old_name: Option<String>,
/// }
///
/// impl Command for RenameBookmark {
///     fn execute(&mut self) -> CommandResult {
///         let mut store = self.store.lock().unwrap();
///         let slot = store
///             .get_mut(self.index)
///             .ok_or_else(|| CommandError::ExecutionFailed("no such bookmark".into()))?;
///         self.old_name = Some(std::mem::replace(slot, self.new_name.clone()));
///         Ok(())
///     }
///
///     fn undo(&mut self) -> CommandResult {
///         let old = self
///             .old_name
///             .clone()
///             .ok_or_else(|| CommandError::UndoFailed("no previous name stored".into()))?;
///         let mut store = self.store.lock().unwrap();
///         let slot = store
///             .get_mut(self.index)
///             .ok_or_else(|| CommandError::UndoFailed("bookmark no longer exists".into()))?;
///         *slot = old;
///         Ok(())
///     }
///
///     fn description(&self) -> String {
///         format!("Rename bookmark to {}", self.new_name)
///     }
///
///     fn as_any(&self) -> &dyn Any {
///         self
///     }
/// }
/// ```
pub trait Command: Send {
    /// Execute the command
    ///
    /// Should store the previous state internally for undo capability.
    /// Must leave the document unchanged when it returns an error;
    /// commands own the atomicity of their underlying mutation.
    fn execute(&mut self) -> CommandResult;

    /// Undo the command
    ///
    /// Restores the state to exactly what it was before execute() was
    /// called. Fails when restoration is impossible (e.g. the target
    /// no longer exists).
    fn undo(&mut self) -> CommandResult;

    /// Redo the command after an undo
    ///
    /// The default re-runs execute(), which is only correct when
    /// execute() is naturally idempotent from the undone state.
    /// Commands whose execute() has varying side effects (a generated
    /// identifier, a timestamp) must override this to replay the
    /// original captured result, not mint a new one.
    fn redo(&mut self) -> CommandResult {
        self.execute()
    }

    /// Get a human-readable description of the command
    ///
    /// Used for UI display (e.g. "Undo: Edit field 'author'")
    fn description(&self) -> String;

    /// Optional tag grouping related commands (e.g. "field", "bookmark")
    fn category(&self) -> Option<&str> {
        None
    }

    /// Optional: check if this command can absorb the one executed
    /// right after it
    ///
    /// Useful for coalescing keystroke-level edits to the same target
    /// so a slider drag or a typing burst becomes one history entry.
    fn can_merge_with(&self, _other: &dyn Command) -> bool {
        false
    }

    /// Optional: absorb a newer command into this one
    ///
    /// Only called after can_merge_with() returned true, and must not
    /// fail in that case; the incoming command is consumed either way.
    /// The merged command's undo must restore the state from before
    /// the first of the pair.
    fn merge_with(&mut self, _other: Box<dyn Command>) -> CommandResult {
        Ok(())
    }

    /// Byte estimate used for eviction accounting, never for correctness
    fn estimate_memory_size(&self) -> usize {
        BASE_COMMAND_OVERHEAD + self.description().len()
    }

    /// Release retained external resources (large buffers, handles)
    ///
    /// Must be idempotent. The history never undoes or redoes a
    /// command after disposing it.
    fn dispose(&mut self) {}

    /// Concrete-type access, used by merge_with() implementations to
    /// inspect the incoming command
    fn as_any(&self) -> &dyn Any;
}

/// Closure-backed command for simple one-off edits
///
/// Handy when defining a dedicated type is not worth it, e.g. in
/// tests or for small programmatic edits.
pub struct FnCommand<E, U>
where
    E: FnMut() -> CommandResult + Send + 'static,
    U: FnMut() -> CommandResult + Send + 'static,
{
    description: String,
    execute_fn: E,
    undo_fn: U,
}

impl<E, U> FnCommand<E, U>
where
    E: FnMut() -> CommandResult + Send + 'static,
    U: FnMut() -> CommandResult + Send + 'static,
{
    /// Create a command from an execute closure and an undo closure
    pub fn new(description: impl Into<String>, execute_fn: E, undo_fn: U) -> Self {
        Self {
            description: description.into(),
            execute_fn,
            undo_fn,
        }
    }
}

impl<E, U> Command for FnCommand<E, U>
where
    E: FnMut() -> CommandResult + Send + 'static,
    U: FnMut() -> CommandResult + Send + 'static,
{
    fn execute(&mut self) -> CommandResult {
        (self.execute_fn)()
    }

    fn undo(&mut self) -> CommandResult {
        (self.undo_fn)()
    }

    fn description(&self) -> String {
        self.description.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
