// CommandHistory - Manages undo/redo stacks, transactions and eviction

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::command::composite::CompositeCommand;
use crate::command::config::{HistoryConfig, HistoryConfigUpdate};
use crate::command::state::HistoryState;
use crate::command::trait_def::{Command, CommandError, CommandResult};

/// Notification emitted after a history mutation
///
/// Every emission carries a fresh [`HistoryState`] snapshot, so a
/// single listener covers both "something happened" and "here is the
/// new state" for UI wiring.
#[derive(Debug, Clone)]
pub enum HistoryEvent {
    /// A command executed and landed on the undo stack. `merged` is
    /// set when it was absorbed into the previous entry instead of
    /// pushing a new one.
    Executed { description: String, merged: bool },
    /// An entry was undone and moved to the redo stack
    Undone { description: String },
    /// An entry was redone and moved back to the undo stack
    Redone { description: String },
    /// A transaction buffer was committed as one composite entry
    TransactionCommitted {
        description: String,
        command_count: usize,
    },
    /// The oldest entry was evicted to satisfy a limit
    Evicted { description: String },
    /// Both stacks and any open transaction were discarded
    Cleared,
}

type HistoryListener = Box<dyn Fn(&HistoryEvent, &HistoryState) + Send + Sync>;

/// A stacked command plus the engine-side bookkeeping for it
///
/// Identity and lifecycle live here rather than on the command
/// itself: the id and timestamps never depend on the implementor, and
/// `disposed` is the checked terminal state that keeps a freed
/// command from ever being replayed.
struct HistoryEntry {
    id: Uuid,
    created_at: DateTime<Utc>,
    executed_at: Option<DateTime<Utc>>,
    disposed: bool,
    command: Box<dyn Command>,
}

impl HistoryEntry {
    fn new(command: Box<dyn Command>) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            executed_at: None,
            disposed: false,
            command,
        }
    }

    fn description(&self) -> String {
        self.command.description()
    }

    fn estimate_memory_size(&self) -> usize {
        self.command.estimate_memory_size()
    }

    fn dispose(&mut self) {
        if !self.disposed {
            self.disposed = true;
            self.command.dispose();
        }
    }
}

/// An open transaction buffering commands until commit or rollback
struct Transaction {
    description: String,
    buffer: Vec<Box<dyn Command>>,
    opened_at: DateTime<Utc>,
}

struct HistoryInner {
    /// Entries that can be undone (most recent at the back)
    undo_stack: VecDeque<HistoryEntry>,
    /// Entries that can be redone (most recent at the back)
    redo_stack: Vec<HistoryEntry>,
    /// At most one transaction open at a time
    transaction: Option<Transaction>,
    config: HistoryConfig,
    last_executed: Option<String>,
    last_executed_at: Option<DateTime<Utc>>,
    /// Undo-stack depth at the last save, None once unreachable
    save_point: Option<usize>,
}

impl HistoryInner {
    fn invalidate_redo_stack(&mut self) {
        for mut entry in self.redo_stack.drain(..) {
            entry.dispose();
        }
    }

    fn estimated_memory_bytes(&self) -> usize {
        self.undo_stack
            .iter()
            .map(HistoryEntry::estimate_memory_size)
            .sum::<usize>()
            + self
                .redo_stack
                .iter()
                .map(HistoryEntry::estimate_memory_size)
                .sum::<usize>()
    }

    /// Evict oldest entries until both limits hold. Count first, then
    /// memory; the memory pass never drops below one undo entry, and
    /// individual redo entries are never evicted (the redo stack is
    /// only ever cleared wholesale).
    fn enforce_history_limits(&mut self) -> Vec<String> {
        let mut evicted = Vec::new();
        while self.undo_stack.len() > self.config.max_history_size {
            match self.undo_stack.pop_front() {
                Some(mut entry) => {
                    log::debug!(
                        "evicting '{}' (entry {}, created {}) over entry limit",
                        entry.description(),
                        entry.id,
                        entry.created_at
                    );
                    evicted.push(entry.description());
                    entry.dispose();
                    self.shift_save_point();
                }
                None => break,
            }
        }
        if self.config.enable_memory_cleanup {
            while self.undo_stack.len() > 1
                && self.estimated_memory_bytes() > self.config.max_memory_bytes
            {
                match self.undo_stack.pop_front() {
                    Some(mut entry) => {
                        log::debug!(
                            "evicting '{}' (entry {}, created {}) over memory budget",
                            entry.description(),
                            entry.id,
                            entry.created_at
                        );
                        evicted.push(entry.description());
                        entry.dispose();
                        self.shift_save_point();
                    }
                    None => break,
                }
            }
        }
        evicted
    }

    fn shift_save_point(&mut self) {
        if let Some(save_point) = self.save_point {
            self.save_point = if save_point > 0 {
                Some(save_point - 1)
            } else {
                None
            };
        }
    }

    /// A save mark deeper than the stack can no longer be reached
    fn drop_unreachable_save_point(&mut self) {
        if matches!(self.save_point, Some(save_point) if save_point > self.undo_stack.len()) {
            self.save_point = None;
        }
    }

    fn snapshot(&self) -> HistoryState {
        HistoryState {
            undo_count: self.undo_stack.len(),
            redo_count: self.redo_stack.len(),
            can_undo: !self.undo_stack.is_empty(),
            can_redo: !self.redo_stack.is_empty(),
            total_entries: self.undo_stack.len() + self.redo_stack.len(),
            estimated_memory_bytes: self.estimated_memory_bytes(),
            transaction_open: self.transaction.is_some(),
            last_executed: self.last_executed.clone(),
            last_executed_at: self.last_executed_at,
            next_undo: self.undo_stack.back().map(HistoryEntry::description),
            next_redo: self.redo_stack.last().map(HistoryEntry::description),
        }
    }
}

/// Releases the busy flag on every exit path, including panics inside
/// a command
struct BusyGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Orchestrates command execution and undo/redo for one document
///
/// The history maintains two stacks:
/// - Undo stack: commands that have been executed and can be undone
/// - Redo stack: commands that have been undone and can be redone
///
/// When a new command is executed outside a transaction:
/// 1. Execute the command
/// 2. Dispose and clear the redo stack (new timeline)
/// 3. Merge into the previous entry, or push a fresh one
/// 4. Evict oldest entries past the configured limits
/// 5. Notify listeners
///
/// # Concurrency
/// One logical editing session drives a history. Mutating operations
/// are serialized by a busy flag: a second execute/undo/redo (or
/// commit/rollback) arriving while one is in flight fails immediately
/// with [`CommandError::Busy`] rather than queuing. Commands may block
/// internally; the engine never holds its own lock across a command
/// call, so read-only queries stay responsive meanwhile. The history
/// is `Send + Sync` and is typically shared as `Arc<CommandHistory>`
/// with its lifetime tied to the owning document.
///
/// # Ownership
/// The history exclusively owns every command pushed to a stack or
/// buffered in a transaction, and is the only actor that disposes
/// them (on eviction, redo-stack invalidation, or clear()).
pub struct CommandHistory {
    inner: Mutex<HistoryInner>,
    busy: AtomicBool,
    listeners: RwLock<Vec<HistoryListener>>,
}

impl CommandHistory {
    /// Create a history with default limits
    pub fn new() -> Self {
        Self::with_config(HistoryConfig::default())
    }

    /// Create a history with custom limits
    pub fn with_config(config: HistoryConfig) -> Self {
        Self {
            inner: Mutex::new(HistoryInner {
                undo_stack: VecDeque::with_capacity(config.max_history_size),
                redo_stack: Vec::new(),
                transaction: None,
                config,
                last_executed: None,
                last_executed_at: None,
                save_point: None,
            }),
            busy: AtomicBool::new(false),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Execute a command and record it
    ///
    /// Outside a transaction the command lands on the undo stack (or
    /// merges into the previous entry when both sides agree) and the
    /// redo stack is invalidated. Under an open transaction the
    /// command is buffered and the stacks stay untouched until commit.
    /// A failed command mutates nothing.
    pub fn execute(&self, command: Box<dyn Command>) -> CommandResult {
        let _busy = self.begin_mutation()?;

        let mut command = command;
        command.execute()?;

        let mut inner = self.lock_inner();
        if let Some(transaction) = inner.transaction.as_mut() {
            transaction.buffer.push(command);
            return Ok(());
        }

        inner.invalidate_redo_stack();

        let description = command.description();
        let now = Utc::now();

        let mut merged = false;
        let mut incoming = Some(command);
        if let Some(top) = inner.undo_stack.back_mut() {
            let accepts = match incoming.as_ref() {
                Some(candidate) => top.command.can_merge_with(candidate.as_ref()),
                None => false,
            };
            if accepts {
                if let Some(candidate) = incoming.take() {
                    if let Err(err) = top.command.merge_with(candidate) {
                        log::warn!(
                            "merge into '{}' violated the merge contract: {err}",
                            top.command.description()
                        );
                    }
                    top.executed_at = Some(now);
                    merged = true;
                }
            }
        }

        if merged {
            // The entry at the save depth no longer matches the saved state
            if inner.save_point == Some(inner.undo_stack.len()) {
                inner.save_point = None;
            }
        } else if let Some(command) = incoming {
            inner.drop_unreachable_save_point();
            let mut entry = HistoryEntry::new(command);
            entry.executed_at = Some(now);
            log::debug!("executed '{description}' as entry {}", entry.id);
            inner.undo_stack.push_back(entry);
        }

        inner.last_executed = Some(description.clone());
        inner.last_executed_at = Some(now);

        let evicted = inner.enforce_history_limits();
        let state = inner.snapshot();
        drop(inner);

        for description in evicted {
            self.emit(&HistoryEvent::Evicted { description }, &state);
        }
        self.emit(&HistoryEvent::Executed { description, merged }, &state);
        Ok(())
    }

    /// Undo the most recent entry
    ///
    /// Returns `Ok(None)` when there is nothing to undo. On success
    /// the entry moves to the redo stack and its description is
    /// returned; on failure the entry is pushed back so history is
    /// exactly as it was before the call.
    pub fn undo(&self) -> CommandResult<Option<String>> {
        if !self.can_undo() {
            return Ok(None);
        }
        let _busy = self.begin_mutation()?;

        let mut entry = {
            let mut inner = self.lock_inner();
            match inner.undo_stack.pop_back() {
                Some(entry) => entry,
                None => return Ok(None),
            }
        };

        if entry.disposed {
            self.lock_inner().undo_stack.push_back(entry);
            return Err(CommandError::Disposed);
        }

        let description = entry.command.description();
        match entry.command.undo() {
            Ok(()) => {
                let state = {
                    let mut inner = self.lock_inner();
                    inner.redo_stack.push(entry);
                    inner.snapshot()
                };
                self.emit(
                    &HistoryEvent::Undone {
                        description: description.clone(),
                    },
                    &state,
                );
                Ok(Some(description))
            }
            Err(err) => {
                self.lock_inner().undo_stack.push_back(entry);
                log::warn!("undo of '{description}' failed: {err}");
                Err(err)
            }
        }
    }

    /// Redo the most recently undone entry
    ///
    /// Returns `Ok(None)` when there is nothing to redo. Invokes the
    /// command's redo() (which defaults to execute()). On failure the
    /// entry is pushed back onto the redo stack unchanged.
    pub fn redo(&self) -> CommandResult<Option<String>> {
        if !self.can_redo() {
            return Ok(None);
        }
        let _busy = self.begin_mutation()?;

        let mut entry = {
            let mut inner = self.lock_inner();
            match inner.redo_stack.pop() {
                Some(entry) => entry,
                None => return Ok(None),
            }
        };

        if entry.disposed {
            self.lock_inner().redo_stack.push(entry);
            return Err(CommandError::Disposed);
        }

        let description = entry.command.description();
        match entry.command.redo() {
            Ok(()) => {
                let now = Utc::now();
                entry.executed_at = Some(now);
                let state = {
                    let mut inner = self.lock_inner();
                    inner.undo_stack.push_back(entry);
                    inner.last_executed = Some(description.clone());
                    inner.last_executed_at = Some(now);
                    inner.snapshot()
                };
                self.emit(
                    &HistoryEvent::Redone {
                        description: description.clone(),
                    },
                    &state,
                );
                Ok(Some(description))
            }
            Err(err) => {
                self.lock_inner().redo_stack.push(entry);
                log::warn!("redo of '{description}' failed: {err}");
                Err(err)
            }
        }
    }

    /// Open a transaction that buffers subsequent executes
    ///
    /// Buffered commands stay invisible to undo/redo until commit.
    /// Opening a second transaction while one is open is a caller bug
    /// and fails with [`CommandError::TransactionAlreadyOpen`].
    pub fn begin_transaction(&self, description: impl Into<String>) -> CommandResult {
        let mut inner = self.lock_inner();
        if let Some(transaction) = &inner.transaction {
            return Err(CommandError::TransactionAlreadyOpen(
                transaction.description.clone(),
            ));
        }
        inner.transaction = Some(Transaction {
            description: description.into(),
            buffer: Vec::new(),
            opened_at: Utc::now(),
        });
        Ok(())
    }

    /// Commit the open transaction as a single history entry
    ///
    /// A non-empty buffer becomes one [`CompositeCommand`]; when the
    /// transaction description is blank the composite is labeled with
    /// the joined child descriptions. An empty buffer just closes the
    /// transaction and returns `Ok(None)`.
    pub fn commit_transaction(&self) -> CommandResult<Option<String>> {
        let _busy = self.begin_mutation()?;

        let mut inner = self.lock_inner();
        let transaction = match inner.transaction.take() {
            Some(transaction) => transaction,
            None => return Err(CommandError::NoTransactionOpen),
        };
        if transaction.buffer.is_empty() {
            return Ok(None);
        }

        let description = if transaction.description.trim().is_empty() {
            CompositeCommand::joined_description(&transaction.buffer)
        } else {
            transaction.description
        };
        let command_count = transaction.buffer.len();
        log::debug!(
            "committing transaction '{description}' with {command_count} commands \
             (open since {})",
            transaction.opened_at
        );
        let composite = CompositeCommand::from_executed(description.clone(), transaction.buffer);

        inner.invalidate_redo_stack();
        inner.drop_unreachable_save_point();

        let now = Utc::now();
        let mut entry = HistoryEntry::new(Box::new(composite));
        entry.executed_at = Some(now);
        inner.undo_stack.push_back(entry);
        inner.last_executed = Some(description.clone());
        inner.last_executed_at = Some(now);

        let evicted = inner.enforce_history_limits();
        let state = inner.snapshot();
        drop(inner);

        for description in evicted {
            self.emit(&HistoryEvent::Evicted { description }, &state);
        }
        self.emit(
            &HistoryEvent::TransactionCommitted {
                description: description.clone(),
                command_count,
            },
            &state,
        );
        Ok(Some(description))
    }

    /// Abandon the open transaction, reverting its buffered commands
    ///
    /// Buffered commands are undone in strict reverse order on a
    /// best-effort basis: an individual undo failure is logged and
    /// the remaining commands are still attempted. The undo/redo
    /// stacks are never touched.
    pub fn rollback_transaction(&self) -> CommandResult {
        let _busy = self.begin_mutation()?;

        let transaction = {
            let mut inner = self.lock_inner();
            match inner.transaction.take() {
                Some(transaction) => transaction,
                None => return Err(CommandError::NoTransactionOpen),
            }
        };

        let mut buffer = transaction.buffer;
        for command in buffer.iter_mut().rev() {
            if let Err(err) = command.undo() {
                log::warn!(
                    "rollback undo of '{}' failed, continuing: {err}",
                    command.description()
                );
            }
        }
        for command in &mut buffer {
            command.dispose();
        }
        Ok(())
    }

    /// Dispose every entry in both stacks and drop any open
    /// transaction buffer without running its rollback semantics.
    /// Intended for document-close.
    pub fn clear(&self) -> CommandResult {
        let _busy = self.begin_mutation()?;

        let state = {
            let mut inner = self.lock_inner();
            for mut entry in inner.undo_stack.drain(..) {
                entry.dispose();
            }
            for mut entry in inner.redo_stack.drain(..) {
                entry.dispose();
            }
            if let Some(transaction) = inner.transaction.take() {
                let mut buffer = transaction.buffer;
                for command in &mut buffer {
                    command.dispose();
                }
            }
            inner.last_executed = None;
            inner.last_executed_at = None;
            inner.save_point = None;
            inner.snapshot()
        };
        self.emit(&HistoryEvent::Cleared, &state);
        Ok(())
    }

    /// Merge a partial configuration change and re-run eviction so a
    /// tightened limit takes effect immediately
    pub fn update_config(&self, update: HistoryConfigUpdate) -> CommandResult {
        let _busy = self.begin_mutation()?;

        let (evicted, state) = {
            let mut inner = self.lock_inner();
            inner.config.apply(update);
            let evicted = inner.enforce_history_limits();
            (evicted, inner.snapshot())
        };
        for description in evicted {
            self.emit(&HistoryEvent::Evicted { description }, &state);
        }
        Ok(())
    }

    /// Current configuration
    pub fn config(&self) -> HistoryConfig {
        self.lock_inner().config.clone()
    }

    /// Point-in-time snapshot of counts, flags and descriptions
    pub fn get_state(&self) -> HistoryState {
        self.lock_inner().snapshot()
    }

    /// Check if there are entries that can be undone
    pub fn can_undo(&self) -> bool {
        !self.lock_inner().undo_stack.is_empty()
    }

    /// Check if there are entries that can be redone
    pub fn can_redo(&self) -> bool {
        !self.lock_inner().redo_stack.is_empty()
    }

    /// Number of entries on the undo stack
    pub fn undo_count(&self) -> usize {
        self.lock_inner().undo_stack.len()
    }

    /// Number of entries on the redo stack
    pub fn redo_count(&self) -> usize {
        self.lock_inner().redo_stack.len()
    }

    /// Description of the entry that would be undone next
    pub fn undo_description(&self) -> Option<String> {
        self.lock_inner()
            .undo_stack
            .back()
            .map(HistoryEntry::description)
    }

    /// Description of the entry that would be redone next
    pub fn redo_description(&self) -> Option<String> {
        self.lock_inner()
            .redo_stack
            .last()
            .map(HistoryEntry::description)
    }

    /// Undo-stack descriptions, newest first, for history panels
    pub fn undo_descriptions(&self) -> Vec<String> {
        self.lock_inner()
            .undo_stack
            .iter()
            .rev()
            .map(HistoryEntry::description)
            .collect()
    }

    /// Redo-stack descriptions, newest first
    pub fn redo_descriptions(&self) -> Vec<String> {
        self.lock_inner()
            .redo_stack
            .iter()
            .rev()
            .map(HistoryEntry::description)
            .collect()
    }

    /// Whether a transaction is currently buffering commands
    pub fn in_transaction(&self) -> bool {
        self.lock_inner().transaction.is_some()
    }

    /// Mark the current undo depth as the saved state
    pub fn set_save_point(&self) {
        let mut inner = self.lock_inner();
        inner.save_point = Some(inner.undo_stack.len());
    }

    /// Whether the current undo depth matches the last save
    pub fn is_at_save_point(&self) -> bool {
        let inner = self.lock_inner();
        inner.save_point == Some(inner.undo_stack.len())
    }

    /// Whether edits happened since the last save (or nothing was
    /// ever saved)
    pub fn has_unsaved_changes(&self) -> bool {
        !self.is_at_save_point()
    }

    /// Subscribe to history notifications
    ///
    /// The listener runs on whichever thread finished the operation,
    /// after the stacks settled and outside any internal lock. A
    /// listener that calls back into a mutating operation observes
    /// the busy error like any other concurrent caller.
    pub fn add_listener<F>(&self, listener: F)
    where
        F: Fn(&HistoryEvent, &HistoryState) + Send + Sync + 'static,
    {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(listener));
    }

    fn begin_mutation(&self) -> CommandResult<BusyGuard<'_>> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return Err(CommandError::Busy);
        }
        Ok(BusyGuard { flag: &self.busy })
    }

    fn lock_inner(&self) -> MutexGuard<'_, HistoryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: &HistoryEvent, state: &HistoryState) {
        let listeners = self.listeners.read().unwrap_or_else(PoisonError::into_inner);
        for listener in listeners.iter() {
            listener(event, state);
        }
    }
}

impl Default for CommandHistory {
    fn default() -> Self {
        Self::new()
    }
}
