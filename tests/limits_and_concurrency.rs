//! Eviction limits, disposal accounting, busy rejection across
//! threads, listener notifications and snapshot serialization.

use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;

use docforge_history::{
    Command, CommandError, CommandHistory, CommandResult, HistoryConfig, HistoryConfigUpdate,
    HistoryEvent, HistoryState,
};

/// No-op edit that reports a fixed memory size and counts disposals
struct Tracked {
    label: String,
    size: usize,
    disposals: Arc<AtomicUsize>,
}

impl Tracked {
    fn new(label: impl Into<String>, size: usize, disposals: &Arc<AtomicUsize>) -> Box<Self> {
        Box::new(Self {
            label: label.into(),
            size,
            disposals: disposals.clone(),
        })
    }
}

impl Command for Tracked {
    fn execute(&mut self) -> CommandResult {
        Ok(())
    }

    fn undo(&mut self) -> CommandResult {
        Ok(())
    }

    fn description(&self) -> String {
        self.label.clone()
    }

    fn estimate_memory_size(&self) -> usize {
        self.size
    }

    fn dispose(&mut self) {
        self.disposals.fetch_add(1, Ordering::SeqCst);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

#[test]
fn count_limit_evicts_and_disposes_oldest_entries() {
    let disposals = counter();
    let history = CommandHistory::with_config(HistoryConfig {
        max_history_size: 3,
        ..Default::default()
    });

    for i in 1..=5 {
        history
            .execute(Tracked::new(format!("edit {i}"), 100, &disposals))
            .unwrap();
    }

    assert_eq!(history.undo_count(), 3);
    assert_eq!(disposals.load(Ordering::SeqCst), 2);
    assert_eq!(
        history.undo_descriptions(),
        vec!["edit 5", "edit 4", "edit 3"]
    );
}

#[test]
fn memory_limit_evicts_until_under_budget() {
    let disposals = counter();
    let history = CommandHistory::with_config(HistoryConfig {
        max_memory_bytes: 10_000,
        ..Default::default()
    });

    for i in 1..=4 {
        history
            .execute(Tracked::new(format!("edit {i}"), 4_000, &disposals))
            .unwrap();
    }

    // Every push past the ceiling shed the oldest entry
    assert_eq!(history.undo_count(), 2);
    assert_eq!(disposals.load(Ordering::SeqCst), 2);
    assert!(history.get_state().estimated_memory_bytes <= 10_000);
}

#[test]
fn memory_limit_never_evicts_the_last_entry() {
    let disposals = counter();
    let history = CommandHistory::with_config(HistoryConfig {
        max_memory_bytes: 10_000,
        ..Default::default()
    });

    history
        .execute(Tracked::new("small", 2_000, &disposals))
        .unwrap();
    history
        .execute(Tracked::new("huge", 50_000, &disposals))
        .unwrap();

    // The lone survivor stays even though it is still over budget
    assert_eq!(history.undo_count(), 1);
    assert_eq!(history.undo_description().as_deref(), Some("huge"));
    assert!(history.get_state().estimated_memory_bytes > 10_000);
}

#[test]
fn disabled_memory_cleanup_keeps_everything() {
    let disposals = counter();
    let history = CommandHistory::with_config(HistoryConfig {
        max_memory_bytes: 1_000,
        enable_memory_cleanup: false,
        ..Default::default()
    });

    for i in 1..=4 {
        history
            .execute(Tracked::new(format!("edit {i}"), 4_000, &disposals))
            .unwrap();
    }

    assert_eq!(history.undo_count(), 4);
    assert_eq!(disposals.load(Ordering::SeqCst), 0);
}

#[test]
fn redo_stack_counts_toward_the_memory_budget() {
    let disposals = counter();
    let history = CommandHistory::with_config(HistoryConfig {
        max_memory_bytes: 10_000,
        ..Default::default()
    });

    for label in ["a", "b", "c"] {
        history
            .execute(Tracked::new(label, 2_000, &disposals))
            .unwrap();
    }
    history.undo().unwrap();

    // Undo stack holds 4k, redo stack 2k. A 5k ceiling is only
    // exceeded if the redo entry is part of the sum.
    history
        .update_config(HistoryConfigUpdate {
            max_memory_bytes: Some(5_000),
            ..Default::default()
        })
        .unwrap();

    assert_eq!(history.undo_count(), 1);
    // The redo entry itself is never evicted piecemeal
    assert_eq!(history.redo_count(), 1);
    assert_eq!(disposals.load(Ordering::SeqCst), 1);
}

#[test]
fn redo_stack_is_disposed_wholesale_on_fresh_execute() {
    let disposals = counter();
    let history = CommandHistory::new();

    history.execute(Tracked::new("a", 100, &disposals)).unwrap();
    history.execute(Tracked::new("b", 100, &disposals)).unwrap();
    history.undo().unwrap();
    history.undo().unwrap();
    assert_eq!(history.redo_count(), 2);

    history.execute(Tracked::new("c", 100, &disposals)).unwrap();

    assert_eq!(history.redo_count(), 0);
    assert_eq!(disposals.load(Ordering::SeqCst), 2);
}

#[test]
fn clear_disposes_stacks_and_open_transaction_buffer() {
    let disposals = counter();
    let history = CommandHistory::new();

    history.execute(Tracked::new("a", 100, &disposals)).unwrap();
    history.execute(Tracked::new("b", 100, &disposals)).unwrap();
    history.undo().unwrap();

    history.begin_transaction("Open").unwrap();
    history
        .execute(Tracked::new("buffered", 100, &disposals))
        .unwrap();

    history.clear().unwrap();

    assert_eq!(history.undo_count(), 0);
    assert_eq!(history.redo_count(), 0);
    assert_eq!(disposals.load(Ordering::SeqCst), 3);
}

/// Holds its execute() open until the main thread has probed the
/// busy flag
struct Gated {
    entered: Arc<Barrier>,
    release: Arc<Barrier>,
}

impl Command for Gated {
    fn execute(&mut self) -> CommandResult {
        self.entered.wait();
        self.release.wait();
        Ok(())
    }

    fn undo(&mut self) -> CommandResult {
        Ok(())
    }

    fn description(&self) -> String {
        "Gated edit".into()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[test]
fn concurrent_mutation_is_rejected_with_busy() {
    let history = Arc::new(CommandHistory::new());
    let entered = Arc::new(Barrier::new(2));
    let release = Arc::new(Barrier::new(2));

    let disposals = counter();
    history
        .execute(Tracked::new("seed", 100, &disposals))
        .unwrap();

    let worker = {
        let history = history.clone();
        let entered = entered.clone();
        let release = release.clone();
        thread::spawn(move || {
            history.execute(Box::new(Gated { entered, release }))
        })
    };

    // The first command is now inside execute() and the busy flag is held
    entered.wait();

    assert_eq!(
        history
            .execute(Tracked::new("too eager", 100, &disposals))
            .unwrap_err(),
        CommandError::Busy
    );
    assert_eq!(history.undo().unwrap_err(), CommandError::Busy);
    assert_eq!(
        history.commit_transaction().unwrap_err(),
        CommandError::Busy
    );

    // Read-only queries stay available while the command runs
    assert_eq!(history.undo_count(), 1);

    release.wait();
    worker.join().unwrap().unwrap();

    // The first call's stack mutation proceeded unaffected
    assert_eq!(history.undo_count(), 2);
    assert_eq!(history.undo_description().as_deref(), Some("Gated edit"));
}

#[test]
fn listeners_observe_mutations_with_consistent_snapshots() {
    let history = CommandHistory::with_config(HistoryConfig {
        max_history_size: 2,
        ..Default::default()
    });
    let seen: Arc<Mutex<Vec<(String, usize, usize)>>> = Arc::new(Mutex::new(Vec::new()));

    let sink = seen.clone();
    history.add_listener(move |event: &HistoryEvent, state: &HistoryState| {
        let kind = match event {
            HistoryEvent::Executed { merged: false, .. } => "executed",
            HistoryEvent::Executed { merged: true, .. } => "merged",
            HistoryEvent::Undone { .. } => "undone",
            HistoryEvent::Redone { .. } => "redone",
            HistoryEvent::TransactionCommitted { .. } => "committed",
            HistoryEvent::Evicted { .. } => "evicted",
            HistoryEvent::Cleared => "cleared",
        };
        sink.lock()
            .unwrap()
            .push((kind.into(), state.undo_count, state.redo_count));
    });

    let disposals = counter();
    history.execute(Tracked::new("a", 100, &disposals)).unwrap();
    history.execute(Tracked::new("b", 100, &disposals)).unwrap();
    history.execute(Tracked::new("c", 100, &disposals)).unwrap();
    history.undo().unwrap();
    history.redo().unwrap();
    history.clear().unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(
        *seen,
        vec![
            ("executed".into(), 1, 0),
            ("executed".into(), 2, 0),
            // The third push evicted "a" before reporting the execute
            ("evicted".into(), 2, 0),
            ("executed".into(), 2, 0),
            ("undone".into(), 1, 1),
            ("redone".into(), 2, 0),
            ("cleared".into(), 0, 0),
        ]
    );
}

#[test]
fn save_point_survives_eviction_shifts_until_evicted_past() {
    let disposals = counter();
    let history = CommandHistory::with_config(HistoryConfig {
        max_history_size: 2,
        ..Default::default()
    });

    history.execute(Tracked::new("a", 100, &disposals)).unwrap();
    history.set_save_point();
    assert!(history.is_at_save_point());

    // "b" and "c" shift the mark as "a" is evicted
    history.execute(Tracked::new("b", 100, &disposals)).unwrap();
    history.execute(Tracked::new("c", 100, &disposals)).unwrap();
    assert!(history.has_unsaved_changes());

    history.undo().unwrap();
    history.undo().unwrap();
    // Depth 0 is now the post-"a" state, which is what was saved
    assert!(history.is_at_save_point());

    // A further eviction past the mark invalidates it for good
    history.redo().unwrap();
    history.redo().unwrap();
    history.execute(Tracked::new("d", 100, &disposals)).unwrap();
    history.undo().unwrap();
    history.undo().unwrap();
    assert!(history.has_unsaved_changes());
}

#[test]
fn state_and_config_snapshots_serialize_round_trip() {
    let disposals = counter();
    let history = CommandHistory::new();
    history
        .execute(Tracked::new("edit", 512, &disposals))
        .unwrap();

    let state = history.get_state();
    let json = serde_json::to_string(&state).unwrap();
    let back: HistoryState = serde_json::from_str(&json).unwrap();
    assert_eq!(state, back);

    let config = history.config();
    let json = serde_json::to_string(&config).unwrap();
    let back: HistoryConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(config, back);
}

#[test]
fn history_is_shareable_across_threads() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<CommandHistory>();
}
