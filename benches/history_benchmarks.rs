// Benchmarks for the undo/redo engine hot paths

use std::any::Any;

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use docforge_history::{Command, CommandHistory, CommandResult, HistoryConfig};

struct Bump {
    value: u64,
}

impl Command for Bump {
    fn execute(&mut self) -> CommandResult {
        self.value = self.value.wrapping_add(1);
        Ok(())
    }

    fn undo(&mut self) -> CommandResult {
        self.value = self.value.wrapping_sub(1);
        Ok(())
    }

    fn description(&self) -> String {
        "Bump counter".into()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn bench_execute_undo_redo(c: &mut Criterion) {
    c.bench_function("execute_undo_redo_100", |b| {
        b.iter(|| {
            let history = CommandHistory::with_config(HistoryConfig {
                max_history_size: 128,
                ..Default::default()
            });
            for _ in 0..100 {
                history.execute(Box::new(Bump { value: 0 })).unwrap();
            }
            while history.undo().unwrap().is_some() {}
            while history.redo().unwrap().is_some() {}
            black_box(history.undo_count())
        })
    });
}

fn bench_eviction_pressure(c: &mut Criterion) {
    c.bench_function("eviction_capped_at_32", |b| {
        b.iter(|| {
            let history = CommandHistory::with_config(HistoryConfig {
                max_history_size: 32,
                ..Default::default()
            });
            for _ in 0..256 {
                history.execute(Box::new(Bump { value: 0 })).unwrap();
            }
            black_box(history.undo_count())
        })
    });
}

fn bench_transaction_commit(c: &mut Criterion) {
    c.bench_function("transaction_commit_16", |b| {
        b.iter(|| {
            let history = CommandHistory::new();
            history.begin_transaction("Batch edit").unwrap();
            for _ in 0..16 {
                history.execute(Box::new(Bump { value: 0 })).unwrap();
            }
            history.commit_transaction().unwrap();
            black_box(history.undo_count())
        })
    });
}

criterion_group!(
    benches,
    bench_execute_undo_redo,
    bench_eviction_pressure,
    bench_transaction_commit
);
criterion_main!(benches);
