use std::hint::black_box;
use std::time::Duration;

use blobq::{IndexManager, ManagerOptions, SyncMode};
use criterion::{Bencher, Criterion, criterion_group, criterion_main};
use tempfile::TempDir;

// Helper to create a manager in a temporary directory for isolated benchmark runs.
fn setup_manager(sync_mode: SyncMode) -> (IndexManager, TempDir) {
  let dir = tempfile::tempdir().unwrap();
  let mut options = ManagerOptions::new(
    dir.path().join("index.wal"),
    dir.path().join("index.snapshot"),
    "bench-queue",
  );
  options.sync_mode = sync_mode;
  options.dump_interval = Duration::from_secs(3600);
  let manager = IndexManager::new(options).unwrap();
  (manager, dir)
}

fn bench_mutations(c: &mut Criterion) {
  let mut group = c.benchmark_group("Index Mutations");

  group.bench_function("add_strict", |b: &mut Bencher| {
    let (manager, _dir) = setup_manager(SyncMode::Strict);
    let mut n = 0u64;
    b.iter(|| {
      n += 1;
      manager
        .add("bench.org", black_box(&format!("blob_{}", n)), n * 256, 256)
        .unwrap();
    })
  });

  group.bench_function("add_grouped", |b: &mut Bencher| {
    let (manager, _dir) = setup_manager(SyncMode::Grouped);
    let mut n = 0u64;
    b.iter(|| {
      n += 1;
      manager
        .add("bench.org", black_box(&format!("blob_{}", n)), n * 256, 256)
        .unwrap();
    })
  });

  group.bench_function("add_grouped_awaited", |b: &mut Bencher| {
    let (manager, _dir) = setup_manager(SyncMode::Grouped);
    let mut n = 0u64;
    b.iter(|| {
      n += 1;
      let commit = manager
        .add("bench.org", black_box(&format!("blob_{}", n)), n * 256, 256)
        .unwrap();
      manager.await_wal_committed(commit);
    })
  });

  group.bench_function("add_pop_strict", |b: &mut Bencher| {
    let (manager, _dir) = setup_manager(SyncMode::Strict);
    let mut n = 0u64;
    b.iter(|| {
      n += 1;
      manager
        .add("bench.org", &format!("blob_{}", n), n * 256, 256)
        .unwrap();
      manager.pop("bench.org").unwrap();
    })
  });

  group.finish();
}

criterion_group!(benches, bench_mutations);
criterion_main!(benches);
