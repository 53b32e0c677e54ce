mod common;
use blobq::SyncMode;
use common::TestEnv;
use std::fs;
use std::time::Duration;

#[test]
fn test_periodic_dump_truncates_wal() {
  let env = TestEnv::custom(SyncMode::Strict, |options| {
    options.dump_interval = Duration::from_millis(100);
  });

  for i in 0..5u64 {
    env.manager.add("h", &format!("b{}", i), i * 10, 10).unwrap();
  }
  assert!(fs::metadata(&env.wal_path).unwrap().len() > 0);

  // Wait for at least one dump tick.
  std::thread::sleep(Duration::from_millis(500));

  assert_eq!(fs::metadata(&env.wal_path).unwrap().len(), 0);
  assert!(fs::metadata(&env.snapshot_path).unwrap().len() > 0);
  assert_eq!(env.manager.get_stats().ops_since_dump, 0);

  // The index itself is untouched by the dump.
  let env = env.crash().reopen(SyncMode::Strict);
  for i in 0..5u64 {
    assert_eq!(env.manager.pop("h").unwrap().1.id, format!("b{}", i));
  }
}

#[test]
fn test_snapshot_cycle_is_idempotent() {
  // Forcing a snapshot plus recovery at any point must not change state.
  let mut env = TestEnv::strict();
  env.manager.add("a", "b1", 0, 10).unwrap();
  env.manager.add("b", "b2", 10, 20).unwrap();
  env.manager.add("b", "b3", 30, 5).unwrap();
  env.manager.pop("a").unwrap();

  for _ in 0..3 {
    env.manager.close().unwrap();
    env = env.crash().reopen(SyncMode::Strict);

    assert_eq!(env.manager.get_hosts(), vec!["b"]);
    let stats = env.manager.get_stats();
    assert_eq!(stats.blobs, 2);
    assert_eq!(stats.hosts, 1);
  }

  assert_eq!(env.manager.pop("b").unwrap().1.id, "b2");
  assert_eq!(env.manager.pop("b").unwrap().1.id, "b3");
}

#[test]
fn test_dump_failure_preserves_wal() {
  let mut env = TestEnv::strict();

  env.manager.add("h", "b1", 0, 10).unwrap();
  let wal_len = fs::metadata(&env.wal_path).unwrap().len();

  // Sabotage the snapshot path: a directory cannot be renamed over, so
  // the final dump during close must fail.
  fs::create_dir(&env.snapshot_path).unwrap();
  assert!(env.manager.close().is_err());

  // The dump failed, so the WAL still holds the mutation.
  assert_eq!(fs::metadata(&env.wal_path).unwrap().len(), wal_len);

  // Recovery from the intact WAL restores the state.
  let crashed = env.crash();
  fs::remove_dir(&crashed.snapshot_path).unwrap();
  let env = crashed.reopen(SyncMode::Strict);
  assert_eq!(env.manager.pop("h").unwrap().1.id, "b1");
}

#[test]
fn test_empty_manager_dumps_empty_snapshot() {
  let mut env = TestEnv::strict();
  env.manager.add("h", "b1", 0, 10).unwrap();
  env.manager.pop("h").unwrap();
  env.manager.close().unwrap();

  let env = env.crash().reopen(SyncMode::Strict);
  assert!(env.manager.is_empty());
}
