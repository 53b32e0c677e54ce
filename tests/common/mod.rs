use blobq::{IndexManager, ManagerOptions, SyncMode};
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

pub struct TestEnv {
  pub manager: IndexManager,
  // The TempDir guard must be kept alive to prevent premature deletion of the directory.
  pub _dir: TempDir,
  pub wal_path: PathBuf,
  pub snapshot_path: PathBuf,
}

#[allow(dead_code)]
impl TestEnv {
  pub fn strict() -> Self {
    Self::custom(SyncMode::Strict, |_| {})
  }

  pub fn grouped() -> Self {
    Self::custom(SyncMode::Grouped, |_| {})
  }

  pub fn custom(sync_mode: SyncMode, tweak: impl FnOnce(&mut ManagerOptions)) -> Self {
    let dir = tempfile::tempdir().unwrap();
    let mut options = ManagerOptions::new(
      dir.path().join("index.wal"),
      dir.path().join("index.snapshot"),
      "test-queue",
    );
    options.sync_mode = sync_mode;
    // Keep the periodic dump out of the way unless a test opts in.
    options.dump_interval = Duration::from_secs(3600);
    tweak(&mut options);

    let wal_path = options.wal_path.clone();
    let snapshot_path = options.snapshot_path.clone();
    let manager = IndexManager::new(options).unwrap();

    Self {
      manager,
      _dir: dir,
      wal_path,
      snapshot_path,
    }
  }

  /// Drops the manager without running `close`, as if the process died.
  /// The leaked background threads idle on long sleeps and hold nothing
  /// the reopened manager cares about.
  pub fn crash(self) -> CrashedEnv {
    let TestEnv {
      manager,
      _dir,
      wal_path,
      snapshot_path,
    } = self;
    std::mem::forget(manager);
    CrashedEnv {
      _dir,
      wal_path,
      snapshot_path,
    }
  }
}

pub struct CrashedEnv {
  pub _dir: TempDir,
  pub wal_path: PathBuf,
  pub snapshot_path: PathBuf,
}

#[allow(dead_code)]
impl CrashedEnv {
  /// Reopens the same files, running crash recovery if the WAL has data.
  pub fn reopen(self, sync_mode: SyncMode) -> TestEnv {
    let mut options = ManagerOptions::new(
      self.wal_path.clone(),
      self.snapshot_path.clone(),
      "test-queue",
    );
    options.sync_mode = sync_mode;
    options.dump_interval = Duration::from_secs(3600);

    let manager = IndexManager::new(options).unwrap();
    TestEnv {
      manager,
      _dir: self._dir,
      wal_path: self.wal_path,
      snapshot_path: self.snapshot_path,
    }
  }
}
