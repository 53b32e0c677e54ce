use std::path::PathBuf;
use std::time::Duration;

/// Defines how WAL appends reach the physical disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
  /// Call `fsync` after every single append. A successful `add` or `pop`
  /// implies the mutation is durable. Safest, but highest latency.
  Strict,

  /// Appends go to the OS buffer only. A background syncer batches
  /// `fsync` calls under an I/O budget and publishes the durable commit
  /// watermark; callers observe durability through commit tickets and
  /// `await_wal_committed`.
  Grouped,
}

#[derive(Debug, Clone)]
pub struct ManagerOptions {
  /// Path of the write-ahead log file.
  pub wal_path: PathBuf,

  /// Path of the snapshot (full index image) file.
  pub snapshot_path: PathBuf,

  /// Name of the queue directory this index belongs to.
  /// Used only to label log events.
  pub queue_dir: String,

  pub sync_mode: SyncMode,

  /// Interval between periodic snapshot dumps.
  /// Each dump truncates the WAL once the snapshot is durable.
  /// Default: 60 seconds.
  pub dump_interval: Duration,

  /// Target percentage of wall time the commit syncer spends inside
  /// `fsync`, in `[1, 100]`. The syncer holds the manager lock for the
  /// duration of the sync, so this bounds how long mutations can stall.
  /// Out-of-range values are clamped to the default with a warning.
  /// Default: 10.
  pub wal_io_percent: u32,

  /// Lower bound on the sleep between two syncer cycles.
  /// Default: 10 ms.
  pub wal_min_interval: Duration,
}

impl Default for ManagerOptions {
  fn default() -> Self {
    Self {
      wal_path: PathBuf::from("./blobq/index.wal"),
      snapshot_path: PathBuf::from("./blobq/index.snapshot"),
      queue_dir: String::from("blobq"),
      sync_mode: SyncMode::Strict,
      dump_interval: Duration::from_secs(60),
      wal_io_percent: 10,
      wal_min_interval: Duration::from_millis(10),
    }
  }
}

impl ManagerOptions {
  pub fn new(
    wal_path: impl Into<PathBuf>,
    snapshot_path: impl Into<PathBuf>,
    queue_dir: impl Into<String>,
  ) -> Self {
    Self {
      wal_path: wal_path.into(),
      snapshot_path: snapshot_path.into(),
      queue_dir: queue_dir.into(),
      ..Default::default()
    }
  }
}
