use crate::config::{ManagerOptions, SyncMode};
use crate::error::{Error, Result};
use crate::index::{Blob, Index};
use crate::record::Record;
use crate::snapshot::SnapshotStore;
use crate::syncer::{self, CommitState, StopSignal};
use crate::wal::WalFile;
use parking_lot::Mutex;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Read-only snapshot of the manager's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexStats {
  pub total_ops: u64,
  pub ops_since_dump: u64,
  pub hosts: usize,
  pub blobs: u64,
  /// Time elapsed since the last successful snapshot dump.
  pub since_last_dump: Duration,
}

// Everything the manager lock protects: the index, both files, and the
// op counters. The lock order is total, so WAL-append order equals the
// order commit tickets are issued in.
struct Core {
  index: Index,
  wal: WalFile,
  snapshot: SnapshotStore,
  ops_since_dump: u64,
  total_ops: u64,
  last_dump: Instant,
  closed: bool,
}

impl Core {
  /// One snapshot cycle: durable snapshot first, WAL truncation second.
  /// A crash in between leaves the snapshot plus redundant WAL entries,
  /// which replay handles idempotently.
  fn perform_dump(&mut self) -> Result<()> {
    self.snapshot.write(&self.index)?;
    self.wal.truncate()?;
    self.ops_since_dump = 0;
    self.last_dump = Instant::now();
    Ok(())
  }

  /// Rebuilds the index from the snapshot plus the WAL tail, then dumps a
  /// fresh snapshot so the WAL starts empty again.
  fn recover(&mut self, queue_dir: &str) -> Result<()> {
    info!(target: "blobq", queue = %queue_dir, "non-empty WAL found, replaying");

    self.index = self.snapshot.load()?;

    let mut reader = self.wal.read_records()?;
    let mut replayed = 0u64;
    for record in reader.by_ref() {
      self.index.apply_replayed(&record);
      replayed += 1;
    }
    if let Some(err) = reader.tail_error() {
      warn!(target: "blobq", %err, "WAL tail unreadable, treating as end of log");
    }
    info!(target: "blobq", queue = %queue_dir, replayed, "WAL replay complete");

    self.perform_dump()
  }
}

struct Shared {
  core: Mutex<Core>,
  commit: CommitState,
  dump_stop: StopSignal,
  syncer_stop: StopSignal,
  options: ManagerOptions,
}

/// Durable, crash-recoverable index manager for a per-host blob queue.
///
/// Owns the in-memory index, the WAL and the snapshot file. A single
/// internal lock serializes every mutation; reads take consistent
/// snapshots under the same lock. In `Grouped` mode mutations return a
/// commit ticket whose durability can be observed through
/// [`IndexManager::is_wal_committed`] and
/// [`IndexManager::await_wal_committed`].
pub struct IndexManager {
  shared: Arc<Shared>,
  dump_handle: Option<JoinHandle<()>>,
  syncer_handle: Option<JoinHandle<()>>,
}

impl IndexManager {
  /// Opens (or creates) the WAL and snapshot files, runs crash recovery
  /// if the WAL is non-empty, and starts the background tasks.
  pub fn new(options: ManagerOptions) -> Result<Self> {
    let wal = WalFile::open(&options.wal_path, options.sync_mode)?;
    let snapshot = SnapshotStore::new(&options.snapshot_path);

    let mut core = Core {
      index: Index::new(),
      wal,
      snapshot,
      ops_since_dump: 0,
      total_ops: 0,
      last_dump: Instant::now(),
      closed: false,
    };

    if core.wal.is_empty()? {
      core.index = core.snapshot.load()?;
    } else {
      core.recover(&options.queue_dir)?;
    }

    let shared = Arc::new(Shared {
      core: Mutex::new(core),
      commit: CommitState::new(),
      dump_stop: StopSignal::new(),
      syncer_stop: StopSignal::new(),
      options,
    });

    let dump_handle = {
      let shared = shared.clone();
      thread::spawn(move || loop {
        if shared.dump_stop.sleep(shared.options.dump_interval) {
          return;
        }
        let mut core = shared.core.lock();
        if core.closed {
          return;
        }
        // A failed dump never truncates the WAL; retry next tick.
        if let Err(e) = core.perform_dump() {
          error!(target: "blobq", queue = %shared.options.queue_dir, %e, "periodic dump failed");
        }
      })
    };

    let syncer_handle = if shared.options.sync_mode == SyncMode::Grouped {
      let shared = shared.clone();
      Some(thread::spawn(move || {
        let sync_wal = || shared.core.lock().wal.sync();
        syncer::run(&shared.commit, &shared.syncer_stop, &shared.options, sync_wal);
      }))
    } else {
      None
    };

    Ok(Self {
      shared,
      dump_handle: Some(dump_handle),
      syncer_handle,
    })
  }

  /// Appends a blob to the host's queue.
  ///
  /// The Add record is in the WAL before memory changes; a WAL failure
  /// returns the error with the index untouched. Returns the commit
  /// ticket in `Grouped` mode, 0 in `Strict` mode.
  ///
  /// A duplicate (host, id) pair surfaces [`Error::DuplicateBlob`] after
  /// the WAL entry is written; the entry is benign because replay skips
  /// duplicate Adds.
  pub fn add(&self, host: &str, id: &str, position: u64, size: u64) -> Result<u64> {
    let mut core = self.shared.core.lock();
    if core.closed {
      return Err(Error::Closed);
    }

    core.wal.append(&Record::add(host, id, position, size))?;

    let commit = match self.shared.options.sync_mode {
      SyncMode::Grouped => self.shared.commit.next_commit(),
      SyncMode::Strict => 0,
    };

    core.index.add(host, id, position, size)?;

    core.ops_since_dump += 1;
    core.total_ops += 1;
    Ok(commit)
  }

  /// Removes and returns the oldest blob queued for the host.
  ///
  /// The removal is committed to memory only after the Pop record is
  /// appended, so the operation is all-or-nothing: a WAL failure leaves
  /// the queue unchanged, and an empty host fails without touching the
  /// WAL at all.
  pub fn pop(&self, host: &str) -> Result<(u64, Blob)> {
    let mut core = self.shared.core.lock();
    if core.closed {
      return Err(Error::Closed);
    }

    let blob = match core.index.peek_front(host) {
      Some(blob) => blob.clone(),
      None => return Err(Error::EmptyHost(host.to_string())),
    };

    core
      .wal
      .append(&Record::pop(host, &blob.id, blob.position, blob.size))?;
    core.index.commit_pop(host);

    let commit = match self.shared.options.sync_mode {
      SyncMode::Grouped => self.shared.commit.next_commit(),
      SyncMode::Strict => 0,
    };

    core.ops_since_dump += 1;
    core.total_ops += 1;
    Ok((commit, blob))
  }

  pub fn get_stats(&self) -> IndexStats {
    let core = self.shared.core.lock();
    IndexStats {
      total_ops: core.total_ops,
      ops_since_dump: core.ops_since_dump,
      hosts: core.index.host_count(),
      blobs: core.index.blob_count(),
      since_last_dump: core.last_dump.elapsed(),
    }
  }

  /// All hosts currently holding blobs, in deterministic order.
  pub fn get_hosts(&self) -> Vec<String> {
    self.shared.core.lock().index.get_ordered_hosts()
  }

  pub fn is_empty(&self) -> bool {
    self.shared.core.lock().index.is_empty()
  }

  /// Whether the given commit ticket has been fsynced.
  pub fn is_wal_committed(&self, commit: u64) -> bool {
    self.shared.commit.is_committed(commit)
  }

  /// Issues a synthetic commit ticket without an associated mutation.
  /// Awaiting it observes that everything appended so far is durable.
  pub fn wal_commit(&self) -> u64 {
    self.shared.commit.next_commit()
  }

  /// Blocks until the durable watermark reaches `commit`.
  ///
  /// The internal lock is never held while waiting, so mutations keep
  /// flowing from other threads. There is no deadline; callers layer
  /// timeouts externally.
  pub fn await_wal_committed(&self, commit: u64) {
    if commit == 0 {
      warn!(target: "blobq", "await_wal_committed called with commit 0");
      return;
    }
    if !self.shared.commit.syncer_running.load(Ordering::Acquire) && !self.is_wal_committed(commit)
    {
      warn!(
        target: "blobq",
        commit,
        "await_wal_committed called without a running syncer, this may hang"
      );
    }
    self.shared.commit.await_committed(commit);
  }

  /// Stops the background tasks, performs a final snapshot, and rejects
  /// all further mutations. Idempotent; also runs on drop.
  pub fn close(&mut self) -> Result<()> {
    {
      let mut core = self.shared.core.lock();
      if core.closed {
        return Ok(());
      }
      core.closed = true;
    }
    info!(target: "blobq", queue = %self.shared.options.queue_dir, "closing index manager");

    self.shared.dump_stop.stop();
    if let Some(handle) = self.dump_handle.take() {
      let _ = handle.join();
    }

    // Joining the syncer doubles as its stop acknowledgment: once the
    // thread has exited, its final sync has happened.
    self.shared.syncer_stop.stop();
    if let Some(handle) = self.syncer_handle.take() {
      let _ = handle.join();
    }
    if self.shared.commit.syncer_running.load(Ordering::SeqCst) {
      return Err(Error::SyncerStillRunning);
    }

    self.shared.core.lock().perform_dump()?;
    info!(target: "blobq", queue = %self.shared.options.queue_dir, "index manager closed");
    Ok(())
  }
}

impl Drop for IndexManager {
  fn drop(&mut self) {
    if let Err(e) = self.close() {
      error!(target: "blobq", %e, "failed to close index manager cleanly");
    }
  }
}
