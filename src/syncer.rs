//! Grouped-commit machinery: commit tickets, the durable watermark, and
//! the background syncer that fsyncs the WAL under an I/O duty-cycle
//! budget.

use crate::config::ManagerOptions;
use crate::error::Result;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

const DEFAULT_IO_PERCENT: u32 = 10;
const SLOW_SYNC_WARN_THRESHOLD: Duration = Duration::from_secs(2);

/// Commit tracking shared between the manager, its callers and the
/// background syncer.
///
/// `flying` is the last ticket handed out for an appended (possibly
/// unsynced) record; `durable` is the highest ticket known to be fsynced.
/// `durable <= flying` at all times. Both are atomics so `is_committed`
/// and the await fast path never take the manager lock.
///
/// Waiters sleep on the watch until the published watermark reaches their
/// ticket and re-check after every wake, so the syncer does not need to
/// know how many of them exist.
pub(crate) struct CommitState {
  flying: AtomicU64,
  durable: AtomicU64,
  pub syncer_running: AtomicBool,
  watch: Mutex<u64>,
  watch_cond: Condvar,
}

impl CommitState {
  pub fn new() -> Self {
    Self {
      flying: AtomicU64::new(0),
      durable: AtomicU64::new(0),
      syncer_running: AtomicBool::new(false),
      watch: Mutex::new(0),
      watch_cond: Condvar::new(),
    }
  }

  /// Issues the next commit ticket. Called under the manager lock, so
  /// tickets are strictly monotone in WAL-append order.
  pub fn next_commit(&self) -> u64 {
    self.flying.fetch_add(1, Ordering::SeqCst) + 1
  }

  pub fn flying(&self) -> u64 {
    self.flying.load(Ordering::Acquire)
  }

  pub fn is_committed(&self, commit: u64) -> bool {
    self.durable.load(Ordering::Acquire) >= commit
  }

  /// Advances the durable watermark and wakes every waiter.
  pub fn publish_durable(&self, commit: u64) {
    self.durable.store(commit, Ordering::Release);
    let mut watch = self.watch.lock();
    *watch = commit;
    self.watch_cond.notify_all();
  }

  /// Blocks until the durable watermark reaches `commit`.
  pub fn await_committed(&self, commit: u64) {
    if self.is_committed(commit) {
      return;
    }
    let mut watch = self.watch.lock();
    while *watch < commit {
      self.watch_cond.wait(&mut watch);
    }
  }
}

/// Stop flag that can interrupt a timed sleep.
///
/// Close signals it and joins the thread; there is no token handoff that
/// could deadlock against a receiver that already exited.
pub(crate) struct StopSignal {
  stopped: Mutex<bool>,
  cond: Condvar,
}

impl StopSignal {
  pub fn new() -> Self {
    Self {
      stopped: Mutex::new(false),
      cond: Condvar::new(),
    }
  }

  pub fn stop(&self) {
    *self.stopped.lock() = true;
    self.cond.notify_all();
  }

  /// Sleeps for up to `timeout`. Returns true if stop has been signaled,
  /// waking early in that case.
  pub fn sleep(&self, timeout: Duration) -> bool {
    let mut stopped = self.stopped.lock();
    if *stopped {
      return true;
    }
    self.cond.wait_for(&mut stopped, timeout);
    *stopped
  }
}

// Resets the running flag on every exit path, including panics in the
// sync callback.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
  fn drop(&mut self) {
    self.0.store(false, Ordering::SeqCst);
  }
}

/// The commit syncer loop. Runs on its own thread in grouped mode.
///
/// Each cycle sleeps long enough to keep fsync time under the configured
/// I/O percentage, snapshots `flying`, fsyncs the WAL via `sync_wal`
/// (which acquires the manager lock), and on success publishes the
/// snapshot as the new durable watermark. fsync failures are retried next
/// cycle without advancing the watermark. When stop is signaled the loop
/// performs one final sync before exiting.
pub(crate) fn run<F>(commit: &CommitState, stop: &StopSignal, options: &ManagerOptions, sync_wal: F)
where
  F: Fn() -> Result<()>,
{
  if commit
    .syncer_running
    .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
    .is_err()
  {
    warn!(target: "blobq", queue = %options.queue_dir, "another commit syncer is already running");
    return;
  }
  let _guard = RunningGuard(&commit.syncer_running);

  let mut io_percent = options.wal_io_percent;
  if !(1..=100).contains(&io_percent) {
    warn!(
      target: "blobq",
      value = io_percent,
      "wal_io_percent out of range, using {}",
      DEFAULT_IO_PERCENT
    );
    io_percent = DEFAULT_IO_PERCENT;
  }

  let mut last_sync = Duration::ZERO;
  let mut stopping = false;
  loop {
    let sleep = last_sync
      .mul_f64((100 - io_percent) as f64 / io_percent as f64)
      .max(options.wal_min_interval);
    debug!(target: "blobq", ?sleep, ?last_sync, "commit syncer sleeping");

    if stop.sleep(sleep) {
      stopping = true;
      info!(target: "blobq", queue = %options.queue_dir, "commit syncer performing final sync before stopping");
    }

    let candidate = commit.flying();

    let start = Instant::now();
    let result = sync_wal();
    last_sync = start.elapsed();
    if last_sync > SLOW_SYNC_WARN_THRESHOLD {
      warn!(target: "blobq", ?last_sync, "WAL sync took too long");
    }

    match result {
      Ok(()) => {}
      Err(e) if stopping => {
        error!(target: "blobq", %e, "failed to sync WAL before stopping");
        return;
      }
      Err(e) => {
        error!(target: "blobq", %e, "failed to sync WAL, retrying");
        continue;
      }
    }

    commit.publish_durable(candidate);

    if stopping {
      return;
    }
  }
}
