use crate::error::{Error, Result};
use crate::record::{Op, Record};
use std::collections::{BTreeMap, HashSet, VecDeque};
use tracing::warn;

/// A single queued blob: an opaque id plus its byte range in the host's
/// blob file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
  pub id: String,
  pub position: u64,
  pub size: u64,
}

#[derive(Debug, Default)]
struct HostQueue {
  blobs: VecDeque<Blob>,
  // Mirror of the queued ids, for O(1) duplicate detection.
  ids: HashSet<String>,
}

/// In-memory per-host blob index with FIFO semantics.
///
/// Hosts are kept in a `BTreeMap`, so enumeration order is deterministic
/// across runs. A host entry is pruned as soon as its last blob is popped,
/// which keeps `is_empty` a plain map check.
///
/// The index itself is not synchronized; the manager serializes every
/// mutation under its lock.
#[derive(Debug, Default)]
pub(crate) struct Index {
  hosts: BTreeMap<String, HostQueue>,
  blob_count: u64,
}

impl Index {
  pub fn new() -> Self {
    Self::default()
  }

  /// Appends a blob to the host's queue.
  pub fn add(&mut self, host: &str, id: &str, position: u64, size: u64) -> Result<()> {
    let queue = self.hosts.entry(host.to_string()).or_default();
    if queue.ids.contains(id) {
      return Err(Error::DuplicateBlob {
        host: host.to_string(),
        id: id.to_string(),
      });
    }

    queue.ids.insert(id.to_string());
    queue.blobs.push_back(Blob {
      id: id.to_string(),
      position,
      size,
    });
    self.blob_count += 1;
    Ok(())
  }

  /// The oldest blob queued for the host, without removing it.
  ///
  /// Together with `commit_pop` this forms the two-step pop: the manager
  /// peeks, appends the Pop record to the WAL, and commits the removal
  /// only once the append succeeded. A failed append simply never calls
  /// `commit_pop`, so memory is untouched.
  pub fn peek_front(&self, host: &str) -> Option<&Blob> {
    self.hosts.get(host).and_then(|q| q.blobs.front())
  }

  /// Removes and returns the oldest blob for the host.
  /// The host entry is pruned when its queue drains.
  pub fn commit_pop(&mut self, host: &str) -> Option<Blob> {
    let queue = self.hosts.get_mut(host)?;
    let blob = queue.blobs.pop_front()?;
    queue.ids.remove(&blob.id);
    self.blob_count -= 1;
    if queue.blobs.is_empty() {
      self.hosts.remove(host);
    }
    Some(blob)
  }

  /// Hosts in deterministic enumeration order.
  pub fn get_ordered_hosts(&self) -> Vec<String> {
    self.hosts.keys().cloned().collect()
  }

  /// True iff no host holds any blob.
  pub fn is_empty(&self) -> bool {
    self.hosts.is_empty()
  }

  pub fn host_count(&self) -> usize {
    self.hosts.len()
  }

  pub fn blob_count(&self) -> u64 {
    self.blob_count
  }

  /// Applies a replayed WAL or snapshot record idempotently.
  ///
  /// Replay must tolerate records the live path would reject: an Add may
  /// collide with a blob the snapshot already contains, and a Pop may
  /// reference a head that a later snapshot no longer has. Both are
  /// skipped with a warning rather than treated as fatal.
  pub fn apply_replayed(&mut self, record: &Record) {
    match record.op {
      Op::Add => {
        if let Err(e) = self.add(&record.host, &record.blob_id, record.position, record.size) {
          warn!(target: "blobq", %e, "skipping duplicate Add during replay");
        }
      }
      Op::Pop => match self.peek_front(&record.host) {
        Some(head) if head.id == record.blob_id => {
          self.commit_pop(&record.host);
        }
        _ => {
          warn!(
            target: "blobq",
            host = %record.host,
            blob_id = %record.blob_id,
            "skipping Pop of missing or non-matching head during replay"
          );
        }
      },
    }
  }

  /// Walks the index in host order, each host's blobs in FIFO order,
  /// yielding Add records. This is the snapshot serialization source.
  pub fn records(&self) -> impl Iterator<Item = Record> + '_ {
    self.hosts.iter().flat_map(|(host, queue)| {
      queue
        .blobs
        .iter()
        .map(move |blob| Record::add(host, &blob.id, blob.position, blob.size))
    })
  }
}
