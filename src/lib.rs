//! # blobq
//!
//! `blobq` is a durable, crash-recoverable index manager for per-host
//! blob queues: an in-memory FIFO index of blob records backed by a
//! write-ahead log and periodic full-image snapshots.
//!
//! ## Key Features
//!
//! * **Write-ahead logging**: every mutation is in the WAL before memory
//!   changes, so failures are all-or-nothing per operation.
//! * **Two durability modes**: `Strict` fsyncs every append; `Grouped`
//!   hands out commit tickets and batches fsyncs in a background syncer
//!   under an I/O duty-cycle budget.
//! * **Crash recovery**: the snapshot plus the WAL tail replay into the
//!   exact pre-crash index; a torn final record is treated as end-of-log.
//! * **Atomic snapshots**: full-image dumps are written to a temp file
//!   and renamed into place, then the WAL is truncated.
//! * **Integrity**: CRC32 checksums on every record.
//!
//! ## Example
//!
//! ```no_run
//! use blobq::{IndexManager, ManagerOptions};
//!
//! # fn main() -> blobq::Result<()> {
//! let mut manager = IndexManager::new(ManagerOptions::new(
//!   "./queue/index.wal",
//!   "./queue/index.snapshot",
//!   "queue",
//! ))?;
//!
//! manager.add("example.org", "blob-1", 0, 1024)?;
//! let (_commit, blob) = manager.pop("example.org")?;
//! assert_eq!(blob.id, "blob-1");
//!
//! manager.close()?;
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod index;
mod manager;
mod record;
mod snapshot;
mod syncer;
mod wal;

// Re-exports for the flat public API
pub use config::{ManagerOptions, SyncMode};
pub use error::{Error, Result};
pub use index::Blob;
pub use manager::{IndexManager, IndexStats};
