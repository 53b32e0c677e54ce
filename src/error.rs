use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
  #[error("I/O Error: {0}")]
  Io(#[from] io::Error),

  #[error("Data Corruption: {0}")]
  Corruption(String),

  #[error("CRC32 Checksum Mismatch: expected {expected:#x}, got {actual:#x} at offset {offset}")]
  CrcMismatch { expected: u32, actual: u32, offset: u64 },

  #[error("Configuration Error: {0}")]
  Config(String),

  #[error("Serialization Error: {0}")]
  Serialization(String),

  #[error("Blob {id:?} is already queued for host {host:?}")]
  DuplicateBlob { host: String, id: String },

  #[error("No blobs queued for host {0:?}")]
  EmptyHost(String),

  #[error("Index manager is closed")]
  Closed,

  #[error("Commit syncer still running after stop")]
  SyncerStillRunning,
}
