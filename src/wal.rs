use crate::config::SyncMode;
use crate::error::Result;
use crate::record::{Record, RecordReader};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

/// Append-only write-ahead log file.
///
/// In `Strict` mode every append is fsynced before returning, so a
/// successful `add`/`pop` implies durability. In `Grouped` mode appends
/// only reach the OS buffer; the commit syncer calls `sync` in the
/// background. Records are written unbuffered so that everything appended
/// so far is covered by the next `sync`, with no userspace flush step in
/// between.
pub(crate) struct WalFile {
  path: PathBuf,
  file: File,
  sync_mode: SyncMode,
}

impl WalFile {
  pub fn open(path: &Path, sync_mode: SyncMode) -> Result<Self> {
    let file = OpenOptions::new()
      .create(true)
      .read(true)
      .append(true)
      .open(path)?;

    Ok(Self {
      path: path.to_path_buf(),
      file,
      sync_mode,
    })
  }

  /// Appends one record. Write failures propagate to the caller, which
  /// treats them as "mutation did not happen".
  pub fn append(&mut self, record: &Record) -> Result<()> {
    let mut buf = Vec::with_capacity(record.encoded_len());
    record.write(&mut buf)?;
    self.file.write_all(&buf)?;

    if self.sync_mode == SyncMode::Strict {
      self.file.sync_data()?;
    }
    Ok(())
  }

  pub fn sync(&self) -> Result<()> {
    self.file.sync_data()?;
    Ok(())
  }

  /// Empties the log. Only called from the snapshot cycle, after the new
  /// snapshot is durable, and at the end of recovery.
  pub fn truncate(&mut self) -> Result<()> {
    self.file.set_len(0)?;
    self.file.sync_data()?;
    Ok(())
  }

  pub fn len(&self) -> Result<u64> {
    Ok(self.file.metadata()?.len())
  }

  pub fn is_empty(&self) -> Result<bool> {
    Ok(self.len()? == 0)
  }

  /// Opens a fresh read handle at offset zero for recovery. The write
  /// handle is in append mode and cannot be reused for scanning.
  pub fn read_records(&self) -> Result<RecordReader<BufReader<File>>> {
    let file = File::open(&self.path)?;
    Ok(RecordReader::new(BufReader::new(file)))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::record::Op;
  use tempfile::TempDir;

  #[test]
  fn test_append_and_read_back() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("test.wal");
    let mut wal = WalFile::open(&path, SyncMode::Strict).unwrap();

    assert!(wal.is_empty().unwrap());

    wal.append(&Record::add("h", "b1", 0, 10)).unwrap();
    wal.append(&Record::pop("h", "b1", 0, 10)).unwrap();

    let records: Vec<Record> = wal.read_records().unwrap().collect();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].op, Op::Add);
    assert_eq!(records[1].op, Op::Pop);
  }

  #[test]
  fn test_truncate_empties_log() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("test.wal");
    let mut wal = WalFile::open(&path, SyncMode::Grouped).unwrap();

    wal.append(&Record::add("h", "b1", 0, 10)).unwrap();
    assert!(!wal.is_empty().unwrap());

    wal.truncate().unwrap();
    assert!(wal.is_empty().unwrap());
    assert_eq!(wal.read_records().unwrap().count(), 0);

    // Appends land at offset zero again.
    wal.append(&Record::add("h", "b2", 10, 20)).unwrap();
    let records: Vec<Record> = wal.read_records().unwrap().collect();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].blob_id, "b2");
  }

  #[test]
  fn test_reopen_appends_at_tail() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("test.wal");

    {
      let mut wal = WalFile::open(&path, SyncMode::Strict).unwrap();
      wal.append(&Record::add("h", "b1", 0, 10)).unwrap();
    }

    let mut wal = WalFile::open(&path, SyncMode::Strict).unwrap();
    wal.append(&Record::add("h", "b2", 10, 20)).unwrap();

    let ids: Vec<String> = wal.read_records().unwrap().map(|r| r.blob_id).collect();
    assert_eq!(ids, vec!["b1", "b2"]);
  }
}
