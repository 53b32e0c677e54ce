use crate::error::Result;
use crate::index::Index;
use crate::record::RecordReader;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Full-image snapshot of the index.
///
/// The snapshot is a concatenation of Add records in host order, each
/// host's blobs in FIFO order, encoded with the same codec as the WAL.
/// Writes go through a temp file plus atomic rename, so readers only ever
/// observe the old image or the new one.
pub(crate) struct SnapshotStore {
  path: PathBuf,
}

impl SnapshotStore {
  pub fn new(path: &Path) -> Self {
    Self {
      path: path.to_path_buf(),
    }
  }

  /// Writes the index image durably: temp file, flush, fsync, rename over
  /// the live path, fsync the parent directory. The caller truncates the
  /// WAL only after this returns, so a crash at any point leaves a
  /// durable superset of the index on disk.
  pub fn write(&self, index: &Index) -> Result<()> {
    let temp_path = self.path.with_extension("snapshot.tmp");

    let file = File::create(&temp_path)?;
    let mut writer = BufWriter::new(file);
    for record in index.records() {
      record.write(&mut writer)?;
    }
    writer.flush()?;
    writer.get_ref().sync_all()?;
    drop(writer);

    fs::rename(&temp_path, &self.path)?;

    let parent = match self.path.parent() {
      Some(p) if !p.as_os_str().is_empty() => p,
      _ => Path::new("."),
    };
    File::open(parent)?.sync_all()?;

    Ok(())
  }

  /// Streams the snapshot into a fresh index. A missing file loads as an
  /// empty index; an unreadable tail keeps whatever decoded cleanly.
  pub fn load(&self) -> Result<Index> {
    let mut index = Index::new();

    let file = match File::open(&self.path) {
      Ok(f) => f,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(index),
      Err(e) => return Err(e.into()),
    };

    let mut reader = RecordReader::new(BufReader::new(file));
    for record in reader.by_ref() {
      index.apply_replayed(&record);
    }
    if let Some(err) = reader.tail_error() {
      warn!(target: "blobq", %err, "snapshot tail unreadable, loaded partial image");
    }

    Ok(index)
  }
}
