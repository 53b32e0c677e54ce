use crate::error::{Error, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher;
use std::io::{self, Read, Write};

pub const RECORD_MAGIC: u32 = 0x58495142; // "BQIX"

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Op {
  Add = 0x00,
  Pop = 0x01,
}

impl TryFrom<u8> for Op {
  type Error = Error;
  fn try_from(v: u8) -> Result<Self> {
    match v {
      0x00 => Ok(Op::Add),
      0x01 => Ok(Op::Pop),
      _ => Err(Error::Corruption(format!("Unknown record op: {}", v))),
    }
  }
}

/// A single WAL or snapshot entry.
///
/// The exact binary layout on disk (29-byte header, then variable payload):
///
/// [Magic: 4]
/// [CRC32: 4]
/// [Op: 1]
/// [Host Len: 2]
/// [Id Len: 2]
/// [Position: 8]
/// [Size: 8]
/// [Host bytes][Id bytes]
///
/// The CRC covers everything after the CRC field itself. Records are
/// self-delimiting, so both the WAL and the snapshot are plain
/// concatenations of records decoded one at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
  pub op: Op,
  pub host: String,
  pub blob_id: String,
  pub position: u64,
  pub size: u64,
}

impl Record {
  pub const HEADER_SIZE: usize = 4 + 4 + 1 + 2 + 2 + 8 + 8; // 29 bytes

  pub fn add(host: &str, blob_id: &str, position: u64, size: u64) -> Self {
    Self {
      op: Op::Add,
      host: host.to_string(),
      blob_id: blob_id.to_string(),
      position,
      size,
    }
  }

  pub fn pop(host: &str, blob_id: &str, position: u64, size: u64) -> Self {
    Self {
      op: Op::Pop,
      host: host.to_string(),
      blob_id: blob_id.to_string(),
      position,
      size,
    }
  }

  /// Total encoded length of this record.
  pub fn encoded_len(&self) -> usize {
    Self::HEADER_SIZE + self.host.len() + self.blob_id.len()
  }

  pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
    let host = self.host.as_bytes();
    let id = self.blob_id.as_bytes();
    if host.len() > u16::MAX as usize {
      return Err(Error::Serialization(format!(
        "Host name too long for record encoding: {} bytes",
        host.len()
      )));
    }
    if id.len() > u16::MAX as usize {
      return Err(Error::Serialization(format!(
        "Blob id too long for record encoding: {} bytes",
        id.len()
      )));
    }

    writer.write_u32::<LittleEndian>(RECORD_MAGIC)?;
    writer.write_u32::<LittleEndian>(self.checksum())?;
    writer.write_u8(self.op as u8)?;
    writer.write_u16::<LittleEndian>(host.len() as u16)?;
    writer.write_u16::<LittleEndian>(id.len() as u16)?;
    writer.write_u64::<LittleEndian>(self.position)?;
    writer.write_u64::<LittleEndian>(self.size)?;
    writer.write_all(host)?;
    writer.write_all(id)?;
    Ok(())
  }

  pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
    let magic = reader.read_u32::<LittleEndian>()?;
    if magic != RECORD_MAGIC {
      return Err(Error::Corruption(format!("Invalid record magic: {:#x}", magic)));
    }
    Self::read_after_magic(reader, 0)
  }

  /// Decodes the remainder of a record once the magic has been consumed.
  /// `offset` is the position of the record start, used for CRC reporting.
  pub(crate) fn read_after_magic<R: Read>(reader: &mut R, offset: u64) -> Result<Self> {
    let crc = reader.read_u32::<LittleEndian>()?;
    let op = Op::try_from(reader.read_u8()?)?;
    let host_len = reader.read_u16::<LittleEndian>()? as usize;
    let id_len = reader.read_u16::<LittleEndian>()? as usize;
    let position = reader.read_u64::<LittleEndian>()?;
    let size = reader.read_u64::<LittleEndian>()?;

    let mut host_buf = vec![0u8; host_len];
    reader.read_exact(&mut host_buf)?;
    let mut id_buf = vec![0u8; id_len];
    reader.read_exact(&mut id_buf)?;

    let host = String::from_utf8(host_buf)
      .map_err(|e| Error::Corruption(format!("Invalid UTF-8 in record host: {}", e)))?;
    let blob_id = String::from_utf8(id_buf)
      .map_err(|e| Error::Corruption(format!("Invalid UTF-8 in record blob id: {}", e)))?;

    let record = Self {
      op,
      host,
      blob_id,
      position,
      size,
    };

    let actual = record.checksum();
    if actual != crc {
      return Err(Error::CrcMismatch {
        expected: crc,
        actual,
        offset,
      });
    }

    Ok(record)
  }

  /// CRC32 over everything after the CRC field.
  fn checksum(&self) -> u32 {
    let host = self.host.as_bytes();
    let id = self.blob_id.as_bytes();
    let mut hasher = Hasher::new();
    hasher.update(&[self.op as u8]);
    hasher.update(&(host.len() as u16).to_le_bytes());
    hasher.update(&(id.len() as u16).to_le_bytes());
    hasher.update(&self.position.to_le_bytes());
    hasher.update(&self.size.to_le_bytes());
    hasher.update(host);
    hasher.update(id);
    hasher.finalize()
  }
}

/// Streams records from a reader, one at a time.
///
/// A clean EOF at a record boundary ends the stream normally. A short
/// read, bad magic, or checksum mismatch also ends the stream but is
/// remembered as a tail error: it marks where a prior crash cut the log
/// mid-append, and callers decide whether to warn or fail.
pub struct RecordReader<R: Read> {
  reader: R,
  offset: u64,
  tail_error: Option<Error>,
}

impl<R: Read> RecordReader<R> {
  pub fn new(reader: R) -> Self {
    Self {
      reader,
      offset: 0,
      tail_error: None,
    }
  }

  /// The error that terminated the stream, if it was not a clean EOF.
  pub fn tail_error(&self) -> Option<&Error> {
    self.tail_error.as_ref()
  }

  pub fn next_record(&mut self) -> Option<Record> {
    if self.tail_error.is_some() {
      return None;
    }

    // Read the magic byte-by-byte so a clean EOF at a record boundary is
    // distinguishable from a header cut mid-write.
    let mut magic = [0u8; 4];
    let mut filled = 0;
    while filled < magic.len() {
      match self.reader.read(&mut magic[filled..]) {
        Ok(0) => {
          if filled > 0 {
            self.tail_error = Some(Error::Corruption(format!(
              "Record header truncated at offset {}",
              self.offset
            )));
          }
          return None;
        }
        Ok(n) => filled += n,
        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
        Err(e) => {
          self.tail_error = Some(Error::Io(e));
          return None;
        }
      }
    }

    if u32::from_le_bytes(magic) != RECORD_MAGIC {
      self.tail_error = Some(Error::Corruption(format!(
        "Invalid record magic at offset {}",
        self.offset
      )));
      return None;
    }

    match Record::read_after_magic(&mut self.reader, self.offset) {
      Ok(record) => {
        self.offset += record.encoded_len() as u64;
        Some(record)
      }
      Err(e) => {
        self.tail_error = Some(e);
        None
      }
    }
  }
}

impl<R: Read> Iterator for RecordReader<R> {
  type Item = Record;

  fn next(&mut self) -> Option<Record> {
    self.next_record()
  }
}
