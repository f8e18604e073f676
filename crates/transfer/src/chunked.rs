use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::{DEFAULT_PART_SIZE, TransferError};

/// Computes SHA-256 of `data` and returns the hex-encoded digest.
pub fn checksum_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// One numbered part of a source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    /// 1-based part number.
    pub number: u32,
    /// Byte offset of the part in the source file.
    pub offset: u64,
    pub data: Vec<u8>,
    /// Hex SHA-256 of `data`. Empty skips verification on write.
    pub checksum: String,
}

// ---------------------------------------------------------------------------
// ChunkReader
// ---------------------------------------------------------------------------

/// Reads a file in fixed-size numbered parts with SHA-256 checksums.
pub struct ChunkReader {
    file: File,
    part_size: u64,
    file_size: u64,
}

impl ChunkReader {
    /// Opens `path` for part-wise reading.
    ///
    /// If `part_size` is 0, [`DEFAULT_PART_SIZE`] is used.
    pub fn new(path: &Path, part_size: u64) -> Result<Self, TransferError> {
        let file = File::open(path)?;
        let file_size = file.metadata()?.len();
        let part_size = if part_size == 0 {
            DEFAULT_PART_SIZE
        } else {
            part_size
        };
        Ok(Self {
            file,
            part_size,
            file_size,
        })
    }

    /// Reads part `number` (1-based). Returns `None` past the end of the file.
    pub fn read_part(&mut self, number: u32) -> Result<Option<Part>, TransferError> {
        if number == 0 {
            return Ok(None);
        }
        let offset = u64::from(number - 1) * self.part_size;
        if offset >= self.file_size {
            return Ok(None);
        }

        let len = (self.file_size - offset).min(self.part_size) as usize;
        let mut data = vec![0u8; len];
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(&mut data)?;

        let checksum = checksum_bytes(&data);
        Ok(Some(Part {
            number,
            offset,
            data,
            checksum,
        }))
    }

    /// Number of parts in the file.
    pub fn part_count(&self) -> u32 {
        self.file_size.div_ceil(self.part_size) as u32
    }

    pub fn part_size(&self) -> u64 {
        self.part_size
    }

    /// Total file size in bytes.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }
}

// ---------------------------------------------------------------------------
// ChunkWriter
// ---------------------------------------------------------------------------

/// Writes parts into a single target file at their offsets, verifying
/// checksums.
pub struct ChunkWriter {
    path: PathBuf,
    file: File,
}

impl ChunkWriter {
    /// Opens (or creates) `path` without truncating, creating parent
    /// directories as needed.
    pub fn open(path: &Path) -> Result<Self, TransferError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    /// Writes a part at its offset. Rejects it if the checksum is set and
    /// does not match the data.
    pub fn write_part(&mut self, part: &Part) -> Result<(), TransferError> {
        if !part.checksum.is_empty() && checksum_bytes(&part.data) != part.checksum {
            return Err(TransferError::ChecksumMismatch);
        }

        self.file.seek(SeekFrom::Start(part.offset))?;
        self.file.write_all(&part.data)?;
        Ok(())
    }

    /// Flushes written data to disk.
    pub fn sync(&mut self) -> Result<(), TransferError> {
        self.file.flush()?;
        self.file.sync_data()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
