//! Block-granular access to the files backing segments and the log.

use std::fs::{File, OpenOptions, create_dir_all};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// How a file may be accessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMode {
    Read,
    Write,
}

/// A file addressed by byte offset. Reads and writes must stay within the
/// current size; growing a file goes through `resize`.
pub struct BlockFile {
    file: File,
    mode: FileMode,
}

impl BlockFile {
    /// Opens the file at `path`. In write mode the file (and its parent
    /// directory) is created if missing; existing contents are kept.
    pub fn open<P: AsRef<Path>>(path: P, mode: FileMode) -> io::Result<Self> {
        let path_ref = path.as_ref();
        let file = match mode {
            FileMode::Read => OpenOptions::new().read(true).open(path_ref)?,
            FileMode::Write => {
                if let Some(parent) = path_ref.parent() {
                    create_dir_all(parent)?;
                }
                OpenOptions::new()
                    .read(true)
                    .write(true)
                    .create(true)
                    .truncate(false)
                    .open(path_ref)?
            }
        };
        Ok(Self { file, mode })
    }

    pub fn mode(&self) -> FileMode {
        self.mode
    }

    pub fn size(&self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    pub fn resize(&mut self, new_size: u64) -> io::Result<()> {
        self.require_write_mode()?;
        self.file.set_len(new_size)
    }

    /// Reads `block.len()` bytes starting at `offset`.
    pub fn read_block(&mut self, offset: u64, block: &mut [u8]) -> io::Result<()> {
        self.check_range(offset, block.len())?;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(block)
    }

    /// Writes `block` at `offset`. The range must already be within the
    /// file; callers append by resizing first.
    pub fn write_block(&mut self, block: &[u8], offset: u64) -> io::Result<()> {
        self.require_write_mode()?;
        self.check_range(offset, block.len())?;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(block)
    }

    fn require_write_mode(&self) -> io::Result<()> {
        if self.mode != FileMode::Write {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "file is open read-only",
            ));
        }
        Ok(())
    }

    fn check_range(&self, offset: u64, len: usize) -> io::Result<()> {
        let size = self.size()?;
        let end = offset
            .checked_add(len as u64)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "block range overflows"))?;
        if end > size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("block [{offset}, {end}) out of range for file of {size} bytes"),
            ));
        }
        Ok(())
    }
}
