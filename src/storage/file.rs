//! Owns the database file handle: raw, page-addressed I/O.
//!
//! `Storage` knows nothing about caching, pinning, or page semantics — it
//! only seeks to `page_num * page_size` and reads/writes exactly
//! `page_size` bytes, extending the file first if a write would run past
//! the current end.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use log::trace;

use crate::error::Error;

#[derive(Debug)]
pub struct Storage {
    file: File,
    page_size: usize,
}

impl Storage {
    /// Opens (creating if missing) the file at `path`. Returns whether the
    /// file was newly created alongside the handle, so the caller can
    /// decide whether to bootstrap a fresh metadata page.
    pub fn open(path: impl AsRef<Path>, page_size: usize) -> Result<(Self, bool), Error> {
        let path = path.as_ref();
        let existed = path.exists();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)?;

        Ok((Self { file, page_size }, !existed))
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Reads exactly `page_size` bytes for `page_num` into `buf`.
    pub fn read_page(&mut self, page_num: u32, buf: &mut [u8]) -> Result<(), Error> {
        debug_assert_eq!(buf.len(), self.page_size);
        let offset = page_num as u64 * self.page_size as u64;
        self.file.seek(SeekFrom::Start(offset))?;

        let mut total = 0;
        loop {
            match self.file.read(&mut buf[total..]) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(e) => return Err(Error::Io(e)),
            }
            if total == buf.len() {
                break;
            }
        }
        if total != buf.len() {
            return Err(Error::IncompleteRead {
                page_num,
                expected: buf.len(),
                got: total,
            });
        }
        trace!("read page {page_num} ({} bytes)", buf.len());
        Ok(())
    }

    /// Writes `buf` (exactly `page_size` bytes) to `page_num`, extending
    /// the file first if necessary.
    pub fn write_page(&mut self, page_num: u32, buf: &[u8]) -> Result<(), Error> {
        debug_assert_eq!(buf.len(), self.page_size);
        let offset = page_num as u64 * self.page_size as u64;
        let required_len = offset + self.page_size as u64;
        let current_len = self.file.metadata()?.len();
        if required_len > current_len {
            self.file.set_len(required_len)?;
            // Touch the final byte so sparse-file support isn't load-bearing.
            self.file.seek(SeekFrom::Start(required_len - 1))?;
            self.file.write_all(&[0u8])?;
        }

        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(buf).map_err(|e| {
            if e.kind() == std::io::ErrorKind::WriteZero {
                Error::IncompleteWrite {
                    page_num,
                    expected: buf.len(),
                    got: 0,
                }
            } else {
                Error::Io(e)
            }
        })?;
        trace!("wrote page {page_num} ({} bytes)", buf.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn open_reports_whether_file_was_created() {
        let dir = TempDir::new("storage").unwrap();
        let path = dir.path().join("db");
        let (_, created) = Storage::open(&path, 64).unwrap();
        assert!(created);
        let (_, created_again) = Storage::open(&path, 64).unwrap();
        assert!(!created_again);
    }

    #[test]
    fn write_then_read_roundtrips() {
        let dir = TempDir::new("storage").unwrap();
        let path = dir.path().join("db");
        let (mut storage, _) = Storage::open(&path, 16).unwrap();

        let mut buf = vec![0u8; 16];
        buf[0] = 7;
        storage.write_page(3, &buf).unwrap();

        let mut read_back = vec![0u8; 16];
        storage.read_page(3, &mut read_back).unwrap();
        assert_eq!(buf, read_back);
    }

    #[test]
    fn read_past_end_fails_incomplete() {
        let dir = TempDir::new("storage").unwrap();
        let path = dir.path().join("db");
        let (mut storage, _) = Storage::open(&path, 16).unwrap();
        let mut buf = vec![0u8; 16];
        assert!(matches!(
            storage.read_page(0, &mut buf),
            Err(Error::IncompleteRead { .. })
        ));
    }

    #[test]
    fn write_extends_file() {
        let dir = TempDir::new("storage").unwrap();
        let path = dir.path().join("db");
        let (mut storage, _) = Storage::open(&path, 16).unwrap();
        storage.write_page(5, &vec![1u8; 16]).unwrap();
        let len = std::fs::metadata(&path).unwrap().len();
        assert_eq!(len, 6 * 16);
    }
}
