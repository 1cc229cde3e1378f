//! File I/O abstraction the persistence engine consumes. Mirrors
//! `storage::disk::DiskManager`'s approach (a `Mutex<File>` with explicit
//! `seek`/`read_exact`/`write_all`) but narrowed to the four operations the
//! index core actually needs, so an object-store-backed implementation can
//! stand in without dragging the local-FS assumptions into the core.

use crate::error::Result;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

pub trait BlobIo: Send + Sync {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()>;
    fn write_at(&self, offset: u64, buf: &[u8]) -> Result<()>;
    fn fsync(&self) -> Result<()>;
    fn truncate(&self, new_len: u64) -> Result<()>;
    fn len(&self) -> Result<u64>;
    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

/// Local-filesystem `BlobIo`. `rename` is exposed as a free function since
/// it operates on paths, not an open file handle (used for the atomic
/// header swap in `persistence`).
pub struct FsBlobIo {
    file: Mutex<File>,
}

impl FsBlobIo {
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl BlobIo for FsBlobIo {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)?;
        Ok(())
    }

    fn write_at(&self, offset: u64, buf: &[u8]) -> Result<()> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(buf)?;
        Ok(())
    }

    fn fsync(&self) -> Result<()> {
        self.file.lock().sync_all()?;
        Ok(())
    }

    fn truncate(&self, new_len: u64) -> Result<()> {
        self.file.lock().set_len(new_len)?;
        Ok(())
    }

    fn len(&self) -> Result<u64> {
        Ok(self.file.lock().metadata()?.len())
    }
}

/// Atomic rename, used for the header's write-tmp/fsync/rename swap.
pub fn atomic_rename(from: &Path, to: &Path) -> Result<()> {
    std::fs::rename(from, to)?;
    Ok(())
}

pub fn data_level0_path(dir: &Path) -> PathBuf {
    dir.join("data_level0.bin")
}

pub fn link_lists_path(dir: &Path) -> PathBuf {
    dir.join("link_lists.bin")
}

pub fn original_vectors_path(dir: &Path) -> PathBuf {
    dir.join("original_vectors.bin")
}

pub fn header_path(dir: &Path) -> PathBuf {
    dir.join("header.bin")
}

pub fn header_tmp_path(dir: &Path) -> PathBuf {
    dir.join("header.bin.tmp")
}
