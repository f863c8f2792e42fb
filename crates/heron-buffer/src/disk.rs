//! Page-granular file I/O.
//!
//! The buffer pool consumes the [`DiskManager`] trait and never touches
//! files itself; [`FileDiskManager`] is the standard implementation over a
//! single data file where page `n` lives at byte offset `n * PAGE_SIZE`.

use heron_common::page::{PageId, PAGE_SIZE};
use heron_common::{Result, StorageConfig};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Interface between the buffer pool and persistent storage.
pub trait DiskManager: Send + Sync {
    /// Reads a page image into `buf`.
    ///
    /// A page that was allocated but never written back has no bytes on
    /// disk yet; reading it yields a zeroed buffer.
    fn read_page(&self, page_id: PageId, buf: &mut [u8; PAGE_SIZE]) -> Result<()>;

    /// Writes a page image to its slot in the file.
    fn write_page(&self, page_id: PageId, data: &[u8; PAGE_SIZE]) -> Result<()>;

    /// Flushes pending writes and releases the backing resources.
    fn shut_down(&self);
}

/// Disk manager backed by a single data file.
pub struct FileDiskManager {
    /// The data file, serialized behind a mutex.
    file: Mutex<File>,
    /// Path to the data file.
    path: PathBuf,
    /// Whether to fsync after every write.
    fsync_enabled: bool,
}

impl FileDiskManager {
    /// Opens (or creates) the data file at `path`.
    pub fn open(path: impl AsRef<Path>, fsync_enabled: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;

        Ok(Self {
            file: Mutex::new(file),
            path,
            fsync_enabled,
        })
    }

    /// Opens the data file named by a storage configuration.
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        Self::open(&config.data_path, config.fsync_enabled)
    }

    /// Returns the path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the number of pages the backing file currently holds.
    pub fn num_pages(&self) -> Result<u32> {
        let file = self.file.lock();
        let len = file.metadata()?.len();
        Ok((len / PAGE_SIZE as u64) as u32)
    }
}

impl DiskManager for FileDiskManager {
    fn read_page(&self, page_id: PageId, buf: &mut [u8; PAGE_SIZE]) -> Result<()> {
        let mut file = self.file.lock();
        let offset = page_id.file_offset();
        let len = file.metadata()?.len();

        // Writes are page-aligned, so a page is either fully present or
        // entirely past the end of the file.
        if offset >= len {
            buf.fill(0);
            return Ok(());
        }

        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)?;
        Ok(())
    }

    fn write_page(&self, page_id: PageId, data: &[u8; PAGE_SIZE]) -> Result<()> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(page_id.file_offset()))?;
        file.write_all(data)?;

        if self.fsync_enabled {
            file.sync_all()?;
        }
        Ok(())
    }

    fn shut_down(&self) {
        let _ = self.file.lock().sync_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn create_test_disk_manager() -> (FileDiskManager, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let dm = FileDiskManager::open(dir.path().join("test.db"), false).unwrap();
        (dm, dir)
    }

    #[test]
    fn test_disk_manager_open() {
        let (dm, dir) = create_test_disk_manager();
        assert_eq!(dm.path(), dir.path().join("test.db"));
        assert_eq!(dm.num_pages().unwrap(), 0);
    }

    #[test]
    fn test_disk_manager_write_read() {
        let (dm, _dir) = create_test_disk_manager();

        let mut data = [0u8; PAGE_SIZE];
        data[0] = 0x21;
        data[PAGE_SIZE / 2] = 0x42;
        data[PAGE_SIZE - 1] = 0x84;
        dm.write_page(PageId(0), &data).unwrap();

        let mut read_back = [0u8; PAGE_SIZE];
        dm.read_page(PageId(0), &mut read_back).unwrap();
        assert_eq!(read_back[0], 0x21);
        assert_eq!(read_back[PAGE_SIZE / 2], 0x42);
        assert_eq!(read_back[PAGE_SIZE - 1], 0x84);
    }

    #[test]
    fn test_disk_manager_read_unwritten_page_is_zeroed() {
        let (dm, _dir) = create_test_disk_manager();

        let mut buf = [0xFFu8; PAGE_SIZE];
        dm.read_page(PageId(7), &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_disk_manager_overwrite_page() {
        let (dm, _dir) = create_test_disk_manager();

        let mut data = [0u8; PAGE_SIZE];
        data[0] = 0xAA;
        dm.write_page(PageId(2), &data).unwrap();

        data[0] = 0xBB;
        dm.write_page(PageId(2), &data).unwrap();

        let mut read_back = [0u8; PAGE_SIZE];
        dm.read_page(PageId(2), &mut read_back).unwrap();
        assert_eq!(read_back[0], 0xBB);
    }

    #[test]
    fn test_disk_manager_sparse_pages() {
        let (dm, _dir) = create_test_disk_manager();

        let mut data = [0u8; PAGE_SIZE];
        data[0] = 0x11;
        dm.write_page(PageId(0), &data).unwrap();
        data[0] = 0x33;
        dm.write_page(PageId(3), &data).unwrap();

        assert_eq!(dm.num_pages().unwrap(), 4);

        let mut buf = [0u8; PAGE_SIZE];
        dm.read_page(PageId(0), &mut buf).unwrap();
        assert_eq!(buf[0], 0x11);
        // Page between the two writes reads as zeroes
        dm.read_page(PageId(1), &mut buf).unwrap();
        assert_eq!(buf[0], 0);
        dm.read_page(PageId(3), &mut buf).unwrap();
        assert_eq!(buf[0], 0x33);
    }

    #[test]
    fn test_disk_manager_persistence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("persist.db");

        {
            let dm = FileDiskManager::open(&path, true).unwrap();
            let mut data = [0u8; PAGE_SIZE];
            data[9] = 0x77;
            dm.write_page(PageId(1), &data).unwrap();
            dm.shut_down();
        }

        {
            let dm = FileDiskManager::open(&path, true).unwrap();
            let mut buf = [0u8; PAGE_SIZE];
            dm.read_page(PageId(1), &mut buf).unwrap();
            assert_eq!(buf[9], 0x77);
        }
    }

    #[test]
    fn test_disk_manager_from_config() {
        let dir = tempdir().unwrap();
        let config = StorageConfig {
            data_path: dir.path().join("cfg.db"),
            fsync_enabled: false,
            ..Default::default()
        };
        let dm = FileDiskManager::from_config(&config).unwrap();
        assert_eq!(dm.path(), config.data_path);
    }
}
