//! File manager for page-level I/O on named files.

use larch_common::page::{PageNo, PAGE_SIZE};
use larch_common::{LarchError, Result, StorageConfig};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use tracing::debug;

/// Runtime identifier of an open paged file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId(pub u32);

impl std::fmt::Display for FileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "file:{}", self.0)
    }
}

/// Handle for an open paged file.
struct FileHandle {
    /// The OS file handle.
    file: File,
    /// File name within the data directory.
    name: String,
    /// Number of pages in the file.
    num_pages: u32,
}

struct FileTable {
    /// Open file handles keyed by file id.
    files: HashMap<u32, FileHandle>,
    /// Name to file id mapping for already-open files.
    by_name: HashMap<String, u32>,
    /// Next file id to assign.
    next_id: u32,
}

/// Manages named files as sequences of fixed-size pages.
///
/// Pages are numbered from 1; page number 0 is the invalid sentinel and is
/// never allocated. Page `n` lives at byte offset `(n - 1) * PAGE_SIZE`.
pub struct FileManager {
    /// Configuration.
    config: StorageConfig,
    /// Open files.
    table: Mutex<FileTable>,
}

impl FileManager {
    /// Creates a new file manager rooted at the configured data directory.
    pub fn new(config: StorageConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;

        Ok(Self {
            config,
            table: Mutex::new(FileTable {
                files: HashMap::new(),
                by_name: HashMap::new(),
                next_id: 0,
            }),
        })
    }

    /// Returns the path of a named file inside the data directory.
    fn file_path(&self, name: &str) -> PathBuf {
        self.config.data_dir.join(name)
    }

    fn register(&self, file: File, name: &str, num_pages: u32) -> FileId {
        let mut table = self.table.lock();
        let id = table.next_id;
        table.next_id += 1;
        table.files.insert(
            id,
            FileHandle {
                file,
                name: name.to_string(),
                num_pages,
            },
        );
        table.by_name.insert(name.to_string(), id);
        FileId(id)
    }

    /// Creates a new empty file. Errors if the file already exists.
    pub fn create(&self, name: &str) -> Result<FileId> {
        let path = self.file_path(name);
        if path.exists() {
            return Err(LarchError::FileExists(name.to_string()));
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)?;

        debug!(name, "created paged file");
        Ok(self.register(file, name, 0))
    }

    /// Opens an existing file. Errors with FileNotFound if absent.
    ///
    /// Opening a file that is already open returns the existing id.
    pub fn open(&self, name: &str) -> Result<FileId> {
        if let Some(&id) = self.table.lock().by_name.get(name) {
            return Ok(FileId(id));
        }

        let path = self.file_path(name);
        if !path.exists() {
            return Err(LarchError::FileNotFound(name.to_string()));
        }

        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        let num_pages = (file.metadata()?.len() / PAGE_SIZE as u64) as u32;

        debug!(name, num_pages, "opened paged file");
        Ok(self.register(file, name, num_pages))
    }

    /// Closes an open file, syncing its contents.
    pub fn close(&self, file_id: FileId) -> Result<()> {
        let mut table = self.table.lock();
        if let Some(handle) = table.files.remove(&file_id.0) {
            table.by_name.remove(&handle.name);
            handle.file.sync_all()?;
        }
        Ok(())
    }

    /// Deletes a named file. Errors with FileNotFound if absent.
    pub fn remove(&self, name: &str) -> Result<()> {
        {
            let mut table = self.table.lock();
            if let Some(id) = table.by_name.remove(name) {
                table.files.remove(&id);
            }
        }

        let path = self.file_path(name);
        if !path.exists() {
            return Err(LarchError::FileNotFound(name.to_string()));
        }
        std::fs::remove_file(path)?;
        debug!(name, "removed paged file");
        Ok(())
    }

    fn with_handle<T>(&self, file_id: FileId, f: impl FnOnce(&mut FileHandle) -> Result<T>) -> Result<T> {
        let mut table = self.table.lock();
        let handle = table
            .files
            .get_mut(&file_id.0)
            .ok_or_else(|| LarchError::FileNotFound(format!("{file_id} not open")))?;
        f(handle)
    }

    /// Reads a page from disk.
    pub fn read_page(&self, file_id: FileId, page_no: PageNo) -> Result<[u8; PAGE_SIZE]> {
        self.with_handle(file_id, |handle| {
            if page_no == 0 || page_no > handle.num_pages {
                return Err(LarchError::PageNotFound(format!(
                    "page {page_no} of {}",
                    handle.name
                )));
            }

            let offset = (page_no as u64 - 1) * PAGE_SIZE as u64;
            handle.file.seek(SeekFrom::Start(offset))?;

            let mut buffer = [0u8; PAGE_SIZE];
            handle.file.read_exact(&mut buffer)?;
            Ok(buffer)
        })
    }

    /// Writes a page to disk.
    pub fn write_page(&self, file_id: FileId, page_no: PageNo, data: &[u8; PAGE_SIZE]) -> Result<()> {
        let fsync = self.config.fsync_enabled;
        self.with_handle(file_id, |handle| {
            if page_no == 0 || page_no > handle.num_pages {
                return Err(LarchError::PageNotFound(format!(
                    "page {page_no} of {}",
                    handle.name
                )));
            }

            let offset = (page_no as u64 - 1) * PAGE_SIZE as u64;
            handle.file.seek(SeekFrom::Start(offset))?;
            handle.file.write_all(data)?;

            if fsync {
                handle.file.sync_all()?;
            }
            Ok(())
        })
    }

    /// Extends the file with a zeroed page and returns its page number.
    pub fn allocate_page(&self, file_id: FileId) -> Result<PageNo> {
        let fsync = self.config.fsync_enabled;
        self.with_handle(file_id, |handle| {
            let page_no = handle.num_pages + 1;
            let offset = (page_no as u64 - 1) * PAGE_SIZE as u64;
            handle.file.seek(SeekFrom::Start(offset))?;
            handle.file.write_all(&[0u8; PAGE_SIZE])?;

            if fsync {
                handle.file.sync_all()?;
            }

            handle.num_pages = page_no;
            Ok(page_no)
        })
    }

    /// Returns the number of the file's first page.
    pub fn first_page_no(&self, file_id: FileId) -> Result<PageNo> {
        self.with_handle(file_id, |handle| {
            if handle.num_pages == 0 {
                return Err(LarchError::PageNotFound(format!("{} is empty", handle.name)));
            }
            Ok(1)
        })
    }

    /// Returns the number of pages in the file.
    pub fn num_pages(&self, file_id: FileId) -> Result<u32> {
        self.with_handle(file_id, |handle| Ok(handle.num_pages))
    }

    /// Syncs an open file to disk.
    pub fn sync(&self, file_id: FileId) -> Result<()> {
        self.with_handle(file_id, |handle| {
            handle.file.sync_all()?;
            Ok(())
        })
    }
}

impl Drop for FileManager {
    fn drop(&mut self) {
        let table = self.table.lock();
        for handle in table.files.values() {
            let _ = handle.file.sync_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn create_test_manager() -> (FileManager, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let config = StorageConfig {
            data_dir: dir.path().to_path_buf(),
            fsync_enabled: false,
            ..Default::default()
        };
        (FileManager::new(config).unwrap(), dir)
    }

    #[test]
    fn test_create_and_open() {
        let (fm, _dir) = create_test_manager();

        let created = fm.create("relA").unwrap();
        assert_eq!(fm.num_pages(created).unwrap(), 0);

        // Opening by name while already open yields the same id.
        let opened = fm.open("relA").unwrap();
        assert_eq!(created, opened);
    }

    #[test]
    fn test_create_existing_fails() {
        let (fm, _dir) = create_test_manager();

        fm.create("relA").unwrap();
        assert!(matches!(fm.create("relA"), Err(LarchError::FileExists(_))));
    }

    #[test]
    fn test_open_missing_fails() {
        let (fm, _dir) = create_test_manager();
        assert!(matches!(fm.open("nope"), Err(LarchError::FileNotFound(_))));
    }

    #[test]
    fn test_allocate_pages_one_based() {
        let (fm, _dir) = create_test_manager();
        let file = fm.create("relA").unwrap();

        assert_eq!(fm.allocate_page(file).unwrap(), 1);
        assert_eq!(fm.allocate_page(file).unwrap(), 2);
        assert_eq!(fm.num_pages(file).unwrap(), 2);
        assert_eq!(fm.first_page_no(file).unwrap(), 1);
    }

    #[test]
    fn test_first_page_of_empty_file_fails() {
        let (fm, _dir) = create_test_manager();
        let file = fm.create("relA").unwrap();
        assert!(matches!(
            fm.first_page_no(file),
            Err(LarchError::PageNotFound(_))
        ));
    }

    #[test]
    fn test_write_read_roundtrip() {
        let (fm, _dir) = create_test_manager();
        let file = fm.create("relA").unwrap();
        let page_no = fm.allocate_page(file).unwrap();

        let mut data = [0u8; PAGE_SIZE];
        data[0] = 0xAB;
        data[PAGE_SIZE - 1] = 0xEF;
        fm.write_page(file, page_no, &data).unwrap();

        let read = fm.read_page(file, page_no).unwrap();
        assert_eq!(read[0], 0xAB);
        assert_eq!(read[PAGE_SIZE - 1], 0xEF);
    }

    #[test]
    fn test_read_invalid_page_fails() {
        let (fm, _dir) = create_test_manager();
        let file = fm.create("relA").unwrap();
        fm.allocate_page(file).unwrap();

        assert!(matches!(
            fm.read_page(file, 0),
            Err(LarchError::PageNotFound(_))
        ));
        assert!(matches!(
            fm.read_page(file, 99),
            Err(LarchError::PageNotFound(_))
        ));
    }

    #[test]
    fn test_allocated_page_is_zeroed() {
        let (fm, _dir) = create_test_manager();
        let file = fm.create("relA").unwrap();
        let page_no = fm.allocate_page(file).unwrap();

        let data = fm.read_page(file, page_no).unwrap();
        assert!(data.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_persistence_across_reopen() {
        let dir = tempdir().unwrap();
        let config = StorageConfig {
            data_dir: dir.path().to_path_buf(),
            fsync_enabled: true,
            ..Default::default()
        };

        {
            let fm = FileManager::new(config.clone()).unwrap();
            let file = fm.create("relA").unwrap();
            let page_no = fm.allocate_page(file).unwrap();
            let mut data = [0u8; PAGE_SIZE];
            data[0] = 0xFF;
            fm.write_page(file, page_no, &data).unwrap();
        }

        {
            let fm = FileManager::new(config).unwrap();
            let file = fm.open("relA").unwrap();
            assert_eq!(fm.num_pages(file).unwrap(), 1);
            assert_eq!(fm.read_page(file, 1).unwrap()[0], 0xFF);
        }
    }

    #[test]
    fn test_remove() {
        let (fm, dir) = create_test_manager();
        fm.create("relA").unwrap();
        assert!(dir.path().join("relA").exists());

        fm.remove("relA").unwrap();
        assert!(!dir.path().join("relA").exists());

        assert!(matches!(fm.remove("relA"), Err(LarchError::FileNotFound(_))));
    }

    #[test]
    fn test_close_and_reopen() {
        let (fm, _dir) = create_test_manager();
        let file = fm.create("relA").unwrap();
        fm.allocate_page(file).unwrap();

        fm.close(file).unwrap();

        let reopened = fm.open("relA").unwrap();
        assert_eq!(fm.num_pages(reopened).unwrap(), 1);
    }

    #[test]
    fn test_multiple_files_independent() {
        let (fm, _dir) = create_test_manager();

        let a = fm.create("relA").unwrap();
        let b = fm.create("relB").unwrap();
        assert_ne!(a, b);

        fm.allocate_page(a).unwrap();
        let mut data = [0u8; PAGE_SIZE];
        data[0] = 0x11;
        fm.write_page(a, 1, &data).unwrap();

        fm.allocate_page(b).unwrap();
        data[0] = 0x22;
        fm.write_page(b, 1, &data).unwrap();

        assert_eq!(fm.read_page(a, 1).unwrap()[0], 0x11);
        assert_eq!(fm.read_page(b, 1).unwrap()[0], 0x22);
    }
}
