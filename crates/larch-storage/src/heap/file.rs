//! Heap file manager and in-order record scanner.
//!
//! A heap file is a sequence of slotted pages holding the records of one
//! relation. Records are appended to the last page, spilling onto a fresh
//! page when it fills. All page access goes through the buffer manager.

use crate::buffer::BufferManager;
use crate::file::FileId;
use crate::heap::page::HeapPage;
use crate::record::RecordId;
use bytes::Bytes;
use larch_common::page::PageNo;
use larch_common::{LarchError, Result};
use std::sync::Arc;

/// Heap file of records for a single relation.
pub struct HeapFile {
    /// Buffer manager for page access.
    buf: Arc<BufferManager>,
    /// Open file id.
    file: FileId,
    /// Relation name (the file name inside the data directory).
    name: String,
}

impl HeapFile {
    /// Creates a new empty heap file for the relation.
    pub fn create(buf: Arc<BufferManager>, name: &str) -> Result<Self> {
        let file = buf.file_manager().create(name)?;
        Ok(Self {
            buf,
            file,
            name: name.to_string(),
        })
    }

    /// Opens an existing heap file.
    pub fn open(buf: Arc<BufferManager>, name: &str) -> Result<Self> {
        let file = buf.file_manager().open(name)?;
        Ok(Self {
            buf,
            file,
            name: name.to_string(),
        })
    }

    /// Returns the relation name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the open file id.
    pub fn file_id(&self) -> FileId {
        self.file
    }

    /// Returns the number of pages in the file.
    pub fn num_pages(&self) -> Result<u32> {
        self.buf.file_manager().num_pages(self.file)
    }

    /// Appends a record, returning its record id.
    pub fn append(&self, record: &[u8]) -> Result<RecordId> {
        let num_pages = self.num_pages()?;

        // Try the last page first.
        if num_pages > 0 {
            let mut guard = self.buf.pin_page(self.file, num_pages)?;
            let mut page = HeapPage::from_bytes(&guard.data());
            match page.insert_record(record) {
                Ok(slot_no) => {
                    guard.overwrite(&page.to_bytes());
                    return Ok(RecordId::new(num_pages, slot_no));
                }
                Err(LarchError::PageFull) => {}
                Err(e) => return Err(e),
            }
        }

        // Last page full (or no pages yet): extend the file.
        let (page_no, mut guard) = self.buf.alloc_page(self.file)?;
        let mut page = HeapPage::new();
        let slot_no = page.insert_record(record)?;
        guard.overwrite(&page.to_bytes());
        Ok(RecordId::new(page_no, slot_no))
    }

    /// Fetches the record with the given id.
    pub fn record(&self, rid: RecordId) -> Result<Bytes> {
        if !rid.is_valid() {
            return Err(LarchError::RecordNotFound(rid.to_string()));
        }
        let guard = self.buf.pin_page(self.file, rid.page_no)?;
        let page = HeapPage::from_bytes(&guard.data());
        page.record(rid.slot_no)
            .map(Bytes::copy_from_slice)
            .ok_or_else(|| LarchError::RecordNotFound(rid.to_string()))
    }

    /// Writes all dirty pages of this file back to disk.
    pub fn flush(&self) -> Result<usize> {
        self.buf.flush_file(self.file)
    }
}

/// In-order cursor over every record of a heap file.
///
/// Visits records page by page, slot by slot. `scan_next` advances to the
/// next record and `get_record` returns the record the cursor is on;
/// exhaustion is reported as `EndOfFile`.
pub struct FileScan<'a> {
    heap: &'a HeapFile,
    /// Decoded copy of the page under the cursor.
    page: Option<HeapPage>,
    /// Page the cursor is on (0 before the first page).
    page_no: PageNo,
    /// Next slot to visit on the current page.
    next_slot: u16,
    /// Record id the cursor currently rests on.
    current: Option<RecordId>,
}

impl<'a> FileScan<'a> {
    /// Creates a scanner positioned before the first record.
    pub fn new(heap: &'a HeapFile) -> Self {
        Self {
            heap,
            page: None,
            page_no: 0,
            next_slot: 0,
            current: None,
        }
    }

    /// Advances to the next record and returns its id.
    ///
    /// Errors with EndOfFile once every record has been visited.
    pub fn scan_next(&mut self) -> Result<RecordId> {
        loop {
            if let Some(page) = self.page.take() {
                while self.next_slot < page.slot_count() {
                    let slot_no = self.next_slot;
                    self.next_slot += 1;
                    if page.record(slot_no).is_some() {
                        let rid = RecordId::new(self.page_no, slot_no);
                        self.current = Some(rid);
                        self.page = Some(page);
                        return Ok(rid);
                    }
                }
                // Page exhausted; fall through to load the next one.
            }

            let next_page = self.page_no + 1;
            if next_page > self.heap.num_pages()? {
                self.current = None;
                return Err(LarchError::EndOfFile);
            }

            let guard = self.heap.buf.pin_page(self.heap.file, next_page)?;
            self.page = Some(HeapPage::from_bytes(&guard.data()));
            self.page_no = next_page;
            self.next_slot = 0;
        }
    }

    /// Returns the record the cursor is currently on.
    pub fn get_record(&self) -> Result<Bytes> {
        let rid = self
            .current
            .ok_or_else(|| LarchError::RecordNotFound("scan has no current record".to_string()))?;
        match &self.page {
            Some(page) => page
                .record(rid.slot_no)
                .map(Bytes::copy_from_slice)
                .ok_or_else(|| LarchError::RecordNotFound(rid.to_string())),
            None => self.heap.record(rid),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use larch_buffer::BufferPoolConfig;
    use larch_common::StorageConfig;
    use crate::file::FileManager;
    use tempfile::tempdir;

    fn create_test_heap() -> (HeapFile, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let config = StorageConfig {
            data_dir: dir.path().to_path_buf(),
            fsync_enabled: false,
            ..Default::default()
        };
        let files = Arc::new(FileManager::new(config).unwrap());
        let buf = Arc::new(BufferManager::new(files, BufferPoolConfig { num_frames: 64 }));
        let heap = HeapFile::create(buf, "relA").unwrap();
        (heap, dir)
    }

    #[test]
    fn test_heap_append_and_get() {
        let (heap, _dir) = create_test_heap();

        let rid = heap.append(b"first record").unwrap();
        assert_eq!(rid, RecordId::new(1, 0));
        assert_eq!(heap.record(rid).unwrap(), Bytes::from_static(b"first record"));
    }

    #[test]
    fn test_heap_append_spills_to_new_page() {
        let (heap, _dir) = create_test_heap();

        // 1000-byte records: 8 per page, so 20 appends need 3 pages.
        let mut rids = Vec::new();
        for i in 0..20u8 {
            rids.push(heap.append(&[i; 1000]).unwrap());
        }

        assert!(heap.num_pages().unwrap() >= 3);
        for (i, rid) in rids.iter().enumerate() {
            assert_eq!(heap.record(*rid).unwrap(), Bytes::from(vec![i as u8; 1000]));
        }
    }

    #[test]
    fn test_heap_get_invalid_rid() {
        let (heap, _dir) = create_test_heap();
        assert!(heap.record(RecordId::INVALID).is_err());

        heap.append(b"x").unwrap();
        assert!(heap.record(RecordId::new(1, 7)).is_err());
    }

    #[test]
    fn test_file_scan_visits_all_in_order() {
        let (heap, _dir) = create_test_heap();

        let mut expected = Vec::new();
        for i in 0..500u16 {
            let record = i.to_le_bytes().repeat(30); // 60 bytes
            expected.push((heap.append(&record).unwrap(), record));
        }

        let mut scan = FileScan::new(&heap);
        for (rid, record) in &expected {
            let got = scan.scan_next().unwrap();
            assert_eq!(got, *rid);
            assert_eq!(scan.get_record().unwrap(), Bytes::from(record.clone()));
        }
        assert!(matches!(scan.scan_next(), Err(LarchError::EndOfFile)));
    }

    #[test]
    fn test_file_scan_empty_file() {
        let (heap, _dir) = create_test_heap();
        let mut scan = FileScan::new(&heap);
        assert!(matches!(scan.scan_next(), Err(LarchError::EndOfFile)));
    }

    #[test]
    fn test_file_scan_get_record_before_start() {
        let (heap, _dir) = create_test_heap();
        heap.append(b"x").unwrap();

        let scan = FileScan::new(&heap);
        assert!(scan.get_record().is_err());
    }

    #[test]
    fn test_heap_open_existing() {
        let dir = tempdir().unwrap();
        let config = StorageConfig {
            data_dir: dir.path().to_path_buf(),
            fsync_enabled: false,
            ..Default::default()
        };
        let files = Arc::new(FileManager::new(config).unwrap());
        let buf = Arc::new(BufferManager::new(files, BufferPoolConfig { num_frames: 64 }));

        let rid;
        {
            let heap = HeapFile::create(buf.clone(), "relB").unwrap();
            rid = heap.append(b"persisted").unwrap();
            heap.flush().unwrap();
        }

        let heap = HeapFile::open(buf, "relB").unwrap();
        assert_eq!(heap.record(rid).unwrap(), Bytes::from_static(b"persisted"));
    }
}
