//! Buffer manager routing page access through the buffer pool.
//!
//! All reads and writes of paged files go through here. Pages are pinned
//! while in use and written back lazily: on eviction of a dirty victim, or
//! on an explicit file flush.

use crate::file::{FileId, FileManager};
use larch_buffer::{BufferPool, BufferPoolConfig, BufferPoolStats, EvictedPage};
use larch_common::page::{PageId, PageNo, PAGE_SIZE};
use larch_common::{LarchError, Result};
use std::sync::Arc;

/// Buffer manager fronting the file manager with a pinning page cache.
pub struct BufferManager {
    /// File manager for page-level disk I/O.
    files: Arc<FileManager>,
    /// The shared frame pool.
    pool: BufferPool,
}

impl BufferManager {
    /// Creates a buffer manager over the given file manager.
    pub fn new(files: Arc<FileManager>, config: BufferPoolConfig) -> Self {
        Self {
            files,
            pool: BufferPool::new(config),
        }
    }

    /// Returns the underlying file manager.
    pub fn file_manager(&self) -> &FileManager {
        &self.files
    }

    /// Writes an evicted dirty page back to its owning file.
    fn write_back(&self, evicted: EvictedPage) -> Result<()> {
        self.files.write_page(
            FileId(evicted.page_id.file_id),
            evicted.page_id.page_no,
            &evicted.data,
        )
    }

    /// Pins a page, loading it from disk if it is not resident.
    ///
    /// The returned guard keeps the page pinned until dropped; mutations go
    /// through [`PageGuard::overwrite`], which also marks the page dirty.
    pub fn pin_page(self: &Arc<Self>, file: FileId, page_no: PageNo) -> Result<PageGuard> {
        let page_id = PageId::new(file.0, page_no);

        if self.pool.fetch_page(page_id).is_some() {
            return Ok(PageGuard::new(self.clone(), page_id));
        }

        let data = self.files.read_page(file, page_no)?;
        let (_, evicted) = self.pool.load_page(page_id, &data)?;
        if let Some(evicted) = evicted {
            self.write_back(evicted)?;
        }
        Ok(PageGuard::new(self.clone(), page_id))
    }

    /// Allocates a new zeroed page in the file and pins it.
    pub fn alloc_page(self: &Arc<Self>, file: FileId) -> Result<(PageNo, PageGuard)> {
        let page_no = self.files.allocate_page(file)?;
        let page_id = PageId::new(file.0, page_no);

        let (_, evicted) = self.pool.new_page(page_id)?;
        if let Some(evicted) = evicted {
            self.write_back(evicted)?;
        }
        Ok((page_no, PageGuard::new(self.clone(), page_id)))
    }

    /// Writes back every dirty resident page of the file.
    ///
    /// Returns the number of pages flushed.
    pub fn flush_file(&self, file: FileId) -> Result<usize> {
        let flushed = self.pool.flush_matching(
            |page_id| page_id.file_id == file.0,
            |page_id, data| {
                let data: &[u8; PAGE_SIZE] = data
                    .try_into()
                    .map_err(|_| LarchError::Corrupted("short page buffer".to_string()))?;
                self.files.write_page(file, page_id.page_no, data)
            },
        )?;
        self.files.sync(file)?;
        Ok(flushed)
    }

    /// Returns buffer pool statistics.
    pub fn pool_stats(&self) -> BufferPoolStats {
        self.pool.stats()
    }

    fn read_pinned(&self, page_id: PageId) -> Box<[u8; PAGE_SIZE]> {
        self.pool
            .with_frame(page_id, |frame| {
                let mut data = Box::new([0u8; PAGE_SIZE]);
                data.copy_from_slice(&**frame.read_data());
                data
            })
            .unwrap_or_else(|| Box::new([0u8; PAGE_SIZE]))
    }

    fn write_pinned(&self, page_id: PageId, src: &[u8; PAGE_SIZE]) {
        self.pool.with_frame(page_id, |frame| {
            frame.copy_from(src);
        });
    }

    fn unpin(&self, page_id: PageId, dirty: bool) {
        self.pool.unpin_page(page_id, dirty);
    }
}

/// Scope-bound pin on a single page.
///
/// Unpins on drop, carrying the dirty bit accumulated through
/// [`PageGuard::overwrite`] / [`PageGuard::mark_dirty`]. Because the unpin
/// lives in `Drop`, early returns and error paths cannot leak a pin.
pub struct PageGuard {
    buf: Arc<BufferManager>,
    page_id: PageId,
    dirty: bool,
}

impl PageGuard {
    fn new(buf: Arc<BufferManager>, page_id: PageId) -> Self {
        Self {
            buf,
            page_id,
            dirty: false,
        }
    }

    /// Returns the page number of the pinned page.
    pub fn page_no(&self) -> PageNo {
        self.page_id.page_no
    }

    /// Copies the page contents out of the pool.
    pub fn data(&self) -> Box<[u8; PAGE_SIZE]> {
        self.buf.read_pinned(self.page_id)
    }

    /// Replaces the page contents and marks the page dirty.
    pub fn overwrite(&mut self, src: &[u8; PAGE_SIZE]) {
        self.buf.write_pinned(self.page_id, src);
        self.dirty = true;
    }

    /// Marks the page dirty without writing.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }
}

impl Drop for PageGuard {
    fn drop(&mut self) {
        self.buf.unpin(self.page_id, self.dirty);
    }
}
