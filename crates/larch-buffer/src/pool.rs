//! Buffer pool manager.

use crate::frame::{BufferFrame, FrameId};
use crate::replacer::ClockReplacer;
use larch_common::page::{PageId, PAGE_SIZE};
use larch_common::{LarchError, Result};
use parking_lot::Mutex;
use std::collections::HashMap;

/// A dirty page that was evicted from the pool.
/// The caller must write it back to disk to prevent data loss.
#[derive(Debug)]
pub struct EvictedPage {
    pub page_id: PageId,
    pub data: Box<[u8; PAGE_SIZE]>,
}

/// Configuration for the buffer pool.
#[derive(Debug, Clone)]
pub struct BufferPoolConfig {
    /// Number of frames in the pool.
    pub num_frames: usize,
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self { num_frames: 256 }
    }
}

/// Buffer pool manager.
///
/// Manages a fixed-size pool of page frames with:
/// - Page ID to frame ID mapping
/// - Free frame list for new pages
/// - Clock replacement for eviction
/// - Pin counting so resident pages cannot be evicted while in use
pub struct BufferPool {
    /// Configuration.
    config: BufferPoolConfig,
    /// Array of buffer frames.
    frames: Vec<BufferFrame>,
    /// Page ID to frame ID mapping.
    page_table: Mutex<HashMap<PageId, FrameId>>,
    /// List of free frame IDs.
    free_list: Mutex<Vec<FrameId>>,
    /// Page replacement policy.
    replacer: ClockReplacer,
}

impl BufferPool {
    /// Creates a new buffer pool.
    pub fn new(config: BufferPoolConfig) -> Self {
        let num_frames = config.num_frames;

        let frames: Vec<_> = (0..num_frames)
            .map(|i| BufferFrame::new(FrameId(i as u32)))
            .collect();
        let free_list: Vec<_> = (0..num_frames).map(|i| FrameId(i as u32)).collect();

        Self {
            config,
            frames,
            page_table: Mutex::new(HashMap::with_capacity(num_frames)),
            free_list: Mutex::new(free_list),
            replacer: ClockReplacer::new(num_frames),
        }
    }

    /// Returns the number of frames in the pool.
    pub fn num_frames(&self) -> usize {
        self.config.num_frames
    }

    /// Returns the number of free frames.
    pub fn free_count(&self) -> usize {
        self.free_list.lock().len()
    }

    /// Returns the number of pages currently resident.
    pub fn page_count(&self) -> usize {
        self.page_table.lock().len()
    }

    /// Checks if a page is resident in the pool.
    pub fn contains(&self, page_id: PageId) -> bool {
        self.page_table.lock().contains_key(&page_id)
    }

    /// Fetches a resident page, pinning it.
    ///
    /// Returns None if the page is not in the pool; the caller is then
    /// responsible for loading it from disk via `load_page`.
    pub fn fetch_page(&self, page_id: PageId) -> Option<&BufferFrame> {
        let frame_id = *self.page_table.lock().get(&page_id)?;
        let frame = &self.frames[frame_id.0 as usize];
        frame.pin();
        self.replacer.record_access(frame_id);
        Some(frame)
    }

    /// Allocates a frame for a new page: free list first, then eviction.
    ///
    /// Returns the frame ID and any evicted dirty page that must be
    /// written back.
    fn allocate_frame(&self) -> Result<(FrameId, Option<EvictedPage>)> {
        if let Some(frame_id) = self.free_list.lock().pop() {
            return Ok((frame_id, None));
        }

        let victim_id = self
            .replacer
            .evict(|frame_id| self.frames[frame_id.0 as usize].pin_count() == 0)
            .ok_or(LarchError::BufferPoolFull)?;

        let frame = &self.frames[victim_id.0 as usize];

        let evicted = match (frame.is_dirty(), frame.page_id()) {
            (true, Some(page_id)) => {
                let mut data = Box::new([0u8; PAGE_SIZE]);
                data.copy_from_slice(&**frame.read_data());
                Some(EvictedPage { page_id, data })
            }
            _ => None,
        };

        if let Some(old_page_id) = frame.page_id() {
            self.page_table.lock().remove(&old_page_id);
        }

        Ok((victim_id, evicted))
    }

    /// Installs a page into the pool, pinned.
    ///
    /// If the page is already resident, the existing frame is pinned and
    /// returned. Otherwise a frame is claimed (possibly evicting a dirty
    /// page, which is returned for write-back) and zeroed for the new page.
    pub fn new_page(&self, page_id: PageId) -> Result<(&BufferFrame, Option<EvictedPage>)> {
        if let Some(frame) = self.fetch_page(page_id) {
            return Ok((frame, None));
        }

        let (frame_id, evicted) = self.allocate_frame()?;

        let frame = &self.frames[frame_id.0 as usize];
        frame.reset();
        frame.set_page_id(Some(page_id));
        frame.pin();

        self.page_table.lock().insert(page_id, frame_id);
        self.replacer.insert(frame_id);
        self.replacer.record_access(frame_id);

        Ok((frame, evicted))
    }

    /// Installs a page into the pool with the given contents, pinned.
    pub fn load_page(
        &self,
        page_id: PageId,
        data: &[u8],
    ) -> Result<(&BufferFrame, Option<EvictedPage>)> {
        let (frame, evicted) = self.new_page(page_id)?;
        frame.copy_from(data);
        Ok((frame, evicted))
    }

    /// Runs `f` against the frame holding `page_id`, without pinning.
    ///
    /// The caller must already hold a pin on the page; otherwise the frame
    /// may be evicted out from under the access.
    pub fn with_frame<T>(&self, page_id: PageId, f: impl FnOnce(&BufferFrame) -> T) -> Option<T> {
        let frame_id = *self.page_table.lock().get(&page_id)?;
        Some(f(&self.frames[frame_id.0 as usize]))
    }

    /// Unpins a page, optionally marking it dirty.
    ///
    /// Returns false if the page is not resident.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let frame_id = match self.page_table.lock().get(&page_id) {
            Some(&frame_id) => frame_id,
            None => return false,
        };
        let frame = &self.frames[frame_id.0 as usize];

        if is_dirty {
            frame.set_dirty(true);
        }
        frame.unpin();
        true
    }

    /// Flushes dirty resident pages accepted by `filter`.
    ///
    /// The callback receives each dirty page's id and contents; on success
    /// the frame's dirty flag is cleared. Returns the number of pages
    /// flushed.
    pub fn flush_matching<P, F>(&self, filter: P, mut flush_fn: F) -> Result<usize>
    where
        P: Fn(PageId) -> bool,
        F: FnMut(PageId, &[u8]) -> Result<()>,
    {
        let targets: Vec<(PageId, FrameId)> = self
            .page_table
            .lock()
            .iter()
            .filter(|(page_id, _)| filter(**page_id))
            .map(|(&page_id, &frame_id)| (page_id, frame_id))
            .collect();

        let mut flushed = 0;
        for (page_id, frame_id) in targets {
            let frame = &self.frames[frame_id.0 as usize];
            if frame.is_dirty() {
                flush_fn(page_id, &**frame.read_data())?;
                frame.set_dirty(false);
                flushed += 1;
            }
        }
        Ok(flushed)
    }

    /// Returns statistics about the buffer pool.
    pub fn stats(&self) -> BufferPoolStats {
        let resident: Vec<FrameId> = self.page_table.lock().values().copied().collect();

        let mut pinned_frames = 0;
        let mut dirty_frames = 0;
        for frame_id in &resident {
            let frame = &self.frames[frame_id.0 as usize];
            if frame.is_pinned() {
                pinned_frames += 1;
            }
            if frame.is_dirty() {
                dirty_frames += 1;
            }
        }

        BufferPoolStats {
            total_frames: self.config.num_frames,
            free_frames: self.free_count(),
            used_frames: resident.len(),
            pinned_frames,
            dirty_frames,
        }
    }
}

/// Statistics about the buffer pool.
#[derive(Debug, Clone)]
pub struct BufferPoolStats {
    /// Total number of frames.
    pub total_frames: usize,
    /// Number of free frames.
    pub free_frames: usize,
    /// Number of frames holding pages.
    pub used_frames: usize,
    /// Number of pinned frames.
    pub pinned_frames: usize,
    /// Number of dirty frames.
    pub dirty_frames: usize,
}
