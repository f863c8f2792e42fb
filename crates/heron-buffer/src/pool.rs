//! Buffer pool manager.

use crate::disk::DiskManager;
use crate::frame::{BufferFrame, FrameId};
use crate::replacer::{LruReplacer, Replacer};
use heron_common::page::{PageId, PAGE_SIZE};
use heron_common::{HeronError, Result};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use sysinfo::System;
use tracing::trace;

/// Capability set shared by the single-instance and sharded buffer pools.
///
/// Every successful `fetch_page` / `new_page` pins the returned frame and
/// must be balanced by exactly one `unpin_page`; the frame's contents are
/// guaranteed stable until then. Capacity exhaustion surfaces as
/// [`HeronError::PoolExhausted`], disk failures as [`HeronError::Io`];
/// caller mistakes (unpinning a non-resident page, deleting a pinned page)
/// are reported through the `bool` results.
pub trait BufferPool: Send + Sync {
    /// Allocates a fresh, zeroed page and pins it in a frame.
    fn new_page(&self) -> Result<(PageId, &BufferFrame)>;

    /// Pins the page in a frame, reading it from disk if not resident.
    fn fetch_page(&self, page_id: PageId) -> Result<&BufferFrame>;

    /// Releases one pin on the page.
    ///
    /// `is_dirty = true` marks the frame dirty; `false` never clears an
    /// earlier mark. Returns `false` if the page is not resident or its
    /// pin count is already zero.
    fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool;

    /// Drops the page from the pool and retires its id.
    ///
    /// Returns `Ok(true)` if the page is gone (including when it was not
    /// resident to begin with) and `Ok(false)` if it is pinned.
    fn delete_page(&self, page_id: PageId) -> Result<bool>;

    /// Writes the resident page image to disk, regardless of the dirty
    /// flag. Returns `Ok(false)` if the page is not resident.
    fn flush_page(&self, page_id: PageId) -> Result<bool>;

    /// Writes every resident page image to disk.
    fn flush_all_pages(&self) -> Result<()>;

    /// Total number of frames.
    fn pool_size(&self) -> usize;
}

/// Mutable pool bookkeeping, guarded by the instance mutex.
struct PoolState {
    /// Maps resident page ids to their frames.
    page_table: HashMap<PageId, FrameId>,
    /// Frames holding no page.
    free_list: VecDeque<FrameId>,
    /// Next page id this instance will hand out.
    next_page_id: u32,
}

/// A single buffer pool instance.
///
/// Owns a fixed array of frames and serializes all structural operations
/// (victim selection, page-table updates, disk I/O during eviction) under
/// one mutex. Several instances can share one disk manager when composed
/// into a sharded pool: each instance then allocates only page ids
/// congruent to its index modulo the instance count, so the id itself
/// names the owning instance.
pub struct BufferPoolInstance {
    /// Number of frames.
    pool_size: usize,
    /// Total instances in the sharding group (1 when standalone).
    num_instances: u32,
    /// This instance's position in the sharding group.
    instance_index: u32,
    /// Frame array, fixed at construction.
    frames: Vec<BufferFrame>,
    /// Bookkeeping guarded by the pool mutex.
    state: Mutex<PoolState>,
    /// Eviction policy over unpinned resident frames.
    replacer: LruReplacer,
    /// Backing storage.
    disk: Arc<dyn DiskManager>,
}

impl BufferPoolInstance {
    /// Creates a standalone pool with `pool_size` frames.
    pub fn new(pool_size: usize, disk: Arc<dyn DiskManager>) -> Self {
        Self::with_sharding(pool_size, 1, 0, disk)
    }

    /// Creates a pool that is member `instance_index` of a group of
    /// `num_instances` pools sharing one page-id space.
    pub fn with_sharding(
        pool_size: usize,
        num_instances: u32,
        instance_index: u32,
        disk: Arc<dyn DiskManager>,
    ) -> Self {
        assert!(num_instances > 0, "sharding group cannot be empty");
        assert!(
            instance_index < num_instances,
            "instance index {} out of range for {} instances",
            instance_index,
            num_instances
        );

        let frames: Vec<_> = (0..pool_size)
            .map(|i| BufferFrame::new(FrameId(i as u32)))
            .collect();
        let free_list: VecDeque<_> = (0..pool_size).map(|i| FrameId(i as u32)).collect();

        Self {
            pool_size,
            num_instances,
            instance_index,
            frames,
            state: Mutex::new(PoolState {
                page_table: HashMap::with_capacity(pool_size),
                free_list,
                next_page_id: instance_index,
            }),
            replacer: LruReplacer::new(pool_size),
            disk,
        }
    }

    /// Creates a standalone pool sized to 25% of available system RAM,
    /// with a floor of 1,000 frames so caching stays useful on small
    /// machines.
    pub fn auto_sized(disk: Arc<dyn DiskManager>) -> Self {
        let mut sys = System::new_all();
        sys.refresh_memory();

        let available_bytes = sys.available_memory() as usize;
        let pool_size = (available_bytes / 4 / PAGE_SIZE).max(1_000);

        Self::new(pool_size, disk)
    }

    /// Returns the number of free frames.
    pub fn free_count(&self) -> usize {
        self.state.lock().free_list.len()
    }

    /// Returns the number of resident pages.
    pub fn page_count(&self) -> usize {
        self.state.lock().page_table.len()
    }

    /// Checks whether a page is resident.
    pub fn contains(&self, page_id: PageId) -> bool {
        self.state.lock().page_table.contains_key(&page_id)
    }

    /// Hands out the next page id owned by this instance.
    fn allocate_page(&self, state: &mut PoolState) -> PageId {
        let page_id = PageId(state.next_page_id);
        state.next_page_id += self.num_instances;
        assert_eq!(
            page_id.0 % self.num_instances,
            self.instance_index,
            "allocated {page_id} outside this instance's residue class"
        );
        page_id
    }

    /// Hook invoked when a page id is retired. The monotonic allocator
    /// never reuses ids, so there is nothing to reclaim.
    fn deallocate_page(&self, _page_id: PageId) {}

    /// Claims a frame for a new occupant: free list first, then the
    /// replacer. A dirty victim is written back before its mapping is
    /// dropped.
    fn take_victim(&self, state: &mut PoolState) -> Result<FrameId> {
        if let Some(frame_id) = state.free_list.pop_front() {
            return Ok(frame_id);
        }

        let Some(frame_id) = self.replacer.victim() else {
            return Err(HeronError::PoolExhausted);
        };
        let frame = &self.frames[frame_id.index()];

        if let Some(old_page_id) = frame.page_id() {
            if frame.is_dirty() {
                trace!(page = %old_page_id, frame = %frame_id, "writing back dirty victim");
                let data = frame.read_data();
                if let Err(e) = self.disk.write_page(old_page_id, &data) {
                    drop(data);
                    // Leave the page resident and evictable again.
                    self.replacer.unpin(frame_id);
                    return Err(e);
                }
                frame.set_dirty(false);
            }
            state.page_table.remove(&old_page_id);
        }

        Ok(frame_id)
    }
}

impl BufferPool for BufferPoolInstance {
    fn new_page(&self) -> Result<(PageId, &BufferFrame)> {
        let mut state = self.state.lock();

        let frame_id = self.take_victim(&mut state)?;
        let page_id = self.allocate_page(&mut state);

        let frame = &self.frames[frame_id.index()];
        frame.write_data().fill(0);
        frame.set_page_id(Some(page_id));
        frame.set_dirty(false);
        frame.pin();

        state.page_table.insert(page_id, frame_id);
        Ok((page_id, frame))
    }

    fn fetch_page(&self, page_id: PageId) -> Result<&BufferFrame> {
        let mut state = self.state.lock();

        if let Some(&frame_id) = state.page_table.get(&page_id) {
            let frame = &self.frames[frame_id.index()];
            frame.pin();
            self.replacer.pin(frame_id);
            return Ok(frame);
        }

        let frame_id = self.take_victim(&mut state)?;
        let frame = &self.frames[frame_id.index()];
        frame.set_page_id(Some(page_id));
        frame.set_dirty(false);
        {
            let mut data = frame.write_data();
            if let Err(e) = self.disk.read_page(page_id, &mut data) {
                drop(data);
                frame.reset();
                state.free_list.push_back(frame_id);
                return Err(e);
            }
        }
        frame.pin();

        state.page_table.insert(page_id, frame_id);
        Ok(frame)
    }

    fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let state = self.state.lock();

        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return false;
        };
        let frame = &self.frames[frame_id.index()];
        if frame.pin_count() == 0 {
            return false;
        }

        // Sticky: a clean unpin never clears an earlier dirty mark.
        if is_dirty {
            frame.set_dirty(true);
        }

        if frame.unpin() == 0 {
            self.replacer.unpin(frame_id);
        }
        true
    }

    fn delete_page(&self, page_id: PageId) -> Result<bool> {
        let mut state = self.state.lock();

        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return Ok(true);
        };
        let frame = &self.frames[frame_id.index()];
        if frame.is_pinned() {
            return Ok(false);
        }

        if frame.is_dirty() {
            let data = frame.read_data();
            self.disk.write_page(page_id, &data)?;
        }

        state.page_table.remove(&page_id);
        self.replacer.pin(frame_id);
        frame.reset();
        state.free_list.push_back(frame_id);
        self.deallocate_page(page_id);
        Ok(true)
    }

    fn flush_page(&self, page_id: PageId) -> Result<bool> {
        let state = self.state.lock();

        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return Ok(false);
        };
        let frame = &self.frames[frame_id.index()];
        let data = frame.read_data();
        self.disk.write_page(page_id, &data)?;
        Ok(true)
    }

    fn flush_all_pages(&self) -> Result<()> {
        let state = self.state.lock();

        for (&page_id, &frame_id) in state.page_table.iter() {
            let frame = &self.frames[frame_id.index()];
            let data = frame.read_data();
            self.disk.write_page(page_id, &data)?;
        }
        Ok(())
    }

    fn pool_size(&self) -> usize {
        self.pool_size
    }
}
