//! Frames: the in-memory slots pages are cached in.

use heron_common::page::{PageId, PAGE_SIZE};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Index of a frame within its pool's frame array.
///
/// Always smaller than the pool capacity; the all-ones value is the
/// invalid sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId(pub u32);

impl FrameId {
    /// Sentinel for "no frame".
    pub const INVALID: FrameId = FrameId(u32::MAX);

    /// Returns true unless this is the sentinel.
    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }

    /// This id as a frame-array index.
    #[inline]
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for FrameId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "frame:{}", self.0)
    }
}

/// One buffer-pool slot: a page image plus its pool bookkeeping.
///
/// The metadata (resident page id, pin count, dirty flag) lives in atomics
/// so pinned-frame holders can read it without the pool mutex; every
/// transition that moves a page into or out of a frame happens with the
/// pool mutex held. The page image sits behind its own reader-writer lock
/// so concurrent holders of a shared pin can read it in parallel.
pub struct BufferFrame {
    frame_id: FrameId,
    /// Resident page, `PageId::INVALID` while the frame is free.
    page_id: AtomicU32,
    /// Outstanding borrows of this frame. Evictable iff zero.
    pin_count: AtomicU32,
    /// Set when an unpin reports modifications; cleared by write-back.
    is_dirty: AtomicBool,
    /// The cached page image.
    data: RwLock<Box<[u8; PAGE_SIZE]>>,
}

impl BufferFrame {
    /// Creates a free frame with a zeroed page image.
    pub fn new(frame_id: FrameId) -> Self {
        Self {
            frame_id,
            page_id: AtomicU32::new(PageId::INVALID.0),
            pin_count: AtomicU32::new(0),
            is_dirty: AtomicBool::new(false),
            data: RwLock::new(Box::new([0u8; PAGE_SIZE])),
        }
    }

    #[inline]
    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    /// The page this frame holds, if any.
    #[inline]
    pub fn page_id(&self) -> Option<PageId> {
        let raw = PageId(self.page_id.load(Ordering::Acquire));
        raw.is_valid().then_some(raw)
    }

    #[inline]
    pub fn set_page_id(&self, page_id: Option<PageId>) {
        let raw = page_id.unwrap_or(PageId::INVALID);
        self.page_id.store(raw.0, Ordering::Release);
    }

    #[inline]
    pub fn pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::Acquire)
    }

    /// Takes one more borrow of the frame, returning the count before.
    #[inline]
    pub fn pin(&self) -> u32 {
        self.pin_count.fetch_add(1, Ordering::AcqRel)
    }

    /// Releases one borrow, returning the count after. Saturates at zero.
    #[inline]
    pub fn unpin(&self) -> u32 {
        let prev = self.pin_count.fetch_sub(1, Ordering::AcqRel);
        if prev == 0 {
            self.pin_count.store(0, Ordering::Release);
            return 0;
        }
        prev - 1
    }

    #[inline]
    pub fn is_pinned(&self) -> bool {
        self.pin_count() > 0
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.is_dirty.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set_dirty(&self, dirty: bool) {
        self.is_dirty.store(dirty, Ordering::Release);
    }

    /// True while no page is resident.
    #[inline]
    pub fn is_free(&self) -> bool {
        self.page_id().is_none()
    }

    /// Locks the page image for reading.
    #[inline]
    pub fn read_data(&self) -> parking_lot::RwLockReadGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.data.read()
    }

    /// Locks the page image for writing.
    #[inline]
    pub fn write_data(&self) -> parking_lot::RwLockWriteGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.data.write()
    }

    /// Overwrites the page image from `src`.
    #[inline]
    pub fn copy_from(&self, src: &[u8; PAGE_SIZE]) {
        self.data.write().copy_from_slice(src);
    }

    /// Copies the page image into `dst`.
    #[inline]
    pub fn copy_to(&self, dst: &mut [u8; PAGE_SIZE]) {
        dst.copy_from_slice(&**self.data.read());
    }

    /// Returns the frame to the free state: no page, no pins, clean,
    /// zeroed image.
    pub fn reset(&self) {
        self.page_id.store(PageId::INVALID.0, Ordering::Release);
        self.pin_count.store(0, Ordering::Release);
        self.is_dirty.store(false, Ordering::Release);
        self.data.write().fill(0);
    }
}

impl std::fmt::Debug for BufferFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferFrame")
            .field("frame_id", &self.frame_id)
            .field("page_id", &self.page_id())
            .field("pin_count", &self.pin_count())
            .field("is_dirty", &self.is_dirty())
            .finish()
    }
}
