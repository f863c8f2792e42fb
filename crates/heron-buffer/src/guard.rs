//! Scope-guarded page handles.

use crate::frame::BufferFrame;
use crate::pool::BufferPool;
use heron_common::page::{PageId, PAGE_SIZE};
use heron_common::Result;
use std::cell::Cell;

/// RAII handle over a pinned page.
///
/// Dropping the guard releases the pin, passing along whether
/// [`mark_dirty`](PageGuard::mark_dirty) was called while it was held.
/// This makes the pin/unpin pairing a scoping property instead of a
/// calling convention.
pub struct PageGuard<'a, P: BufferPool + ?Sized> {
    pool: &'a P,
    frame: &'a BufferFrame,
    page_id: PageId,
    dirty: Cell<bool>,
}

impl<'a, P: BufferPool + ?Sized> PageGuard<'a, P> {
    pub(crate) fn new(pool: &'a P, frame: &'a BufferFrame, page_id: PageId) -> Self {
        Self {
            pool,
            frame,
            page_id,
            dirty: Cell::new(false),
        }
    }

    /// Returns the guarded page's id.
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Returns the underlying frame.
    pub fn frame(&self) -> &'a BufferFrame {
        self.frame
    }

    /// Records that the page was modified; the eventual unpin will carry
    /// the dirty flag.
    pub fn mark_dirty(&self) {
        self.dirty.set(true);
    }

    /// Reads the page data.
    pub fn read(&self) -> parking_lot::RwLockReadGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.frame.read_data()
    }

    /// Writes to the page data. Call [`mark_dirty`](PageGuard::mark_dirty)
    /// when the modification should be persisted.
    pub fn write(&self) -> parking_lot::RwLockWriteGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.frame.write_data()
    }
}

impl<P: BufferPool + ?Sized> Drop for PageGuard<'_, P> {
    fn drop(&mut self) {
        self.pool.unpin_page(self.page_id, self.dirty.get());
    }
}

/// Guard-returning conveniences over any [`BufferPool`].
pub trait BufferPoolExt: BufferPool + Sized {
    /// Fetches a page and wraps the pin in a [`PageGuard`].
    fn fetch_guard(&self, page_id: PageId) -> Result<PageGuard<'_, Self>> {
        let frame = self.fetch_page(page_id)?;
        Ok(PageGuard::new(self, frame, page_id))
    }

    /// Allocates a page and wraps the pin in a [`PageGuard`].
    fn new_guard(&self) -> Result<PageGuard<'_, Self>> {
        let (page_id, frame) = self.new_page()?;
        Ok(PageGuard::new(self, frame, page_id))
    }
}

impl<P: BufferPool> BufferPoolExt for P {}
