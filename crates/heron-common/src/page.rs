//! Page identifiers and the fixed page size.

use serde::{Deserialize, Serialize};

/// Size of a single page in bytes (4 KB).
///
/// This is the unit of disk I/O and of buffer-pool caching. On-disk page
/// layouts are sized against this constant at compile time.
pub const PAGE_SIZE: usize = 4096;

/// Unique identifier for a page within the storage file.
///
/// Page ids are allocated monotonically by the owning buffer-pool instance
/// and are never recycled. The all-ones value is reserved as the invalid
/// sentinel, so valid ids occupy the nonnegative 32-bit range below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PageId(pub u32);

impl PageId {
    /// Sentinel for "no page".
    pub const INVALID: PageId = PageId(u32::MAX);

    /// Returns true if this is a valid page ID.
    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }

    /// Byte offset of this page within the storage file.
    #[inline]
    pub fn file_offset(&self) -> u64 {
        self.0 as u64 * PAGE_SIZE as u64
    }
}

impl std::fmt::Display for PageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "page:{}", self.0)
    }
}
