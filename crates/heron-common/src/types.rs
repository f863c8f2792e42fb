//! Shared value types.

use crate::page::PageId;
use serde::{Deserialize, Serialize};

/// Record identifier: the physical address of a tuple.
///
/// Indexes store `Rid`s as their values; the heap layer resolves them to
/// tuple bytes. Encodes as eight bytes (page id, then slot number).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rid {
    /// Page holding the tuple.
    pub page_id: PageId,
    /// Slot number within the page.
    pub slot: u32,
}

impl Rid {
    /// Creates a new record identifier.
    pub fn new(page_id: PageId, slot: u32) -> Self {
        Self { page_id, slot }
    }
}

impl std::fmt::Display for Rid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.page_id, self.slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rid_new() {
        let rid = Rid::new(PageId(7), 3);
        assert_eq!(rid.page_id, PageId(7));
        assert_eq!(rid.slot, 3);
    }

    #[test]
    fn test_rid_display() {
        let rid = Rid::new(PageId(7), 3);
        assert_eq!(rid.to_string(), "page:7:3");
    }

    #[test]
    fn test_rid_equality() {
        assert_eq!(Rid::new(PageId(1), 2), Rid::new(PageId(1), 2));
        assert_ne!(Rid::new(PageId(1), 2), Rid::new(PageId(1), 3));
        assert_ne!(Rid::new(PageId(1), 2), Rid::new(PageId(2), 2));
    }
}
