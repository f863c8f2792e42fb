//! Fixed-width codec for keys and values stored in hash pages.

use heron_common::page::PageId;
use heron_common::types::Rid;

/// A type that occupies a fixed number of bytes in a page slot.
///
/// Bucket pages lay entries out as a flat array, so every key and value
/// type must encode to exactly [`ENCODED_SIZE`](Storable::ENCODED_SIZE)
/// bytes. Encoding is little-endian.
pub trait Storable: Copy + PartialEq + std::fmt::Debug {
    /// Number of bytes this type occupies in a slot.
    const ENCODED_SIZE: usize;

    /// Writes the value into `buf[..ENCODED_SIZE]`.
    fn write_to(&self, buf: &mut [u8]);

    /// Reads a value from `buf[..ENCODED_SIZE]`.
    fn read_from(buf: &[u8]) -> Self;
}

macro_rules! storable_int {
    ($($t:ty),*) => {
        $(
            impl Storable for $t {
                const ENCODED_SIZE: usize = std::mem::size_of::<$t>();

                fn write_to(&self, buf: &mut [u8]) {
                    buf[..Self::ENCODED_SIZE].copy_from_slice(&self.to_le_bytes());
                }

                fn read_from(buf: &[u8]) -> Self {
                    let mut bytes = [0u8; Self::ENCODED_SIZE];
                    bytes.copy_from_slice(&buf[..Self::ENCODED_SIZE]);
                    Self::from_le_bytes(bytes)
                }
            }
        )*
    };
}

storable_int!(i32, u32, i64, u64);

impl Storable for Rid {
    const ENCODED_SIZE: usize = 8;

    fn write_to(&self, buf: &mut [u8]) {
        buf[..4].copy_from_slice(&self.page_id.0.to_le_bytes());
        buf[4..8].copy_from_slice(&self.slot.to_le_bytes());
    }

    fn read_from(buf: &[u8]) -> Self {
        let page = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let slot = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
        Self::new(PageId(page), slot)
    }
}
