//! Disk-backed extendible hash index for HeronDB.
//!
//! This crate provides the hash-index layer of the storage engine:
//! - A fixed-width key/value codec for page slots
//! - Bucket pages with occupied/readable bitmaps
//! - A directory page mapping hash prefixes to buckets
//! - The extendible hash table tying both together over the buffer pool

mod bucket;
mod directory;
mod index;
mod storable;

pub use bucket::{bucket_capacity, BucketMut, BucketRef};
pub use directory::{DirectoryMut, DirectoryRef, DIRECTORY_CAPACITY, MAX_DEPTH};
pub use index::ExtendibleHashIndex;
pub use storable::Storable;
