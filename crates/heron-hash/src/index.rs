//! Extendible hash index backed by the buffer pool.
//!
//! The index owns a directory page and a set of bucket pages, all obtained
//! through a [`BufferPool`]. Lookups hash the key and follow the low
//! `global_depth` bits into the directory; inserts split overflowing
//! buckets (doubling the directory when the bucket already uses every
//! addressed bit) and removes merge emptied buckets with their split
//! images, halving the directory when no bucket needs its top bit.
//!
//! A single reader-writer latch serializes structural changes: lookups
//! share it, inserts and removes take it exclusively because they may
//! reshape the directory.

use crate::bucket::{BucketMut, BucketRef};
use crate::directory::{DirectoryMut, DirectoryRef, MAX_DEPTH};
use crate::storable::Storable;
use heron_buffer::{BufferPool, BufferPoolExt, PageGuard};
use heron_common::page::PageId;
use heron_common::{Result, Transaction};
use parking_lot::RwLock;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

/// Disk-backed extendible hash table mapping keys to sets of values.
///
/// Non-unique keys are supported; the exact `(key, value)` pair is the
/// unit of insertion and removal, and duplicate pairs are rejected.
pub struct ExtendibleHashIndex<K, V, P> {
    pool: Arc<P>,
    directory_page_id: PageId,
    latch: RwLock<()>,
    _marker: PhantomData<fn(K, V)>,
}

impl<K, V, P> ExtendibleHashIndex<K, V, P>
where
    K: Storable + Hash,
    V: Storable,
    P: BufferPool,
{
    /// Creates an empty index: a depth-0 directory pointing at one empty
    /// bucket.
    pub fn new(pool: Arc<P>) -> Result<Self> {
        let directory_page_id = {
            let dir_guard = pool.new_guard()?;
            let bucket_guard = pool.new_guard()?;
            {
                let mut data = dir_guard.write();
                let mut dir = DirectoryMut::new(&mut data);
                dir.set_local_depth(0, 0);
                dir.set_bucket_page_id(0, bucket_guard.page_id());
            }
            dir_guard.mark_dirty();
            bucket_guard.mark_dirty();
            dir_guard.page_id()
        };

        Ok(Self {
            pool,
            directory_page_id,
            latch: RwLock::new(()),
            _marker: PhantomData,
        })
    }

    /// Returns the page id of the directory page.
    pub fn directory_page_id(&self) -> PageId {
        self.directory_page_id
    }

    /// Hashes a key down to the 32 bits extendible addressing uses.
    fn hash_of(key: &K) -> u32 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        hasher.finish() as u32
    }

    /// Collects every value stored under `key`.
    pub fn get_value(&self, _txn: Option<&Transaction>, key: &K) -> Result<Vec<V>> {
        let _latch = self.latch.read();

        let dir_guard = self.pool.fetch_guard(self.directory_page_id)?;
        let bucket_page_id = {
            let data = dir_guard.read();
            let dir = DirectoryRef::new(&data);
            let slot = (Self::hash_of(key) & dir.global_depth_mask()) as usize;
            dir.bucket_page_id(slot)
        };

        let bucket_guard = self.pool.fetch_guard(bucket_page_id)?;
        let mut result = Vec::new();
        {
            let data = bucket_guard.read();
            BucketRef::<K, V>::new(&data).get(key, &mut result);
        }
        Ok(result)
    }

    /// Inserts a key/value pair.
    ///
    /// Returns `Ok(false)` if the identical pair is already present, or if
    /// the target bucket is full and the directory is already at its
    /// maximum depth so no further split can separate the colliding keys.
    pub fn insert(&self, _txn: Option<&Transaction>, key: K, value: V) -> Result<bool> {
        let _latch = self.latch.write();

        // A split may leave the target bucket full (every entry can rehash
        // to the same half), so splitting repeats until the insert lands.
        loop {
            let dir_guard = self.pool.fetch_guard(self.directory_page_id)?;
            let (slot, bucket_page_id, local_depth) = {
                let data = dir_guard.read();
                let dir = DirectoryRef::new(&data);
                let slot = (Self::hash_of(&key) & dir.global_depth_mask()) as usize;
                (slot, dir.bucket_page_id(slot), dir.local_depth(slot))
            };

            let bucket_guard = self.pool.fetch_guard(bucket_page_id)?;
            let attempted = {
                let mut data = bucket_guard.write();
                let mut bucket = BucketMut::<K, V>::new(&mut data);
                if bucket.as_ref().is_full() {
                    None
                } else {
                    Some(bucket.insert(&key, &value))
                }
            };

            match attempted {
                Some(inserted) => {
                    if inserted {
                        bucket_guard.mark_dirty();
                    }
                    return Ok(inserted);
                }
                None => {
                    if local_depth == MAX_DEPTH {
                        return Ok(false);
                    }
                    drop(bucket_guard);
                    self.split_bucket(&dir_guard, slot)?;
                }
            }
        }
    }

    /// Splits the full bucket addressed by `slot`, growing the directory
    /// first when the bucket already distinguishes every addressed bit.
    fn split_bucket(&self, dir_guard: &PageGuard<'_, P>, slot: usize) -> Result<()> {
        // Allocate the split image before touching the directory, so a
        // pool failure leaves the table untouched.
        let new_bucket_guard = self.pool.new_guard()?;
        let new_page_id = new_bucket_guard.page_id();

        let (old_page_id, new_depth, low_mask, slot_low, image_low) = {
            let mut data = dir_guard.write();
            let mut dir = DirectoryMut::new(&mut data);

            if dir.as_ref().local_depth(slot) == dir.as_ref().global_depth() {
                debug!(
                    global_depth = dir.as_ref().global_depth() + 1,
                    "growing directory"
                );
                dir.incr_global_depth();
            }

            let new_depth = dir.as_ref().local_depth(slot) + 1;
            let low_mask = (1u32 << new_depth) - 1;
            let slot_low = slot as u32 & low_mask;
            let image_low = slot_low ^ (1 << (new_depth - 1));
            let old_page_id = dir.as_ref().bucket_page_id(slot);

            // Rewire the old cohort: slots agreeing with `slot` on the new
            // bit keep the old bucket, the rest move to the image.
            let size = dir.as_ref().size();
            for i in 0..size {
                let low = i as u32 & low_mask;
                if low == slot_low {
                    dir.set_local_depth(i, new_depth);
                    dir.set_bucket_page_id(i, old_page_id);
                } else if low == image_low {
                    dir.set_local_depth(i, new_depth);
                    dir.set_bucket_page_id(i, new_page_id);
                }
            }

            (old_page_id, new_depth, low_mask, slot_low, image_low)
        };
        dir_guard.mark_dirty();

        // Deal the old bucket's entries across the pair by their newly
        // distinguished hash bit.
        let old_bucket_guard = self.pool.fetch_guard(old_page_id)?;
        {
            let mut old_data = old_bucket_guard.write();
            let mut new_data = new_bucket_guard.write();
            let mut old_bucket = BucketMut::<K, V>::new(&mut old_data);
            let mut new_bucket = BucketMut::<K, V>::new(&mut new_data);

            let entries = old_bucket.as_ref().live_entries();
            old_bucket.reset();
            for (k, v) in entries {
                let target = Self::hash_of(&k) & low_mask;
                debug_assert!(target == slot_low || target == image_low);
                let dst = if target == slot_low {
                    &mut old_bucket
                } else {
                    &mut new_bucket
                };
                let reinserted = dst.insert(&k, &v);
                debug_assert!(reinserted, "rehashed entry must fit");
            }
        }
        old_bucket_guard.mark_dirty();
        new_bucket_guard.mark_dirty();

        debug!(
            bucket = %old_page_id,
            image = %new_page_id,
            depth = new_depth,
            "split bucket"
        );
        Ok(())
    }

    /// Removes a key/value pair. Returns `Ok(false)` if the pair is not
    /// present.
    pub fn remove(&self, _txn: Option<&Transaction>, key: &K, value: &V) -> Result<bool> {
        let _latch = self.latch.write();

        let dir_guard = self.pool.fetch_guard(self.directory_page_id)?;
        let (slot, bucket_page_id) = {
            let data = dir_guard.read();
            let dir = DirectoryRef::new(&data);
            let slot = (Self::hash_of(key) & dir.global_depth_mask()) as usize;
            (slot, dir.bucket_page_id(slot))
        };

        let bucket_guard = self.pool.fetch_guard(bucket_page_id)?;
        let (removed, now_empty) = {
            let mut data = bucket_guard.write();
            let mut bucket = BucketMut::<K, V>::new(&mut data);
            let removed = bucket.remove(key, value);
            (removed, bucket.as_ref().is_empty())
        };
        if removed {
            bucket_guard.mark_dirty();
        }
        drop(bucket_guard);
        drop(dir_guard);

        if removed && now_empty {
            self.try_merge(slot)?;
        }
        Ok(removed)
    }

    /// Merges the emptied bucket at `slot` into its split image, then
    /// shrinks the directory as far as it will go. Chains of empty pairs
    /// collapse through the trailing recursion.
    fn try_merge(&self, slot: usize) -> Result<()> {
        let dir_guard = self.pool.fetch_guard(self.directory_page_id)?;

        let plan = {
            let data = dir_guard.read();
            let dir = DirectoryRef::new(&data);
            // A previous merge in the chain may have shrunk the directory
            // past this slot.
            let slot = slot & dir.global_depth_mask() as usize;
            let depth = dir.local_depth(slot);
            if depth == 0 {
                None
            } else {
                let image = dir.split_image_index(slot);
                if dir.local_depth(image) != depth {
                    None
                } else {
                    Some((
                        slot,
                        image,
                        dir.bucket_page_id(slot),
                        dir.bucket_page_id(image),
                        depth,
                    ))
                }
            }
        };
        let Some((slot, image, bucket_page_id, image_page_id, depth)) = plan else {
            return Ok(());
        };
        if bucket_page_id == image_page_id {
            return Ok(());
        }

        // Re-check emptiness: the triggering remove released its pins
        // before calling here.
        let still_empty = {
            let bucket_guard = self.pool.fetch_guard(bucket_page_id)?;
            let data = bucket_guard.read();
            BucketRef::<K, V>::new(&data).is_empty()
        };
        if !still_empty {
            return Ok(());
        }

        {
            let mut data = dir_guard.write();
            let mut dir = DirectoryMut::new(&mut data);
            let size = dir.as_ref().size();
            for i in 0..size {
                let page_id = dir.as_ref().bucket_page_id(i);
                if page_id == bucket_page_id || page_id == image_page_id {
                    dir.set_bucket_page_id(i, image_page_id);
                    dir.set_local_depth(i, depth - 1);
                }
            }
            while dir.as_ref().can_shrink() {
                debug!(
                    global_depth = dir.as_ref().global_depth() - 1,
                    "shrinking directory"
                );
                dir.decr_global_depth();
            }
        }
        dir_guard.mark_dirty();

        let deleted = self.pool.delete_page(bucket_page_id)?;
        assert!(deleted, "merged bucket {bucket_page_id} was still pinned");
        debug!(bucket = %bucket_page_id, into = %image_page_id, "merged empty bucket");

        let image_empty = {
            let image_guard = self.pool.fetch_guard(image_page_id)?;
            let data = image_guard.read();
            BucketRef::<K, V>::new(&data).is_empty()
        };
        drop(dir_guard);

        if image_empty {
            self.try_merge(slot.min(image))?;
        }
        Ok(())
    }

    /// Returns the directory's global depth.
    pub fn global_depth(&self) -> Result<u32> {
        let _latch = self.latch.read();

        let dir_guard = self.pool.fetch_guard(self.directory_page_id)?;
        let data = dir_guard.read();
        Ok(DirectoryRef::new(&data).global_depth())
    }

    /// Asserts the directory's structural invariants.
    pub fn verify_integrity(&self) -> Result<()> {
        let _latch = self.latch.read();

        let dir_guard = self.pool.fetch_guard(self.directory_page_id)?;
        let data = dir_guard.read();
        DirectoryRef::new(&data).verify_integrity();
        Ok(())
    }
}
