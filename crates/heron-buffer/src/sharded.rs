//! Sharded buffer pool.

use crate::disk::DiskManager;
use crate::frame::BufferFrame;
use crate::pool::{BufferPool, BufferPoolInstance};
use heron_common::page::PageId;
use heron_common::{HeronError, Result, StorageConfig};
use parking_lot::Mutex;
use std::sync::Arc;

/// A buffer pool composed of independent instances.
///
/// Page ids are partitioned by residue: instance `i` allocates and serves
/// exactly the ids with `page_id % num_instances == i`, so routing is pure
/// arithmetic and needs no shared table. Operations on different residue
/// classes proceed under different instance mutexes; only `new_page`
/// serializes briefly on this struct's cursor so allocation spreads
/// round-robin across instances.
pub struct ShardedBufferPool {
    instances: Vec<BufferPoolInstance>,
    /// Instance at which the next `new_page` starts probing.
    start_index: Mutex<usize>,
}

impl ShardedBufferPool {
    /// Creates `num_instances` pools of `frames_per_instance` frames each,
    /// all backed by the same disk manager.
    pub fn new(
        num_instances: usize,
        frames_per_instance: usize,
        disk: Arc<dyn DiskManager>,
    ) -> Self {
        assert!(num_instances > 0, "sharded pool needs at least one instance");

        let instances = (0..num_instances)
            .map(|i| {
                BufferPoolInstance::with_sharding(
                    frames_per_instance,
                    num_instances as u32,
                    i as u32,
                    Arc::clone(&disk),
                )
            })
            .collect();

        Self {
            instances,
            start_index: Mutex::new(0),
        }
    }

    /// Builds the pool described by a storage configuration.
    pub fn from_config(config: &StorageConfig, disk: Arc<dyn DiskManager>) -> Self {
        Self::new(config.pool_instances, config.frames_per_instance, disk)
    }

    /// Number of member instances.
    pub fn num_instances(&self) -> usize {
        self.instances.len()
    }

    /// Resolves the instance owning a page id.
    fn instance_for(&self, page_id: PageId) -> &BufferPoolInstance {
        &self.instances[page_id.0 as usize % self.instances.len()]
    }

    /// Total number of resident pages across instances.
    pub fn page_count(&self) -> usize {
        self.instances.iter().map(|p| p.page_count()).sum()
    }

    /// Checks whether a page is resident in its owning instance.
    pub fn contains(&self, page_id: PageId) -> bool {
        self.instance_for(page_id).contains(page_id)
    }
}

impl BufferPool for ShardedBufferPool {
    fn new_page(&self) -> Result<(PageId, &BufferFrame)> {
        let mut start = self.start_index.lock();
        let n = self.instances.len();

        for offset in 0..n {
            let index = (*start + offset) % n;
            match self.instances[index].new_page() {
                Ok(result) => {
                    *start = (index + 1) % n;
                    return Ok(result);
                }
                Err(HeronError::PoolExhausted) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(HeronError::PoolExhausted)
    }

    fn fetch_page(&self, page_id: PageId) -> Result<&BufferFrame> {
        self.instance_for(page_id).fetch_page(page_id)
    }

    fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        self.instance_for(page_id).unpin_page(page_id, is_dirty)
    }

    fn delete_page(&self, page_id: PageId) -> Result<bool> {
        self.instance_for(page_id).delete_page(page_id)
    }

    fn flush_page(&self, page_id: PageId) -> Result<bool> {
        self.instance_for(page_id).flush_page(page_id)
    }

    fn flush_all_pages(&self) -> Result<()> {
        for instance in &self.instances {
            instance.flush_all_pages()?;
        }
        Ok(())
    }

    fn pool_size(&self) -> usize {
        self.instances.iter().map(|p| p.pool_size()).sum()
    }
}
