//! Configuration for the HeronDB storage engine.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Storage configuration for the buffer pool and disk layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path of the single backing data file.
    pub data_path: PathBuf,
    /// Enable fsync after page writes.
    pub fsync_enabled: bool,
    /// Number of frames per buffer-pool instance.
    pub frames_per_instance: usize,
    /// Number of buffer-pool instances pages are sharded across.
    pub pool_instances: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("./data/heron.db"),
            fsync_enabled: true,
            frames_per_instance: 1024,
            pool_instances: 1,
        }
    }
}

impl StorageConfig {
    /// Total number of frames across all pool instances.
    pub fn total_frames(&self) -> usize {
        self.frames_per_instance * self.pool_instances
    }

    /// Total buffer pool size in bytes.
    pub fn buffer_pool_size_bytes(&self) -> usize {
        self.total_frames() * crate::page::PAGE_SIZE
    }
}
