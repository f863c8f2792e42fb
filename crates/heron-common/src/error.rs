//! Error types for HeronDB.

use thiserror::Error;

/// Result type alias using HeronError.
pub type Result<T> = std::result::Result<T, HeronError>;

/// Errors that can occur in HeronDB storage operations.
///
/// Benign conditions (a key that is absent, an unpin of a page that is not
/// resident, a delete of a pinned page) are reported through `bool` return
/// values rather than errors; this enum covers capacity exhaustion and
/// failures propagated from the disk layer.
#[derive(Debug, Error)]
pub enum HeronError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("buffer pool exhausted, every frame is pinned")]
    PoolExhausted,
}
