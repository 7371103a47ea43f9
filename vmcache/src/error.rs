//! Error types for vmcache.

use thiserror::Error;

pub use critnib::IndexError;

/// Result type alias using [`CacheError`].
pub type Result<T> = std::result::Result<T, CacheError>;

/// Errors from the cache-side glue.
///
/// Heap exhaustion and lookup misses are not errors; they are reported as
/// `None`.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("index error: {0}")]
    Index(#[from] IndexError),

    #[error("entry not found in the index")]
    NotFound,

    #[error("fragment {addr:#x}+{size} lies outside the {region_size}-byte region")]
    OutOfRegion {
        addr: usize,
        size: usize,
        region_size: usize,
    },

    #[error("value of {len} bytes does not fit a {capacity}-byte fragment")]
    ValueTooLarge { len: usize, capacity: usize },

    #[error("cannot map value region: {0}")]
    Map(#[from] std::io::Error),
}
