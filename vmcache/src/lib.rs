//! # vmcache
//!
//! Storage plumbing for a volatile in-memory key/value cache: where value
//! bytes go, and how entries are found again.
//!
//! - [`Heap`]: a thread-safe allocator handing out fragment-size-aligned
//!   ranges of one address space, with a lock-free "bytes in use" counter.
//! - [`CacheIndex`]: a [`critnib`] tree behind a lock, mapping raw keys to
//!   shared [`CacheEntry`] records. Keys are length-prefixed before they
//!   reach the tree (see [`encoding`]), which keeps them prefix-free.
//! - [`Region`]: anonymous memory the heap's fragments point into.
//!
//! Eviction policy and the public cache API are built on top of these and
//! are not part of this crate.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use vmcache::{CacheEntry, CacheIndex, Config, Region};
//!
//! let config = Config { pool_size: 1 << 20, fragment_size: 64 };
//! let mut region = Region::with_config(&config).unwrap();
//! let heap = region.heap(config.fragment_size).unwrap();
//! let index = CacheIndex::new();
//!
//! // Store.
//! let fragment = heap.alloc(5).unwrap();
//! region.write(fragment, b"value").unwrap();
//! index.insert(Arc::new(CacheEntry::new(b"key", fragment, 5))).unwrap();
//!
//! // Look up.
//! let entry = index.get(b"key").unwrap();
//! assert_eq!(region.read(entry.fragment(), entry.value_len()).unwrap(), b"value");
//!
//! // Evict: unpublish first, then give the bytes back.
//! index.remove(&entry).unwrap();
//! heap.free(entry.fragment());
//! assert_eq!(heap.used_size(), 0);
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod encoding;
pub mod error;
pub mod heap;
pub mod index;
pub mod region;

pub use error::{CacheError, IndexError, Result};
pub use heap::{Fragment, Heap};
pub use index::{CacheEntry, CacheIndex};
pub use region::Region;

/// Default size of the value pool (64 MiB).
pub const DEFAULT_POOL_SIZE: usize = 64 << 20;

/// Default allocation unit.
pub const DEFAULT_FRAGMENT_SIZE: usize = 256;

/// Sizing of the value pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Total bytes available for values
    pub pool_size: usize,
    /// Allocation unit; every request is rounded up to a multiple of it
    pub fragment_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            fragment_size: DEFAULT_FRAGMENT_SIZE,
        }
    }
}

impl Config {
    /// Check that the pool can hold at least one fragment.
    pub fn validate(&self) -> Result<()> {
        if self.fragment_size == 0 {
            return Err(CacheError::InvalidConfig(
                "fragment size must be non-zero".into(),
            ));
        }
        if self.pool_size < self.fragment_size {
            return Err(CacheError::InvalidConfig(format!(
                "pool size {} is smaller than fragment size {}",
                self.pool_size, self.fragment_size
            )));
        }
        Ok(())
    }
}
