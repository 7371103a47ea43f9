//! Fragment heap for cached values.
//!
//! The heap hands out ranges of one contiguous address space in multiples of
//! a fixed fragment size. Free ranges sit on a stack: an allocation pops the
//! most recently freed fragment, keeps the prefix it needs and pushes the
//! remainder back; a free pushes the range back as is.
//!
//! Adjacent free fragments are never merged. Every request is rounded to the
//! same unit, so reuse without coalescing changes the shape of the free stack
//! but never its total capacity, and both paths stay O(1).
//!
//! The heap only does bookkeeping. The memory behind the addresses belongs to
//! the caller (see [`Region`](crate::region::Region)).

use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::error::{CacheError, Result};
use crate::Config;

/// A contiguous byte range `[addr, addr + size)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fragment {
    pub addr: usize,
    pub size: usize,
}

impl Fragment {
    #[inline]
    pub fn end(&self) -> usize {
        self.addr + self.size
    }

    #[inline]
    pub fn range(&self) -> Range<usize> {
        self.addr..self.end()
    }
}

/// Thread-safe fragment allocator over a fixed address range.
pub struct Heap {
    fragment_size: usize,
    fragments: Mutex<Vec<Fragment>>,
    /// Bytes currently handed out. Written under the lock, read without it.
    size_used: AtomicU64,
}

impl Heap {
    /// Create a heap managing `[addr, addr + size)`.
    ///
    /// `size` is rounded down to a multiple of `fragment_size`; a tail
    /// shorter than one fragment is never handed out.
    pub fn new(addr: usize, size: usize, fragment_size: usize) -> Result<Self> {
        if fragment_size == 0 {
            return Err(CacheError::InvalidConfig(
                "fragment size must be non-zero".into(),
            ));
        }
        if addr.checked_add(size).is_none() {
            return Err(CacheError::InvalidConfig(format!(
                "heap range {addr:#x}+{size} overflows the address space"
            )));
        }
        let tail = size % fragment_size;
        let size = size - tail;
        debug!(addr, size, fragment_size, tail, "creating heap");

        let mut fragments = Vec::new();
        if size > 0 {
            fragments.push(Fragment { addr, size });
        }

        Ok(Self {
            fragment_size,
            fragments: Mutex::new(fragments),
            size_used: AtomicU64::new(0),
        })
    }

    /// Create a heap over `[addr, addr + config.pool_size)`.
    pub fn with_config(addr: usize, config: &Config) -> Result<Self> {
        config.validate()?;
        Self::new(addr, config.pool_size, config.fragment_size)
    }

    pub fn fragment_size(&self) -> usize {
        self.fragment_size
    }

    /// Allocate at least `size` bytes, rounded up to the fragment size.
    ///
    /// Only the top of the free stack is tried. Returns `None` when it is
    /// missing or too small; the caller decides whether to evict and retry.
    /// A zero-byte request takes one fragment unit.
    pub fn alloc(&self, size: usize) -> Option<Fragment> {
        let Some(size) = size.max(1).checked_next_multiple_of(self.fragment_size) else {
            debug!(size, "allocation size overflows");
            return None;
        };

        let mut fragments = self.fragments.lock();

        let Some(mut fragment) = fragments.pop() else {
            debug!(size, "heap exhausted");
            return None;
        };

        if fragment.size < size {
            debug!(size, available = fragment.size, "no fragment large enough");
            fragments.push(fragment);
            return None;
        }

        if fragment.size > size {
            fragments.push(Fragment {
                addr: fragment.addr + size,
                size: fragment.size - size,
            });
            fragment.size = size;
        }

        self.size_used
            .fetch_add(fragment.size as u64, Ordering::Relaxed);
        drop(fragments);

        trace!(addr = fragment.addr, size = fragment.size, "alloc");
        Some(fragment)
    }

    /// Give `fragment` back. It is pushed verbatim, without merging.
    pub fn free(&self, fragment: Fragment) {
        trace!(addr = fragment.addr, size = fragment.size, "free");
        debug_assert_eq!(fragment.size % self.fragment_size, 0);

        let mut fragments = self.fragments.lock();
        self.size_used
            .fetch_sub(fragment.size as u64, Ordering::Relaxed);
        fragments.push(fragment);
    }

    /// Bytes currently allocated. Does not take the lock.
    pub fn used_size(&self) -> u64 {
        self.size_used.load(Ordering::Relaxed)
    }

    /// Total bytes on the free stack.
    pub fn free_size(&self) -> usize {
        self.fragments.lock().iter().map(|f| f.size).sum()
    }

    /// Number of fragments on the free stack.
    pub fn fragment_count(&self) -> usize {
        self.fragments.lock().len()
    }
}

impl std::fmt::Debug for Heap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Heap")
            .field("fragment_size", &self.fragment_size)
            .field("used_size", &self.used_size())
            .finish_non_exhaustive()
    }
}
