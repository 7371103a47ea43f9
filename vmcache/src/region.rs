//! Backing memory for cached values.
//!
//! A [`Region`] owns one anonymous mapping. A heap built by
//! [`Region::heap`] hands out fragments whose addresses are offsets into
//! that mapping, so value bytes are reached by slicing rather than through
//! raw pointers.

use std::ops::Range;

use memmap2::MmapMut;
use tracing::debug;

use crate::error::{CacheError, Result};
use crate::heap::{Fragment, Heap};
use crate::Config;

pub struct Region {
    map: MmapMut,
}

impl Region {
    /// Map `size` bytes of anonymous memory.
    pub fn new(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(CacheError::InvalidConfig(
                "region size must be non-zero".into(),
            ));
        }
        let map = MmapMut::map_anon(size)?;
        debug!(size, "mapped value region");
        Ok(Self { map })
    }

    pub fn with_config(config: &Config) -> Result<Self> {
        config.validate()?;
        Self::new(config.pool_size)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// A heap covering the whole region, addressed by offset.
    pub fn heap(&self, fragment_size: usize) -> Result<Heap> {
        Heap::new(0, self.len(), fragment_size)
    }

    /// Copy `data` to the start of `fragment`.
    pub fn write(&mut self, fragment: Fragment, data: &[u8]) -> Result<()> {
        if data.len() > fragment.size {
            return Err(CacheError::ValueTooLarge {
                len: data.len(),
                capacity: fragment.size,
            });
        }
        let range = self.checked_range(fragment)?;
        self.map[range.start..range.start + data.len()].copy_from_slice(data);
        Ok(())
    }

    /// The first `len` bytes of `fragment`.
    pub fn read(&self, fragment: Fragment, len: usize) -> Result<&[u8]> {
        if len > fragment.size {
            return Err(CacheError::ValueTooLarge {
                len,
                capacity: fragment.size,
            });
        }
        let range = self.checked_range(fragment)?;
        Ok(&self.map[range.start..range.start + len])
    }

    fn checked_range(&self, fragment: Fragment) -> Result<Range<usize>> {
        match fragment.addr.checked_add(fragment.size) {
            Some(end) if end <= self.len() => Ok(fragment.addr..end),
            _ => Err(CacheError::OutOfRegion {
                addr: fragment.addr,
                size: fragment.size,
                region_size: self.len(),
            }),
        }
    }
}

impl std::fmt::Debug for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Region").field("len", &self.len()).finish()
    }
}
