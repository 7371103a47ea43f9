//! Locked index over cache entries.
//!
//! [`Critnib`] has no locking of its own. [`CacheIndex`] puts one exclusive
//! lock around every operation, which is all the cache needs: lookups are
//! short and never block inside the tree.

use std::sync::Arc;

use critnib::Critnib;
use parking_lot::Mutex;
use tracing::{trace, warn};

use crate::encoding::{encode_key, varint_size};
use crate::error::{CacheError, Result};
use crate::heap::Fragment;

/// A cached value: its key and the heap fragment holding its bytes.
#[derive(Debug)]
pub struct CacheEntry {
    /// Length-prefixed key, as stored in the index.
    key: Box<[u8]>,
    /// Size of the length prefix inside `key`.
    prefix_len: usize,
    fragment: Fragment,
    value_len: usize,
}

impl CacheEntry {
    /// Describe `value_len` bytes of value stored at the start of `fragment`.
    pub fn new(key: &[u8], fragment: Fragment, value_len: usize) -> Self {
        debug_assert!(value_len <= fragment.size);
        Self {
            key: encode_key(key).into_vec().into_boxed_slice(),
            prefix_len: varint_size(key.len() as u64),
            fragment,
            value_len,
        }
    }

    /// The raw key.
    pub fn key(&self) -> &[u8] {
        &self.key[self.prefix_len..]
    }

    /// The key as the index sees it.
    pub fn encoded_key(&self) -> &[u8] {
        &self.key
    }

    pub fn fragment(&self) -> Fragment {
        self.fragment
    }

    pub fn value_len(&self) -> usize {
        self.value_len
    }
}

/// Key handle stored in the tree. It shares the entry the key is embedded
/// in, so the tree never copies key bytes.
#[derive(Clone)]
pub struct EntryKey(Arc<CacheEntry>);

impl AsRef<[u8]> for EntryKey {
    fn as_ref(&self) -> &[u8] {
        self.0.encoded_key()
    }
}

/// Thread-safe index from raw keys to shared entries.
pub struct CacheIndex {
    tree: Mutex<Critnib<EntryKey, Arc<CacheEntry>>>,
}

impl CacheIndex {
    pub fn new() -> Self {
        Self {
            tree: Mutex::new(Critnib::new()),
        }
    }

    /// Publish `entry` under its key.
    ///
    /// Fails with [`CacheError::Index`] if the key is already present.
    pub fn insert(&self, entry: Arc<CacheEntry>) -> Result<()> {
        let key = EntryKey(Arc::clone(&entry));
        let mut tree = self.tree.lock();
        tree.set(key, entry).map_err(|err| {
            warn!(error = %err, "inserting to the index failed");
            CacheError::from(err)
        })
    }

    /// Look up `key` and take a reference to its entry.
    pub fn get(&self, key: &[u8]) -> Option<Arc<CacheEntry>> {
        let encoded = encode_key(key);
        let entry = self.tree.lock().get(&encoded).cloned();
        if entry.is_none() {
            trace!(key_len = key.len(), "key not found in the index");
        }
        entry
    }

    /// Unpublish `entry`.
    ///
    /// Only `entry` itself is removed. If its key now maps to a different
    /// entry (it was evicted and the key stored again), the index is left
    /// alone and [`CacheError::NotFound`] is returned, so the caller never
    /// frees a fragment twice.
    ///
    /// Readers holding a reference keep the entry alive; the caller may reuse
    /// its fragment once it holds the last one.
    pub fn remove(&self, entry: &CacheEntry) -> Result<Arc<CacheEntry>> {
        let mut tree = self.tree.lock();
        let stored = tree
            .get(entry.encoded_key())
            .is_some_and(|stored| std::ptr::eq(Arc::as_ptr(stored), entry));
        if !stored {
            warn!(key_len = entry.key().len(), "cannot find the entry in the index");
            return Err(CacheError::NotFound);
        }
        tree.remove(entry.encoded_key()).ok_or(CacheError::NotFound)
    }

    pub fn len(&self) -> usize {
        self.tree.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.lock().is_empty()
    }
}

impl Default for CacheIndex {
    fn default() -> Self {
        Self::new()
    }
}
