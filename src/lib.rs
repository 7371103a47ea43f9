//! # critnib
//!
//! An ordered radix index over byte-string keys that branches on 4-bit
//! nibbles (a crit-bit tree with a nibble-wide slice, hence "critnib").
//!
//! Branches only record the point where their subtrees diverge (a byte
//! offset and a nibble shift within that byte); leaves keep a handle to the
//! caller's key bytes plus the value. Lookup, insertion and removal are all
//! `O(key length / 4)`.
//!
//! ## Key format
//!
//! No stored key may be a strict prefix of another stored key. The index
//! does not encode keys itself: callers must make keys prefix-free, usually
//! by writing a length field in front of the raw key bytes. Inserting a key
//! that is a prefix of a stored key (or has one as a prefix) is reported as
//! [`IndexError::AlreadyExists`]; `get`/`remove` results for such keys are
//! unspecified.
//!
//! ## Concurrency
//!
//! There is no internal locking. `set`, `remove` and `clear` take `&mut self`,
//! so sharing an index between threads requires an external lock (or another
//! reader/writer discipline) around it. Reads through `&self` are safe to run
//! concurrently with each other.
//!
//! ## Example
//!
//! ```rust
//! use critnib::{Critnib, IndexError};
//!
//! fn encode(key: &[u8]) -> Vec<u8> {
//!     let mut out = (key.len() as u32).to_be_bytes().to_vec();
//!     out.extend_from_slice(key);
//!     out
//! }
//!
//! let mut index: Critnib<Vec<u8>, u64> = Critnib::new();
//! index.set(encode(b"hello"), 1).unwrap();
//! index.set(encode(b"world"), 2).unwrap();
//! assert_eq!(index.set(encode(b"hello"), 3), Err(IndexError::AlreadyExists));
//!
//! assert_eq!(index.get(&encode(b"hello")), Some(&1));
//! assert_eq!(index.remove(&encode(b"world")), Some(2));
//! assert_eq!(index.get(&encode(b"world")), None);
//! ```

#![forbid(unsafe_code)]

mod arena;

use std::collections::TryReserveError;

use thiserror::Error;

use arena::Arena;

// =============================================================================
// Nibble utilities
// =============================================================================

/// Bits per radix level.
const SLICE: u8 = 4;
const NIB: u8 = (1 << SLICE) - 1;
/// Children per branch.
const SLNODES: usize = 1 << SLICE;

/// Child slot selected by byte `b` for a branch at shift `bit`.
#[inline]
fn slice_index(b: u8, bit: u8) -> usize {
    ((b >> bit) & NIB) as usize
}

/// Nibble-aligned shift of the most significant bit where `a` and `b` differ.
#[inline]
fn divergence_shift(a: u8, b: u8) -> u8 {
    let at = a ^ b;
    debug_assert_ne!(at, 0);
    let msb = 7 - at.leading_zeros() as u8;
    msb & !(SLICE - 1)
}

// =============================================================================
// Node types
// =============================================================================

/// Reference to a node: the variant is the leaf/branch tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Ref {
    Branch(u32),
    Leaf(u32),
}

#[derive(Clone)]
struct Branch {
    child: [Option<Ref>; SLNODES],
    /// Byte offset into keys at which children diverge.
    byte: usize,
    /// Shift of the discriminating nibble within `byte` (0 or 4).
    bit: u8,
}

impl Branch {
    fn new(byte: usize, bit: u8) -> Self {
        Self {
            child: [None; SLNODES],
            byte,
            bit,
        }
    }

    /// Whether this branch sits above a divergence point at `(byte, bit)`.
    #[inline]
    fn dominates(&self, byte: usize, bit: u8) -> bool {
        self.byte < byte || (self.byte == byte && self.bit >= bit)
    }

    /// The sole remaining child, if exactly one slot is occupied.
    fn only_child(&self) -> Option<Ref> {
        let mut children = self.child.iter().flatten();
        let first = *children.next()?;
        children.next().is_none().then_some(first)
    }
}

#[derive(Clone)]
struct Leaf<K, V> {
    key: K,
    value: V,
}

/// A place that holds a reference: the root, or a child slot of a branch.
#[derive(Clone, Copy)]
enum Slot {
    Root,
    Child(u32, usize),
}

// =============================================================================
// Errors
// =============================================================================

/// Errors returned by [`Critnib::set`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IndexError {
    /// The key is already stored, or it is a prefix of a stored key (or the
    /// other way round).
    #[error("key already exists in the index")]
    AlreadyExists,
    /// A node could not be allocated. The index is unchanged.
    #[error("out of memory allocating an index node")]
    OutOfMemory,
}

impl From<TryReserveError> for IndexError {
    fn from(_: TryReserveError) -> Self {
        IndexError::OutOfMemory
    }
}

// =============================================================================
// Critnib
// =============================================================================

/// A nibble-radix index from prefix-free byte-string keys to values.
///
/// `K` is a handle to the key bytes (a `Vec<u8>`, an `Arc` to the record the
/// key is embedded in, ...). The index keeps the handle alongside the value
/// and never copies the bytes behind it.
#[derive(Clone)]
pub struct Critnib<K, V> {
    branches: Arena<Branch>,
    leaves: Arena<Leaf<K, V>>,
    root: Option<Ref>,
}

impl<K, V> Critnib<K, V> {
    pub const fn new() -> Self {
        Self {
            branches: Arena::new(),
            leaves: Arena::new(),
            root: None,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.leaves.live()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Bytes reserved by the branch and leaf arenas.
    pub fn memory_usage(&self) -> usize {
        self.branches.capacity_bytes() + self.leaves.capacity_bytes()
    }

    /// Drop every entry. Key handles and values are dropped with their leaves.
    ///
    /// Nodes are released through a worklist, so deep trees do not recurse.
    /// Arena capacity is kept for reuse.
    pub fn clear(&mut self) {
        let mut work: Vec<Ref> = self.root.take().into_iter().collect();
        while let Some(r) = work.pop() {
            match r {
                Ref::Leaf(id) => drop(self.leaves.release(id)),
                Ref::Branch(b) => {
                    let branch = self.branches.release(b);
                    work.extend(branch.child.iter().flatten());
                }
            }
        }
        debug_assert_eq!(self.branches.live() + self.leaves.live(), 0);
        self.branches.clear();
        self.leaves.clear();
    }

    /// Call `f` on every entry, in ascending key order.
    pub fn for_each(&self, mut f: impl FnMut(&K, &V)) {
        let mut stack: Vec<Ref> = self.root.into_iter().collect();
        while let Some(r) = stack.pop() {
            match r {
                Ref::Leaf(id) => {
                    let leaf = self.leaves.get(id);
                    f(&leaf.key, &leaf.value);
                }
                Ref::Branch(b) => {
                    stack.extend(self.branches.get(b).child.iter().rev().flatten());
                }
            }
        }
    }

    /// Number of branches on the longest root-to-leaf path.
    pub fn height(&self) -> usize {
        let mut max = 0;
        let mut stack: Vec<(Ref, usize)> = self.root.map(|r| (r, 0)).into_iter().collect();
        while let Some((r, depth)) = stack.pop() {
            match r {
                Ref::Leaf(_) => max = max.max(depth),
                Ref::Branch(b) => {
                    let branch = self.branches.get(b);
                    stack.extend(branch.child.iter().flatten().map(|&c| (c, depth + 1)));
                }
            }
        }
        max
    }

    /// Iterate over entries in ascending key order.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            tree: self,
            stack: self.root.into_iter().collect(),
        }
    }

    fn any_leaf(&self, mut n: Ref) -> u32 {
        loop {
            match n {
                Ref::Leaf(id) => return id,
                Ref::Branch(b) => {
                    let Some(&next) = self.branches.get(b).child.iter().flatten().next() else {
                        unreachable!("branch {b} has no children");
                    };
                    n = next;
                }
            }
        }
    }

    fn set_slot(&mut self, slot: Slot, r: Option<Ref>) {
        match slot {
            Slot::Root => self.root = r,
            Slot::Child(b, idx) => self.branches.get_mut(b).child[idx] = r,
        }
    }
}

impl<K: AsRef<[u8]>, V> Critnib<K, V> {
    /// Insert `value` under `key`.
    ///
    /// Fails with [`IndexError::AlreadyExists`] if the key is stored already
    /// or conflicts with a stored key by being a prefix of it (or vice
    /// versa). Existing values are never replaced.
    pub fn set(&mut self, key: K, value: V) -> Result<(), IndexError> {
        let Some(root) = self.root else {
            self.leaves.reserve_one()?;
            let id = self.leaves.alloc(Leaf { key, value });
            self.root = Some(Ref::Leaf(id));
            return Ok(());
        };

        let k = key.as_ref();

        // First descent: find a leaf that shares with every key of the
        // subtree we stop in at least the prefix it shares with `k`.
        let mut n = root;
        while let Ref::Branch(b) = n {
            let branch = self.branches.get(b);
            if branch.byte >= k.len() {
                break;
            }
            match branch.child[slice_index(k[branch.byte], branch.bit)] {
                Some(next) => n = next,
                None => break,
            }
        }
        let rep = self.leaves.get(self.any_leaf(n)).key.as_ref();

        let common_len = rep.len().min(k.len());
        let Some(diff) = (0..common_len).find(|&i| rep[i] != k[i]) else {
            // Either an exact duplicate or one key is a prefix of the other.
            return Err(IndexError::AlreadyExists);
        };
        let sh = divergence_shift(rep[diff], k[diff]);
        let rep_nib = slice_index(rep[diff], sh);
        let new_nib = slice_index(k[diff], sh);

        // Second descent: stop above the first branch that splits later than
        // the new divergence point.
        let mut parent = Slot::Root;
        let mut n = Some(root);
        while let Some(Ref::Branch(b)) = n {
            let branch = self.branches.get(b);
            if !branch.dominates(diff, sh) {
                break;
            }
            let idx = slice_index(k[branch.byte], branch.bit);
            parent = Slot::Child(b, idx);
            n = branch.child[idx];
        }

        self.leaves.reserve_one()?;
        if n.is_some() {
            self.branches.reserve_one()?;
        }
        let leaf = Ref::Leaf(self.leaves.alloc(Leaf { key, value }));

        match n {
            // An existing branch already splits at this nibble; its slot for
            // the new key is free.
            None => self.set_slot(parent, Some(leaf)),
            Some(subtree) => {
                let mut branch = Branch::new(diff, sh);
                branch.child[rep_nib] = Some(subtree);
                branch.child[new_nib] = Some(leaf);
                let b = self.branches.alloc(branch);
                self.set_slot(parent, Some(Ref::Branch(b)));
            }
        }
        Ok(())
    }

    pub fn get(&self, key: &[u8]) -> Option<&V> {
        let id = self.find_leaf(key)?;
        Some(&self.leaves.get(id).value)
    }

    pub fn get_mut(&mut self, key: &[u8]) -> Option<&mut V> {
        let id = self.find_leaf(key)?;
        Some(&mut self.leaves.get_mut(id).value)
    }

    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.find_leaf(key).is_some()
    }

    /// Number of branches passed on the way to `key`, if it is stored.
    pub fn depth_of(&self, key: &[u8]) -> Option<usize> {
        let mut depth = 0;
        let mut n = self.root?;
        loop {
            match n {
                Ref::Leaf(id) => {
                    return (self.leaves.get(id).key.as_ref() == key).then_some(depth);
                }
                Ref::Branch(b) => {
                    let branch = self.branches.get(b);
                    if branch.byte >= key.len() {
                        return None;
                    }
                    n = branch.child[slice_index(key[branch.byte], branch.bit)]?;
                    depth += 1;
                }
            }
        }
    }

    /// Remove `key` and return its value.
    ///
    /// Only the index's own leaf is released; the key handle is dropped and
    /// the value handed back to the caller.
    pub fn remove(&mut self, key: &[u8]) -> Option<V> {
        let mut grandparent = None;
        let mut parent = Slot::Root;
        let mut n = self.root?;

        let leaf = loop {
            match n {
                Ref::Leaf(id) => break id,
                Ref::Branch(b) => {
                    let branch = self.branches.get(b);
                    if branch.byte >= key.len() {
                        return None;
                    }
                    let idx = slice_index(key[branch.byte], branch.bit);
                    grandparent = Some(parent);
                    parent = Slot::Child(b, idx);
                    n = branch.child[idx]?;
                }
            }
        };

        // Branch nibbles only certify divergence points, so compare it all.
        if self.leaves.get(leaf).key.as_ref() != key {
            return None;
        }

        self.set_slot(parent, None);
        let Leaf { value, .. } = self.leaves.release(leaf);

        let (Some(grandparent), Slot::Child(b, _)) = (grandparent, parent) else {
            // The leaf was the root.
            return Some(value);
        };

        // A branch left with one child no longer marks a divergence point:
        // hoist the child into the branch's place.
        if let Some(only) = self.branches.get(b).only_child() {
            self.set_slot(grandparent, Some(only));
            self.branches.release(b);
        }
        Some(value)
    }

    fn find_leaf(&self, key: &[u8]) -> Option<u32> {
        let mut n = self.root?;
        loop {
            match n {
                Ref::Leaf(id) => {
                    return (self.leaves.get(id).key.as_ref() == key).then_some(id);
                }
                Ref::Branch(b) => {
                    let branch = self.branches.get(b);
                    if branch.byte >= key.len() {
                        return None;
                    }
                    n = branch.child[slice_index(key[branch.byte], branch.bit)]?;
                }
            }
        }
    }
}

impl<K, V> Default for Critnib<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Iteration
// =============================================================================

/// Iterator over `(key, value)` pairs in ascending key order.
pub struct Iter<'a, K, V> {
    tree: &'a Critnib<K, V>,
    stack: Vec<Ref>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(r) = self.stack.pop() {
            match r {
                Ref::Leaf(id) => {
                    let leaf = self.tree.leaves.get(id);
                    return Some((&leaf.key, &leaf.value));
                }
                Ref::Branch(b) => {
                    let branch = self.tree.branches.get(b);
                    self.stack.extend(branch.child.iter().rev().flatten());
                }
            }
        }
        None
    }
}


#[cfg(test)]
mod proptests;
