//! Slot arena for branches and leaves.
//!
//! Nodes are addressed by `u32` slot indices instead of pointers. Released
//! slots go onto a free stack and are handed out again before the backing
//! vector grows, so a long-running index does not leak slots under churn.

use std::collections::TryReserveError;

#[derive(Clone)]
pub(crate) struct Arena<T> {
    slots: Vec<Option<T>>,
    /// Indices of released slots, reused LIFO.
    free: Vec<u32>,
    /// Make the next `reserve_one` report allocation failure.
    #[cfg(test)]
    pub(crate) fail_next_reserve: bool,
}

impl<T> Arena<T> {
    pub(crate) const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            #[cfg(test)]
            fail_next_reserve: false,
        }
    }

    /// Make sure the next `alloc` cannot fail.
    ///
    /// Growth goes through `try_reserve`, so the only way to run out of memory
    /// is here, before the caller has touched the tree.
    pub(crate) fn reserve_one(&mut self) -> Result<(), TryReserveError> {
        #[cfg(test)]
        {
            if std::mem::take(&mut self.fail_next_reserve) {
                return Vec::<u8>::new().try_reserve(usize::MAX);
            }
        }
        if self.free.is_empty() && self.slots.len() == self.slots.capacity() {
            self.slots.try_reserve(1)?;
        }
        Ok(())
    }

    /// Store `value` and return its slot. Call `reserve_one` first.
    pub(crate) fn alloc(&mut self, value: T) -> u32 {
        match self.free.pop() {
            Some(id) => {
                debug_assert!(self.slots[id as usize].is_none());
                self.slots[id as usize] = Some(value);
                id
            }
            None => {
                let id = self.slots.len();
                assert!(id < u32::MAX as usize, "arena slot index overflow");
                self.slots.push(Some(value));
                id as u32
            }
        }
    }

    pub(crate) fn release(&mut self, id: u32) -> T {
        let Some(value) = self.slots[id as usize].take() else {
            unreachable!("released arena slot {id} twice");
        };
        self.free.push(id);
        value
    }

    #[inline]
    pub(crate) fn get(&self, id: u32) -> &T {
        match &self.slots[id as usize] {
            Some(value) => value,
            None => unreachable!("dangling arena slot {id}"),
        }
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, id: u32) -> &mut T {
        match &mut self.slots[id as usize] {
            Some(value) => value,
            None => unreachable!("dangling arena slot {id}"),
        }
    }

    /// Number of live slots.
    pub(crate) fn live(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub(crate) fn capacity_bytes(&self) -> usize {
        self.slots.capacity() * std::mem::size_of::<Option<T>>() + self.free.capacity() * 4
    }

    pub(crate) fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
    }
}
