//! In-process cache tier.

use std::sync::{Arc, OnceLock};

/// One write-once slot per cached index.
///
/// Concurrent writers to a slot race on `OnceLock::set`; the loser discards
/// its value and adopts the winner's, so every reader sees the same record.
pub(crate) struct MemoryTier<R> {
    slots: Vec<OnceLock<Arc<R>>>,
}

impl<R> MemoryTier<R> {
    pub(crate) fn new(len: usize) -> Self {
        Self {
            slots: (0..len).map(|_| OnceLock::new()).collect(),
        }
    }

    pub(crate) fn get(&self, index: usize) -> Option<Arc<R>> {
        self.slots.get(index)?.get().cloned()
    }

    /// Store `record` unless the slot is filled. Returns the slot's value and
    /// whether this call filled it.
    pub(crate) fn insert(&self, index: usize, record: R) -> Option<(Arc<R>, bool)> {
        let slot = self.slots.get(index)?;
        let mut stored = false;
        let value = slot.get_or_init(|| {
            stored = true;
            Arc::new(record)
        });
        Some((value.clone(), stored))
    }

    pub(crate) fn filled(&self) -> usize {
        self.slots.iter().filter(|s| s.get().is_some()).count()
    }
}
