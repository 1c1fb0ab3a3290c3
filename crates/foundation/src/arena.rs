use crate::handles::Handle;

/// Append-only arena with tombstoned removal.
///
/// Slots are never compacted or reused, so every [`Handle`] keeps naming the
/// same record for the arena's lifetime. Iteration skips tombstones in slot
/// order, which keeps traversal deterministic.
#[derive(Debug, Clone)]
pub struct Arena<T> {
    slots: Vec<Option<T>>,
    live: usize,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            live: 0,
        }
    }
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `v` in a fresh slot. Returns `None` once `u32::MAX` handles
    /// have been issued.
    pub fn try_alloc(&mut self, v: T) -> Option<Handle> {
        let index = u32::try_from(self.slots.len()).ok()?;
        self.slots.push(Some(v));
        self.live += 1;
        Some(Handle::new(index))
    }

    pub fn get(&self, h: Handle) -> Option<&T> {
        self.slots.get(h.index()).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, h: Handle) -> Option<&mut T> {
        self.slots.get_mut(h.index()).and_then(Option::as_mut)
    }

    /// Tombstones the slot and returns its value, if it was live.
    pub fn remove(&mut self, h: Handle) -> Option<T> {
        let v = self.slots.get_mut(h.index())?.take()?;
        self.live -= 1;
        Some(v)
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (Handle, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|v| (Handle::new(i as u32), v)))
    }
}
