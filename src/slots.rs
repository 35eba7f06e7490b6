/// Index-stable table of optional entries.
///
/// Indices are never moved or renumbered. The table doubles when every slot
/// is occupied and never shrinks. Free slots are searched starting at an
/// offset of `len`, which spreads reuse across the table instead of always
/// refilling the lowest index first.
pub(crate) struct SlotTable<T> {
    slots: Vec<Option<T>>,
    len: usize,
}

impl<T> SlotTable<T> {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        let mut slots = Vec::new();
        slots.resize_with(capacity.max(1), || None);
        Self { slots, len: 0 }
    }

    /// Number of slots, occupied or not.
    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of occupied slots.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Stores `value` in a free slot and returns its index.
    pub(crate) fn insert(&mut self, value: T) -> usize {
        let capacity = self.capacity();
        if self.len >= capacity {
            self.slots.resize_with(capacity * 2, || None);
            self.slots[capacity] = Some(value);
            self.len += 1;
            log::debug!("slot table grew from {} to {} slots", capacity, capacity * 2);
            return capacity;
        }

        for i in 0..capacity {
            let index = (i + self.len) % capacity;
            if self.slots[index].is_none() {
                self.slots[index] = Some(value);
                self.len += 1;
                return index;
            }
        }

        unreachable!("{} of {} slots in use but none free", self.len, capacity);
    }

    #[inline]
    pub(crate) fn get(&self, index: usize) -> Option<&T> {
        self.slots.get(index)?.as_ref()
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.slots.get_mut(index)?.as_mut()
    }

    /// Empties a slot, returning what was in it.
    pub(crate) fn remove(&mut self, index: usize) -> Option<T> {
        let value = self.slots.get_mut(index)?.take();
        if value.is_some() {
            self.len -= 1;
        }
        value
    }

    /// Empties every slot, keeping the capacity, and returns the entries
    /// with their indices.
    pub(crate) fn take_all(&mut self) -> Vec<(usize, T)> {
        let taken: Vec<_> = self
            .slots
            .iter_mut()
            .enumerate()
            .filter_map(|(index, slot)| Some((index, slot.take()?)))
            .collect();
        self.len = 0;
        taken
    }
}
