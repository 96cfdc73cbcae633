/// Dense table addressed by caller-chosen slot indices.
///
/// Grows by doubling to fit an index and never shrinks. Lookups past the end
/// are a producer bug: they trip a debug assertion and are a no-op in
/// release builds.
#[derive(Debug)]
pub struct SlotTable<T> {
    entries: Vec<T>,
}

impl<T: Default> SlotTable<T> {
    pub fn with_len(len: usize) -> Self {
        let mut entries = Vec::with_capacity(len);
        entries.resize_with(len, T::default);
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Grows the table so `index` is addressable.
    pub fn ensure(&mut self, index: usize) {
        if index < self.entries.len() {
            return;
        }
        let mut len = self.entries.len().max(1);
        while len <= index {
            len *= 2;
        }
        self.entries.resize_with(len, T::default);
    }

    /// Entry for a slot that is being (re)created; grows the table to fit.
    pub fn slot_mut(&mut self, index: usize) -> &mut T {
        self.ensure(index);
        &mut self.entries[index]
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        debug_assert!(
            index < self.entries.len(),
            "slot {index} out of range ({} entries)",
            self.entries.len()
        );
        self.entries.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        debug_assert!(
            index < self.entries.len(),
            "slot {index} out of range ({} entries)",
            self.entries.len()
        );
        self.entries.get_mut(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.entries.iter_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_by_doubling() {
        let mut t: SlotTable<u8> = SlotTable::with_len(4);
        t.ensure(4);
        assert_eq!(t.len(), 8);
        t.ensure(33);
        assert_eq!(t.len(), 64);
    }

    #[test]
    fn never_shrinks() {
        let mut t: SlotTable<u8> = SlotTable::with_len(16);
        t.ensure(2);
        assert_eq!(t.len(), 16);
    }

    #[test]
    fn empty_table_grows_from_one() {
        let mut t: SlotTable<u8> = SlotTable::with_len(0);
        *t.slot_mut(5) = 9;
        assert_eq!(t.len(), 8);
        assert_eq!(t.get(5), Some(&9));
    }
}
