use kanban_core::Positioned;

/// Dense, zero-based ordered sequence of entities keyed by id.
///
/// The array order is the rendered order. `position` is derived from it and
/// rewritten after every insert or remove.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderedList<T> {
    items: Vec<T>,
}

impl<T> Default for OrderedList<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T: Positioned> OrderedList<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from server data: stable sort by ascending `position`, then renumber.
    pub fn from_unsorted(mut items: Vec<T>) -> Self {
        items.sort_by_key(|item| item.position());
        let mut list = Self { items };
        list.renumber();
        list
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.items.iter().position(|item| item.id() == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index_of(id).is_some()
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.items.iter().find(|item| item.id() == id)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    /// Insert at `min(index, len)` and return the index actually used.
    pub fn insert(&mut self, item: T, index: usize) -> usize {
        let index = index.min(self.items.len());
        self.items.insert(index, item);
        self.renumber();
        index
    }

    /// Remove by id, returning the old index and the item.
    pub fn remove(&mut self, id: &str) -> Option<(usize, T)> {
        let index = self.index_of(id)?;
        let item = self.items.remove(index);
        self.renumber();
        Some((index, item))
    }

    /// Mutate one item in place. Its position is reset to its index afterwards
    /// so callers cannot break density.
    pub fn update<R>(&mut self, id: &str, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let index = self.index_of(id)?;
        let item = &mut self.items[index];
        let result = f(item);
        item.set_position(index as i32);
        Some(result)
    }

    pub fn to_vec(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.items.clone()
    }

    pub fn into_vec(self) -> Vec<T> {
        self.items
    }

    /// True when positions are exactly `0..len` in order.
    pub fn is_dense(&self) -> bool {
        self.items
            .iter()
            .enumerate()
            .all(|(index, item)| item.position() == index as i32)
    }

    fn renumber(&mut self) {
        for (index, item) in self.items.iter_mut().enumerate() {
            item.set_position(index as i32);
        }
    }
}

impl<'a, T> IntoIterator for &'a OrderedList<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
