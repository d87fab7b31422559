use std::mem::MaybeUninit;

/// A simple slab allocator.
///
/// A `Slab` stores values of type `T` in a contiguous array and
/// returns stable indices that can be reused after removal.
///
/// Internally, it keeps track of:
/// - initialized slots,
/// - free indices,
/// - and uninitialized memory using [`MaybeUninit`].
///
/// The runtime uses it for the registry of live tasks and for the wakers
/// waiting on a task to finish, both of which need cheap removal by key.
pub(crate) struct Slab<T> {
    /// Storage for items (may contain uninitialized slots).
    items: Vec<MaybeUninit<T>>,
    /// Stack of free indices that can be reused.
    free: Vec<usize>,
    /// Marks whether a slot is currently initialized.
    used: Vec<bool>,
    /// Number of initialized slots.
    len: usize,
}

impl<T> Slab<T> {
    /// Creates a new `Slab` with a fixed initial capacity.
    ///
    /// All slots are initially free and uninitialized.
    pub(crate) fn new(size: usize) -> Self {
        let items = (0..size).map(|_| MaybeUninit::<T>::uninit()).collect();
        let free = (0..size).rev().collect();
        let used = vec![false; size];

        Self {
            items,
            free,
            used,
            len: 0,
        }
    }

    /// Inserts a value into the slab and returns its key.
    ///
    /// If a free slot is available, it is reused.
    /// Otherwise, the slab grows exponentially.
    pub(crate) fn insert(&mut self, item: T) -> usize {
        let index = if let Some(i) = self.free.pop() {
            i
        } else {
            let len = self.items.len();
            let new_len = if len == 0 { 1 } else { 2 * len };

            self.items
                .extend((len..new_len).map(|_| MaybeUninit::<T>::uninit()));
            self.free.extend(((len + 1)..new_len).rev());
            self.used.extend((len..new_len).map(|_| false));

            len
        };

        self.items[index] = MaybeUninit::new(item);
        self.used[index] = true;
        self.len += 1;

        index
    }

    /// Removes and returns the value stored at `key`, if any.
    ///
    /// The slot becomes free and may be reused by future insertions.
    pub(crate) fn remove(&mut self, key: usize) -> Option<T> {
        if !self.used.get(key).copied().unwrap_or(false) {
            return None;
        }

        self.free.push(key);
        self.used[key] = false;
        self.len -= 1;

        // Safety: the slot was marked as used, so it is initialized.
        let item = unsafe { self.items[key].assume_init_read() };
        self.items[key] = MaybeUninit::uninit();

        Some(item)
    }

    /// Number of values currently stored.
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the slab holds no values.
    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Iterates over the stored values in key order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = &T> {
        self.items
            .iter()
            .zip(self.used.iter())
            .filter(|(_, used)| **used)
            // Safety: only initialized slots pass the filter.
            .map(|(slot, _)| unsafe { slot.assume_init_ref() })
    }

    /// Removes every value, returning them in key order.
    pub(crate) fn drain(&mut self) -> Vec<T> {
        let mut out = Vec::with_capacity(self.len);

        for key in 0..self.items.len() {
            if let Some(item) = self.remove(key) {
                out.push(item);
            }
        }

        out
    }
}

impl<T> Drop for Slab<T> {
    /// Drops all initialized elements stored in the slab.
    ///
    /// Uninitialized slots are ignored.
    fn drop(&mut self) {
        for (slot, &used) in self.items.iter_mut().zip(self.used.iter()) {
            if used {
                unsafe {
                    slot.assume_init_drop();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_reused_after_removal() {
        let mut slab = Slab::new(0);
        let a = slab.insert("a");
        let b = slab.insert("b");

        assert_eq!(slab.remove(a), Some("a"));
        assert_eq!(slab.insert("c"), a);
        assert_eq!(slab.len(), 2);
        assert_eq!(slab.remove(b), Some("b"));
    }

    #[test]
    fn removing_twice_returns_none() {
        let mut slab = Slab::new(2);
        let key = slab.insert(7);

        assert_eq!(slab.remove(key), Some(7));
        assert_eq!(slab.remove(key), None);
        assert_eq!(slab.remove(99), None);
        assert!(slab.is_empty());
    }

    #[test]
    fn drain_empties_the_slab() {
        let mut slab = Slab::new(1);
        for i in 0..5 {
            slab.insert(i);
        }
        slab.remove(2);

        let mut values = slab.drain();
        values.sort();

        assert_eq!(values, vec![0, 1, 3, 4]);
        assert!(slab.is_empty());
        assert_eq!(slab.iter().count(), 0);
    }
}
