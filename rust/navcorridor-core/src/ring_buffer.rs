//! Double-ended growable buffer addressed by absolute indices.
//!
//! Every element keeps the absolute index it was given when pushed. Pushing or
//! popping at one end never changes the absolute index of elements at the
//! other end, so callers can hold indices into the suffix while the prefix is
//! trimmed. Splicing is anchored at the head: elements before the splice point
//! keep their indices, elements after it shift by `inserted - removed`.

#[derive(Clone, Debug)]
pub struct RingBuffer<T> {
    data: Vec<T>,
    head: isize,
    len: usize,
}

impl<T: Copy + Default> Default for RingBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy + Default> RingBuffer<T> {
    pub fn new() -> Self {
        Self { data: Vec::new(), head: 0, len: 0 }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let cap = if capacity == 0 { 0 } else { capacity.next_power_of_two() };
        Self { data: vec![T::default(); cap], head: 0, len: 0 }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Absolute index of the first element.
    #[inline]
    pub fn head(&self) -> isize {
        self.head
    }

    /// Absolute index one past the last element.
    #[inline]
    pub fn absolute_end(&self) -> isize {
        self.head + self.len as isize
    }

    #[inline]
    fn slot(&self, absolute: isize) -> usize {
        // Capacity is a power of two, so masking the two's complement value
        // maps negative absolute indices correctly.
        (absolute as usize) & (self.data.len() - 1)
    }

    fn grow_to(&mut self, min_len: usize) {
        if min_len <= self.data.len() {
            return;
        }
        let new_cap = min_len.next_power_of_two().max(4);
        let mut data = vec![T::default(); new_cap];
        let mask = new_cap - 1;
        for i in 0..self.len {
            let abs = self.head + i as isize;
            data[(abs as usize) & mask] = self.data[self.slot(abs)];
        }
        self.data = data;
    }

    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }

    /// Clears the buffer and restarts absolute indexing at `head`.
    pub fn reset_to(&mut self, head: isize) {
        self.head = head;
        self.len = 0;
    }

    pub fn push_end(&mut self, value: T) -> isize {
        self.grow_to(self.len + 1);
        let abs = self.absolute_end();
        let slot = self.slot(abs);
        self.data[slot] = value;
        self.len += 1;
        abs
    }

    pub fn push_start(&mut self, value: T) -> isize {
        self.grow_to(self.len + 1);
        self.head -= 1;
        let slot = self.slot(self.head);
        self.data[slot] = value;
        self.len += 1;
        self.head
    }

    pub fn pop_end(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        self.len -= 1;
        Some(self.data[self.slot(self.absolute_end())])
    }

    pub fn pop_start(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        let value = self.data[self.slot(self.head)];
        self.head += 1;
        self.len -= 1;
        Some(value)
    }

    pub fn first(&self) -> Option<T> {
        if self.len == 0 { None } else { Some(self.data[self.slot(self.head)]) }
    }

    pub fn last(&self) -> Option<T> {
        if self.len == 0 { None } else { Some(self.data[self.slot(self.absolute_end() - 1)]) }
    }

    #[inline]
    #[track_caller]
    fn check_absolute(&self, absolute: isize) {
        assert!(
            absolute >= self.head && absolute < self.absolute_end(),
            "ring buffer index {absolute} out of range {}..{}",
            self.head,
            self.absolute_end()
        );
    }

    #[track_caller]
    pub fn get_absolute(&self, absolute: isize) -> T {
        self.check_absolute(absolute);
        self.data[self.slot(absolute)]
    }

    #[track_caller]
    pub fn set_absolute(&mut self, absolute: isize, value: T) {
        self.check_absolute(absolute);
        let slot = self.slot(absolute);
        self.data[slot] = value;
    }

    /// Element at `index` positions from the head.
    #[track_caller]
    pub fn get(&self, index: usize) -> T {
        self.get_absolute(self.head + index as isize)
    }

    #[track_caller]
    pub fn set(&mut self, index: usize, value: T) {
        self.set_absolute(self.head + index as isize, value)
    }

    /// Keeps the first `len` elements.
    pub fn truncate(&mut self, len: usize) {
        if len < self.len {
            self.len = len;
        }
    }

    /// Removes `remove` elements starting at absolute index `start` and inserts
    /// `insert` in their place. Only the elements after the removed range move.
    #[track_caller]
    pub fn splice_absolute(&mut self, start: isize, remove: usize, insert: &[T]) {
        let end = self.absolute_end();
        assert!(
            start >= self.head && start + remove as isize <= end,
            "ring buffer splice {start}+{remove} out of range {}..{end}",
            self.head
        );
        let delta = insert.len() as isize - remove as isize;
        let new_len = (self.len as isize + delta) as usize;
        self.grow_to(new_len);

        let tail_start = start + remove as isize;
        if delta > 0 {
            let mut i = end - 1;
            while i >= tail_start {
                let v = self.data[self.slot(i)];
                let dst = self.slot(i + delta);
                self.data[dst] = v;
                i -= 1;
            }
        } else if delta < 0 {
            for i in tail_start..end {
                let v = self.data[self.slot(i)];
                let dst = self.slot(i + delta);
                self.data[dst] = v;
            }
        }
        for (k, v) in insert.iter().enumerate() {
            let dst = self.slot(start + k as isize);
            self.data[dst] = *v;
        }
        self.len = new_len;
    }

    /// Same as [`RingBuffer::splice_absolute`] with `start` counted from the head.
    #[track_caller]
    pub fn splice(&mut self, start: usize, remove: usize, insert: &[T]) {
        self.splice_absolute(self.head + start as isize, remove, insert)
    }

    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        (0..self.len).map(move |i| self.data[self.slot(self.head + i as isize)])
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.iter().collect()
    }
}
