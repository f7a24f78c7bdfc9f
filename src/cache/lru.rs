//! LRU Recency List Module
//!
//! Slab-backed doubly linked list used to track access order for eviction.
//! Every operation is O(1): nodes are addressed by a stable [`SlotId`]
//! handed out on insert, and freed slots are recycled.

// == Slot Id ==
/// Stable handle to a node in the [`RecencyList`].
///
/// Valid until the node is removed; afterwards the slot may be reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(usize);

#[derive(Debug)]
struct Node<T> {
    value: T,
    prev: Option<usize>,
    next: Option<usize>,
}

// == Recency List ==
/// Tracks access order for LRU eviction strategy.
///
/// - Front = Most recently used
/// - Back = Least recently used
#[derive(Debug)]
pub struct RecencyList<T> {
    slots: Vec<Option<Node<T>>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
}

impl<T> Default for RecencyList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RecencyList<T> {
    // == Constructor ==
    /// Creates a new empty list.
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates an empty list with room for `capacity` nodes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            head: None,
            tail: None,
            len: 0,
        }
    }

    // == Push Front ==
    /// Inserts a value as the most recently used node.
    pub fn push_front(&mut self, value: T) -> SlotId {
        let node = Node {
            value,
            prev: None,
            next: None,
        };
        let idx = match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(node);
                idx
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        };
        self.link_front(idx);
        self.len += 1;
        SlotId(idx)
    }

    // == Touch ==
    /// Marks a node as recently used (moves to front).
    pub fn touch(&mut self, id: SlotId) {
        if self.head == Some(id.0) || self.node(id.0).is_none() {
            return;
        }
        self.unlink(id.0);
        self.link_front(id.0);
    }

    // == Remove ==
    /// Removes a node and returns its value.
    ///
    /// Returns None if the slot is not occupied.
    pub fn remove(&mut self, id: SlotId) -> Option<T> {
        self.node(id.0)?;
        self.unlink(id.0);
        let node = self.slots[id.0].take()?;
        self.free.push(id.0);
        self.len -= 1;
        Some(node.value)
    }

    // == Evict Oldest ==
    /// Returns and removes the least recently used value.
    ///
    /// Returns None if the list is empty.
    pub fn evict_oldest(&mut self) -> Option<T> {
        let tail = self.tail?;
        self.remove(SlotId(tail))
    }

    // == Peek Oldest ==
    /// Returns the least recently used value without removing it.
    pub fn peek_oldest(&self) -> Option<&T> {
        self.tail.and_then(|idx| self.node(idx)).map(|n| &n.value)
    }

    // == Get ==
    /// Returns the value in a slot without changing its position.
    pub fn get(&self, id: SlotId) -> Option<&T> {
        self.node(id.0).map(|n| &n.value)
    }

    /// Mutable access to a slot's value without changing its position.
    pub fn get_mut(&mut self, id: SlotId) -> Option<&mut T> {
        self.node_mut(id.0).map(|n| &mut n.value)
    }

    // == Iteration ==
    /// Iterates values from most to least recently used.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            list: self,
            cursor: self.head,
        }
    }

    // == Length ==
    /// Returns the number of tracked values.
    pub fn len(&self) -> usize {
        self.len
    }

    // == Is Empty ==
    /// Returns true if no values are tracked.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    // == Clear ==
    /// Removes all values and releases their slots.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.head = None;
        self.tail = None;
        self.len = 0;
    }

    fn node(&self, idx: usize) -> Option<&Node<T>> {
        self.slots.get(idx).and_then(Option::as_ref)
    }

    fn node_mut(&mut self, idx: usize) -> Option<&mut Node<T>> {
        self.slots.get_mut(idx).and_then(Option::as_mut)
    }

    fn link_front(&mut self, idx: usize) {
        let old_head = self.head;
        if let Some(node) = self.node_mut(idx) {
            node.prev = None;
            node.next = old_head;
        }
        match old_head.and_then(|h| self.node_mut(h)) {
            Some(head) => head.prev = Some(idx),
            None => self.tail = Some(idx),
        }
        self.head = Some(idx);
    }

    fn unlink(&mut self, idx: usize) {
        let Some((prev, next)) = self
            .node_mut(idx)
            .map(|node| (node.prev.take(), node.next.take()))
        else {
            return;
        };
        match prev.and_then(|p| self.node_mut(p)) {
            Some(node) => node.next = next,
            None => self.head = next,
        }
        match next.and_then(|n| self.node_mut(n)) {
            Some(node) => node.prev = prev,
            None => self.tail = prev,
        }
    }
}

/// Iterator over a [`RecencyList`], most recently used first.
pub struct Iter<'a, T> {
    list: &'a RecencyList<T>,
    cursor: Option<usize>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.list.node(self.cursor?)?;
        self.cursor = node.next;
        Some(&node.value)
    }
}
