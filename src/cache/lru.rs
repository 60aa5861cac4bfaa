//! LRU Table Module
//!
//! Access-ordered map used as the cache's entry table.

use std::collections::HashMap;

// == Node ==
#[derive(Debug)]
struct Node<V> {
    key: String,
    value: V,
    prev: Option<usize>,
    next: Option<usize>,
}

// == LRU Table ==
/// Key-value map that remembers access order.
///
/// Nodes live in an arena and are threaded onto a doubly-linked list:
/// - Head = Least recently used
/// - Tail = Most recently used
///
/// A hash index maps keys to arena slots, so insert, touch, remove and
/// eviction of the head are all O(1).
#[derive(Debug)]
pub struct LruTable<V> {
    /// Arena of nodes; `None` marks a free slot
    nodes: Vec<Option<Node<V>>>,
    /// Free arena slots available for reuse
    free: Vec<usize>,
    /// Key to arena slot
    index: HashMap<String, usize>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl<V> Default for LruTable<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> LruTable<V> {
    // == Constructor ==
    /// Creates a new empty table.
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
            index: HashMap::new(),
            head: None,
            tail: None,
        }
    }

    // == Length ==
    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    // == Is Empty ==
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    // == Contains ==
    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    // == Lookup ==
    /// Returns the value for `key` without changing its position.
    pub fn get(&self, key: &str) -> Option<&V> {
        let slot = *self.index.get(key)?;
        self.nodes[slot].as_ref().map(|node| &node.value)
    }

    /// Mutable lookup without changing position.
    pub fn get_mut(&mut self, key: &str) -> Option<&mut V> {
        let slot = *self.index.get(key)?;
        self.nodes[slot].as_mut().map(|node| &mut node.value)
    }

    // == Touch ==
    /// Moves `key` to the most recently used end.
    ///
    /// Returns false if the key is not present.
    pub fn touch(&mut self, key: &str) -> bool {
        match self.index.get(key) {
            Some(&slot) => {
                self.unlink(slot);
                self.push_back(slot);
                true
            }
            None => false,
        }
    }

    // == Insert ==
    /// Returns the value for `key`, inserting `make()` at the most recently
    /// used end if it is absent. An existing key keeps its position.
    pub fn get_or_insert_with<F>(&mut self, key: &str, make: F) -> &mut V
    where
        F: FnOnce() -> V,
    {
        let slot = match self.index.get(key) {
            Some(&slot) => slot,
            None => {
                let node = Node {
                    key: key.to_string(),
                    value: make(),
                    prev: None,
                    next: None,
                };
                let slot = match self.free.pop() {
                    Some(slot) => {
                        self.nodes[slot] = Some(node);
                        slot
                    }
                    None => {
                        self.nodes.push(Some(node));
                        self.nodes.len() - 1
                    }
                };
                self.index.insert(key.to_string(), slot);
                self.push_back(slot);
                slot
            }
        };
        // Slot was just resolved through the index, so it is occupied.
        &mut self.nodes[slot].as_mut().expect("indexed slot is occupied").value
    }

    // == Remove ==
    /// Removes a key, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<V> {
        let slot = self.index.remove(key)?;
        self.unlink(slot);
        let node = self.nodes[slot].take()?;
        self.free.push(slot);
        Some(node.value)
    }

    // == Peek Oldest ==
    /// Returns the least recently used key without removing it.
    pub fn peek_oldest(&self) -> Option<&str> {
        self.head
            .and_then(|slot| self.nodes[slot].as_ref())
            .map(|node| node.key.as_str())
    }

    // == Iteration ==
    /// Iterates from least to most recently used.
    pub fn iter(&self) -> Iter<'_, V> {
        Iter {
            table: self,
            cursor: self.head,
        }
    }

    /// Keys from least to most recently used.
    pub fn keys(&self) -> Vec<String> {
        self.iter().map(|(key, _)| key.to_string()).collect()
    }

    // == List Plumbing ==
    fn unlink(&mut self, slot: usize) {
        let (prev, next) = match self.nodes[slot].as_ref() {
            Some(node) => (node.prev, node.next),
            None => return,
        };
        match prev {
            Some(p) => {
                if let Some(node) = self.nodes[p].as_mut() {
                    node.next = next;
                }
            }
            None => self.head = next,
        }
        match next {
            Some(n) => {
                if let Some(node) = self.nodes[n].as_mut() {
                    node.prev = prev;
                }
            }
            None => self.tail = prev,
        }
        if let Some(node) = self.nodes[slot].as_mut() {
            node.prev = None;
            node.next = None;
        }
    }

    fn push_back(&mut self, slot: usize) {
        let old_tail = self.tail;
        if let Some(node) = self.nodes[slot].as_mut() {
            node.prev = old_tail;
            node.next = None;
        }
        match old_tail {
            Some(t) => {
                if let Some(node) = self.nodes[t].as_mut() {
                    node.next = Some(slot);
                }
            }
            None => self.head = Some(slot),
        }
        self.tail = Some(slot);
    }
}

// == Iterator ==
/// Iterator over `(key, value)` pairs in LRU order.
pub struct Iter<'a, V> {
    table: &'a LruTable<V>,
    cursor: Option<usize>,
}

impl<'a, V> Iterator for Iter<'a, V> {
    type Item = (&'a str, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let slot = self.cursor?;
        let node = self.table.nodes[slot].as_ref()?;
        self.cursor = node.next;
        Some((node.key.as_str(), &node.value))
    }
}
