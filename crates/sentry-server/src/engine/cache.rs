//! Fixed-capacity sharded LRU cache.
//!
//! Each shard is an index-linked list over a slab plus a key -> slot map, so
//! `get`, `insert` and eviction are O(1). Shards have their own lock; callers
//! hashing to different shards never contend.

use std::collections::hash_map::RandomState;
use std::collections::HashMap;
use std::hash::BuildHasher;

use parking_lot::Mutex;

const NIL: usize = usize::MAX;

#[derive(Debug)]
struct Node<V> {
    key: String,
    value: V,
    prev: usize,
    next: usize,
}

#[derive(Debug)]
struct Shard<V> {
    map: HashMap<String, usize>,
    nodes: Vec<Node<V>>,
    head: usize, // most recent
    tail: usize, // least recent
    capacity: usize,
}

impl<V> Shard<V> {
    fn new(capacity: usize) -> Self {
        Self {
            // grows on demand up to `capacity`
            map: HashMap::new(),
            nodes: Vec::new(),
            head: NIL,
            tail: NIL,
            capacity,
        }
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = (self.nodes[idx].prev, self.nodes[idx].next);
        if prev == NIL {
            self.head = next;
        } else {
            self.nodes[prev].next = next;
        }
        if next == NIL {
            self.tail = prev;
        } else {
            self.nodes[next].prev = prev;
        }
    }

    fn push_front(&mut self, idx: usize) {
        self.nodes[idx].prev = NIL;
        self.nodes[idx].next = self.head;
        if self.head != NIL {
            self.nodes[self.head].prev = idx;
        }
        self.head = idx;
        if self.tail == NIL {
            self.tail = idx;
        }
    }

    fn get(&mut self, key: &str) -> Option<&V> {
        let idx = *self.map.get(key)?;
        if self.head != idx {
            self.unlink(idx);
            self.push_front(idx);
        }
        Some(&self.nodes[idx].value)
    }

    fn insert(&mut self, key: String, value: V) {
        if self.capacity == 0 {
            return;
        }

        if let Some(&idx) = self.map.get(&key) {
            self.nodes[idx].value = value;
            if self.head != idx {
                self.unlink(idx);
                self.push_front(idx);
            }
            return;
        }

        let idx = if self.map.len() >= self.capacity {
            // reuse the least recently used slot
            let victim = self.tail;
            self.unlink(victim);
            let old = std::mem::replace(&mut self.nodes[victim].key, key.clone());
            self.map.remove(&old);
            self.nodes[victim].value = value;
            victim
        } else {
            self.nodes.push(Node { key: key.clone(), value, prev: NIL, next: NIL });
            self.nodes.len() - 1
        };

        self.push_front(idx);
        self.map.insert(key, idx);
    }

    fn clear(&mut self) {
        self.map.clear();
        self.nodes.clear();
        self.head = NIL;
        self.tail = NIL;
    }
}

/// Sharded LRU keyed by string.
#[derive(Debug)]
pub struct LruCache<V> {
    shards: Box<[Mutex<Shard<V>>]>,
    hasher: RandomState,
    capacity: usize,
}

impl<V: Clone> LruCache<V> {
    /// `capacity` is split exactly across at most `shards` shards.
    /// A capacity of 0 yields a cache that stores nothing.
    pub fn new(capacity: usize, shards: usize) -> Self {
        let n = shards.clamp(1, capacity.max(1));
        let base = capacity / n;
        let extra = capacity % n;
        let shards = (0..n)
            .map(|i| Mutex::new(Shard::new(base + usize::from(i < extra))))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            shards,
            hasher: RandomState::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_enabled(&self) -> bool {
        self.capacity > 0
    }

    fn shard(&self, key: &str) -> &Mutex<Shard<V>> {
        let idx = (self.hasher.hash_one(key) as usize) % self.shards.len();
        &self.shards[idx]
    }

    /// Clone of the cached value; marks the key most recently used.
    pub fn get(&self, key: &str) -> Option<V> {
        if !self.is_enabled() {
            return None;
        }
        self.shard(key).lock().get(key).cloned()
    }

    pub fn insert(&self, key: String, value: V) {
        if !self.is_enabled() {
            return;
        }
        self.shard(&key).lock().insert(key, value);
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.lock().map.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        for s in self.shards.iter() {
            s.lock().clear();
        }
    }
}
