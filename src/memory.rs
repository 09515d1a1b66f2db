//! The in-memory LRU tier.
//!
//! Each [`MemoryPartition`] is a single-lock LRU: a hash table with open
//! chaining for O(1) lookup and a doubly-linked recency list for O(1)
//! promotion to head and O(1) eviction from the tail. Both indexes are
//! index-based into a dense node arena rather than pointer-based, so no
//! `unsafe` is needed to keep a node reachable from two structures at once.

use std::time::Instant;

use parking_lot::Mutex;

use crate::error::{CacheError, CacheResult};
use crate::hash::bucket_index;

const MIN_BUCKETS: usize = 16;
const MAX_BUCKETS: usize = 65536;
const LOAD_FACTOR: f64 = 0.75;

/// Result of a [`MemoryPartition::put`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// A new key was inserted at the head of the recency list.
    Inserted,
    /// An existing key's value was replaced; the node moved to head.
    Updated,
    /// The partition lacks room; no state was modified.
    Full,
}

/// An owned copy of a resident entry, returned by `peek_tail`/`pop_tail`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

/// One resident entry, reachable from both the bucket chain and the
/// recency list via arena indices.
struct Node {
    key: Box<[u8]>,
    value: Box<[u8]>,
    #[allow(dead_code)] // informational only, per the spec's data model
    created_at: Instant,
    prev: Option<usize>,
    next: Option<usize>,
    bucket_next: Option<usize>,
}

/// Byte-accounting function shared by insert, overwrite, and eviction, per
/// the spec's requirement that all three paths use the same formula.
fn entry_size(key: &[u8], value: &[u8]) -> usize {
    key.len() + value.len()
}

/// Computes a power-of-two bucket count from a partition's byte capacity,
/// targeting a 0.75 load factor and clamped to `[16, 65536]`.
pub fn bucket_count_for_capacity(capacity_bytes: usize) -> usize {
    let estimated_entries = (capacity_bytes / 1024).max(1);
    let target = (estimated_entries as f64 / LOAD_FACTOR).ceil() as usize;
    target.max(1).next_power_of_two().clamp(MIN_BUCKETS, MAX_BUCKETS)
}

struct Inner {
    nodes: Vec<Option<Node>>,
    free: Vec<usize>,
    buckets: Vec<Option<usize>>,
    head: Option<usize>,
    tail: Option<usize>,
    used_bytes: usize,
    count: usize,
}

impl Inner {
    fn new(bucket_count: usize) -> Self {
        Inner {
            nodes: Vec::new(),
            free: Vec::new(),
            buckets: vec![None; bucket_count],
            head: None,
            tail: None,
            used_bytes: 0,
            count: 0,
        }
    }

    fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    fn find(&self, key: &[u8]) -> Option<usize> {
        let bucket = bucket_index(key, self.bucket_count());
        let mut cursor = self.buckets[bucket];
        while let Some(idx) = cursor {
            let node = self.nodes[idx].as_ref().expect("bucket chain points to live node");
            if node.key.as_ref() == key {
                return Some(idx);
            }
            cursor = node.bucket_next;
        }
        None
    }

    fn bucket_insert(&mut self, idx: usize) {
        let bucket = bucket_index(&self.nodes[idx].as_ref().unwrap().key, self.bucket_count());
        let head = self.buckets[bucket];
        self.nodes[idx].as_mut().unwrap().bucket_next = head;
        self.buckets[bucket] = Some(idx);
    }

    fn bucket_remove(&mut self, idx: usize) {
        let key = self.nodes[idx].as_ref().unwrap().key.clone();
        let bucket = bucket_index(&key, self.bucket_count());
        let mut cursor = self.buckets[bucket];
        let mut prev: Option<usize> = None;
        while let Some(cur) = cursor {
            let next = self.nodes[cur].as_ref().unwrap().bucket_next;
            if cur == idx {
                match prev {
                    Some(p) => self.nodes[p].as_mut().unwrap().bucket_next = next,
                    None => self.buckets[bucket] = next,
                }
                return;
            }
            prev = Some(cur);
            cursor = next;
        }
    }

    fn lru_unlink(&mut self, idx: usize) {
        let (prev, next) = {
            let node = self.nodes[idx].as_ref().unwrap();
            (node.prev, node.next)
        };
        match prev {
            Some(p) => self.nodes[p].as_mut().unwrap().next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.nodes[n].as_mut().unwrap().prev = prev,
            None => self.tail = prev,
        }
        let node = self.nodes[idx].as_mut().unwrap();
        node.prev = None;
        node.next = None;
    }

    fn lru_push_front(&mut self, idx: usize) {
        let old_head = self.head;
        {
            let node = self.nodes[idx].as_mut().unwrap();
            node.prev = None;
            node.next = old_head;
        }
        if let Some(h) = old_head {
            self.nodes[h].as_mut().unwrap().prev = Some(idx);
        } else {
            self.tail = Some(idx);
        }
        self.head = Some(idx);
    }

    fn move_to_front(&mut self, idx: usize) {
        if self.head == Some(idx) {
            return;
        }
        self.lru_unlink(idx);
        self.lru_push_front(idx);
    }

    fn alloc_slot(&mut self) -> CacheResult<usize> {
        if let Some(idx) = self.free.pop() {
            return Ok(idx);
        }
        self.nodes
            .try_reserve(1)
            .map_err(|_| CacheError::AllocError)?;
        self.nodes.push(None);
        Ok(self.nodes.len() - 1)
    }

    fn remove_node(&mut self, idx: usize) -> Snapshot {
        self.lru_unlink(idx);
        self.bucket_remove(idx);
        let node = self.nodes[idx].take().expect("node exists");
        self.used_bytes -= entry_size(&node.key, &node.value);
        self.count -= 1;
        self.free.push(idx);
        Snapshot {
            key: node.key.into_vec(),
            value: node.value.into_vec(),
        }
    }
}

/// A single independently-locked shard of the in-memory cache.
pub struct MemoryPartition {
    capacity_bytes: usize,
    inner: Mutex<Inner>,
}

impl MemoryPartition {
    /// Creates a partition with the given fixed byte capacity.
    pub fn new(capacity_bytes: usize) -> Self {
        let buckets = bucket_count_for_capacity(capacity_bytes);
        MemoryPartition {
            capacity_bytes,
            inner: Mutex::new(Inner::new(buckets)),
        }
    }

    /// Fixed capacity this partition was constructed with.
    pub fn capacity_bytes(&self) -> usize {
        self.capacity_bytes
    }

    /// Current resident byte usage.
    pub fn used_bytes(&self) -> usize {
        self.inner.lock().used_bytes
    }

    /// Number of resident entries.
    pub fn len(&self) -> usize {
        self.inner.lock().count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns whether `key` is currently resident, without affecting LRU
    /// order.
    pub fn contains(&self, key: &[u8]) -> bool {
        self.inner.lock().find(key).is_some()
    }

    /// Inserts or overwrites `key` with `value`.
    ///
    /// Never evicts on its own — see [`PutOutcome::Full`]. Making room is the
    /// orchestrator's job.
    pub fn put(&self, key: &[u8], value: &[u8]) -> CacheResult<PutOutcome> {
        let mut inner = self.inner.lock();

        if let Some(idx) = inner.find(key) {
            let old_size = {
                let node = inner.nodes[idx].as_ref().unwrap();
                entry_size(&node.key, &node.value)
            };
            let new_size = entry_size(key, value);
            let projected = inner.used_bytes - old_size + new_size;
            if projected > self.capacity_bytes {
                return Ok(PutOutcome::Full);
            }

            inner.nodes[idx].as_mut().unwrap().value = value.to_vec().into_boxed_slice();
            inner.used_bytes = projected;
            inner.move_to_front(idx);
            return Ok(PutOutcome::Updated);
        }

        let new_size = entry_size(key, value);
        if inner.used_bytes + new_size > self.capacity_bytes {
            return Ok(PutOutcome::Full);
        }

        let idx = inner.alloc_slot()?;
        inner.nodes[idx] = Some(Node {
            key: key.to_vec().into_boxed_slice(),
            value: value.to_vec().into_boxed_slice(),
            created_at: Instant::now(),
            prev: None,
            next: None,
            bucket_next: None,
        });
        inner.bucket_insert(idx);
        inner.lru_push_front(idx);
        inner.used_bytes += new_size;
        inner.count += 1;
        Ok(PutOutcome::Inserted)
    }

    /// Looks up `key`, promoting it to head on hit.
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        let mut inner = self.inner.lock();
        let idx = inner.find(key)?;
        inner.move_to_front(idx);
        Some(inner.nodes[idx].as_ref().unwrap().value.to_vec())
    }

    /// Removes `key` if present. Returns whether anything was removed.
    pub fn evict(&self, key: &[u8]) -> bool {
        let mut inner = self.inner.lock();
        match inner.find(key) {
            Some(idx) => {
                inner.remove_node(idx);
                true
            }
            None => false,
        }
    }

    /// Returns a copy of the least-recently-used entry without removing it.
    pub fn peek_tail(&self) -> Option<Snapshot> {
        let inner = self.inner.lock();
        let idx = inner.tail?;
        let node = inner.nodes[idx].as_ref().unwrap();
        Some(Snapshot {
            key: node.key.to_vec(),
            value: node.value.to_vec(),
        })
    }

    /// Removes and returns the least-recently-used entry.
    pub fn pop_tail(&self) -> Option<Snapshot> {
        let mut inner = self.inner.lock();
        let idx = inner.tail?;
        Some(inner.remove_node(idx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_get_roundtrips() {
        let partition = MemoryPartition::new(1024 * 1024);
        assert_eq!(partition.put(b"hello", b"world").unwrap(), PutOutcome::Inserted);
        assert_eq!(partition.get(b"hello"), Some(b"world".to_vec()));
    }

    #[test]
    fn overwrite_reports_updated_and_adjusts_bytes() {
        let partition = MemoryPartition::new(1024);
        partition.put(b"k", b"1234").unwrap();
        let before = partition.used_bytes();
        assert_eq!(partition.put(b"k", b"12").unwrap(), PutOutcome::Updated);
        assert_eq!(partition.used_bytes(), before - 2);
        assert_eq!(partition.get(b"k"), Some(b"12".to_vec()));
    }

    #[test]
    fn full_when_capacity_exceeded_without_mutation() {
        let partition = MemoryPartition::new(10);
        assert_eq!(partition.put(b"a", b"12345").unwrap(), PutOutcome::Inserted);
        let used_before = partition.used_bytes();
        assert!(matches!(partition.put(b"b", b"123456"), Ok(PutOutcome::Full)));
        assert_eq!(partition.used_bytes(), used_before);
        assert_eq!(partition.get(b"b"), None);
    }

    #[test]
    fn overwrite_growth_that_fits_succeeds() {
        let partition = MemoryPartition::new(10);
        partition.put(b"k", b"12").unwrap(); // used = 3
        assert!(matches!(partition.put(b"k", b"1234567"), Ok(PutOutcome::Updated))); // used = 8
        assert_eq!(partition.get(b"k"), Some(b"1234567".to_vec()));
    }

    #[test]
    fn overwrite_growth_that_overflows_is_rejected_unchanged() {
        let partition = MemoryPartition::new(10);
        partition.put(b"k", b"12").unwrap();
        assert!(matches!(partition.put(b"k", b"12345678901"), Ok(PutOutcome::Full)));
        assert_eq!(partition.get(b"k"), Some(b"12".to_vec()));
    }

    #[test]
    fn evict_removes_entry() {
        let partition = MemoryPartition::new(1024);
        partition.put(b"k", b"v").unwrap();
        assert!(partition.evict(b"k"));
        assert!(!partition.evict(b"k"));
        assert_eq!(partition.get(b"k"), None);
    }

    #[test]
    fn lru_ordering_victim_is_least_recently_used() {
        let partition = MemoryPartition::new(3);
        partition.put(b"a", b"1").unwrap();
        partition.put(b"b", b"1").unwrap();
        partition.put(b"c", b"1").unwrap();
        partition.get(b"a").unwrap();

        let tail = partition.peek_tail().unwrap();
        assert_eq!(tail.key, b"b");
    }

    #[test]
    fn pop_tail_unlinks_and_returns_victim() {
        let partition = MemoryPartition::new(1024);
        partition.put(b"a", b"1").unwrap();
        partition.put(b"b", b"2").unwrap();

        let victim = partition.pop_tail().unwrap();
        assert_eq!(victim.key, b"a");
        assert_eq!(partition.len(), 1);
        assert_eq!(partition.get(b"a"), None);
    }

    #[test]
    fn bucket_and_recency_sets_agree_after_churn() {
        let partition = MemoryPartition::new(1024);
        for i in 0..50u32 {
            partition.put(format!("key-{i}").as_bytes(), b"v").unwrap();
        }
        for i in (0..50u32).step_by(3) {
            partition.evict(format!("key-{i}").as_bytes());
        }
        let remaining_before_drain = partition.len();

        // Every node still reachable via the recency list must also be
        // reachable via a direct lookup (the bucket-chain index).
        let mut drained = 0;
        while let Some(victim) = partition.pop_tail() {
            drained += 1;
            assert!(!partition.evict(&victim.key), "node was already unlinked from its bucket chain");
        }
        assert_eq!(drained, remaining_before_drain);
        assert_eq!(partition.len(), 0);
    }

    #[test]
    fn used_bytes_matches_sum_of_resident_entries() {
        let partition = MemoryPartition::new(1024);
        let entries: &[(&[u8], &[u8])] =
            &[(b"a", b"11"), (b"b", b"222"), (b"c", b"3333")];
        for (k, v) in entries {
            partition.put(k, v).unwrap();
        }
        let expected: usize = entries.iter().map(|(k, v)| k.len() + v.len()).sum();
        assert_eq!(partition.used_bytes(), expected);
    }
}
