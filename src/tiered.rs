//! Tier-orchestration policy.
//!
//! [`TieredCache`] owns the memory partitions and the disk store and
//! sequences per-tier operations to implement spill-on-full and
//! promote-on-disk-hit. It holds no lock of its own: all synchronization is
//! delegated to the partitions and the disk store, which means a benign race
//! is possible between a memory-miss and a concurrent promotion of the same
//! key — see the module-level note on `get`.

use crate::disk::DiskStore;
use crate::error::{CacheError, CacheResult};
use crate::hash::partition_index;
use crate::memory::{MemoryPartition, PutOutcome};

/// Outcome of a [`TieredCache::put`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutResult {
    /// The entry is now resident in memory.
    Stored,
    /// The entry is larger than a single partition's total capacity.
    TooLarge,
}

/// Outcome of a [`TieredCache::evict`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictResult {
    Removed,
    NotFound,
}

/// Orchestrates `P` memory partitions plus one disk store.
pub struct TieredCache {
    partitions: Vec<MemoryPartition>,
    disk: DiskStore,
}

impl TieredCache {
    /// Builds a cache with `partitions.len()` memory partitions (each
    /// already sized per the spec's `⌊total / P⌋` rule) and the given disk
    /// store.
    pub fn new(partitions: Vec<MemoryPartition>, disk: DiskStore) -> Self {
        assert!(
            (1..=64).contains(&partitions.len()),
            "partition count must be in 1..=64"
        );
        TieredCache { partitions, disk }
    }

    /// Number of memory partitions.
    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    /// Read-only access to a partition, for the status reporter.
    pub fn partition(&self, index: usize) -> &MemoryPartition {
        &self.partitions[index]
    }

    fn partition_for(&self, key: &[u8]) -> &MemoryPartition {
        &self.partitions[partition_index(key, self.partitions.len())]
    }

    /// Spills the tail of `partition` to disk, repeating until at least
    /// `needed` bytes have been freed or the partition is empty.
    ///
    /// Per the spec this is normative: a spill must free enough room for the
    /// incoming entry, or the caller must surface `SpillFailed` without
    /// having mutated any state beyond the spills that already completed.
    fn spill_until(&self, partition: &MemoryPartition, needed: usize) -> CacheResult<()> {
        loop {
            if partition.capacity_bytes() - partition.used_bytes() >= needed {
                return Ok(());
            }
            let victim = match partition.peek_tail() {
                Some(snapshot) => snapshot,
                None => {
                    // Nothing left to spill; the caller's entry cannot fit.
                    return Ok(());
                }
            };
            self.disk
                .put(&victim.key, &victim.value)
                .map_err(|e| CacheError::SpillFailed(e.to_string()))?;
            partition.pop_tail();
        }
    }

    /// Inserts or overwrites `key`, spilling LRU entries to disk as needed
    /// to make room.
    pub fn put(&self, key: &[u8], value: &[u8]) -> CacheResult<PutResult> {
        let partition = self.partition_for(key);

        if value.len() + key.len() > partition.capacity_bytes() {
            return Ok(PutResult::TooLarge);
        }

        loop {
            match partition.put(key, value)? {
                PutOutcome::Inserted | PutOutcome::Updated => {
                    // A stale copy may still sit on disk from an earlier
                    // spill of this same key; no key may be resident in both
                    // tiers at once.
                    self.disk.evict(key);
                    return Ok(PutResult::Stored);
                }
                PutOutcome::Full => {
                    // `spill_until` only returns once either enough room
                    // exists or the partition has been fully drained; since
                    // the entry already passed the `TooLarge` check above,
                    // a fully drained partition has more than enough room,
                    // so the retry below cannot observe `Full` again.
                    self.spill_until(partition, key.len() + value.len())?;
                }
            }
        }
    }

    /// Looks up `key`, checking memory first and falling back to the disk
    /// tier. A disk hit is promoted into memory and removed from disk so
    /// that no key is ever simultaneously resident in both tiers.
    ///
    /// Between the memory miss and the disk read, another thread may have
    /// already promoted this key; in that case the disk read may observe
    /// `NotFound`, which is treated as authoritative for this call (a benign,
    /// Redis-style race — see the spec's concurrency model).
    pub fn get(&self, key: &[u8]) -> CacheResult<Option<Vec<u8>>> {
        let partition = self.partition_for(key);

        if let Some(value) = partition.get(key) {
            return Ok(Some(value));
        }

        let disk_value = match self.disk.get(key)? {
            Some(value) => value,
            None => return Ok(None),
        };

        match partition.put(key, &disk_value)? {
            PutOutcome::Inserted | PutOutcome::Updated => {
                self.disk.evict(key);
            }
            PutOutcome::Full => {
                self.spill_until(partition, key.len() + disk_value.len())?;
                match partition.put(key, &disk_value)? {
                    PutOutcome::Inserted | PutOutcome::Updated => {
                        self.disk.evict(key);
                    }
                    PutOutcome::Full => {
                        // Could not make room; leave the disk copy in place
                        // and still serve the value to the caller.
                    }
                }
            }
        }

        Ok(Some(disk_value))
    }

    /// Removes `key` from whichever tier holds it.
    pub fn evict(&self, key: &[u8]) -> EvictResult {
        let partition = self.partition_for(key);
        if partition.evict(key) {
            return EvictResult::Removed;
        }
        if self.disk.evict(key) {
            return EvictResult::Removed;
        }
        EvictResult::NotFound
    }

    /// Returns `true` iff `key` is resident in memory or on disk, without
    /// affecting LRU order or promoting a disk entry.
    pub fn exists(&self, key: &[u8]) -> CacheResult<bool> {
        let partition = self.partition_for(key);
        if partition.contains(key) {
            return Ok(true);
        }
        Ok(self.disk.get(key)?.is_some())
    }

    /// Number of keys resident in memory across all partitions. Disk-tier
    /// entries are intentionally excluded.
    pub fn dbsize(&self) -> usize {
        self.partitions.iter().map(|p| p.len()).sum()
    }

    /// Evicts every key from every memory partition and destroys and
    /// recreates the disk store's base directory.
    pub fn flush_all(&self) -> CacheResult<()> {
        for partition in &self.partitions {
            while partition.pop_tail().is_some() {}
        }
        self.disk.destroy();
        self.disk.recreate_base_dir()?;
        Ok(())
    }

    /// Recursively removes all partitions' state (implicitly, by dropping
    /// them) and the disk store's base directory. Called once at shutdown.
    pub fn shutdown(&self) {
        self.disk.destroy();
    }
}
