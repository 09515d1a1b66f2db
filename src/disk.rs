//! The on-disk content-addressable overflow store (CAS).
//!
//! Every key maps deterministically to a four-level directory path derived
//! from the first 64 hex characters of its SHA-256 digest, split into
//! 16-character segments. The disk tier is ephemeral scratch space: nothing
//! here is expected to survive a restart, and [`DiskStore::destroy`] removes
//! the whole tree on shutdown.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use rand::Rng;

use crate::error::CacheResult;
use crate::hash::sha256_hex;

const VALUE_FILE: &str = "value.dat";
const TIME_FILE: &str = "time.dat";

/// Four 16-character slices of a key's SHA-256 hex digest.
struct PathSegments {
    s0: String,
    s1: String,
    s2: String,
    s3: String,
}

fn segments_for(key: &[u8]) -> PathSegments {
    let digest = sha256_hex(key);
    PathSegments {
        s0: digest[0..16].to_string(),
        s1: digest[16..32].to_string(),
        s2: digest[32..48].to_string(),
        s3: digest[48..64].to_string(),
    }
}

/// Registry of leaf directories currently holding data. Consulted only by
/// `destroy` and iteration, never for get/put/evict correctness — those
/// derive paths straight from the key.
struct Registry {
    base_dir: PathBuf,
    leaves: Vec<PathBuf>,
}

/// The content-addressable disk tier.
pub struct DiskStore {
    registry: Mutex<Registry>,
}

impl DiskStore {
    /// Creates the base directory under `fsroot`, named
    /// `podcache-<8 random hex digits>`, and returns a fresh, empty store.
    pub fn new(fsroot: &Path) -> CacheResult<Self> {
        let suffix: u32 = rand::thread_rng().gen();
        let base_dir = fsroot.join(format!("podcache-{suffix:08x}"));
        fs::create_dir_all(&base_dir)?;
        Ok(DiskStore {
            registry: Mutex::new(Registry {
                base_dir,
                leaves: Vec::new(),
            }),
        })
    }

    /// The base directory this store writes under.
    pub fn base_dir(&self) -> PathBuf {
        self.registry.lock().base_dir.clone()
    }

    fn leaf_path(base_dir: &Path, segments: &PathSegments) -> PathBuf {
        base_dir
            .join(&segments.s0)
            .join(&segments.s1)
            .join(&segments.s2)
            .join(&segments.s3)
    }

    /// Writes `value` under the path derived from `key`, replacing any
    /// stale data left at that leaf (SHA-256 collisions are not expected,
    /// but a leaf left over from a prior differently-keyed run must not be
    /// silently reused).
    pub fn put(&self, key: &[u8], value: &[u8]) -> CacheResult<PathBuf> {
        let registry = self.registry.lock();
        let segments = segments_for(key);
        let leaf = Self::leaf_path(&registry.base_dir, &segments);
        drop(registry);

        if leaf.exists() {
            let _ = fs::remove_dir_all(&leaf);
        }

        let s0_dir = leaf.parent().unwrap().parent().unwrap().parent().unwrap();
        let s1_dir = leaf.parent().unwrap().parent().unwrap();
        let s2_dir = leaf.parent().unwrap();
        for dir in [s0_dir, s1_dir, s2_dir] {
            match fs::create_dir(dir) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
                Err(e) => return Err(e.into()),
            }
        }
        fs::create_dir(&leaf)?;

        let write_result = (|| -> std::io::Result<()> {
            fs::write(leaf.join(VALUE_FILE), value)?;
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs();
            fs::write(leaf.join(TIME_FILE), now.to_string())?;
            Ok(())
        })();

        if let Err(e) = write_result {
            let _ = fs::remove_dir_all(&leaf);
            return Err(e.into());
        }

        let mut registry = self.registry.lock();
        registry.leaves.push(leaf.clone());
        Ok(leaf)
    }

    /// Reads the value stored under `key`, if any.
    pub fn get(&self, key: &[u8]) -> CacheResult<Option<Vec<u8>>> {
        let base_dir = self.registry.lock().base_dir.clone();
        let segments = segments_for(key);
        let leaf = Self::leaf_path(&base_dir, &segments);
        match fs::read(leaf.join(VALUE_FILE)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Removes the entry stored under `key`, if any. Returns whether
    /// anything was removed.
    pub fn evict(&self, key: &[u8]) -> bool {
        let base_dir = self.registry.lock().base_dir.clone();
        let segments = segments_for(key);
        let leaf = Self::leaf_path(&base_dir, &segments);

        let value_removed = fs::remove_file(leaf.join(VALUE_FILE)).is_ok();
        let _ = fs::remove_file(leaf.join(TIME_FILE));
        let _ = fs::remove_dir(&leaf);
        // Ancestor segments may be shared by other keys; only remove them
        // when they're already empty, and tolerate failure otherwise.
        if let Some(s2_dir) = leaf.parent() {
            let _ = fs::remove_dir(s2_dir);
            if let Some(s1_dir) = s2_dir.parent() {
                let _ = fs::remove_dir(s1_dir);
                if let Some(s0_dir) = s1_dir.parent() {
                    let _ = fs::remove_dir(s0_dir);
                }
            }
        }

        if value_removed {
            let mut registry = self.registry.lock();
            registry.leaves.retain(|l| l != &leaf);
        }
        value_removed
    }

    /// Recursively deletes the base directory and all contents. Called once
    /// at shutdown; the store must not be used afterward.
    pub fn destroy(&self) {
        let base_dir = self.registry.lock().base_dir.clone();
        let _ = fs::remove_dir_all(&base_dir);
    }

    /// Re-creates the (already-named) base directory after `destroy` and
    /// clears the registry. Used by `FLUSHALL`, which is the only command
    /// that touches the disk store's lifecycle outside of shutdown.
    pub fn recreate_base_dir(&self) -> CacheResult<()> {
        let mut registry = self.registry.lock();
        fs::create_dir_all(&registry.base_dir)?;
        registry.leaves.clear();
        Ok(())
    }

    /// Number of leaf entries the registry currently tracks.
    #[cfg(test)]
    pub fn registry_len(&self) -> usize {
        self.registry.lock().leaves.len()
    }
}
