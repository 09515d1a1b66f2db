//! Environment-driven configuration.
//!
//! PodCache takes no CLI arguments; every knob is an environment variable.
//! Out-of-range or unparseable values fall back to the documented default
//! with a warning log, never a startup failure — only resource exhaustion
//! while standing up the cache itself is a fatal startup error.

use std::path::PathBuf;

const DEFAULT_SIZE_MIB: u32 = 100;
const MIN_SIZE_MIB: u32 = 1;
const MAX_SIZE_MIB: u32 = 4096;

const DEFAULT_SERVER_PORT: u16 = 6379;
const MIN_SERVER_PORT: u16 = 1024;

const DEFAULT_PARTITIONS: u32 = 1;
const MIN_PARTITIONS: u32 = 1;
const MAX_PARTITIONS: u32 = 64;

const DEFAULT_FSROOT: &str = "./";

/// Resolved, validated runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Total memory budget across all partitions, in bytes.
    pub total_capacity_bytes: usize,
    /// TCP port the accept loop listens on.
    pub server_port: u16,
    /// Number of independently-locked memory partitions.
    pub partitions: usize,
    /// Parent directory for the disk tier's randomly-suffixed base dir.
    pub fsroot: PathBuf,
}

impl Config {
    /// Builds a `Config` from `PODCACHE_*` environment variables, falling
    /// back to defaults (with a warning log) for anything missing,
    /// unparseable, or out of range.
    pub fn from_env() -> Self {
        let size_mib = read_bounded_u32(
            "PODCACHE_SIZE",
            DEFAULT_SIZE_MIB,
            MIN_SIZE_MIB,
            MAX_SIZE_MIB,
        );
        let server_port = read_bounded_port("PODCACHE_SERVER_PORT", DEFAULT_SERVER_PORT);
        let partitions = read_bounded_u32(
            "PODCACHE_PARTITIONS",
            DEFAULT_PARTITIONS,
            MIN_PARTITIONS,
            MAX_PARTITIONS,
        );
        let fsroot = std::env::var("PODCACHE_FSROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_FSROOT));

        let total_capacity_bytes = size_mib as usize * 1024 * 1024;

        Config {
            total_capacity_bytes,
            server_port,
            partitions: partitions as usize,
            fsroot,
        }
    }

    /// Capacity assigned to each individual memory partition.
    ///
    /// `⌊total_capacity_bytes / partitions⌋`, per the spec's partition
    /// sizing rule.
    pub fn per_partition_capacity_bytes(&self) -> usize {
        self.total_capacity_bytes / self.partitions
    }
}

fn read_bounded_u32(name: &str, default: u32, min: u32, max: u32) -> u32 {
    match std::env::var(name) {
        Ok(raw) => match raw.parse::<u32>() {
            Ok(value) if (min..=max).contains(&value) => value,
            Ok(value) => {
                log::warn!(
                    "{name}={value} out of range [{min}, {max}]; using default {default}"
                );
                default
            }
            Err(_) => {
                log::warn!("{name}={raw:?} is not a valid integer; using default {default}");
                default
            }
        },
        Err(_) => default,
    }
}

fn read_bounded_port(name: &str, default: u16) -> u16 {
    match std::env::var(name) {
        Ok(raw) => match raw.parse::<u32>() {
            Ok(value) if (MIN_SERVER_PORT as u32..=u16::MAX as u32).contains(&value) => {
                value as u16
            }
            Ok(value) => {
                log::warn!(
                    "{name}={value} out of range [{MIN_SERVER_PORT}, {}]; using default {default}",
                    u16::MAX
                );
                default
            }
            Err(_) => {
                log::warn!("{name}={raw:?} is not a valid integer; using default {default}");
                default
            }
        },
        Err(_) => default,
    }
}
