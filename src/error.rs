//! Crate-wide error taxonomy.
//!
//! Every layer below the protocol front-end returns `Result<T, CacheError>`
//! and propagates with `?`. Only [`crate::protocol`] translates a `CacheError`
//! into wire bytes — no other layer knows about RESP.

/// Unified error type for every PodCache component.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// A buffer or node could not be allocated.
    #[error("out of memory")]
    AllocError,

    /// The RESP framing layer encountered malformed input.
    #[error("protocol error")]
    ProtocolError,

    /// A command's arity or argument parsing failed.
    #[error("{0}")]
    ArgError(String),

    /// The entry is larger than the partition's total capacity.
    #[error("value too large")]
    TooLarge,

    /// A spill to the disk tier failed partway through.
    #[error("storage error: {0}")]
    SpillFailed(String),

    /// A disk-tier I/O operation failed.
    #[error("storage error: {0}")]
    DiskIo(#[from] std::io::Error),
}

/// Convenience alias used throughout the crate.
pub type CacheResult<T> = Result<T, CacheError>;
