//! Command dispatch: maps a decoded RESP command array onto [`TieredCache`]
//! operations and builds the reply.
//!
//! `CacheError` is translated into a wire-level `Reply::Error` only here;
//! every layer beneath this one returns a typed `CacheResult` and never
//! touches the wire format.

use crate::error::CacheError;
use crate::protocol::resp::Reply;
use crate::tiered::{EvictResult, PutResult, TieredCache};

/// What the connection loop should do after writing the reply.
pub enum DispatchOutcome {
    Continue(Reply),
    Close(Reply),
}

/// Dispatches one already-decoded command against `cache`.
pub fn dispatch(cache: &TieredCache, command: &[Vec<u8>]) -> DispatchOutcome {
    let name = match command.first() {
        Some(bytes) => bytes.to_ascii_uppercase(),
        None => return DispatchOutcome::Continue(Reply::Error("ERR empty command".into())),
    };
    let args = &command[1..];

    match name.as_slice() {
        b"PING" => fixed_arity(&name, args, 0, |_| Reply::Simple("PONG".into())),
        b"SET" => fixed_arity(&name, args, 2, |args| {
            reply_from_cache(cache.put(&args[0], &args[1]), |result| match result {
                PutResult::Stored => Reply::Simple("OK".into()),
                PutResult::TooLarge => Reply::Error("ERR value too large".into()),
            })
        }),
        b"GET" => fixed_arity(&name, args, 1, |args| {
            reply_from_cache(cache.get(&args[0]), |value| match value {
                Some(bytes) => Reply::Bulk(bytes),
                None => Reply::Nil,
            })
        }),
        b"DEL" | b"UNLINK" => fixed_arity(&name, args, 1, |args| {
            let removed = matches!(cache.evict(&args[0]), EvictResult::Removed);
            Reply::Integer(if removed { 1 } else { 0 })
        }),
        b"INCR" => fixed_arity(&name, args, 1, |args| incr(cache, &args[0])),
        b"EXISTS" => fixed_arity(&name, args, 1, |args| {
            reply_from_cache(cache.exists(&args[0]), |present| {
                Reply::Integer(if present { 1 } else { 0 })
            })
        }),
        b"DBSIZE" => fixed_arity(&name, args, 0, |_| Reply::Integer(cache.dbsize() as i64)),
        b"FLUSHALL" => fixed_arity(&name, args, 0, |_| {
            reply_from_cache(cache.flush_all(), |()| Reply::Simple("OK".into()))
        }),
        // Connection metadata is not tracked; acknowledge and ignore.
        b"CLIENT" => DispatchOutcome::Continue(Reply::Simple("OK".into())),
        b"QUIT" => DispatchOutcome::Close(Reply::Simple("OK BYE".into())),
        _ => DispatchOutcome::Continue(Reply::Error(format!(
            "ERR unknown command '{}'",
            String::from_utf8_lossy(&name)
        ))),
    }
}

/// Runs `handler` if `args.len() == arity`, otherwise replies with the
/// standard wrong-arity error. `handler` always produces a non-closing
/// reply; only `QUIT` closes the connection.
fn fixed_arity(
    name: &[u8],
    args: &[Vec<u8>],
    arity: usize,
    handler: impl FnOnce(&[Vec<u8>]) -> Reply,
) -> DispatchOutcome {
    if args.len() != arity {
        return DispatchOutcome::Continue(arity_error(name));
    }
    DispatchOutcome::Continue(handler(args))
}

fn arity_error(name: &[u8]) -> Reply {
    Reply::Error(format!(
        "ERR wrong number of arguments for '{}' command",
        String::from_utf8_lossy(name)
    ))
}

fn reply_from_cache<T>(
    result: Result<T, CacheError>,
    on_ok: impl FnOnce(T) -> Reply,
) -> Reply {
    match result {
        Ok(value) => on_ok(value),
        Err(err) => cache_error_reply(&err),
    }
}

fn cache_error_reply(err: &CacheError) -> Reply {
    match err {
        CacheError::AllocError => Reply::Error("ERR out of memory".into()),
        CacheError::TooLarge => Reply::Error("ERR value too large".into()),
        CacheError::ArgError(message) => Reply::Error(format!("ERR {message}")),
        CacheError::SpillFailed(_) | CacheError::DiskIo(_) => {
            Reply::Error("ERR storage error".into())
        }
        CacheError::ProtocolError => Reply::Error("ERR protocol error".into()),
    }
}

/// `INCR key`: treats a missing key as `0`, parses the existing value as a
/// base-10 `i64` with no surrounding whitespace, and stores the decimal
/// string of the incremented value. Overflow is reported the same way as a
/// non-numeric existing value.
fn incr(cache: &TieredCache, key: &[u8]) -> Reply {
    let current = match cache.get(key) {
        Ok(value) => value,
        Err(err) => return cache_error_reply(&err),
    };

    let parsed: i64 = match &current {
        None => 0,
        Some(bytes) => match std::str::from_utf8(bytes).ok().and_then(|s| s.parse().ok()) {
            Some(n) => n,
            None => {
                return Reply::Error("ERR value is not an integer or out of range".into());
            }
        },
    };

    let next = match parsed.checked_add(1) {
        Some(n) => n,
        None => {
            return Reply::Error("ERR value is not an integer or out of range".into());
        }
    };

    match cache.put(key, next.to_string().as_bytes()) {
        Ok(PutResult::Stored) => Reply::Integer(next),
        Ok(PutResult::TooLarge) => Reply::Error("ERR value too large".into()),
        Err(err) => cache_error_reply(&err),
    }
}
