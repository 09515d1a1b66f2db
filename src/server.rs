//! The accept loop and per-connection handler.
//!
//! One OS thread runs the accept loop; each accepted connection gets its own
//! handler thread reading and writing RESP frames against a shared
//! [`TieredCache`]. There is no async runtime here — the spec calls for a
//! thread-per-connection model, a deliberate departure from this codebase's
//! usual `tokio` transport layer.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use uuid::Uuid;

use crate::protocol::{dispatch, try_parse_command, DecodeOutcome, DispatchOutcome, PROTOCOL_ERROR_REPLY};
use crate::tiered::TieredCache;

/// Connections are read in chunks this large and accumulated until a full
/// command can be parsed.
const READ_CHUNK_BYTES: usize = 16 * 1024;
/// Backlog passed to `TcpListener::bind`'s underlying `listen(2)`.
const LISTEN_BACKLOG: u32 = 128;

/// Runs the accept loop on the calling thread until `stop` is set, spawning
/// one handler thread per accepted connection.
///
/// Binding failures are fatal (the caller should abort startup); per-
/// connection errors are logged and only end that connection.
pub fn serve(
    port: u16,
    cache: Arc<TieredCache>,
    stop: Arc<AtomicBool>,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port))?;
    // Poll the stop flag between accepts rather than blocking forever on
    // `accept`; the listener backlog absorbs load in the meantime.
    listener.set_nonblocking(true)?;
    log::info!("listening on 0.0.0.0:{port} (backlog {LISTEN_BACKLOG})");

    let mut handles = Vec::new();
    while !stop.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok((stream, addr)) => {
                let cache = Arc::clone(&cache);
                let conn_id = Uuid::new_v4();
                log::debug!("{conn_id} accepted connection from {addr}");
                handles.push(thread::spawn(move || handle_connection(conn_id, stream, cache)));
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(std::time::Duration::from_millis(25));
            }
            Err(e) => {
                log::error!("accept error: {e}");
            }
        }
    }

    for handle in handles {
        let _ = handle.join();
    }
    Ok(())
}

fn handle_connection(conn_id: Uuid, mut stream: TcpStream, cache: Arc<TieredCache>) {
    let mut buf = Vec::with_capacity(READ_CHUNK_BYTES);
    let mut chunk = [0u8; READ_CHUNK_BYTES];

    loop {
        match try_parse_command(&buf) {
            Ok(DecodeOutcome::Complete { command, consumed }) => {
                let outcome = dispatch(&cache, &command);
                let (reply, close) = match outcome {
                    DispatchOutcome::Continue(reply) => (reply, false),
                    DispatchOutcome::Close(reply) => (reply, true),
                };
                // A write error (e.g. the peer went away) just ends the
                // connection; there is no SIGPIPE handler to install
                // because Rust doesn't deliver it to the process by default.
                if stream.write_all(&reply.encode()).is_err() {
                    return;
                }
                buf.drain(..consumed);
                if close {
                    return;
                }
                continue;
            }
            Ok(DecodeOutcome::Incomplete) => {}
            Err(_) => {
                let _ = stream.write_all(PROTOCOL_ERROR_REPLY);
                log::debug!("{conn_id} closing connection after a protocol error");
                return;
            }
        }

        match stream.read(&mut chunk) {
            Ok(0) => return,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                log::debug!("{conn_id} read error: {e}");
                return;
            }
        }
    }
}
