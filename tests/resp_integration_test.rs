//! End-to-end RESP wire tests: a real TCP connection against a live
//! `TieredCache` driven through `podcache::server`.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

static NEXT_PORT: AtomicU16 = AtomicU16::new(16379);

use podcache::disk::DiskStore;
use podcache::memory::MemoryPartition;
use podcache::server;
use podcache::tiered::TieredCache;

/// Starts a server on a fresh TCP port over `partitions` partitions each
/// sized `partition_capacity` bytes, returning the port and a shutdown
/// handle.
fn start_server(
    partition_capacity: usize,
    partitions: usize,
) -> (u16, Arc<AtomicBool>, tempfile::TempDir, thread::JoinHandle<()>) {
    let dir = tempfile::tempdir().unwrap();
    let disk = DiskStore::new(dir.path()).unwrap();
    let parts = (0..partitions)
        .map(|_| MemoryPartition::new(partition_capacity))
        .collect();
    let cache = Arc::new(TieredCache::new(parts, disk));
    let stop = Arc::new(AtomicBool::new(false));

    let port = NEXT_PORT.fetch_add(1, Ordering::Relaxed);

    let stop_for_thread = Arc::clone(&stop);
    let handle = thread::spawn(move || {
        let _ = server::serve(port, cache, stop_for_thread);
    });
    // Give the accept loop a moment to bind before the test connects.
    thread::sleep(Duration::from_millis(100));

    (port, stop, dir, handle)
}

fn send(stream: &mut TcpStream, command: &[&str]) {
    let mut out = format!("*{}\r\n", command.len());
    for arg in command {
        out.push_str(&format!("${}\r\n{}\r\n", arg.len(), arg));
    }
    stream.write_all(out.as_bytes()).unwrap();
}

fn read_reply(stream: &mut TcpStream, expected_len: usize) -> String {
    let mut buf = vec![0u8; expected_len];
    stream.read_exact(&mut buf).unwrap();
    String::from_utf8(buf).unwrap()
}

#[test]
fn s1_basic_set_get_del() {
    let (port, stop, _dir, handle) = start_server(1024 * 1024, 1);
    let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();

    send(&mut stream, &["SET", "hello", "world"]);
    assert_eq!(read_reply(&mut stream, 5), "+OK\r\n");

    send(&mut stream, &["GET", "hello"]);
    assert_eq!(read_reply(&mut stream, 11), "$5\r\nworld\r\n");

    send(&mut stream, &["DEL", "hello"]);
    assert_eq!(read_reply(&mut stream, 4), ":1\r\n");

    send(&mut stream, &["GET", "hello"]);
    assert_eq!(read_reply(&mut stream, 5), "$-1\r\n");

    send(&mut stream, &["DEL", "hello"]);
    assert_eq!(read_reply(&mut stream, 4), ":0\r\n");

    stop.store(true, Ordering::Relaxed);
    drop(stream);
    let _ = handle.join();
}

#[test]
fn s4_incr_and_type_error() {
    let (port, stop, _dir, handle) = start_server(1024 * 1024, 1);
    let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();

    send(&mut stream, &["INCR", "c"]);
    assert_eq!(read_reply(&mut stream, 4), ":1\r\n");

    send(&mut stream, &["INCR", "c"]);
    assert_eq!(read_reply(&mut stream, 4), ":2\r\n");

    send(&mut stream, &["SET", "c", "notanumber"]);
    assert_eq!(read_reply(&mut stream, 5), "+OK\r\n");

    send(&mut stream, &["INCR", "c"]);
    let expected = "-ERR value is not an integer or out of range\r\n";
    assert_eq!(read_reply(&mut stream, expected.len()), expected);

    stop.store(true, Ordering::Relaxed);
    drop(stream);
    let _ = handle.join();
}

#[test]
fn s5_pipelined_pings_reply_in_order() {
    let (port, stop, _dir, handle) = start_server(1024 * 1024, 1);
    let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();

    let mut batch = Vec::new();
    batch.extend_from_slice(b"*1\r\n$4\r\nPING\r\n");
    batch.extend_from_slice(b"*1\r\n$4\r\nPING\r\n");
    stream.write_all(&batch).unwrap();

    assert_eq!(read_reply(&mut stream, 7), "+PONG\r\n");
    assert_eq!(read_reply(&mut stream, 7), "+PONG\r\n");

    stop.store(true, Ordering::Relaxed);
    drop(stream);
    let _ = handle.join();
}

#[test]
fn s2_s3_spill_then_promote_round_trips_value() {
    let (port, stop, _dir, handle) = start_server(200 * 1024, 1);
    let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();

    let value = "x".repeat(60 * 1024);
    for i in 1..=5 {
        let key = format!("k{i}");
        send(&mut stream, &["SET", &key, &value]);
        assert_eq!(read_reply(&mut stream, 5), "+OK\r\n");
    }

    // k1 should have spilled to disk; GET promotes it back into memory.
    send(&mut stream, &["GET", "k1"]);
    let header = format!("${}\r\n", value.len());
    let expected = format!("{header}{value}\r\n");
    assert_eq!(read_reply(&mut stream, expected.len()), expected);

    stop.store(true, Ordering::Relaxed);
    drop(stream);
    let _ = handle.join();
}

#[test]
fn s6_partitioning_isolates_overflow() {
    let (port, stop, _dir, handle) = start_server(64 * 1024, 4);
    let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();

    send(&mut stream, &["SET", "alpha", "first"]);
    assert_eq!(read_reply(&mut stream, 5), "+OK\r\n");

    // Overflow a different partition's worth of capacity with unrelated keys.
    let filler = "y".repeat(1024);
    for i in 0..200 {
        let key = format!("filler{i}");
        send(&mut stream, &["SET", &key, &filler]);
        let _ = read_reply(&mut stream, 5);
    }

    send(&mut stream, &["EXISTS", "alpha"]);
    assert_eq!(read_reply(&mut stream, 4), ":1\r\n");

    stop.store(true, Ordering::Relaxed);
    drop(stream);
    let _ = handle.join();
}

#[test]
fn dbsize_and_flushall_supplement_commands() {
    let (port, stop, _dir, handle) = start_server(1024 * 1024, 1);
    let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();

    send(&mut stream, &["SET", "a", "1"]);
    let _ = read_reply(&mut stream, 5);
    send(&mut stream, &["SET", "b", "2"]);
    let _ = read_reply(&mut stream, 5);

    send(&mut stream, &["DBSIZE"]);
    assert_eq!(read_reply(&mut stream, 4), ":2\r\n");

    send(&mut stream, &["FLUSHALL"]);
    assert_eq!(read_reply(&mut stream, 5), "+OK\r\n");

    send(&mut stream, &["DBSIZE"]);
    assert_eq!(read_reply(&mut stream, 4), ":0\r\n");

    stop.store(true, Ordering::Relaxed);
    drop(stream);
    let _ = handle.join();
}

#[test]
fn malformed_input_gets_a_protocol_error_and_closes() {
    let (port, stop, _dir, handle) = start_server(1024 * 1024, 1);
    let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();

    stream.write_all(b"not-resp-at-all\r\n").unwrap();
    let expected = "-ERR protocol error\r\n";
    assert_eq!(read_reply(&mut stream, expected.len()), expected);

    // The connection should now be closed by the server.
    let mut buf = [0u8; 8];
    let n = stream.read(&mut buf).unwrap_or(0);
    assert_eq!(n, 0);

    stop.store(true, Ordering::Relaxed);
    let _ = handle.join();
}
