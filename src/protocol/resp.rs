//! RESP v2 subset: arrays of bulk strings in, simple/error/integer/bulk
//! replies out.
//!
//! Framing is incremental: [`try_parse_command`] is handed whatever bytes a
//! connection has accumulated so far and either reports that a full command
//! isn't in hand yet ([`DecodeOutcome::Incomplete`]), that one parsed
//! successfully ([`DecodeOutcome::Complete`]), or that the bytes are
//! malformed (`Err`), in which case the caller closes the connection after
//! writing `-ERR protocol error`.

use crate::error::CacheError;

/// Bulk strings larger than this close the connection.
const MAX_BULK_LEN: i64 = 1024 * 1024;
/// Arrays longer than this close the connection.
const MAX_ARGS: i64 = 100;
/// A length-prefix line longer than this without a terminating CRLF is
/// treated as malformed rather than merely incomplete.
const MAX_LEN_PREFIX_BYTES: usize = 32;

/// Result of attempting to parse one command from a connection's
/// accumulated buffer.
pub enum DecodeOutcome {
    /// Not enough bytes buffered yet; wait for more and retry.
    Incomplete,
    /// A full command was parsed; `consumed` bytes should be dropped from
    /// the front of the buffer.
    Complete {
        command: Vec<Vec<u8>>,
        consumed: usize,
    },
}

/// Attempts to parse one RESP array-of-bulk-strings command from `buf`.
pub fn try_parse_command(buf: &[u8]) -> Result<DecodeOutcome, CacheError> {
    if buf.is_empty() {
        return Ok(DecodeOutcome::Incomplete);
    }
    if buf[0] != b'*' {
        return Err(CacheError::ProtocolError);
    }

    let mut pos = 1;
    let (count, header_len) = match read_line_integer(&buf[pos..])? {
        None => return Ok(DecodeOutcome::Incomplete),
        Some(v) => v,
    };
    pos += header_len;

    if count < 0 || count > MAX_ARGS {
        return Err(CacheError::ProtocolError);
    }

    let mut command = Vec::with_capacity(count as usize);
    for _ in 0..count {
        if pos >= buf.len() {
            return Ok(DecodeOutcome::Incomplete);
        }
        if buf[pos] != b'$' {
            return Err(CacheError::ProtocolError);
        }
        pos += 1;

        let (len, len_header) = match read_line_integer(&buf[pos..])? {
            None => return Ok(DecodeOutcome::Incomplete),
            Some(v) => v,
        };
        pos += len_header;

        if len < 0 || len > MAX_BULK_LEN {
            return Err(CacheError::ProtocolError);
        }
        let len = len as usize;

        if buf.len() < pos + len + 2 {
            return Ok(DecodeOutcome::Incomplete);
        }
        let data = buf[pos..pos + len].to_vec();
        if &buf[pos + len..pos + len + 2] != b"\r\n" {
            return Err(CacheError::ProtocolError);
        }
        pos += len + 2;
        command.push(data);
    }

    Ok(DecodeOutcome::Complete {
        command,
        consumed: pos,
    })
}

/// Reads a `<digits>\r\n` line and returns `(value, bytes consumed
/// including the CRLF)`, or `None` if the CRLF hasn't arrived yet.
fn read_line_integer(buf: &[u8]) -> Result<Option<(i64, usize)>, CacheError> {
    match find_crlf(buf) {
        Some(idx) => {
            let text = std::str::from_utf8(&buf[..idx]).map_err(|_| CacheError::ProtocolError)?;
            let value: i64 = text.parse().map_err(|_| CacheError::ProtocolError)?;
            Ok(Some((value, idx + 2)))
        }
        None if buf.len() > MAX_LEN_PREFIX_BYTES => Err(CacheError::ProtocolError),
        None => Ok(None),
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|pair| pair == b"\r\n")
}

/// A reply written back to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// `+<text>\r\n`
    Simple(String),
    /// `-<message>\r\n`
    Error(String),
    /// `:<n>\r\n`
    Integer(i64),
    /// `$<len>\r\n<bytes>\r\n`
    Bulk(Vec<u8>),
    /// `$-1\r\n`
    Nil,
}

impl Reply {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Reply::Simple(text) => format!("+{text}\r\n").into_bytes(),
            Reply::Error(text) => format!("-{text}\r\n").into_bytes(),
            Reply::Integer(n) => format!(":{n}\r\n").into_bytes(),
            Reply::Bulk(bytes) => {
                let mut out = format!("${}\r\n", bytes.len()).into_bytes();
                out.extend_from_slice(bytes);
                out.extend_from_slice(b"\r\n");
                out
            }
            Reply::Nil => b"$-1\r\n".to_vec(),
        }
    }
}

/// `-ERR protocol error\r\n`, written just before closing a malformed
/// connection.
pub const PROTOCOL_ERROR_REPLY: &[u8] = b"-ERR protocol error\r\n";
