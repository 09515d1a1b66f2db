//! The RESP wire protocol: framing in [`resp`], command dispatch in
//! [`dispatch`].

pub mod dispatch;
pub mod resp;

pub use dispatch::{dispatch, DispatchOutcome};
pub use resp::{try_parse_command, DecodeOutcome, Reply, PROTOCOL_ERROR_REPLY};
