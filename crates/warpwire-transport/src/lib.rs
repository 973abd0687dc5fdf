//! Multiplexed transport contract for warp sessions.
//!
//! A warp session runs on top of an already-established, encrypted,
//! stream-multiplexed connection (one connection per client). This crate
//! describes what the session needs from that connection:
//! - accept bidirectional and unidirectional channels opened by the peer
//! - open unidirectional channels toward the peer
//! - a bandwidth ceiling hint and a close with code + reason
//!
//! Connection establishment, TLS and congestion control live in the
//! implementing transport. The `mem` feature provides an in-process
//! implementation used by tests and the CLI loopback.

pub mod error;
pub mod traits;

#[cfg(feature = "mem")]
pub mod mem;

pub use error::{Result, TransportError};
pub use traits::{BidiChannel, Connection, Listener, RecvChannel, SendChannel};
