//! Warp session engine.
//!
//! A [`Session`] serves one client over an established [`Connection`]:
//! it announces queued [`MediaInit`] payloads, applies control messages the
//! client sends, and refuses channels the protocol has no use for. A
//! [`Server`] hosts one session per accepted connection and closes each
//! connection with the session's outcome.
//!
//! [`Connection`]: warpwire_transport::Connection

pub mod codes;
pub mod config;
pub mod error;
pub mod server;
pub mod session;
pub mod tasks;

pub use codes::{
    session_code_name, CLOSE_REASON_OK, SESSION_ERROR, SESSION_OK, STREAM_ERROR, STREAM_REJECTED,
};
pub use config::{ServerConfig, SessionConfig};
pub use error::{Result, SessionError};
pub use server::{serve_session, Server};
pub use session::{MediaInit, Session};
pub use tasks::{Supervisor, Tasks};
