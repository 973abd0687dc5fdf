//! Warp media session protocol over multiplexed transports.
//!
//! warpwire serves live media sessions: each client connection gets its
//! init segments announced on dedicated high-priority channels, and can tune
//! the server's bandwidth ceiling with small JSON control messages framed as
//! `warp` atoms.
//!
//! # Crate Structure
//!
//! - [`transport`]: connection and channel contract, plus an in-memory
//!   implementation (behind `mem` feature)
//! - [`frame`]: atom codec, control messages, buffered channel writers
//! - [`session`]: session engine, task supervisor, and server host (behind
//!   `session` feature)

/// Re-export transport types.
pub mod transport {
    pub use warpwire_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use warpwire_frame::*;
}

/// Re-export session types (requires `session` feature).
#[cfg(feature = "session")]
pub mod session {
    pub use warpwire_session::*;
}
