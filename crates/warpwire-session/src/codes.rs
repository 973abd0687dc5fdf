//! Application error codes sent to the peer.
//!
//! Stream codes travel in stop/reset frames; session codes close the whole
//! connection.

/// Clean end of a session.
pub const SESSION_OK: u32 = 0;

/// Session terminated by an error; the reason carries its description.
pub const SESSION_ERROR: u32 = 1;

/// Bidirectional channel refused; the protocol does not use them yet.
pub const STREAM_REJECTED: u32 = 1;

/// Channel abandoned after a read, parse or write failure.
pub const STREAM_ERROR: u32 = 1;

/// Close reason sent with [`SESSION_OK`].
pub const CLOSE_REASON_OK: &str = "end of broadcast";

/// Returns a human-readable name for a session close code.
pub fn session_code_name(code: u32) -> &'static str {
    match code {
        SESSION_OK => "OK",
        SESSION_ERROR => "ERROR",
        _ => "UNKNOWN",
    }
}
