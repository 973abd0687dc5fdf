use crate::codes::{STREAM_ERROR, STREAM_REJECTED};
use crate::session::MediaInit;

/// Per-session protocol settings.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Code used to cancel the read side of bidirectional channels.
    pub bidi_reject_code: u32,
    /// Code used to stop or reset a channel whose reading or writing failed.
    pub stream_error_code: u32,
    /// Transmission priority of init channels.
    pub init_priority: i32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            bidi_reject_code: STREAM_REJECTED,
            stream_error_code: STREAM_ERROR,
            init_priority: i32::MAX,
        }
    }
}

/// Settings shared by every session a server hosts.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    pub session: SessionConfig,
    /// Payloads announced to each client, in order.
    pub inits: Vec<MediaInit>,
}
