/// Errors surfaced by a transport connection or one of its channels.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection is gone and no close code is known.
    #[error("connection closed")]
    Closed,

    /// The connection was closed with an application code.
    #[error("connection closed (code {code}): {reason}")]
    ConnectionClosed { code: u32, reason: String },

    /// The sending side reset the channel.
    #[error("stream reset (code {0})")]
    Reset(u32),

    /// The receiving side stopped reading the channel.
    #[error("stream stopped (code {0})")]
    Stopped(u32),

    /// An I/O error occurred on a channel.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
