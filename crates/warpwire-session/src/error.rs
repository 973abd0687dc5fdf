use warpwire_frame::FrameError;
use warpwire_transport::TransportError;

/// Errors that end a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Accepting a bidirectional channel failed, usually because the
    /// connection is closing.
    #[error("failed to accept bidirectional stream: {0}")]
    AcceptBidirectional(#[source] TransportError),

    /// Accepting a unidirectional channel failed.
    #[error("failed to accept unidirectional stream: {0}")]
    AcceptUnidirectional(#[source] TransportError),

    /// Opening the channel for an init failed.
    #[error("failed to create stream for init {id}: {source}")]
    OpenStream {
        id: String,
        #[source]
        source: TransportError,
    },

    /// The transport returned neither a channel nor an error.
    #[error("transport returned no stream and no error for init {id}")]
    MissingStream { id: String },

    #[error("failed to write init header for {id}: {source}")]
    InitHeader {
        id: String,
        #[source]
        source: FrameError,
    },

    #[error("failed to write init data for {id}: {source}")]
    InitData {
        id: String,
        #[source]
        source: FrameError,
    },

    #[error("failed to close init stream {id}: {source}")]
    InitClose {
        id: String,
        #[source]
        source: FrameError,
    },

    /// An inbound channel carried a bad atom or failed mid-read.
    #[error("failed to read stream: {0}")]
    Stream(#[source] FrameError),

    /// A channel writer's drain task failed.
    #[error("failed to drain stream: {0}")]
    Drain(#[source] FrameError),
}

pub type Result<T> = std::result::Result<T, SessionError>;
