/// Errors that can occur while framing or parsing atoms.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The header declares a size smaller than the header itself.
    #[error("atom size is too small ({0} bytes, min 8)")]
    AtomTooSmall(u32),

    /// The atom exceeds the maximum accepted size.
    #[error("atom size is too large ({size} bytes, max {max})")]
    AtomTooLarge { size: usize, max: usize },

    /// The header carries a type other than `warp`.
    #[error("unsupported atom type {0:?} (only warp atoms are supported)")]
    UnsupportedType(String),

    /// The channel ended in the middle of an atom.
    #[error("channel ended mid-atom ({0} bytes buffered)")]
    Truncated(usize),

    /// The atom payload is not a valid JSON message.
    #[error("failed to decode json payload: {0}")]
    Json(#[from] serde_json::Error),

    /// An I/O error occurred while reading atoms.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The transport failed while writing a channel.
    #[error("transport error: {0}")]
    Transport(#[from] warpwire_transport::TransportError),

    /// The channel writer was closed, cancelled, or lost its drain task.
    #[error("channel writer closed")]
    WriterClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
