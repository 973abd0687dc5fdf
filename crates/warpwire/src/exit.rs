use std::fmt;
use std::io;

use warpwire_frame::FrameError;
use warpwire_transport::TransportError;

// Process exit codes. 64 and 124 follow sysexits and timeout(1).
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::NotFound => USAGE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Io(source) => io_error(context, source),
        TransportError::Closed | TransportError::ConnectionClosed { .. } => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::Transport(source) => transport_error(context, source),
        FrameError::AtomTooSmall(_)
        | FrameError::AtomTooLarge { .. }
        | FrameError::UnsupportedType(_)
        | FrameError::Truncated(_)
        | FrameError::Json(_) => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        FrameError::WriterClosed => CliError::new(FAILURE, format!("{context}: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn framing_errors_are_data_invalid() {
        let err = frame_error("decode failed", FrameError::UnsupportedType("moov".into()));
        assert_eq!(err.code, DATA_INVALID);
        assert!(err.message.starts_with("decode failed: "));

        let err = frame_error("decode failed", FrameError::Truncated(3));
        assert_eq!(err.code, DATA_INVALID);
    }

    #[test]
    fn transport_errors_map_by_kind() {
        let err = transport_error("accept failed", TransportError::Reset(1));
        assert_eq!(err.code, TRANSPORT_ERROR);

        let err = transport_error("accept failed", TransportError::Closed);
        assert_eq!(err.code, FAILURE);

        let err = frame_error(
            "read failed",
            FrameError::Io(io::Error::from(io::ErrorKind::PermissionDenied)),
        );
        assert_eq!(err.code, PERMISSION_DENIED);
    }
}
