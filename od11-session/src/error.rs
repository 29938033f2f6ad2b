//! Error types for the device session

use od11_api::{ProtocolError, UnknownSourceError};

/// Errors surfaced by [`DeviceSession`](crate::DeviceSession)
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The socket could not be opened, or failed while in use
    #[error("Connection error: {0}")]
    Connection(String),

    /// The device refused the join handshake
    #[error("Handshake rejected: {0}")]
    HandshakeRejected(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    /// A command argument is outside its allowed range; nothing was sent
    #[error("Invalid {parameter}: {value} (expected {min}..={max})")]
    Validation {
        parameter: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },

    /// The input identifier matched no source; nothing was sent
    #[error(transparent)]
    UnknownSource(#[from] UnknownSourceError),

    /// The device has not reported a volume to compute a change from
    #[error("Device volume is not known yet")]
    VolumeUnknown,

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Configuration error: {0}")]
    Config(String),

    /// The session was closed
    #[error("Session closed")]
    Closed,
}

impl SessionError {
    /// Socket, handshake and delivery failures, as opposed to rejected input
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            SessionError::Connection(_)
                | SessionError::HandshakeRejected(_)
                | SessionError::Timeout(_)
                | SessionError::Closed
        )
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
