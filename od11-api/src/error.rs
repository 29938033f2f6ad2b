use thiserror::Error;

/// Errors raised while encoding or decoding OD-11 protocol frames
///
/// Inbound decode failures are never fatal to a session: callers log them
/// and leave the mirrored state untouched.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame is not valid JSON, or a known message is missing required fields
    ///
    /// Covers things like a `group_volume_changed` update without a `vol`
    /// field or a text frame holding something other than JSON.
    #[error("Malformed payload: {0}")]
    Malformed(String),

    /// Frame is valid JSON but not a message this protocol knows how to read
    ///
    /// For example a JSON array, or an object carrying neither `response`
    /// nor `update`.
    #[error("Unexpected payload shape: {0}")]
    UnexpectedShape(String),

    /// Outbound message could not be serialized
    #[error("Failed to encode {action} message: {reason}")]
    Encode {
        action: &'static str,
        reason: String,
    },
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        ProtocolError::Malformed(err.to_string())
    }
}

/// An input identifier matched no source id, source name or alias
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown source: {query:?}")]
pub struct UnknownSourceError {
    /// The identifier as the caller supplied it
    pub query: String,
}

impl UnknownSourceError {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
        }
    }
}

/// Type alias for results that can return a ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;
