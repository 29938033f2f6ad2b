use thiserror::Error;

use od11_session::SessionError;

#[derive(Error, Debug)]
pub enum SdkError {
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid data for service {service}: {reason}")]
    InvalidServiceCall { service: String, reason: String },

    #[error("Unknown service: {0}")]
    UnknownService(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Device already configured: {0}")]
    DuplicateEntry(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Session worker is not running")]
    WorkerUnavailable,
}

impl SdkError {
    pub(crate) fn invalid_call(service: &str, reason: impl Into<String>) -> Self {
        SdkError::InvalidServiceCall {
            service: service.to_string(),
            reason: reason.into(),
        }
    }

    /// Validation and unknown-source failures; the device state is untouched
    pub fn is_rejected_input(&self) -> bool {
        matches!(
            self,
            SdkError::Session(SessionError::Validation { .. })
                | SdkError::Session(SessionError::UnknownSource(_))
                | SdkError::InvalidServiceCall { .. }
                | SdkError::InvalidValue(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SdkError>;
