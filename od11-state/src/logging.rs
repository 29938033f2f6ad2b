//! Logging setup for OD-11 tools and integrations
//!
//! Libraries in this workspace only emit `tracing` events. Binaries pick how
//! those events are rendered by calling one of the init functions here once,
//! early in `main`.

use tracing_subscriber::{fmt, EnvFilter, Registry};

/// Logging mode for different use cases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggingMode {
    /// No subscriber; every event is dropped
    Silent,
    /// Compact stderr output, `info` by default
    Development,
    /// Verbose output with source locations, `debug` by default
    Debug,
}

impl LoggingMode {
    /// Parse the value of `OD11_LOG_MODE`
    pub fn from_env_value(value: &str) -> Result<Self, LoggingError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "silent" | "off" => Ok(LoggingMode::Silent),
            "development" | "dev" => Ok(LoggingMode::Development),
            "debug" => Ok(LoggingMode::Debug),
            other => Err(LoggingError::InvalidEnv(format!("OD11_LOG_MODE={other}"))),
        }
    }
}

/// Logging configuration error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Failed to initialize tracing subscriber: {0}")]
    TracingInit(String),

    #[error("Invalid environment variable: {0}")]
    InvalidEnv(String),
}

/// Initialize logging with the specified mode
///
/// # Environment Variables
///
/// - `OD11_LOG_LEVEL`: filter directive (`warn`, `od11_session=debug`, ...)
/// - `RUST_LOG`: used when `OD11_LOG_LEVEL` is unset
pub fn init_logging(mode: LoggingMode) -> Result<(), LoggingError> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    match mode {
        LoggingMode::Silent => Ok(()),
        LoggingMode::Development => {
            let filter = create_env_filter("info")?;

            Registry::default()
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(false)
                        .compact(),
                )
                .with(filter)
                .try_init()
                .map_err(|e| LoggingError::TracingInit(e.to_string()))
        }
        LoggingMode::Debug => {
            let filter = create_env_filter("debug")?;

            Registry::default()
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .pretty()
                        .with_thread_ids(true)
                        .with_file(true)
                        .with_line_number(true),
                )
                .with(filter)
                .try_init()
                .map_err(|e| LoggingError::TracingInit(e.to_string()))
        }
    }
}

/// Initialize logging from `OD11_LOG_MODE`
///
/// Unset means silent; an unrecognised value is an error.
pub fn init_logging_from_env() -> Result<(), LoggingError> {
    let mode = match std::env::var("OD11_LOG_MODE") {
        Ok(value) => LoggingMode::from_env_value(&value)?,
        Err(_) => LoggingMode::Silent,
    };

    init_logging(mode)
}

/// `OD11_LOG_LEVEL`, then `RUST_LOG`, then `default_level`
fn create_env_filter(default_level: &str) -> Result<EnvFilter, LoggingError> {
    let directives = std::env::var("OD11_LOG_LEVEL")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| default_level.to_string());

    EnvFilter::try_new(&directives)
        .map_err(|e| LoggingError::InvalidEnv(format!("log filter {directives:?}: {e}")))
}

/// Check if a global subscriber has been installed
pub fn is_initialized() -> bool {
    tracing::dispatcher::has_been_set()
}

pub fn init_silent() -> Result<(), LoggingError> {
    init_logging(LoggingMode::Silent)
}
