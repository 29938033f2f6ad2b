//! Configuration types for the device session
//!
//! Everything that shapes a connection lives here: where to connect, the
//! headers to present, the join parameters, and the timers that govern
//! keepalive and reconnects.

use std::time::Duration;

use url::Url;

use od11_api::defaults::{
    DEFAULT_COLOR_INDEX, DEFAULT_KEEPALIVE_SECS, DEFAULT_NAME, DEFAULT_PROTOCOL_MAJOR,
    DEFAULT_PROTOCOL_MINOR, DEFAULT_REALTIME_DATA, DEFAULT_UID, DEFAULT_WS_PATH,
};
use od11_api::Action;

use crate::error::{Result, SessionError};

/// Parameters of the `global_join` / `group_join` handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeParams {
    pub protocol_major_version: u32,
    pub protocol_minor_version: u32,
    pub color_index: u32,
    /// Name this client shows up under in the device's group
    pub name: String,
    /// Ask the device to push state changes
    pub realtime_data: bool,
    pub uid: String,
}

impl Default for HandshakeParams {
    fn default() -> Self {
        Self {
            protocol_major_version: DEFAULT_PROTOCOL_MAJOR,
            protocol_minor_version: DEFAULT_PROTOCOL_MINOR,
            color_index: DEFAULT_COLOR_INDEX,
            name: DEFAULT_NAME.to_string(),
            realtime_data: DEFAULT_REALTIME_DATA,
            uid: DEFAULT_UID.to_string(),
        }
    }
}

impl HandshakeParams {
    pub fn global_join(&self) -> Action {
        Action::GlobalJoin {
            protocol_major_version: self.protocol_major_version,
            protocol_minor_version: self.protocol_minor_version,
        }
    }

    pub fn group_join(&self) -> Action {
        Action::GroupJoin {
            color_index: self.color_index,
            name: self.name.clone(),
            realtime_data: self.realtime_data,
            uid: self.uid.clone(),
        }
    }
}

/// Exponential backoff between reconnect attempts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first attempt
    /// Default: 1 second
    pub initial_delay: Duration,

    /// Upper bound for any single delay
    /// Default: 60 seconds
    pub max_delay: Duration,

    /// Growth factor per attempt
    /// Default: 2
    pub multiplier: u32,

    /// Give up after this many failed attempts; `None` retries forever
    /// Default: None
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            multiplier: 2,
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    /// Short delays, for tools that should notice a returning device quickly
    pub fn fast() -> Self {
        Self {
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
            ..Default::default()
        }
    }

    /// Never reconnect; the session closes on the first connection loss
    pub fn disabled() -> Self {
        Self {
            max_attempts: Some(0),
            ..Default::default()
        }
    }

    /// Delay before attempt `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = self.multiplier.max(1).saturating_pow(exponent);
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Whether attempt `attempt` (1-based) may be made
    pub fn allows(&self, attempt: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempt <= max)
    }
}

/// Configuration for one [`DeviceSession`](crate::DeviceSession)
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Device address, optionally with a port (`192.168.1.20`, `od11.local:8080`)
    pub host: String,

    /// WebSocket path
    /// Default: `/ws`
    pub ws_path: String,

    /// `Origin` header; `http://<host>` when unset
    pub origin: Option<String>,

    /// `Cookie` header for devices that enforce a session cookie
    pub cookie: Option<String>,

    pub handshake: HandshakeParams,

    /// Interval between `speaker_ping` messages
    /// Default: 25 seconds
    pub keepalive_interval: Duration,

    /// Timeout for opening the socket
    /// Default: 10 seconds
    pub connect_timeout: Duration,

    /// Timeout for `global_join` through `group_joined`
    /// Default: 10 seconds
    pub handshake_timeout: Duration,

    /// How long a command may wait for a ready connection
    /// Default: 5 seconds
    pub command_timeout: Duration,

    pub reconnect: ReconnectPolicy,

    /// Capacity of the command queue
    /// Default: 32
    pub command_buffer: usize,
}

impl SessionConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ws_path: DEFAULT_WS_PATH.to_string(),
            origin: None,
            cookie: None,
            handshake: HandshakeParams::default(),
            keepalive_interval: Duration::from_secs(DEFAULT_KEEPALIVE_SECS),
            connect_timeout: Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(10),
            command_timeout: Duration::from_secs(5),
            reconnect: ReconnectPolicy::default(),
            command_buffer: 32,
        }
    }

    /// One-shot use: no reconnects, short timeouts
    pub fn one_shot(host: impl Into<String>) -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            handshake_timeout: Duration::from_secs(5),
            reconnect: ReconnectPolicy::disabled(),
            ..Self::new(host)
        }
    }

    /// Validate the configuration and return any issues
    pub fn validate(&self) -> Result<()> {
        let host = self.host.trim();
        if host.is_empty() {
            return Err(SessionError::Config("Host must not be empty".to_string()));
        }
        if host.contains("://") || host.contains('/') {
            return Err(SessionError::Config(format!(
                "Host must be a bare address without scheme or path: {host}"
            )));
        }

        if let Some(origin) = &self.origin {
            let lower = origin.trim().to_ascii_lowercase();
            if lower.starts_with("ws://") || lower.starts_with("wss://") {
                return Err(SessionError::Config(format!(
                    "Origin must be an http(s) origin, not a WebSocket URL: {origin}"
                )));
            }
        }

        if let Some(cookie) = &self.cookie {
            if cookie.contains(['\r', '\n']) {
                return Err(SessionError::Config(
                    "Cookie must not contain line breaks".to_string(),
                ));
            }
        }

        for (name, value) in [
            ("Keepalive interval", self.keepalive_interval),
            ("Connect timeout", self.connect_timeout),
            ("Handshake timeout", self.handshake_timeout),
            ("Command timeout", self.command_timeout),
        ] {
            if value == Duration::ZERO {
                return Err(SessionError::Config(format!("{name} must be greater than 0")));
            }
        }

        if self.reconnect.initial_delay == Duration::ZERO {
            return Err(SessionError::Config(
                "Reconnect initial delay must be greater than 0".to_string(),
            ));
        }
        if self.reconnect.multiplier == 0 {
            return Err(SessionError::Config(
                "Reconnect multiplier must be at least 1".to_string(),
            ));
        }
        if self.reconnect.initial_delay > self.reconnect.max_delay {
            return Err(SessionError::Config(
                "Invalid reconnect delays: initial must not exceed max".to_string(),
            ));
        }

        if self.command_buffer == 0 {
            return Err(SessionError::Config(
                "Command buffer size must be greater than 0".to_string(),
            ));
        }

        self.url().map(|_| ())
    }

    /// `ws://<host><path>`
    pub fn url(&self) -> Result<Url> {
        let path = self.ws_path.trim();
        let raw = if path.starts_with('/') {
            format!("ws://{}{}", self.host.trim(), path)
        } else {
            format!("ws://{}/{}", self.host.trim(), path)
        };
        Url::parse(&raw).map_err(|e| SessionError::Config(format!("Invalid device URL {raw}: {e}")))
    }

    /// Value of the `Origin` header, without a trailing `/`
    pub fn origin_header(&self) -> String {
        let origin = match &self.origin {
            Some(origin) if !origin.trim().is_empty() => origin.trim().to_string(),
            _ => format!("http://{}", self.host.trim()),
        };
        origin.trim_end_matches('/').to_string()
    }

    /// Builder pattern methods for fluent configuration

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.ws_path = path.into();
        self
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn with_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.cookie = Some(cookie.into());
        self
    }

    pub fn with_handshake(mut self, handshake: HandshakeParams) -> Self {
        self.handshake = handshake;
        self
    }

    pub fn with_keepalive(mut self, interval: Duration) -> Self {
        self.keepalive_interval = interval;
        self
    }

    pub fn with_timeouts(mut self, connect: Duration, handshake: Duration, command: Duration) -> Self {
        self.connect_timeout = connect;
        self.handshake_timeout = handshake;
        self.command_timeout = command;
        self
    }

    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }
}
