//! # OD-11 Session - live control connection to an OD-11 speaker
//!
//! [`DeviceSession`] owns one WebSocket connection: it performs the
//! `global_join`/`group_join` handshake, keeps a [`StateMirror`] current from
//! the device's pushes, sends volume and input commands, pings the device to
//! keep the link alive, and reconnects with backoff when the link drops.
//!
//! ```rust,ignore
//! use od11_session::{DeviceSession, SessionConfig};
//!
//! let session = DeviceSession::connect(SessionConfig::new("192.168.1.20")).await?;
//! session.set_input("optical").await?;
//! session.nudge_volume(-5).await?;
//! println!("volume: {:?}", session.state().volume());
//! session.close().await;
//! ```
//!
//! [`StateMirror`]: od11_state::StateMirror

pub mod config;
mod connection;
pub mod error;
pub mod session;

pub use config::{HandshakeParams, ReconnectPolicy, SessionConfig};
pub use error::{Result, SessionError};
pub use session::{apply_delta, DeviceSession, SessionStatus};
