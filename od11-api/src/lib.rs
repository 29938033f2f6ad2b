//! # OD-11 API - wire protocol for the OD-11 local control socket
//!
//! The speaker exposes a JSON-over-WebSocket control channel (usually
//! `ws://<host>/ws`). This crate defines the messages exchanged on it and the
//! source naming rules; it performs no I/O.
//!
//! ```rust
//! use od11_api::{Action, DeviceMessage, SessionId, Update};
//!
//! let frame = Action::GroupChangeVolume { amount: 5 }
//!     .encode(Some(&SessionId::from(3)))
//!     .unwrap();
//! assert!(frame.contains("\"sid\":3"));
//!
//! let msg = DeviceMessage::parse(r#"{"update":"group_volume_changed","vol":35}"#).unwrap();
//! assert_eq!(msg, DeviceMessage::Update(Update::GroupVolumeChanged { vol: 35 }));
//! ```

pub mod defaults;
pub mod error;
pub mod id_types;
pub mod message;
pub mod source;

pub use error::{ProtocolError, Result, UnknownSourceError};
pub use id_types::{SessionId, SourceId};
pub use message::{
    Action, DeviceMessage, GlobalJoined, GroupJoined, SourceEntry, SpeakerInfo, Update,
};
pub use source::{resolve_source, simplify, SourceAlias, SourceMap, SHORT_ALIASES};
