//! OD-11 State Mirror
//!
//! Keeps an in-memory copy of one speaker's state, fed by the messages the
//! device pushes over its control socket.
//!
//! # Architecture
//!
//! ```text
//! DeviceMessage → decode() → PropertyChange* → StateMirror → ChangeIterator
//!                                              (get/snapshot)  (watched keys)
//! ```
//!
//! # Quick Start
//!
//! ```rust
//! use od11_api::DeviceMessage;
//! use od11_state::{Property, StateMirror, Volume};
//!
//! let mirror = StateMirror::new();
//! mirror.watch(Volume::KEY);
//!
//! let push = DeviceMessage::parse(r#"{"update":"group_volume_changed","vol":42}"#).unwrap();
//! mirror.apply_message(&push);
//!
//! assert_eq!(mirror.get::<Volume>(), Some(Volume::new(42)));
//! assert_eq!(mirror.iter().try_recv().map(|e| e.property_key), Some("volume"));
//! ```

pub mod decoder;
pub mod event;
pub mod iter;
pub mod logging;
pub mod mirror;
pub mod property;
pub mod state;

pub use decoder::{decode, DecodedChanges, PropertyChange};
pub use event::ChangeEvent;
pub use iter::{ChangeIterator, TimeoutIter, TryIter};
pub use mirror::{ApplyOutcome, StateMirror, EVENT_QUEUE_CAPACITY};
pub use property::{
    CurrentSource, FirmwareRevision, MacAddress, Property, SessionToken, Sources, Ssid, Volume,
    WifiQuality, ALL_KEYS,
};
pub use state::DeviceState;

pub use logging::{
    init_logging, init_logging_from_env, init_silent, is_initialized, LoggingError, LoggingMode,
};
