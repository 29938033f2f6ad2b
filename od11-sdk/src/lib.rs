//! # OD-11 SDK - sync control of an OD-11 speaker
//!
//! Exposes a speaker the way a home-automation host sees it: one volume
//! number entity, one input select entity, a handful of service calls and
//! the config entry that describes the device.
//!
//! ```rust,no_run
//! use od11_sdk::{DeviceConfig, Od11Device, Volume};
//!
//! fn main() -> Result<(), od11_sdk::SdkError> {
//!     let device = Od11Device::connect(DeviceConfig::new("192.168.1.20"))?;
//!
//!     // Entities read the mirrored state; writes block until accepted
//!     println!("options: {:?}", device.input.options());
//!     device.input.select_option("Optical")?;
//!     device.volume.set_native_value(40.0)?;
//!
//!     // Service calls take loosely typed data
//!     device.call_service("set_input_bluetooth", &serde_json::Value::Null)?;
//!
//!     // Watch a property and follow its changes
//!     device.property::<Volume>().watch();
//!     for event in device.iter() {
//!         println!("{} changed: {:?}", event.property_key, device.volume.native_value());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! od11-sdk (entities, services, config entries)
//!     ↓  worker thread + channels
//! od11-session (WebSocket session, handshake, keepalive, reconnect)
//!     ↓
//! od11-state (mirror, change events)      od11-api (wire messages, sources)
//! ```

pub mod config;
pub mod device;
pub mod entity;
pub mod error;
pub mod property;
pub mod services;
mod worker;

pub use config::{ConfigStore, DeviceConfig};
pub use device::Od11Device;
pub use entity::{Attributes, DeviceInfo, InputSelect, NumberMode, VolumeNumber};
pub use error::{Result, SdkError};
pub use property::PropertyHandle;
pub use services::{ServiceCall, SERVICE_NAMES};

pub use od11_api::{SessionId, SourceAlias, SourceId, SourceMap};
pub use od11_session::{ReconnectPolicy, SessionConfig, SessionStatus};
pub use od11_state::{
    ChangeEvent, ChangeIterator, CurrentSource, DeviceState, FirmwareRevision, MacAddress,
    Property, SessionToken, Sources, Ssid, Volume, WifiQuality,
};
