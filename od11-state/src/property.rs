//! Typed properties of the mirrored device state
//!
//! Each property is a small newtype with a stable `KEY`. The keys double as
//! the attribute names the entity layer publishes (`sid`, `volume`,
//! `source_id`, ...).

use serde::Serialize;

use od11_api::defaults::MAX_VOLUME;
use od11_api::{SessionId, SourceId, SourceMap};

use crate::state::DeviceState;

/// A single mirrored value
///
/// Properties must be:
/// - Clone + PartialEq: change detection compares old and new values
/// - Send + Sync + 'static: the mirror is shared across threads
///
/// `read`/`write` bind the property to its slot in [`DeviceState`], which
/// lets callers ask for values by type (`mirror.get::<Volume>()`).
pub trait Property: Clone + Send + Sync + PartialEq + 'static {
    /// Unique key identifying this property
    const KEY: &'static str;

    /// Current value in `state`, if known
    fn read(state: &DeviceState) -> Option<Self>;

    /// Store this value in `state`
    fn write(self, state: &mut DeviceState);
}

macro_rules! impl_property {
    ($name:ident, $key:literal, $field:ident) => {
        impl Property for $name {
            const KEY: &'static str = $key;

            fn read(state: &DeviceState) -> Option<Self> {
                state.$field.clone()
            }

            fn write(self, state: &mut DeviceState) {
                state.$field = Some(self);
            }
        }
    };
}

/// Session token assigned by the device in `group_joined`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionToken(pub SessionId);

impl_property!(SessionToken, "sid", session_id);

/// Group volume (0-100)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Volume(pub u8);

impl_property!(Volume, "volume", volume);

impl Volume {
    pub fn new(value: u8) -> Self {
        Self(value.min(MAX_VOLUME))
    }

    /// Clamp a raw device value into range
    pub fn from_device(raw: i64) -> Self {
        Self(raw.clamp(0, MAX_VOLUME as i64) as u8)
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

/// Currently selected input
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CurrentSource(pub SourceId);

impl_property!(CurrentSource, "source_id", current_source);

impl CurrentSource {
    pub fn id(&self) -> &SourceId {
        &self.0
    }
}

/// Inputs the device offers
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Sources(pub SourceMap);

impl_property!(Sources, "sources", sources);

impl Sources {
    pub fn map(&self) -> &SourceMap {
        &self.0
    }

    pub fn contains(&self, id: &SourceId) -> bool {
        self.0.contains_key(id)
    }

    pub fn name(&self, id: &SourceId) -> Option<&str> {
        self.0.get(id).map(String::as_str)
    }
}

/// Wi-Fi link quality as reported by the speaker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WifiQuality(pub i64);

impl_property!(WifiQuality, "wifi_quality", wifi_quality);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FirmwareRevision(pub String);

impl_property!(FirmwareRevision, "revision", firmware_revision);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MacAddress(pub String);

impl_property!(MacAddress, "mac", mac_address);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ssid(pub String);

impl_property!(Ssid, "ssid", ssid);

/// Every property key, in attribute order
pub const ALL_KEYS: [&str; 8] = [
    SessionToken::KEY,
    Volume::KEY,
    CurrentSource::KEY,
    Sources::KEY,
    WifiQuality::KEY,
    FirmwareRevision::KEY,
    MacAddress::KEY,
    Ssid::KEY,
];
