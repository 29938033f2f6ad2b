//! Home Assistant style entities backed by the state mirror
//!
//! Each device exposes a volume number and an input select. Reads come from
//! the mirror and never touch the network; writes go through the session
//! worker and block until the device accepted the command.

use std::sync::Arc;

use serde::Serialize;

use od11_api::defaults::{DOMAIN, MAX_VOLUME, MIN_VOLUME};
use od11_api::{SessionId, SourceId, SourceMap};
use od11_state::DeviceState;

use crate::device::DeviceContext;
use crate::error::{Result, SdkError};

const MANUFACTURER: &str = "Teenage Engineering";
const MODEL: &str = "OD-11";

/// How a number entity is rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NumberMode {
    Auto,
    Box,
    Slider,
}

/// Device registry entry shared by all entities of one speaker
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub identifiers: Vec<(String, String)>,
    pub manufacturer: String,
    pub model: String,
    pub name: String,
    pub entry_type: String,
}

impl DeviceInfo {
    pub fn for_host(host: &str) -> Self {
        Self {
            identifiers: vec![(DOMAIN.to_string(), host.to_string())],
            manufacturer: MANUFACTURER.to_string(),
            model: MODEL.to_string(),
            name: format!("{} {}", MODEL, host),
            entry_type: "service".to_string(),
        }
    }
}

/// Extra state attributes published with the entities
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Attributes {
    pub sid: Option<SessionId>,
    pub source_id: Option<SourceId>,
    pub sources: SourceMap,
    pub wifi_quality: Option<i64>,
    pub revision: Option<String>,
    pub mac: Option<String>,
    pub ssid: Option<String>,
}

impl Attributes {
    pub fn from_state(state: &DeviceState) -> Self {
        Self {
            sid: state.sid().cloned(),
            source_id: state.current_source_id().cloned(),
            sources: state.source_map(),
            wifi_quality: state.wifi_quality.map(|w| w.0),
            revision: state.firmware_revision.as_ref().map(|r| r.0.clone()),
            mac: state.mac_address.as_ref().map(|m| m.0.clone()),
            ssid: state.ssid.as_ref().map(|s| s.0.clone()),
        }
    }
}

/// `<domain>.<slug(device name)>_<suffix>`, e.g. `number.od_11_10_0_0_5_volume`
fn entity_id(domain: &str, device_name: &str, suffix: &str) -> String {
    format!("{}.{}_{}", domain, slugify(device_name), suffix)
}

/// Lowercase, with every run of other characters collapsed to one `_`
pub(crate) fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if !slug.is_empty() && !slug.ends_with('_') {
            slug.push('_');
        }
    }
    while slug.ends_with('_') {
        slug.pop();
    }
    slug
}

/// `number.<device>_volume`
#[derive(Clone)]
pub struct VolumeNumber {
    context: Arc<DeviceContext>,
    unique_id: String,
    entity_id: String,
}

impl VolumeNumber {
    pub const NAME: &'static str = "Volume";
    pub const NATIVE_MIN_VALUE: f64 = MIN_VOLUME as f64;
    pub const NATIVE_MAX_VALUE: f64 = MAX_VOLUME as f64;
    pub const NATIVE_STEP: f64 = 1.0;
    pub const MODE: NumberMode = NumberMode::Slider;

    pub(crate) fn new(context: Arc<DeviceContext>, device_info: &DeviceInfo) -> Self {
        Self {
            unique_id: format!("{}_volume", context.host),
            entity_id: entity_id("number", &device_info.name, "volume"),
            context,
        }
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn available(&self) -> bool {
        self.context.available()
    }

    /// Last mirrored volume
    pub fn native_value(&self) -> Option<f64> {
        self.context.mirror.snapshot().volume().map(f64::from)
    }

    /// Set the volume; fractional values are truncated
    pub fn set_native_value(&self, value: f64) -> Result<()> {
        if !value.is_finite() {
            return Err(SdkError::InvalidValue(format!(
                "{} is not a volume",
                value
            )));
        }
        let truncated = value.trunc().clamp(i32::MIN as f64, i32::MAX as f64) as i32;
        self.context.set_volume(truncated)
    }
}

impl std::fmt::Debug for VolumeNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VolumeNumber")
            .field("entity_id", &self.entity_id)
            .field("native_value", &self.native_value())
            .finish()
    }
}

/// `select.<device>_input`
#[derive(Clone)]
pub struct InputSelect {
    context: Arc<DeviceContext>,
    unique_id: String,
    entity_id: String,
}

impl InputSelect {
    pub const NAME: &'static str = "Input";

    pub(crate) fn new(context: Arc<DeviceContext>, device_info: &DeviceInfo) -> Self {
        Self {
            unique_id: format!("{}_input", context.host),
            entity_id: entity_id("select", &device_info.name, "input"),
            context,
        }
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn available(&self) -> bool {
        self.context.available()
    }

    /// Source names, ordered by source id
    pub fn options(&self) -> Vec<String> {
        self.context.mirror.snapshot().source_map().into_values().collect()
    }

    /// Name of the selected source, if it is a listed one
    pub fn current_option(&self) -> Option<String> {
        self.context
            .mirror
            .snapshot()
            .current_source_name()
            .map(str::to_string)
    }

    /// Switch to a source by its exact name, falling back to relaxed
    /// resolution (ids, aliases, partial names)
    pub fn select_option(&self, option: &str) -> Result<()> {
        let sources = self.context.mirror.snapshot().source_map();
        match sources.iter().find(|(_, name)| name.as_str() == option) {
            Some((id, _)) => self.context.set_input(id.to_string()),
            None => self.context.set_input(option.to_string()),
        }
    }
}

impl std::fmt::Debug for InputSelect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputSelect")
            .field("entity_id", &self.entity_id)
            .field("current_option", &self.current_option())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use od11_state::{CurrentSource, FirmwareRevision, SessionToken, Sources, WifiQuality};
    use rstest::rstest;

    #[rstest]
    #[case("OD-11 10.0.0.5", "od_11_10_0_0_5")]
    #[case("OD-11 od11.local:8080", "od_11_od11_local_8080")]
    #[case("  Living Room  ", "living_room")]
    #[case("--", "")]
    fn test_slugify(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(slugify(input), expected);
    }

    #[test]
    fn test_device_info() {
        let info = DeviceInfo::for_host("10.13.12.212");
        assert_eq!(info.name, "OD-11 10.13.12.212");
        assert_eq!(info.manufacturer, "Teenage Engineering");
        assert_eq!(info.model, "OD-11");
        assert_eq!(
            info.identifiers,
            vec![("od11".to_string(), "10.13.12.212".to_string())]
        );
    }

    #[test]
    fn test_entity_ids() {
        let info = DeviceInfo::for_host("10.0.0.5");
        assert_eq!(
            entity_id("number", &info.name, "volume"),
            "number.od_11_10_0_0_5_volume"
        );
        assert_eq!(
            entity_id("select", &info.name, "input"),
            "select.od_11_10_0_0_5_input"
        );
    }

    #[test]
    fn test_volume_constants() {
        assert_eq!(VolumeNumber::NATIVE_MIN_VALUE, 0.0);
        assert_eq!(VolumeNumber::NATIVE_MAX_VALUE, 100.0);
        assert_eq!(VolumeNumber::NATIVE_STEP, 1.0);
        assert_eq!(VolumeNumber::MODE, NumberMode::Slider);
        assert_eq!(serde_json::to_value(NumberMode::Slider).unwrap(), "slider");
    }

    #[test]
    fn test_attributes_from_state() {
        let mut sources = SourceMap::new();
        sources.insert(SourceId::from(0), "AirPlay".to_string());
        sources.insert(SourceId::from(4), "Optical".to_string());
        let state = DeviceState {
            session_id: Some(SessionToken(SessionId::from(42))),
            current_source: Some(CurrentSource(SourceId::from(4))),
            sources: Some(Sources(sources)),
            wifi_quality: Some(WifiQuality(70)),
            firmware_revision: Some(FirmwareRevision("2.1.0".to_string())),
            ..Default::default()
        };

        let attributes = Attributes::from_state(&state);
        assert_eq!(attributes.sid, Some(SessionId::from(42)));
        assert_eq!(attributes.source_id, Some(SourceId::from(4)));
        assert_eq!(attributes.wifi_quality, Some(70));
        assert_eq!(attributes.revision.as_deref(), Some("2.1.0"));
        assert!(attributes.mac.is_none());

        let json = serde_json::to_value(&attributes).unwrap();
        assert_eq!(json["sid"], 42);
        assert_eq!(json["source_id"], 4);
        assert_eq!(json["sources"]["4"], "Optical");
    }

    #[test]
    fn test_attributes_empty_state() {
        let attributes = Attributes::from_state(&DeviceState::default());
        assert_eq!(attributes, Attributes::default());
    }
}
