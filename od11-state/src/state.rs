//! Snapshot of everything mirrored for one device connection

use serde::Serialize;

use od11_api::{SessionId, SourceId, SourceMap};

use crate::property::{
    CurrentSource, FirmwareRevision, MacAddress, SessionToken, Sources, Ssid, Volume, WifiQuality,
};

/// Mirrored device state
///
/// Empty when a connection starts, filled by the `group_joined` snapshot and
/// patched by push updates. Fields the device never mentioned stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeviceState {
    pub session_id: Option<SessionToken>,
    pub volume: Option<Volume>,
    pub current_source: Option<CurrentSource>,
    pub sources: Option<Sources>,
    pub wifi_quality: Option<WifiQuality>,
    pub firmware_revision: Option<FirmwareRevision>,
    pub mac_address: Option<MacAddress>,
    pub ssid: Option<Ssid>,
    /// Set once the `group_joined` snapshot has been applied
    #[serde(skip)]
    pub snapshot_received: bool,
}

impl DeviceState {
    /// Whether the handshake snapshot has been applied
    pub fn is_ready(&self) -> bool {
        self.snapshot_received
    }

    pub fn sid(&self) -> Option<&SessionId> {
        self.session_id.as_ref().map(|t| &t.0)
    }

    pub fn volume(&self) -> Option<u8> {
        self.volume.map(|v| v.value())
    }

    pub fn current_source_id(&self) -> Option<&SourceId> {
        self.current_source.as_ref().map(CurrentSource::id)
    }

    /// Known sources, empty before the snapshot
    pub fn source_map(&self) -> SourceMap {
        self.sources
            .as_ref()
            .map(|s| s.map().clone())
            .unwrap_or_default()
    }

    /// Display name of the current source
    pub fn current_source_name(&self) -> Option<&str> {
        let id = self.current_source_id()?;
        self.sources.as_ref()?.name(id)
    }
}
