//! Message decoder - converts device messages to typed property changes
//!
//! Handshake replies decode to several changes at once. The order matters
//! for `group_joined`: the session token and source list come before the
//! embedded state items so that the current source is checked against the
//! list that arrived in the same frame.

use od11_api::{DeviceMessage, SourceMap, SpeakerInfo, Update};

use crate::property::{
    CurrentSource, FirmwareRevision, MacAddress, Property, SessionToken, Sources, Ssid, Volume,
    WifiQuality,
};

/// Decoded changes from a single message
#[derive(Debug)]
pub struct DecodedChanges {
    /// Message kind, for logging
    pub kind: String,
    /// Property changes, in application order
    pub changes: Vec<PropertyChange>,
    /// The message was the `group_joined` snapshot
    pub completes_snapshot: bool,
}

/// A single property change
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyChange {
    SessionToken(SessionToken),
    Volume(Volume),
    CurrentSource(CurrentSource),
    Sources(Sources),
    WifiQuality(WifiQuality),
    FirmwareRevision(FirmwareRevision),
    MacAddress(MacAddress),
    Ssid(Ssid),
}

impl PropertyChange {
    /// Get the property key for this change
    pub fn key(&self) -> &'static str {
        match self {
            PropertyChange::SessionToken(_) => SessionToken::KEY,
            PropertyChange::Volume(_) => Volume::KEY,
            PropertyChange::CurrentSource(_) => CurrentSource::KEY,
            PropertyChange::Sources(_) => Sources::KEY,
            PropertyChange::WifiQuality(_) => WifiQuality::KEY,
            PropertyChange::FirmwareRevision(_) => FirmwareRevision::KEY,
            PropertyChange::MacAddress(_) => MacAddress::KEY,
            PropertyChange::Ssid(_) => Ssid::KEY,
        }
    }
}

/// Decode a device message into typed property changes
pub fn decode(message: &DeviceMessage) -> DecodedChanges {
    let mut changes = Vec::new();
    let mut completes_snapshot = false;

    match message {
        DeviceMessage::GlobalJoined(joined) => {
            if let Some(mac) = &joined.mac {
                changes.push(PropertyChange::MacAddress(MacAddress(mac.clone())));
            }
            if let Some(ssid) = &joined.ssid {
                changes.push(PropertyChange::Ssid(Ssid(ssid.clone())));
            }
            changes.extend(joined.state.iter().flat_map(decode_update));
        }
        DeviceMessage::GroupJoined(joined) => {
            if let Some(sid) = &joined.sid {
                changes.push(PropertyChange::SessionToken(SessionToken(sid.clone())));
            }
            if let Some(entries) = &joined.sources {
                let map: SourceMap = entries
                    .iter()
                    .map(|entry| (entry.id.clone(), entry.name.clone()))
                    .collect();
                changes.push(PropertyChange::Sources(Sources(map)));
            }
            changes.extend(joined.state.iter().flat_map(decode_update));
            completes_snapshot = true;
        }
        DeviceMessage::Update(update) => changes.extend(decode_update(update)),
        DeviceMessage::SpeakerPong { .. }
        | DeviceMessage::Rejected { .. }
        | DeviceMessage::Ignored { .. } => {}
    }

    DecodedChanges {
        kind: message.kind().to_string(),
        changes,
        completes_snapshot,
    }
}

/// Decode one state notification
fn decode_update(update: &Update) -> Vec<PropertyChange> {
    match update {
        Update::GroupVolumeChanged { vol } => {
            vec![PropertyChange::Volume(Volume::from_device(*vol))]
        }
        Update::GroupInputSourceChanged { source } => {
            vec![PropertyChange::CurrentSource(CurrentSource(source.clone()))]
        }
        Update::SpeakerAdded { speaker } => decode_speaker(speaker),
        Update::Unknown => vec![],
    }
}

fn decode_speaker(speaker: &SpeakerInfo) -> Vec<PropertyChange> {
    let mut changes = vec![];

    if let Some(revision) = &speaker.revision {
        changes.push(PropertyChange::FirmwareRevision(FirmwareRevision(revision.clone())));
    }
    if let Some(quality) = speaker.wifi_quality {
        changes.push(PropertyChange::WifiQuality(WifiQuality(quality)));
    }

    changes
}
