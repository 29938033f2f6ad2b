//! Wire messages for the OD-11 WebSocket protocol
//!
//! Outbound frames are JSON objects tagged by `action`; inbound frames are
//! either handshake/ping replies tagged by `response` or push notifications
//! tagged by `update`.
//!
//! ```text
//! client                                device
//!   | -- {"action":"global_join"} ------> |
//!   | <----- {"response":"global_joined"} |
//!   | -- {"action":"group_join"} -------> |
//!   | <------ {"response":"group_joined"} |   snapshot: sid, sources, state
//!   | <----- {"update":"group_volume_…"}  |   pushes from here on
//! ```

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ProtocolError, Result};
use crate::id_types::{SessionId, SourceId};

// ============================================================================
// Outbound
// ============================================================================

/// A control message sent to the device
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// First handshake step
    GlobalJoin {
        protocol_major_version: u32,
        protocol_minor_version: u32,
    },
    /// Second handshake step, sent after `global_joined`
    GroupJoin {
        color_index: u32,
        name: String,
        realtime_data: bool,
        uid: String,
    },
    /// Switch the group input
    GroupSetInputSource { source: SourceId },
    /// Relative volume change; the device has no absolute volume message
    GroupChangeVolume { amount: i32 },
    /// Application-level keepalive, answered with `speaker_pong`
    SpeakerPing { value: i64 },
}

impl Action {
    /// Protocol name of this action
    pub fn name(&self) -> &'static str {
        match self {
            Action::GlobalJoin { .. } => "global_join",
            Action::GroupJoin { .. } => "group_join",
            Action::GroupSetInputSource { .. } => "group_set_input_source",
            Action::GroupChangeVolume { .. } => "group_change_volume",
            Action::SpeakerPing { .. } => "speaker_ping",
        }
    }

    /// Group actions carry the session id once the device has assigned one
    pub fn is_group_action(&self) -> bool {
        self.name().starts_with("group_")
    }

    /// Serialize to a JSON text frame, adding `sid` to group actions
    pub fn encode(&self, sid: Option<&SessionId>) -> Result<String> {
        let encode_err = |e: serde_json::Error| ProtocolError::Encode {
            action: self.name(),
            reason: e.to_string(),
        };

        let mut value = serde_json::to_value(self).map_err(encode_err)?;
        if let (Some(sid), true, Value::Object(map)) = (sid, self.is_group_action(), &mut value) {
            if !map.contains_key("sid") {
                map.insert("sid".to_string(), serde_json::to_value(sid).map_err(encode_err)?);
            }
        }
        serde_json::to_string(&value).map_err(encode_err)
    }
}

// ============================================================================
// Inbound
// ============================================================================

/// One entry of the `sources` list in `group_joined`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SourceEntry {
    pub id: SourceId,
    #[serde(deserialize_with = "lenient_string")]
    pub name: String,
}

/// Speaker metadata carried by `speaker_added`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SpeakerInfo {
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub revision: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_i64")]
    pub wifi_quality: Option<i64>,
}

/// A state notification, either pushed on its own or embedded in a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "update", rename_all = "snake_case")]
pub enum Update {
    GroupVolumeChanged {
        #[serde(deserialize_with = "lenient_i64")]
        vol: i64,
    },
    GroupInputSourceChanged {
        source: SourceId,
    },
    SpeakerAdded {
        #[serde(default)]
        speaker: SpeakerInfo,
    },
    #[serde(other)]
    Unknown,
}

/// First handshake reply: device identity
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GlobalJoined {
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub mac: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub ssid: Option<String>,
    #[serde(default, deserialize_with = "lossy_updates")]
    pub state: Vec<Update>,
}

/// Second handshake reply: the full state snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GroupJoined {
    #[serde(default)]
    pub sid: Option<SessionId>,
    /// `None` when the device omitted the list, which is not the same as an empty list
    #[serde(default, deserialize_with = "lossy_sources")]
    pub sources: Option<Vec<SourceEntry>>,
    #[serde(default, deserialize_with = "lossy_updates")]
    pub state: Vec<Update>,
}

/// A decoded inbound frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceMessage {
    GlobalJoined(GlobalJoined),
    GroupJoined(GroupJoined),
    SpeakerPong { value: Option<i64> },
    Update(Update),
    /// The device answered with an `error` field
    Rejected { reason: String },
    /// Well-formed but not something this client acts on
    Ignored { kind: String },
}

impl DeviceMessage {
    /// Decode a text frame
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        let Value::Object(map) = value else {
            return Err(ProtocolError::UnexpectedShape(format!(
                "expected a JSON object, got {}",
                json_kind(&value)
            )));
        };

        if let Some(error) = map.get("error").filter(|e| !e.is_null()) {
            let reason = match error {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            return Ok(DeviceMessage::Rejected { reason });
        }

        if let Some(response) = map.get("response").and_then(Value::as_str).map(str::to_owned) {
            let value = Value::Object(map);
            return match response.as_str() {
                "global_joined" => Ok(DeviceMessage::GlobalJoined(serde_json::from_value(value)?)),
                "group_joined" => Ok(DeviceMessage::GroupJoined(serde_json::from_value(value)?)),
                "speaker_pong" => Ok(DeviceMessage::SpeakerPong {
                    value: value.get("value").and_then(Value::as_i64),
                }),
                _ => Ok(DeviceMessage::Ignored { kind: response }),
            };
        }

        if let Some(kind) = map.get("update").and_then(Value::as_str).map(str::to_owned) {
            return match serde_json::from_value::<Update>(Value::Object(map))? {
                Update::Unknown => Ok(DeviceMessage::Ignored { kind }),
                update => Ok(DeviceMessage::Update(update)),
            };
        }

        Err(ProtocolError::UnexpectedShape(
            "object carries neither `response` nor `update`".to_string(),
        ))
    }

    /// Short name for logging
    pub fn kind(&self) -> &str {
        match self {
            DeviceMessage::GlobalJoined(_) => "global_joined",
            DeviceMessage::GroupJoined(_) => "group_joined",
            DeviceMessage::SpeakerPong { .. } => "speaker_pong",
            DeviceMessage::Update(Update::GroupVolumeChanged { .. }) => "group_volume_changed",
            DeviceMessage::Update(Update::GroupInputSourceChanged { .. }) => {
                "group_input_source_changed"
            }
            DeviceMessage::Update(Update::SpeakerAdded { .. }) => "speaker_added",
            DeviceMessage::Update(Update::Unknown) => "unknown",
            DeviceMessage::Rejected { .. } => "error",
            DeviceMessage::Ignored { kind } => kind,
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ============================================================================
// Lenient field decoding
// ============================================================================

fn value_to_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn lenient_i64<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<i64, D::Error> {
    let value = Value::deserialize(d)?;
    value_to_i64(&value)
        .ok_or_else(|| de::Error::custom(format!("expected an integer, got {}", json_kind(&value))))
}

fn lenient_opt_i64<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<i64>, D::Error> {
    Ok(value_to_i64(&Value::deserialize(d)?))
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<String, D::Error> {
    let value = Value::deserialize(d)?;
    value_to_string(&value)
        .ok_or_else(|| de::Error::custom(format!("expected a string, got {}", json_kind(&value))))
}

fn lenient_opt_string<'de, D: Deserializer<'de>>(
    d: D,
) -> std::result::Result<Option<String>, D::Error> {
    Ok(value_to_string(&Value::deserialize(d)?))
}

// Snapshot lists skip entries they cannot read instead of failing the frame
fn lossy_updates<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Vec<Update>, D::Error> {
    let items = match Value::deserialize(d)? {
        Value::Array(items) => items,
        _ => return Ok(Vec::new()),
    };
    Ok(items
        .into_iter()
        .filter_map(|item| serde_json::from_value::<Update>(item).ok())
        .filter(|update| *update != Update::Unknown)
        .collect())
}

fn lossy_sources<'de, D: Deserializer<'de>>(
    d: D,
) -> std::result::Result<Option<Vec<SourceEntry>>, D::Error> {
    match Value::deserialize(d)? {
        Value::Array(items) => Ok(Some(
            items
                .into_iter()
                .filter_map(|item| serde_json::from_value::<SourceEntry>(item).ok())
                .collect(),
        )),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_global_join_encoding() {
        let action = Action::GlobalJoin {
            protocol_major_version: 0,
            protocol_minor_version: 4,
        };
        let value: Value = serde_json::from_str(&action.encode(None).unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"action": "global_join", "protocol_major_version": 0, "protocol_minor_version": 4})
        );
    }

    #[test]
    fn test_group_action_carries_sid() {
        let action = Action::GroupChangeVolume { amount: -5 };
        let sid = SessionId::from(77);
        let value: Value = serde_json::from_str(&action.encode(Some(&sid)).unwrap()).unwrap();
        assert_eq!(value, json!({"action": "group_change_volume", "amount": -5, "sid": 77}));
    }

    #[test]
    fn test_ping_never_carries_sid() {
        let action = Action::SpeakerPing { value: 1_700_000_000_000 };
        let sid = SessionId::from(77);
        let value: Value = serde_json::from_str(&action.encode(Some(&sid)).unwrap()).unwrap();
        assert!(value.get("sid").is_none());
        assert_eq!(value["action"], "speaker_ping");
    }

    #[test]
    fn test_parse_group_joined_snapshot() {
        let frame = json!({
            "response": "group_joined",
            "sid": 12,
            "sources": [
                {"id": 0, "name": "AirPlay"},
                {"id": 4, "name": "Optical"},
                {"name": "no id"}
            ],
            "state": [
                {"update": "group_volume_changed", "vol": 30},
                {"update": "group_input_source_changed", "source": 4},
                {"update": "group_volume_changed"},
                {"update": "something_new", "x": 1}
            ]
        })
        .to_string();

        let DeviceMessage::GroupJoined(snapshot) = DeviceMessage::parse(&frame).unwrap() else {
            panic!("expected group_joined");
        };
        assert_eq!(snapshot.sid, Some(SessionId::from(12)));
        assert_eq!(snapshot.sources.as_ref().map(Vec::len), Some(2));
        assert_eq!(
            snapshot.state,
            vec![
                Update::GroupVolumeChanged { vol: 30 },
                Update::GroupInputSourceChanged { source: SourceId::from(4) },
            ]
        );
    }

    #[test]
    fn test_parse_global_joined_speaker_info() {
        let frame = json!({
            "response": "global_joined",
            "mac": "00:11:22:33:44:55",
            "ssid": "home",
            "state": [{"update": "speaker_added", "speaker": {"revision": 42, "wifi_quality": "71"}}]
        })
        .to_string();

        let DeviceMessage::GlobalJoined(joined) = DeviceMessage::parse(&frame).unwrap() else {
            panic!("expected global_joined");
        };
        assert_eq!(joined.mac.as_deref(), Some("00:11:22:33:44:55"));
        assert_eq!(
            joined.state,
            vec![Update::SpeakerAdded {
                speaker: SpeakerInfo {
                    revision: Some("42".to_string()),
                    wifi_quality: Some(71),
                }
            }]
        );
    }

    #[test]
    fn test_parse_push_updates() {
        let msg = DeviceMessage::parse(r#"{"update":"group_volume_changed","vol":"55"}"#).unwrap();
        assert_eq!(msg, DeviceMessage::Update(Update::GroupVolumeChanged { vol: 55 }));

        let msg = DeviceMessage::parse(r#"{"update":"group_input_source_changed","source":"o"}"#)
            .unwrap();
        assert_eq!(
            msg,
            DeviceMessage::Update(Update::GroupInputSourceChanged { source: SourceId::new("o") })
        );
    }

    #[test]
    fn test_parse_unknown_messages_are_ignored() {
        let msg = DeviceMessage::parse(r#"{"update":"group_metadata_changed","title":"x"}"#).unwrap();
        assert_eq!(msg, DeviceMessage::Ignored { kind: "group_metadata_changed".to_string() });
        assert_eq!(msg.kind(), "group_metadata_changed");
    }

    #[test]
    fn test_parse_rejection() {
        let msg = DeviceMessage::parse(r#"{"response":"group_joined","error":"denied"}"#).unwrap();
        assert_eq!(msg, DeviceMessage::Rejected { reason: "denied".to_string() });
    }

    #[test]
    fn test_parse_malformed() {
        assert!(matches!(DeviceMessage::parse("not json"), Err(ProtocolError::Malformed(_))));
        assert!(matches!(DeviceMessage::parse("[1,2]"), Err(ProtocolError::UnexpectedShape(_))));
        assert!(matches!(DeviceMessage::parse(r#"{"hello":1}"#), Err(ProtocolError::UnexpectedShape(_))));
        assert!(matches!(
            DeviceMessage::parse(r#"{"update":"group_volume_changed"}"#),
            Err(ProtocolError::Malformed(_))
        ));
    }
}
