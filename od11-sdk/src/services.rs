//! Service calls in the `od11` domain
//!
//! Service data arrives as loosely typed JSON. [`ServiceCall::parse`] turns
//! it into a typed call or an [`SdkError::InvalidServiceCall`]; range and
//! source checks happen later, in the session.

use serde_json::{Map, Value};

use od11_api::defaults::DOMAIN;
use od11_api::SourceAlias;

use crate::error::{Result, SdkError};

pub const VOLUME_SET: &str = "volume_set";
pub const VOLUME_NUDGE: &str = "volume_nudge";
pub const SET_INPUT: &str = "set_input";

/// Every service the integration registers
pub const SERVICE_NAMES: [&str; 9] = [
    VOLUME_SET,
    VOLUME_NUDGE,
    SET_INPUT,
    "set_input_airplay",
    "set_input_spotify",
    "set_input_playlist",
    "set_input_linein",
    "set_input_optical",
    "set_input_bluetooth",
];

/// A validated service call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceCall {
    /// `volume_set(volume: int)`
    VolumeSet { volume: i32 },
    /// `volume_nudge(amount: int)`
    VolumeNudge { amount: i32 },
    /// `set_input(source: string)`
    SetInput { source: String },
    /// `set_input_<alias>()`, no data
    SetInputPreset(SourceAlias),
}

impl ServiceCall {
    /// Parse a service call by name (with or without the `od11.` prefix)
    pub fn parse(name: &str, data: &Value) -> Result<Self> {
        let service = name.strip_prefix("od11.").unwrap_or(name);
        let empty = Map::new();
        let fields = match data {
            Value::Object(map) => map,
            Value::Null => &empty,
            other => {
                return Err(SdkError::invalid_call(
                    service,
                    format!("service data must be an object, got {}", other),
                ))
            }
        };

        match service {
            VOLUME_SET => Ok(ServiceCall::VolumeSet {
                volume: int_field(service, fields, "volume")?,
            }),
            VOLUME_NUDGE => Ok(ServiceCall::VolumeNudge {
                amount: int_field(service, fields, "amount")?,
            }),
            SET_INPUT => Ok(ServiceCall::SetInput {
                source: source_field(service, fields)?,
            }),
            other => other
                .strip_prefix("set_input_")
                .and_then(|key| SourceAlias::ALL.into_iter().find(|a| a.key() == key))
                .map(ServiceCall::SetInputPreset)
                .ok_or_else(|| SdkError::UnknownService(format!("{}.{}", DOMAIN, other))),
        }
    }

    /// Service name without the domain
    pub fn service(&self) -> String {
        match self {
            ServiceCall::VolumeSet { .. } => VOLUME_SET.to_string(),
            ServiceCall::VolumeNudge { .. } => VOLUME_NUDGE.to_string(),
            ServiceCall::SetInput { .. } => SET_INPUT.to_string(),
            ServiceCall::SetInputPreset(alias) => format!("set_input_{}", alias.key()),
        }
    }
}

/// Integer field; accepts JSON integers, floats (truncated) and integer text
fn int_field(service: &str, fields: &Map<String, Value>, field: &str) -> Result<i32> {
    let value = fields
        .get(field)
        .ok_or_else(|| SdkError::invalid_call(service, format!("missing `{}`", field)))?;

    let parsed = match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };

    parsed
        .and_then(|n| i32::try_from(n).ok())
        .ok_or_else(|| {
            SdkError::invalid_call(service, format!("`{}` must be an integer, got {}", field, value))
        })
}

fn source_field(service: &str, fields: &Map<String, Value>) -> Result<String> {
    let source = match fields.get("source") {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(other) => {
            return Err(SdkError::invalid_call(
                service,
                format!("`source` must be a string, got {}", other),
            ))
        }
        None => return Err(SdkError::invalid_call(service, "missing `source`")),
    };
    if source.is_empty() {
        return Err(SdkError::invalid_call(service, "`source` must not be empty"));
    }
    Ok(source)
}
