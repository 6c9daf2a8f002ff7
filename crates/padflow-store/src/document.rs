use serde::{Deserialize, Serialize};

use crate::{Result, StoreError};

pub(crate) const CURRENT_VERSION: u8 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct DocumentV1 {
    pub version: u8,
    pub controller: String,
    pub fingerprint: String,
    #[serde(default)]
    pub controls: Vec<ControlEntryV1>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ControlEntryV1 {
    pub name: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dead_zone: Option<DeadZoneV1>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub granularity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub center: Option<String>,
    #[serde(default)]
    pub inverted: bool,
    #[serde(default)]
    pub turbo: bool,
    #[serde(default)]
    pub turbo_delay_ms: u64,
    #[serde(default)]
    pub user_id: i32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bindings: Vec<BindingV1>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct DeadZoneV1 {
    pub lower: String,
    pub upper: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct BindingV1 {
    pub value: String,
    pub id: i32,
}

/// Only the version, read before picking a schema.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Versioned {
    pub version: u8,
}

/// Encodes `value` as `0x` followed by eight hex digits of its bits.
pub(crate) fn encode_f32(value: f32) -> String {
    format!("{:#010x}", value.to_bits())
}

pub(crate) fn decode_f32(field: &'static str, text: &str) -> Result<f32> {
    let bad = || StoreError::BadFloat {
        field,
        value: text.to_owned(),
    };
    let digits = text.strip_prefix("0x").ok_or_else(bad)?;
    if digits.len() != 8 {
        return Err(bad());
    }
    u32::from_str_radix(digits, 16)
        .map(f32::from_bits)
        .map_err(|_| bad())
}
