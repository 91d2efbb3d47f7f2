//! `ParamUpdate`: the normalized unit of change flowing from the realtime
//! channel into the event bus and parameter store.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::address::Channel;

/// Side-table metadata the backend attaches to some register updates.
/// Kept alongside the value rather than merged into it, mirroring
/// `ParamFamilyModel`'s separate bookkeeping fields in the source model.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ParamMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storable: Option<bool>,
    #[serde(default, rename = "createdAt", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(
        default,
        rename = "previousCreatedAt",
        skip_serializing_if = "Option::is_none"
    )]
    pub previous_created_at: Option<String>,
    #[serde(default, rename = "updatedAt", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(
        default,
        rename = "updatedAtClient",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at_client: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expire: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average: Option<f64>,
}

impl ParamMeta {
    /// Pulls the recognized metadata keys out of a raw update payload,
    /// returning `None` if none of them were present.
    pub fn extract(raw: &serde_json::Map<String, Value>) -> Option<Self> {
        let meta = ParamMeta {
            storable: raw.get("storable").and_then(Value::as_bool),
            created_at: raw
                .get("createdAt")
                .and_then(Value::as_str)
                .map(str::to_string),
            previous_created_at: raw
                .get("previousCreatedAt")
                .and_then(Value::as_str)
                .map(str::to_string),
            updated_at: raw
                .get("updatedAt")
                .and_then(Value::as_str)
                .map(str::to_string),
            updated_at_client: raw
                .get("updatedAtClient")
                .and_then(Value::as_str)
                .map(str::to_string),
            expire: raw.get("expire").and_then(Value::as_i64),
            average: raw.get("average").and_then(Value::as_f64),
        };
        if meta == ParamMeta::default() {
            None
        } else {
            Some(meta)
        }
    }
}

/// A single register update, already addressed and sequenced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamUpdate {
    pub devid: String,
    pub pool: String,
    pub chan: Channel,
    pub idx: u32,
    pub value: Value,
    #[serde(default)]
    pub meta: Option<ParamMeta>,
    /// Monotonic sequence number assigned by the event bus on publish.
    #[serde(default)]
    pub seq: u64,
}

impl Serialize for Channel {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_char(self.tag())
    }
}

impl<'de> Deserialize<'de> for Channel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let c = s.chars().next().ok_or_else(|| {
            serde::de::Error::custom("empty channel tag")
        })?;
        Channel::from_tag(c).ok_or_else(|| serde::de::Error::custom(format!("unknown channel tag '{c}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_known_metadata_keys_only() {
        let raw = json!({
            "value": 12,
            "storable": true,
            "createdAt": "2024-01-01T00:00:00Z",
            "unrelated": "ignored",
        });
        let map = raw.as_object().unwrap();
        let meta = ParamMeta::extract(map).unwrap();
        assert_eq!(meta.storable, Some(true));
        assert_eq!(meta.created_at.as_deref(), Some("2024-01-01T00:00:00Z"));
        assert!(meta.expire.is_none());
    }

    #[test]
    fn no_metadata_present_yields_none() {
        let raw = json!({"value": 1});
        assert!(ParamMeta::extract(raw.as_object().unwrap()).is_none());
    }

    #[test]
    fn param_update_round_trips_channel() {
        let update = ParamUpdate {
            devid: "dev-1".into(),
            pool: "1".into(),
            chan: Channel::Status,
            idx: 19,
            value: json!(true),
            meta: None,
            seq: 7,
        };
        let text = serde_json::to_string(&update).unwrap();
        let back: ParamUpdate = serde_json::from_str(&text).unwrap();
        assert_eq!(back.chan, Channel::Status);
        assert_eq!(back.seq, 7);
    }
}
