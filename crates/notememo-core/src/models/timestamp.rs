//! Serde helpers that pin timestamps to ISO 8601 with millisecond precision.

use serde::{Deserialize, Deserializer, Serializer};

use super::Timestamp;
use crate::util::{parse_iso, to_iso};

pub mod iso {
    use super::{parse_iso, to_iso, Deserialize, Deserializer, Serializer, Timestamp};

    pub fn serialize<S: Serializer>(value: &Timestamp, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&to_iso(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Timestamp, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_iso(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid ISO 8601 timestamp: {raw}")))
    }
}

pub mod iso_option {
    use super::{parse_iso, to_iso, Deserialize, Deserializer, Serializer, Timestamp};

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(
        value: &Option<Timestamp>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(value) => serializer.serialize_str(&to_iso(value)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Timestamp>, D::Error> {
        // Older payloads send `null` or an empty string for "never"
        let raw = Option::<String>::deserialize(deserializer)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(value) => parse_iso(value).map(Some).ok_or_else(|| {
                serde::de::Error::custom(format!("invalid ISO 8601 timestamp: {value}"))
            }),
        }
    }
}
