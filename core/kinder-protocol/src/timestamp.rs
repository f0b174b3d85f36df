//! Timestamp handling for session and vote dates.
//!
//! Sources emit RFC 3339, RFC 2822 (`Sun, 25 May 2025 12:01:23 GMT`) or bare
//! SQL datetimes (`2025-05-25 12:03:10.123456`, assumed UTC). Everything is
//! written back as RFC 3339.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{de, Deserialize, Deserializer, Serializer};

use crate::ProtocolError;

const SQL_DATETIME: &str = "%Y-%m-%d %H:%M:%S%.f";

pub fn parse(value: &str) -> Result<DateTime<Utc>, ProtocolError> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = DateTime::parse_from_rfc2822(value) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, SQL_DATETIME)
        .map(|naive| Utc.from_utc_datetime(&naive))
        .map_err(|_| ProtocolError::InvalidTimestamp(value.to_string()))
}

pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&value.to_rfc3339())
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse(&raw).map_err(de::Error::custom)
}

pub mod option {
    use super::*;

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(value) => serializer.serialize_some(&value.to_rfc3339()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        match raw {
            Some(raw) if !raw.trim().is_empty() => parse(&raw).map(Some).map_err(de::Error::custom),
            _ => Ok(None),
        }
    }
}
