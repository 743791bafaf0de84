use std::fmt::{Display, Formatter, Result as FmtResult};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::errors::ModelError;

/// Formats accepted for timestamps that arrive without an offset.
const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"];

/// UTC instant used for message ordering and display.
///
/// Serializes as RFC 3339. Deserialization also accepts the offset-less
/// `YYYY-MM-DD HH:MM:SS` form some API responses use, interpreted as UTC.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct Timestamp(pub DateTime<Utc>);

impl Timestamp {
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Parse a timestamp string from an API or push payload.
    ///
    /// # Errors
    /// Returns [`ModelError::InvalidTimestamp`] when no supported format matches.
    pub fn parse(value: &str) -> Result<Self, ModelError> {
        let trimmed = value.trim();
        if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
            return Ok(Self(parsed.with_timezone(&Utc)));
        }

        NAIVE_FORMATS
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
            .map(|naive| Self(naive.and_utc()))
            .ok_or_else(|| ModelError::InvalidTimestamp(value.to_string()))
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.0.format("%Y-%m-%d %H:%M:%S"))
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(value: DateTime<Utc>) -> Self {
        Self(value)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_rfc3339_with_fractional_seconds() {
        let ts = Timestamp::parse("2025-03-08T14:30:00.000000Z").unwrap();
        assert_eq!(ts.0, Utc.with_ymd_and_hms(2025, 3, 8, 14, 30, 0).unwrap());
    }

    #[test]
    fn parses_offset_and_normalizes_to_utc() {
        let ts = Timestamp::parse("2025-03-08T16:30:00+02:00").unwrap();
        assert_eq!(ts.0, Utc.with_ymd_and_hms(2025, 3, 8, 14, 30, 0).unwrap());
    }

    #[test]
    fn parses_naive_database_format() {
        let ts = Timestamp::parse("2025-03-08 14:30:00").unwrap();
        assert_eq!(ts.0, Utc.with_ymd_and_hms(2025, 3, 8, 14, 30, 0).unwrap());
    }

    #[test]
    fn rejects_garbage() {
        let err = Timestamp::parse("yesterday").unwrap_err();
        assert!(matches!(err, ModelError::InvalidTimestamp(value) if value == "yesterday"));
    }

    #[test]
    fn serializes_as_rfc3339() {
        let ts = Timestamp(Utc.with_ymd_and_hms(2025, 3, 8, 14, 30, 0).unwrap());
        let serialized = serde_json::to_string(&ts).unwrap();
        assert_eq!(serialized, "\"2025-03-08T14:30:00Z\"");
    }

    #[test]
    fn display_uses_short_form() {
        let ts = Timestamp(Utc.with_ymd_and_hms(2025, 3, 8, 14, 30, 0).unwrap());
        assert_eq!(ts.to_string(), "2025-03-08 14:30:00");
    }
}
