//! Duration parsing utilities.

use crate::error::SyncError;
use std::time::Duration;

/// Parse a duration string like "1h", "30m", "300s", "300" into a Duration.
/// Supports:
/// - Plain numbers (interpreted as seconds): "300"
/// - Seconds suffix: "300s"
/// - Minutes suffix: "30m"
/// - Hours suffix: "1h"
pub fn parse_duration(s: &str) -> Result<Duration, SyncError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(SyncError::configuration("empty duration string"));
    }

    let (num_str, multiplier) = if let Some(rest) = s.strip_suffix('h') {
        (rest, 3600)
    } else if let Some(rest) = s.strip_suffix('m') {
        (rest, 60)
    } else if let Some(rest) = s.strip_suffix('s') {
        (rest, 1)
    } else {
        // No suffix - treat as seconds
        (s, 1)
    };

    let value: u64 = num_str
        .parse()
        .map_err(|_| SyncError::configuration(format!("invalid duration value: '{s}'")))?;
    Ok(Duration::from_secs(value * multiplier))
}

/// Render a duration in the suffixed format accepted by [`parse_duration`].
pub fn format_duration(d: &Duration) -> String {
    let secs = d.as_secs();
    if secs % 3600 == 0 && secs != 0 {
        format!("{}h", secs / 3600)
    } else if secs % 60 == 0 && secs != 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{secs}s")
    }
}

/// Serde adapter for `Duration` fields using the suffixed string format,
/// e.g. `stats_interval: 60s`.
pub mod required {
    use super::{format_duration, parse_duration};
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format_duration(value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

/// Serde adapter for `Option<Duration>` fields using the suffixed string
/// format, e.g. `batch_interval: 30s`.
pub mod option {
    use super::{format_duration, parse_duration};
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(d) => serializer.serialize_some(&format_duration(d)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        raw.map(|s| parse_duration(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_seconds() {
        assert_eq!(parse_duration("300").unwrap(), Duration::from_secs(300));
    }

    #[test]
    fn test_parse_suffixed() {
        assert_eq!(parse_duration("300s").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("30m").unwrap(), Duration::from_secs(1800));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
    }

    #[test]
    fn test_parse_invalid() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("1d").is_err());
    }

    #[test]
    fn test_format_roundtrip() {
        for input in ["45s", "5m", "2h"] {
            let parsed = parse_duration(input).unwrap();
            assert_eq!(format_duration(&parsed), input);
        }
    }
}
