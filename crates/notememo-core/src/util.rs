//! Shared utility functions used across multiple modules.

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};

use crate::models::Timestamp;

/// Normalize optional text by trimming whitespace and removing empties.
///
/// Returns `None` when the input is `None` or the trimmed value is empty.
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    let value = value?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Check if a string starts with `http://` or `https://`.
pub fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

/// Truncate text to at most 180 characters for error messages.
pub fn compact_text(value: &str) -> String {
    value.trim().chars().take(180).collect()
}

/// Current time truncated to millisecond precision.
///
/// Every timestamp written by this crate goes through here so values
/// round-trip through storage and JSON without losing precision.
pub fn now() -> Timestamp {
    truncate_to_millis(Utc::now())
}

/// Drop sub-millisecond precision from a timestamp.
pub fn truncate_to_millis(value: DateTime<Utc>) -> Timestamp {
    Utc.timestamp_millis_opt(value.timestamp_millis())
        .single()
        .unwrap_or(value)
}

/// Build a timestamp from Unix milliseconds as stored in `SQLite`.
pub fn from_millis(millis: i64) -> Option<Timestamp> {
    Utc.timestamp_millis_opt(millis).single()
}

/// Render a timestamp as ISO 8601 with millisecond precision and a `Z` suffix.
pub fn to_iso(value: &Timestamp) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse an ISO 8601 timestamp into UTC, truncated to milliseconds.
pub fn parse_iso(value: &str) -> Option<Timestamp> {
    DateTime::parse_from_rfc3339(value.trim())
        .ok()
        .map(|parsed| truncate_to_millis(parsed.with_timezone(&Utc)))
}

/// Keep only digits and cap the result at six characters.
///
/// Access codes are short numeric PINs; pasted input often carries spaces or
/// separators.
pub fn format_access_code(input: &str) -> String {
    input.chars().filter(char::is_ascii_digit).take(6).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_text_option_rejects_empty() {
        assert_eq!(normalize_text_option(None), None);
        assert_eq!(normalize_text_option(Some("   ".to_string())), None);
    }

    #[test]
    fn normalize_text_option_trims_value() {
        assert_eq!(
            normalize_text_option(Some(" https://example.com ".to_string())),
            Some("https://example.com".to_string())
        );
    }

    #[test]
    fn is_http_url_accepts_valid_schemes() {
        assert!(is_http_url("http://localhost"));
        assert!(is_http_url("https://example.com"));
        assert!(!is_http_url("ftp://example.com"));
        assert!(!is_http_url("example.com"));
    }

    #[test]
    fn now_has_millisecond_precision() {
        let value = now();
        assert_eq!(value.timestamp_subsec_nanos() % 1_000_000, 0);
    }

    #[test]
    fn iso_round_trip() {
        let parsed = parse_iso("2024-01-02T03:04:05.678Z").unwrap();
        assert_eq!(to_iso(&parsed), "2024-01-02T03:04:05.678Z");
        assert_eq!(from_millis(parsed.timestamp_millis()), Some(parsed));
    }

    #[test]
    fn parse_iso_normalizes_offsets() {
        let parsed = parse_iso("2024-01-01T08:00:00+08:00").unwrap();
        assert_eq!(to_iso(&parsed), "2024-01-01T00:00:00.000Z");
        assert!(parse_iso("yesterday").is_none());
    }

    #[test]
    fn format_access_code_keeps_six_digits() {
        assert_eq!(format_access_code("12 34-56 78"), "123456");
        assert_eq!(format_access_code("abc"), "");
    }
}
