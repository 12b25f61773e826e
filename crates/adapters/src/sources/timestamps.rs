//! Publication timestamp normalization shared by the post sources

use serde_json::Value;
use time::{
    Date, OffsetDateTime, PrimitiveDateTime, format_description::well_known::Rfc3339,
    macros::format_description,
};

/// Epoch values above this are milliseconds
const MILLIS_THRESHOLD: f64 = 1e12;

/// Normalize an upstream timestamp to UTC
///
/// Accepts epoch seconds or milliseconds (numbers or digit strings), RFC 3339,
/// `YYYY-MM-DDTHH:MM:SS` with optional fraction and `Z`, `YYYY-MM-DD HH:MM:SS`
/// and `YYYY-MM-DD`. Anything else is `None`.
pub fn parse_timestamp(value: &Value) -> Option<OffsetDateTime> {
    match value {
        Value::Number(n) => n.as_f64().and_then(from_epoch),
        Value::String(s) => parse_timestamp_str(s),
        _ => None,
    }
}

pub fn parse_timestamp_str(input: &str) -> Option<OffsetDateTime> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    if input.chars().all(|c| c.is_ascii_digit()) {
        return input.parse::<f64>().ok().and_then(from_epoch);
    }

    if let Ok(ts) = OffsetDateTime::parse(input, &Rfc3339) {
        return Some(ts.to_offset(time::UtcOffset::UTC));
    }

    // Fractional seconds and a trailing `Z` are ignored
    let base = input
        .split('.')
        .next()
        .unwrap_or(input)
        .trim_end_matches('Z');

    let with_t = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
    let with_space = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    let date_only = format_description!("[year]-[month]-[day]");

    if let Ok(dt) = PrimitiveDateTime::parse(base, &with_t) {
        return Some(dt.assume_utc());
    }
    if let Ok(dt) = PrimitiveDateTime::parse(base, &with_space) {
        return Some(dt.assume_utc());
    }
    if let Ok(date) = Date::parse(base, &date_only) {
        return Some(date.midnight().assume_utc());
    }

    None
}

fn from_epoch(raw: f64) -> Option<OffsetDateTime> {
    if !raw.is_finite() || raw < 0.0 {
        return None;
    }
    let millis = if raw > MILLIS_THRESHOLD {
        raw
    } else {
        raw * 1000.0
    };
    // The float cast saturates, so absurd values land here as i128::MAX
    let nanos = (millis as i128).checked_mul(1_000_000)?;
    OffsetDateTime::from_unix_timestamp_nanos(nanos).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use time::macros::datetime;

    #[test]
    fn test_epoch_seconds_and_millis() {
        assert_eq!(
            parse_timestamp(&json!(1717236000)),
            Some(datetime!(2024-06-01 10:00 UTC))
        );
        assert_eq!(
            parse_timestamp(&json!(1717236000000_i64)),
            Some(datetime!(2024-06-01 10:00 UTC))
        );
        assert_eq!(
            parse_timestamp(&json!("1717236000000")),
            Some(datetime!(2024-06-01 10:00 UTC))
        );
    }

    #[test]
    fn test_string_formats() {
        let expected = datetime!(2024-06-01 10:00 UTC);
        assert_eq!(parse_timestamp_str("2024-06-01T10:00:00Z"), Some(expected));
        assert_eq!(
            parse_timestamp_str("2024-06-01T10:00:00.123Z"),
            Some(datetime!(2024-06-01 10:00:00.123 UTC))
        );
        assert_eq!(parse_timestamp_str("2024-06-01T10:00:00"), Some(expected));
        assert_eq!(parse_timestamp_str("2024-06-01 10:00:00"), Some(expected));
        assert_eq!(
            parse_timestamp_str("2024-06-01T12:00:00+02:00"),
            Some(expected)
        );
        assert_eq!(
            parse_timestamp_str("2024-06-01"),
            Some(datetime!(2024-06-01 00:00 UTC))
        );
    }

    #[test]
    fn test_unparseable_is_none() {
        assert_eq!(parse_timestamp_str("yesterday"), None);
        assert_eq!(parse_timestamp_str(""), None);
        assert_eq!(parse_timestamp(&json!(null)), None);
        assert_eq!(parse_timestamp(&json!({"date": 1})), None);
        assert_eq!(parse_timestamp(&json!(1e33)), None);
        assert_eq!(parse_timestamp(&json!(f64::MAX)), None);
        assert_eq!(parse_timestamp_str("9999999999999999999999999999999999"), None);
        // Beyond the supported date range but no overflow
        assert_eq!(parse_timestamp_str("99999999999999999999"), None);
    }
}
