use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;

lazy_static::lazy_static! {
    static ref NATIVE_TIMESTAMP: Regex = Regex::new(
        r"^(\d{4})\.(\d{2})\.(\d{2})-(\d{2}):(\d{2}):(\d{2})(?::(\d{3}))?$"
    )
    .expect("native timestamp pattern is valid");
    static ref CANONICAL_TIMESTAMP: Regex = Regex::new(
        r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}\.\d{3}Z$"
    )
    .expect("canonical timestamp pattern is valid");
}

/// Convert the journal's native `YYYY.MM.DD-HH:MM:SS[:mmm]` notation into
/// canonical `YYYY-MM-DDTHH:MM:SS.mmmZ`. Canonical input passes through
/// unchanged; any other shape falls back to the current wall-clock time.
pub fn normalize_timestamp(raw: &str) -> String {
    let trimmed = raw.trim();

    if CANONICAL_TIMESTAMP.is_match(trimmed) {
        return trimmed.to_string();
    }

    if let Some(captures) = NATIVE_TIMESTAMP.captures(trimmed) {
        let millis = captures.get(7).map(|group| group.as_str()).unwrap_or("000");
        return format!(
            "{}-{}-{}T{}:{}:{}.{}Z",
            &captures[1], &captures[2], &captures[3], &captures[4], &captures[5], &captures[6],
            millis
        );
    }

    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Returns `None` for anything that is not canonical.
pub fn parse_canonical(timestamp: &str) -> Option<DateTime<Utc>> {
    if !CANONICAL_TIMESTAMP.is_match(timestamp) {
        return None;
    }

    DateTime::parse_from_rfc3339(timestamp)
        .ok()
        .map(|instant| instant.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::{normalize_timestamp, parse_canonical, CANONICAL_TIMESTAMP};

    #[test]
    fn converts_native_timestamp_with_millis() {
        assert_eq!(
            normalize_timestamp("2024.06.07-12:34:56:789"),
            "2024-06-07T12:34:56.789Z"
        );
    }

    #[test]
    fn pads_missing_millis_with_zeroes() {
        assert_eq!(
            normalize_timestamp("2024.06.07-12:34:56"),
            "2024-06-07T12:34:56.000Z"
        );
    }

    #[test]
    fn canonical_input_passes_through_unchanged() {
        assert_eq!(
            normalize_timestamp("2024-06-07T12:34:56.789Z"),
            "2024-06-07T12:34:56.789Z"
        );
    }

    #[test]
    fn unrecognized_input_falls_back_to_canonical_wall_clock() {
        let normalized = normalize_timestamp("definitely not a timestamp");
        assert!(
            CANONICAL_TIMESTAMP.is_match(&normalized),
            "Fallback should still produce the canonical shape, got '{normalized}'"
        );
    }

    #[test]
    fn canonical_round_trips_through_parse() {
        let instant = parse_canonical("2024-06-07T12:34:56.789Z").expect("parses");
        assert_eq!(instant.timestamp_millis() % 1000, 789);
        assert!(parse_canonical("2024.06.07-12:34:56").is_none());
    }
}
