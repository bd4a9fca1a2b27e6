use chrono::{DateTime, SecondsFormat, Utc};

/// Returns the current Unix timestamp in milliseconds.
pub fn current_unix_timestamp_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}

/// Renders `at` as ISO-8601 with millisecond precision and a `Z` suffix.
pub fn iso_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Renders the calendar date portion (`YYYY-MM-DD`) of `at`.
pub fn iso_date(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d").to_string()
}

/// ISO-8601 stamp with `:` and `.` replaced so it is safe inside file names.
pub fn filename_stamp(at: DateTime<Utc>) -> String {
    iso_timestamp(at).replace([':', '.'], "-")
}

pub fn parse_iso_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn fixed() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 18, 9, 30, 5)
            .single()
            .expect("valid timestamp")
    }

    #[test]
    fn unit_iso_timestamp_uses_millisecond_zulu_format() {
        assert_eq!(iso_timestamp(fixed()), "2026-02-18T09:30:05.000Z");
    }

    #[test]
    fn unit_filename_stamp_replaces_colons_and_dots() {
        assert_eq!(filename_stamp(fixed()), "2026-02-18T09-30-05-000Z");
    }

    #[test]
    fn unit_iso_date_truncates_to_day() {
        assert_eq!(iso_date(fixed()), "2026-02-18");
    }

    #[test]
    fn unit_parse_iso_timestamp_round_trips_rendered_value() {
        let rendered = iso_timestamp(fixed());
        assert_eq!(parse_iso_timestamp(&rendered), Some(fixed()));
        assert_eq!(parse_iso_timestamp("not a date"), None);
    }

    #[test]
    fn unit_current_unix_timestamp_ms_is_after_2020() {
        assert!(current_unix_timestamp_ms() > 1_577_836_800_000);
    }
}
