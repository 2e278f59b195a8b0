use chrono::{DateTime, SecondsFormat, Utc};

/// 获取当前 UTC 时间戳（毫秒）
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// RFC3339 with sub-second precision, always `Z` suffixed.
///
/// Fractional digits are trimmed to the shortest of 0/3/6/9 that keeps the value.
pub fn rfc3339_nano(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Opaque, URL-safe, time-ordered identifier (UUIDv7, hex without dashes).
pub fn opaque_id() -> String {
    uuid::Uuid::now_v7().simple().to_string()
}

/// Trim and drop blank strings.
pub fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_rfc3339_nano_trims_zero_fraction() {
        let ts = Utc.with_ymd_and_hms(2025, 5, 1, 9, 30, 0).unwrap();
        assert_eq!(rfc3339_nano(&ts), "2025-05-01T09:30:00Z");
    }

    #[test]
    fn test_rfc3339_nano_keeps_nanos() {
        let ts = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
        assert!(rfc3339_nano(&ts).ends_with(".123456789Z"));
    }

    #[test]
    fn test_opaque_id_is_url_safe() {
        let id = opaque_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, opaque_id());
    }

    #[test]
    fn test_non_blank() {
        assert_eq!(non_blank(Some("  a ")), Some("a".to_string()));
        assert_eq!(non_blank(Some("   ")), None);
        assert_eq!(non_blank(None), None);
    }

    #[test]
    fn test_now_millis_tracks_clock() {
        let before = chrono::Utc::now().timestamp_millis();
        let now = now_millis();
        assert!(now >= before);
    }
}
