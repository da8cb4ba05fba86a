//! Cache header parsing: validators, freshness lifetime and HTTP dates.
//!
//! ### Freshness precedence
//! 1. `Cache-Control: max-age=N` → `now + N`
//! 2. `Expires: <http-date>` → that instant (an unparseable value means already expired)
//! 3. configured default TTL

use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use http::HeaderMap;
use http::header::{CACHE_CONTROL, ETAG, EXPIRES, LAST_MODIFIED};
use std::time::Duration;

/// IMF-fixdate, the preferred HTTP-date format.
const IMF_FIXDATE: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Parse an HTTP-date in any of the formats RFC 9110 requires recipients to accept.
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return Some(dt.with_timezone(&Utc));
    }

    // RFC 850, obsolete but still emitted by some servers
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%A, %d-%b-%y %H:%M:%S GMT") {
        return Some(dt.and_utc());
    }

    // asctime
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%a %b %e %H:%M:%S %Y") {
        return Some(dt.and_utc());
    }

    None
}

/// Format an instant as IMF-fixdate for `If-Modified-Since`.
pub fn format_http_date(at: DateTime<Utc>) -> String {
    at.format(IMF_FIXDATE).to_string()
}

/// Extract `max-age` from a `Cache-Control` value.
pub fn parse_max_age(cache_control: &str) -> Option<u64> {
    cache_control.split(',').find_map(|directive| {
        let (name, value) = directive.trim().split_once('=')?;
        if !name.trim().eq_ignore_ascii_case("max-age") {
            return None;
        }
        value.trim().trim_matches('"').parse::<u64>().ok()
    })
}

/// Compute the absolute expiry for a response received at `now`.
pub fn compute_expires_at(headers: &HeaderMap, now: DateTime<Utc>, default_ttl: Duration) -> DateTime<Utc> {
    let max_age = headers
        .get_all(CACHE_CONTROL)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(parse_max_age);

    if let Some(max_age) = max_age {
        return add_secs(now, max_age);
    }

    if let Some(expires) = headers.get(EXPIRES) {
        return match expires.to_str().ok().and_then(parse_http_date) {
            Some(at) => at,
            None => now,
        };
    }

    add_secs(now, default_ttl.as_secs())
}

/// `ETag` validator, if present and non-empty.
pub fn etag(headers: &HeaderMap) -> Option<String> {
    headers
        .get(ETAG)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// `Last-Modified` validator, if present and parseable.
pub fn last_modified(headers: &HeaderMap) -> Option<DateTime<Utc>> {
    headers.get(LAST_MODIFIED).and_then(|v| v.to_str().ok()).and_then(parse_http_date)
}

fn add_secs(now: DateTime<Utc>, secs: u64) -> DateTime<Utc> {
    i64::try_from(secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(*name, HeaderValue::from_static(value));
        }
        map
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_parse_imf_fixdate() {
        let parsed = parse_http_date("Sun, 06 Nov 1994 08:49:37 GMT").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(1994, 11, 6, 8, 49, 37).unwrap());
    }

    #[test]
    fn test_parse_rfc850() {
        let parsed = parse_http_date("Sunday, 06-Nov-94 08:49:37 GMT").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(1994, 11, 6, 8, 49, 37).unwrap());
    }

    #[test]
    fn test_parse_garbage_date() {
        assert!(parse_http_date("0").is_none());
        assert!(parse_http_date("").is_none());
    }

    #[test]
    fn test_format_round_trips() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        assert_eq!(format_http_date(at), "Fri, 01 Mar 2024 12:00:00 GMT");
        assert_eq!(parse_http_date(&format_http_date(at)), Some(at));
    }

    #[test]
    fn test_parse_max_age() {
        assert_eq!(parse_max_age("public, max-age=300"), Some(300));
        assert_eq!(parse_max_age("Max-Age = 60"), Some(60));
        assert_eq!(parse_max_age("max-age=\"15\""), Some(15));
        assert_eq!(parse_max_age("no-cache"), None);
        assert_eq!(parse_max_age("max-age=soon"), None);
    }

    #[test]
    fn test_max_age_wins_over_expires() {
        let h = headers(&[("cache-control", "max-age=60"), ("expires", "Fri, 01 Mar 2024 13:00:00 GMT")]);
        let at = compute_expires_at(&h, fixed_now(), Duration::from_secs(300));
        assert_eq!(at, fixed_now() + TimeDelta::seconds(60));
    }

    #[test]
    fn test_expires_used_without_max_age() {
        let h = headers(&[("cache-control", "public"), ("expires", "Fri, 01 Mar 2024 12:05:00 GMT")]);
        let at = compute_expires_at(&h, fixed_now(), Duration::from_secs(300));
        assert_eq!(at, Utc.with_ymd_and_hms(2024, 3, 1, 12, 5, 0).unwrap());
    }

    #[test]
    fn test_invalid_expires_is_already_expired() {
        let h = headers(&[("expires", "0")]);
        assert_eq!(compute_expires_at(&h, fixed_now(), Duration::from_secs(300)), fixed_now());
    }

    #[test]
    fn test_default_ttl_without_headers() {
        let at = compute_expires_at(&HeaderMap::new(), fixed_now(), Duration::from_secs(300));
        assert_eq!(at, fixed_now() + TimeDelta::seconds(300));
    }

    #[test]
    fn test_huge_max_age_saturates() {
        let h = headers(&[("cache-control", "max-age=18446744073709551615")]);
        assert_eq!(compute_expires_at(&h, fixed_now(), Duration::from_secs(300)), DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn test_validators() {
        let h = headers(&[("etag", "W/\"v1\""), ("last-modified", "Fri, 01 Mar 2024 11:00:00 GMT")]);
        assert_eq!(etag(&h).as_deref(), Some("W/\"v1\""));
        assert_eq!(last_modified(&h), Some(Utc.with_ymd_and_hms(2024, 3, 1, 11, 0, 0).unwrap()));

        let empty = headers(&[("etag", ""), ("last-modified", "yesterday")]);
        assert_eq!(etag(&empty), None);
        assert_eq!(last_modified(&empty), None);
    }
}
