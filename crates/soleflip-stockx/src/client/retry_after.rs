//! `Retry-After` header parsing for 429 responses.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, RETRY_AFTER};

/// Reads the advisory wait from a `Retry-After` header.
///
/// Accepts delta-seconds (`"30"`) or an HTTP date
/// (`"Wed, 21 Oct 2026 07:28:00 GMT"`). A date in the past yields a zero
/// wait. Returns `None` when the header is absent or unparseable, leaving
/// the caller to apply its fallback.
pub(crate) fn parse(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Duration> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();

    if let Ok(secs) = raw.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    let at = DateTime::parse_from_rfc2822(raw).ok()?.with_timezone(&Utc);
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use reqwest::header::HeaderValue;

    use super::*;

    fn headers(value: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(RETRY_AFTER, HeaderValue::from_str(value).unwrap());
        h
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 21, 7, 27, 0).unwrap()
    }

    #[test]
    fn delta_seconds() {
        assert_eq!(parse(&headers("17"), now()), Some(Duration::from_secs(17)));
    }

    #[test]
    fn http_date_in_the_future() {
        let wait = parse(&headers("Wed, 21 Oct 2026 07:28:00 GMT"), now());
        assert_eq!(wait, Some(Duration::from_secs(60)));
    }

    #[test]
    fn http_date_in_the_past_is_zero() {
        let wait = parse(&headers("Wed, 21 Oct 2026 07:00:00 GMT"), now());
        assert_eq!(wait, Some(Duration::ZERO));
    }

    #[test]
    fn missing_or_garbage_header_is_none() {
        assert_eq!(parse(&HeaderMap::new(), now()), None);
        assert_eq!(parse(&headers("soon"), now()), None);
    }
}
