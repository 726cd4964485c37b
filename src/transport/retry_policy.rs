use std::time::{Duration, SystemTime};

use http::header::RETRY_AFTER;

pub(crate) const RETRY_AFTER_MAX_SECS: u64 = 30;

/// Read the `Retry-After` header as a delay. Accepts delta-seconds or an
/// HTTP date; both are capped at [`RETRY_AFTER_MAX_SECS`].
#[inline]
pub(crate) fn parse_retry_after_delay(headers: &http::HeaderMap) -> Option<Duration> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(seconds) = raw.parse::<u64>() {
        return Some(Duration::from_secs(seconds.min(RETRY_AFTER_MAX_SECS)));
    }

    let target = httpdate::parse_http_date(raw).ok()?;
    let delay = target.duration_since(SystemTime::now()).unwrap_or_default();
    Some(delay.min(Duration::from_secs(RETRY_AFTER_MAX_SECS)))
}
