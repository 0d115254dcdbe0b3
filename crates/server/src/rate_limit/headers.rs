//! Rate limit response headers.

use config::AddHeadersConfig;
use http::{HeaderMap, HeaderName, HeaderValue, header::RETRY_AFTER};
use jiff::{SignedDuration, Timestamp};
use rate_limit::ConsumeResult;

pub(super) const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub(super) const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub(super) const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Headers describing the state of the caller's budget after a consumption.
///
/// `Retry-After` is only part of rejections.
pub(super) fn rate_limit_headers(flags: AddHeadersConfig, points: u32, result: &ConsumeResult) -> HeaderMap {
    let mut headers = HeaderMap::new();

    if flags.limit {
        headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(points));
    }

    if flags.remaining {
        headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(result.remaining_points));
    }

    if flags.reset {
        match reset_timestamp(result.ms_before_next).and_then(|value| HeaderValue::from_str(&value).ok()) {
            Some(value) => {
                headers.insert(X_RATELIMIT_RESET, value);
            }
            None => log::debug!("Window reset is out of range, omitting {X_RATELIMIT_RESET}"),
        }
    }

    if flags.retry_after && !result.allowed {
        headers.insert(RETRY_AFTER, HeaderValue::from(retry_after_seconds(result.ms_before_next)));
    }

    headers
}

/// Whole seconds to wait before retrying, rounded up.
fn retry_after_seconds(ms_before_next: u64) -> u64 {
    ms_before_next.div_ceil(1000)
}

/// Wall-clock time of the window reset as an ISO-8601 UTC timestamp with milliseconds.
fn reset_timestamp(ms_before_next: u64) -> Option<String> {
    let millis = i64::try_from(ms_before_next).ok()?;
    let reset = Timestamp::now().checked_add(SignedDuration::from_millis(millis)).ok()?;

    Some(format!("{reset:.3}"))
}
