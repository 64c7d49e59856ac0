//! Per-request quota state.

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Header carrying the remaining requests in the current window.
pub const REMAINING_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
/// Header carrying the window reset time in epoch milliseconds.
pub const RESET_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-reset");
/// Header carrying the resolved quota.
pub const LIMIT_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-limit");

/// Quota state for one request, attached to the request extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitInfo {
    /// Resolved quota for the window
    pub limit: u64,
    /// Hits recorded for the client, including this request
    pub current: u64,
    /// Requests left before rejection, never negative
    pub remaining: u64,
    /// When the window resets
    pub reset_time: DateTime<Utc>,
}

impl RateLimitInfo {
    /// Build the state for a request that brought the client to `current` hits.
    pub fn new(limit: u64, current: u64, reset_time: DateTime<Utc>) -> Self {
        Self {
            limit,
            current,
            remaining: limit.saturating_sub(current),
            reset_time,
        }
    }

    /// Whether this request went past the quota.
    ///
    /// Exactly `limit` requests are allowed; the next one is over.
    pub fn is_over_limit(&self) -> bool {
        self.current > self.limit
    }

    /// Reset time as epoch milliseconds.
    pub fn reset_millis(&self) -> i64 {
        self.reset_time.timestamp_millis()
    }

    /// Write the quota headers.
    pub fn apply_headers(&self, headers: &mut HeaderMap) {
        headers.insert(LIMIT_HEADER, HeaderValue::from(self.limit));
        headers.insert(REMAINING_HEADER, HeaderValue::from(self.remaining));
        headers.insert(RESET_HEADER, HeaderValue::from(self.reset_millis()));
    }
}
