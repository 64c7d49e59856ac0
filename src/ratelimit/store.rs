//! Store trait for abstracting counter storage.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::time::Duration;

use crate::error::StoreError;

/// The result of recording one hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hit {
    /// Count for the key after this hit
    pub current: u64,
    /// When the current window resets
    pub reset_time: DateTime<Utc>,
}

/// Trait for hit counter stores.
///
/// The in-memory [`MemoryStore`](super::MemoryStore) is the default. Any other
/// implementation (for example one backed by an external cache) can be plugged
/// into the limiter instead, as long as it honours the same contract: counts
/// for one key are never lost under concurrent `increment` calls.
#[async_trait]
pub trait Store: Send + Sync {
    /// Record a hit for `key` and return the new count with the window reset time.
    async fn increment(&self, key: &str) -> Result<Hit, StoreError>;

    /// Clear every count and start a new window.
    async fn reset_all(&self) -> Result<(), StoreError>;
}

/// Compute the reset time of a window starting now.
///
/// The result is always strictly later than `previous`.
pub(crate) fn next_reset_time(interval: Duration, previous: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let interval = ChronoDuration::from_std(interval).unwrap_or(ChronoDuration::MAX);
    let candidate = Utc::now()
        .checked_add_signed(interval)
        .unwrap_or(DateTime::<Utc>::MAX_UTC);

    match previous {
        Some(previous) if candidate <= previous => previous + ChronoDuration::milliseconds(1),
        _ => candidate,
    }
}
