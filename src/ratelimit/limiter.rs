//! Core rate limiter implementation.

use std::sync::Arc;
use tracing::{debug, trace};

use super::info::RateLimitInfo;
use super::max::Max;
use super::store::Store;
use crate::error::{Result, TurnstileError};

/// Applies a quota to hits recorded in a store.
///
/// The limiter holds no state of its own between requests; all counts live in
/// the store. It is cheap to clone and can be shared across tasks.
#[derive(Clone)]
pub struct RateLimiter {
    /// Store recording hits per client
    store: Arc<dyn Store>,
    /// Quota per window
    max: Max,
}

impl RateLimiter {
    /// Create a new rate limiter over the given store.
    pub fn new(store: Arc<dyn Store>, max: Max) -> Self {
        Self { store, max }
    }

    /// Record a hit for `key` and report its quota state.
    ///
    /// Store and quota resolution failures are returned unchanged; going over
    /// the quota is not an error and shows up in [`RateLimitInfo::is_over_limit`].
    pub async fn check(&self, key: &str) -> Result<RateLimitInfo> {
        let hit = self.store.increment(key).await?;

        let limit = self
            .max
            .resolve(key)
            .await
            .map_err(TurnstileError::MaxResolution)?;

        let info = RateLimitInfo::new(limit, hit.current, hit.reset_time);

        trace!(
            key = %key,
            current = info.current,
            limit = info.limit,
            "Checked rate limit"
        );

        if info.is_over_limit() {
            debug!(key = %key, current = info.current, limit = info.limit, "Rate limit exceeded");
        }

        Ok(info)
    }

    /// Get the store backing this limiter.
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Get the configured quota.
    pub fn max(&self) -> &Max {
        &self.max
    }
}
