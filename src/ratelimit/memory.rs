//! In-memory fixed-window store.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, trace};

use super::store::{next_reset_time, Hit, Store};
use crate::error::{StoreError, TurnstileError};

/// Fallback deadline for intervals too long to add to the clock.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Hit counts for one window, replaced wholesale on reset.
#[derive(Debug)]
struct Window {
    hits: HashMap<String, u64>,
    reset_time: DateTime<Utc>,
}

/// A store keeping hit counts in process memory.
///
/// All keys share one window. Counts are cleared in bulk every `interval` by a
/// background task started with [`MemoryStore::start`]; there is no per-key
/// expiry.
pub struct MemoryStore {
    /// Length of each window
    interval: Duration,
    /// Counts and reset time of the current window
    window: Mutex<Window>,
    /// Handle of the periodic reset task, if running
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl MemoryStore {
    /// Create a store without a reset timer.
    ///
    /// Windows only roll over through [`reset_all`](Store::reset_all).
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            window: Mutex::new(Window {
                hits: HashMap::new(),
                reset_time: next_reset_time(interval, None),
            }),
            timer: Mutex::new(None),
        }
    }

    /// Create a store and spawn its periodic reset task.
    ///
    /// Must be called from within a tokio runtime. The task only holds a weak
    /// reference and exits once the store is dropped.
    pub fn start(interval: Duration) -> Arc<Self> {
        let store = Arc::new(Self::new(interval));
        let handle = tokio::spawn(run_reset_timer(Arc::downgrade(&store), interval));
        *store.timer.lock() = Some(handle);

        info!(interval_ms = interval.as_millis() as u64, "Started rate limit reset timer");
        store
    }

    /// Stop the periodic reset task.
    pub fn shutdown(&self) {
        if let Some(handle) = self.timer.lock().take() {
            handle.abort();
            info!("Stopped rate limit reset timer");
        }
    }

    /// Whether the reset task is running.
    pub fn is_running(&self) -> bool {
        self.timer
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Get the window length.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Get the current count for a key.
    pub fn get(&self, key: &str) -> Option<u64> {
        self.window.lock().hits.get(key).copied()
    }

    /// Get the reset time of the current window.
    pub fn reset_time(&self) -> DateTime<Utc> {
        self.window.lock().reset_time
    }

    /// Get the number of keys seen in the current window.
    pub fn len(&self) -> usize {
        self.window.lock().hits.len()
    }

    /// Whether no key has been seen in the current window.
    pub fn is_empty(&self) -> bool {
        self.window.lock().hits.is_empty()
    }

    /// Forget the count of a single key, leaving the window untouched.
    pub fn reset_key(&self, key: &str) {
        self.window.lock().hits.remove(key);
    }

    fn increment_sync(&self, key: &str) -> Hit {
        let mut window = self.window.lock();
        let current = match window.hits.get_mut(key) {
            Some(count) => {
                *count += 1;
                *count
            }
            None => {
                window.hits.insert(key.to_string(), 1);
                1
            }
        };

        Hit {
            current,
            reset_time: window.reset_time,
        }
    }

    fn reset_all_sync(&self) {
        let mut window = self.window.lock();
        let reset_time = next_reset_time(self.interval, Some(window.reset_time));
        let cleared = window.hits.len();

        *window = Window {
            hits: HashMap::new(),
            reset_time,
        };

        debug!(cleared, reset_time = %reset_time, "Reset rate limit window");
    }
}

impl Drop for MemoryStore {
    fn drop(&mut self) {
        if let Some(handle) = self.timer.get_mut().take() {
            handle.abort();
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn increment(&self, key: &str) -> Result<Hit, StoreError> {
        let hit = self.increment_sync(key);
        trace!(key = %key, current = hit.current, "Recorded hit");
        Ok(hit)
    }

    async fn reset_all(&self) -> Result<(), StoreError> {
        self.reset_all_sync();
        Ok(())
    }
}

/// Check a window length can drive the reset timer.
pub(crate) fn check_interval(interval: Duration) -> Result<(), TurnstileError> {
    if interval.is_zero() {
        return Err(TurnstileError::Config(
            "reset interval must be greater than zero".to_string(),
        ));
    }
    if Instant::now().checked_add(interval).is_none() {
        return Err(TurnstileError::Config(format!(
            "reset interval of {}ms is too long",
            interval.as_millis()
        )));
    }
    Ok(())
}

/// Deadline `interval` after `from`, capped when the clock cannot represent it.
fn next_deadline(from: Instant, interval: Duration) -> Instant {
    from.checked_add(interval)
        .or_else(|| from.checked_add(FAR_FUTURE))
        .unwrap_or(from)
}

/// Reset the store every `interval` until it is dropped.
async fn run_reset_timer(store: Weak<MemoryStore>, interval: Duration) {
    let mut deadline = next_deadline(Instant::now(), interval);

    loop {
        sleep_until(deadline).await;
        match store.upgrade() {
            Some(store) => store.reset_all_sync(),
            None => break,
        }
        deadline = next_deadline(Instant::now(), interval);
    }

    debug!("Rate limit reset timer exiting, store dropped");
}
