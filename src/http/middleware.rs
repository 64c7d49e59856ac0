//! Axum middleware applying the rate limit to each request.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;
use tokio::runtime::Handle;
use tracing::{instrument, warn};

use super::rejection::{LimitHandler, Rejection, DEFAULT_MESSAGE};
use crate::error::{Result, TurnstileError};
use crate::ratelimit::{check_interval, Max, MemoryStore, RateLimiter, Store};

/// Default window length.
pub const DEFAULT_RESET_INTERVAL: Duration = Duration::from_secs(60);

/// Options for building a [`RateLimit`].
pub struct RateLimitOptions {
    reset_interval: Duration,
    max: Max,
    message: String,
    status_code: StatusCode,
    handler: Option<Arc<dyn LimitHandler>>,
    store: Option<Arc<dyn Store>>,
}

impl Default for RateLimitOptions {
    fn default() -> Self {
        Self {
            reset_interval: DEFAULT_RESET_INTERVAL,
            max: Max::default(),
            message: DEFAULT_MESSAGE.to_string(),
            status_code: StatusCode::TOO_MANY_REQUESTS,
            handler: None,
            store: None,
        }
    }
}

impl RateLimitOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Length of each window. Only used by the built-in store.
    pub fn reset_interval(mut self, interval: Duration) -> Self {
        self.reset_interval = interval;
        self
    }

    /// Requests allowed per window.
    pub fn max(mut self, max: impl Into<Max>) -> Self {
        self.max = max.into();
        self
    }

    /// Body of the default rejection.
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Status of the default rejection.
    pub fn status_code(mut self, status: StatusCode) -> Self {
        self.status_code = status;
        self
    }

    /// Replace the default rejection with a custom handler.
    pub fn handler(mut self, handler: Arc<dyn LimitHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Use another store instead of the built-in one.
    pub fn store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    /// Build the rate limit.
    ///
    /// Without a custom store this starts a [`MemoryStore`] and its reset
    /// timer, and fails when called outside a tokio runtime.
    pub fn build(self) -> Result<RateLimit> {
        check_interval(self.reset_interval)?;

        let (store, memory): (Arc<dyn Store>, Option<Arc<MemoryStore>>) = match self.store {
            Some(store) => (store, None),
            None => {
                Handle::try_current().map_err(|e| {
                    TurnstileError::Config(format!("built-in store needs a tokio runtime: {}", e))
                })?;
                let memory = MemoryStore::start(self.reset_interval);
                (memory.clone() as Arc<dyn Store>, Some(memory))
            }
        };

        let rejection = match self.handler {
            Some(handler) => Rejection::Custom(handler),
            None => Rejection::Default {
                status: self.status_code,
                message: self.message,
            },
        };

        Ok(RateLimit {
            limiter: RateLimiter::new(store, self.max),
            rejection,
            memory,
        })
    }
}

/// Rate limit state shared by the middleware.
#[derive(Clone)]
pub struct RateLimit {
    limiter: RateLimiter,
    rejection: Rejection,
    /// Built-in store, kept to stop its timer on shutdown
    memory: Option<Arc<MemoryStore>>,
}

impl RateLimit {
    pub fn new(limiter: RateLimiter, rejection: Rejection) -> Self {
        Self {
            limiter,
            rejection,
            memory: None,
        }
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn rejection(&self) -> &Rejection {
        &self.rejection
    }

    /// Stop the built-in store's reset timer, if any.
    pub fn shutdown(&self) {
        if let Some(memory) = &self.memory {
            memory.shutdown();
        }
    }
}

/// Rate limit a request by its client address.
///
/// Use with [`axum::middleware::from_fn_with_state`]. The server must be run
/// with `into_make_service_with_connect_info::<SocketAddr>()` so the client
/// address is available. Errors are returned rather than turned into a
/// rejection, and reach the client as a 500.
#[instrument(skip_all, fields(method = %request.method(), path = %request.uri().path()))]
pub async fn rate_limit_middleware(
    State(rate_limit): State<RateLimit>,
    mut request: Request,
    next: Next,
) -> Result<Response> {
    let key = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .ok_or(TurnstileError::MissingClientAddr)?;

    let info = rate_limit.limiter.check(&key).await?;
    request.extensions_mut().insert(info);

    let mut response = if info.is_over_limit() {
        warn!(
            client = %key,
            current = info.current,
            limit = info.limit,
            "Rejecting request over rate limit"
        );
        rate_limit.rejection.respond(request, next).await
    } else {
        next.run(request).await
    };

    info.apply_headers(response.headers_mut());
    Ok(response)
}
