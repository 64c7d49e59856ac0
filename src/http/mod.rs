//! HTTP integration for axum servers.

mod middleware;
mod rejection;

pub use middleware::{rate_limit_middleware, RateLimit, RateLimitOptions, DEFAULT_RESET_INTERVAL};
pub use rejection::{LimitHandler, Rejection, DEFAULT_MESSAGE};
