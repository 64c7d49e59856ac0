//! Responses for requests over their quota.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::Request;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

/// Default message sent with a rejection.
pub const DEFAULT_MESSAGE: &str = "Too many requests, please try again later.";

/// Custom handling of rejected requests.
///
/// The request carries its [`RateLimitInfo`](crate::ratelimit::RateLimitInfo)
/// in its extensions. `next` is handed over as well, so a handler may still
/// let the request through (for example to only log the overage).
#[async_trait]
pub trait LimitHandler: Send + Sync {
    /// Produce the response for a request over its quota.
    async fn handle(&self, request: Request, next: Next) -> Response;
}

/// What to do with a request that went past its quota.
#[derive(Clone)]
pub enum Rejection {
    /// Reply with a status code and a plain text message
    Default { status: StatusCode, message: String },
    /// Hand the request to a custom handler
    Custom(Arc<dyn LimitHandler>),
}

impl Rejection {
    /// Build a custom rejection from an async function.
    pub fn from_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        Rejection::Custom(Arc::new(FnHandler(f)))
    }

    /// Produce the response for a rejected request.
    pub async fn respond(&self, request: Request, next: Next) -> Response {
        match self {
            Rejection::Default { status, message } => (*status, message.clone()).into_response(),
            Rejection::Custom(handler) => handler.handle(request, next).await,
        }
    }
}

impl Default for Rejection {
    fn default() -> Self {
        Rejection::Default {
            status: StatusCode::TOO_MANY_REQUESTS,
            message: DEFAULT_MESSAGE.to_string(),
        }
    }
}

impl fmt::Debug for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Default { status, message } => f
                .debug_struct("Default")
                .field("status", status)
                .field("message", message)
                .finish(),
            Rejection::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> LimitHandler for FnHandler<F>
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    async fn handle(&self, request: Request, next: Next) -> Response {
        (self.0)(request, next).await
    }
}
