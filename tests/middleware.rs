use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::extract::{ConnectInfo, Extension, Request};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use tokio_test::assert_ok;
use tower::ServiceExt;

use turnstile::error::{BoxError, StoreError};
use turnstile::http::{rate_limit_middleware, RateLimit, RateLimitOptions, Rejection};
use turnstile::ratelimit::{Hit, Max, MemoryStore, RateLimitInfo, RateLimiter, Store};

async fn quota(Extension(info): Extension<RateLimitInfo>) -> Json<RateLimitInfo> {
    Json(info)
}

fn app(rate_limit: RateLimit) -> Router {
    Router::new()
        .route("/", get(quota))
        .layer(middleware::from_fn_with_state(rate_limit, rate_limit_middleware))
}

fn request_from(ip: &str) -> Request {
    let addr: SocketAddr = format!("{}:40000", ip).parse().unwrap();
    let mut request = axum::http::Request::builder().uri("/").body(Body::empty()).unwrap();
    request.extensions_mut().insert(ConnectInfo(addr));
    request
}

async fn send(app: &Router, ip: &str) -> Response {
    assert_ok!(app.clone().oneshot(request_from(ip)).await)
}

async fn body_string(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(response: Response) -> serde_json::Value {
    serde_json::from_str(&body_string(response).await).unwrap()
}

fn header(response: &Response, name: &str) -> String {
    response.headers()[name].to_str().unwrap().to_string()
}

struct UnavailableStore;

#[async_trait]
impl Store for UnavailableStore {
    async fn increment(&self, _key: &str) -> Result<Hit, StoreError> {
        Err(StoreError::Unavailable("cache offline".to_string()))
    }

    async fn reset_all(&self) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("cache offline".to_string()))
    }
}

#[tokio::test]
async fn test_third_request_rejected_with_max_two() {
    let rate_limit = RateLimitOptions::new()
        .max(2u64)
        .reset_interval(Duration::from_millis(1000))
        .build()
        .unwrap();
    let app = app(rate_limit.clone());

    let first = send(&app, "1.1.1.1").await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(header(&first, "x-ratelimit-remaining"), "1");
    let info = body_json(first).await;
    assert_eq!(info["current"], 1);
    assert_eq!(info["remaining"], 1);

    let second = send(&app, "1.1.1.1").await;
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(header(&second, "x-ratelimit-remaining"), "0");

    let third = send(&app, "1.1.1.1").await;
    assert_eq!(third.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(header(&third, "x-ratelimit-remaining"), "0");
    assert!(header(&third, "x-ratelimit-reset").parse::<i64>().unwrap() > 0);
    assert_eq!(
        body_string(third).await,
        "Too many requests, please try again later."
    );

    rate_limit.shutdown();
}

#[tokio::test]
async fn test_window_reset_allows_client_again() {
    let rate_limit = RateLimitOptions::new()
        .max(2u64)
        .reset_interval(Duration::from_millis(1000))
        .build()
        .unwrap();
    let app = app(rate_limit.clone());

    for _ in 0..3 {
        send(&app, "1.1.1.1").await;
    }
    let rejected = send(&app, "1.1.1.1").await;
    let old_reset: i64 = header(&rejected, "x-ratelimit-reset").parse().unwrap();
    assert_eq!(rejected.status(), StatusCode::TOO_MANY_REQUESTS);

    tokio::time::sleep(Duration::from_millis(1200)).await;

    let response = send(&app, "1.1.1.1").await;
    assert_eq!(response.status(), StatusCode::OK);
    let new_reset: i64 = header(&response, "x-ratelimit-reset").parse().unwrap();
    assert!(new_reset > old_reset);

    let info = body_json(response).await;
    assert_eq!(info["current"], 1);
    assert_eq!(info["remaining"], 1);

    rate_limit.shutdown();
}

#[tokio::test]
async fn test_interleaved_clients_limited_independently() {
    let rate_limit = RateLimitOptions::new().max(1u64).build().unwrap();
    let app = app(rate_limit.clone());

    assert_eq!(send(&app, "1.1.1.1").await.status(), StatusCode::OK);
    assert_eq!(send(&app, "2.2.2.2").await.status(), StatusCode::OK);
    assert_eq!(send(&app, "1.1.1.1").await.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(send(&app, "2.2.2.2").await.status(), StatusCode::TOO_MANY_REQUESTS);

    rate_limit.shutdown();
}

#[tokio::test]
async fn test_store_error_is_not_a_rejection() {
    let rate_limit = RateLimitOptions::new()
        .store(Arc::new(UnavailableStore))
        .build()
        .unwrap();
    let app = app(rate_limit);

    let response = send(&app, "1.1.1.1").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.headers().get("x-ratelimit-remaining").is_none());
    assert!(response.headers().get("x-ratelimit-reset").is_none());
}

#[tokio::test]
async fn test_max_resolution_error_is_forwarded() {
    let store = Arc::new(MemoryStore::new(Duration::from_secs(60)));
    let max = Max::from_fn(|_| async { Err::<u64, BoxError>("quota lookup failed".into()) });
    let rate_limit = RateLimit::new(RateLimiter::new(store, max), Rejection::default());
    let app = app(rate_limit);

    let response = send(&app, "1.1.1.1").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.headers().get("x-ratelimit-remaining").is_none());
}

#[tokio::test]
async fn test_missing_client_address_is_forwarded() {
    let rate_limit = RateLimitOptions::new().build().unwrap();
    let app = app(rate_limit.clone());

    let request = axum::http::Request::builder().uri("/").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    rate_limit.shutdown();
}

#[tokio::test]
async fn test_dynamic_max_per_client() {
    let store = Arc::new(MemoryStore::new(Duration::from_secs(60)));
    let max = Max::from_fn(|key| async move { Ok(if key == "10.0.0.1" { 3 } else { 1 }) });
    let app = app(RateLimit::new(RateLimiter::new(store, max), Rejection::default()));

    for _ in 0..3 {
        assert_eq!(send(&app, "10.0.0.1").await.status(), StatusCode::OK);
    }
    assert_eq!(send(&app, "10.0.0.2").await.status(), StatusCode::OK);
    assert_eq!(send(&app, "10.0.0.2").await.status(), StatusCode::TOO_MANY_REQUESTS);

    let limited = send(&app, "10.0.0.1").await;
    assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(header(&limited, "x-ratelimit-limit"), "3");
}

#[tokio::test]
async fn test_custom_rejection_handler() {
    let rejection = Rejection::from_fn(|request: Request, _next: Next| async move {
        let info = request
            .extensions()
            .get::<RateLimitInfo>()
            .copied()
            .unwrap();
        (StatusCode::SERVICE_UNAVAILABLE, format!("over by {}", info.current - info.limit))
            .into_response()
    });
    let store = Arc::new(MemoryStore::new(Duration::from_secs(60)));
    let app = app(RateLimit::new(RateLimiter::new(store, Max::from(1)), rejection));

    send(&app, "1.1.1.1").await;
    send(&app, "1.1.1.1").await;
    let response = send(&app, "1.1.1.1").await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(header(&response, "x-ratelimit-remaining"), "0");
    assert_eq!(body_string(response).await, "over by 2");
}

#[tokio::test]
async fn test_custom_handler_may_let_request_through() {
    let rejection = Rejection::from_fn(|request: Request, next: Next| async move {
        next.run(request).await
    });
    let store = Arc::new(MemoryStore::new(Duration::from_secs(60)));
    let app = app(RateLimit::new(RateLimiter::new(store, Max::from(1)), rejection));

    send(&app, "1.1.1.1").await;
    let response = send(&app, "1.1.1.1").await;

    assert_eq!(response.status(), StatusCode::OK);
    let info = body_json(response).await;
    assert_eq!(info["current"], 2);
    assert_eq!(info["remaining"], 0);
}

#[tokio::test]
async fn test_config_builds_working_limit() {
    let config = turnstile::config::TurnstileConfig::from_yaml_str(
        "rate_limiting:\n  max: 1\n  status_code: 503\n  message: busy\n",
    )
    .unwrap();
    let rate_limit = config.rate_limiting.to_options().unwrap().build().unwrap();
    let app = app(rate_limit.clone());

    send(&app, "1.1.1.1").await;
    let response = send(&app, "1.1.1.1").await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_string(response).await, "busy");

    rate_limit.shutdown();
}
