//! Turnstile - Fixed-Window Rate Limiting Middleware
//!
//! This crate counts requests per client address within a fixed time window
//! and rejects clients that go over their quota. Counts live in a pluggable
//! store that is cleared in bulk at every window boundary. Quota state is
//! reported on every response through `X-RateLimit-*` headers.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
