//! HTTP API server.
//!
//! - [`http_api`]: axum router and handlers for the cache operations
//! - [`events`]: SSE feed of per-key cache events

pub mod events;
pub mod http_api;
