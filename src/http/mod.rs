//! HTTP integration: client identity, the axum middleware and the server.

mod client_key;
mod middleware;
mod server;

pub use client_key::{client_key, UNKNOWN_CLIENT};
pub use middleware::{rate_limit, RateLimitState};
pub use server::{app_router, HttpServer};
