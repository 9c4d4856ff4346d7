//! HTTP server implementation.

use std::future::Future;
use std::net::SocketAddr;

use axum::{middleware, routing::get, Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tracing::{error, info};

use super::middleware::{rate_limit, RateLimitState};
use crate::error::{GatekeeperError, Result};

/// Build the service router.
///
/// `/health` sits outside the rate limit layer so probes are never throttled.
pub fn app_router(state: RateLimitState) -> Router {
    Router::new()
        .route("/api/ping", get(ping_handler))
        .layer(middleware::from_fn_with_state(state, rate_limit))
        .route("/health", get(health_handler))
}

async fn ping_handler() -> Json<Value> {
    Json(json!({ "success": true, "message": "pong" }))
}

async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// HTTP server that exposes the peer address to the rate limiter.
pub struct HttpServer {
    listener: TcpListener,
    router: Router,
}

impl HttpServer {
    /// Bind to `addr`.
    pub async fn bind(addr: SocketAddr, router: Router) -> Result<Self> {
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            error!(addr = %addr, error = %e, "Failed to bind HTTP listener");
            GatekeeperError::Io(e)
        })?;
        Ok(Self { listener, router })
    }

    /// The address actually bound.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Start the server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        info!(addr = %self.local_addr()?, "Starting HTTP server");

        axum::serve(
            self.listener,
            self.router
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await
        .map_err(|e| {
            error!(error = %e, "HTTP server failed");
            GatekeeperError::Io(e)
        })
    }
}
