//! Rate limiting middleware.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use tracing::debug;

use super::client_key::client_key;
use crate::ratelimit::{Decision, LimiterSet, Rejection};

/// Shared state for [`rate_limit`].
#[derive(Debug, Clone)]
pub struct RateLimitState {
    pub limiters: Arc<LimiterSet>,
    pub trust_forwarded_for: bool,
}

impl RateLimitState {
    pub fn new(limiters: Arc<LimiterSet>, trust_forwarded_for: bool) -> Self {
        Self {
            limiters,
            trust_forwarded_for,
        }
    }
}

/// Pass the request on, or reject it when its client is over limit.
pub async fn rate_limit(
    State(state): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(limiter) = state.limiters.select(request.uri().path()) else {
        return next.run(request).await;
    };

    let key = client_key(&request, state.trust_forwarded_for);

    match limiter.check(&key) {
        Decision::Allow => next.run(request).await,
        Decision::Deny(rejection) => {
            debug!(
                limiter = %limiter.name(),
                key = %key,
                method = %request.method(),
                path = %request.uri().path(),
                status = rejection.status_code,
                "Rejected request"
            );
            rejection.into_response()
        }
    }
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::TOO_MANY_REQUESTS);
        let mut response = (status, Json(self.body())).into_response();

        if let Some(retry_after) = self.retry_after {
            // Whole seconds, rounded up.
            let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::{ManualClock, RateLimitOptions, RateLimiter};
    use axum::{body::Body, extract::ConnectInfo, middleware, routing::get, Router};
    use std::net::SocketAddr;
    use std::time::Duration;
    use tower::ServiceExt;

    fn app(limiters: LimiterSet, trust_forwarded_for: bool) -> Router {
        let state = RateLimitState::new(Arc::new(limiters), trust_forwarded_for);
        Router::new()
            .route("/products", get(|| async { "catalog" }))
            .route("/api/auth/login", get(|| async { "login" }))
            .layer(middleware::from_fn_with_state(state, rate_limit))
    }

    fn request_from(path: &str, peer: Option<&str>) -> Request {
        let mut request = Request::builder().uri(path).body(Body::empty()).unwrap();
        if let Some(peer) = peer {
            let addr: SocketAddr = peer.parse().unwrap();
            request.extensions_mut().insert(ConnectInfo(addr));
        }
        request
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn global(max: u64) -> LimiterSet {
        LimiterSet::new().with_global(RateLimiter::new(RateLimitOptions::new(60_000, max)).unwrap())
    }

    #[tokio::test]
    async fn test_requests_within_limit_proceed() {
        let app = app(global(2), false);

        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(request_from("/products", Some("1.1.1.1:4000")))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
    }

    #[tokio::test]
    async fn test_default_denial_response() {
        let app = app(global(1), false);

        app.clone()
            .oneshot(request_from("/products", Some("1.1.1.1:4000")))
            .await
            .unwrap();
        let response = app
            .oneshot(request_from("/products", Some("1.1.1.1:4001")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().get(header::RETRY_AFTER).is_none());
        assert_eq!(
            json_body(response).await,
            serde_json::json!({
                "success": false,
                "message": "Too many requests, please try again later"
            })
        );
    }

    #[tokio::test]
    async fn test_unattributed_requests_share_one_counter() {
        let app = app(global(1), false);

        let first = app.clone().oneshot(request_from("/products", None)).await.unwrap();
        let second = app.oneshot(request_from("/products", None)).await.unwrap();

        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_clients_are_independent() {
        let app = app(global(1), false);

        app.clone()
            .oneshot(request_from("/products", Some("1.1.1.1:1")))
            .await
            .unwrap();
        let response = app
            .oneshot(request_from("/products", Some("2.2.2.2:1")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_scoped_limit_and_custom_status() {
        let auth = RateLimiter::new(
            RateLimitOptions::new(60_000, 1)
                .with_status_code(503)
                .with_message("Too many login attempts"),
        )
        .unwrap();
        let limiters = LimiterSet::new().with_scope("/api/auth", auth);
        let app = app(limiters, false);

        for _ in 0..5 {
            let response = app
                .clone()
                .oneshot(request_from("/products", Some("1.1.1.1:1")))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        app.clone()
            .oneshot(request_from("/api/auth/login", Some("1.1.1.1:1")))
            .await
            .unwrap();
        let response = app
            .oneshot(request_from("/api/auth/login", Some("1.1.1.1:1")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            json_body(response).await,
            serde_json::json!({ "success": false, "message": "Too many login attempts" })
        );
    }

    #[tokio::test]
    async fn test_forwarded_for_keys_when_trusted() {
        let app = app(global(1), true);

        let mut first = request_from("/products", Some("10.0.0.1:1"));
        first
            .headers_mut()
            .insert("x-forwarded-for", "203.0.113.1".parse().unwrap());
        let mut second = request_from("/products", Some("10.0.0.1:1"));
        second
            .headers_mut()
            .insert("x-forwarded-for", "203.0.113.2".parse().unwrap());

        assert_eq!(app.clone().oneshot(first).await.unwrap().status(), StatusCode::OK);
        assert_eq!(app.oneshot(second).await.unwrap().status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_window_reset_readmits_client() {
        let clock = Arc::new(ManualClock::new(0));
        let limiter = RateLimiter::with_clock(RateLimitOptions::new(1_000, 3), clock.clone()).unwrap();
        let app = app(LimiterSet::new().with_global(limiter), false);

        for _ in 0..3 {
            let response = app
                .clone()
                .oneshot(request_from("/products", Some("1.1.1.1:1")))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
        let response = app
            .clone()
            .oneshot(request_from("/products", Some("1.1.1.1:1")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        clock.advance(1_050);
        let response = app
            .oneshot(request_from("/products", Some("1.1.1.1:1")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_retry_after_header_rounds_up() {
        let rejection = Rejection {
            status_code: 429,
            message: "later".to_string(),
            retry_after: Some(Duration::from_millis(1_200)),
        };
        let response = rejection.into_response();
        assert_eq!(response.headers()[header::RETRY_AFTER], "2");
    }
}
