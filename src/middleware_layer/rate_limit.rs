use std::sync::Arc;

use axum::Router;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};

use crate::error::{AppError, Result};

/// A per-client-IP token bucket.
#[derive(Debug, Clone, Copy)]
pub struct RateLimit {
    /// Seconds needed to refill one request.
    pub replenish_secs: u64,
    /// Requests allowed in a burst.
    pub burst: u32,
}

/// Register and login: a handful of attempts, then one every few seconds.
pub const AUTH: RateLimit = RateLimit {
    replenish_secs: 4,
    burst: 10,
};

/// Everything else.
pub const API: RateLimit = RateLimit {
    replenish_secs: 1,
    burst: 100,
};

/// Wraps every route of `router` in a per-IP rate limit.
///
/// Clients are keyed by peer address, so the server must be run with
/// `into_make_service_with_connect_info::<SocketAddr>()`.
///
/// # Arguments
///
/// * `router` - The routes to protect.
/// * `limit` - The refill interval and burst size shared by those routes.
///
/// # Returns
///
/// The wrapped router, or an error if `limit` is rejected by the governor.
pub fn with_rate_limit<S>(router: Router<S>, limit: RateLimit) -> Result<Router<S>>
where
    S: Clone + Send + Sync + 'static,
{
    let config = GovernorConfigBuilder::default()
        .per_second(limit.replenish_secs)
        .burst_size(limit.burst)
        .use_headers()
        .finish()
        .ok_or_else(|| AppError::Internal(format!("Invalid rate limit: {:?}", limit)))?;

    Ok(router.layer(GovernorLayer::new(Arc::new(config))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        extract::ConnectInfo,
        http::{Request, StatusCode},
        routing::get,
    };
    use std::net::SocketAddr;
    use tower::ServiceExt;

    fn request_from(ip: [u8; 4]) -> Request<Body> {
        let mut request = Request::builder().uri("/").body(Body::empty()).unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from((ip, 40000))));
        request
    }

    #[tokio::test]
    async fn burst_is_enforced_per_client() {
        let limit = RateLimit {
            replenish_secs: 60,
            burst: 2,
        };
        let app = with_rate_limit(Router::new().route("/", get(|| async { "ok" })), limit).unwrap();

        for _ in 0..2 {
            let response = app.clone().oneshot(request_from([10, 0, 0, 1])).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
        let response = app.clone().oneshot(request_from([10, 0, 0, 1])).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        let response = app.oneshot(request_from([10, 0, 0, 2])).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn zero_burst_is_rejected() {
        let limit = RateLimit {
            replenish_secs: 1,
            burst: 0,
        };
        assert!(with_rate_limit(Router::<()>::new(), limit).is_err());
    }
}
