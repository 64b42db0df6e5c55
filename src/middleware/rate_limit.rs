//! Per-client rate limiting for the credential endpoints.

use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use governor::{clock::DefaultClock, state::keyed::DefaultKeyedStateStore, Quota, RateLimiter};
use tracing::warn;

use crate::{error::Error, AppState};

/// Rate limiter keyed by client address.
pub type AuthRateLimiter = Arc<RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>>;

/// Create a limiter allowing `per_minute` requests per client, with the
/// whole minute's quota available as a burst.
pub fn create_auth_rate_limiter(per_minute: u32) -> AuthRateLimiter {
    let per_minute = NonZeroU32::new(per_minute).unwrap_or(NonZeroU32::MIN);
    Arc::new(RateLimiter::keyed(Quota::per_minute(per_minute)))
}

/// Client key: the peer address, or the first `X-Forwarded-For` hop when
/// the deployment trusts its proxy.
fn client_key(req: &Request<Body>, trust_forwarded_for: bool) -> String {
    let forwarded = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| trust_forwarded_for && !v.is_empty());
    if let Some(forwarded) = forwarded {
        return forwarded.to_string();
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Middleware rejecting clients over their quota with 429.
pub async fn limit_auth_requests(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, Error> {
    let key = client_key(&req, state.config.rate_limit.trust_forwarded_for);

    if state.auth_limiter.check_key(&key).is_err() {
        warn!(client = %key, path = %req.uri().path(), "Auth rate limit exceeded");
        return Err(Error::RateLimitExceeded);
    }

    Ok(next.run(req).await)
}
