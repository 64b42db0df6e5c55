//! Bearer token authentication middleware.
//!
//! Validates tokens issued by the code exchange or created as personal
//! API tokens. Supports both:
//! - `Authorization: Bearer {token}` headers (recommended)
//! - `?token={token}` query string parameters (for clients that cannot set headers)
//!
//! Token format: `{id}{secret}`, 10 + 32 alphanumeric chars. The id is used
//! for lookup and the SHA-256 of the secret is compared in constant time.

use axum::{
    body::Body,
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{authorization::Bearer, Authorization, HeaderMapExt};
use tracing::debug;

use crate::services::permissions::ServerRole;
use crate::{error::Error, AppState};

/// Authentication context injected into request extensions after successful token validation.
#[derive(Clone, Debug)]
pub struct AuthContext {
    /// User ID that owns this token
    pub user_id: String,
    /// Unique identifier for the token (for audit logging)
    pub token_id: String,
    /// App the token was issued to; `None` for personal tokens
    pub app_id: Option<String>,
    pub scopes: Vec<String>,
    pub server_role: ServerRole,
}

impl AuthContext {
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }

    pub fn require_scope(&self, scope: &str) -> Result<(), Error> {
        if self.has_scope(scope) {
            Ok(())
        } else {
            debug!(token_id = %self.token_id, scope = scope, "Token lacks scope");
            Err(Error::Forbidden)
        }
    }

    pub fn is_admin(&self) -> bool {
        self.server_role == ServerRole::Admin
    }
}

/// Pull the token out of an `Authorization: Bearer ...` value that did not
/// arrive as a header, e.g. a WebSocket init payload.
pub fn parse_bearer(value: &str) -> Option<&str> {
    value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn token_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .typed_get::<Authorization<Bearer>>()
        .map(|auth| auth.token().trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Extract token from Authorization header or query string.
///
/// Priority:
/// 1. Authorization: Bearer {token} header
/// 2. ?token={token} query parameter
fn extract_token_from_request(req: &Request<Body>) -> Option<String> {
    if let Some(token) = token_from_headers(req.headers()) {
        return Some(token);
    }

    let query = req.uri().query()?;
    query.split('&').find_map(|part| {
        let token = part.strip_prefix("token=")?;
        Some(
            urlencoding::decode(token)
                .map(|d| d.into_owned())
                .unwrap_or_else(|_| token.to_string()),
        )
    })
}

/// Middleware that requires a valid token.
///
/// # Errors
///
/// Returns 401 Unauthorized if:
/// - No Authorization header or token query parameter present
/// - Token id not found in database
/// - Token hash doesn't match
/// - Token is expired
pub async fn require_token(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, Error> {
    let token = extract_token_from_request(&req).ok_or(Error::Unauthenticated)?;

    let auth_context = state.auth.validate_token(&token).await?;
    req.extensions_mut().insert(auth_context);

    Ok(next.run(req).await)
}

/// Middleware that attaches an `AuthContext` when a valid token is present.
///
/// Requests without a token, or with one that does not validate, continue
/// anonymously. Handlers decide what anonymous callers may do.
pub async fn attach_token(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    if let Some(token) = extract_token_from_request(&req) {
        match state.auth.validate_token(&token).await {
            Ok(ctx) => {
                req.extensions_mut().insert(ctx);
            }
            Err(e) => debug!(error = %e, "Ignoring invalid token"),
        }
    }

    next.run(req).await
}
