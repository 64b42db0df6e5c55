//! Authentication Routes
//!
//! Local accounts and the access-code grant.
//!
//! Routes:
//! - POST /auth/local/register - Create an account, redirect with an access code
//! - POST /auth/local/login - Check credentials, redirect with an access code
//! - GET /auth/accesscode - Issue a code for another app using a bearer token
//! - POST /auth/token - Exchange an access code or refresh token for a token pair
//! - POST /auth/logout - Delete a token pair

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::{header, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::middleware::{limit_auth_requests, require_token, AuthContext};
use crate::services::Registration;
use crate::{AppState, Error, Result};

/// Build authentication routes.
pub fn routes(state: AppState) -> Router<AppState> {
    let local = Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            limit_auth_requests,
        ));

    Router::new()
        .nest("/local", local)
        .route(
            "/accesscode",
            get(access_code).layer(middleware::from_fn_with_state(state, require_token)),
        )
        .route("/token", post(token))
        .route("/logout", post(logout))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Query parameters shared by the credential endpoints.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantQuery {
    pub challenge: Option<String>,
    pub app_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RegisterRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub name: Option<String>,
    pub company: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Either an access code exchange or a refresh, depending on whether
/// `refreshToken` is present.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRequest {
    pub app_id: Option<String>,
    pub app_secret: Option<String>,
    pub access_code: Option<String>,
    pub challenge: Option<String>,
    pub refresh_token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub token: String,
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest {
    pub token: Option<String>,
    pub refresh_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

// ============================================================================
// Helpers
// ============================================================================

/// 302 to `location`. `Redirect::to` would answer 303.
fn found(location: String) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

fn json_body<T>(body: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    body.map(|Json(v)| v)
        .map_err(|rejection| Error::InvalidInput(rejection.body_text()))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

// ============================================================================
// Handlers
// ============================================================================

/// Register a local account.
///
/// POST /auth/local/register?challenge=...&appId=...
#[axum::debug_handler]
async fn register(
    State(state): State<AppState>,
    Query(query): Query<GrantQuery>,
    body: std::result::Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Response> {
    let body = json_body(body)?;
    if non_empty(query.challenge.clone()).is_none() {
        return Err(Error::Validation("Missing challenge".into()));
    }

    let user = state
        .auth
        .register(Registration {
            email: non_empty(body.email).ok_or_else(|| Error::Validation("Missing email".into()))?,
            password: body
                .password
                .filter(|p| !p.is_empty())
                .ok_or_else(|| Error::Validation("Missing password".into()))?,
            name: non_empty(body.name).ok_or_else(|| Error::Validation("Missing name".into()))?,
            company: body.company,
        })
        .await?;

    let location = state
        .auth
        .authorize(&user.id, query.app_id.as_deref(), query.challenge.as_deref())
        .await?;

    Ok(found(location))
}

/// Log in with email and password.
///
/// POST /auth/local/login?challenge=...&appId=...
#[axum::debug_handler]
async fn login(
    State(state): State<AppState>,
    Query(query): Query<GrantQuery>,
    body: std::result::Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Response> {
    let body = json_body(body)?;
    if non_empty(query.challenge.clone()).is_none() {
        return Err(Error::Validation("Missing challenge".into()));
    }

    let email = non_empty(body.email).ok_or(Error::InvalidCredentials)?;
    let password = body.password.ok_or(Error::InvalidCredentials)?;

    let user = state.auth.login(&email, &password).await?;
    info!(user_id = %user.id, "User logged in");

    let location = state
        .auth
        .authorize(&user.id, query.app_id.as_deref(), query.challenge.as_deref())
        .await?;

    Ok(found(location))
}

/// Issue an access code for an app on behalf of the token holder.
///
/// GET /auth/accesscode?appId=...&challenge=...
#[axum::debug_handler]
async fn access_code(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Query(query): Query<GrantQuery>,
) -> Result<Response> {
    let location = state
        .auth
        .authorize_with_token(&ctx, query.app_id.as_deref(), query.challenge.as_deref())
        .await?;

    Ok(found(location))
}

/// Exchange an access code, or rotate a refresh token.
///
/// POST /auth/token
#[axum::debug_handler]
async fn token(
    State(state): State<AppState>,
    body: std::result::Result<Json<TokenRequest>, JsonRejection>,
) -> Result<Json<TokenResponse>> {
    let body = json_body(body)?;

    let app_id = non_empty(body.app_id).ok_or(Error::InvalidCredentials)?;
    let app_secret = non_empty(body.app_secret).ok_or(Error::InvalidCredentials)?;

    let pair = match non_empty(body.refresh_token) {
        Some(refresh_token) => {
            state
                .auth
                .refresh(&refresh_token, &app_id, &app_secret)
                .await?
        }
        None => {
            let access_code = non_empty(body.access_code).ok_or(Error::InvalidCredentials)?;
            let challenge = non_empty(body.challenge).ok_or(Error::InvalidCredentials)?;
            state
                .auth
                .exchange_access_code(&app_id, &app_secret, &access_code, &challenge)
                .await?
        }
    };

    Ok(Json(TokenResponse {
        token: pair.token,
        refresh_token: pair.refresh_token,
    }))
}

/// Delete a token pair.
///
/// POST /auth/logout
#[axum::debug_handler]
async fn logout(
    State(state): State<AppState>,
    body: std::result::Result<Json<LogoutRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>> {
    let body = json_body(body)?;

    let token = non_empty(body.token)
        .ok_or_else(|| Error::InvalidInput("Missing token".into()))?;
    let refresh_token = non_empty(body.refresh_token)
        .ok_or_else(|| Error::InvalidInput("Missing refreshToken".into()))?;

    state.auth.logout(&token, &refresh_token).await?;

    Ok(Json(MessageResponse {
        message: "Logged out".into(),
    }))
}
