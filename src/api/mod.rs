//! API Routes for modelhub
//!
//! This module combines all routes into a single router.
//! Routes are organized by domain and apply their own middleware.

mod auth;
mod graphql;
pub mod status;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::AppState;

/// Build the route tree.
///
/// Route structure:
/// - /auth/* - Local accounts and token exchange (public, rate limited)
/// - /graphql - Queries, mutations and subscriptions (optional bearer token)
/// - /health, /status - Health checks (public)
pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .merge(status::routes())
        .nest("/auth", auth::routes(state.clone()))
        .merge(graphql::routes(state))
}

/// Build the complete application with tracing and CORS.
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(routes(state.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
