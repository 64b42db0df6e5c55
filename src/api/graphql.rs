//! GraphQL Routes
//!
//! Routes:
//! - POST /graphql - Queries and mutations
//! - GET /graphql - WebSocket subscriptions, or GraphiQL for plain browsers
//!
//! Bearer tokens are optional here. Invalid tokens on HTTP requests are
//! ignored and the request runs anonymously; resolvers decide what
//! anonymous callers may see. On WebSockets the token may also arrive in
//! the `connection_init` payload as `{"Authorization": "Bearer ..."}`.

use async_graphql::http::{GraphiQLSource, ALL_WEBSOCKET_PROTOCOLS};
use async_graphql::Data;
use async_graphql_axum::{GraphQLProtocol, GraphQLRequest, GraphQLResponse, GraphQLWebSocket};
use axum::{
    extract::{State, WebSocketUpgrade},
    middleware,
    response::{Html, IntoResponse, Response},
    routing::get,
    Extension, Router,
};
use tracing::debug;

use crate::graphql::{self, AppSchema, RequestContext, ServiceResultExt};
use crate::middleware::{attach_token, parse_bearer, AuthContext};
use crate::AppState;

const ENDPOINT: &str = "/graphql";

/// Build GraphQL routes.
pub fn routes(state: AppState) -> Router<AppState> {
    let schema = graphql::build_schema(state.clone());

    Router::new()
        .route(ENDPOINT, get(graphql_get).post(graphql_post))
        .layer(Extension(schema))
        .layer(middleware::from_fn_with_state(state, attach_token))
}

/// POST /graphql
async fn graphql_post(
    State(state): State<AppState>,
    Extension(schema): Extension<AppSchema>,
    auth: Option<Extension<AuthContext>>,
    request: GraphQLRequest,
) -> GraphQLResponse {
    let auth = auth.map(|Extension(ctx)| ctx);
    let request = graphql::with_request_data(request.into_inner(), &state, auth);
    schema.execute(request).await.into()
}

/// GET /graphql
async fn graphql_get(
    State(state): State<AppState>,
    Extension(schema): Extension<AppSchema>,
    auth: Option<Extension<AuthContext>>,
    protocol: Option<GraphQLProtocol>,
    upgrade: Option<WebSocketUpgrade>,
) -> Response {
    let (Some(protocol), Some(upgrade)) = (protocol, upgrade) else {
        return Html(
            GraphiQLSource::build()
                .endpoint(ENDPOINT)
                .subscription_endpoint(ENDPOINT)
                .finish(),
        )
        .into_response();
    };

    let header_auth = auth.map(|Extension(ctx)| ctx);

    upgrade
        .protocols(ALL_WEBSOCKET_PROTOCOLS)
        .on_upgrade(move |stream| {
            GraphQLWebSocket::new(stream, schema, protocol)
                .on_connection_init(move |payload| {
                    connection_data(state, header_auth, payload)
                })
                .serve()
        })
}

/// Caller identity for a WebSocket connection.
///
/// A token in the init payload wins over one from the upgrade request. A
/// payload token that does not validate rejects the connection.
async fn connection_data(
    state: AppState,
    header_auth: Option<AuthContext>,
    payload: serde_json::Value,
) -> async_graphql::Result<Data> {
    let token = payload
        .get("Authorization")
        .or_else(|| payload.get("authorization"))
        .and_then(|v| v.as_str())
        .and_then(parse_bearer)
        .map(str::to_string);

    let auth = match token {
        Some(token) => Some(state.auth.validate_token(&token).await.gql()?),
        None => header_auth,
    };

    debug!(
        user_id = auth.as_ref().map(|a| a.user_id.as_str()).unwrap_or("anonymous"),
        "GraphQL WebSocket connected"
    );

    let mut data = Data::default();
    data.insert(RequestContext { auth });
    data.insert(graphql::request_loader(&state.db));
    Ok(data)
}
