//! Per-request data and resolver helpers.

use std::sync::Arc;

use async_graphql::dataloader::DataLoader;
use async_graphql::{Context, ErrorExtensions};

use super::loaders::DbLoader;
use crate::middleware::AuthContext;
use crate::{AppState, Error};

/// Caller identity for one HTTP request or one WebSocket connection.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub auth: Option<AuthContext>,
}

/// Convert service results into GraphQL errors carrying `extensions.code`.
pub trait ServiceResultExt<T> {
    fn gql(self) -> async_graphql::Result<T>;
}

impl<T> ServiceResultExt<T> for crate::Result<T> {
    fn gql(self) -> async_graphql::Result<T> {
        self.map_err(|e| e.extend())
    }
}

/// DataLoader errors arrive shared.
impl<T> ServiceResultExt<T> for std::result::Result<T, Arc<Error>> {
    fn gql(self) -> async_graphql::Result<T> {
        self.map_err(|e| e.as_ref().extend())
    }
}

/// Accessors for the data attached to the schema and to each request.
pub trait ContextHelpers {
    fn app_state(&self) -> async_graphql::Result<&AppState>;
    fn auth_context(&self) -> Option<&AuthContext>;
    /// The caller, or a `FORBIDDEN` error for anonymous requests.
    fn require_auth(&self) -> async_graphql::Result<&AuthContext>;
    fn loader(&self) -> async_graphql::Result<&DataLoader<DbLoader>>;
}

impl ContextHelpers for Context<'_> {
    fn app_state(&self) -> async_graphql::Result<&AppState> {
        self.data::<AppState>()
    }

    fn auth_context(&self) -> Option<&AuthContext> {
        self.data_opt::<RequestContext>()
            .and_then(|request| request.auth.as_ref())
    }

    fn require_auth(&self) -> async_graphql::Result<&AuthContext> {
        self.auth_context().ok_or_else(|| Error::Forbidden.extend())
    }

    fn loader(&self) -> async_graphql::Result<&DataLoader<DbLoader>> {
        self.data::<DataLoader<DbLoader>>()
    }
}
