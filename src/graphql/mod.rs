//! GraphQL API.
//!
//! - `query` - server info, the active user, projects and apps
//! - `mutation` - project, model, version, token and app changes
//! - `subscription` - project, model and version change feeds
//! - `types` - object wrappers over database rows
//! - `loaders` - batched user, model and project lookups
//! - `context` - per-request caller identity and resolver helpers

mod context;
mod loaders;
mod mutation;
mod query;
mod subscription;
pub mod types;

use async_graphql::{Request, Schema};

pub use context::{ContextHelpers, RequestContext, ServiceResultExt};
pub use loaders::{request_loader, DbLoader};
pub use mutation::MutationRoot;
pub use query::QueryRoot;
pub use subscription::SubscriptionRoot;

use crate::middleware::AuthContext;
use crate::AppState;

pub type AppSchema = Schema<QueryRoot, MutationRoot, SubscriptionRoot>;

/// Build the schema. The state is shared by every request.
pub fn build_schema(state: AppState) -> AppSchema {
    Schema::build(
        QueryRoot,
        MutationRoot,
        SubscriptionRoot,
    )
    .data(state)
    .finish()
}

/// Attach the caller and a fresh loader to a request.
pub fn with_request_data(request: Request, state: &AppState, auth: Option<AuthContext>) -> Request {
    request
        .data(RequestContext { auth })
        .data(request_loader(&state.db))
}
