//! Service layer for modelhub.
//!
//! Contains the business logic behind the HTTP and GraphQL surfaces:
//! - Auth (local accounts, access codes, token pairs, personal tokens, apps)
//! - Permissions (server roles, project roles, token scopes)
//! - Project (projects, collaborators, models and versions)
//! - Events (publish/subscribe feeding GraphQL subscriptions)
//! - ModelTree (model name rules and tree traversal)

mod auth;
mod event_broadcaster;
pub mod events;
pub mod model_tree;
pub mod password;
pub mod permissions;
mod project;

pub use auth::{
    generate_random, hash_secret, redirect_with_code, AppRegistration, AuthService, Registration,
    TokenPair, TOKEN_ID_LENGTH, TOKEN_SECRET_LENGTH,
};
pub use event_broadcaster::{EventBroadcaster, SharedEventBroadcaster};
pub use events::{ChangeKind, HubEvent};
pub use permissions::{scopes, PermissionService, ProjectRole, ServerRole};
pub use project::{NewProject, NewVersion, ProjectService};
