//! Application state for modelhub.
//!
//! Contains the shared state that is passed to all handlers and
//! GraphQL resolvers.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::db::DbPool;
use crate::middleware::{create_auth_rate_limiter, AuthRateLimiter};
use crate::services::{
    AuthService, EventBroadcaster, PermissionService, ProjectService, SharedEventBroadcaster,
};
use crate::{config, Result};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub db: DbPool,
    /// Configuration snapshot this state was built from.
    pub config: Arc<Config>,
    /// Credential, app and token management.
    pub auth: AuthService,
    /// Server and project role checks.
    pub permissions: PermissionService,
    /// Projects, collaborators, models and versions.
    pub projects: ProjectService,
    /// Publish/subscribe bus feeding GraphQL subscriptions.
    pub events: SharedEventBroadcaster,
    /// Per-client limiter for the local credential endpoints.
    pub auth_limiter: AuthRateLimiter,
}

impl AppState {
    /// Create a new application state from the global configuration,
    /// opening the database and applying the schema.
    pub async fn new() -> Result<Self> {
        let config = config::config();

        let db = crate::db::init_pool(&config.database.path).await?;
        crate::db::initialize_schema(&db).await?;

        Self::with_pool(db, config.clone()).await
    }

    /// Build state around an existing pool whose schema is already applied.
    pub async fn with_pool(db: DbPool, config: Config) -> Result<Self> {
        let config = Arc::new(config);

        let auth = AuthService::new(db.clone(), config.auth.clone());
        auth.ensure_web_app().await?;

        let permissions = PermissionService::new(db.clone());
        let events = Arc::new(EventBroadcaster::new());
        let projects = ProjectService::new(db.clone(), permissions.clone(), events.clone());
        let auth_limiter = create_auth_rate_limiter(config.rate_limit.auth_per_minute);

        Ok(Self {
            db,
            config,
            auth,
            permissions,
            projects,
            events,
            auth_limiter,
        })
    }

    /// Delete expired access codes and tokens, and forget limiter state for
    /// clients whose quota has fully replenished. Returns the rows removed.
    pub async fn purge_expired(&self) -> Result<u64> {
        let now = Utc::now();
        let codes = crate::db::delete_expired_access_codes(&self.db, now).await?;
        let tokens = crate::db::delete_expired_tokens(&self.db, now).await?;

        self.auth_limiter.retain_recent();
        self.auth_limiter.shrink_to_fit();

        Ok(codes + tokens)
    }

    /// Start the background task running [`AppState::purge_expired`] on the
    /// configured interval.
    pub fn start_maintenance(&self) -> JoinHandle<()> {
        let state = self.clone();
        let period = Duration::from_secs(state.config.server.maintenance_interval_secs);

        tokio::spawn(async move {
            loop {
                tokio::time::sleep(period).await;

                match state.purge_expired().await {
                    Ok(0) => {}
                    Ok(removed) => tracing::debug!(removed, "Purged expired credentials"),
                    Err(e) => tracing::warn!(error = %e, "Credential purge failed"),
                }
            }
        })
    }
}
