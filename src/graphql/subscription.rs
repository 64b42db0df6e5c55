//! Subscription root.
//!
//! Every subscription reads from the shared event bus, keeps the events of
//! one project and re-checks the subscriber's read access before each
//! delivery. Subscribers that fall behind skip the missed events.

use std::collections::HashSet;

use async_graphql::{Context, Subscription};
use futures::{Stream, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, warn};

use super::context::{ContextHelpers, ServiceResultExt};
use super::types::{
    ModelObject, ProjectModelsUpdatedMessage, ProjectObject, ProjectUpdatedMessage,
    ProjectUpdatedMessageType, ProjectVersionsUpdatedMessage, VersionObject,
};
use crate::db::{self, Project};
use crate::middleware::AuthContext;
use crate::services::HubEvent;
use crate::{AppState, Result};

#[derive(Default)]
pub struct SubscriptionRoot;

/// Events of one project, in order, skipping what a lagging receiver lost.
fn project_events(
    rx: broadcast::Receiver<HubEvent>,
    project_id: String,
) -> impl Stream<Item = HubEvent> {
    BroadcastStream::new(rx).filter_map(move |item| {
        let project_id = project_id.clone();
        async move {
            match item {
                Ok(event) if event.project_id() == project_id => Some(event),
                Ok(_) => None,
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!(project_id = %project_id, skipped, "Subscriber lagged, events dropped");
                    None
                }
            }
        }
    })
}

/// Whether the subscriber may still see the project.
async fn still_readable(state: &AppState, project: &Project, auth: Option<&AuthContext>) -> bool {
    match state.permissions.can_read_project(project, auth).await {
        Ok(allowed) => allowed,
        Err(e) => {
            warn!(project_id = %project.id, error = %e, "Access re-check failed");
            false
        }
    }
}

/// Re-load the project and check access; `None` once it is gone or hidden.
async fn readable_project(
    state: &AppState,
    project_id: &str,
    auth: Option<&AuthContext>,
) -> Option<Project> {
    let project = match db::find_project(&state.db, project_id).await {
        Ok(project) => project?,
        Err(e) => {
            warn!(project_id = %project_id, error = %e, "Project lookup failed");
            return None;
        }
    };

    if still_readable(state, &project, auth).await {
        Some(project)
    } else {
        debug!(project_id = %project_id, "Dropping event, access lost");
        None
    }
}

/// Initial access check shared by all subscriptions.
async fn authorize(state: &AppState, project_id: &str, auth: Option<&AuthContext>) -> Result<()> {
    let project = db::get_project(&state.db, project_id).await?;
    state.permissions.require_read(&project, auth).await
}

#[Subscription]
impl SubscriptionRoot {
    /// Project metadata changes and deletion.
    async fn project_updated(
        &self,
        ctx: &Context<'_>,
        id: String,
    ) -> async_graphql::Result<impl Stream<Item = ProjectUpdatedMessage>> {
        let state = ctx.app_state()?.clone();
        let auth = ctx.auth_context().cloned();
        authorize(&state, &id, auth.as_ref()).await.gql()?;

        Ok(project_events(state.events.subscribe(), id).filter_map(move |event| {
            let state = state.clone();
            let auth = auth.clone();
            async move {
                match event {
                    HubEvent::ProjectUpdated(e) => {
                        if !still_readable(&state, &e.project, auth.as_ref()).await {
                            return None;
                        }
                        Some(ProjectUpdatedMessage {
                            id: e.project.id.clone(),
                            kind: ProjectUpdatedMessageType::Updated,
                            project: Some(ProjectObject(e.project)),
                        })
                    }
                    HubEvent::ProjectDeleted(e) => {
                        let allowed = e.project.is_public()
                            || auth.as_ref().is_some_and(|a| {
                                a.is_admin() || e.member_ids.iter().any(|m| *m == a.user_id)
                            });
                        allowed.then(|| ProjectUpdatedMessage {
                            id: e.project.id,
                            kind: ProjectUpdatedMessageType::Deleted,
                            project: None,
                        })
                    }
                    _ => None,
                }
            }
        }))
    }

    /// Model changes, optionally limited to `modelIds`.
    async fn project_models_updated(
        &self,
        ctx: &Context<'_>,
        id: String,
        model_ids: Option<Vec<String>>,
    ) -> async_graphql::Result<impl Stream<Item = ProjectModelsUpdatedMessage>> {
        let state = ctx.app_state()?.clone();
        let auth = ctx.auth_context().cloned();
        authorize(&state, &id, auth.as_ref()).await.gql()?;

        let wanted: Option<HashSet<String>> = model_ids
            .filter(|ids| !ids.is_empty())
            .map(|ids| ids.into_iter().collect());

        Ok(project_events(state.events.subscribe(), id).filter_map(move |event| {
            let state = state.clone();
            let auth = auth.clone();
            let wanted = wanted.clone();
            async move {
                let HubEvent::ModelChanged(e) = event else {
                    return None;
                };
                if wanted.as_ref().is_some_and(|w| !w.contains(&e.model_id)) {
                    return None;
                }
                readable_project(&state, &e.project_id, auth.as_ref()).await?;

                Some(ProjectModelsUpdatedMessage {
                    id: e.model_id,
                    kind: e.kind.into(),
                    model: e.model.map(ModelObject),
                })
            }
        }))
    }

    /// Version changes across all models of the project.
    async fn project_versions_updated(
        &self,
        ctx: &Context<'_>,
        id: String,
    ) -> async_graphql::Result<impl Stream<Item = ProjectVersionsUpdatedMessage>> {
        let state = ctx.app_state()?.clone();
        let auth = ctx.auth_context().cloned();
        authorize(&state, &id, auth.as_ref()).await.gql()?;

        Ok(project_events(state.events.subscribe(), id).filter_map(move |event| {
            let state = state.clone();
            let auth = auth.clone();
            async move {
                let HubEvent::VersionChanged(e) = event else {
                    return None;
                };
                readable_project(&state, &e.project_id, auth.as_ref()).await?;

                Some(ProjectVersionsUpdatedMessage {
                    id: e.version_id,
                    model_id: e.model_id,
                    kind: e.kind.into(),
                    version: e.version.map(VersionObject),
                })
            }
        }))
    }
}
