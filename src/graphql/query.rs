//! Query root.

use async_graphql::{Context, Object};

use super::context::{ContextHelpers, ServiceResultExt};
use super::loaders::UserId;
use super::types::{AppObject, LimitedUserObject, ProjectObject, ServerInfo, UserObject};
use crate::db;
use crate::services::scopes;

#[derive(Default)]
pub struct QueryRoot;

#[Object]
impl QueryRoot {
    async fn server_info(&self, ctx: &Context<'_>) -> async_graphql::Result<ServerInfo> {
        let info = &ctx.app_state()?.config.server_info;
        Ok(ServerInfo {
            name: info.name.clone(),
            company: info.company.clone(),
            description: info.description.clone(),
            admin_contact: info.admin_contact.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            scopes: scopes::ALL.iter().map(|s| s.to_string()).collect(),
        })
    }

    /// The authenticated user, or null.
    async fn active_user(&self, ctx: &Context<'_>) -> async_graphql::Result<Option<UserObject>> {
        let Some(auth) = ctx.auth_context() else {
            return Ok(None);
        };
        let state = ctx.app_state()?;
        let user = db::get_user(&state.db, &auth.user_id).await.gql()?;
        Ok(Some(UserObject(user)))
    }

    async fn user(
        &self,
        ctx: &Context<'_>,
        id: String,
    ) -> async_graphql::Result<Option<LimitedUserObject>> {
        let user = ctx.loader()?.load_one(UserId(id)).await.gql()?;
        Ok(user.map(LimitedUserObject))
    }

    /// Readable by anyone when public, otherwise by collaborators.
    async fn project(&self, ctx: &Context<'_>, id: String) -> async_graphql::Result<ProjectObject> {
        let state = ctx.app_state()?;
        let project = db::get_project(&state.db, &id).await.gql()?;
        state
            .permissions
            .require_read(&project, ctx.auth_context())
            .await
            .gql()?;
        Ok(ProjectObject(project))
    }

    async fn app(&self, ctx: &Context<'_>, id: String) -> async_graphql::Result<Option<AppObject>> {
        let state = ctx.app_state()?;
        let app = db::get_app(&state.db, &id).await.gql()?;
        Ok(app.map(AppObject))
    }
}
