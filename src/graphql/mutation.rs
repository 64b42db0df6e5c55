//! Mutation root.
//!
//! Resolvers check the token scope, then hand over to the services, which
//! check the caller's role on the target project.

use async_graphql::{Context, InputObject, Object};

use super::context::{ContextHelpers, ServiceResultExt};
use super::types::{
    AppCreateResult, ModelObject, ProjectObject, ProjectVisibility, VersionObject,
};
use crate::db::{UpdateModel, UpdateProject};
use crate::services::{scopes, AppRegistration, NewProject, NewVersion, ProjectRole, ServerRole};
use crate::Error;

#[derive(InputObject)]
pub struct ProjectCreateInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub visibility: Option<ProjectVisibility>,
}

#[derive(InputObject)]
pub struct ProjectUpdateInput {
    pub id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub visibility: Option<ProjectVisibility>,
}

#[derive(InputObject)]
pub struct ProjectUpdateRoleInput {
    pub project_id: String,
    pub user_id: String,
    /// `stream:owner`, `stream:contributor`, `stream:reviewer`, or null to remove.
    pub role: Option<String>,
}

#[derive(InputObject)]
pub struct CreateModelInput {
    pub project_id: String,
    pub name: String,
    pub description: Option<String>,
}

#[derive(InputObject)]
pub struct UpdateModelInput {
    pub project_id: String,
    pub id: String,
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(InputObject)]
pub struct DeleteModelInput {
    pub project_id: String,
    pub id: String,
}

#[derive(InputObject)]
pub struct CreateVersionInput {
    pub project_id: String,
    pub model_id: String,
    pub object_id: String,
    pub message: Option<String>,
    pub source_application: Option<String>,
    pub total_children_count: Option<i64>,
    #[graphql(default)]
    pub parents: Vec<String>,
}

#[derive(InputObject)]
pub struct UpdateVersionInput {
    pub project_id: String,
    pub version_id: String,
    pub message: String,
}

#[derive(InputObject)]
pub struct DeleteVersionInput {
    pub project_id: String,
    pub version_id: String,
}

#[derive(InputObject)]
pub struct ApiTokenCreateInput {
    pub name: String,
    pub scopes: Vec<String>,
    /// Seconds; defaults to the server's token lifetime.
    pub lifespan: Option<i64>,
}

#[derive(InputObject)]
pub struct AppCreateInput {
    pub name: String,
    pub description: Option<String>,
    pub redirect_url: String,
    pub scopes: Vec<String>,
    #[graphql(default)]
    pub public: bool,
}

#[derive(Default)]
pub struct MutationRoot;

#[Object]
impl MutationRoot {
    // ========================================================================
    // Projects
    // ========================================================================

    async fn project_create(
        &self,
        ctx: &Context<'_>,
        input: ProjectCreateInput,
    ) -> async_graphql::Result<ProjectObject> {
        let auth = ctx.require_auth()?;
        auth.require_scope(scopes::STREAMS_WRITE).gql()?;

        let project = ctx
            .app_state()?
            .projects
            .create_project(
                auth,
                NewProject {
                    name: input.name,
                    description: input.description,
                    visibility: input.visibility.map(Into::into),
                },
            )
            .await
            .gql()?;
        Ok(ProjectObject(project))
    }

    async fn project_update(
        &self,
        ctx: &Context<'_>,
        input: ProjectUpdateInput,
    ) -> async_graphql::Result<ProjectObject> {
        let auth = ctx.require_auth()?;
        auth.require_scope(scopes::STREAMS_WRITE).gql()?;

        let project = ctx
            .app_state()?
            .projects
            .update_project(
                auth,
                &input.id,
                UpdateProject {
                    name: input.name,
                    description: input.description,
                    visibility: input.visibility.map(Into::into),
                },
            )
            .await
            .gql()?;
        Ok(ProjectObject(project))
    }

    async fn project_delete(&self, ctx: &Context<'_>, id: String) -> async_graphql::Result<bool> {
        let auth = ctx.require_auth()?;
        auth.require_scope(scopes::STREAMS_WRITE).gql()?;

        ctx.app_state()?
            .projects
            .delete_project(auth, &id)
            .await
            .gql()?;
        Ok(true)
    }

    async fn project_update_role(
        &self,
        ctx: &Context<'_>,
        input: ProjectUpdateRoleInput,
    ) -> async_graphql::Result<ProjectObject> {
        let auth = ctx.require_auth()?;
        auth.require_scope(scopes::STREAMS_WRITE).gql()?;

        let role = input
            .role
            .as_deref()
            .map(|r| {
                ProjectRole::from_str(r)
                    .ok_or_else(|| Error::Validation(format!("Unknown role {}", r)))
            })
            .transpose()
            .gql()?;

        let project = ctx
            .app_state()?
            .projects
            .update_role(auth, &input.project_id, &input.user_id, role)
            .await
            .gql()?;
        Ok(ProjectObject(project))
    }

    // ========================================================================
    // Models
    // ========================================================================

    async fn model_create(
        &self,
        ctx: &Context<'_>,
        input: CreateModelInput,
    ) -> async_graphql::Result<ModelObject> {
        let auth = ctx.require_auth()?;
        auth.require_scope(scopes::STREAMS_WRITE).gql()?;

        let model = ctx
            .app_state()?
            .projects
            .create_model(auth, &input.project_id, &input.name, input.description)
            .await
            .gql()?;
        Ok(ModelObject(model))
    }

    async fn model_update(
        &self,
        ctx: &Context<'_>,
        input: UpdateModelInput,
    ) -> async_graphql::Result<ModelObject> {
        let auth = ctx.require_auth()?;
        auth.require_scope(scopes::STREAMS_WRITE).gql()?;

        let model = ctx
            .app_state()?
            .projects
            .update_model(
                auth,
                &input.project_id,
                &input.id,
                UpdateModel {
                    name: input.name,
                    description: input.description,
                },
            )
            .await
            .gql()?;
        Ok(ModelObject(model))
    }

    async fn model_delete(
        &self,
        ctx: &Context<'_>,
        input: DeleteModelInput,
    ) -> async_graphql::Result<bool> {
        let auth = ctx.require_auth()?;
        auth.require_scope(scopes::STREAMS_WRITE).gql()?;

        ctx.app_state()?
            .projects
            .delete_model(auth, &input.project_id, &input.id)
            .await
            .gql()?;
        Ok(true)
    }

    // ========================================================================
    // Versions
    // ========================================================================

    async fn version_create(
        &self,
        ctx: &Context<'_>,
        input: CreateVersionInput,
    ) -> async_graphql::Result<VersionObject> {
        let auth = ctx.require_auth()?;
        auth.require_scope(scopes::STREAMS_WRITE).gql()?;

        let version = ctx
            .app_state()?
            .projects
            .create_version(
                auth,
                NewVersion {
                    project_id: input.project_id,
                    model_id: input.model_id,
                    object_id: input.object_id,
                    message: input.message,
                    source_application: input.source_application,
                    total_children_count: input.total_children_count,
                    parents: input.parents,
                },
            )
            .await
            .gql()?;
        Ok(VersionObject(version))
    }

    async fn version_update(
        &self,
        ctx: &Context<'_>,
        input: UpdateVersionInput,
    ) -> async_graphql::Result<VersionObject> {
        let auth = ctx.require_auth()?;
        auth.require_scope(scopes::STREAMS_WRITE).gql()?;

        let version = ctx
            .app_state()?
            .projects
            .update_version(auth, &input.project_id, &input.version_id, &input.message)
            .await
            .gql()?;
        Ok(VersionObject(version))
    }

    async fn version_delete(
        &self,
        ctx: &Context<'_>,
        input: DeleteVersionInput,
    ) -> async_graphql::Result<bool> {
        let auth = ctx.require_auth()?;
        auth.require_scope(scopes::STREAMS_WRITE).gql()?;

        ctx.app_state()?
            .projects
            .delete_version(auth, &input.project_id, &input.version_id)
            .await
            .gql()?;
        Ok(true)
    }

    // ========================================================================
    // Tokens and apps
    // ========================================================================

    /// Create a personal token. The value is only returned here.
    async fn api_token_create(
        &self,
        ctx: &Context<'_>,
        input: ApiTokenCreateInput,
    ) -> async_graphql::Result<String> {
        let auth = ctx.require_auth()?;
        auth.require_scope(scopes::TOKENS_WRITE).gql()?;

        let (token, _) = ctx
            .app_state()?
            .auth
            .create_personal_token(auth, &input.name, input.scopes, input.lifespan)
            .await
            .gql()?;
        Ok(token)
    }

    /// Revoke one of the caller's tokens by id.
    async fn api_token_revoke(&self, ctx: &Context<'_>, id: String) -> async_graphql::Result<bool> {
        let auth = ctx.require_auth()?;
        auth.require_scope(scopes::TOKENS_WRITE).gql()?;

        ctx.app_state()?
            .auth
            .revoke_token(auth, &id)
            .await
            .gql()?;
        Ok(true)
    }

    async fn app_create(
        &self,
        ctx: &Context<'_>,
        input: AppCreateInput,
    ) -> async_graphql::Result<AppCreateResult> {
        let auth = ctx.require_auth()?;
        auth.require_scope(scopes::APPS_WRITE).gql()?;

        let state = ctx.app_state()?;
        state
            .permissions
            .require_server_role(Some(auth), ServerRole::User)
            .gql()?;

        let app = state
            .auth
            .create_app(
                auth,
                AppRegistration {
                    name: input.name,
                    description: input.description,
                    redirect_url: input.redirect_url,
                    scopes: input.scopes,
                    public: input.public,
                },
            )
            .await
            .gql()?;

        Ok(AppCreateResult {
            id: app.id,
            secret: app.secret,
        })
    }
}
