//! GraphQL object types.
//!
//! Database rows are wrapped rather than exposed directly, so that nested
//! fields can resolve lazily through the request's loaders. A project
//! object is only ever handed out after its read access was checked, so
//! its nested fields do not check again.

use async_graphql::{Context, Enum, Object, OutputType, SimpleObject};
use chrono::{DateTime, Utc};

use super::context::{ContextHelpers, ServiceResultExt};
use super::loaders::{ModelId, UserId};
use crate::db::{self, App, Cursor, Model, Page, Project, User, Version, Visibility};
use crate::services::model_tree::{self, TreeItem};
use crate::services::{scopes, ChangeKind};
use crate::Error;

/// Resolve `limit`/`cursor` arguments.
pub(crate) fn page_args(
    limit: Option<i32>,
    cursor: Option<&str>,
) -> async_graphql::Result<(i64, Option<Cursor>)> {
    let cursor = Cursor::parse_opt(cursor).gql()?;
    Ok((db::clamp_limit(limit), cursor))
}

// ============================================================================
// Enums
// ============================================================================

#[derive(Enum, Copy, Clone, Debug, PartialEq, Eq)]
pub enum ProjectVisibility {
    Public,
    Private,
}

impl From<Visibility> for ProjectVisibility {
    fn from(v: Visibility) -> Self {
        match v {
            Visibility::Public => Self::Public,
            Visibility::Private => Self::Private,
        }
    }
}

impl From<ProjectVisibility> for Visibility {
    fn from(v: ProjectVisibility) -> Self {
        match v {
            ProjectVisibility::Public => Self::Public,
            ProjectVisibility::Private => Self::Private,
        }
    }
}

#[derive(Enum, Copy, Clone, Debug, PartialEq, Eq)]
pub enum ProjectUpdatedMessageType {
    Updated,
    Deleted,
}

/// Kind of change delivered for models and versions.
#[derive(Enum, Copy, Clone, Debug, PartialEq, Eq)]
pub enum ChangeType {
    Created,
    Updated,
    Deleted,
}

impl From<ChangeKind> for ChangeType {
    fn from(kind: ChangeKind) -> Self {
        match kind {
            ChangeKind::Created => Self::Created,
            ChangeKind::Updated => Self::Updated,
            ChangeKind::Deleted => Self::Deleted,
        }
    }
}

// ============================================================================
// Collections
// ============================================================================

#[derive(SimpleObject)]
#[graphql(concrete(name = "ProjectCollection", params(ProjectObject)))]
#[graphql(concrete(name = "ModelCollection", params(ModelObject)))]
#[graphql(concrete(name = "VersionCollection", params(VersionObject)))]
pub struct Collection<T: OutputType> {
    pub total_count: i64,
    /// Pass back as `cursor` to fetch the next page; null on the last page.
    pub cursor: Option<String>,
    pub items: Vec<T>,
}

impl<T: OutputType> From<Page<T>> for Collection<T> {
    fn from(page: Page<T>) -> Self {
        Self {
            total_count: page.total_count,
            cursor: page.cursor,
            items: page.items,
        }
    }
}

// ============================================================================
// Server
// ============================================================================

#[derive(SimpleObject)]
pub struct ServerInfo {
    pub name: String,
    pub company: Option<String>,
    pub description: Option<String>,
    pub admin_contact: Option<String>,
    pub version: String,
    pub scopes: Vec<String>,
}

/// Public information about a registered app. The secret is never exposed.
pub struct AppObject(pub App);

#[Object(name = "ServerApp")]
impl AppObject {
    async fn id(&self) -> &str {
        &self.0.id
    }

    async fn name(&self) -> &str {
        &self.0.name
    }

    async fn description(&self) -> Option<&str> {
        self.0.description.as_deref()
    }

    async fn trusted(&self) -> bool {
        self.0.trusted
    }

    async fn redirect_url(&self) -> &str {
        &self.0.redirect_url
    }

    async fn scopes(&self) -> Vec<String> {
        self.0.scopes_vec()
    }

    async fn author(&self, ctx: &Context<'_>) -> async_graphql::Result<Option<LimitedUserObject>> {
        load_user(ctx, self.0.author_id.as_deref()).await
    }
}

/// Returned once on app creation; the secret is needed for token exchange.
#[derive(SimpleObject)]
pub struct AppCreateResult {
    pub id: String,
    pub secret: String,
}

// ============================================================================
// Users
// ============================================================================

async fn load_user(
    ctx: &Context<'_>,
    id: Option<&str>,
) -> async_graphql::Result<Option<LimitedUserObject>> {
    let Some(id) = id else {
        return Ok(None);
    };
    let user = ctx.loader()?.load_one(UserId(id.to_string())).await.gql()?;
    Ok(user.map(LimitedUserObject))
}

/// Profile fields visible to anyone.
pub struct LimitedUserObject(pub User);

#[Object(name = "LimitedUser")]
impl LimitedUserObject {
    async fn id(&self) -> &str {
        &self.0.id
    }

    async fn name(&self) -> &str {
        &self.0.name
    }

    async fn company(&self) -> Option<&str> {
        self.0.company.as_deref()
    }

    async fn bio(&self) -> Option<&str> {
        self.0.bio.as_deref()
    }

    async fn avatar(&self) -> Option<&str> {
        self.0.avatar.as_deref()
    }

    async fn verified(&self) -> bool {
        self.0.verified
    }
}

/// The authenticated user.
pub struct UserObject(pub User);

#[Object(name = "User")]
impl UserObject {
    async fn id(&self) -> &str {
        &self.0.id
    }

    /// Requires the `profile:email` scope.
    async fn email(&self, ctx: &Context<'_>) -> Option<&str> {
        ctx.auth_context()
            .filter(|auth| auth.has_scope(scopes::PROFILE_EMAIL))
            .map(|_| self.0.email.as_str())
    }

    async fn name(&self) -> &str {
        &self.0.name
    }

    async fn company(&self) -> Option<&str> {
        self.0.company.as_deref()
    }

    async fn bio(&self) -> Option<&str> {
        self.0.bio.as_deref()
    }

    async fn avatar(&self) -> Option<&str> {
        self.0.avatar.as_deref()
    }

    async fn verified(&self) -> bool {
        self.0.verified
    }

    /// Server role, e.g. `server:admin`.
    async fn role(&self) -> &str {
        &self.0.role
    }

    async fn created_at(&self) -> DateTime<Utc> {
        self.0.created_at
    }

    /// Projects the user collaborates on, most recently updated first.
    async fn projects(
        &self,
        ctx: &Context<'_>,
        limit: Option<i32>,
        cursor: Option<String>,
    ) -> async_graphql::Result<Collection<ProjectObject>> {
        let auth = ctx.require_auth()?;
        auth.require_scope(scopes::STREAMS_READ).gql()?;

        let state = ctx.app_state()?;
        let (limit, cursor) = page_args(limit, cursor.as_deref())?;

        let rows = db::list_user_projects(&state.db, &self.0.id, limit + 1, cursor.as_ref())
            .await
            .gql()?;
        let total = db::count_user_projects(&state.db, &self.0.id).await.gql()?;

        Ok(Page::from_rows(rows, limit, total, Project::cursor)
            .map(ProjectObject)
            .into())
    }
}

// ============================================================================
// Projects
// ============================================================================

pub struct ProjectObject(pub Project);

#[Object(name = "Project")]
impl ProjectObject {
    async fn id(&self) -> &str {
        &self.0.id
    }

    async fn name(&self) -> &str {
        &self.0.name
    }

    async fn description(&self) -> Option<&str> {
        self.0.description.as_deref()
    }

    async fn visibility(&self) -> ProjectVisibility {
        self.0.visibility().into()
    }

    async fn created_at(&self) -> DateTime<Utc> {
        self.0.created_at
    }

    async fn updated_at(&self) -> DateTime<Utc> {
        self.0.updated_at
    }

    /// The caller's role on this project, e.g. `stream:owner`.
    async fn role(&self, ctx: &Context<'_>) -> async_graphql::Result<Option<String>> {
        let state = ctx.app_state()?;
        let role = state
            .permissions
            .effective_role(ctx.auth_context(), &self.0.id)
            .await
            .gql()?;
        Ok(role.map(|r| r.as_str().to_string()))
    }

    /// Models, most recently updated first. `search` matches a name substring.
    async fn models(
        &self,
        ctx: &Context<'_>,
        limit: Option<i32>,
        cursor: Option<String>,
        search: Option<String>,
    ) -> async_graphql::Result<Collection<ModelObject>> {
        let state = ctx.app_state()?;
        let (limit, cursor) = page_args(limit, cursor.as_deref())?;
        let search = search
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty());

        let rows = db::list_models(
            &state.db,
            &self.0.id,
            search.as_deref(),
            limit + 1,
            cursor.as_ref(),
        )
        .await
        .gql()?;
        let total = db::count_models(&state.db, &self.0.id, search.as_deref())
            .await
            .gql()?;

        Ok(Page::from_rows(rows, limit, total, Model::cursor)
            .map(ModelObject)
            .into())
    }

    async fn model(&self, ctx: &Context<'_>, id: String) -> async_graphql::Result<ModelObject> {
        let state = ctx.app_state()?;
        let model = db::get_model(&state.db, &id).await.gql()?;
        if model.project_id != self.0.id {
            return Err(Error::NotFound(format!("Model {}", id))).gql();
        }
        Ok(ModelObject(model))
    }

    /// Immediate children of `parentModelName`, or the top level.
    async fn models_tree(
        &self,
        ctx: &Context<'_>,
        parent_model_name: Option<String>,
    ) -> async_graphql::Result<Vec<ModelsTreeItem>> {
        let state = ctx.app_state()?;
        let models = db::list_all_models(&state.db, &self.0.id).await.gql()?;

        Ok(model_tree::children(&models, parent_model_name.as_deref())
            .into_iter()
            .map(ModelsTreeItem)
            .collect())
    }

    /// Versions across all models, newest first.
    async fn versions(
        &self,
        ctx: &Context<'_>,
        limit: Option<i32>,
        cursor: Option<String>,
    ) -> async_graphql::Result<Collection<VersionObject>> {
        let state = ctx.app_state()?;
        let (limit, cursor) = page_args(limit, cursor.as_deref())?;

        let rows = db::list_project_versions(&state.db, &self.0.id, limit + 1, cursor.as_ref())
            .await
            .gql()?;
        let total = db::count_project_versions(&state.db, &self.0.id)
            .await
            .gql()?;

        Ok(Page::from_rows(rows, limit, total, Version::cursor)
            .map(VersionObject)
            .into())
    }

    async fn team(&self, ctx: &Context<'_>) -> async_graphql::Result<Vec<ProjectCollaborator>> {
        let state = ctx.app_state()?;
        let collaborators = db::list_collaborators(&state.db, &self.0.id).await.gql()?;

        let users = ctx
            .loader()?
            .load_many(collaborators.iter().map(|c| UserId(c.user_id.clone())))
            .await
            .gql()?;

        Ok(collaborators
            .into_iter()
            .filter_map(|c| {
                let user = users.get(&UserId(c.user_id.clone()))?.clone();
                Some(ProjectCollaborator {
                    user: LimitedUserObject(user),
                    role: c.role,
                })
            })
            .collect())
    }
}

#[derive(SimpleObject)]
pub struct ProjectCollaborator {
    pub user: LimitedUserObject,
    /// e.g. `stream:contributor`
    pub role: String,
}

// ============================================================================
// Models
// ============================================================================

pub struct ModelObject(pub Model);

#[Object(name = "Model")]
impl ModelObject {
    async fn id(&self) -> &str {
        &self.0.id
    }

    /// Full slash-separated name.
    async fn name(&self) -> &str {
        &self.0.name
    }

    /// Last segment of the name.
    async fn display_name(&self) -> &str {
        model_tree::display_name(&self.0.name)
    }

    async fn description(&self) -> Option<&str> {
        self.0.description.as_deref()
    }

    async fn created_at(&self) -> DateTime<Utc> {
        self.0.created_at
    }

    async fn updated_at(&self) -> DateTime<Utc> {
        self.0.updated_at
    }

    async fn author(&self, ctx: &Context<'_>) -> async_graphql::Result<Option<LimitedUserObject>> {
        load_user(ctx, self.0.author_id.as_deref()).await
    }

    async fn versions(
        &self,
        ctx: &Context<'_>,
        limit: Option<i32>,
        cursor: Option<String>,
    ) -> async_graphql::Result<Collection<VersionObject>> {
        let state = ctx.app_state()?;
        let (limit, cursor) = page_args(limit, cursor.as_deref())?;

        let rows = db::list_model_versions(&state.db, &self.0.id, limit + 1, cursor.as_ref())
            .await
            .gql()?;
        let total = db::count_model_versions(&state.db, &self.0.id).await.gql()?;

        Ok(Page::from_rows(rows, limit, total, Version::cursor)
            .map(VersionObject)
            .into())
    }

    async fn version(&self, ctx: &Context<'_>, id: String) -> async_graphql::Result<VersionObject> {
        let state = ctx.app_state()?;
        let version = db::get_version(&state.db, &id).await.gql()?;
        if version.model_id != self.0.id {
            return Err(Error::NotFound(format!("Version {}", id))).gql();
        }
        Ok(VersionObject(version))
    }
}

/// One level of the model tree.
pub struct ModelsTreeItem(pub TreeItem);

#[Object]
impl ModelsTreeItem {
    async fn name(&self) -> &str {
        &self.0.name
    }

    async fn full_name(&self) -> &str {
        &self.0.full_name
    }

    async fn has_children(&self) -> bool {
        self.0.has_children
    }

    /// Set when a model is named exactly `fullName`.
    async fn model(&self) -> Option<ModelObject> {
        self.0.model.clone().map(ModelObject)
    }
}

// ============================================================================
// Versions
// ============================================================================

pub struct VersionObject(pub Version);

#[Object(name = "Version")]
impl VersionObject {
    async fn id(&self) -> &str {
        &self.0.id
    }

    async fn referenced_object(&self) -> &str {
        &self.0.referenced_object
    }

    async fn message(&self) -> Option<&str> {
        self.0.message.as_deref()
    }

    async fn source_application(&self) -> Option<&str> {
        self.0.source_application.as_deref()
    }

    async fn total_children_count(&self) -> i64 {
        self.0.total_children_count
    }

    async fn parents(&self) -> Vec<String> {
        self.0.parents_vec()
    }

    async fn created_at(&self) -> DateTime<Utc> {
        self.0.created_at
    }

    async fn author_user(
        &self,
        ctx: &Context<'_>,
    ) -> async_graphql::Result<Option<LimitedUserObject>> {
        load_user(ctx, self.0.author_id.as_deref()).await
    }

    async fn model(&self, ctx: &Context<'_>) -> async_graphql::Result<Option<ModelObject>> {
        let model = ctx
            .loader()?
            .load_one(ModelId(self.0.model_id.clone()))
            .await
            .gql()?;
        Ok(model.map(ModelObject))
    }
}

// ============================================================================
// Subscription messages
// ============================================================================

#[derive(SimpleObject)]
pub struct ProjectUpdatedMessage {
    /// Project id
    pub id: String,
    #[graphql(name = "type")]
    pub kind: ProjectUpdatedMessageType,
    /// Null when deleted.
    pub project: Option<ProjectObject>,
}

#[derive(SimpleObject)]
pub struct ProjectModelsUpdatedMessage {
    /// Model id
    pub id: String,
    #[graphql(name = "type")]
    pub kind: ChangeType,
    /// Null when deleted.
    pub model: Option<ModelObject>,
}

#[derive(SimpleObject)]
pub struct ProjectVersionsUpdatedMessage {
    /// Version id
    pub id: String,
    pub model_id: String,
    #[graphql(name = "type")]
    pub kind: ChangeType,
    /// Null when deleted.
    pub version: Option<VersionObject>,
}
