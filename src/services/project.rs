//! Project service.
//!
//! Mutations on projects, their collaborators, models and versions. Every
//! operation checks the actor's role on the target project before touching
//! the database, and announces the change on the event bus afterwards.

use tracing::{debug, info};

use crate::db::{
    self, DbPool, Model, Project, UpdateModel, UpdateProject, Version, Visibility,
    DEFAULT_MODEL_NAME,
};
use crate::error::{Error, Result};
use crate::middleware::AuthContext;

use super::events::ChangeKind;
use super::model_tree::normalize_model_name;
use super::permissions::{PermissionService, ProjectRole, ServerRole};
use super::SharedEventBroadcaster;

const DEFAULT_PROJECT_NAME: &str = "Unnamed Project";

/// Fields for a new project.
#[derive(Debug, Clone, Default)]
pub struct NewProject {
    pub name: Option<String>,
    pub description: Option<String>,
    pub visibility: Option<Visibility>,
}

/// Fields for a new version.
#[derive(Debug, Clone)]
pub struct NewVersion {
    pub project_id: String,
    pub model_id: String,
    pub object_id: String,
    pub message: Option<String>,
    pub source_application: Option<String>,
    pub total_children_count: Option<i64>,
    pub parents: Vec<String>,
}

/// Service for managing projects and their contents.
#[derive(Clone)]
pub struct ProjectService {
    db: DbPool,
    permissions: PermissionService,
    events: SharedEventBroadcaster,
}

fn trimmed(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string())
}

impl ProjectService {
    pub fn new(db: DbPool, permissions: PermissionService, events: SharedEventBroadcaster) -> Self {
        Self {
            db,
            permissions,
            events,
        }
    }

    // ========================================================================
    // Projects
    // ========================================================================

    /// Create a project owned by the actor, with its default model.
    pub async fn create_project(&self, actor: &AuthContext, input: NewProject) -> Result<Project> {
        self.permissions
            .require_server_role(Some(actor), ServerRole::User)?;

        let name = trimmed(input.name)
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| DEFAULT_PROJECT_NAME.to_string());

        let project = db::create_project(
            &self.db,
            db::CreateProject {
                id: db::new_id(),
                name,
                description: trimmed(input.description),
                visibility: input.visibility.unwrap_or(Visibility::Private),
                owner_id: actor.user_id.clone(),
            },
        )
        .await?;

        info!(project_id = %project.id, user_id = %actor.user_id, "Created project");
        Ok(project)
    }

    pub async fn update_project(
        &self,
        actor: &AuthContext,
        project_id: &str,
        input: UpdateProject,
    ) -> Result<Project> {
        self.permissions
            .require_project_role(Some(actor), project_id, ProjectRole::Owner)
            .await?;

        let name = trimmed(input.name);
        if name.as_deref() == Some("") {
            return Err(Error::Validation("Project name cannot be empty".into()));
        }

        let project = db::update_project(
            &self.db,
            project_id,
            UpdateProject {
                name,
                description: trimmed(input.description),
                visibility: input.visibility,
            },
        )
        .await?;

        self.events.project_updated(&project);
        Ok(project)
    }

    /// Delete a project. Former members are carried on the event so their
    /// subscriptions still receive the deletion.
    pub async fn delete_project(&self, actor: &AuthContext, project_id: &str) -> Result<()> {
        self.permissions
            .require_project_role(Some(actor), project_id, ProjectRole::Owner)
            .await?;

        let project = db::get_project(&self.db, project_id).await?;
        let member_ids = db::list_collaborator_ids(&self.db, project_id).await?;

        db::delete_project(&self.db, project_id).await?;
        info!(project_id = %project_id, user_id = %actor.user_id, "Deleted project");

        self.events.project_deleted(&project, member_ids);
        Ok(())
    }

    /// Grant, change or (with `None`) revoke a collaborator's role.
    ///
    /// The last owner can be neither demoted nor removed.
    pub async fn update_role(
        &self,
        actor: &AuthContext,
        project_id: &str,
        user_id: &str,
        role: Option<ProjectRole>,
    ) -> Result<Project> {
        self.permissions
            .require_project_role(Some(actor), project_id, ProjectRole::Owner)
            .await?;

        db::get_user(&self.db, user_id).await?;

        let change = db::change_collaborator_role(&self.db, project_id, user_id, role).await?;
        if change == db::RoleChange::LastOwner {
            return Err(Error::Validation(
                "A project must keep at least one owner".into(),
            ));
        }

        debug!(
            project_id = %project_id,
            user_id = %user_id,
            role = role.map(|r| r.as_str()).unwrap_or("none"),
            "Collaborator role changed"
        );

        db::touch_project(&self.db, project_id).await?;
        let project = db::get_project(&self.db, project_id).await?;
        self.events.project_updated(&project);
        Ok(project)
    }

    // ========================================================================
    // Models
    // ========================================================================

    pub async fn create_model(
        &self,
        actor: &AuthContext,
        project_id: &str,
        name: &str,
        description: Option<String>,
    ) -> Result<Model> {
        self.permissions
            .require_project_role(Some(actor), project_id, ProjectRole::Contributor)
            .await?;

        let model = db::create_model(
            &self.db,
            db::CreateModel {
                id: db::new_id(),
                project_id: project_id.to_string(),
                author_id: Some(actor.user_id.clone()),
                name: normalize_model_name(name)?,
                description: trimmed(description),
            },
        )
        .await?;

        db::touch_project(&self.db, project_id).await?;
        self.events.model_changed(ChangeKind::Created, &model);
        Ok(model)
    }

    /// Rename or re-describe a model. The default model keeps its name.
    pub async fn update_model(
        &self,
        actor: &AuthContext,
        project_id: &str,
        model_id: &str,
        input: UpdateModel,
    ) -> Result<Model> {
        self.permissions
            .require_project_role(Some(actor), project_id, ProjectRole::Contributor)
            .await?;

        let existing = self.model_in_project(project_id, model_id).await?;

        let name = input.name.as_deref().map(normalize_model_name).transpose()?;
        if existing.name == DEFAULT_MODEL_NAME && name.as_deref().is_some_and(|n| n != DEFAULT_MODEL_NAME) {
            return Err(Error::Validation(format!(
                "The '{}' model cannot be renamed",
                DEFAULT_MODEL_NAME
            )));
        }

        let model = db::update_model(
            &self.db,
            model_id,
            UpdateModel {
                name,
                description: trimmed(input.description),
            },
        )
        .await?;

        self.events.model_changed(ChangeKind::Updated, &model);
        Ok(model)
    }

    /// Delete a model and its versions. The default model cannot be deleted.
    pub async fn delete_model(&self, actor: &AuthContext, project_id: &str, model_id: &str) -> Result<()> {
        self.permissions
            .require_project_role(Some(actor), project_id, ProjectRole::Contributor)
            .await?;

        let model = self.model_in_project(project_id, model_id).await?;
        if model.name == DEFAULT_MODEL_NAME {
            return Err(Error::Validation(format!(
                "The '{}' model cannot be deleted",
                DEFAULT_MODEL_NAME
            )));
        }

        db::delete_model(&self.db, model_id).await?;
        db::touch_project(&self.db, project_id).await?;

        info!(project_id = %project_id, model_id = %model_id, "Deleted model");
        self.events.model_changed(ChangeKind::Deleted, &model);
        Ok(())
    }

    async fn model_in_project(&self, project_id: &str, model_id: &str) -> Result<Model> {
        let model = db::get_model(&self.db, model_id).await?;
        if model.project_id != project_id {
            return Err(Error::NotFound(format!("Model {}", model_id)));
        }
        Ok(model)
    }

    // ========================================================================
    // Versions
    // ========================================================================

    pub async fn create_version(&self, actor: &AuthContext, input: NewVersion) -> Result<Version> {
        self.permissions
            .require_project_role(Some(actor), &input.project_id, ProjectRole::Contributor)
            .await?;

        let object_id = input.object_id.trim();
        if object_id.is_empty() {
            return Err(Error::Validation("Object id is required".into()));
        }

        let model = self.model_in_project(&input.project_id, &input.model_id).await?;

        let version = db::create_version(
            &self.db,
            db::CreateVersion {
                id: db::new_id(),
                model_id: model.id.clone(),
                project_id: input.project_id.clone(),
                author_id: Some(actor.user_id.clone()),
                referenced_object: object_id.to_string(),
                message: trimmed(input.message),
                source_application: trimmed(input.source_application),
                total_children_count: input.total_children_count.unwrap_or(0).max(0),
                parents: input.parents,
            },
        )
        .await?;

        info!(
            project_id = %version.project_id,
            model_id = %version.model_id,
            version_id = %version.id,
            "Created version"
        );
        self.events.version_changed(ChangeKind::Created, &version);
        Ok(version)
    }

    pub async fn update_version(
        &self,
        actor: &AuthContext,
        project_id: &str,
        version_id: &str,
        message: &str,
    ) -> Result<Version> {
        self.require_version_edit(actor, project_id, version_id).await?;

        let version = db::update_version_message(&self.db, version_id, message.trim()).await?;
        self.events.version_changed(ChangeKind::Updated, &version);
        Ok(version)
    }

    pub async fn delete_version(
        &self,
        actor: &AuthContext,
        project_id: &str,
        version_id: &str,
    ) -> Result<()> {
        let version = self.require_version_edit(actor, project_id, version_id).await?;

        db::delete_version(&self.db, version_id).await?;
        db::touch_project(&self.db, project_id).await?;

        self.events.version_changed(ChangeKind::Deleted, &version);
        Ok(())
    }

    /// Authors with at least contributor access, and owners, may edit.
    async fn require_version_edit(
        &self,
        actor: &AuthContext,
        project_id: &str,
        version_id: &str,
    ) -> Result<Version> {
        let version = db::get_version(&self.db, version_id).await?;
        if version.project_id != project_id {
            return Err(Error::NotFound(format!("Version {}", version_id)));
        }

        let is_author = version.author_id.as_deref() == Some(actor.user_id.as_str());
        let min = if is_author {
            ProjectRole::Contributor
        } else {
            ProjectRole::Owner
        };
        self.permissions
            .require_project_role(Some(actor), project_id, min)
            .await?;

        Ok(version)
    }
}
