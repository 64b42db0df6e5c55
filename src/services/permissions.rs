//! Permission service for centralized access control.
//!
//! Handles checking if users may act on projects based on:
//! - Project collaborator role (owner > contributor > reviewer)
//! - Project visibility (public projects are readable by anyone)
//! - Server admin role (bypass all project checks)

use tracing::debug;

use crate::db::{self, DbPool, Project};
use crate::error::{Error, Result};
use crate::middleware::AuthContext;

/// Token scope names.
pub mod scopes {
    pub const PROFILE_READ: &str = "profile:read";
    pub const PROFILE_EMAIL: &str = "profile:email";
    pub const STREAMS_READ: &str = "streams:read";
    pub const STREAMS_WRITE: &str = "streams:write";
    pub const TOKENS_WRITE: &str = "tokens:write";
    pub const APPS_WRITE: &str = "apps:write";

    pub const ALL: &[&str] = &[
        PROFILE_READ,
        PROFILE_EMAIL,
        STREAMS_READ,
        STREAMS_WRITE,
        TOKENS_WRITE,
        APPS_WRITE,
    ];

    pub fn is_known(scope: &str) -> bool {
        ALL.contains(&scope)
    }
}

/// Server-wide role of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerRole {
    Admin,
    User,
    Guest,
}

impl ServerRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "server:admin",
            Self::User => "server:user",
            Self::Guest => "server:guest",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "server:admin" => Some(Self::Admin),
            "server:user" => Some(Self::User),
            "server:guest" => Some(Self::Guest),
            _ => None,
        }
    }

    fn weight(&self) -> u8 {
        match self {
            Self::Admin => 3,
            Self::User => 2,
            Self::Guest => 1,
        }
    }

    /// Check if this role is greater than or equal to another.
    pub fn is_at_least(&self, other: ServerRole) -> bool {
        self.weight() >= other.weight()
    }
}

/// Collaborator role on a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectRole {
    Owner,
    Contributor,
    Reviewer,
}

impl ProjectRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Owner => "stream:owner",
            Self::Contributor => "stream:contributor",
            Self::Reviewer => "stream:reviewer",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "stream:owner" => Some(Self::Owner),
            "stream:contributor" => Some(Self::Contributor),
            "stream:reviewer" => Some(Self::Reviewer),
            _ => None,
        }
    }

    fn weight(&self) -> u8 {
        match self {
            Self::Owner => 3,
            Self::Contributor => 2,
            Self::Reviewer => 1,
        }
    }

    /// Check if this role is greater than or equal to another.
    pub fn is_at_least(&self, other: ProjectRole) -> bool {
        self.weight() >= other.weight()
    }
}

/// Service for checking permissions.
#[derive(Clone)]
pub struct PermissionService {
    db: DbPool,
}

impl PermissionService {
    /// Create a new permission service.
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    /// The caller's collaborator role. Admins act as owners everywhere.
    pub async fn effective_role(
        &self,
        auth: Option<&AuthContext>,
        project_id: &str,
    ) -> Result<Option<ProjectRole>> {
        let Some(auth) = auth else {
            return Ok(None);
        };

        if auth.is_admin() {
            debug!(user_id = %auth.user_id, project_id = %project_id, "Admin bypass");
            return Ok(Some(ProjectRole::Owner));
        }

        db::get_collaborator_role(&self.db, project_id, &auth.user_id).await
    }

    /// Check if the caller can read a project.
    ///
    /// Public projects are readable anonymously. Private projects need a
    /// collaborator role and a token carrying `streams:read`.
    pub async fn can_read_project(
        &self,
        project: &Project,
        auth: Option<&AuthContext>,
    ) -> Result<bool> {
        if project.is_public() {
            return Ok(true);
        }

        let Some(ctx) = auth else {
            return Ok(false);
        };
        if !ctx.has_scope(scopes::STREAMS_READ) {
            return Ok(false);
        }

        let role = self.effective_role(auth, &project.id).await?;

        debug!(
            user_id = %ctx.user_id,
            project_id = %project.id,
            can_read = role.is_some(),
            "Checked read access"
        );

        Ok(role.is_some())
    }

    /// Fail with `Forbidden` unless the caller can read the project.
    pub async fn require_read(&self, project: &Project, auth: Option<&AuthContext>) -> Result<()> {
        if self.can_read_project(project, auth).await? {
            Ok(())
        } else {
            Err(Error::Forbidden)
        }
    }

    /// Fail with `Forbidden` unless the caller holds at least `min` on the project.
    pub async fn require_project_role(
        &self,
        auth: Option<&AuthContext>,
        project_id: &str,
        min: ProjectRole,
    ) -> Result<ProjectRole> {
        let role = self.effective_role(auth, project_id).await?;

        match role {
            Some(role) if role.is_at_least(min) => Ok(role),
            _ => {
                debug!(project_id = %project_id, required = min.as_str(), "Project role check failed");
                Err(Error::Forbidden)
            }
        }
    }

    /// Fail with `Forbidden` unless the caller holds at least `min` server-wide.
    pub fn require_server_role<'a>(
        &self,
        auth: Option<&'a AuthContext>,
        min: ServerRole,
    ) -> Result<&'a AuthContext> {
        match auth {
            Some(ctx) if ctx.server_role.is_at_least(min) => Ok(ctx),
            _ => Err(Error::Forbidden),
        }
    }
}
