//! Project database queries.
//!
//! Projects are the top-level container of models. Membership and roles
//! live in `project_collaborators`.

use crate::services::permissions::ProjectRole;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, QueryBuilder, Sqlite};

use super::{Cursor, DbPool};

/// Name of the model every project starts with.
pub const DEFAULT_MODEL_NAME: &str = "main";

// ============================================================================
// Types
// ============================================================================

/// Who can read a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "public" => Some(Self::Public),
            "private" => Some(Self::Private),
            _ => None,
        }
    }
}

/// Project record from the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub visibility: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn visibility(&self) -> Visibility {
        Visibility::from_str(&self.visibility).unwrap_or(Visibility::Private)
    }

    pub fn is_public(&self) -> bool {
        self.visibility() == Visibility::Public
    }

    pub fn cursor(&self) -> Cursor {
        Cursor::new(self.updated_at, &self.id)
    }
}

/// Input for creating a new project.
#[derive(Debug, Clone)]
pub struct CreateProject {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub visibility: Visibility,
    /// Becomes the first owner.
    pub owner_id: String,
}

/// Input for updating a project.
#[derive(Debug, Clone, Default)]
pub struct UpdateProject {
    pub name: Option<String>,
    pub description: Option<String>,
    pub visibility: Option<Visibility>,
}

/// A user's membership in a project.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Collaborator {
    pub project_id: String,
    pub user_id: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Queries
// ============================================================================

/// Create a project with its owner and its default model.
pub async fn create_project(pool: &DbPool, input: CreateProject) -> Result<Project> {
    let now = super::now();
    let mut tx = pool.begin().await?;

    let project = sqlx::query_as::<_, Project>(
        r#"
        INSERT INTO projects (id, name, description, visibility, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(&input.id)
    .bind(&input.name)
    .bind(&input.description)
    .bind(input.visibility.as_str())
    .bind(now)
    .bind(now)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query(
        "INSERT INTO project_collaborators (project_id, user_id, role, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(&project.id)
    .bind(&input.owner_id)
    .bind(ProjectRole::Owner.as_str())
    .bind(now)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO models (id, project_id, author_id, name, description, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(super::new_id())
    .bind(&project.id)
    .bind(&input.owner_id)
    .bind(DEFAULT_MODEL_NAME)
    .bind("default model")
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(project)
}

/// Get a project by ID.
pub async fn get_project(pool: &DbPool, id: &str) -> Result<Project> {
    find_project(pool, id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Project {}", id)))
}

/// Get a project by ID, `None` if absent.
pub async fn find_project(pool: &DbPool, id: &str) -> Result<Option<Project>> {
    let project = sqlx::query_as::<_, Project>("SELECT * FROM projects WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(project)
}

/// Batch lookup used by the GraphQL loaders.
pub async fn get_projects_by_ids(pool: &DbPool, ids: &[String]) -> Result<Vec<Project>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM projects WHERE id IN (");
    let mut separated = qb.separated(", ");
    for id in ids {
        separated.push_bind(id);
    }
    separated.push_unseparated(")");

    let projects = qb.build_query_as::<Project>().fetch_all(pool).await?;
    Ok(projects)
}

/// Update a project.
pub async fn update_project(pool: &DbPool, id: &str, input: UpdateProject) -> Result<Project> {
    let mut updates = Vec::new();
    let mut bindings: Vec<String> = Vec::new();

    if let Some(name) = input.name {
        updates.push("name = ?");
        bindings.push(name);
    }
    if let Some(description) = input.description {
        updates.push("description = ?");
        bindings.push(description);
    }
    if let Some(visibility) = input.visibility {
        updates.push("visibility = ?");
        bindings.push(visibility.as_str().to_string());
    }

    if updates.is_empty() {
        return get_project(pool, id).await;
    }

    updates.push("updated_at = ?");

    let query = format!(
        "UPDATE projects SET {} WHERE id = ? RETURNING *",
        updates.join(", ")
    );

    let mut q = sqlx::query_as::<_, Project>(&query);
    for binding in &bindings {
        q = q.bind(binding);
    }
    q = q.bind(super::now()).bind(id);

    q.fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Project {}", id)))
}

/// Bump `updated_at`, e.g. after a model or version changed.
pub async fn touch_project(pool: &DbPool, id: &str) -> Result<()> {
    sqlx::query("UPDATE projects SET updated_at = ? WHERE id = ?")
        .bind(super::now())
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Delete a project and everything it contains.
pub async fn delete_project(pool: &DbPool, id: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM projects WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Projects a user collaborates on, most recently updated first.
///
/// Fetches up to `limit` rows after `cursor`; callers pass `limit + 1`
/// to detect a following page.
pub async fn list_user_projects(
    pool: &DbPool,
    user_id: &str,
    limit: i64,
    cursor: Option<&Cursor>,
) -> Result<Vec<Project>> {
    let projects = sqlx::query_as::<_, Project>(
        r#"
        SELECT p.* FROM projects p
        JOIN project_collaborators c ON c.project_id = p.id
        WHERE c.user_id = ?
          AND (? IS NULL OR p.updated_at < ? OR (p.updated_at = ? AND p.id < ?))
        ORDER BY p.updated_at DESC, p.id DESC
        LIMIT ?
        "#,
    )
    .bind(user_id)
    .bind(cursor.map(|c| c.timestamp))
    .bind(cursor.map(|c| c.timestamp))
    .bind(cursor.map(|c| c.timestamp))
    .bind(cursor.map(|c| c.id.as_str()))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(projects)
}

pub async fn count_user_projects(pool: &DbPool, user_id: &str) -> Result<i64> {
    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM project_collaborators WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(pool)
            .await?;
    Ok(count)
}

// ============================================================================
// Collaborators
// ============================================================================

/// A user's role on a project, if they are a collaborator.
pub async fn get_collaborator_role(
    pool: &DbPool,
    project_id: &str,
    user_id: &str,
) -> Result<Option<ProjectRole>> {
    let role: Option<String> = sqlx::query_scalar(
        "SELECT role FROM project_collaborators WHERE project_id = ? AND user_id = ?",
    )
    .bind(project_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(role.and_then(|r| ProjectRole::from_str(&r)))
}

pub async fn list_collaborators(pool: &DbPool, project_id: &str) -> Result<Vec<Collaborator>> {
    let collaborators = sqlx::query_as::<_, Collaborator>(
        "SELECT * FROM project_collaborators WHERE project_id = ? ORDER BY created_at, user_id",
    )
    .bind(project_id)
    .fetch_all(pool)
    .await?;
    Ok(collaborators)
}

/// All user ids with access to a project.
pub async fn list_collaborator_ids(pool: &DbPool, project_id: &str) -> Result<Vec<String>> {
    let ids = sqlx::query_scalar::<_, String>(
        "SELECT user_id FROM project_collaborators WHERE project_id = ?",
    )
    .bind(project_id)
    .fetch_all(pool)
    .await?;
    Ok(ids)
}

/// Grant or change a collaborator's role.
/// Outcome of [`change_collaborator_role`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleChange {
    Applied,
    /// Refused: the user is the project's only owner.
    LastOwner,
}

/// Grant, change or remove a collaborator's role.
///
/// Demoting or removing an owner is refused when no other owner remains.
/// The owner count is evaluated inside the writing statement, so concurrent
/// demotions cannot both succeed.
pub async fn change_collaborator_role(
    pool: &DbPool,
    project_id: &str,
    user_id: &str,
    role: Option<ProjectRole>,
) -> Result<RoleChange> {
    let owner = ProjectRole::Owner.as_str();

    match role {
        Some(ProjectRole::Owner) => {
            sqlx::query(
                r#"
                INSERT INTO project_collaborators (project_id, user_id, role, created_at)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(project_id, user_id) DO UPDATE SET role = excluded.role
                "#,
            )
            .bind(project_id)
            .bind(user_id)
            .bind(owner)
            .bind(super::now())
            .execute(pool)
            .await?;
            Ok(RoleChange::Applied)
        }
        Some(role) => {
            let changed = sqlx::query_as::<_, Collaborator>(
                r#"
                INSERT INTO project_collaborators (project_id, user_id, role, created_at)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(project_id, user_id) DO UPDATE SET role = excluded.role
                WHERE project_collaborators.role <> ?
                   OR (SELECT COUNT(*) FROM project_collaborators AS owners
                       WHERE owners.project_id = ? AND owners.role = ?) > 1
                RETURNING *
                "#,
            )
            .bind(project_id)
            .bind(user_id)
            .bind(role.as_str())
            .bind(super::now())
            .bind(owner)
            .bind(project_id)
            .bind(owner)
            .fetch_optional(pool)
            .await?;

            Ok(match changed {
                Some(_) => RoleChange::Applied,
                None => RoleChange::LastOwner,
            })
        }
        None => {
            let result = sqlx::query(
                r#"
                DELETE FROM project_collaborators
                WHERE project_id = ? AND user_id = ?
                  AND (role <> ?
                       OR (SELECT COUNT(*) FROM project_collaborators AS owners
                           WHERE owners.project_id = ? AND owners.role = ?) > 1)
                "#,
            )
            .bind(project_id)
            .bind(user_id)
            .bind(owner)
            .bind(project_id)
            .bind(owner)
            .execute(pool)
            .await?;

            if result.rows_affected() > 0 {
                return Ok(RoleChange::Applied);
            }
            // Nothing deleted: either not a collaborator, or the last owner.
            Ok(match get_collaborator_role(pool, project_id, user_id).await? {
                Some(ProjectRole::Owner) => RoleChange::LastOwner,
                _ => RoleChange::Applied,
            })
        }
    }
}
