//! Model database queries.
//!
//! Models are named lines of versions inside a project. Names are
//! normalized before they reach this layer.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, QueryBuilder, Sqlite};

use super::{Cursor, DbPool};

/// Model record from the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Model {
    pub id: String,
    pub project_id: String,
    pub author_id: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    pub fn cursor(&self) -> Cursor {
        Cursor::new(self.updated_at, &self.id)
    }
}

#[derive(Debug, Clone)]
pub struct CreateModel {
    pub id: String,
    pub project_id: String,
    pub author_id: Option<String>,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateModel {
    pub name: Option<String>,
    pub description: Option<String>,
}

fn map_unique(e: sqlx::Error, name: &str) -> Error {
    match e {
        sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
            Error::AlreadyExists(format!("Model '{}'", name))
        }
        _ => Error::Database(e),
    }
}

pub async fn create_model(pool: &DbPool, input: CreateModel) -> Result<Model> {
    let now = super::now();

    sqlx::query_as::<_, Model>(
        r#"
        INSERT INTO models (id, project_id, author_id, name, description, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(&input.id)
    .bind(&input.project_id)
    .bind(&input.author_id)
    .bind(&input.name)
    .bind(&input.description)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await
    .map_err(|e| map_unique(e, &input.name))
}

pub async fn get_model(pool: &DbPool, id: &str) -> Result<Model> {
    sqlx::query_as::<_, Model>("SELECT * FROM models WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Model {}", id)))
}

pub async fn find_model_by_name(
    pool: &DbPool,
    project_id: &str,
    name: &str,
) -> Result<Option<Model>> {
    let model =
        sqlx::query_as::<_, Model>("SELECT * FROM models WHERE project_id = ? AND name = ?")
            .bind(project_id)
            .bind(name)
            .fetch_optional(pool)
            .await?;
    Ok(model)
}

/// Batch lookup used by the GraphQL loaders.
pub async fn get_models_by_ids(pool: &DbPool, ids: &[String]) -> Result<Vec<Model>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM models WHERE id IN (");
    let mut separated = qb.separated(", ");
    for id in ids {
        separated.push_bind(id);
    }
    separated.push_unseparated(")");

    let models = qb.build_query_as::<Model>().fetch_all(pool).await?;
    Ok(models)
}

pub async fn update_model(pool: &DbPool, id: &str, input: UpdateModel) -> Result<Model> {
    let mut updates = Vec::new();
    let mut bindings: Vec<String> = Vec::new();

    if let Some(name) = input.name.clone() {
        updates.push("name = ?");
        bindings.push(name);
    }
    if let Some(description) = input.description {
        updates.push("description = ?");
        bindings.push(description);
    }

    if updates.is_empty() {
        return get_model(pool, id).await;
    }

    updates.push("updated_at = ?");

    let query = format!(
        "UPDATE models SET {} WHERE id = ? RETURNING *",
        updates.join(", ")
    );

    let mut q = sqlx::query_as::<_, Model>(&query);
    for binding in &bindings {
        q = q.bind(binding);
    }
    q = q.bind(super::now()).bind(id);

    q.fetch_optional(pool)
        .await
        .map_err(|e| map_unique(e, input.name.as_deref().unwrap_or_default()))?
        .ok_or_else(|| Error::NotFound(format!("Model {}", id)))
}

/// Bump `updated_at` after a version was added.
pub async fn touch_model(pool: &DbPool, id: &str) -> Result<()> {
    sqlx::query("UPDATE models SET updated_at = ? WHERE id = ?")
        .bind(super::now())
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Delete a model and its versions.
pub async fn delete_model(pool: &DbPool, id: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM models WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Models of a project, most recently updated first, optionally filtered
/// by a name substring.
pub async fn list_models(
    pool: &DbPool,
    project_id: &str,
    search: Option<&str>,
    limit: i64,
    cursor: Option<&Cursor>,
) -> Result<Vec<Model>> {
    let models = sqlx::query_as::<_, Model>(
        r#"
        SELECT * FROM models
        WHERE project_id = ?
          AND (? IS NULL OR instr(name, ?) > 0)
          AND (? IS NULL OR updated_at < ? OR (updated_at = ? AND id < ?))
        ORDER BY updated_at DESC, id DESC
        LIMIT ?
        "#,
    )
    .bind(project_id)
    .bind(search)
    .bind(search)
    .bind(cursor.map(|c| c.timestamp))
    .bind(cursor.map(|c| c.timestamp))
    .bind(cursor.map(|c| c.timestamp))
    .bind(cursor.map(|c| c.id.as_str()))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(models)
}

pub async fn count_models(pool: &DbPool, project_id: &str, search: Option<&str>) -> Result<i64> {
    let (count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM models WHERE project_id = ? AND (? IS NULL OR instr(name, ?) > 0)",
    )
    .bind(project_id)
    .bind(search)
    .bind(search)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

/// Every model of a project, ordered by name. Feeds the tree view.
pub async fn list_all_models(pool: &DbPool, project_id: &str) -> Result<Vec<Model>> {
    let models =
        sqlx::query_as::<_, Model>("SELECT * FROM models WHERE project_id = ? ORDER BY name")
            .bind(project_id)
            .fetch_all(pool)
            .await?;
    Ok(models)
}
