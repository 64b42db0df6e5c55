//! Version database queries.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::{Cursor, DbPool};

/// Version record from the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Version {
    pub id: String,
    pub model_id: String,
    pub project_id: String,
    pub author_id: Option<String>,
    pub referenced_object: String,
    pub message: Option<String>,
    pub source_application: Option<String>,
    pub total_children_count: i64,
    /// JSON array of parent version ids.
    pub parents: String,
    pub created_at: DateTime<Utc>,
}

impl Version {
    pub fn parents_vec(&self) -> Vec<String> {
        serde_json::from_str(&self.parents).unwrap_or_default()
    }

    pub fn cursor(&self) -> Cursor {
        Cursor::new(self.created_at, &self.id)
    }
}

#[derive(Debug, Clone)]
pub struct CreateVersion {
    pub id: String,
    pub model_id: String,
    pub project_id: String,
    pub author_id: Option<String>,
    pub referenced_object: String,
    pub message: Option<String>,
    pub source_application: Option<String>,
    pub total_children_count: i64,
    pub parents: Vec<String>,
}

/// Insert a version and bump its model and project.
pub async fn create_version(pool: &DbPool, input: CreateVersion) -> Result<Version> {
    let parents = serde_json::to_string(&input.parents)?;

    let version = sqlx::query_as::<_, Version>(
        r#"
        INSERT INTO versions (id, model_id, project_id, author_id, referenced_object, message,
                              source_application, total_children_count, parents, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(&input.id)
    .bind(&input.model_id)
    .bind(&input.project_id)
    .bind(&input.author_id)
    .bind(&input.referenced_object)
    .bind(&input.message)
    .bind(&input.source_application)
    .bind(input.total_children_count)
    .bind(&parents)
    .bind(super::now())
    .fetch_one(pool)
    .await?;

    super::touch_model(pool, &version.model_id).await?;
    super::touch_project(pool, &version.project_id).await?;

    Ok(version)
}

pub async fn get_version(pool: &DbPool, id: &str) -> Result<Version> {
    sqlx::query_as::<_, Version>("SELECT * FROM versions WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Version {}", id)))
}

/// Change a version's message.
pub async fn update_version_message(pool: &DbPool, id: &str, message: &str) -> Result<Version> {
    sqlx::query_as::<_, Version>("UPDATE versions SET message = ? WHERE id = ? RETURNING *")
        .bind(message)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Version {}", id)))
}

pub async fn delete_version(pool: &DbPool, id: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM versions WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Versions of one model, newest first.
pub async fn list_model_versions(
    pool: &DbPool,
    model_id: &str,
    limit: i64,
    cursor: Option<&Cursor>,
) -> Result<Vec<Version>> {
    let versions = sqlx::query_as::<_, Version>(
        r#"
        SELECT * FROM versions
        WHERE model_id = ?
          AND (? IS NULL OR created_at < ? OR (created_at = ? AND id < ?))
        ORDER BY created_at DESC, id DESC
        LIMIT ?
        "#,
    )
    .bind(model_id)
    .bind(cursor.map(|c| c.timestamp))
    .bind(cursor.map(|c| c.timestamp))
    .bind(cursor.map(|c| c.timestamp))
    .bind(cursor.map(|c| c.id.as_str()))
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(versions)
}

pub async fn count_model_versions(pool: &DbPool, model_id: &str) -> Result<i64> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM versions WHERE model_id = ?")
        .bind(model_id)
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Versions across all models of a project, newest first.
pub async fn list_project_versions(
    pool: &DbPool,
    project_id: &str,
    limit: i64,
    cursor: Option<&Cursor>,
) -> Result<Vec<Version>> {
    let versions = sqlx::query_as::<_, Version>(
        r#"
        SELECT * FROM versions
        WHERE project_id = ?
          AND (? IS NULL OR created_at < ? OR (created_at = ? AND id < ?))
        ORDER BY created_at DESC, id DESC
        LIMIT ?
        "#,
    )
    .bind(project_id)
    .bind(cursor.map(|c| c.timestamp))
    .bind(cursor.map(|c| c.timestamp))
    .bind(cursor.map(|c| c.timestamp))
    .bind(cursor.map(|c| c.id.as_str()))
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(versions)
}

pub async fn count_project_versions(pool: &DbPool, project_id: &str) -> Result<i64> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM versions WHERE project_id = ?")
        .bind(project_id)
        .fetch_one(pool)
        .await?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{
        create_project, create_user, find_model_by_name, get_model, init_test_pool, new_id,
        CreateProject, CreateUser, Page, Visibility,
    };
    use crate::services::permissions::ServerRole;

    async fn main_model(pool: &DbPool) -> (String, String) {
        let owner = create_user(
            pool,
            CreateUser {
                id: new_id(),
                email: "o@example.com".into(),
                name: "Owner".into(),
                company: None,
                password_hash: None,
                role: ServerRole::User,
            },
        )
        .await
        .unwrap();

        let project = create_project(
            pool,
            CreateProject {
                id: new_id(),
                name: "P".into(),
                description: None,
                visibility: Visibility::Private,
                owner_id: owner.id,
            },
        )
        .await
        .unwrap();

        let model = find_model_by_name(pool, &project.id, "main")
            .await
            .unwrap()
            .unwrap();
        (project.id, model.id)
    }

    fn input(project_id: &str, model_id: &str, object: &str) -> CreateVersion {
        CreateVersion {
            id: new_id(),
            model_id: model_id.into(),
            project_id: project_id.into(),
            author_id: None,
            referenced_object: object.into(),
            message: Some("initial".into()),
            source_application: Some("test".into()),
            total_children_count: 3,
            parents: vec![],
        }
    }

    #[tokio::test]
    async fn test_create_version_touches_model() {
        let pool = init_test_pool().await.unwrap();
        let (project_id, model_id) = main_model(&pool).await;
        let before = get_model(&pool, &model_id).await.unwrap().updated_at;

        let version = create_version(&pool, input(&project_id, &model_id, "obj1"))
            .await
            .unwrap();
        assert!(version.parents_vec().is_empty());

        let after = get_model(&pool, &model_id).await.unwrap().updated_at;
        assert!(after >= before);

        let updated = update_version_message(&pool, &version.id, "renamed")
            .await
            .unwrap();
        assert_eq!(updated.message.as_deref(), Some("renamed"));
    }

    #[tokio::test]
    async fn test_model_versions_paginate_without_overlap() {
        let pool = init_test_pool().await.unwrap();
        let (project_id, model_id) = main_model(&pool).await;
        for i in 0..7 {
            create_version(&pool, input(&project_id, &model_id, &format!("obj{}", i)))
                .await
                .unwrap();
        }

        let total = count_model_versions(&pool, &model_id).await.unwrap();
        assert_eq!(total, 7);
        assert_eq!(count_project_versions(&pool, &project_id).await.unwrap(), 7);

        let mut seen = Vec::new();
        let mut cursor: Option<Cursor> = None;
        loop {
            let rows = list_model_versions(&pool, &model_id, 4, cursor.as_ref())
                .await
                .unwrap();
            let page = Page::from_rows(rows, 3, total, Version::cursor);
            seen.extend(page.items.into_iter().map(|v| v.id));
            match page.cursor {
                Some(c) => cursor = Some(Cursor::decode(&c).unwrap()),
                None => break,
            }
        }

        let mut unique = seen.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(seen.len(), 7);
        assert_eq!(unique.len(), 7);
    }
}
