//! Registered application (auth client) queries.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::DbPool;

// ============================================================================
// Types
// ============================================================================

/// App record from the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct App {
    pub id: String,
    #[serde(skip_serializing)]
    pub secret: String,
    pub name: String,
    pub description: Option<String>,
    pub redirect_url: String,
    pub trusted: bool,
    pub public: bool,
    pub author_id: Option<String>,
    /// JSON array of scope names.
    pub scopes: String,
    pub created_at: DateTime<Utc>,
}

impl App {
    pub fn scopes_vec(&self) -> Vec<String> {
        serde_json::from_str(&self.scopes).unwrap_or_default()
    }
}

/// Input for registering an app.
#[derive(Debug, Clone)]
pub struct CreateApp {
    pub id: String,
    pub secret: String,
    pub name: String,
    pub description: Option<String>,
    pub redirect_url: String,
    pub trusted: bool,
    pub public: bool,
    pub author_id: Option<String>,
    pub scopes: Vec<String>,
}

// ============================================================================
// Queries
// ============================================================================

/// Register a new app.
pub async fn create_app(pool: &DbPool, input: CreateApp) -> Result<App> {
    let scopes = serde_json::to_string(&input.scopes)?;

    sqlx::query_as::<_, App>(
        r#"
        INSERT INTO apps (id, secret, name, description, redirect_url, trusted, public, author_id, scopes, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(&input.id)
    .bind(&input.secret)
    .bind(&input.name)
    .bind(&input.description)
    .bind(&input.redirect_url)
    .bind(input.trusted)
    .bind(input.public)
    .bind(&input.author_id)
    .bind(&scopes)
    .bind(super::now())
    .fetch_one(pool)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
            Error::AlreadyExists(format!("App {}", input.id))
        }
        _ => Error::Database(e),
    })
}

/// Insert or refresh an app whose definition comes from configuration.
pub async fn upsert_app(pool: &DbPool, input: CreateApp) -> Result<App> {
    let scopes = serde_json::to_string(&input.scopes)?;

    let app = sqlx::query_as::<_, App>(
        r#"
        INSERT INTO apps (id, secret, name, description, redirect_url, trusted, public, author_id, scopes, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            secret = excluded.secret,
            name = excluded.name,
            redirect_url = excluded.redirect_url,
            trusted = excluded.trusted,
            public = excluded.public,
            scopes = excluded.scopes
        RETURNING *
        "#,
    )
    .bind(&input.id)
    .bind(&input.secret)
    .bind(&input.name)
    .bind(&input.description)
    .bind(&input.redirect_url)
    .bind(input.trusted)
    .bind(input.public)
    .bind(&input.author_id)
    .bind(&scopes)
    .bind(super::now())
    .fetch_one(pool)
    .await?;

    Ok(app)
}

/// Get an app by ID.
pub async fn get_app(pool: &DbPool, id: &str) -> Result<Option<App>> {
    let app = sqlx::query_as::<_, App>("SELECT * FROM apps WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(app)
}
