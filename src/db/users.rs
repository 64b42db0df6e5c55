//! User database queries.

use crate::services::permissions::ServerRole;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, QueryBuilder, Sqlite};

use super::DbPool;

// ============================================================================
// User Types
// ============================================================================

/// User record from the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub company: Option<String>,
    pub bio: Option<String>,
    pub avatar: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub role: String,
    pub verified: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn server_role(&self) -> ServerRole {
        ServerRole::from_str(&self.role).unwrap_or(ServerRole::Guest)
    }
}

/// Input for creating a new user.
#[derive(Debug, Clone)]
pub struct CreateUser {
    pub id: String,
    pub email: String,
    pub name: String,
    pub company: Option<String>,
    pub password_hash: Option<String>,
    pub role: ServerRole,
}

// ============================================================================
// User Queries
// ============================================================================

/// Create a new user. Emails are stored lower-cased.
pub async fn create_user(pool: &DbPool, input: CreateUser) -> Result<User> {
    let email = input.email.trim().to_lowercase();

    sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (id, email, name, company, password_hash, role, verified, created_at)
        VALUES (?, ?, ?, ?, ?, ?, 0, ?)
        RETURNING *
        "#,
    )
    .bind(&input.id)
    .bind(&email)
    .bind(&input.name)
    .bind(&input.company)
    .bind(&input.password_hash)
    .bind(input.role.as_str())
    .bind(super::now())
    .fetch_one(pool)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
            Error::AlreadyExists(format!("User with email {}", email))
        }
        _ => Error::Database(e),
    })
}

/// Get a user by ID.
pub async fn get_user(pool: &DbPool, id: &str) -> Result<User> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("User {}", id)))
}

/// Get a user by email (case-insensitive).
pub async fn get_user_by_email(pool: &DbPool, email: &str) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
        .bind(email.trim().to_lowercase())
        .fetch_optional(pool)
        .await?;
    Ok(user)
}

/// Batch lookup used by the GraphQL loaders.
pub async fn get_users_by_ids(pool: &DbPool, ids: &[String]) -> Result<Vec<User>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM users WHERE id IN (");
    let mut separated = qb.separated(", ");
    for id in ids {
        separated.push_bind(id);
    }
    separated.push_unseparated(")");

    let users = qb.build_query_as::<User>().fetch_all(pool).await?;
    Ok(users)
}

/// Count all registered users.
pub async fn count_users(pool: &DbPool) -> Result<i64> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await?;
    Ok(count)
}
