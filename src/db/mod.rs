//! Database layer for modelhub.
//!
//! Provides SQLite connection pooling and query modules
//! for all domain entities.

mod apps;
mod models;
mod pagination;
mod pool;
mod projects;
mod tokens;
mod users;
mod versions;

pub use apps::*;
pub use models::*;
pub use pagination::*;
pub use pool::*;
pub use projects::*;
pub use tokens::*;
pub use users::*;
pub use versions::*;

use crate::Result;
use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

/// Type alias for the SQLite connection pool.
pub type DbPool = sqlx::SqlitePool;

/// Generate a new entity id.
pub fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Current UTC timestamp.
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Initialize the database connection pool.
///
/// `:memory:` gets a single long-lived connection so the database
/// survives for the lifetime of the pool.
pub async fn init_pool(path: &str) -> Result<DbPool> {
    let config = if is_in_memory(path) {
        PoolConfig::in_memory()
    } else {
        PoolConfig::default()
    };

    let pool = create_pool_with_config(path, config).await?;

    info!("Database pool initialized: {}", path);

    Ok(pool)
}

fn is_in_memory(path: &str) -> bool {
    path == ":memory:" || path == "sqlite::memory:"
}

/// Initialize the database schema.
///
/// Applies the complete schema from schema.sql. Uses IF NOT EXISTS
/// clauses so it's safe to run multiple times.
pub async fn initialize_schema(pool: &DbPool) -> Result<()> {
    let schema = include_str!("../../schema.sql");

    info!("Initializing database schema");

    for statement in schema_statements(schema) {
        sqlx::query(&statement).execute(pool).await?;
    }

    info!("Database schema initialized successfully");

    Ok(())
}

/// Split a schema script into statements.
///
/// `--` comments are removed before splitting on `;`, so a semicolon in a
/// comment never ends a statement.
fn schema_statements(schema: &str) -> Vec<String> {
    let without_comments: String = schema
        .lines()
        .map(|line| line.split_once("--").map_or(line, |(code, _)| code))
        .collect::<Vec<_>>()
        .join("\n");

    without_comments
        .split(';')
        .map(str::trim)
        .filter(|stmt| !stmt.is_empty())
        .map(str::to_string)
        .collect()
}

/// Open an in-memory database with the schema applied.
pub async fn init_test_pool() -> Result<DbPool> {
    let pool = init_pool(":memory:").await?;
    initialize_schema(&pool).await?;
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_init_pool_in_memory() {
        let pool = init_pool(":memory:").await.unwrap();
        assert!(pool.size() > 0);
    }

    #[tokio::test]
    async fn test_schema_initialization_is_idempotent() {
        let pool = init_test_pool().await.unwrap();
        initialize_schema(&pool).await.unwrap();

        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();

        let table_names: Vec<&str> = tables.iter().map(|(n,)| n.as_str()).collect();

        for expected in [
            "users",
            "apps",
            "access_codes",
            "api_tokens",
            "refresh_tokens",
            "projects",
            "project_collaborators",
            "models",
            "versions",
        ] {
            assert!(table_names.contains(&expected), "{} table missing", expected);
        }
    }

    #[test]
    fn test_schema_statements_ignore_comment_semicolons() {
        let script = "-- header; with a semicolon\n\
                      CREATE TABLE a (id TEXT); -- trailing; note\n\
                      \n\
                      -- only a comment;\n\
                      CREATE TABLE b (\n    id TEXT -- inline; remark\n);\n";

        let statements = schema_statements(script);

        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0], "CREATE TABLE a (id TEXT)");
        assert!(statements[1].starts_with("CREATE TABLE b ("));
        assert!(!statements.iter().any(|s| s.contains("--") || s.contains("semicolon")));
    }

    #[test]
    fn test_bundled_schema_splits_into_sql_only() {
        let statements = schema_statements(include_str!("../../schema.sql"));
        assert!(!statements.is_empty());
        for statement in &statements {
            assert!(
                statement.starts_with("CREATE") || statement.starts_with("PRAGMA"),
                "unexpected statement: {}",
                statement
            );
        }
    }

    #[test]
    fn test_new_id_is_unique() {
        assert_ne!(new_id(), new_id());
        assert_eq!(new_id().len(), 32);
    }
}
