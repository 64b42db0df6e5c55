//! Access code, API token and refresh token queries.
//!
//! Token and refresh-token secrets never reach this layer in clear text;
//! callers pass the SHA-256 hex digest.

use crate::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::DbPool;

/// A lifespan that cannot be represented counts as already expired.
fn expired(created_at: DateTime<Utc>, lifespan_secs: i64, now: DateTime<Utc>) -> bool {
    Duration::try_seconds(lifespan_secs)
        .and_then(|lifespan| created_at.checked_add_signed(lifespan))
        .map_or(true, |expires_at| expires_at <= now)
}

/// SQL predicate matching rows whose `created_at + lifespan_secs` is at or
/// before the bound timestamp.
const EXPIRED_AT: &str =
    "CAST(strftime('%s', created_at) AS INTEGER) + lifespan_secs <= CAST(strftime('%s', ?) AS INTEGER)";

// ============================================================================
// Access Codes
// ============================================================================

/// Short-lived code handed to an app after a successful login.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AccessCode {
    pub id: String,
    pub app_id: String,
    pub user_id: String,
    pub challenge: String,
    pub lifespan_secs: i64,
    pub created_at: DateTime<Utc>,
}

impl AccessCode {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        expired(self.created_at, self.lifespan_secs, now)
    }
}

#[derive(Debug, Clone)]
pub struct CreateAccessCode {
    pub id: String,
    pub app_id: String,
    pub user_id: String,
    pub challenge: String,
    pub lifespan_secs: i64,
}

pub async fn create_access_code(pool: &DbPool, input: CreateAccessCode) -> Result<AccessCode> {
    let code = sqlx::query_as::<_, AccessCode>(
        r#"
        INSERT INTO access_codes (id, app_id, user_id, challenge, lifespan_secs, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(&input.id)
    .bind(&input.app_id)
    .bind(&input.user_id)
    .bind(&input.challenge)
    .bind(input.lifespan_secs)
    .bind(super::now())
    .fetch_one(pool)
    .await?;

    Ok(code)
}

pub async fn get_access_code(pool: &DbPool, id: &str) -> Result<Option<AccessCode>> {
    let code = sqlx::query_as::<_, AccessCode>("SELECT * FROM access_codes WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(code)
}

/// Delete a code. Returns `false` when it was already gone, which makes
/// concurrent redemptions of the same code lose the race.
pub async fn consume_access_code(pool: &DbPool, id: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM access_codes WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() == 1)
}

/// Remove access codes whose lifespan has elapsed by `now`.
pub async fn delete_expired_access_codes(pool: &DbPool, now: DateTime<Utc>) -> Result<u64> {
    let result = sqlx::query(&format!("DELETE FROM access_codes WHERE {}", EXPIRED_AT))
        .bind(now)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

// ============================================================================
// API Tokens
// ============================================================================

/// Bearer token record. Personal tokens have no `app_id`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ApiToken {
    pub id: String,
    #[serde(skip_serializing)]
    pub token_hash: String,
    pub owner_id: String,
    pub app_id: Option<String>,
    pub name: String,
    /// JSON array of scope names.
    pub scopes: String,
    pub lifespan_secs: i64,
    pub created_at: DateTime<Utc>,
    pub last_used: Option<DateTime<Utc>>,
}

impl ApiToken {
    pub fn scopes_vec(&self) -> Vec<String> {
        serde_json::from_str(&self.scopes).unwrap_or_default()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        expired(self.created_at, self.lifespan_secs, now)
    }
}

#[derive(Debug, Clone)]
pub struct CreateApiToken {
    pub id: String,
    pub token_hash: String,
    pub owner_id: String,
    pub app_id: Option<String>,
    pub name: String,
    pub scopes: Vec<String>,
    pub lifespan_secs: i64,
}

const INSERT_API_TOKEN: &str = r#"
    INSERT INTO api_tokens (id, token_hash, owner_id, app_id, name, scopes, lifespan_secs, created_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?)
    RETURNING *
"#;

pub async fn create_api_token(pool: &DbPool, input: CreateApiToken) -> Result<ApiToken> {
    let scopes = serde_json::to_string(&input.scopes)?;

    let token = sqlx::query_as::<_, ApiToken>(INSERT_API_TOKEN)
        .bind(&input.id)
        .bind(&input.token_hash)
        .bind(&input.owner_id)
        .bind(&input.app_id)
        .bind(&input.name)
        .bind(&scopes)
        .bind(input.lifespan_secs)
        .bind(super::now())
        .fetch_one(pool)
        .await?;

    Ok(token)
}

pub async fn get_api_token(pool: &DbPool, id: &str) -> Result<Option<ApiToken>> {
    let token = sqlx::query_as::<_, ApiToken>("SELECT * FROM api_tokens WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(token)
}

/// Record that a token was just used.
pub async fn touch_api_token(pool: &DbPool, id: &str) -> Result<()> {
    sqlx::query("UPDATE api_tokens SET last_used = ? WHERE id = ?")
        .bind(super::now())
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Delete a token. Its refresh token, if any, goes with it.
pub async fn delete_api_token(pool: &DbPool, id: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM api_tokens WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

// ============================================================================
// Refresh Tokens
// ============================================================================

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct RefreshToken {
    pub id: String,
    #[serde(skip_serializing)]
    pub token_hash: String,
    pub token_id: String,
    pub app_id: String,
    pub user_id: String,
    pub lifespan_secs: i64,
    pub created_at: DateTime<Utc>,
}

impl RefreshToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        expired(self.created_at, self.lifespan_secs, now)
    }
}

#[derive(Debug, Clone)]
pub struct CreateRefreshToken {
    pub id: String,
    pub token_hash: String,
    pub lifespan_secs: i64,
}

/// Insert an app token together with its refresh token.
///
/// The refresh token inherits the owner and app of the access token.
pub async fn create_token_pair(
    pool: &DbPool,
    token: CreateApiToken,
    refresh: CreateRefreshToken,
) -> Result<(ApiToken, RefreshToken)> {
    let app_id = token
        .app_id
        .clone()
        .ok_or_else(|| crate::Error::Internal("token pair requires an app".to_string()))?;
    let scopes = serde_json::to_string(&token.scopes)?;
    let created_at = super::now();

    let mut tx = pool.begin().await?;

    let api_token = sqlx::query_as::<_, ApiToken>(INSERT_API_TOKEN)
        .bind(&token.id)
        .bind(&token.token_hash)
        .bind(&token.owner_id)
        .bind(&token.app_id)
        .bind(&token.name)
        .bind(&scopes)
        .bind(token.lifespan_secs)
        .bind(created_at)
        .fetch_one(&mut *tx)
        .await?;

    let refresh_token = sqlx::query_as::<_, RefreshToken>(
        r#"
        INSERT INTO refresh_tokens (id, token_hash, token_id, app_id, user_id, lifespan_secs, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(&refresh.id)
    .bind(&refresh.token_hash)
    .bind(&api_token.id)
    .bind(&app_id)
    .bind(&token.owner_id)
    .bind(refresh.lifespan_secs)
    .bind(created_at)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok((api_token, refresh_token))
}

pub async fn get_refresh_token(pool: &DbPool, id: &str) -> Result<Option<RefreshToken>> {
    let token = sqlx::query_as::<_, RefreshToken>("SELECT * FROM refresh_tokens WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(token)
}

pub async fn delete_refresh_token(pool: &DbPool, id: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM refresh_tokens WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Remove expired refresh tokens, then expired access tokens that no
/// longer have a refresh token to rotate them.
///
/// Returns the number of rows removed from both tables.
pub async fn delete_expired_tokens(pool: &DbPool, now: DateTime<Utc>) -> Result<u64> {
    let mut tx = pool.begin().await?;

    let refresh = sqlx::query(&format!("DELETE FROM refresh_tokens WHERE {}", EXPIRED_AT))
        .bind(now)
        .execute(&mut *tx)
        .await?;

    let tokens = sqlx::query(&format!(
        "DELETE FROM api_tokens WHERE {} AND id NOT IN (SELECT token_id FROM refresh_tokens)",
        EXPIRED_AT
    ))
    .bind(now)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(refresh.rows_affected() + tokens.rows_affected())
}
