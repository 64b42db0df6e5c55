//! Authentication service.
//!
//! Local email/password accounts, the access-code grant, token/refresh
//! token pairs, personal API tokens and app registration.
//!
//! Token format: `{id}{secret}` where:
//! - `{id}` is 10 alphanumeric chars used for database lookup
//! - `{secret}` is 32 alphanumeric chars, stored as a SHA-256 hex digest

use chrono::Utc;
use nanoid::nanoid;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::AuthConfig;
use crate::db::{self, AccessCode, ApiToken, App, DbPool, User};
use crate::middleware::AuthContext;
use crate::services::password::{hash_password, verify_password};
use crate::services::permissions::{scopes, ServerRole};
use crate::{Error, Result};

const ALPHANUMERIC: [char; 62] = [
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i',
    'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z', 'A', 'B',
    'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L', 'M', 'N', 'O', 'P', 'Q', 'R', 'S', 'T', 'U',
    'V', 'W', 'X', 'Y', 'Z',
];

pub const TOKEN_ID_LENGTH: usize = 10;
pub const TOKEN_SECRET_LENGTH: usize = 32;
const APP_ID_LENGTH: usize = 10;

/// Random alphanumeric string.
pub fn generate_random(len: usize) -> String {
    nanoid!(len, &ALPHANUMERIC)
}

/// Hash a token secret using SHA-256.
pub fn hash_secret(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Constant-time string comparison.
fn secure_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Split a bearer token into its lookup id and secret.
fn split_token(token: &str) -> Option<(&str, &str)> {
    if token.len() != TOKEN_ID_LENGTH + TOKEN_SECRET_LENGTH
        || !token.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return None;
    }
    Some(token.split_at(TOKEN_ID_LENGTH))
}

/// A freshly minted id/secret pair and its joined wire form.
struct MintedToken {
    id: String,
    secret_hash: String,
    value: String,
}

fn mint_token() -> MintedToken {
    let id = generate_random(TOKEN_ID_LENGTH);
    let secret = generate_random(TOKEN_SECRET_LENGTH);
    MintedToken {
        secret_hash: hash_secret(&secret),
        value: format!("{}{}", id, secret),
        id,
    }
}

/// Token pair returned by the code exchange and by refresh.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub token: String,
    pub refresh_token: String,
}

/// Credentials for a new local account.
#[derive(Debug, Clone, Default)]
pub struct Registration {
    pub email: String,
    pub password: String,
    pub name: String,
    pub company: Option<String>,
}

/// Details for a new app registration.
#[derive(Debug, Clone)]
pub struct AppRegistration {
    pub name: String,
    pub description: Option<String>,
    pub redirect_url: String,
    pub scopes: Vec<String>,
    pub public: bool,
}

#[derive(Clone)]
pub struct AuthService {
    db: DbPool,
    config: AuthConfig,
}

impl AuthService {
    pub fn new(db: DbPool, config: AuthConfig) -> Self {
        Self { db, config }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn web_app_id(&self) -> &str {
        &self.config.web_app.id
    }

    /// Make sure the first-party web app exists and matches configuration.
    pub async fn ensure_web_app(&self) -> Result<App> {
        let web = &self.config.web_app;
        let app = db::upsert_app(
            &self.db,
            db::CreateApp {
                id: web.id.clone(),
                secret: web.secret.clone(),
                name: web.name.clone(),
                description: Some("First-party web application".to_string()),
                redirect_url: web.redirect_url.clone(),
                trusted: true,
                public: true,
                author_id: None,
                scopes: web.scopes.clone(),
            },
        )
        .await?;

        debug!(app_id = %app.id, "Web app registered");
        Ok(app)
    }

    // ========================================================================
    // Local accounts
    // ========================================================================

    /// Create a local account. The first account on a server becomes admin.
    pub async fn register(&self, input: Registration) -> Result<User> {
        let email = input.email.trim();
        let name = input.name.trim();

        if email.is_empty() || !email.contains('@') {
            return Err(Error::Validation("A valid email is required".into()));
        }
        if input.password.is_empty() {
            return Err(Error::Validation("A password is required".into()));
        }
        if name.is_empty() {
            return Err(Error::Validation("A name is required".into()));
        }
        if input.password.chars().count() < self.config.min_password_length {
            return Err(Error::Validation(format!(
                "Password must be at least {} characters",
                self.config.min_password_length
            )));
        }

        let role = if db::count_users(&self.db).await? == 0 {
            ServerRole::Admin
        } else {
            ServerRole::User
        };

        let password_hash = hash_password(&input.password)?;

        let user = db::create_user(
            &self.db,
            db::CreateUser {
                id: db::new_id(),
                email: email.to_string(),
                name: name.to_string(),
                company: input.company.filter(|c| !c.trim().is_empty()),
                password_hash: Some(password_hash),
                role,
            },
        )
        .await
        .map_err(|e| match e {
            Error::AlreadyExists(_) => Error::Validation("Email already in use".into()),
            other => other,
        })?;

        info!(user_id = %user.id, role = role.as_str(), "User registered");
        Ok(user)
    }

    /// Check email/password credentials.
    pub async fn login(&self, email: &str, password: &str) -> Result<User> {
        let user = db::get_user_by_email(&self.db, email)
            .await?
            .ok_or(Error::InvalidCredentials)?;

        let hash = user
            .password_hash
            .as_deref()
            .ok_or(Error::InvalidCredentials)?;

        if !verify_password(password, hash) {
            debug!(user_id = %user.id, "Password mismatch");
            return Err(Error::InvalidCredentials);
        }

        Ok(user)
    }

    // ========================================================================
    // Apps
    // ========================================================================

    /// Look up an app, treating an unknown id as bad input.
    pub async fn get_app(&self, app_id: &str) -> Result<App> {
        db::get_app(&self.db, app_id)
            .await?
            .ok_or_else(|| Error::Validation(format!("Unknown app {}", app_id)))
    }

    /// Check an app's id/secret pair.
    pub async fn verify_app(&self, app_id: &str, app_secret: &str) -> Result<App> {
        let app = db::get_app(&self.db, app_id)
            .await?
            .ok_or(Error::InvalidCredentials)?;

        if !secure_eq(&app.secret, app_secret) {
            debug!(app_id = %app_id, "App secret mismatch");
            return Err(Error::InvalidCredentials);
        }

        Ok(app)
    }

    /// Register a third-party app owned by the caller.
    pub async fn create_app(&self, author: &AuthContext, input: AppRegistration) -> Result<App> {
        if input.name.trim().is_empty() {
            return Err(Error::Validation("App name is required".into()));
        }
        Url::parse(&input.redirect_url)
            .map_err(|_| Error::Validation("Redirect URL is not a valid URL".into()))?;
        if let Some(unknown) = input.scopes.iter().find(|s| !scopes::is_known(s)) {
            return Err(Error::Validation(format!("Unknown scope {}", unknown)));
        }

        let app = db::create_app(
            &self.db,
            db::CreateApp {
                id: generate_random(APP_ID_LENGTH),
                secret: generate_random(APP_ID_LENGTH),
                name: input.name.trim().to_string(),
                description: input.description,
                redirect_url: input.redirect_url,
                trusted: false,
                public: input.public,
                author_id: Some(author.user_id.clone()),
                scopes: input.scopes,
            },
        )
        .await?;

        info!(app_id = %app.id, author_id = %author.user_id, "App created");
        Ok(app)
    }

    // ========================================================================
    // Access codes
    // ========================================================================

    /// Issue an access code and build the redirect URL that delivers it.
    ///
    /// `app_id` defaults to the web app.
    pub async fn authorize(
        &self,
        user_id: &str,
        app_id: Option<&str>,
        challenge: Option<&str>,
    ) -> Result<String> {
        let challenge = challenge
            .filter(|c| !c.is_empty())
            .ok_or_else(|| Error::Validation("Missing challenge".into()))?;
        let app = self.get_app(app_id.unwrap_or(self.web_app_id())).await?;

        let code = self.create_access_code(&app.id, user_id, challenge).await?;
        redirect_with_code(&app, &code.id)
    }

    /// Issue an access code on behalf of an already authenticated caller.
    ///
    /// Tokens held by third-party apps cannot mint codes for other apps. The
    /// caller needs `tokens:write`, and the target app may not hold scopes
    /// the calling token lacks.
    pub async fn authorize_with_token(
        &self,
        ctx: &AuthContext,
        app_id: Option<&str>,
        challenge: Option<&str>,
    ) -> Result<String> {
        match ctx.app_id.as_deref() {
            None => {}
            Some(id) if id == self.web_app_id() => {}
            Some(id) => {
                warn!(token_app = %id, "Third-party token tried to authorize an app");
                return Err(Error::InvalidToken);
            }
        }
        ctx.require_scope(scopes::TOKENS_WRITE)?;

        let app_id = app_id
            .filter(|a| !a.is_empty())
            .ok_or_else(|| Error::Validation("Missing appId".into()))?;
        let challenge = challenge
            .filter(|c| !c.is_empty())
            .ok_or_else(|| Error::Validation("Missing challenge".into()))?;

        let app = self.get_app(app_id).await?;
        if let Some(missing) = app.scopes_vec().iter().find(|s| !ctx.has_scope(s)) {
            warn!(
                user_id = %ctx.user_id,
                app_id = %app.id,
                scope = %missing,
                "Token lacks a scope the app would receive"
            );
            return Err(Error::Forbidden);
        }

        let code = self.create_access_code(&app.id, &ctx.user_id, challenge).await?;
        redirect_with_code(&app, &code.id)
    }

    pub async fn create_access_code(
        &self,
        app_id: &str,
        user_id: &str,
        challenge: &str,
    ) -> Result<AccessCode> {
        db::create_access_code(
            &self.db,
            db::CreateAccessCode {
                id: generate_random(TOKEN_ID_LENGTH),
                app_id: app_id.to_string(),
                user_id: user_id.to_string(),
                challenge: challenge.to_string(),
                lifespan_secs: self.config.access_code_ttl_secs,
            },
        )
        .await
    }

    // ========================================================================
    // Token pairs
    // ========================================================================

    /// Redeem an access code for a token pair.
    ///
    /// The code must belong to the presenting app and the challenge must
    /// match the one recorded at issuance. A code is single use.
    pub async fn exchange_access_code(
        &self,
        app_id: &str,
        app_secret: &str,
        access_code: &str,
        challenge: &str,
    ) -> Result<TokenPair> {
        let app = self.verify_app(app_id, app_secret).await?;

        let code = db::get_access_code(&self.db, access_code)
            .await?
            .ok_or(Error::InvalidCredentials)?;

        if code.app_id != app.id {
            debug!(app_id = %app.id, "Access code belongs to another app");
            return Err(Error::InvalidCredentials);
        }
        if !secure_eq(&code.challenge, challenge) {
            debug!(app_id = %app.id, "Challenge mismatch");
            return Err(Error::InvalidCredentials);
        }
        if code.is_expired(Utc::now()) {
            db::consume_access_code(&self.db, &code.id).await?;
            return Err(Error::TokenExpired);
        }
        if !db::consume_access_code(&self.db, &code.id).await? {
            return Err(Error::InvalidCredentials);
        }

        let pair = self.issue_pair(&app, &code.user_id).await?;
        info!(app_id = %app.id, user_id = %code.user_id, "Access code exchanged");
        Ok(pair)
    }

    /// Rotate a refresh token: the old pair is deleted and a new one issued.
    pub async fn refresh(
        &self,
        refresh_token: &str,
        app_id: &str,
        app_secret: &str,
    ) -> Result<TokenPair> {
        let app = self.verify_app(app_id, app_secret).await?;

        let (id, secret) = split_token(refresh_token).ok_or(Error::InvalidToken)?;
        let stored = db::get_refresh_token(&self.db, id)
            .await?
            .ok_or(Error::InvalidToken)?;

        if !secure_eq(&hash_secret(secret), &stored.token_hash) {
            return Err(Error::InvalidToken);
        }
        if stored.app_id != app.id {
            debug!(app_id = %app.id, "Refresh token belongs to another app");
            return Err(Error::InvalidToken);
        }

        db::delete_api_token(&self.db, &stored.token_id).await?;

        if stored.is_expired(Utc::now()) {
            return Err(Error::TokenExpired);
        }

        let pair = self.issue_pair(&app, &stored.user_id).await?;
        debug!(app_id = %app.id, user_id = %stored.user_id, "Token pair rotated");
        Ok(pair)
    }

    async fn issue_pair(&self, app: &App, user_id: &str) -> Result<TokenPair> {
        let token = mint_token();
        let refresh = mint_token();

        db::create_token_pair(
            &self.db,
            db::CreateApiToken {
                id: token.id.clone(),
                token_hash: token.secret_hash.clone(),
                owner_id: user_id.to_string(),
                app_id: Some(app.id.clone()),
                name: format!("{} token", app.name),
                scopes: app.scopes_vec(),
                lifespan_secs: self.config.token_ttl_secs,
            },
            db::CreateRefreshToken {
                id: refresh.id.clone(),
                token_hash: refresh.secret_hash.clone(),
                lifespan_secs: self.config.refresh_token_ttl_secs,
            },
        )
        .await?;

        Ok(TokenPair {
            token: token.value,
            refresh_token: refresh.value,
        })
    }

    /// Delete an access token and a refresh token.
    ///
    /// Credentials that don't verify are ignored, so logging out twice is
    /// harmless.
    pub async fn logout(&self, token: &str, refresh_token: &str) -> Result<()> {
        if let Some((id, secret)) = split_token(token) {
            if let Some(stored) = db::get_api_token(&self.db, id).await? {
                if secure_eq(&hash_secret(secret), &stored.token_hash) {
                    db::delete_api_token(&self.db, &stored.id).await?;
                }
            }
        }

        if let Some((id, secret)) = split_token(refresh_token) {
            if let Some(stored) = db::get_refresh_token(&self.db, id).await? {
                if secure_eq(&hash_secret(secret), &stored.token_hash) {
                    db::delete_api_token(&self.db, &stored.token_id).await?;
                    db::delete_refresh_token(&self.db, &stored.id).await?;
                }
            }
        }

        Ok(())
    }

    // ========================================================================
    // Token validation
    // ========================================================================

    /// Resolve a bearer token into the caller's auth context.
    pub async fn validate_token(&self, token: &str) -> Result<AuthContext> {
        let (id, secret) = split_token(token).ok_or(Error::InvalidToken)?;

        let stored = db::get_api_token(&self.db, id)
            .await?
            .ok_or(Error::InvalidToken)?;

        if !secure_eq(&hash_secret(secret), &stored.token_hash) {
            return Err(Error::InvalidToken);
        }
        if stored.is_expired(Utc::now()) {
            return Err(Error::TokenExpired);
        }

        let user = db::get_user(&self.db, &stored.owner_id)
            .await
            .map_err(|_| Error::InvalidToken)?;

        // Update last_used (fire and forget - don't block the request)
        let pool = self.db.clone();
        let token_id = stored.id.clone();
        tokio::spawn(async move {
            if let Err(e) = db::touch_api_token(&pool, &token_id).await {
                debug!(token_id = %token_id, error = %e, "Failed to record token use");
            }
        });

        Ok(AuthContext {
            user_id: user.id.clone(),
            token_id: stored.id.clone(),
            app_id: stored.app_id.clone(),
            scopes: stored.scopes_vec(),
            server_role: user.server_role(),
        })
    }

    // ========================================================================
    // Personal tokens
    // ========================================================================

    /// Create a personal API token. Returns the wire value, shown once.
    ///
    /// Requested scopes must be a subset of the caller's own scopes, and the
    /// lifespan may not exceed the configured token lifetime.
    pub async fn create_personal_token(
        &self,
        ctx: &AuthContext,
        name: &str,
        requested_scopes: Vec<String>,
        lifespan_secs: Option<i64>,
    ) -> Result<(String, ApiToken)> {
        if name.trim().is_empty() {
            return Err(Error::Validation("Token name is required".into()));
        }
        if requested_scopes.is_empty() {
            return Err(Error::Validation("At least one scope is required".into()));
        }
        if let Some(unknown) = requested_scopes.iter().find(|s| !scopes::is_known(s)) {
            return Err(Error::Validation(format!("Unknown scope {}", unknown)));
        }
        if requested_scopes.iter().any(|s| !ctx.has_scope(s)) {
            return Err(Error::Forbidden);
        }

        let max_lifespan = self.config.token_ttl_secs;
        let lifespan = match lifespan_secs {
            None => max_lifespan,
            Some(l) if (1..=max_lifespan).contains(&l) => l,
            Some(l) => {
                return Err(Error::Validation(format!(
                    "Token lifespan must be between 1 and {} seconds, got {}",
                    max_lifespan, l
                )))
            }
        };

        let minted = mint_token();
        let record = db::create_api_token(
            &self.db,
            db::CreateApiToken {
                id: minted.id,
                token_hash: minted.secret_hash,
                owner_id: ctx.user_id.clone(),
                app_id: None,
                name: name.trim().to_string(),
                scopes: requested_scopes,
                lifespan_secs: lifespan,
            },
        )
        .await?;

        info!(user_id = %ctx.user_id, token_id = %record.id, "Personal token created");
        Ok((minted.value, record))
    }

    /// Revoke one of the caller's tokens.
    pub async fn revoke_token(&self, ctx: &AuthContext, token_id: &str) -> Result<()> {
        let stored = db::get_api_token(&self.db, token_id)
            .await?
            .filter(|t| t.owner_id == ctx.user_id)
            .ok_or_else(|| Error::NotFound(format!("Token {}", token_id)))?;

        db::delete_api_token(&self.db, &stored.id).await?;
        info!(user_id = %ctx.user_id, token_id = %stored.id, "Token revoked");
        Ok(())
    }
}

/// `<redirect_url>?access_code=<code>`, keeping any query the app registered.
pub fn redirect_with_code(app: &App, code: &str) -> Result<String> {
    let mut url = Url::parse(&app.redirect_url)
        .map_err(|e| Error::Internal(format!("App {} has an invalid redirect URL: {}", app.id, e)))?;
    url.query_pairs_mut().append_pair("access_code", code);
    Ok(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::init_test_pool;

    async fn service() -> AuthService {
        let pool = init_test_pool().await.unwrap();
        let service = AuthService::new(pool, Config::default().auth);
        service.ensure_web_app().await.unwrap();
        service
    }

    fn registration(email: &str) -> Registration {
        Registration {
            email: email.into(),
            password: "long-enough-pw".into(),
            name: "Ada".into(),
            company: None,
        }
    }

    fn code_from(url: &str) -> String {
        let url = Url::parse(url).unwrap();
        url.query_pairs()
            .find(|(k, _)| k == "access_code")
            .map(|(_, v)| v.into_owned())
            .unwrap()
    }

    async fn pair_for(service: &AuthService, email: &str) -> TokenPair {
        let user = service.register(registration(email)).await.unwrap();
        let url = service.authorize(&user.id, None, Some("ch")).await.unwrap();
        service
            .exchange_access_code("webapp", "webapp", &code_from(&url), "ch")
            .await
            .unwrap()
    }

    #[test]
    fn test_token_shape() {
        let minted = mint_token();
        assert_eq!(minted.value.len(), TOKEN_ID_LENGTH + TOKEN_SECRET_LENGTH);
        let (id, secret) = split_token(&minted.value).unwrap();
        assert_eq!(id, minted.id);
        assert_eq!(hash_secret(secret), minted.secret_hash);

        assert!(split_token("short").is_none());
        assert!(split_token(&format!("{}-", &minted.value[1..])).is_none());
    }

    #[test]
    fn test_secure_eq() {
        assert!(secure_eq("hello", "hello"));
        assert!(!secure_eq("hello", "world"));
        assert!(!secure_eq("hello", "hello!"));
    }

    #[tokio::test]
    async fn test_first_user_is_admin() {
        let service = service().await;
        let first = service.register(registration("a@example.com")).await.unwrap();
        let second = service.register(registration("b@example.com")).await.unwrap();
        assert_eq!(first.server_role(), ServerRole::Admin);
        assert_eq!(second.server_role(), ServerRole::User);
    }

    #[tokio::test]
    async fn test_register_validation() {
        let service = service().await;

        let mut short = registration("a@example.com");
        short.password = "short".into();
        assert!(matches!(service.register(short).await, Err(Error::Validation(_))));

        let mut nameless = registration("a@example.com");
        nameless.name = "  ".into();
        assert!(matches!(service.register(nameless).await, Err(Error::Validation(_))));

        service.register(registration("a@example.com")).await.unwrap();
        assert!(matches!(
            service.register(registration("A@example.com")).await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_login() {
        let service = service().await;
        service.register(registration("a@example.com")).await.unwrap();

        assert!(service.login("a@example.com", "long-enough-pw").await.is_ok());
        assert!(matches!(
            service.login("a@example.com", "nope").await,
            Err(Error::InvalidCredentials)
        ));
        assert!(matches!(
            service.login("missing@example.com", "long-enough-pw").await,
            Err(Error::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_code_exchange_is_single_use() {
        let service = service().await;
        let user = service.register(registration("a@example.com")).await.unwrap();
        let code = code_from(&service.authorize(&user.id, None, Some("ch")).await.unwrap());

        assert!(matches!(
            service.exchange_access_code("webapp", "webapp", &code, "other").await,
            Err(Error::InvalidCredentials)
        ));

        let pair = service
            .exchange_access_code("webapp", "webapp", &code, "ch")
            .await
            .unwrap();
        let ctx = service.validate_token(&pair.token).await.unwrap();
        assert_eq!(ctx.user_id, user.id);
        assert_eq!(ctx.app_id.as_deref(), Some("webapp"));

        assert!(service
            .exchange_access_code("webapp", "webapp", &code, "ch")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_refresh_rotates_pair() {
        let service = service().await;
        let pair = pair_for(&service, "a@example.com").await;

        let next = service
            .refresh(&pair.refresh_token, "webapp", "webapp")
            .await
            .unwrap();

        assert!(service.validate_token(&pair.token).await.is_err());
        assert!(service.validate_token(&next.token).await.is_ok());
        assert!(service
            .refresh(&pair.refresh_token, "webapp", "webapp")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_logout_invalidates_both() {
        let service = service().await;
        let pair = pair_for(&service, "a@example.com").await;

        service.logout(&pair.token, &pair.refresh_token).await.unwrap();

        assert!(service.validate_token(&pair.token).await.is_err());
        assert!(service
            .refresh(&pair.refresh_token, "webapp", "webapp")
            .await
            .is_err());

        service.logout(&pair.token, &pair.refresh_token).await.unwrap();
    }

    #[tokio::test]
    async fn test_personal_token_scopes_are_bounded() {
        let service = service().await;
        let pair = pair_for(&service, "a@example.com").await;
        let ctx = service.validate_token(&pair.token).await.unwrap();

        let (value, record) = service
            .create_personal_token(&ctx, "ci", vec![scopes::STREAMS_READ.into()], None)
            .await
            .unwrap();
        let personal = service.validate_token(&value).await.unwrap();
        assert!(personal.app_id.is_none());
        assert!(personal.has_scope(scopes::STREAMS_READ));
        assert!(!personal.has_scope(scopes::STREAMS_WRITE));

        let err = service
            .create_personal_token(&personal, "wider", vec![scopes::STREAMS_WRITE.into()], None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Forbidden));

        service.revoke_token(&ctx, &record.id).await.unwrap();
        assert!(service.validate_token(&value).await.is_err());
    }

    #[tokio::test]
    async fn test_personal_token_lifespan_is_bounded() {
        let service = service().await;
        let pair = pair_for(&service, "a@example.com").await;
        let ctx = service.validate_token(&pair.token).await.unwrap();
        let max = Config::default().auth.token_ttl_secs;

        for lifespan in [0, -1, max + 1, 10_000_000_000_000, i64::MAX] {
            let err = service
                .create_personal_token(&ctx, "ci", vec![scopes::STREAMS_READ.into()], Some(lifespan))
                .await
                .unwrap_err();
            assert!(matches!(err, Error::Validation(_)), "lifespan {}", lifespan);
        }

        let (_, short) = service
            .create_personal_token(&ctx, "ci", vec![scopes::STREAMS_READ.into()], Some(60))
            .await
            .unwrap();
        assert_eq!(short.lifespan_secs, 60);

        let (value, default) = service
            .create_personal_token(&ctx, "ci", vec![scopes::STREAMS_READ.into()], None)
            .await
            .unwrap();
        assert_eq!(default.lifespan_secs, max);
        assert!(service.validate_token(&value).await.is_ok());
    }

    #[tokio::test]
    async fn test_access_code_needs_token_to_cover_app_scopes() {
        let service = service().await;
        let pair = pair_for(&service, "a@example.com").await;
        let ctx = service.validate_token(&pair.token).await.unwrap();

        let (read_only, _) = service
            .create_personal_token(&ctx, "read", vec![scopes::STREAMS_READ.into()], None)
            .await
            .unwrap();
        let read_only = service.validate_token(&read_only).await.unwrap();
        let err = service
            .authorize_with_token(&read_only, Some("webapp"), Some("ch"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Forbidden));

        let (narrow, _) = service
            .create_personal_token(
                &ctx,
                "narrow",
                vec![scopes::TOKENS_WRITE.into(), scopes::STREAMS_READ.into()],
                None,
            )
            .await
            .unwrap();
        let narrow = service.validate_token(&narrow).await.unwrap();
        let err = service
            .authorize_with_token(&narrow, Some("webapp"), Some("ch"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Forbidden));

        let url = service
            .authorize_with_token(&ctx, Some("webapp"), Some("ch"))
            .await
            .unwrap();
        assert!(!code_from(&url).is_empty());
    }

    #[test]
    fn test_redirect_keeps_existing_query() {
        let app = App {
            id: "a".into(),
            secret: "s".into(),
            name: "A".into(),
            description: None,
            redirect_url: "https://app.example.com/cb?x=1".into(),
            trusted: false,
            public: false,
            author_id: None,
            scopes: "[]".into(),
            created_at: Utc::now(),
        };
        let url = redirect_with_code(&app, "abc").unwrap();
        assert_eq!(url, "https://app.example.com/cb?x=1&access_code=abc");
    }
}
