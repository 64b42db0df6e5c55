//! Configuration management for modelhub.
//!
//! Loads configuration from environment variables (optionally via a `.env`
//! file). Every value has a default so a bare `modelhub` binary starts
//! against a local SQLite file.

use std::env;
use std::sync::OnceLock;

use crate::services::permissions::scopes;

/// Global configuration instance
static CONFIG: OnceLock<Config> = OnceLock::new();

/// Get the global configuration
pub fn config() -> &'static Config {
    CONFIG.get_or_init(Config::from_env)
}

/// Initialize configuration (call once at startup)
pub fn init() -> &'static Config {
    config()
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub server_info: ServerInfoConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Emit logs as JSON lines instead of the human readable format.
    pub json_logs: bool,
    /// How often expired credentials are purged and idle limiter state dropped.
    pub maintenance_interval_secs: u64,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// The first-party web application every local login redirects to by default.
    pub web_app: WebAppConfig,
    pub access_code_ttl_secs: i64,
    pub token_ttl_secs: i64,
    pub refresh_token_ttl_secs: i64,
    pub min_password_length: usize,
}

#[derive(Debug, Clone)]
pub struct WebAppConfig {
    pub id: String,
    pub secret: String,
    pub name: String,
    pub redirect_url: String,
    pub scopes: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ServerInfoConfig {
    pub name: String,
    pub company: Option<String>,
    pub description: Option<String>,
    pub admin_contact: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Requests per minute allowed on credential endpoints, per client.
    pub auth_per_minute: u32,
    /// Key clients on the first `X-Forwarded-For` hop. Only enable behind a
    /// proxy that overwrites the header.
    pub trust_forwarded_for: bool,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    ///
    /// Missing or unparsable values fall back to their defaults.
    pub fn from_lookup<F>(get: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());
        let parsed = |key: &str, default: i64| {
            get(key)
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(default)
        };

        Self {
            server: ServerConfig {
                host: value("HOST", "0.0.0.0"),
                port: value("PORT", "8080").parse().unwrap_or(8080),
                json_logs: get("LOG_FORMAT")
                    .map(|v| v.eq_ignore_ascii_case("json"))
                    .unwrap_or(false),
                maintenance_interval_secs: parsed("MAINTENANCE_INTERVAL_SECS", 3600).max(1) as u64,
            },
            database: DatabaseConfig {
                path: value("DATABASE_PATH", "./data/modelhub.db"),
            },
            auth: AuthConfig {
                web_app: WebAppConfig {
                    id: value("WEB_APP_ID", "webapp"),
                    secret: value("WEB_APP_SECRET", "webapp"),
                    name: value("WEB_APP_NAME", "Modelhub Web"),
                    redirect_url: value("FRONTEND_ORIGIN", "http://localhost:3000"),
                    scopes: scopes::ALL.iter().map(|s| s.to_string()).collect(),
                },
                access_code_ttl_secs: parsed("ACCESS_CODE_TTL_SECS", 10 * 60),
                token_ttl_secs: parsed("TOKEN_TTL_SECS", 90 * 24 * 3600),
                refresh_token_ttl_secs: parsed("REFRESH_TOKEN_TTL_SECS", 180 * 24 * 3600),
                min_password_length: parsed("MIN_PASSWORD_LENGTH", 8).max(1) as usize,
            },
            server_info: ServerInfoConfig {
                name: value("SERVER_NAME", "Modelhub Server"),
                company: get("SERVER_COMPANY"),
                description: get("SERVER_DESCRIPTION"),
                admin_contact: get("SERVER_ADMIN_CONTACT"),
            },
            rate_limit: RateLimitConfig {
                auth_per_minute: parsed("AUTH_RATE_LIMIT_PER_MINUTE", 30).clamp(1, u32::MAX as i64)
                    as u32,
                trust_forwarded_for: get("TRUST_FORWARDED_FOR")
                    .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                    .unwrap_or(false),
            },
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.auth.web_app.id, "webapp");
        assert_eq!(config.auth.access_code_ttl_secs, 600);
        assert_eq!(config.auth.min_password_length, 8);
        assert!(!config.server.json_logs);
        assert!(!config.rate_limit.trust_forwarded_for);
        assert_eq!(config.server.maintenance_interval_secs, 3600);
    }

    #[test]
    fn test_lookup_overrides_and_bad_values() {
        let vars: HashMap<&str, &str> = [
            ("PORT", "not-a-port"),
            ("WEB_APP_ID", "frontend"),
            ("TOKEN_TTL_SECS", "3600"),
            ("LOG_FORMAT", "JSON"),
            ("TRUST_FORWARDED_FOR", "true"),
            ("MAINTENANCE_INTERVAL_SECS", "0"),
        ]
        .into_iter()
        .collect();

        let config = Config::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.auth.web_app.id, "frontend");
        assert_eq!(config.auth.token_ttl_secs, 3600);
        assert!(config.server.json_logs);
        assert!(config.rate_limit.trust_forwarded_for);
        assert_eq!(config.server.maintenance_interval_secs, 1);
    }
}
