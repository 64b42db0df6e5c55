//! Middleware for modelhub.
//!
//! - `token_auth` - bearer token validation, required or optional
//! - `rate_limit` - per-client quota on the credential endpoints

mod rate_limit;
mod token_auth;

pub use rate_limit::{create_auth_rate_limiter, limit_auth_requests, AuthRateLimiter};
pub use token_auth::{attach_token, parse_bearer, require_token, AuthContext};
