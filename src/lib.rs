//! Modelhub - project, model and version server
//!
//! Library exports for the binary and for integration tests.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod graphql;
pub mod middleware;
pub mod services;
pub mod state;

pub use config::config;
pub use error::{Error, Result};
pub use state::AppState;
