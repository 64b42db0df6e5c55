//! Shared helpers for the integration tests.
//!
//! Every test gets its own in-memory database and server.

#![allow(dead_code)]

use axum::http::{header::AUTHORIZATION, HeaderValue, StatusCode};
use axum_test::TestServer;
use modelhub::config::Config;
use modelhub::{api, db, AppState};
use serde_json::{json, Value};

pub const PASSWORD: &str = "correct horse battery";
pub const CHALLENGE: &str = "test-challenge";

pub struct TestApp {
    pub server: TestServer,
    pub state: AppState,
}

/// A logged-in user with a token pair for the web app.
pub struct Session {
    pub user_id: String,
    pub token: String,
    pub refresh_token: String,
}

pub fn bearer_auth(token: &str) -> HeaderValue {
    HeaderValue::from_str(&format!("Bearer {}", token)).unwrap()
}

pub async fn setup() -> TestApp {
    setup_with(Config::default()).await
}

/// Like [`setup`], with a tweaked configuration.
pub async fn setup_with(config: Config) -> TestApp {
    let pool = db::init_test_pool().await.expect("test database");
    let state = AppState::with_pool(pool, config)
        .await
        .expect("app state");
    let server = TestServer::new(api::router(state.clone())).expect("test server");
    TestApp { server, state }
}

/// Pull `access_code` out of a redirect `Location`.
pub fn access_code_from(location: &str) -> String {
    let url = url::Url::parse(location).expect("redirect URL");
    url.query_pairs()
        .find(|(k, _)| k == "access_code")
        .map(|(_, v)| v.into_owned())
        .expect("access_code in redirect")
}

impl TestApp {
    pub fn web_app(&self) -> (String, String) {
        let web = &self.state.config.auth.web_app;
        (web.id.clone(), web.secret.clone())
    }

    /// Register and return the access code from the redirect.
    pub async fn register(&self, email: &str) -> String {
        let response = self
            .server
            .post("/auth/local/register")
            .add_query_param("challenge", CHALLENGE)
            .json(&json!({ "email": email, "password": PASSWORD, "name": "Test User" }))
            .await;
        assert_eq!(response.status_code(), StatusCode::FOUND);
        access_code_from(response.header("location").to_str().unwrap())
    }

    pub async fn exchange(&self, access_code: &str) -> Value {
        let (app_id, app_secret) = self.web_app();
        let response = self
            .server
            .post("/auth/token")
            .json(&json!({
                "appId": app_id,
                "appSecret": app_secret,
                "accessCode": access_code,
                "challenge": CHALLENGE,
            }))
            .await;
        assert_eq!(response.status_code(), StatusCode::OK);
        response.json::<Value>()
    }

    /// Register a user and exchange the code for a token pair.
    pub async fn session(&self, email: &str) -> Session {
        let code = self.register(email).await;
        let pair = self.exchange(&code).await;
        let user = db::get_user_by_email(&self.state.db, email)
            .await
            .unwrap()
            .expect("registered user");

        Session {
            user_id: user.id,
            token: pair["token"].as_str().unwrap().to_string(),
            refresh_token: pair["refreshToken"].as_str().unwrap().to_string(),
        }
    }

    /// POST a GraphQL document, optionally authenticated.
    pub async fn graphql(&self, token: Option<&str>, query: &str, variables: Value) -> Value {
        let mut request = self
            .server
            .post("/graphql")
            .json(&json!({ "query": query, "variables": variables }));
        if let Some(token) = token {
            request = request.add_header(AUTHORIZATION, bearer_auth(token));
        }
        let response = request.await;
        assert_eq!(response.status_code(), StatusCode::OK);
        response.json::<Value>()
    }
}

/// `extensions.code` of the first GraphQL error.
pub fn error_code(response: &Value) -> Option<&str> {
    response["errors"][0]["extensions"]["code"].as_str()
}
