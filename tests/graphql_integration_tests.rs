//! GraphQL tests over HTTP: authorization, project roles, models,
//! versions and pagination.

mod common;

use std::collections::HashSet;

use common::{error_code, setup, Session, TestApp};
use serde_json::{json, Value};

const CREATE_PROJECT: &str = r#"
    mutation($input: ProjectCreateInput!) {
        projectCreate(input: $input) { id name visibility role }
    }
"#;

const UPDATE_ROLE: &str = r#"
    mutation($input: ProjectUpdateRoleInput!) {
        projectUpdateRole(input: $input) { id }
    }
"#;

const CREATE_MODEL: &str = r#"
    mutation($input: CreateModelInput!) {
        modelCreate(input: $input) { id name displayName }
    }
"#;

/// Register a throwaway first user so later sessions are not server admins.
async fn setup_without_admin() -> TestApp {
    let app = setup().await;
    app.register("admin@example.com").await;
    app
}

async fn create_project(app: &TestApp, session: &Session, input: Value) -> String {
    let response = app
        .graphql(Some(&session.token), CREATE_PROJECT, json!({ "input": input }))
        .await;
    assert!(response["errors"].is_null(), "{response}");
    response["data"]["projectCreate"]["id"]
        .as_str()
        .unwrap()
        .to_string()
}

async fn set_role(app: &TestApp, owner: &Session, project_id: &str, user_id: &str, role: Value) -> Value {
    app.graphql(
        Some(&owner.token),
        UPDATE_ROLE,
        json!({ "input": { "projectId": project_id, "userId": user_id, "role": role } }),
    )
    .await
}

async fn main_model_id(app: &TestApp, session: &Session, project_id: &str) -> String {
    let response = app
        .graphql(
            Some(&session.token),
            r#"query($id: String!) { project(id: $id) { modelsTree { fullName model { id } } } }"#,
            json!({ "id": project_id }),
        )
        .await;
    response["data"]["project"]["modelsTree"]
        .as_array()
        .unwrap()
        .iter()
        .find(|item| item["fullName"] == "main")
        .and_then(|item| item["model"]["id"].as_str())
        .unwrap()
        .to_string()
}

// ============================================================================
// Server and user
// ============================================================================

#[tokio::test]
async fn test_server_info_is_public() {
    let app = setup().await;
    let response = app
        .graphql(None, "{ serverInfo { name version scopes } }", json!({}))
        .await;

    assert_eq!(response["data"]["serverInfo"]["name"], app.state.config.server_info.name);
    assert!(response["data"]["serverInfo"]["scopes"]
        .as_array()
        .unwrap()
        .contains(&json!("streams:write")));
}

#[tokio::test]
async fn test_active_user() {
    let app = setup().await;
    let session = app.session("ada@example.com").await;

    let anonymous = app.graphql(None, "{ activeUser { id } }", json!({})).await;
    assert!(anonymous["data"]["activeUser"].is_null());

    let invalid = app
        .graphql(Some("not-a-real-token"), "{ activeUser { id } }", json!({}))
        .await;
    assert!(invalid["data"]["activeUser"].is_null());

    let me = app
        .graphql(Some(&session.token), "{ activeUser { id email role } }", json!({}))
        .await;
    assert_eq!(me["data"]["activeUser"]["id"], session.user_id.as_str());
    assert_eq!(me["data"]["activeUser"]["email"], "ada@example.com");
    assert_eq!(me["data"]["activeUser"]["role"], "server:admin");
}

// ============================================================================
// Projects
// ============================================================================

#[tokio::test]
async fn test_unauthenticated_project_create_is_forbidden() {
    let app = setup().await;
    let response = app
        .graphql(None, CREATE_PROJECT, json!({ "input": { "name": "Nope" } }))
        .await;

    assert_eq!(error_code(&response), Some("FORBIDDEN"));
    assert!(response["data"].is_null());
}

#[tokio::test]
async fn test_project_create_and_read() {
    let app = setup_without_admin().await;
    let owner = app.session("owner@example.com").await;

    let response = app
        .graphql(
            Some(&owner.token),
            CREATE_PROJECT,
            json!({ "input": { "name": "Tower", "visibility": "PRIVATE" } }),
        )
        .await;
    let project = &response["data"]["projectCreate"];
    assert_eq!(project["name"], "Tower");
    assert_eq!(project["visibility"], "PRIVATE");
    assert_eq!(project["role"], "stream:owner");

    let id = project["id"].as_str().unwrap();
    let read = app
        .graphql(
            Some(&owner.token),
            r#"query($id: String!) {
                project(id: $id) {
                    name
                    models { totalCount items { name } }
                    team { role user { id } }
                }
            }"#,
            json!({ "id": id }),
        )
        .await;
    let project = &read["data"]["project"];
    assert_eq!(project["models"]["totalCount"], 1);
    assert_eq!(project["models"]["items"][0]["name"], "main");
    assert_eq!(project["team"][0]["role"], "stream:owner");
    assert_eq!(project["team"][0]["user"]["id"], owner.user_id.as_str());

    let mine = app
        .graphql(
            Some(&owner.token),
            "{ activeUser { projects { totalCount items { id } } } }",
            json!({}),
        )
        .await;
    assert_eq!(mine["data"]["activeUser"]["projects"]["totalCount"], 1);
    assert_eq!(mine["data"]["activeUser"]["projects"]["items"][0]["id"], id);
}

#[tokio::test]
async fn test_private_project_visibility() {
    let app = setup_without_admin().await;
    let owner = app.session("owner@example.com").await;
    let stranger = app.session("stranger@example.com").await;

    let private_id = create_project(&app, &owner, json!({ "name": "Secret" })).await;
    let public_id =
        create_project(&app, &owner, json!({ "name": "Open", "visibility": "PUBLIC" })).await;

    let query = r#"query($id: String!) { project(id: $id) { name role } }"#;

    let anonymous = app.graphql(None, query, json!({ "id": private_id })).await;
    assert_eq!(error_code(&anonymous), Some("FORBIDDEN"));

    let other = app
        .graphql(Some(&stranger.token), query, json!({ "id": private_id }))
        .await;
    assert_eq!(error_code(&other), Some("FORBIDDEN"));

    let public = app.graphql(None, query, json!({ "id": public_id })).await;
    assert_eq!(public["data"]["project"]["name"], "Open");
    assert!(public["data"]["project"]["role"].is_null());

    let missing = app.graphql(None, query, json!({ "id": "nope" })).await;
    assert_eq!(error_code(&missing), Some("NOT_FOUND"));
}

#[tokio::test]
async fn test_project_update_requires_owner() {
    let app = setup_without_admin().await;
    let owner = app.session("owner@example.com").await;
    let contributor = app.session("contrib@example.com").await;
    let project_id = create_project(&app, &owner, json!({ "name": "Tower" })).await;
    set_role(&app, &owner, &project_id, &contributor.user_id, json!("stream:contributor")).await;

    let update = r#"mutation($input: ProjectUpdateInput!) { projectUpdate(input: $input) { name } }"#;

    let denied = app
        .graphql(
            Some(&contributor.token),
            update,
            json!({ "input": { "id": project_id, "name": "Mine" } }),
        )
        .await;
    assert_eq!(error_code(&denied), Some("FORBIDDEN"));

    let renamed = app
        .graphql(
            Some(&owner.token),
            update,
            json!({ "input": { "id": project_id, "name": "Tower 2" } }),
        )
        .await;
    assert_eq!(renamed["data"]["projectUpdate"]["name"], "Tower 2");
}

#[tokio::test]
async fn test_last_owner_cannot_be_removed() {
    let app = setup_without_admin().await;
    let owner = app.session("owner@example.com").await;
    let project_id = create_project(&app, &owner, json!({})).await;

    let removed = set_role(&app, &owner, &project_id, &owner.user_id, Value::Null).await;
    assert_eq!(error_code(&removed), Some("VALIDATION_ERROR"));

    let demoted = set_role(&app, &owner, &project_id, &owner.user_id, json!("stream:reviewer")).await;
    assert_eq!(error_code(&demoted), Some("VALIDATION_ERROR"));

    let bogus = set_role(&app, &owner, &project_id, &owner.user_id, json!("stream:king")).await;
    assert_eq!(error_code(&bogus), Some("VALIDATION_ERROR"));
}

#[tokio::test]
async fn test_project_delete() {
    let app = setup_without_admin().await;
    let owner = app.session("owner@example.com").await;
    let project_id = create_project(&app, &owner, json!({})).await;

    let deleted = app
        .graphql(
            Some(&owner.token),
            r#"mutation($id: String!) { projectDelete(id: $id) }"#,
            json!({ "id": project_id }),
        )
        .await;
    assert_eq!(deleted["data"]["projectDelete"], true);

    let read = app
        .graphql(
            Some(&owner.token),
            r#"query($id: String!) { project(id: $id) { id } }"#,
            json!({ "id": project_id }),
        )
        .await;
    assert_eq!(error_code(&read), Some("NOT_FOUND"));
}

// ============================================================================
// Models
// ============================================================================

#[tokio::test]
async fn test_model_create_requires_contributor() {
    let app = setup_without_admin().await;
    let owner = app.session("owner@example.com").await;
    let reviewer = app.session("reviewer@example.com").await;
    let contributor = app.session("contrib@example.com").await;
    let project_id = create_project(&app, &owner, json!({})).await;

    set_role(&app, &owner, &project_id, &reviewer.user_id, json!("stream:reviewer")).await;
    set_role(&app, &owner, &project_id, &contributor.user_id, json!("stream:contributor")).await;

    let denied = app
        .graphql(
            Some(&reviewer.token),
            CREATE_MODEL,
            json!({ "input": { "projectId": project_id, "name": "walls" } }),
        )
        .await;
    assert_eq!(error_code(&denied), Some("FORBIDDEN"));

    let created = app
        .graphql(
            Some(&contributor.token),
            CREATE_MODEL,
            json!({ "input": { "projectId": project_id, "name": "Facade/North" } }),
        )
        .await;
    assert_eq!(created["data"]["modelCreate"]["name"], "facade/north");
    assert_eq!(created["data"]["modelCreate"]["displayName"], "north");

    let duplicate = app
        .graphql(
            Some(&contributor.token),
            CREATE_MODEL,
            json!({ "input": { "projectId": project_id, "name": "facade/north" } }),
        )
        .await;
    assert_eq!(error_code(&duplicate), Some("ALREADY_EXISTS"));

    let invalid = app
        .graphql(
            Some(&contributor.token),
            CREATE_MODEL,
            json!({ "input": { "projectId": project_id, "name": "a//b" } }),
        )
        .await;
    assert_eq!(error_code(&invalid), Some("VALIDATION_ERROR"));
}

#[tokio::test]
async fn test_main_model_cannot_be_deleted() {
    let app = setup_without_admin().await;
    let owner = app.session("owner@example.com").await;
    let project_id = create_project(&app, &owner, json!({})).await;
    let main_id = main_model_id(&app, &owner, &project_id).await;

    let response = app
        .graphql(
            Some(&owner.token),
            r#"mutation($input: DeleteModelInput!) { modelDelete(input: $input) }"#,
            json!({ "input": { "projectId": project_id, "id": main_id } }),
        )
        .await;
    assert_eq!(error_code(&response), Some("VALIDATION_ERROR"));
}

#[tokio::test]
async fn test_models_tree() {
    let app = setup_without_admin().await;
    let owner = app.session("owner@example.com").await;
    let project_id = create_project(&app, &owner, json!({})).await;

    for name in ["facade/north", "facade/south", "structure"] {
        app.graphql(
            Some(&owner.token),
            CREATE_MODEL,
            json!({ "input": { "projectId": project_id, "name": name } }),
        )
        .await;
    }

    let tree = r#"query($id: String!, $parent: String) {
        project(id: $id) { modelsTree(parentModelName: $parent) { name fullName hasChildren model { id } } }
    }"#;

    let root = app
        .graphql(Some(&owner.token), tree, json!({ "id": project_id }))
        .await;
    let names: Vec<&str> = root["data"]["project"]["modelsTree"]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["facade", "main", "structure"]);
    assert_eq!(root["data"]["project"]["modelsTree"][0]["hasChildren"], true);
    assert!(root["data"]["project"]["modelsTree"][0]["model"].is_null());

    let facade = app
        .graphql(
            Some(&owner.token),
            tree,
            json!({ "id": project_id, "parent": "facade" }),
        )
        .await;
    let children = facade["data"]["project"]["modelsTree"].as_array().unwrap();
    assert_eq!(children.len(), 2);
    assert_eq!(children[0]["fullName"], "facade/north");
    assert!(children[0]["model"]["id"].is_string());
}

#[tokio::test]
async fn test_model_pagination_walks_every_item_once() {
    let app = setup_without_admin().await;
    let owner = app.session("owner@example.com").await;
    let project_id = create_project(&app, &owner, json!({})).await;

    for i in 0..7 {
        app.graphql(
            Some(&owner.token),
            CREATE_MODEL,
            json!({ "input": { "projectId": project_id, "name": format!("model-{i}") } }),
        )
        .await;
    }

    let page = r#"query($id: String!, $cursor: String) {
        project(id: $id) { models(limit: 3, cursor: $cursor) { totalCount cursor items { id } } }
    }"#;

    let mut seen = HashSet::new();
    let mut cursor = Value::Null;
    let mut pages = 0;
    loop {
        let response = app
            .graphql(
                Some(&owner.token),
                page,
                json!({ "id": project_id, "cursor": cursor }),
            )
            .await;
        let models = &response["data"]["project"]["models"];
        assert_eq!(models["totalCount"], 8);

        for item in models["items"].as_array().unwrap() {
            assert!(seen.insert(item["id"].as_str().unwrap().to_string()));
        }
        pages += 1;

        cursor = models["cursor"].clone();
        if cursor.is_null() {
            break;
        }
        assert!(pages < 10, "cursor never ran out");
    }

    assert_eq!(seen.len(), 8);
    assert_eq!(pages, 3);

    let bad = app
        .graphql(
            Some(&owner.token),
            page,
            json!({ "id": project_id, "cursor": "!!!" }),
        )
        .await;
    assert_eq!(error_code(&bad), Some("INVALID_INPUT"));
}

// ============================================================================
// Versions
// ============================================================================

#[tokio::test]
async fn test_version_create_and_list() {
    let app = setup_without_admin().await;
    let owner = app.session("owner@example.com").await;
    let project_id = create_project(&app, &owner, json!({})).await;
    let main_id = main_model_id(&app, &owner, &project_id).await;

    let created = app
        .graphql(
            Some(&owner.token),
            r#"mutation($input: CreateVersionInput!) {
                versionCreate(input: $input) {
                    id referencedObject message totalChildrenCount
                    authorUser { id }
                    model { name }
                }
            }"#,
            json!({ "input": {
                "projectId": project_id,
                "modelId": main_id,
                "objectId": "abc123",
                "message": "first",
                "totalChildrenCount": 12,
            } }),
        )
        .await;
    let version = &created["data"]["versionCreate"];
    assert_eq!(version["referencedObject"], "abc123");
    assert_eq!(version["totalChildrenCount"], 12);
    assert_eq!(version["authorUser"]["id"], owner.user_id.as_str());
    assert_eq!(version["model"]["name"], "main");

    let listed = app
        .graphql(
            Some(&owner.token),
            r#"query($id: String!, $model: String!) {
                project(id: $id) {
                    versions { totalCount }
                    model(id: $model) { versions { totalCount items { message } } }
                }
            }"#,
            json!({ "id": project_id, "model": main_id }),
        )
        .await;
    let project = &listed["data"]["project"];
    assert_eq!(project["versions"]["totalCount"], 1);
    assert_eq!(project["model"]["versions"]["items"][0]["message"], "first");
}

#[tokio::test]
async fn test_version_create_requires_contributor() {
    let app = setup_without_admin().await;
    let owner = app.session("owner@example.com").await;
    let reviewer = app.session("reviewer@example.com").await;
    let project_id = create_project(&app, &owner, json!({})).await;
    set_role(&app, &owner, &project_id, &reviewer.user_id, json!("stream:reviewer")).await;
    let main_id = main_model_id(&app, &owner, &project_id).await;

    let response = app
        .graphql(
            Some(&reviewer.token),
            r#"mutation($input: CreateVersionInput!) { versionCreate(input: $input) { id } }"#,
            json!({ "input": { "projectId": project_id, "modelId": main_id, "objectId": "x" } }),
        )
        .await;
    assert_eq!(error_code(&response), Some("FORBIDDEN"));
}

// ============================================================================
// Tokens
// ============================================================================

#[tokio::test]
async fn test_personal_token_lifecycle() {
    let app = setup_without_admin().await;
    let owner = app.session("owner@example.com").await;

    let created = app
        .graphql(
            Some(&owner.token),
            r#"mutation($input: ApiTokenCreateInput!) { apiTokenCreate(input: $input) }"#,
            json!({ "input": { "name": "ci", "scopes": ["streams:read"] } }),
        )
        .await;
    let token = created["data"]["apiTokenCreate"].as_str().unwrap().to_string();

    let me = app
        .graphql(Some(&token), "{ activeUser { id } }", json!({}))
        .await;
    assert_eq!(me["data"]["activeUser"]["id"], owner.user_id.as_str());

    // Read-only token cannot write.
    let denied = app
        .graphql(Some(&token), CREATE_PROJECT, json!({ "input": {} }))
        .await;
    assert_eq!(error_code(&denied), Some("FORBIDDEN"));

    let revoked = app
        .graphql(
            Some(&owner.token),
            r#"mutation($id: String!) { apiTokenRevoke(id: $id) }"#,
            json!({ "id": &token[..10] }),
        )
        .await;
    assert_eq!(revoked["data"]["apiTokenRevoke"], true);

    let after = app
        .graphql(Some(&token), "{ activeUser { id } }", json!({}))
        .await;
    assert!(after["data"]["activeUser"].is_null());
}

#[tokio::test]
async fn test_personal_token_lifespan_is_bounded() {
    let app = setup_without_admin().await;
    let owner = app.session("owner@example.com").await;
    let create = r#"mutation($input: ApiTokenCreateInput!) { apiTokenCreate(input: $input) }"#;

    for lifespan in [json!(10_000_000_000_000i64), json!(0), json!(-5)] {
        let response = app
            .graphql(
                Some(&owner.token),
                create,
                json!({ "input": { "name": "ci", "scopes": ["streams:read"], "lifespan": lifespan } }),
            )
            .await;
        assert_eq!(error_code(&response), Some("VALIDATION_ERROR"), "lifespan {}", lifespan);
    }

    let short = app
        .graphql(
            Some(&owner.token),
            create,
            json!({ "input": { "name": "ci", "scopes": ["streams:read"], "lifespan": 3600 } }),
        )
        .await;
    let token = short["data"]["apiTokenCreate"].as_str().unwrap();

    let me = app.graphql(Some(token), "{ activeUser { id } }", json!({})).await;
    assert_eq!(me["data"]["activeUser"]["id"], owner.user_id.as_str());
}

#[tokio::test]
async fn test_app_create_and_lookup() {
    let app = setup_without_admin().await;
    let owner = app.session("owner@example.com").await;

    let created = app
        .graphql(
            Some(&owner.token),
            r#"mutation($input: AppCreateInput!) { appCreate(input: $input) { id secret } }"#,
            json!({ "input": {
                "name": "Viewer",
                "redirectUrl": "https://viewer.example.com/cb",
                "scopes": ["streams:read"],
            } }),
        )
        .await;
    let id = created["data"]["appCreate"]["id"].as_str().unwrap();
    assert!(created["data"]["appCreate"]["secret"].is_string());

    let info = app
        .graphql(
            None,
            r#"query($id: String!) { app(id: $id) { name redirectUrl author { id } } }"#,
            json!({ "id": id }),
        )
        .await;
    assert_eq!(info["data"]["app"]["name"], "Viewer");
    assert_eq!(info["data"]["app"]["author"]["id"], owner.user_id.as_str());
}
