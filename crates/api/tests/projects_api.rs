use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use pagecraft_api::auth::{issue_token, Claims};
use pagecraft_api::config::AppConfig;
use pagecraft_api::state::AppState;
use pagecraft_core::events::EventBus;
use pagecraft_core::model::UserRecord;
use pagecraft_core::store::{FaultPoint, MemoryStore, StatementKind};
use pagecraft_core::thumbnail::{CaptureError, CaptureService, RenderTarget};
use serde_json::{json, Value};
use tower::ServiceExt;

const SECRET: &str = "test-secret";

struct NoCapture;

#[async_trait]
impl CaptureService for NoCapture {
    async fn capture(&self, _target: &RenderTarget) -> Result<String, CaptureError> {
        Err(CaptureError::Unavailable("not in tests".into()))
    }
}

struct TestApp {
    store: MemoryStore,
    router: Router,
}

impl TestApp {
    fn new() -> Self {
        let store = MemoryStore::new();
        let config = AppConfig::from_lookup(|name| match name {
            "DATABASE_URL" => Some("postgres://unused".to_string()),
            "JWT_SECRET" => Some(SECRET.to_string()),
            _ => None,
        })
        .unwrap();
        let state = AppState::new(
            Arc::new(store.clone()),
            config,
            EventBus::new(64),
            Arc::new(NoCapture),
        );
        Self {
            store,
            router: pagecraft_api::app(state),
        }
    }

    async fn send(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }
}

fn token_for(user: &UserRecord) -> String {
    issue_token(
        SECRET,
        &Claims {
            sub: user.external_id.clone(),
            username: user.username.clone(),
            user_id: Some(user.id),
            moderator: user.moderator,
            language: None,
            exp: 4_102_444_800,
        },
    )
    .unwrap()
}

fn new_user_token() -> String {
    issue_token(
        SECRET,
        &Claims {
            sub: "ext-fresh".into(),
            username: "fresh".into(),
            user_id: None,
            moderator: false,
            language: Some("pt-BR".into()),
            exp: 4_102_444_800,
        },
    )
    .unwrap()
}

fn project_id(body: &Value) -> i64 {
    body["project"]["id"].as_str().unwrap().parse().unwrap()
}

async fn create(app: &TestApp, owner: &UserRecord, token: &str) -> Value {
    let (status, body) = app
        .send(
            Method::POST,
            &format!("/users/{}/projects", owner.id),
            Some(token),
            Some(json!({"title": "create_test", "version": "test"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body
}

#[tokio::test]
async fn create_returns_project_and_page() {
    let app = TestApp::new();
    let owner = app.store.seed_user("ext-1", "webmaker", false).await;

    let body = create(&app, &owner, &token_for(&owner)).await;

    assert_eq!(body["status"], "created");
    assert_eq!(body["project"]["title"], "create_test");
    assert_eq!(body["project"]["user_id"], owner.id.to_string());
    assert_eq!(body["project"]["remixed_from"], Value::Null);
    assert_eq!(body["project"]["thumbnail"], json!({}));
    assert_eq!(body["page"]["x"], 0);
    assert_eq!(body["page"]["y"], 0);
}

#[tokio::test]
async fn create_for_me_creates_the_token_user() {
    let app = TestApp::new();

    let (status, body) = app
        .send(
            Method::POST,
            "/users/me/projects",
            Some(&new_user_token()),
            Some(json!({"title": "mine", "version": "test", "thumbnail": {"1024": "https://example.com/l.png"}})),
        )
        .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    let users = app.store.users().await;
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].language, "pt-BR");
    assert_eq!(body["project"]["user_id"], users[0].id.to_string());
    assert_eq!(
        body["project"]["thumbnail"],
        json!({"1024": "https://example.com/l.png"})
    );
}

#[tokio::test]
async fn missing_or_bad_token_is_unauthorized() {
    let app = TestApp::new();
    let owner = app.store.seed_user("ext-1", "webmaker", false).await;
    let uri = format!("/users/{}/projects", owner.id);
    let body = json!({"title": "t", "version": "test"});

    let (status, _) = app.send(Method::POST, &uri, None, Some(body.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, response) = app
        .send(Method::POST, &uri, Some("not-a-jwt"), Some(body))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(response["statusCode"], 401);
    assert_eq!(response["error"], "Unauthorized");
}

#[tokio::test]
async fn error_bodies_carry_fixed_messages() {
    let app = TestApp::new();
    let owner = app.store.seed_user("ext-1", "webmaker", false).await;
    let other = app.store.seed_user("ext-2", "other", false).await;

    let (status, body) = app
        .send(
            Method::POST,
            "/users/9999/projects",
            Some(&token_for(&owner)),
            Some(json!({"title": "t", "version": "test"})),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(
        body,
        json!({"statusCode": 404, "error": "Not Found", "message": "User not found"})
    );

    let (status, body) = app
        .send(
            Method::POST,
            &format!("/users/{}/projects", owner.id),
            Some(&token_for(&other)),
            Some(json!({"title": "t", "version": "test"})),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(
        body,
        json!({"statusCode": 403, "error": "Forbidden", "message": "Insufficient permissions"})
    );

    let (status, body) = app
        .send(
            Method::GET,
            &format!("/users/{}/projects/424242", owner.id),
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Project not found");
}

#[tokio::test]
async fn store_failure_at_any_step_is_a_generic_500() {
    for kind in [
        StatementKind::FindUser,
        StatementKind::Begin,
        StatementKind::InsertProject,
        StatementKind::InsertPage,
        StatementKind::Commit,
    ] {
        let app = TestApp::new();
        let owner = app.store.seed_user("ext-1", "webmaker", false).await;
        app.store.fail_next(FaultPoint::Statement(kind));

        let (status, body) = app
            .send(
                Method::POST,
                &format!("/users/{}/projects", owner.id),
                Some(&token_for(&owner)),
                Some(json!({"title": "t", "version": "test"})),
            )
            .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR, "{kind}");
        assert_eq!(
            body,
            json!({
                "statusCode": 500,
                "error": "Internal Server Error",
                "message": "An internal server error occurred",
            }),
            "{kind}"
        );
        assert!(app.store.projects().await.is_empty(), "{kind}");
    }
}

#[tokio::test]
async fn malformed_body_is_a_bad_request() {
    let app = TestApp::new();
    let owner = app.store.seed_user("ext-1", "webmaker", false).await;

    let (status, body) = app
        .send(
            Method::POST,
            &format!("/users/{}/projects", owner.id),
            Some(&token_for(&owner)),
            Some(json!({"title": 5})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["statusCode"], 400);
    assert_eq!(body["error"], "Bad Request");
}

#[tokio::test]
async fn unknown_thumbnail_keys_are_a_bad_request() {
    let app = TestApp::new();
    let owner = app.store.seed_user("ext-1", "webmaker", false).await;
    let token = token_for(&owner);
    let id = project_id(&create(&app, &owner, &token).await);

    let (status, body) = app
        .send(
            Method::POST,
            &format!("/users/{}/projects", owner.id),
            Some(&token),
            Some(json!({"title": "t", "version": "test", "thumbnail": {"500": "x"}})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert_eq!(body["error"], "Bad Request");

    let uri = format!("/users/{}/projects/{id}", owner.id);
    let (status, body) = app
        .send(Method::PATCH, &uri, Some(&token), Some(json!({"thumbnail": {"500": "x"}})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert_eq!(body["statusCode"], 400);

    let (_, body) = app.send(Method::GET, &uri, None, None).await;
    assert_eq!(body["project"]["thumbnail"], json!({}));
}

#[tokio::test]
async fn moderator_may_delete_but_not_update_another_users_project() {
    let app = TestApp::new();
    let owner = app.store.seed_user("ext-1", "webmaker", false).await;
    let moderator = app.store.seed_user("ext-m", "mod", true).await;
    let id = project_id(&create(&app, &owner, &token_for(&owner)).await);
    let uri = format!("/users/{}/projects/{id}", owner.id);

    let (status, body) = app
        .send(
            Method::PATCH,
            &uri,
            Some(&token_for(&moderator)),
            Some(json!({"title": "hijacked"})),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(
        body,
        json!({"statusCode": 403, "error": "Forbidden", "message": "Insufficient permissions"})
    );

    let (status, body) = app
        .send(Method::DELETE, &uri, Some(&token_for(&moderator)), None)
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "deleted");
    assert_eq!(body["project"]["title"], "create_test");
    assert!(app.store.project(id).await.is_none());
}

#[tokio::test]
async fn remix_sets_lineage() {
    let app = TestApp::new();
    let owner = app.store.seed_user("ext-1", "webmaker", false).await;
    let remixer = app.store.seed_user("ext-2", "remixer", false).await;
    let source = project_id(&create(&app, &owner, &token_for(&owner)).await);

    let (status, body) = app
        .send(
            Method::PUT,
            &format!("/users/{}/projects/{source}/remixes", remixer.id),
            Some(&token_for(&remixer)),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "created");
    assert_eq!(body["project"]["remixed_from"], source.to_string());
    assert_eq!(body["project"]["user_id"], remixer.id.to_string());
    assert_eq!(body["project"]["title"], "create_test");

    let (status, body) = app
        .send(
            Method::PUT,
            &format!("/users/{}/projects/424242/remixes", remixer.id),
            Some(&token_for(&remixer)),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Project not found");
}

#[tokio::test]
async fn update_sets_and_clears_thumbnail_variants() {
    let app = TestApp::new();
    let owner = app.store.seed_user("ext-1", "webmaker", false).await;
    let token = token_for(&owner);
    let id = project_id(&create(&app, &owner, &token).await);
    let uri = format!("/users/{}/projects/{id}", owner.id);

    let (status, body) = app
        .send(
            Method::PATCH,
            &uri,
            Some(&token),
            Some(json!({"thumbnail": {"400": "https://example.com/s.png", "1024": "https://example.com/l.png"}})),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "updated");

    let (_, body) = app
        .send(
            Method::PATCH,
            &uri,
            Some(&token),
            Some(json!({"title": "renamed", "thumbnail": {"400": ""}})),
        )
        .await;
    assert_eq!(body["project"]["title"], "renamed");
    assert_eq!(
        body["project"]["thumbnail"],
        json!({"400": "", "1024": "https://example.com/l.png"})
    );

    let (status, body) = app.send(Method::GET, &uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["project"]["title"], "renamed");
}

#[tokio::test]
async fn feature_and_unfeature_need_a_moderator() {
    let app = TestApp::new();
    let owner = app.store.seed_user("ext-1", "webmaker", false).await;
    let moderator = app.store.seed_user("ext-m", "mod", true).await;
    let id = project_id(&create(&app, &owner, &token_for(&owner)).await);
    let uri = format!("/users/{}/projects/{id}/feature", owner.id);

    let (status, body) = app
        .send(Method::PATCH, &uri, Some(&token_for(&owner)), Some(json!({"featured": true})))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Insufficient permissions");

    let (status, body) = app
        .send(Method::PATCH, &uri, Some(&token_for(&moderator)), Some(json!({"featured": true})))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["project"]["featured"], true);

    let (_, body) = app
        .send(Method::PATCH, &uri, Some(&token_for(&moderator)), Some(json!({"featured": false})))
        .await;
    assert_eq!(body["project"]["featured"], false);
}

#[tokio::test]
async fn delete_then_get_is_not_found() {
    let app = TestApp::new();
    let owner = app.store.seed_user("ext-1", "webmaker", false).await;
    let token = token_for(&owner);
    let id = project_id(&create(&app, &owner, &token).await);
    let uri = format!("/users/{}/projects/{id}", owner.id);

    let (status, body) = app.send(Method::DELETE, &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "deleted");

    let (status, body) = app.send(Method::GET, &uri, None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Project not found");
}

#[tokio::test]
async fn page_and_element_routes() {
    let app = TestApp::new();
    let owner = app.store.seed_user("ext-1", "webmaker", false).await;
    let token = token_for(&owner);
    let id = project_id(&create(&app, &owner, &token).await);
    let pages = format!("/users/{}/projects/{id}/pages", owner.id);

    let (status, body) = app
        .send(Method::POST, &pages, Some(&token), Some(json!({"x": 1, "y": 0})))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "created");
    let page_id = body["page"]["id"].as_i64().unwrap();

    let (status, body) = app
        .send(
            Method::POST,
            &format!("{pages}/{page_id}/elements"),
            Some(&token),
            Some(json!({"type": "text", "attributes": {"value": "hi"}})),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["element"]["type"], "text");
    let element_id = body["element"]["id"].as_i64().unwrap();

    let (status, body) = app
        .send(
            Method::PATCH,
            &format!("{pages}/{page_id}/elements/{element_id}"),
            Some(&token),
            Some(json!({"styles": {"top": "10px"}})),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["element"]["styles"], json!({"top": "10px"}));

    let (status, _) = app
        .send(
            Method::DELETE,
            &format!("{pages}/{page_id}/elements/{element_id}"),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .send(Method::PATCH, &format!("{pages}/{page_id}"), Some(&token), Some(json!({"y": 3})))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["page"]["y"], 3);

    let (status, _) = app
        .send(Method::DELETE, &format!("{pages}/{page_id}"), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .send(Method::DELETE, &format!("{pages}/{page_id}"), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Page not found");
}

#[tokio::test]
async fn health_reports_store_and_subscribers() {
    let app = TestApp::new();

    let (status, body) = app.send(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    app.store
        .fail_next_with(FaultPoint::Statement(StatementKind::Ping), "08006");
    let (status, body) = app.send(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["message"], "An internal server error occurred");

    let (status, body) = app.send(Method::GET, "/v1/ping", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok"}));
}
