use super::*;
use axum::{body, body::Body, http::Request, response::Response};
use shared::domain::Role;
use tower::ServiceExt;

const TEST_BODY_LIMIT: usize = 4 * 1024;
const PASSWORD: &str = "correct horse battery";

async fn test_app() -> (Router, Storage) {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let api = ApiContext {
        storage: storage.clone(),
    };
    let app = build_router(
        Arc::new(AppState {
            api,
            session: SessionConfig {
                secret: "test-secret".into(),
                ttl_seconds: 300,
            },
        }),
        TEST_BODY_LIMIT,
    );
    (app, storage)
}

async fn json_body(response: Response) -> serde_json::Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}

fn login_request(username: &str, password: &str) -> Request<Body> {
    Request::post("/api/auth/login")
        .header("content-type", "application/json")
        .body(Body::from(
            serde_json::json!({ "username": username, "password": password }).to_string(),
        ))
        .expect("request")
}

async fn assert_error_body(response: Response, status: StatusCode, code: &str) -> String {
    assert_eq!(response.status(), status);
    let body = json_body(response).await;
    let parsed: ErrorBody = serde_json::from_value(body).expect("error body");
    assert!(!parsed.success);
    assert_eq!(
        serde_json::to_value(parsed.error.code).expect("code"),
        serde_json::json!(code)
    );
    parsed.error.message
}

async fn login_as(app: &Router, username: &str) -> String {
    let response = app
        .clone()
        .oneshot(login_request(username, PASSWORD))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    body["data"]["token"]
        .as_str()
        .expect("token")
        .to_string()
}

fn authed(method: &str, uri: &str, token: &str, body: Option<serde_json::Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {token}"));
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request"),
        None => builder.body(Body::empty()).expect("request"),
    }
}

#[tokio::test]
async fn healthz_reports_ok_when_storage_is_ready() {
    let (app, _storage) = test_app().await;
    let request = Request::get("/healthz")
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    assert_eq!(body.as_ref(), b"ok");
}

#[tokio::test]
async fn profile_routes_require_a_session() {
    let (app, _storage) = test_app().await;
    let request = Request::get("/api/profile")
        .body(Body::empty())
        .expect("request");
    let response = app.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "unauthorized");

    let response = app
        .oneshot(authed("GET", "/api/profile", "garbage", None))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn replace_and_fetch_collection_round_trip() {
    let (app, _storage) = test_app().await;
    let token = login_as(&app, "alice").await;

    let save = authed(
        "PUT",
        "/api/profile/collections/links",
        &token,
        Some(serde_json::json!({
            "links": [
                { "id": "b", "title": "Blog", "url": "https://blog.example.com" },
                { "id": "a", "title": "Code", "url": "https://code.example.com" }
            ]
        })),
    );
    let response = app.clone().oneshot(save).await.expect("save");
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "links saved");
    assert_eq!(body["data"]["items"][0]["id"], "b");
    assert_eq!(body["data"]["revision"], 1);

    let fetch = authed("GET", "/api/profile/collections/links", &token, None);
    let response = app.oneshot(fetch).await.expect("fetch");
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let ids: Vec<&str> = body["data"]["items"]
        .as_array()
        .expect("items")
        .iter()
        .map(|item| item["id"].as_str().expect("id"))
        .collect();
    assert_eq!(ids, vec!["b", "a"]);
}

#[tokio::test]
async fn invalid_save_returns_server_message() {
    let (app, _storage) = test_app().await;
    let token = login_as(&app, "alice").await;

    let save = authed(
        "PUT",
        "/api/profile/collections/links",
        &token,
        Some(serde_json::json!({
            "links": [{ "id": "a", "title": "Blog", "url": "not a url" }]
        })),
    );
    let response = app.oneshot(save).await.expect("save");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "validation");
    assert!(body["message"]
        .as_str()
        .expect("message")
        .contains("url must be an http(s) URL"));
}

#[tokio::test]
async fn stale_revision_returns_conflict() {
    let (app, _storage) = test_app().await;
    let token = login_as(&app, "alice").await;
    let body = serde_json::json!({
        "achievements": [{ "id": "a", "title": "Award" }],
        "expected_revision": 0
    });

    let first = authed(
        "PUT",
        "/api/profile/collections/achievements",
        &token,
        Some(body.clone()),
    );
    assert_eq!(
        app.clone().oneshot(first).await.expect("first").status(),
        StatusCode::OK
    );

    let second = authed(
        "PUT",
        "/api/profile/collections/achievements",
        &token,
        Some(body),
    );
    let response = app.oneshot(second).await.expect("second");
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn unknown_collection_is_not_found() {
    let (app, _storage) = test_app().await;
    let token = login_as(&app, "alice").await;
    let response = app
        .oneshot(authed("GET", "/api/profile/collections/skills", &token, None))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn public_profile_is_served_without_auth() {
    let (app, _storage) = test_app().await;
    let token = login_as(&app, "alice").await;
    let update = authed(
        "PUT",
        "/api/profile",
        &token,
        Some(serde_json::json!({ "display_name": "Alice", "headline": "Builder" })),
    );
    assert_eq!(
        app.clone().oneshot(update).await.expect("update").status(),
        StatusCode::OK
    );

    let request = Request::get("/api/u/alice")
        .body(Body::empty())
        .expect("request");
    let response = app.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["data"]["display_name"], "Alice");
    assert!(body["data"]["links"].as_array().expect("links").is_empty());

    let request = Request::get("/api/u/nobody")
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn admin_routes_enforce_role() {
    let (app, storage) = test_app().await;
    let user_token = login_as(&app, "alice").await;
    let admin_token = login_as(&app, "root").await;
    let root = storage
        .find_user_by_username("root")
        .await
        .expect("lookup")
        .expect("root");
    storage
        .set_role(root.user_id, Role::SuperAdmin)
        .await
        .expect("promote");

    let response = app
        .clone()
        .oneshot(authed("GET", "/api/admin/users", &user_token, None))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .clone()
        .oneshot(authed("GET", "/api/admin/users", &admin_token, None))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["data"].as_array().expect("users").len(), 2);

    let alice = storage
        .find_user_by_username("alice")
        .await
        .expect("lookup")
        .expect("alice");
    let response = app
        .clone()
        .oneshot(authed(
            "DELETE",
            &format!("/api/admin/users/{}", alice.user_id.0),
            &admin_token,
            None,
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .oneshot(authed("GET", "/api/admin/activity", &admin_token, None))
        .await
        .expect("response");
    let body = json_body(response).await;
    assert_eq!(body["data"][0]["action"], "delete_user");
}

#[tokio::test]
async fn body_for_another_collection_is_rejected() {
    let (app, _storage) = test_app().await;
    let token = login_as(&app, "alice").await;

    let save = authed(
        "PUT",
        "/api/profile/collections/links",
        &token,
        Some(serde_json::json!({
            "experiences": [{ "id": "a", "title": "Blog", "url": "https://blog.example.com" }]
        })),
    );
    let response = app.clone().oneshot(save).await.expect("save");
    let message = assert_error_body(response, StatusCode::BAD_REQUEST, "validation").await;
    assert!(message.contains("'experiences'"), "{message}");

    let fetch = authed("GET", "/api/profile/collections/links", &token, None);
    let body = json_body(app.oneshot(fetch).await.expect("fetch")).await;
    assert!(body["data"]["items"].as_array().expect("items").is_empty());
}

#[tokio::test]
async fn malformed_bodies_use_the_error_envelope() {
    let (app, _storage) = test_app().await;
    let token = login_as(&app, "alice").await;

    let missing_field = authed(
        "PUT",
        "/api/profile/collections/links",
        &token,
        Some(serde_json::json!({ "nope": [] })),
    );
    let response = app.clone().oneshot(missing_field).await.expect("response");
    let message = assert_error_body(response, StatusCode::BAD_REQUEST, "validation").await;
    assert_eq!(message, "missing 'links' array");

    let broken_json = Request::put("/api/profile/collections/links")
        .header("authorization", format!("Bearer {token}"))
        .header("content-type", "application/json")
        .body(Body::from("{\"links\": ["))
        .expect("request");
    let response = app.clone().oneshot(broken_json).await.expect("response");
    assert_error_body(response, StatusCode::BAD_REQUEST, "validation").await;

    let wrong_type = authed(
        "PUT",
        "/api/profile",
        &token,
        Some(serde_json::json!({ "is_public": "yes" })),
    );
    let response = app.oneshot(wrong_type).await.expect("response");
    assert_error_body(response, StatusCode::UNPROCESSABLE_ENTITY, "validation").await;
}

#[tokio::test]
async fn oversized_body_uses_the_error_envelope() {
    let (app, _storage) = test_app().await;
    let token = login_as(&app, "alice").await;

    let save = authed(
        "PUT",
        "/api/profile/collections/links",
        &token,
        Some(serde_json::json!({
            "links": [{ "id": "a", "title": "Blog", "url": "https://example.com", "description": "x".repeat(TEST_BODY_LIMIT) }]
        })),
    );
    let response = app.oneshot(save).await.expect("response");
    let message = assert_error_body(response, StatusCode::PAYLOAD_TOO_LARGE, "validation").await;
    assert_eq!(message, "request body is too large");
}

#[tokio::test]
async fn login_requires_the_registered_password() {
    let (app, _storage) = test_app().await;
    login_as(&app, "alice").await;

    let response = app
        .clone()
        .oneshot(login_request("alice", "guess guess guess"))
        .await
        .expect("response");
    let message = assert_error_body(response, StatusCode::UNAUTHORIZED, "unauthorized").await;
    assert_eq!(message, "invalid username or password");

    let response = app
        .oneshot(login_request("bob", "short"))
        .await
        .expect("response");
    assert_error_body(response, StatusCode::BAD_REQUEST, "validation").await;
}

#[tokio::test]
async fn bootstrapped_super_admin_cannot_log_in_without_credentials() {
    let (app, storage) = test_app().await;
    let root = storage.create_user("root").await.expect("root");
    storage
        .set_role(root, Role::SuperAdmin)
        .await
        .expect("promote");

    for password in ["", PASSWORD] {
        let response = app
            .clone()
            .oneshot(login_request("root", password))
            .await
            .expect("response");
        assert_error_body(response, StatusCode::UNAUTHORIZED, "unauthorized").await;
    }

    let missing_password = Request::post("/api/auth/login")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"username":"root"}"#))
        .expect("request");
    let response = app.oneshot(missing_password).await.expect("response");
    assert_error_body(response, StatusCode::UNPROCESSABLE_ENTITY, "validation").await;
}
