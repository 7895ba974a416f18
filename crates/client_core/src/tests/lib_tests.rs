use super::*;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response as AxumResponse},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use shared::{
    domain::{CollectionKind, Role, UserId},
    error::ApiError,
};
use std::{collections::HashMap, sync::Arc};
use tokio::{net::TcpListener, sync::Mutex};

const TOKEN: &str = "test-token";
const PASSWORD: &str = "alice-password";

#[derive(Clone, Default)]
struct ServerState {
    bodies: Arc<Mutex<HashMap<String, Value>>>,
    revisions: Arc<Mutex<HashMap<String, i64>>>,
}

fn error_response(status: StatusCode, code: ErrorCode, message: &str) -> AxumResponse {
    let body: ErrorBody = ApiError::new(code, message).into();
    (status, Json(body)).into_response()
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {TOKEN}"))
}

async fn handle_login(Json(req): Json<LoginRequest>) -> AxumResponse {
    if req.username != "alice" || req.password != PASSWORD {
        return error_response(
            StatusCode::UNAUTHORIZED,
            ErrorCode::Unauthorized,
            "invalid username or password",
        );
    }
    Json(ApiResponse::ok(LoginResponse {
        token: TOKEN.into(),
        user_id: UserId(7),
        role: Role::User,
    }))
    .into_response()
}

async fn handle_get_collection(
    State(state): State<ServerState>,
    Path(kind): Path<String>,
    headers: HeaderMap,
) -> AxumResponse {
    if !authorized(&headers) {
        return error_response(StatusCode::UNAUTHORIZED, ErrorCode::Unauthorized, "missing bearer token");
    }
    let Ok(kind) = kind.parse::<CollectionKind>() else {
        return error_response(StatusCode::NOT_FOUND, ErrorCode::NotFound, "unknown collection");
    };
    let items = state
        .bodies
        .lock()
        .await
        .get(kind.as_str())
        .and_then(|body| body.get(kind.wire_field()).cloned())
        .unwrap_or_else(|| json!([]));
    let revision = state
        .revisions
        .lock()
        .await
        .get(kind.as_str())
        .copied()
        .unwrap_or(0);
    Json(ApiResponse::ok(json!({ "items": items, "revision": revision }))).into_response()
}

async fn handle_put_collection(
    State(state): State<ServerState>,
    Path(kind): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> AxumResponse {
    if !authorized(&headers) {
        return error_response(StatusCode::UNAUTHORIZED, ErrorCode::Unauthorized, "missing bearer token");
    }
    if kind == "achievements" {
        return (StatusCode::BAD_GATEWAY, "upstream unavailable").into_response();
    }
    if kind == "education" {
        return error_response(
            StatusCode::PAYLOAD_TOO_LARGE,
            ErrorCode::Validation,
            "request body is too large",
        );
    }
    let Ok(kind) = kind.parse::<CollectionKind>() else {
        return error_response(StatusCode::NOT_FOUND, ErrorCode::NotFound, "unknown collection");
    };
    let items = body.get(kind.wire_field()).cloned().unwrap_or_else(|| json!([]));
    let rejected = items
        .as_array()
        .into_iter()
        .flatten()
        .any(|item| item["title"] == "reject me");
    if rejected {
        return error_response(
            StatusCode::BAD_REQUEST,
            ErrorCode::Validation,
            "links item 0: title is not allowed",
        );
    }

    let mut revisions = state.revisions.lock().await;
    let revision = revisions.entry(kind.as_str().to_string()).or_insert(0);
    if let Some(expected) = body.get("expected_revision").and_then(Value::as_i64) {
        if expected != *revision {
            return error_response(StatusCode::CONFLICT, ErrorCode::Conflict, "stale revision");
        }
    }
    *revision += 1;
    let revision = *revision;
    state
        .bodies
        .lock()
        .await
        .insert(kind.as_str().to_string(), body);

    Json(ApiResponse::ok_with_message(
        json!({ "items": items, "revision": revision }),
        format!("{kind} saved"),
    ))
    .into_response()
}

async fn handle_public_profile(Path(username): Path<String>) -> AxumResponse {
    error_response(
        StatusCode::NOT_FOUND,
        ErrorCode::NotFound,
        &format!("profile '{username}' not found"),
    )
}

async fn spawn_profile_server() -> anyhow::Result<(String, ServerState)> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let state = ServerState::default();
    let app = Router::new()
        .route("/api/auth/login", post(handle_login))
        .route(
            "/api/profile/collections/:kind",
            get(handle_get_collection).put(handle_put_collection),
        )
        .route("/api/u/:username", get(handle_public_profile))
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((format!("http://{addr}"), state))
}

async fn logged_in_client() -> (ProfileClient, ServerState) {
    let (server_url, state) = spawn_profile_server().await.expect("spawn server");
    let mut client = ProfileClient::new(&server_url).expect("client");
    let login = client.login("alice", PASSWORD).await.expect("login");
    assert_eq!(login.user_id, UserId(7));
    (client, state)
}

#[tokio::test]
async fn login_stores_token() {
    let (client, _state) = logged_in_client().await;
    assert_eq!(client.token(), Some(TOKEN));
}

#[tokio::test]
async fn wrong_password_is_refused_without_a_token() {
    let (server_url, _state) = spawn_profile_server().await.expect("spawn server");
    let mut client = ProfileClient::new(&server_url).expect("client");
    let err = client
        .login("alice", "not-the-password")
        .await
        .expect_err("refused");
    assert!(err.to_string().contains("invalid username or password"));
    assert_eq!(client.token(), None);
}

#[tokio::test]
async fn oversized_body_rejection_is_not_retryable() {
    let (client, _state) = logged_in_client().await;
    let mut editor = OrderedCollectionEditor::new(Vec::<Education>::new(), Some(0));
    editor.start_edit();
    editor
        .add(Education {
            institution: "MIT".into(),
            degree: "BSc".into(),
            ..Education::default()
        })
        .expect("add");

    let err = editor.save(&client).await.expect_err("too large");
    assert_eq!(
        err,
        EditorError::ValidationRejected("request body is too large".into())
    );
    assert!(!err.is_retryable());
    assert!(editor.is_editing());
}

#[tokio::test]
async fn session_save_sends_the_collection_field_and_revision() {
    let (client, state) = logged_in_client().await;
    let mut session = client.load_session().await.expect("session");
    assert_eq!(session.editor::<Link>().revision(), Some(0));

    session.start_edit::<Link>();
    let editor = session.editor_mut::<Link>();
    editor
        .add(Link::new("Blog", "https://blog.example.com"))
        .expect("add");
    editor
        .add(Link::new("Code", "https://code.example.com"))
        .expect("add");
    editor.move_up(1).expect("move");
    session.save::<Link, _>(&client).await.expect("save");

    let sent = state
        .bodies
        .lock()
        .await
        .get("links")
        .cloned()
        .expect("server received links");
    assert_eq!(sent["expected_revision"], 0);
    assert_eq!(sent["links"][0]["title"], "Code");
    assert_eq!(sent["links"][1]["title"], "Blog");

    let links = session.editor::<Link>();
    assert!(!links.is_editing());
    assert_eq!(links.revision(), Some(1));

    let fetched = client.fetch_collection::<Link>().await.expect("fetch");
    assert_eq!(fetched.items, links.committed());
    assert_eq!(fetched.revision, 1);
}

#[tokio::test]
async fn experience_uses_plural_wire_field() {
    let (client, state) = logged_in_client().await;
    let item = WorkExperience {
        id: "job".into(),
        company: "Acme".into(),
        position: "Engineer".into(),
        start_date: "2020-01".into(),
        ..WorkExperience::default()
    };
    let ack = client
        .replace_all(vec![item.clone()], None)
        .await
        .expect("replace");
    assert_eq!(ack.items, vec![item]);
    assert_eq!(ack.revision, Some(1));

    let bodies = state.bodies.lock().await;
    let sent = bodies.get("experience").expect("stored");
    assert!(sent.get("experiences").is_some());
    assert!(sent.get("expected_revision").is_none());
}

#[tokio::test]
async fn server_validation_message_reaches_the_editor() {
    let (client, _state) = logged_in_client().await;
    let mut editor = OrderedCollectionEditor::new(Vec::<Link>::new(), Some(0));
    editor.start_edit();
    editor
        .add(Link::new("reject me", "https://example.com"))
        .expect("add");

    let err = editor.save(&client).await.expect_err("rejected");
    assert_eq!(
        err,
        EditorError::ValidationRejected("links item 0: title is not allowed".into())
    );
    assert!(editor.is_editing());
    assert_eq!(editor.working().len(), 1);
}

#[tokio::test]
async fn stale_revision_maps_to_conflict() {
    let (client, _state) = logged_in_client().await;
    let err = client
        .replace_all(vec![Link::new("Blog", "https://blog.example.com")], Some(9))
        .await
        .expect_err("stale");
    assert!(matches!(
        err,
        PersistError::Rejected {
            code: ErrorCode::Conflict,
            ..
        }
    ));
}

#[tokio::test]
async fn missing_token_and_gateway_errors_are_persist_failures() {
    let (server_url, _state) = spawn_profile_server().await.expect("spawn server");
    let anonymous = ProfileClient::new(&server_url).expect("client");
    let err = anonymous
        .replace_all(vec![Link::new("Blog", "https://blog.example.com")], None)
        .await
        .expect_err("unauthorized");
    assert_eq!(
        err,
        PersistError::Rejected {
            code: ErrorCode::Unauthorized,
            message: "missing bearer token".into()
        }
    );
    assert!(EditorError::from(err).is_retryable());

    let client = anonymous.with_token(TOKEN);
    let award = Achievement {
        id: "a".into(),
        title: "Award".into(),
        ..Achievement::default()
    };
    let err = client
        .replace_all(vec![award], None)
        .await
        .expect_err("bad gateway");
    assert!(matches!(err, PersistError::Transport(ref msg) if msg.contains("502")));
}

#[tokio::test]
async fn unreachable_server_is_a_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let client = ProfileClient::new(&format!("http://{addr}"))
        .expect("client")
        .with_token(TOKEN);
    let err = client
        .replace_all(vec![Link::new("Blog", "https://blog.example.com")], None)
        .await
        .expect_err("connection refused");
    assert!(matches!(err, PersistError::Transport(_)));
}

#[tokio::test]
async fn public_profile_error_carries_server_message() {
    let (client, _state) = logged_in_client().await;
    let err = client.public_profile("ghost").await.expect_err("not found");
    assert!(err.to_string().contains("profile 'ghost' not found"));
}

#[test]
fn base_url_keeps_path_prefix() {
    let client = ProfileClient::new("http://localhost:8080/profiles").expect("client");
    let url = client.endpoint("api/profile").expect("endpoint");
    assert_eq!(url.as_str(), "http://localhost:8080/profiles/api/profile");
    assert!(ProfileClient::new("not a url").is_err());
}
