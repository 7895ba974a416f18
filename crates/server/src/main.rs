use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{DefaultBodyLimit, Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::Value;
use server_api::{
    delete_user, get_profile, list_activity, list_collection_value, list_users, login,
    public_profile, replace_collection_value, set_role, update_profile, ApiContext,
};
use shared::{
    domain::{CollectionKind, UserId},
    error::{ApiError, ErrorBody, ErrorCode},
    protocol::{
        ActivityEntry, AdminUserSummary, ApiResponse, CollectionData, LoginRequest,
        LoginResponse, ProfileSummary, ProfileUpdate, PublicProfile, SetRoleRequest,
    },
};
use storage::Storage;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod auth;
mod config;
mod extract;

use auth::{mint_session_token, SessionConfig, SessionUser};
use config::{load_settings, prepare_database_url};
use extract::ApiJson;

struct AppState {
    api: ApiContext,
    session: SessionConfig,
}

#[derive(Debug, Deserialize)]
struct ActivityQuery {
    limit: Option<u32>,
}

type HttpError = (StatusCode, Json<ErrorBody>);
type HttpResult<T> = Result<Json<ApiResponse<T>>, HttpError>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = load_settings();
    let database_url = prepare_database_url(&settings.database_url)?;
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;

    let state = AppState {
        api: ApiContext { storage },
        session: SessionConfig {
            secret: settings.session_secret,
            ttl_seconds: settings.session_ttl_seconds,
        },
    };
    let app = build_router(Arc::new(state), settings.max_body_bytes);

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(
        %addr,
        public_url = settings.server_public_url.as_deref().unwrap_or("-"),
        "server listening"
    );
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/auth/login", post(http_login))
        .route("/api/profile", get(http_get_profile).put(http_update_profile))
        .route(
            "/api/profile/collections/:kind",
            get(http_list_collection).put(http_replace_collection),
        )
        .route("/api/u/:username", get(http_public_profile))
        .route("/api/admin/users", get(http_list_users))
        .route("/api/admin/users/:user_id/role", put(http_set_role))
        .route("/api/admin/users/:user_id", delete(http_delete_user))
        .route("/api/admin/activity", get(http_list_activity))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz(State(state): State<Arc<AppState>>) -> (StatusCode, &'static str) {
    match state.api.storage.health_check().await {
        Ok(()) => (StatusCode::OK, "ok"),
        Err(error) => {
            error!(%error, "health check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
        }
    }
}

async fn http_login(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> HttpResult<LoginResponse> {
    let user = login(&state.api, &req.username, &req.password)
        .await
        .map_err(reject)?;
    let token = mint_session_token(&state.session, user.user_id, user.role).map_err(|e| {
        reject(ApiError::new(
            ErrorCode::Internal,
            format!("token mint failed: {e}"),
        ))
    })?;
    info!(user_id = user.user_id.0, "user logged in");
    Ok(Json(ApiResponse::ok(LoginResponse {
        token,
        user_id: user.user_id,
        role: user.role,
    })))
}

async fn http_get_profile(
    State(state): State<Arc<AppState>>,
    SessionUser(user_id): SessionUser,
) -> HttpResult<ProfileSummary> {
    let profile = get_profile(&state.api, user_id).await.map_err(reject)?;
    Ok(Json(ApiResponse::ok(profile)))
}

async fn http_update_profile(
    State(state): State<Arc<AppState>>,
    SessionUser(user_id): SessionUser,
    ApiJson(update): ApiJson<ProfileUpdate>,
) -> HttpResult<ProfileSummary> {
    let profile = update_profile(&state.api, user_id, update)
        .await
        .map_err(reject)?;
    Ok(Json(ApiResponse::ok_with_message(profile, "profile saved")))
}

async fn http_list_collection(
    State(state): State<Arc<AppState>>,
    SessionUser(user_id): SessionUser,
    Path(kind): Path<String>,
) -> HttpResult<CollectionData<Value>> {
    let kind = parse_kind(&kind)?;
    let data = list_collection_value(&state.api, user_id, kind)
        .await
        .map_err(reject)?;
    Ok(Json(ApiResponse::ok(data)))
}

async fn http_replace_collection(
    State(state): State<Arc<AppState>>,
    SessionUser(user_id): SessionUser,
    Path(kind): Path<String>,
    ApiJson(body): ApiJson<Value>,
) -> HttpResult<CollectionData<Value>> {
    let kind = parse_kind(&kind)?;
    let data = replace_collection_value(&state.api, user_id, kind, body)
        .await
        .map_err(reject)?;
    Ok(Json(ApiResponse::ok_with_message(
        data,
        format!("{kind} saved"),
    )))
}

async fn http_public_profile(
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
) -> HttpResult<PublicProfile> {
    let profile = public_profile(&state.api, &username)
        .await
        .map_err(reject)?;
    Ok(Json(ApiResponse::ok(profile)))
}

async fn http_list_users(
    State(state): State<Arc<AppState>>,
    SessionUser(actor): SessionUser,
) -> HttpResult<Vec<AdminUserSummary>> {
    let users = list_users(&state.api, actor).await.map_err(reject)?;
    Ok(Json(ApiResponse::ok(users)))
}

async fn http_set_role(
    State(state): State<Arc<AppState>>,
    SessionUser(actor): SessionUser,
    Path(user_id): Path<i64>,
    ApiJson(req): ApiJson<SetRoleRequest>,
) -> HttpResult<AdminUserSummary> {
    let user = set_role(&state.api, actor, UserId(user_id), req.role)
        .await
        .map_err(reject)?;
    Ok(Json(ApiResponse::ok(user)))
}

async fn http_delete_user(
    State(state): State<Arc<AppState>>,
    SessionUser(actor): SessionUser,
    Path(user_id): Path<i64>,
) -> Result<StatusCode, HttpError> {
    delete_user(&state.api, actor, UserId(user_id))
        .await
        .map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn http_list_activity(
    State(state): State<Arc<AppState>>,
    SessionUser(actor): SessionUser,
    Query(q): Query<ActivityQuery>,
) -> HttpResult<Vec<ActivityEntry>> {
    let limit = q.limit.unwrap_or(100).clamp(1, 500);
    let entries = list_activity(&state.api, actor, limit)
        .await
        .map_err(reject)?;
    Ok(Json(ApiResponse::ok(entries)))
}

fn parse_kind(raw: &str) -> Result<CollectionKind, HttpError> {
    raw.parse::<CollectionKind>()
        .map_err(|message| reject(ApiError::not_found(message)))
}

fn reject(err: ApiError) -> HttpError {
    let status = match err.code {
        ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorCode::Forbidden => StatusCode::FORBIDDEN,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Conflict => StatusCode::CONFLICT,
        ErrorCode::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!(message = %err.message, "request failed");
    }
    (status, Json(err.into()))
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
