use axum::Json;
use axum::body::Body;
use axum::extract::{ConnectInfo, Query, State};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::{ApiError, AppState, ChannelSink};
use crate::audit::{Actor, AuditEvent};
use crate::auth::Session;
use crate::file_ops::{DELETED_MESSAGE, FileView};
use crate::login::authenticate;

pub const SESSION_COOKIE: &str = "sfsearch_session";
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Records buffered between the search thread and the response body.
const STREAM_CHANNEL_CAPACITY: usize = 32;

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default, alias = "search")]
    pub q: String,
}

#[derive(Debug, Deserialize)]
pub struct FileParams {
    #[serde(default, alias = "file")]
    pub path: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user: String,
    pub csrf_token: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub csrf_token: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

fn session_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
}

fn presented_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(CSRF_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
}

fn anonymous(addr: SocketAddr) -> Actor {
    Actor {
        user: None,
        ip: Some(addr.ip().to_string()),
    }
}

/// Session and token check shared by every protected route. Denials are
/// audited before being turned into an error response.
fn authorize(
    state: &AppState,
    headers: &HeaderMap,
    method: &Method,
    addr: SocketAddr,
) -> Result<(Session, Actor), ApiError> {
    let sid = session_id(headers);
    let token = presented_token(headers);
    match state
        .authorizer
        .authorize(sid.as_deref(), token.as_deref(), method.as_str())
    {
        Ok(session) => {
            let actor = Actor {
                user: Some(session.user_id.clone()),
                ip: Some(addr.ip().to_string()),
            };
            Ok((session, actor))
        }
        Err(e) => {
            let actor = Actor {
                user: state.authorizer.user_of(sid.as_deref()),
                ip: Some(addr.ip().to_string()),
            };
            warn!(
                "Denied {method} request from {} ({}): {e}",
                addr.ip(),
                actor.user.as_deref().unwrap_or("anonymous")
            );
            state
                .audit
                .record(AuditEvent::new("request", "error", e.to_string()).by(&actor));
            Err(e.into())
        }
    }
}

fn session_cookie(value: &str, max_age: Option<u64>) -> Result<HeaderValue, ApiError> {
    let mut cookie = format!("{SESSION_COOKIE}={value}; Path=/; HttpOnly; SameSite=Strict");
    if let Some(max_age) = max_age {
        cookie.push_str(&format!("; Max-Age={max_age}"));
    }
    HeaderValue::from_str(&cookie).map_err(|e| ApiError::internal(e.to_string()))
}

pub(crate) async fn method_not_allowed() -> ApiError {
    ApiError::new(StatusCode::METHOD_NOT_ALLOWED, "Invalid request method")
}

pub(crate) async fn health() -> &'static str {
    "ok"
}

/// POST /login
pub(crate) async fn login(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(payload): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    let username = payload.username.trim().to_string();
    let config = state.config.clone();
    let (user, password) = (username.clone(), payload.password);
    let accepted = tokio::task::spawn_blocking(move || authenticate(&config, &user, &password))
        .await
        .map_err(|e| ApiError::internal(format!("Login task failed: {e}")))?;
    if !accepted {
        state.audit.record(
            AuditEvent::new("login", "error", format!("Rejected login for {username:?}"))
                .by(&anonymous(addr)),
        );
        return Err(ApiError::unauthorized("Invalid username or password."));
    }

    let sid = state.authorizer.create_session(&username);
    let csrf_token = state.authorizer.issue_token(Some(&sid))?;
    let actor = Actor {
        user: Some(username.clone()),
        ip: Some(addr.ip().to_string()),
    };
    state
        .audit
        .record(AuditEvent::new("login", "success", "Session started").by(&actor));
    info!("User {username} logged in from {}", addr.ip());

    let cookie = session_cookie(&sid, None)?;
    let body = Json(LoginResponse {
        user: username,
        csrf_token,
    });
    Ok(([(header::SET_COOKIE, cookie)], body).into_response())
}

/// POST /logout
pub(crate) async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    if let Some(sid) = session_id(&headers) {
        state.authorizer.end_session(&sid);
    }
    let cookie = session_cookie("", Some(0))?;
    let body = Json(MessageResponse {
        message: "Logged out".to_string(),
    });
    Ok(([(header::SET_COOKIE, cookie)], body).into_response())
}

/// GET /api/csrf-token
pub(crate) async fn csrf_token(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<TokenResponse>, ApiError> {
    let sid = session_id(&headers);
    let csrf_token = state
        .authorizer
        .issue_token(sid.as_deref())
        .map_err(|_| ApiError::unauthorized("Unauthorized"))?;
    Ok(Json(TokenResponse { csrf_token }))
}

/// GET /metrics
pub(crate) async fn metrics(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    method: Method,
    headers: HeaderMap,
) -> Result<String, ApiError> {
    authorize(&state, &headers, &method, addr)?;
    Ok(state.metrics.gather())
}

/// GET /api/search?q=<text>
///
/// Streams NDJSON records while the tree is walked. Dropping the connection
/// closes the channel, which stops the walk at the next file.
pub(crate) async fn search(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    method: Method,
    headers: HeaderMap,
    Query(params): Query<SearchParams>,
) -> Result<Response, ApiError> {
    let (session, _) = authorize(&state, &headers, &method, addr)?;
    info!("User {} searching for {:?}", session.user_id, params.q);

    let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
    let streamer = state.streamer.clone();
    let cancel = state.shutdown.child_token();
    tokio::task::spawn_blocking(move || {
        let mut sink = ChannelSink::new(tx);
        streamer.stream(&params.q, &mut sink, &cancel);
    });

    let body = Body::from_stream(ReceiverStream::new(rx));
    Ok((
        [
            (header::CONTENT_TYPE, "application/x-ndjson"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        body,
    )
        .into_response())
}

/// GET /api/files/view?path=<p>
pub(crate) async fn view(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    method: Method,
    headers: HeaderMap,
    Query(params): Query<FileParams>,
) -> Result<Json<FileView>, ApiError> {
    authorize(&state, &headers, &method, addr)?;
    if params.path.trim().is_empty() {
        return Err(ApiError::bad_request("Invalid file parameter"));
    }

    let file_ops = state.file_ops.clone();
    let view = tokio::task::spawn_blocking(move || file_ops.view(&params.path))
        .await
        .map_err(|e| ApiError::internal(format!("View task failed: {e}")))??;
    Ok(Json(view))
}

/// POST /api/files/delete?path=<p>
pub(crate) async fn delete(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    method: Method,
    headers: HeaderMap,
    Query(params): Query<FileParams>,
) -> Result<Json<MessageResponse>, ApiError> {
    let (_, actor) = authorize(&state, &headers, &method, addr)?;
    if params.path.trim().is_empty() {
        return Err(ApiError::bad_request("Invalid file parameter"));
    }

    let file_ops = state.file_ops.clone();
    tokio::task::spawn_blocking(move || file_ops.delete(&params.path, &actor))
        .await
        .map_err(|e| ApiError::internal(format!("Delete task failed: {e}")))??;
    state.metrics.files_deleted.inc();
    Ok(Json(MessageResponse {
        message: DELETED_MESSAGE.to_string(),
    }))
}
