//! HTTP binding for the search, view, delete and token operations.

use axum::Router;
use axum::http::{HeaderValue, header};
use axum::routing::{get, post};
use log::{error, info};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::audit::{AuditLog, FileAuditLog};
use crate::auth::{Clock, MemorySessionStore, RequestAuthorizer, SessionStore, SystemClock, TokenPolicy};
use crate::config::Config;
use crate::file_ops::FileOps;
use crate::metrics::Metrics;
use crate::streamer::ResultStreamer;

pub mod error;
mod handlers;
mod sink;

pub use error::ApiError;
pub use handlers::{CSRF_HEADER, SESSION_COOKIE};
pub use sink::ChannelSink;

const CONTENT_SECURITY_POLICY: &str = "default-src 'self'; frame-ancestors 'none'";
const STRICT_TRANSPORT_SECURITY: &str = "max-age=31536000; includeSubDomains";

pub struct AppState {
    pub config: Arc<Config>,
    pub authorizer: RequestAuthorizer,
    pub streamer: Arc<ResultStreamer>,
    pub file_ops: Arc<FileOps>,
    pub audit: Arc<dyn AuditLog>,
    pub metrics: Metrics,
    /// Cancelled on shutdown; every running search holds a child token.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: Arc<Config>) -> crate::Result<Self> {
        let audit: Arc<dyn AuditLog> = Arc::new(FileAuditLog::new(&config.security.audit_log));
        Self::with_parts(
            config,
            Arc::new(MemorySessionStore::new()),
            Arc::new(SystemClock),
            audit,
        )
    }

    pub fn with_parts(
        config: Arc<Config>,
        store: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
        audit: Arc<dyn AuditLog>,
    ) -> crate::Result<Self> {
        let metrics = Metrics::new()?;
        Ok(Self {
            authorizer: RequestAuthorizer::new(store, clock, TokenPolicy::from_config(&config)),
            streamer: Arc::new(ResultStreamer::new(config.clone(), metrics.clone())),
            file_ops: Arc::new(FileOps::new(config.clone(), audit.clone())),
            audit,
            metrics,
            config,
            shutdown: CancellationToken::new(),
        })
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/login", post(handlers::login))
        .route("/logout", post(handlers::logout))
        .route("/metrics", get(handlers::metrics))
        .route("/api/csrf-token", get(handlers::csrf_token))
        .route("/api/search", get(handlers::search))
        .route("/api/files/view", get(handlers::view))
        .route(
            "/api/files/delete",
            post(handlers::delete).fallback(handlers::method_not_allowed),
        )
        .with_state(state)
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_static(CONTENT_SECURITY_POLICY),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::STRICT_TRANSPORT_SECURITY,
            HeaderValue::from_static(STRICT_TRANSPORT_SECURITY),
        ))
}

pub struct Server {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
    state: Arc<AppState>,
}

impl Server {
    /// Binds `bind` and serves in a background task.
    pub async fn start(state: Arc<AppState>, bind: &str) -> crate::Result<Self> {
        let app = router(state.clone());
        let listener = TcpListener::bind(bind).await?;
        let addr = listener.local_addr()?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let searches = state.shutdown.clone();

        let handle = tokio::spawn(async move {
            let result = axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
                searches.cancel();
            })
            .await;
            if let Err(e) = result {
                error!("Server error: {e}");
            }
        });

        info!("Listening on http://{addr}");
        Ok(Server {
            addr,
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
            state,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    pub fn shutdown(&mut self) {
        if let Some(sender) = self.shutdown.take() {
            let _ = sender.send(());
        }
    }

    /// Signals shutdown and waits for in-flight connections to drain.
    pub async fn stop(mut self) {
        self.shutdown();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.shutdown();
    }
}
