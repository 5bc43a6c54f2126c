//! HTTP request adapter: one request in, one enqueued job, one JSON reply.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use axum::extract::{ConnectInfo, Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use serde::Serialize;
use tokio::time::Instant;
use tower_http::timeout::TimeoutLayer;
use tracing::{info, trace, warn};

use crate::error::ExecError;
use crate::manager::ScriptManager;

/// Upper bound on one request end to end, body read included. A client
/// trickling bytes cannot hold a connection open past this; `script_timeout`
/// must stay below it.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared state handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<ScriptManager>,
    pub max_script_size: usize,
}

/// Wire shape of every reply. Exactly one of the fields carries meaning:
/// `error` is empty on success, `result` is null on failure.
#[derive(Debug, Serialize)]
pub struct ScriptResponse {
    pub result: serde_json::Value,
    pub error: String,
}

/// Certificate and key locations for the optional TLS listener.
pub struct TlsFiles {
    pub cert: PathBuf,
    pub key: PathBuf,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/data", post(execute_script))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .with_state(state)
}

/// Bind `localhost:<port>` and serve until the handle shuts us down.
pub async fn serve(
    state: AppState,
    port: u16,
    tls: Option<TlsFiles>,
    handle: Handle,
) -> anyhow::Result<()> {
    let app = router(state).into_make_service_with_connect_info::<SocketAddr>();
    let addr = SocketAddr::from(([127, 0, 0, 1], port));

    match tls {
        Some(files) => {
            if !file_exists(&files.cert) || !file_exists(&files.key) {
                bail!(
                    "certificate file ({}) or key file ({}) does not exist",
                    files.cert.display(),
                    files.key.display()
                );
            }
            info!(
                %addr,
                cert = %files.cert.display(),
                key = %files.key.display(),
                "starting https server"
            );
            let config = RustlsConfig::from_pem_file(&files.cert, &files.key)
                .await
                .context("failed to load tls certificate or key")?;
            axum_server::bind_rustls(addr, config)
                .handle(handle)
                .serve(app)
                .await
                .context("https server error")?;
        }
        None => {
            info!(%addr, "starting http server");
            axum_server::bind(addr)
                .handle(handle)
                .serve(app)
                .await
                .context("http server error")?;
        }
    }
    Ok(())
}

fn file_exists(path: &Path) -> bool {
    path.is_file()
}

async fn execute_script(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
) -> Response {
    let started = Instant::now();
    info!(
        method = %request.method(),
        path = %request.uri().path(),
        %addr,
        "received request"
    );

    // Mirror of the executor's cap: read at most one byte past the limit so
    // an oversized body is detected without buffering it whole.
    let limit = state.max_script_size.saturating_add(1);
    let body = match axum::body::to_bytes(request.into_body(), limit).await {
        Ok(body) => body,
        Err(e) => {
            warn!(error = %e, "failed to read request body within size limit");
            return reply(StatusCode::BAD_REQUEST, Err(ExecError::ScriptTooLarge), started);
        }
    };
    if body.len() > state.max_script_size {
        warn!(script_length = body.len(), "script too large");
        return reply(StatusCode::BAD_REQUEST, Err(ExecError::ScriptTooLarge), started);
    }

    if !state.manager.is_accepting() {
        warn!("rejected script, the system is not accepting scripts");
        return reply(
            StatusCode::SERVICE_UNAVAILABLE,
            Err(ExecError::NotAccepting),
            started,
        );
    }

    info!("executing script");
    trace!(script = %String::from_utf8_lossy(&body));

    let result = state.manager.execute_with_timeout(body).await;
    let status = match &result {
        Ok(_) => StatusCode::OK,
        Err(e) => status_for(e),
    };
    reply(status, result, started)
}

fn status_for(error: &ExecError) -> StatusCode {
    match error {
        ExecError::ScriptTooLarge => StatusCode::BAD_REQUEST,
        ExecError::NoWorkerAvailable | ExecError::NotAccepting => StatusCode::SERVICE_UNAVAILABLE,
        ExecError::Timeout | ExecError::Interrupted | ExecError::Engine(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn reply(
    status: StatusCode,
    result: Result<serde_json::Value, ExecError>,
    started: Instant,
) -> Response {
    let body = match result {
        Ok(value) => {
            info!("script executed successfully, returning result");
            ScriptResponse {
                result: value,
                error: String::new(),
            }
        }
        Err(e) => ScriptResponse {
            result: serde_json::Value::Null,
            error: e.to_string(),
        },
    };
    info!(status = %status, took = ?started.elapsed(), "request processed");
    (status, Json(body)).into_response()
}
