//! Control-plane front door.
//!
//! Agents connect over `GET /ws/{agent_id}`; callers drive them through
//! the HTTP routes below. Run with: cargo run -p control-server
//!
//! Every route answers HTTP 200 with a typed `status` body; per-agent
//! failures never tear the caller's request down.

use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use agent_control_core::DEFAULT_CHUNK_SIZE;
use agent_control_session::{
    DEFAULT_TIMEOUT, DispatchError, Dispatcher, SessionRegistry, TransferError, TransferOutcome,
};
use anyhow::Context;
use axum::{
    Json, Router,
    extract::{Multipart, Path, Query, State},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Where uploads land on the agent unless the caller says otherwise.
const DEFAULT_TARGET_PATH: &str = "incoming";

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    registry: Arc<SessionRegistry>,
    dispatcher: Dispatcher,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let registry = Arc::new(SessionRegistry::new());
    let state = AppState {
        registry: Arc::clone(&registry),
        dispatcher: Dispatcher::new(Arc::clone(&registry)),
    };

    let app = Router::new()
        .route("/agents", get(list_agents))
        .route("/send/{agent_id}", post(send_command))
        .route("/upload/{agent_id}", post(upload_file))
        .route("/upload-dir/{agent_id}", post(upload_dir))
        .with_state(state)
        .merge(agent_control_transport::router(registry))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = std::env::var("AGENT_CONTROL_ADDR")
        .unwrap_or_else(|_| "127.0.0.1:8000".to_owned())
        .parse()
        .context("invalid AGENT_CONTROL_ADDR")?;
    tracing::info!("control plane listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn list_agents(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "agents": state.registry.list_active().await }))
}

#[derive(Deserialize)]
struct SendParams {
    timeout_secs: Option<u64>,
}

/// Body is the command payload: a JSON object to forward as-is, or any
/// other text to wrap as a plain command.
async fn send_command(
    Path(agent_id): Path<String>,
    Query(params): Query<SendParams>,
    State(state): State<AppState>,
    command: String,
) -> Json<Value> {
    let timeout = params
        .timeout_secs
        .map_or(DEFAULT_TIMEOUT, Duration::from_secs);
    match state.dispatcher.dispatch(&agent_id, &command, timeout).await {
        Ok(reply) => Json(json!({ "status": "ok", "result": reply })),
        Err(err) => Json(json!({ "status": status_of(err) })),
    }
}

async fn upload_file(
    Path(agent_id): Path<String>,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Json<Value> {
    let mut target_path = DEFAULT_TARGET_PATH.to_owned();
    let mut filename = None;
    let mut payload = None;

    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().map(ToOwned::to_owned);
        match name.as_deref() {
            Some("target_path") => {
                if let Ok(text) = field.text().await {
                    target_path = text;
                }
            }
            Some("file") => {
                filename = field.file_name().map(ToOwned::to_owned);
                payload = field.bytes().await.ok();
            }
            _ => {}
        }
    }

    let Some(payload) = payload else {
        return Json(json!({ "status": "bad_request", "message": "missing file field" }));
    };
    let filename = filename.unwrap_or_else(|| "upload.bin".to_owned());

    let outcome = state
        .dispatcher
        .send_file(
            &agent_id,
            &target_path,
            &filename,
            payload,
            DEFAULT_CHUNK_SIZE,
            DEFAULT_TIMEOUT,
        )
        .await;
    Json(transfer_response(&filename, outcome))
}

#[derive(Deserialize)]
struct UploadDirRequest {
    /// Server-local directory to pack and push.
    dir: PathBuf,
    #[serde(default = "default_target_path")]
    target_path: String,
}

fn default_target_path() -> String {
    DEFAULT_TARGET_PATH.to_owned()
}

async fn upload_dir(
    Path(agent_id): Path<String>,
    State(state): State<AppState>,
    Json(req): Json<UploadDirRequest>,
) -> Json<Value> {
    let filename = req.dir.file_name().map_or_else(
        || "archive.zip".to_owned(),
        |name| format!("{}.zip", name.to_string_lossy()),
    );
    let outcome = state
        .dispatcher
        .send_dir(
            &agent_id,
            &req.target_path,
            &req.dir,
            DEFAULT_CHUNK_SIZE,
            DEFAULT_TIMEOUT,
        )
        .await;
    Json(transfer_response(&filename, outcome))
}

const fn status_of(err: DispatchError) -> &'static str {
    match err {
        DispatchError::Offline => "offline",
        DispatchError::Timeout => "timeout",
        DispatchError::Disconnected => "disconnected",
    }
}

fn transfer_response(filename: &str, outcome: Result<TransferOutcome, TransferError>) -> Value {
    match outcome {
        Ok(done) => json!({
            "status": "ok",
            "filename": filename,
            "chunks_sent": done.chunks_sent,
            "result": done.reply,
        }),
        Err(TransferError::Aborted { sent, total, cause }) => json!({
            "status": "partial",
            "filename": filename,
            "chunks_sent": sent,
            "total_chunks": total,
            "cause": status_of(cause),
        }),
        Err(err) => json!({
            "status": "failed",
            "filename": filename,
            "message": err.to_string(),
        }),
    }
}
