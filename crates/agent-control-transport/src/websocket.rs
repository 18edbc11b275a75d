//! WebSocket endpoint agents connect to.

use std::sync::Arc;

use agent_control_core::AgentCommand;
use agent_control_session::SessionRegistry;
use axum::{
    Router,
    extract::{
        Path, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
    routing::get,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

/// State for the WebSocket route.
#[derive(Clone)]
pub struct WsState {
    /// Registry connections are admitted into.
    pub registry: Arc<SessionRegistry>,
}

/// Router exposing `GET /ws/{agent_id}`.
#[must_use]
pub fn router(registry: Arc<SessionRegistry>) -> Router {
    Router::new()
        .route("/ws/{agent_id}", get(ws_handler))
        .with_state(WsState { registry })
}

/// WebSocket upgrade handler for one agent connection.
pub async fn ws_handler(
    Path(agent_id): Path<String>,
    ws: WebSocketUpgrade,
    State(state): State<WsState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, agent_id, state.registry))
}

async fn handle_socket(socket: WebSocket, agent_id: String, registry: Arc<SessionRegistry>) {
    let (mut sender, mut receiver) = socket.split();

    // Single writer per session; frames queued here reach the wire whole
    // and in queue order.
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let session = match registry.register(&agent_id, tx).await {
        Ok(session) => session,
        Err(err) => {
            tracing::warn!("rejected connection: {err}");
            // One informational message to the duplicate, then close it.
            // The incumbent session is untouched, so no teardown here.
            let notice = AgentCommand::duplicate_id_notice().to_json();
            let _ = sender.send(Message::Text(notice.into())).await;
            let _ = sender.close().await;
            return;
        }
    };
    tracing::info!("agent {agent_id} connected");

    let send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sender.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    // Read loop: inbound messages are routed strictly in arrival order.
    while let Some(msg) = receiver.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text.to_string(),
            Ok(Message::Binary(data)) => match String::from_utf8(data.to_vec()) {
                Ok(s) => s,
                Err(_) => continue,
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::error!("agent {agent_id}: websocket error: {e}");
                break;
            }
        };
        session.handle_message(&text);
    }

    registry.remove(&agent_id).await;
    send_task.abort();
    tracing::info!("agent {agent_id} disconnected");
}
