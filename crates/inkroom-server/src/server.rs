//! HTTP routes and the per-connection WebSocket loop.

use std::sync::Arc;

use axum::{
    Router,
    extract::{
        Query, State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade, close_code},
    },
    http::HeaderMap,
    response::IntoResponse,
    routing::{get, post},
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use crate::admission::{self, ConnectParams};
use crate::config::ServerConfig;
use crate::invite::{self, Mailer};
use crate::registry::SessionRegistry;
use crate::relay;

/// Shared application state
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub config: ServerConfig,
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    pub fn new(config: ServerConfig, mailer: Arc<dyn Mailer>) -> Self {
        Self {
            registry: Arc::new(SessionRegistry::new()),
            config,
            mailer,
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/ws", get(ws_handler))
        .route("/api/invite", post(invite::invite))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Index page
async fn index() -> &'static str {
    "InkRoom Relay Server - Connect via WebSocket at /ws?sessionId=<id>&token=<credential>"
}

/// Health check
async fn health() -> &'static str {
    "ok"
}

/// WebSocket upgrade handler
async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let credential = params.credential(&headers).map(str::to_string);
    let session_id = params.session_id;
    ws.on_upgrade(move |socket| handle_socket(socket, state, session_id, credential))
}

/// Admit a connection, then pump frames until either side goes away.
async fn handle_socket(
    mut socket: WebSocket,
    state: Arc<AppState>,
    session_id: Option<String>,
    credential: Option<String>,
) {
    let (tx, mut rx) = mpsc::channel(state.config.outbound_buffer);

    let conn = match admission::admit(
        &state.registry,
        session_id.as_deref(),
        credential.as_deref(),
        tx,
    ) {
        Ok(conn) => conn,
        Err(e) => {
            warn!(session = ?session_id, reason = %e, "Rejecting connection");
            let frame = CloseFrame {
                code: close_code::POLICY,
                reason: e.to_string().into(),
            };
            let _ = socket.send(Message::Close(Some(frame))).await;
            return;
        }
    };

    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            // Frames from this client, handled in arrival order
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        relay::handle_text(&conn, text.as_str());
                    }
                    Some(Ok(Message::Binary(_))) => {
                        warn!(connection = %conn.id(), "Dropping binary frame");
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // Ignore ping/pong
                    Some(Err(e)) => {
                        warn!(connection = %conn.id(), error = %e, "WebSocket error");
                        break;
                    }
                }
            }

            // Messages relayed to this client
            outbound = rx.recv() => {
                let Some(server_msg) = outbound else { break };
                match server_msg.encode() {
                    Ok(json) => {
                        if sender.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => error!(connection = %conn.id(), error = %e, "Failed to encode message"),
                }
            }
        }
    }

    info!(connection = %conn.id(), "Connection closed");
}
