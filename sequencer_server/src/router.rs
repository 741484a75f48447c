//! Axum router: WebSocket upgrade plus the REST surface, all backed by the
//! per-session actor registry (component C8).

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::{get, patch, post, put};
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use sequencer_core::document::MAX_MESSAGE_SIZE;
use sequencer_core::protocol::{ClientEnvelope, ErrorCode, ServerMessage};
use tokio::sync::{mpsc, oneshot};
use tower_http::cors::CorsLayer;
use tracing::{error, info};
use uuid::Uuid;

use crate::actor::ActorCommand;
use crate::error::AppError;
use crate::metrics::{self, Metrics};
use crate::registry::SessionRegistry;
use crate::rest;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/sessions", post(rest::create_session))
        .route(
            "/sessions/:id",
            get(rest::get_session).put(rest::put_session).patch(rest::patch_session),
        )
        .route("/sessions/:id/remix", post(rest::remix_session))
        .route("/sessions/:id/publish", post(rest::publish_session))
        .route("/sessions/:id/ws", get(ws_handler))
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_check))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

#[derive(Serialize)]
struct MetricsResponse(crate::metrics::MetricsSnapshot);

async fn metrics_handler() -> Json<MetricsResponse> {
    Json(MetricsResponse(metrics::global().snapshot()))
}

/// Session ids are client-chosen but must be valid UUIDv4 strings, to keep
/// them unguessable and collision-free without a central allocator.
fn is_valid_session_id(id: &str) -> bool {
    matches!(Uuid::parse_str(id), Ok(uuid) if uuid.get_version_num() == 4)
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    if !is_valid_session_id(&id) {
        return AppError::BadRequest(format!("{id} is not a valid session id")).into_response();
    }
    ws.on_upgrade(move |socket| handle_socket(socket, state, id)).into_response()
}

async fn handle_socket(socket: WebSocket, state: AppState, session_id: String) {
    let handle = match state.registry.get_or_spawn(&session_id).await {
        Ok(handle) => handle,
        Err(err) => {
            let (mut sender, _) = socket.split();
            let _ = sender
                .send(Message::Text(
                    serde_json::to_string(&ServerMessage::Error {
                        code: ErrorCode::Internal,
                        message: err.to_string(),
                    })
                    .unwrap_or_default(),
                ))
                .await;
            return;
        }
    };

    let connection_id = Uuid::new_v4().to_string();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ServerMessage>();
    let out_tx_for_errors = out_tx.clone();
    let (reply_tx, reply_rx) = oneshot::channel();

    if handle
        .tx
        .send(ActorCommand::Connect {
            connection_id: connection_id.clone(),
            tx: out_tx,
            reply: reply_tx,
        })
        .await
        .is_err()
    {
        return;
    }

    match reply_rx.await {
        Ok(Ok(())) => {}
        _ => {
            let (mut sender, _) = socket.split();
            let _ = sender
                .send(Message::Text(
                    serde_json::to_string(&ServerMessage::Error {
                        code: ErrorCode::CapacityExhausted,
                        message: "session is full".to_string(),
                    })
                    .unwrap_or_default(),
                ))
                .await;
            return;
        }
    }

    let (mut sender, mut receiver) = socket.split();

    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(j) => j,
                Err(e) => {
                    error!(error = %e, "failed to serialize server message");
                    continue;
                }
            };
            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    let frame_tx = handle.tx.clone();
    let frame_connection_id = connection_id.clone();
    let error_out_tx = out_tx_for_errors;
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            let text = match msg {
                Message::Text(text) => text,
                Message::Close(_) => break,
                _ => continue,
            };
            if text.len() > MAX_MESSAGE_SIZE {
                Metrics::incr(&metrics::global().messages_rejected);
                error!(len = text.len(), "oversize websocket frame dropped");
                let _ = error_out_tx.send(ServerMessage::Error {
                    code: ErrorCode::TooLarge,
                    message: format!("frame exceeds {MAX_MESSAGE_SIZE} bytes"),
                });
                continue;
            }
            match serde_json::from_str::<ClientEnvelope>(&text) {
                Ok(envelope) => {
                    if frame_tx
                        .send(ActorCommand::Frame {
                            connection_id: frame_connection_id.clone(),
                            envelope,
                        })
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Err(e) => {
                    Metrics::incr(&metrics::global().messages_rejected);
                    error!(error = %e, "failed to parse client frame");
                    let _ = error_out_tx.send(ServerMessage::Error {
                        code: ErrorCode::BadJson,
                        message: e.to_string(),
                    });
                }
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    }

    let _ = handle
        .tx
        .send(ActorCommand::Disconnect { connection_id })
        .await;

    info!(session = %session_id, "websocket connection closed");
}
