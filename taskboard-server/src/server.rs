//! HTTP/WebSocket server: routing, viewer connections, and startup.
//!
//! The WebSocket lifecycle for one viewer:
//! 1. Resolve the project slug from the path; close immediately if unknown.
//! 2. Attach as a subscriber — the engine delivers the current snapshot
//!    as `init` before any future broadcast.
//! 3. Spawn a writer task draining the subscriber channel to the socket.
//! 4. Reader loop: `ping` → `pong`, `move` → engine mutation (broadcast
//!    happens inside the engine on success; a failed move broadcasts
//!    nothing). Every inbound frame refreshes liveness.
//! 5. On disconnect, unsubscribe; re-subscribing later yields a fresh
//!    `init` — there is no resumption protocol.

use std::sync::Arc;

use axum::Router;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::routing::{get, post, put};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use taskboard_proto::realtime::{self, ClientMessage, ServerMessage};
use tokio::sync::mpsc;

use crate::docs::DocumentStore;
use crate::engine::SyncEngine;
use crate::projects::ProjectRegistry;
use crate::rest;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// The sync engine (owns hub access).
    pub engine: Arc<SyncEngine>,
    /// Project directory.
    pub projects: Arc<ProjectRegistry>,
    /// Document persistence.
    pub docs: Arc<DocumentStore>,
    /// Base URL for project links returned by the REST API.
    pub public_base_url: String,
    /// Default project listing limit.
    pub list_limit: usize,
}

/// Builds the router with every REST route and the realtime channel.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/webhook/{slug}", post(rest::receive_sync))
        .route("/tasks/{task_id}/move", put(rest::move_task))
        .route("/projects/create", post(rest::create_project))
        .route("/projects", get(rest::list_projects))
        .route("/ws/{slug}", get(ws_handler))
        .with_state(state)
}

/// axum handler that upgrades an HTTP request to a WebSocket connection.
async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(slug): Path<String>,
    State(state): State<AppState>,
) -> impl axum::response::IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, slug, state))
}

/// Handles an upgraded WebSocket connection for a single viewer.
async fn handle_socket(mut socket: WebSocket, slug: String, state: AppState) {
    let Some(project) = state.projects.get_by_slug(&slug).await else {
        tracing::warn!(slug = %slug, "viewer for unknown project, closing");
        let _ = socket.send(Message::Close(None)).await;
        return;
    };

    // Channel feeding this viewer's writer task.
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    let handle = match state.engine.attach_subscriber(project.id, tx).await {
        Ok(handle) => handle,
        Err(e) => {
            tracing::warn!(slug = %slug, error = %e, "failed to attach viewer");
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };
    tracing::info!(slug = %slug, "viewer connected");

    let (mut ws_sender, mut ws_receiver) = socket.split();

    let writer_slug = slug.clone();
    let mut write_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if ws_sender.send(msg).await.is_err() {
                tracing::debug!(slug = %writer_slug, "viewer socket write failed");
                break;
            }
            if closing {
                break;
            }
        }
    });

    let reader_state = state.clone();
    let reader_handle = handle.clone();
    let reader_slug = slug.clone();
    let project_id = project.id;
    let mut read_task = tokio::spawn(async move {
        let hub = Arc::clone(reader_state.engine.hub());
        while let Some(Ok(msg)) = ws_receiver.next().await {
            hub.touch(&reader_handle).await;
            match msg {
                Message::Text(text) => match realtime::decode_client(text.as_str()) {
                    Ok(ClientMessage::Ping) => {
                        hub.send_to(
                            &reader_handle,
                            &ServerMessage::Pong {
                                timestamp: Utc::now(),
                            },
                        )
                        .await;
                    }
                    Ok(ClientMessage::Move {
                        task_id,
                        new_status,
                    }) => {
                        if let Err(e) = reader_state
                            .engine
                            .apply_move(project_id, &task_id, new_status)
                            .await
                        {
                            tracing::warn!(
                                slug = %reader_slug,
                                task_id = %task_id,
                                error = %e,
                                "move rejected"
                            );
                        }
                    }
                    Err(e) => {
                        tracing::warn!(slug = %reader_slug, error = %e, "undecodable client message");
                    }
                },
                Message::Close(_) => {
                    tracing::debug!(slug = %reader_slug, "viewer sent close frame");
                    break;
                }
                // Transport-level ping/pong and binary frames only count
                // as liveness.
                _ => {}
            }
        }
    });

    // Wait for either task to finish, then abort the other.
    tokio::select! {
        _ = &mut read_task => {
            write_task.abort();
        }
        _ = &mut write_task => {
            read_task.abort();
        }
    }

    state.engine.hub().unsubscribe(&handle).await;
    tracing::info!(slug = %slug, "viewer disconnected");
}

/// Starts the server on the given address and returns the bound address
/// and a join handle.
///
/// This is the primary entry point used by both `main.rs` and test code.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: &str,
    state: AppState,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "server error");
        }
    });

    Ok((bound_addr, handle))
}
