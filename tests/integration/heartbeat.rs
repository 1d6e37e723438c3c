// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc,
    clippy::missing_docs_in_private_items
)]

//! Integration tests for subscriber liveness.
//!
//! A viewer that stops sending frames must be evicted after the liveness
//! window; a viewer that keeps pinging must survive sweeps. Windows here
//! are shrunk to keep the tests fast.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use taskboard_proto::realtime::{self, ClientMessage, ServerMessage};
use taskboard_server::docs::DocumentStore;
use taskboard_server::engine::SyncEngine;
use taskboard_server::hub::{self, SubscriberHub};
use taskboard_server::projects::ProjectRegistry;
use taskboard_server::server::{self, AppState};
use taskboard_server::store::TaskStore;
use tokio_tungstenite::tungstenite;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Stack {
    addr: std::net::SocketAddr,
    state: AppState,
    hub: Arc<SubscriberHub>,
    _dir: tempfile::TempDir,
}

/// Starts the stack with a fast reaper: 50 ms sweeps, 300 ms window.
async fn start_stack_with_reaper() -> Stack {
    let dir = tempfile::tempdir().unwrap();
    let projects = Arc::new(
        ProjectRegistry::load(dir.path().join("projects.json"))
            .await
            .unwrap(),
    );
    let docs = Arc::new(DocumentStore::new(dir.path().to_path_buf()));
    let store = Arc::new(TaskStore::new());
    let hub = Arc::new(SubscriberHub::new());
    let engine = Arc::new(SyncEngine::new(
        store,
        Arc::clone(&projects),
        Arc::clone(&docs),
        Arc::clone(&hub),
    ));
    let _reaper = hub::spawn_reaper(
        Arc::clone(&hub),
        Duration::from_millis(50),
        Duration::from_millis(300),
    );
    let state = AppState {
        engine,
        projects,
        docs,
        public_base_url: "http://localhost:3050".to_string(),
        list_limit: 20,
    };
    let (addr, _handle) = server::start_server("127.0.0.1:0", state.clone())
        .await
        .expect("failed to start test server");
    Stack {
        addr,
        state,
        hub,
        _dir: dir,
    }
}

type Ws =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn ws_connect(addr: std::net::SocketAddr, slug: &str) -> Ws {
    let url = format!("ws://{addr}/ws/{slug}");
    let (ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    ws
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn silent_viewer_is_evicted() {
    let stack = start_stack_with_reaper().await;
    let project = stack.state.projects.create("Board", None).await.unwrap();

    let mut ws = ws_connect(stack.addr, &project.slug).await;
    let _ = ws.next().await; // init
    assert_eq!(stack.hub.subscriber_count(project.id).await, 1);

    // Stay silent past the window; the reaper must close the connection.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    let mut closed = false;
    while tokio::time::Instant::now() < deadline {
        match tokio::time::timeout(Duration::from_millis(500), ws.next()).await {
            Ok(Some(Ok(tungstenite::Message::Close(_))) | Some(Err(_)) | None) => {
                closed = true;
                break;
            }
            _ => {}
        }
    }
    assert!(closed, "silent viewer must receive a close");
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(stack.hub.subscriber_count(project.id).await, 0);
}

#[tokio::test]
async fn pinging_viewer_survives_sweeps() {
    let stack = start_stack_with_reaper().await;
    let project = stack.state.projects.create("Board", None).await.unwrap();

    let mut ws = ws_connect(stack.addr, &project.slug).await;
    let _ = ws.next().await; // init

    // Ping every 100 ms for one second — several full sweep windows.
    for _ in 0..10 {
        ws.send(tungstenite::Message::Text(
            realtime::encode_client(&ClientMessage::Ping).unwrap().into(),
        ))
        .await
        .unwrap();
        // Drain the pong so the socket buffer stays empty.
        let reply = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timeout waiting for pong")
            .unwrap()
            .unwrap();
        if let tungstenite::Message::Text(text) = reply {
            assert!(matches!(
                realtime::decode_server(text.as_str()).unwrap(),
                ServerMessage::Pong { .. }
            ));
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    assert_eq!(
        stack.hub.subscriber_count(project.id).await,
        1,
        "an active pinger must not be evicted"
    );
}
