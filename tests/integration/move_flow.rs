// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc,
    clippy::missing_docs_in_private_items
)]

//! Integration tests for drag-and-drop moves over the realtime channel.
//!
//! A move sent by one viewer must mutate only that task's status and
//! `updatedAt`, leave ordering untouched, and fan out to every viewer.
//! A move for an unknown task must produce no broadcast at all.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use futures_util::{SinkExt, StreamExt};
use taskboard_proto::realtime::{self, ClientMessage, ServerMessage};
use taskboard_proto::task::{Task, TaskStatus};
use taskboard_server::docs::DocumentStore;
use taskboard_server::engine::SyncEngine;
use taskboard_server::hub::SubscriberHub;
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
    _dir: tempfile::TempDir,
}

async fn start_stack() -> Stack {
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
        hub,
    ));
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
        _dir: dir,
    }
}

fn make_task(id: &str, status: TaskStatus) -> Task {
    let created = Utc.timestamp_opt(1_700_000_000, 0).single().unwrap();
    Task {
        id: id.to_string(),
        content: format!("Task {id}"),
        active_form: format!("Doing {id}"),
        status,
        tags: Vec::new(),
        created_at: created,
        updated_at: created,
        position: 0,
    }
}

type Ws =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn ws_connect(addr: std::net::SocketAddr, slug: &str) -> Ws {
    let url = format!("ws://{addr}/ws/{slug}");
    let (ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    ws
}

async fn recv_server(ws: &mut Ws) -> ServerMessage {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timeout waiting for server message")
            .unwrap()
            .unwrap();
        if let tungstenite::Message::Text(text) = msg {
            return realtime::decode_server(text.as_str()).unwrap();
        }
    }
}

async fn send_move(ws: &mut Ws, task_id: &str, new_status: TaskStatus) {
    let msg = ClientMessage::Move {
        task_id: task_id.to_string(),
        new_status,
    };
    ws.send(tungstenite::Message::Text(
        realtime::encode_client(&msg).unwrap().into(),
    ))
    .await
    .unwrap();
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn move_fans_out_to_all_viewers() {
    let stack = start_stack().await;
    let project = stack.state.projects.create("Board", None).await.unwrap();
    stack
        .state
        .engine
        .apply_external_sync(
            project.id,
            vec![
                make_task("a", TaskStatus::Pending),
                make_task("b", TaskStatus::Pending),
            ],
        )
        .await
        .unwrap();

    let mut mover = ws_connect(stack.addr, &project.slug).await;
    let mut watcher = ws_connect(stack.addr, &project.slug).await;
    recv_server(&mut mover).await;
    recv_server(&mut watcher).await;

    send_move(&mut mover, "b", TaskStatus::Completed).await;

    for ws in [&mut mover, &mut watcher] {
        match recv_server(ws).await {
            ServerMessage::Update { data, .. } => {
                assert_eq!(data.tasks[1].id, "b");
                assert_eq!(data.tasks[1].status, TaskStatus::Completed);
            }
            other => panic!("expected update, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn move_changes_only_status_and_updated_at() {
    let stack = start_stack().await;
    let project = stack.state.projects.create("Board", None).await.unwrap();
    stack
        .state
        .engine
        .apply_external_sync(
            project.id,
            vec![
                make_task("a", TaskStatus::Pending),
                make_task("b", TaskStatus::Pending),
            ],
        )
        .await
        .unwrap();

    let mut ws = ws_connect(stack.addr, &project.slug).await;
    let before = match recv_server(&mut ws).await {
        ServerMessage::Init { data, .. } => data,
        other => panic!("expected init, got {other:?}"),
    };

    send_move(&mut ws, "b", TaskStatus::InProgress).await;

    let after = match recv_server(&mut ws).await {
        ServerMessage::Update { data, .. } => data,
        other => panic!("expected update, got {other:?}"),
    };

    // Task a is untouched.
    assert_eq!(after.tasks[0], before.tasks[0]);
    // Task b changed status and updatedAt only.
    assert_eq!(after.tasks[1].status, TaskStatus::InProgress);
    assert!(after.tasks[1].updated_at > before.tasks[1].updated_at);
    assert_eq!(after.tasks[1].content, before.tasks[1].content);
    assert_eq!(after.tasks[1].created_at, before.tasks[1].created_at);
    assert_eq!(after.tasks[1].position, before.tasks[1].position);
}

#[tokio::test]
async fn move_unknown_task_broadcasts_nothing() {
    let stack = start_stack().await;
    let project = stack.state.projects.create("Board", None).await.unwrap();
    stack
        .state
        .engine
        .apply_external_sync(project.id, vec![make_task("a", TaskStatus::Pending)])
        .await
        .unwrap();

    let mut ws = ws_connect(stack.addr, &project.slug).await;
    recv_server(&mut ws).await;

    send_move(&mut ws, "ghost", TaskStatus::Completed).await;

    // No update may arrive for the failed move.
    let silent = tokio::time::timeout(Duration::from_millis(500), ws.next()).await;
    assert!(silent.is_err(), "expected silence, got {silent:?}");

    // The store is untouched.
    let snapshot = stack
        .state
        .engine
        .current_snapshot("Board", project.id)
        .await;
    assert_eq!(snapshot.tasks[0].status, TaskStatus::Pending);
}

#[tokio::test]
async fn move_persists_to_document() {
    let stack = start_stack().await;
    let project = stack.state.projects.create("Board", None).await.unwrap();
    stack
        .state
        .engine
        .apply_external_sync(project.id, vec![make_task("a", TaskStatus::Pending)])
        .await
        .unwrap();

    let mut ws = ws_connect(stack.addr, &project.slug).await;
    recv_server(&mut ws).await;
    send_move(&mut ws, "a", TaskStatus::Completed).await;
    recv_server(&mut ws).await;

    let doc = stack.state.docs.read(&project.slug).await.unwrap();
    assert_eq!(doc.tasks[0].status, TaskStatus::Completed);
}
