// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc,
    clippy::missing_docs_in_private_items
)]

//! Integration tests for external sync fanout.
//!
//! Verifies that a webhook-style sync reaches every connected viewer as a
//! full snapshot, that a viewer subscribing after mutations immediately
//! receives the current state (not an empty board), and that snapshot
//! timestamps increase across mutations.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use futures_util::StreamExt;
use taskboard_proto::realtime::{self, ServerMessage};
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
        let msg = tokio::time::timeout(std::time::Duration::from_secs(5), ws.next())
            .await
            .expect("timeout waiting for server message")
            .unwrap()
            .unwrap();
        if let tungstenite::Message::Text(text) = msg {
            return realtime::decode_server(text.as_str()).unwrap();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn subscriber_after_sync_gets_current_state() {
    let stack = start_stack().await;
    let project = stack.state.projects.create("Board", None).await.unwrap();

    stack
        .state
        .engine
        .apply_external_sync(
            project.id,
            vec![
                make_task("a", TaskStatus::Pending),
                make_task("b", TaskStatus::InProgress),
            ],
        )
        .await
        .unwrap();

    let mut ws = ws_connect(stack.addr, &project.slug).await;
    match recv_server(&mut ws).await {
        ServerMessage::Init { data, .. } => {
            assert_eq!(data.tasks.len(), 2, "init must carry the latest state");
            assert_eq!(data.tasks[0].id, "a");
            assert_eq!(data.tasks[1].id, "b");
        }
        other => panic!("expected init, got {other:?}"),
    }
}

#[tokio::test]
async fn sync_broadcasts_update_to_connected_viewer() {
    let stack = start_stack().await;
    let project = stack.state.projects.create("Board", None).await.unwrap();

    let mut ws = ws_connect(stack.addr, &project.slug).await;
    let init = recv_server(&mut ws).await;
    assert!(matches!(init, ServerMessage::Init { .. }));

    let outcome = stack
        .state
        .engine
        .apply_external_sync(project.id, vec![make_task("a", TaskStatus::Pending)])
        .await
        .unwrap();
    assert_eq!(outcome.synced, 1);

    match recv_server(&mut ws).await {
        ServerMessage::Update { data, .. } => {
            assert_eq!(data.tasks.len(), 1);
            assert_eq!(data.tasks[0].id, "a");
        }
        other => panic!("expected update, got {other:?}"),
    }
}

#[tokio::test]
async fn all_viewers_receive_each_broadcast() {
    let stack = start_stack().await;
    let project = stack.state.projects.create("Board", None).await.unwrap();

    let mut ws_one = ws_connect(stack.addr, &project.slug).await;
    let mut ws_two = ws_connect(stack.addr, &project.slug).await;
    recv_server(&mut ws_one).await;
    recv_server(&mut ws_two).await;

    stack
        .state
        .engine
        .apply_external_sync(project.id, vec![make_task("a", TaskStatus::Completed)])
        .await
        .unwrap();

    for ws in [&mut ws_one, &mut ws_two] {
        match recv_server(ws).await {
            ServerMessage::Update { data, .. } => {
                assert_eq!(data.tasks[0].status, TaskStatus::Completed);
            }
            other => panic!("expected update, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn replace_sync_deletes_absent_tasks_in_broadcast() {
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
    recv_server(&mut ws).await;

    let outcome = stack
        .state
        .engine
        .apply_external_sync(
            project.id,
            vec![
                make_task("b", TaskStatus::Pending),
                make_task("d", TaskStatus::Pending),
            ],
        )
        .await
        .unwrap();
    assert_eq!(outcome.synced, 2);
    assert_eq!(outcome.deleted, 1);

    match recv_server(&mut ws).await {
        ServerMessage::Update { data, .. } => {
            let ids: Vec<&str> = data.tasks.iter().map(|t| t.id.as_str()).collect();
            assert_eq!(ids, vec!["b", "d"]);
            let positions: Vec<u32> = data.tasks.iter().map(|t| t.position).collect();
            assert_eq!(positions, vec![0, 1]);
        }
        other => panic!("expected update, got {other:?}"),
    }
}

#[tokio::test]
async fn snapshot_timestamps_increase_across_broadcasts() {
    let stack = start_stack().await;
    let project = stack.state.projects.create("Board", None).await.unwrap();

    let mut ws = ws_connect(stack.addr, &project.slug).await;
    recv_server(&mut ws).await;

    stack
        .state
        .engine
        .apply_external_sync(project.id, vec![make_task("a", TaskStatus::Pending)])
        .await
        .unwrap();
    let first = match recv_server(&mut ws).await {
        ServerMessage::Update { timestamp, .. } => timestamp,
        other => panic!("expected update, got {other:?}"),
    };

    stack
        .state
        .engine
        .apply_external_sync(project.id, vec![make_task("a", TaskStatus::Completed)])
        .await
        .unwrap();
    let second = match recv_server(&mut ws).await {
        ServerMessage::Update { timestamp, .. } => timestamp,
        other => panic!("expected update, got {other:?}"),
    };

    assert!(second > first, "viewers must observe increasing timestamps");
}
