//! Realtime channel messages between the dashboard server and viewers.
//!
//! Messages are JSON-encoded tagged unions matched exhaustively at the
//! boundary. The server pushes full snapshots (`init` on connect, `update`
//! after every mutation) and answers heartbeats; clients send heartbeats
//! and drag-and-drop moves. There is no delta or resumption protocol —
//! a reconnecting client simply receives a fresh `init`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::task::{Snapshot, TaskStatus};

/// Messages sent from the server to a connected viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Current snapshot, delivered once immediately after subscribing.
    Init {
        /// The full task collection.
        data: Snapshot,
        /// Server time of delivery.
        timestamp: DateTime<Utc>,
    },
    /// Current snapshot, delivered after any mutation.
    Update {
        /// The full task collection.
        data: Snapshot,
        /// Server time of delivery.
        timestamp: DateTime<Utc>,
    },
    /// Heartbeat reply.
    Pong {
        /// Server time of the reply.
        timestamp: DateTime<Utc>,
    },
}

/// Messages sent from a viewer to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Heartbeat; the server replies with [`ServerMessage::Pong`].
    Ping,
    /// Drag-and-drop move of one task to a new column.
    #[serde(rename_all = "camelCase")]
    Move {
        /// Which task to move.
        task_id: String,
        /// The target column.
        new_status: TaskStatus,
    },
}

/// Encodes a [`ServerMessage`] as JSON text.
///
/// # Errors
///
/// Returns an error string if serialization fails.
pub fn encode_server(msg: &ServerMessage) -> Result<String, String> {
    serde_json::to_string(msg).map_err(|e| format!("server message encode error: {e}"))
}

/// Decodes a [`ServerMessage`] from JSON text.
///
/// # Errors
///
/// Returns an error string if deserialization fails.
pub fn decode_server(text: &str) -> Result<ServerMessage, String> {
    serde_json::from_str(text).map_err(|e| format!("server message decode error: {e}"))
}

/// Encodes a [`ClientMessage`] as JSON text.
///
/// # Errors
///
/// Returns an error string if serialization fails.
pub fn encode_client(msg: &ClientMessage) -> Result<String, String> {
    serde_json::to_string(msg).map_err(|e| format!("client message encode error: {e}"))
}

/// Decodes a [`ClientMessage`] from JSON text.
///
/// # Errors
///
/// Returns an error string if deserialization fails.
pub fn decode_client(text: &str) -> Result<ClientMessage, String> {
    serde_json::from_str(text).map_err(|e| format!("client message decode error: {e}"))
}
