//! Connection supervisor for the realtime channel.
//!
//! Bridges an embedder (TUI, bridge process, test harness) to the server's
//! WebSocket endpoint. The supervisor owns the socket on background tokio
//! tasks and communicates over [`ClientCommand`] / [`ClientEvent`]
//! channels: commands go in (move a task, shut down), events come out
//! (snapshots, heartbeat replies, connection status).
//!
//! On connection loss the supervisor reconnects with exponential backoff;
//! a successful reconnect yields a fresh `init` snapshot from the server,
//! so no resumption bookkeeping is needed. A move that cannot reach the
//! server is reported as [`ClientEvent::MoveFailed`] so the embedder can
//! roll back its optimistic view.

use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use taskboard_proto::realtime::{self, ClientMessage, ServerMessage};
use taskboard_proto::task::{Snapshot, TaskStatus};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

/// Default channel capacity for command/event mpsc channels.
const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Reconnect behavior after a lost connection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnect attempt.
    pub initial_delay: Duration,
    /// Upper bound for the doubling backoff delay.
    pub max_delay: Duration,
    /// Attempts before giving up with [`ClientEvent::ReconnectFailed`].
    pub max_attempts: u32,
    /// Interval between heartbeat pings on a live connection.
    pub ping_interval: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: 10,
            ping_interval: Duration::from_secs(30),
        }
    }
}

/// Configuration for one client connection.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Full WebSocket URL of the project channel
    /// (e.g., `ws://127.0.0.1:3050/ws/my-board-a1b2c3d4`).
    pub url: String,
    /// Reconnect and heartbeat behavior.
    pub reconnect: ReconnectConfig,
    /// Capacity of the command/event channels.
    pub channel_capacity: usize,
}

impl ClientConfig {
    /// Creates a config with default reconnect behavior.
    #[must_use]
    pub fn new(url: String) -> Self {
        Self {
            url,
            reconnect: ReconnectConfig::default(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Commands sent from the embedder to the supervisor.
#[derive(Debug)]
pub enum ClientCommand {
    /// Move a task to a new column.
    Move {
        /// Which task to move.
        task_id: String,
        /// The target column.
        new_status: TaskStatus,
    },
    /// Gracefully shut down the connection.
    Shutdown,
}

/// Events sent from the supervisor to the embedder.
#[derive(Debug)]
pub enum ClientEvent {
    /// The channel is live.
    Connected,
    /// The channel was lost; reconnection starts next.
    Disconnected,
    /// A reconnect attempt is about to run.
    Reconnecting {
        /// 1-based attempt counter.
        attempt: u32,
        /// Configured attempt limit.
        max_attempts: u32,
    },
    /// All reconnect attempts failed; the supervisor has exited.
    ReconnectFailed,
    /// A snapshot arrived (`initial` distinguishes `init` from `update`).
    Snapshot {
        /// The full task collection.
        data: Snapshot,
        /// Server time of delivery.
        timestamp: DateTime<Utc>,
        /// Whether this was the post-subscribe `init`.
        initial: bool,
    },
    /// Heartbeat reply from the server.
    Pong {
        /// Server time of the reply.
        timestamp: DateTime<Utc>,
    },
    /// A move could not be sent; roll back the optimistic view.
    MoveFailed {
        /// The task whose move was lost.
        task_id: String,
    },
}

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

enum SessionEnd {
    Shutdown,
    ConnectionLost,
}

/// Connects to the server and spawns the supervisor task, returning the
/// command/event channel handles.
///
/// # Errors
///
/// Returns an error string if the URL is invalid or the initial
/// connection fails; reconnection only covers later drops.
pub async fn spawn_client(
    config: ClientConfig,
) -> Result<(mpsc::Sender<ClientCommand>, mpsc::Receiver<ClientEvent>), String> {
    let url = url::Url::parse(&config.url).map_err(|e| format!("invalid server url: {e}"))?;
    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(format!("unsupported url scheme: {}", url.scheme()));
    }

    let (socket, _) = connect_async(&config.url)
        .await
        .map_err(|e| format!("connection failed: {e}"))?;

    let (cmd_tx, cmd_rx) = mpsc::channel(config.channel_capacity);
    let (evt_tx, evt_rx) = mpsc::channel(config.channel_capacity);

    tokio::spawn(supervise(config, socket, cmd_rx, evt_tx));

    Ok((cmd_tx, evt_rx))
}

/// Outer supervisor loop: run a session, then reconnect with backoff
/// until shutdown or attempt exhaustion.
async fn supervise(
    config: ClientConfig,
    socket: Socket,
    mut cmd_rx: mpsc::Receiver<ClientCommand>,
    evt_tx: mpsc::Sender<ClientEvent>,
) {
    let mut socket = socket;
    let _ = evt_tx.send(ClientEvent::Connected).await;

    loop {
        match run_session(&mut socket, &mut cmd_rx, &evt_tx, config.reconnect.ping_interval).await {
            SessionEnd::Shutdown => {
                let _ = socket.close(None).await;
                tracing::debug!("client shut down");
                return;
            }
            SessionEnd::ConnectionLost => {
                let _ = evt_tx.send(ClientEvent::Disconnected).await;
                match reconnect(&config, &evt_tx).await {
                    Some(new_socket) => {
                        socket = new_socket;
                        let _ = evt_tx.send(ClientEvent::Connected).await;
                    }
                    None => return,
                }
            }
        }
    }
}

/// One live-connection session: pumps server messages, commands, and
/// heartbeats until the socket dies or the embedder shuts down.
async fn run_session(
    socket: &mut Socket,
    cmd_rx: &mut mpsc::Receiver<ClientCommand>,
    evt_tx: &mpsc::Sender<ClientEvent>,
    ping_interval: Duration,
) -> SessionEnd {
    let mut ping = tokio::time::interval(ping_interval);
    ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick fires immediately; skip it, the connection is fresh.
    ping.tick().await;

    loop {
        tokio::select! {
            incoming = socket.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        handle_server_message(text.as_str(), evt_tx).await;
                    }
                    Some(Ok(Message::Close(_)) | Err(_)) | None => {
                        return SessionEnd::ConnectionLost;
                    }
                    Some(Ok(_)) => {
                        // Transport ping/pong and binary frames are not part
                        // of the protocol.
                    }
                }
            }
            command = cmd_rx.recv() => {
                match command {
                    Some(ClientCommand::Move { task_id, new_status }) => {
                        let msg = ClientMessage::Move {
                            task_id: task_id.clone(),
                            new_status,
                        };
                        if send_client_msg(socket, &msg).await.is_err() {
                            let _ = evt_tx.send(ClientEvent::MoveFailed { task_id }).await;
                            return SessionEnd::ConnectionLost;
                        }
                    }
                    Some(ClientCommand::Shutdown) | None => {
                        return SessionEnd::Shutdown;
                    }
                }
            }
            _ = ping.tick() => {
                if send_client_msg(socket, &ClientMessage::Ping).await.is_err() {
                    return SessionEnd::ConnectionLost;
                }
            }
        }
    }
}

async fn handle_server_message(text: &str, evt_tx: &mpsc::Sender<ClientEvent>) {
    match realtime::decode_server(text) {
        Ok(ServerMessage::Init { data, timestamp }) => {
            let _ = evt_tx
                .send(ClientEvent::Snapshot {
                    data,
                    timestamp,
                    initial: true,
                })
                .await;
        }
        Ok(ServerMessage::Update { data, timestamp }) => {
            let _ = evt_tx
                .send(ClientEvent::Snapshot {
                    data,
                    timestamp,
                    initial: false,
                })
                .await;
        }
        Ok(ServerMessage::Pong { timestamp }) => {
            let _ = evt_tx.send(ClientEvent::Pong { timestamp }).await;
        }
        Err(e) => {
            tracing::warn!(error = %e, "undecodable server message");
        }
    }
}

async fn send_client_msg(socket: &mut Socket, msg: &ClientMessage) -> Result<(), ()> {
    let text = realtime::encode_client(msg).map_err(|_| ())?;
    socket.send(Message::Text(text.into())).await.map_err(|_| ())
}

/// Doubling-backoff reconnect loop. Returns the new socket, or `None`
/// after the attempt limit is exhausted (a [`ClientEvent::ReconnectFailed`]
/// is emitted first).
async fn reconnect(config: &ClientConfig, evt_tx: &mpsc::Sender<ClientEvent>) -> Option<Socket> {
    let mut delay = config.reconnect.initial_delay;
    for attempt in 1..=config.reconnect.max_attempts {
        let _ = evt_tx
            .send(ClientEvent::Reconnecting {
                attempt,
                max_attempts: config.reconnect.max_attempts,
            })
            .await;
        tokio::time::sleep(delay).await;

        match connect_async(&config.url).await {
            Ok((socket, _)) => {
                tracing::info!(attempt, "reconnected");
                return Some(socket);
            }
            Err(e) => {
                tracing::warn!(attempt, error = %e, "reconnect attempt failed");
                delay = (delay * 2).min(config.reconnect.max_delay);
            }
        }
    }
    let _ = evt_tx.send(ClientEvent::ReconnectFailed).await;
    None
}
