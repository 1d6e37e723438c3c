//! Headless Taskboard client library.
//!
//! Connects to a Taskboard server's realtime channel and maintains a live
//! view of one project's board: [`net`] supervises the connection
//! (heartbeats, auto-reconnect with backoff), [`board`] holds the derived
//! board state with optimistic moves and rollback. Rendering is up to the
//! embedder.

pub mod board;
pub mod net;
