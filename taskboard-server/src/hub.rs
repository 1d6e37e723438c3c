//! Subscriber hub: per-project viewer registry and snapshot fanout.
//!
//! Each connected viewer is a channel sender feeding its WebSocket writer
//! task. Broadcasts deliver to every subscriber of a project; a failed
//! delivery evicts only that subscriber and never interrupts the others.
//! Liveness is tracked per subscriber — every inbound frame refreshes
//! `last_seen`, and a reaper task evicts anyone silent past the window.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use axum::extract::ws::Message;
use taskboard_proto::realtime::{self, ServerMessage};
use tokio::sync::RwLock;
use tokio::time::Instant;
use uuid::Uuid;

/// Default window after which a silent subscriber is considered dead.
/// Clients ping every 30 seconds, so this tolerates two missed beats.
pub const DEFAULT_LIVENESS_WINDOW: Duration = Duration::from_secs(90);

/// Default interval between reaper sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(15);

/// Identifies one subscription; returned by [`SubscriberHub::subscribe`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionHandle {
    project_id: Uuid,
    subscriber_id: u64,
}

impl SubscriptionHandle {
    /// The project this subscription belongs to.
    #[must_use]
    pub const fn project_id(&self) -> Uuid {
        self.project_id
    }
}

struct Subscriber {
    sender: tokio::sync::mpsc::UnboundedSender<Message>,
    last_seen: Instant,
}

/// Registry of connected viewers, keyed by project.
pub struct SubscriberHub {
    subscribers: RwLock<HashMap<Uuid, HashMap<u64, Subscriber>>>,
    next_id: AtomicU64,
}

impl Default for SubscriberHub {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriberHub {
    /// Creates an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers a viewer for a project and returns its handle.
    pub async fn subscribe(
        &self,
        project_id: Uuid,
        sender: tokio::sync::mpsc::UnboundedSender<Message>,
    ) -> SubscriptionHandle {
        let subscriber_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut subscribers = self.subscribers.write().await;
        subscribers.entry(project_id).or_default().insert(
            subscriber_id,
            Subscriber {
                sender,
                last_seen: Instant::now(),
            },
        );
        drop(subscribers);
        tracing::debug!(project_id = %project_id, subscriber_id, "subscriber registered");
        SubscriptionHandle {
            project_id,
            subscriber_id,
        }
    }

    /// Removes a subscription. Safe to call repeatedly or after the
    /// connection already closed.
    pub async fn unsubscribe(&self, handle: &SubscriptionHandle) {
        let mut subscribers = self.subscribers.write().await;
        if let Some(project) = subscribers.get_mut(&handle.project_id) {
            project.remove(&handle.subscriber_id);
            if project.is_empty() {
                subscribers.remove(&handle.project_id);
            }
        }
    }

    /// Refreshes a subscriber's liveness stamp. Called for every inbound
    /// frame from that viewer.
    pub async fn touch(&self, handle: &SubscriptionHandle) {
        let mut subscribers = self.subscribers.write().await;
        if let Some(sub) = subscribers
            .get_mut(&handle.project_id)
            .and_then(|p| p.get_mut(&handle.subscriber_id))
        {
            sub.last_seen = Instant::now();
        }
    }

    /// Sends a message to a single subscriber.
    pub async fn send_to(&self, handle: &SubscriptionHandle, msg: &ServerMessage) {
        let Ok(text) = realtime::encode_server(msg) else {
            return;
        };
        let subscribers = self.subscribers.read().await;
        if let Some(sub) = subscribers
            .get(&handle.project_id)
            .and_then(|p| p.get(&handle.subscriber_id))
        {
            let _ = sub.sender.send(Message::Text(text.into()));
        }
    }

    /// Delivers a message to every subscriber of a project.
    ///
    /// Delivery failures are isolated: a subscriber whose channel is gone
    /// is dropped from the registry and the broadcast continues.
    pub async fn broadcast(&self, project_id: Uuid, msg: &ServerMessage) {
        let text = match realtime::encode_server(msg) {
            Ok(t) => t,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode broadcast");
                return;
            }
        };

        let mut failed = Vec::new();
        {
            let subscribers = self.subscribers.read().await;
            if let Some(project) = subscribers.get(&project_id) {
                for (id, sub) in project {
                    if sub.sender.send(Message::Text(text.clone().into())).is_err() {
                        failed.push(*id);
                    }
                }
            }
        }

        if !failed.is_empty() {
            let mut subscribers = self.subscribers.write().await;
            if let Some(project) = subscribers.get_mut(&project_id) {
                for id in &failed {
                    project.remove(id);
                    tracing::warn!(project_id = %project_id, subscriber_id = id, "dropped dead subscriber");
                }
            }
        }
    }

    /// Number of live subscribers for a project.
    pub async fn subscriber_count(&self, project_id: Uuid) -> usize {
        let subscribers = self.subscribers.read().await;
        subscribers.get(&project_id).map_or(0, HashMap::len)
    }

    /// Evicts every subscriber silent for longer than `window`, sending a
    /// close frame on the way out. Returns how many were evicted.
    pub async fn evict_stale(&self, window: Duration) -> usize {
        let now = Instant::now();
        let mut evicted = 0;
        let mut subscribers = self.subscribers.write().await;
        subscribers.retain(|project_id, project| {
            project.retain(|id, sub| {
                if now.duration_since(sub.last_seen) > window {
                    tracing::info!(project_id = %project_id, subscriber_id = id, "evicting silent subscriber");
                    let _ = sub.sender.send(Message::Close(None));
                    evicted += 1;
                    false
                } else {
                    true
                }
            });
            !project.is_empty()
        });
        drop(subscribers);
        evicted
    }

    /// Sends a close frame to every subscriber of every project.
    ///
    /// Triggers client-side disconnect detection; used for graceful
    /// shutdown and in tests.
    pub async fn close_all(&self) {
        let subscribers = self.subscribers.read().await;
        for project in subscribers.values() {
            for sub in project.values() {
                let _ = sub.sender.send(Message::Close(None));
            }
        }
    }
}

/// Spawns the liveness reaper: sweeps every `interval`, evicting
/// subscribers silent for longer than `window`.
pub fn spawn_reaper(
    hub: Arc<SubscriberHub>,
    interval: Duration,
    window: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let evicted = hub.evict_stale(window).await;
            if evicted > 0 {
                tracing::debug!(evicted, "heartbeat reaper swept");
            }
        }
    })
}
