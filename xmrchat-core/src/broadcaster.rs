//! Topic-scoped fan-out of confirmation events.
//!
//! Each WebSocket connection registers an outbound sender and joins or
//! leaves topics (video ids). The broadcaster consumes the monitor's
//! confirmed-payment channel and delivers each event to exactly the
//! connections subscribed to its topic. Delivery is best-effort: no
//! acknowledgment, no retry, no replay for late subscribers.

use crate::events::{ConfirmedPaymentReceiver, SuperchatEvent};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc, watch};
use tracing::{debug, info, warn};

/// Identifies one WebSocket connection.
pub type ConnectionId = uuid::Uuid;

/// Outbound event sender of one connection.
pub type EventSink = mpsc::Sender<SuperchatEvent>;

#[derive(Default)]
struct Registry {
    /// topic -> subscribed connections.
    topics: HashMap<String, HashSet<ConnectionId>>,
    /// connection -> outbound sink and joined topics (for teardown).
    connections: HashMap<ConnectionId, Connection>,
}

struct Connection {
    sink: EventSink,
    joined: HashSet<String>,
}

/// Fans confirmation events out to per-topic subscriber sets.
#[derive(Clone, Default)]
pub struct Broadcaster {
    registry: Arc<Mutex<Registry>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection's outbound sink and mint its id.
    pub async fn register_connection(&self, sink: EventSink) -> ConnectionId {
        let connection_id = ConnectionId::new_v4();
        let mut registry = self.registry.lock().await;
        registry.connections.insert(
            connection_id,
            Connection {
                sink,
                joined: HashSet::new(),
            },
        );
        debug!(%connection_id, "connection registered");
        connection_id
    }

    /// Add a connection to a topic's subscriber set.
    pub async fn subscribe(&self, connection_id: ConnectionId, topic_id: &str) {
        let mut registry = self.registry.lock().await;
        let Some(connection) = registry.connections.get_mut(&connection_id) else {
            warn!(%connection_id, topic_id, "subscribe from unknown connection");
            return;
        };
        connection.joined.insert(topic_id.to_owned());
        registry
            .topics
            .entry(topic_id.to_owned())
            .or_default()
            .insert(connection_id);
        debug!(%connection_id, topic_id, "subscribed to topic");
    }

    /// Remove a connection from a topic's subscriber set.
    pub async fn unsubscribe(&self, connection_id: ConnectionId, topic_id: &str) {
        let mut registry = self.registry.lock().await;
        if let Some(connection) = registry.connections.get_mut(&connection_id) {
            connection.joined.remove(topic_id);
        }
        if let Some(subscribers) = registry.topics.get_mut(topic_id) {
            subscribers.remove(&connection_id);
            if subscribers.is_empty() {
                registry.topics.remove(topic_id);
            }
        }
    }

    /// Drop a connection from every topic it joined.
    pub async fn disconnect(&self, connection_id: ConnectionId) {
        let mut registry = self.registry.lock().await;
        let Some(connection) = registry.connections.remove(&connection_id) else {
            return;
        };
        for topic_id in connection.joined {
            if let Some(subscribers) = registry.topics.get_mut(&topic_id) {
                subscribers.remove(&connection_id);
                if subscribers.is_empty() {
                    registry.topics.remove(&topic_id);
                }
            }
        }
        debug!(%connection_id, "connection removed");
    }

    /// Deliver `event` to every connection subscribed to `topic_id`.
    ///
    /// A full or closed sink is skipped; delivery to the remaining
    /// subscribers continues.
    pub async fn publish(&self, topic_id: &str, event: SuperchatEvent) {
        let registry = self.registry.lock().await;
        let Some(subscribers) = registry.topics.get(topic_id) else {
            debug!(topic_id, "no subscribers for confirmed payment");
            return;
        };
        for connection_id in subscribers {
            let Some(connection) = registry.connections.get(connection_id) else {
                continue;
            };
            if let Err(e) = connection.sink.try_send(event.clone()) {
                warn!(%connection_id, topic_id, error = %e, "dropping event for slow or closed connection");
            }
        }
    }

    /// Consume confirmed payments from the monitor and publish each to
    /// its topic, until shutdown or the channel closes.
    pub async fn run(
        self,
        mut confirmed_rx: ConfirmedPaymentReceiver,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        info!("broadcaster started");

        loop {
            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }

                payment = confirmed_rx.recv() => {
                    let Some(payment) = payment else {
                        info!("confirmed payment channel closed");
                        break;
                    };
                    let topic_id = payment.topic_id.clone();
                    self.publish(&topic_id, SuperchatEvent::from(payment)).await;
                }
            }
        }

        info!("broadcaster stopped");
    }
}
