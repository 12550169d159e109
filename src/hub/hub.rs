//! Subscription Hub
//!
//! Tracks live connections and which watchable paths each one follows, and
//! routes change events onto the matching connections' outboxes.

use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use super::messages::LiveFrame;
use super::outbox::Outbox;
use crate::watchable::ChangeEvent;

/// Unique identifier for a live connection
pub type ConnectionId = String;

/// How a live connection talks to its client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// Server-Sent Events on a single path; ends when that path goes away
    EventStream,
    /// WebSocket with any number of paths
    WebSocket,
}

/// Configuration for the subscription hub
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Maximum number of concurrent live connections
    pub max_connections: usize,
    /// Frames kept per subscribed path before the oldest is dropped
    pub queue_capacity: usize,
    /// Interval between heartbeat frames
    pub heartbeat: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            max_connections: 1000,
            queue_capacity: 64,
            heartbeat: Duration::from_secs(15),
        }
    }
}

struct ConnectionHandle {
    outbox: Arc<Outbox>,
    /// Paths this connection is subscribed to
    subscriptions: HashSet<String>,
    transport: Transport,
}

#[derive(Default)]
struct HubState {
    /// Active connections: ConnectionId → ConnectionHandle
    connections: HashMap<ConnectionId, ConnectionHandle>,
    /// Path subscriptions: path → set of ConnectionIds
    subscriptions: HashMap<String, HashSet<ConnectionId>>,
}

struct HubInner {
    state: RwLock<HubState>,
    config: HubConfig,
    sequence: AtomicU64,
    closed: AtomicBool,
}

/// Routes watchable changes to live connections
///
/// Cheap to clone; all clones share the same state.
#[derive(Clone)]
pub struct SubscriptionHub {
    inner: Arc<HubInner>,
}

/// The outboxes that should receive one change, captured at change time
pub struct Delivery {
    seq: u64,
    targets: Vec<(ConnectionId, Arc<Outbox>)>,
}

impl Delivery {
    /// Number of connections the change goes to
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Registration of one live connection
///
/// Dropping the guard unregisters the connection and all its subscriptions,
/// however the connection ended.
pub struct ConnectionGuard {
    id: ConnectionId,
    outbox: Arc<Outbox>,
    hub: SubscriptionHub,
}

impl ConnectionGuard {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    pub fn hub(&self) -> &SubscriptionHub {
        &self.hub
    }

    /// Subscribe this connection to `paths`
    pub fn subscribe(&self, paths: Vec<String>) -> Result<Vec<String>, HubError> {
        self.hub.subscribe(&self.id, paths)
    }

    /// Unsubscribe this connection from `paths`
    pub fn unsubscribe(&self, paths: Vec<String>) -> Vec<String> {
        self.hub.unsubscribe(&self.id, paths)
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.hub.unregister(&self.id);
    }
}

impl SubscriptionHub {
    /// Create a new hub
    pub fn new(config: HubConfig) -> Self {
        Self {
            inner: Arc::new(HubInner {
                state: RwLock::new(HubState::default()),
                config,
                sequence: AtomicU64::new(1),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.inner.config
    }

    /// Register a new live connection
    ///
    /// Returns a guard that unregisters on drop, or an error if the
    /// connection limit has been reached or the hub is shutting down.
    pub fn register(&self, transport: Transport) -> Result<ConnectionGuard, HubError> {
        if self.is_shutting_down() {
            return Err(HubError::ShuttingDown);
        }

        let mut state = self.inner.state.write();
        if state.connections.len() >= self.inner.config.max_connections {
            return Err(HubError::TooManyConnections(self.inner.config.max_connections));
        }

        let id = Uuid::new_v4().to_string();
        let outbox = Arc::new(Outbox::new(self.inner.config.queue_capacity));
        state.connections.insert(
            id.clone(),
            ConnectionHandle {
                outbox: Arc::clone(&outbox),
                subscriptions: HashSet::new(),
                transport,
            },
        );
        drop(state);

        tracing::info!(connection_id = %id, transport = ?transport, "Live connection registered");
        Ok(ConnectionGuard {
            id,
            outbox,
            hub: self.clone(),
        })
    }

    /// Unregister a connection and clean up its subscriptions
    ///
    /// Unknown ids are ignored.
    pub fn unregister(&self, id: &str) {
        let handle = {
            let mut state = self.inner.state.write();
            let handle = state.connections.remove(id);
            if let Some(handle) = &handle {
                for path in &handle.subscriptions {
                    if let Some(subscribers) = state.subscriptions.get_mut(path) {
                        subscribers.remove(id);
                        // Clean up empty path entries
                        if subscribers.is_empty() {
                            state.subscriptions.remove(path);
                        }
                    }
                }
            }
            handle
        };

        if let Some(handle) = handle {
            handle.outbox.close();
            tracing::info!(connection_id = %id, "Live connection unregistered");
        }
    }

    /// Subscribe a connection to paths
    ///
    /// Paths must already be canonical watchable paths.
    pub fn subscribe(&self, id: &str, paths: Vec<String>) -> Result<Vec<String>, HubError> {
        let mut state = self.inner.state.write();
        let state = &mut *state;
        let handle = state
            .connections
            .get_mut(id)
            .ok_or_else(|| HubError::ConnectionNotFound(id.to_string()))?;

        let mut subscribed = Vec::new();
        for path in paths {
            handle.subscriptions.insert(path.clone());
            state
                .subscriptions
                .entry(path.clone())
                .or_default()
                .insert(id.to_string());
            subscribed.push(path);
        }

        tracing::debug!(connection_id = %id, paths = ?subscribed, "Subscribed to paths");
        Ok(subscribed)
    }

    /// Unsubscribe a connection from paths
    ///
    /// Returns the paths that were actually subscribed. Unknown connections
    /// and paths are ignored.
    pub fn unsubscribe(&self, id: &str, paths: Vec<String>) -> Vec<String> {
        let mut state = self.inner.state.write();
        let state = &mut *state;
        let Some(handle) = state.connections.get_mut(id) else {
            return Vec::new();
        };

        let mut unsubscribed = Vec::new();
        for path in paths {
            if handle.subscriptions.remove(&path) {
                handle.outbox.remove_path(&path);
                if let Some(subscribers) = state.subscriptions.get_mut(&path) {
                    subscribers.remove(id);
                    if subscribers.is_empty() {
                        state.subscriptions.remove(&path);
                    }
                }
                unsubscribed.push(path);
            }
        }

        tracing::debug!(connection_id = %id, paths = ?unsubscribed, "Unsubscribed from paths");
        unsubscribed
    }

    /// Capture the subscribers of `path` and a sequence number for a change
    ///
    /// Called while the watchable's lock is held; delivery happens later.
    pub fn prepare(&self, path: &str) -> Delivery {
        let seq = self.inner.sequence.fetch_add(1, Ordering::Relaxed);
        let state = self.inner.state.read();
        let targets = state
            .subscriptions
            .get(path)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| {
                        state
                            .connections
                            .get(id)
                            .map(|h| (id.clone(), Arc::clone(&h.outbox)))
                    })
                    .collect()
            })
            .unwrap_or_default();
        Delivery { seq, targets }
    }

    /// Queue a change on every captured outbox
    ///
    /// Connections whose outbox is already closed are removed; the caller
    /// never sees a delivery failure.
    pub fn deliver(&self, delivery: Delivery, event: &ChangeEvent) {
        if delivery.is_empty() {
            return;
        }

        let frame = LiveFrame::from_event(delivery.seq, event);
        let mut gone = Vec::new();
        for (id, outbox) in &delivery.targets {
            if !outbox.push(frame.clone()) {
                gone.push(id.clone());
            }
        }

        tracing::trace!(
            path = %event.path,
            seq = delivery.seq,
            subscribers = delivery.len() - gone.len(),
            "Change queued"
        );

        for id in gone {
            tracing::debug!(connection_id = %id, "Dropping closed live connection");
            self.unregister(&id);
        }
    }

    /// Prepare and deliver in one step
    pub fn publish(&self, event: &ChangeEvent) {
        let delivery = self.prepare(&event.path);
        self.deliver(delivery, event);
    }

    /// Drop all subscriptions to a path that no longer exists
    ///
    /// Event-stream connections following it are closed; WebSocket
    /// connections just stop receiving it.
    pub fn forget_path(&self, path: &str) {
        let mut state = self.inner.state.write();
        let state = &mut *state;
        let Some(ids) = state.subscriptions.remove(path) else {
            return;
        };

        for id in &ids {
            if let Some(handle) = state.connections.get_mut(id) {
                handle.subscriptions.remove(path);
                handle.outbox.remove_path(path);
                if handle.transport == Transport::EventStream {
                    handle.outbox.close();
                }
            }
        }
        tracing::debug!(path = %path, subscribers = ids.len(), "Path subscriptions closed");
    }

    /// Refuse new connections and close every outbox
    ///
    /// Connection tasks observe the closed outbox, finish and drop their
    /// guards.
    pub fn shutdown(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        let state = self.inner.state.read();
        for handle in state.connections.values() {
            handle.outbox.close();
        }
        tracing::info!(connections = state.connections.len(), "Hub shut down");
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Get the current connection count
    pub fn connection_count(&self) -> usize {
        self.inner.state.read().connections.len()
    }

    /// Get subscription count for a path
    pub fn subscription_count(&self, path: &str) -> usize {
        self.inner
            .state
            .read()
            .subscriptions
            .get(path)
            .map(|s| s.len())
            .unwrap_or(0)
    }
}

/// Errors that can occur in the subscription hub
#[derive(Debug, Error)]
pub enum HubError {
    #[error("Too many live connections (limit: {0})")]
    TooManyConnections(usize),

    #[error("Connection not found: {0}")]
    ConnectionNotFound(String),

    #[error("Server is shutting down")]
    ShuttingDown,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watchable::{Agent, Value};

    fn change(path: &str, value: i64) -> ChangeEvent {
        ChangeEvent {
            path: path.to_string(),
            old_value: Value::Int(value - 1),
            new_value: Value::Int(value),
            timestamp: 1699000000000,
            agent: Agent::App,
        }
    }

    #[test]
    fn test_default_config() {
        let config = HubConfig::default();
        assert_eq!(config.max_connections, 1000);
        assert_eq!(config.queue_capacity, 64);
    }

    #[test]
    fn test_register_unregister() {
        let hub = SubscriptionHub::new(HubConfig::default());
        let guard = hub.register(Transport::WebSocket).unwrap();
        assert!(!guard.id().is_empty());
        assert_eq!(hub.connection_count(), 1);

        drop(guard);
        assert_eq!(hub.connection_count(), 0);
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let hub = SubscriptionHub::new(HubConfig::default());
        let guard = hub.register(Transport::WebSocket).unwrap();
        let id = guard.id().to_string();
        hub.unregister(&id);
        hub.unregister(&id);
        drop(guard);
        assert_eq!(hub.connection_count(), 0);
    }

    #[test]
    fn test_subscribe_unsubscribe() {
        let hub = SubscriptionHub::new(HubConfig::default());
        let guard = hub.register(Transport::WebSocket).unwrap();

        let subscribed = guard.subscribe(vec!["/app/counter".to_string()]).unwrap();
        assert_eq!(subscribed, vec!["/app/counter"]);
        assert_eq!(hub.subscription_count("/app/counter"), 1);

        let unsubscribed = guard.unsubscribe(vec!["/app/counter".to_string()]);
        assert_eq!(unsubscribed, vec!["/app/counter"]);
        assert_eq!(hub.subscription_count("/app/counter"), 0);

        // second time is a no-op
        assert!(guard.unsubscribe(vec!["/app/counter".to_string()]).is_empty());
        assert!(hub.unsubscribe("missing", vec!["/x".to_string()]).is_empty());
    }

    #[test]
    fn test_connection_limit() {
        let config = HubConfig {
            max_connections: 2,
            ..HubConfig::default()
        };
        let hub = SubscriptionHub::new(config);

        let _g1 = hub.register(Transport::EventStream).unwrap();
        let _g2 = hub.register(Transport::EventStream).unwrap();
        let result = hub.register(Transport::EventStream);
        assert!(matches!(result, Err(HubError::TooManyConnections(2))));
    }

    #[tokio::test]
    async fn test_publish_to_subscribers_only() {
        let hub = SubscriptionHub::new(HubConfig::default());
        let g1 = hub.register(Transport::WebSocket).unwrap();
        let g2 = hub.register(Transport::WebSocket).unwrap();
        g1.subscribe(vec!["/app/counter".to_string()]).unwrap();

        hub.publish(&change("/app/counter", 1));

        let frames = g1.outbox().recv().await.unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].value, Value::Int(1));
        assert_eq!(g2.outbox().pending(), 0);
    }

    #[tokio::test]
    async fn test_closed_subscriber_removed_others_still_served() {
        let hub = SubscriptionHub::new(HubConfig::default());
        let guards: Vec<_> = (0..4)
            .map(|_| {
                let g = hub.register(Transport::WebSocket).unwrap();
                g.subscribe(vec!["/app/counter".to_string()]).unwrap();
                g
            })
            .collect();

        // one client goes away mid-broadcast: its outbox is closed but the
        // guard has not been dropped yet
        guards[0].outbox().close();
        hub.publish(&change("/app/counter", 1));

        assert_eq!(hub.connection_count(), 3);
        assert_eq!(hub.subscription_count("/app/counter"), 3);
        for g in &guards[1..] {
            assert_eq!(g.outbox().recv().await.map(|f| f.len()), Some(1));
        }
    }

    #[test]
    fn test_sequence_increases() {
        let hub = SubscriptionHub::new(HubConfig::default());
        let a = hub.prepare("/x");
        let b = hub.prepare("/x");
        assert!(b.seq > a.seq);
    }

    #[tokio::test]
    async fn test_forget_path_closes_event_streams() {
        let hub = SubscriptionHub::new(HubConfig::default());
        let sse = hub.register(Transport::EventStream).unwrap();
        let ws = hub.register(Transport::WebSocket).unwrap();
        sse.subscribe(vec!["/app/counter".to_string()]).unwrap();
        ws.subscribe(vec!["/app/counter".to_string(), "/app/mode".to_string()])
            .unwrap();

        hub.forget_path("/app/counter");
        assert_eq!(hub.subscription_count("/app/counter"), 0);
        assert!(sse.outbox().is_closed());
        assert!(!ws.outbox().is_closed());
        assert_eq!(hub.subscription_count("/app/mode"), 1);
    }

    #[test]
    fn test_shutdown_refuses_new_connections() {
        let hub = SubscriptionHub::new(HubConfig::default());
        let guard = hub.register(Transport::EventStream).unwrap();
        hub.shutdown();
        assert!(guard.outbox().is_closed());
        assert!(matches!(
            hub.register(Transport::EventStream),
            Err(HubError::ShuttingDown)
        ));
    }
}
