//! Application State
//!
//! Shared state accessible by every handler. Wrapped in Arc and handed to
//! the router once; nothing in here is replaced after startup.

use std::sync::Arc;
use std::time::Instant;

use super::route_table::RouteTable;
use crate::config::ServerConfig;
use crate::hub::SubscriptionHub;
use crate::watchable::WatchRegistry;

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// Watchables served by this instance
    pub registry: Arc<WatchRegistry>,
    /// Live connection hub (the same one the registry publishes to)
    pub hub: SubscriptionHub,
    /// Configured routes
    pub routes: Arc<RouteTable>,
    /// Server configuration
    pub config: Arc<ServerConfig>,
    /// Server start time for uptime tracking
    pub start_time: Instant,
}

impl AppState {
    /// Create the state; the hub is taken from the registry
    pub fn new(registry: Arc<WatchRegistry>, routes: RouteTable, config: ServerConfig) -> Self {
        Self {
            hub: registry.hub().clone(),
            registry,
            routes: Arc::new(routes),
            config: Arc::new(config),
            start_time: Instant::now(),
        }
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
