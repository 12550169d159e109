//! # watchserv
//!
//! Observable hierarchical variables served over HTTP, with live push
//! updates to browsers.
//!
//! ## Features
//!
//! - **Named-node tree**: watchables live at filesystem-like paths (`/app/counter`)
//! - **Typed values**: int, float, text, bool and choice kinds with validation
//! - **Observers**: in-process callbacks, filtered by the agent that made a change
//! - **Live updates**: Server-Sent Events and WebSocket subscriptions with
//!   bounded per-connection queues, so a slow client never blocks a writer
//! - **HTTP serving**: static files, ranged file streaming, dynamic generators
//!
//! ## Modules
//!
//! - [`tree`]: Ordered tree of named nodes, paths and slices
//! - [`watchable`]: Values, kinds, watchables and the registry
//! - [`hub`]: Subscription hub, SSE and WebSocket channels
//! - [`server`]: Route table, dispatcher, file responder and JSON endpoints
//! - [`config`]: TOML configuration with environment overrides
//!
//! ## Quick Start
//!
//! ```rust
//! use watchserv::{Agent, Kind, Value, WatchRegistry};
//! use std::sync::{Arc, Mutex};
//!
//! let registry = WatchRegistry::standalone();
//! let level = registry
//!     .register("/app/level", Kind::int_range(0, 10), Some(Value::Int(5)))
//!     .unwrap();
//!
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink = Arc::clone(&seen);
//! level.subscribe(move |event| sink.lock().unwrap().push(event.new_value.clone()));
//!
//! level.set(Value::Int(7), Agent::App).unwrap();
//! assert!(level.set(Value::Int(11), Agent::User).is_err());
//!
//! assert_eq!(*seen.lock().unwrap(), vec![Value::Int(7)]);
//! assert_eq!(registry.get("/app/level").unwrap(), Value::Int(7));
//! ```

pub mod config;
pub mod hub;
pub mod server;
pub mod tree;
pub mod watchable;

// Re-export top-level types for convenience
pub use tree::{NodeId, SliceSpec, Tree, TreeError};

pub use watchable::{
    Agent, ChangeEvent, Kind, NodeSnapshot, Value, WatchError, WatchRegistry, WatchResult,
    Watchable,
};

pub use hub::{ClientMessage, HubConfig, HubError, LiveFrame, ServerMessage, SubscriptionHub};

pub use server::{build_router, serve, AppState, GeneratorRegistry, RouteTable, ServerError};

pub use config::{Config, ConfigError, LoggingConfig, RouteConfig, RouteTarget, WatchableConfig};
