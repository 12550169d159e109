//! Watchables
//!
//! Typed, validated values bound to nodes of a [`Tree`](crate::tree::Tree)
//! that notify observers when they change.
//!
//! ## Architecture
//!
//! - **Value / Kind**: tagged value plus the constraints of its declared kind
//! - **Watchable**: the value, its in-process observers and the hand-off to the hub
//! - **WatchRegistry**: the tree of watchables owned by one server instance
//!
//! Every mutation names an [`Agent`]. In-process observers run inline, on the
//! caller's thread, in registration order. Network subscribers never run
//! inline: the change is queued on the [`SubscriptionHub`](crate::hub::SubscriptionHub)
//! and written by each connection's own task.
//!
//! ## Example
//!
//! ```rust
//! use watchserv::watchable::{Agent, Kind, Value, WatchRegistry};
//!
//! let registry = WatchRegistry::standalone();
//! let counter = registry
//!     .register("/app/counter", Kind::int(), Some(Value::Int(0)))
//!     .unwrap();
//!
//! assert!(counter.set(Value::Int(1), Agent::App).unwrap());
//! // same value again: nothing changes, nobody is notified
//! assert!(!counter.set(Value::Int(1), Agent::App).unwrap());
//! ```

mod error;
mod registry;
mod value;
mod watchable;

pub use error::{WatchError, WatchResult};
pub use registry::{NodeSnapshot, WatchRegistry};
pub use value::{Kind, Value};
pub use watchable::{Agent, ChangeEvent, ObserverFn, ObserverToken, Watchable};
