//! Data Transfer Objects
//!
//! Request and response types for the JSON endpoints.

use serde::{Deserialize, Serialize};

use crate::watchable::{NodeSnapshot, Value};

// ============================================
// VALUE DTOs
// ============================================

/// A watchable or a group, as returned by `GET /api/values/{path}`
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum NodeResponse {
    Watchable(ValueResponse),
    Group(GroupResponse),
}

/// One watchable
#[derive(Debug, Serialize)]
pub struct ValueResponse {
    /// Canonical path
    pub path: String,
    /// Kind name (int, float, text, bool, choice)
    pub kind: String,
    pub value: Value,
}

/// A group node with its nested values
#[derive(Debug, Serialize)]
pub struct GroupResponse {
    pub path: String,
    /// Child names in order
    pub children: Vec<String>,
    /// Ordered map of child values
    pub value: NodeSnapshot,
}

/// Body of `POST /api/values/{path}`
#[derive(Debug, Deserialize)]
pub struct SetValueRequest {
    /// A bare value for a watchable, an object keyed by child name for a group
    pub value: NodeSnapshot,
}

/// Query of `GET/POST /api/set`
#[derive(Debug, Deserialize)]
pub struct SetQuery {
    pub path: String,
    /// Value text, parsed according to the watchable's kind
    pub value: String,
}

/// Reply to a successful set
#[derive(Debug, Serialize)]
pub struct SetResponse {
    pub path: String,
    /// Stored value after validation; nested values for a group
    pub value: NodeSnapshot,
    /// False when the value was already current
    pub changed: bool,
}

// ============================================
// TREE DTOs
// ============================================

/// Query of `GET /api/tree/{path}`
#[derive(Debug, Default, Deserialize)]
pub struct TreeQuery {
    /// `start:stop[:step]`, bounds may be child names
    #[serde(default)]
    pub slice: Option<String>,
}

/// Child listing
#[derive(Debug, Serialize)]
pub struct ChildrenResponse {
    pub path: String,
    pub children: Vec<String>,
}

// ============================================
// HEALTH DTOs
// ============================================

/// Full health status
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "healthy" or "shutting_down"
    pub status: String,
    pub uptime_seconds: u64,
    /// Open SSE and WebSocket connections
    pub live_connections: usize,
    pub watchables: usize,
    pub version: String,
}
