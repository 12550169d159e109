//! Value Routes
//!
//! Read and write watchables over plain HTTP. Writes are made on behalf of
//! [`Agent::User`] and go through the watchable's validation.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use std::sync::Arc;

use crate::server::dto::{GroupResponse, NodeResponse, SetQuery, SetResponse, SetValueRequest, ValueResponse};
use crate::server::error::ServerResult;
use crate::server::state::AppState;
use crate::tree::{path, SliceSpec};
use crate::watchable::{Agent, NodeSnapshot, WatchError, WatchRegistry};

fn node_response(registry: &WatchRegistry, node_path: &str) -> ServerResult<NodeResponse> {
    match registry.watchable(node_path) {
        Ok(watchable) => Ok(NodeResponse::Watchable(ValueResponse {
            path: watchable.path().to_string(),
            kind: watchable.kind().name().to_string(),
            value: watchable.get(),
        })),
        // a group: list it with its nested values
        Err(WatchError::NotWatchable(_)) => Ok(NodeResponse::Group(GroupResponse {
            path: path::normalize(node_path),
            children: registry.children(node_path, &SliceSpec::all())?,
            value: registry.snapshot(node_path)?,
        })),
        Err(e) => Err(e.into()),
    }
}

/// GET /api/values
pub async fn get_root(State(state): State<Arc<AppState>>) -> ServerResult<Json<NodeResponse>> {
    Ok(Json(node_response(&state.registry, "/")?))
}

/// GET /api/values/{path}
pub async fn get_value(
    State(state): State<Arc<AppState>>,
    Path(node_path): Path<String>,
) -> ServerResult<Json<NodeResponse>> {
    Ok(Json(node_response(&state.registry, &format!("/{}", node_path))?))
}

/// POST /api/values/{path}
///
/// Body: `{"value": ...}`. The JSON value must match the watchable's kind.
/// On a group the value is an object keyed by child name and is stored
/// all or nothing.
pub async fn set_value(
    State(state): State<Arc<AppState>>,
    Path(node_path): Path<String>,
    Json(request): Json<SetValueRequest>,
) -> ServerResult<Json<SetResponse>> {
    let node_path = path::normalize(&format!("/{}", node_path));
    let changed = state.registry.apply(&node_path, request.value, Agent::User)?;

    tracing::debug!(path = %node_path, changed = changed.len(), "Value set over HTTP");
    Ok(Json(SetResponse {
        value: state.registry.snapshot(&node_path)?,
        path: node_path,
        changed: !changed.is_empty(),
    }))
}

/// GET/POST /api/set?path=..&value=..
///
/// The value is text and is parsed according to the watchable's kind.
pub async fn set_from_query(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SetQuery>,
) -> ServerResult<Json<SetResponse>> {
    let watchable = state.registry.watchable(&query.path)?;
    let changed = watchable.set_text(&query.value, Agent::User)?;

    tracing::debug!(path = %watchable.path(), changed, "Value set from query");
    Ok(Json(SetResponse {
        path: watchable.path().to_string(),
        value: NodeSnapshot::Value(watchable.get()),
        changed,
    }))
}
