//! Tree Routes
//!
//! - GET /api/tree?slice=a:b:c - children of the root
//! - GET /api/tree/{path}?slice=a:b:c - children of a group

use axum::{
    extract::{Path, Query, State},
    Json,
};
use std::sync::Arc;

use crate::server::dto::{ChildrenResponse, TreeQuery};
use crate::server::error::ServerResult;
use crate::server::state::AppState;
use crate::tree::{path, SliceSpec};

fn list_children(state: &AppState, node_path: &str, query: &TreeQuery) -> ServerResult<ChildrenResponse> {
    let spec = match query.slice.as_deref() {
        Some(text) if !text.is_empty() => text.parse::<SliceSpec>()?,
        _ => SliceSpec::all(),
    };

    Ok(ChildrenResponse {
        path: path::normalize(node_path),
        children: state.registry.children(node_path, &spec)?,
    })
}

/// GET /api/tree
pub async fn root_children(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TreeQuery>,
) -> ServerResult<Json<ChildrenResponse>> {
    Ok(Json(list_children(&state, "/", &query)?))
}

/// GET /api/tree/{path}
pub async fn children(
    State(state): State<Arc<AppState>>,
    Path(node_path): Path<String>,
    Query(query): Query<TreeQuery>,
) -> ServerResult<Json<ChildrenResponse>> {
    Ok(Json(list_children(&state, &format!("/{}", node_path), &query)?))
}
