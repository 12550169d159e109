//! Connection dispatcher
//!
//! Every request that no built-in endpoint claims lands here. The request
//! has already been read by hyper (within the body limit and timeout
//! layers); the dispatcher looks the path up in the route table and hands
//! the connection to a generator, the file responder or the hub.

use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::error::{ServerError, ServerResult};
use super::files::{self, FileMode};
use super::generator::{GeneratedContent, GeneratorRequest};
use super::route_table::RouteKind;
use super::state::AppState;
use crate::hub::{create_sse_response, Transport};

/// Where a connection is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Reading,
    Dispatching,
    /// Answered with a buffered or streamed body
    Responding,
    /// Handed to the hub as a standing subscription
    Upgraded,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Reading => "reading",
            ConnectionState::Dispatching => "dispatching",
            ConnectionState::Responding => "responding",
            ConnectionState::Upgraded => "upgraded",
        };
        f.write_str(name)
    }
}

/// Fallback handler: route-table dispatch
pub async fn dispatch(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let path = uri.path().to_string();
    tracing::trace!(method = %method, path = %path, state = %ConnectionState::Reading, "Request read");
    tracing::trace!(path = %path, state = %ConnectionState::Dispatching, "Looking up route");

    match route(&state, method, &path, &headers, query).await {
        Ok((next, response)) => {
            tracing::debug!(path = %path, status = %response.status(), state = %next, "Request dispatched");
            response
        }
        Err(e) => e.into_response(),
    }
}

async fn route(
    state: &AppState,
    method: Method,
    path: &str,
    headers: &HeaderMap,
    query: HashMap<String, String>,
) -> ServerResult<(ConnectionState, Response)> {
    let matched = state
        .routes
        .lookup(path)
        .ok_or_else(|| ServerError::NotFound(path.to_string()))?;
    let route = matched.route;

    if !route.allows(&method) {
        return Err(ServerError::MethodNotAllowed {
            method,
            allow: route.methods.clone(),
        });
    }

    let response = match &route.kind {
        RouteKind::Dynamic { name, generator } => {
            let request = GeneratorRequest {
                path: path.to_string(),
                method: method.clone(),
                params: matched.params,
                query,
                registry: Arc::clone(&state.registry),
            };
            let generator = Arc::clone(generator);
            let task = tokio::task::spawn_blocking(move || generator.generate(&request));

            let content = match tokio::time::timeout(state.config.request_timeout(), task).await {
                Err(_) => {
                    tracing::warn!(generator = %name, path = %path, "Generator timed out");
                    return Err(ServerError::Timeout);
                }
                Ok(Err(join)) => {
                    return Err(ServerError::Generator(format!(
                        "generator '{}' panicked: {}",
                        name, join
                    )))
                }
                Ok(Ok(Err(e))) => {
                    return Err(ServerError::Generator(format!("generator '{}': {}", name, e)))
                }
                Ok(Ok(Ok(content))) => content,
            };
            buffered(content, &method)?
        }
        RouteKind::StaticFiles { root } => {
            let file = files::resolve_within_root(root, &matched.rest).await?;
            files::serve_file(&file, FileMode::Static, &method, headers, state.config.chunk_size)
                .await?
        }
        RouteKind::FileStream { root } => {
            let file = files::resolve_within_root(root, &matched.rest).await?;
            files::serve_file(&file, FileMode::Stream, &method, headers, state.config.chunk_size)
                .await?
        }
        RouteKind::Redirect { location } => {
            let location = HeaderValue::from_str(location)
                .map_err(|e| ServerError::Internal(format!("bad redirect location: {}", e)))?;
            (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, location)]).into_response()
        }
        RouteKind::Live => {
            let decoded = urlencoding::decode(&matched.rest)
                .map_err(|_| ServerError::BadRequest(format!("invalid path encoding: {}", path)))?;
            let watchable = state.registry.watchable(&format!("/{}", decoded))?;

            let guard = state.hub.register(Transport::EventStream)?;
            guard.subscribe(vec![watchable.path().to_string()])?;
            tracing::info!(
                connection_id = %guard.id(),
                path = %watchable.path(),
                "Live connection opened"
            );

            let response = create_sse_response(guard, state.hub.config().heartbeat).into_response();
            return Ok((ConnectionState::Upgraded, response));
        }
    };

    Ok((ConnectionState::Responding, response))
}

fn buffered(content: GeneratedContent, method: &Method) -> ServerResult<Response> {
    let content_type = HeaderValue::from_str(&content.content_type)
        .map_err(|e| ServerError::Generator(format!("bad content type: {}", e)))?;
    let length = HeaderValue::from(content.body.len());

    let body = if method == Method::HEAD {
        Body::empty()
    } else {
        Body::from(content.body)
    };
    Ok((
        content.status,
        [(header::CONTENT_TYPE, content_type), (header::CONTENT_LENGTH, length)],
        body,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[test]
    fn test_state_names() {
        assert_eq!(ConnectionState::Upgraded.to_string(), "upgraded");
        assert_eq!(ConnectionState::Reading.to_string(), "reading");
    }

    #[tokio::test]
    async fn test_buffered_head_has_no_body() {
        let response = buffered(GeneratedContent::text("hello"), &Method::HEAD).unwrap();
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "5");
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_buffered_keeps_status() {
        let content = GeneratedContent::text("gone").with_status(StatusCode::GONE);
        let response = buffered(content, &Method::GET).unwrap();
        assert_eq!(response.status(), StatusCode::GONE);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain; charset=utf-8");
    }
}
