//! HTTP Server
//!
//! The connection dispatcher and streaming responder, built with Axum.
//!
//! # Endpoints
//!
//! ## Configured routes
//! Everything not listed below goes through the route table: static files,
//! streamed files, dynamic generators, redirects and live (SSE) routes.
//!
//! ## Values
//! - `GET /api/values/{path}` - Watchable or group as JSON
//! - `POST /api/values/{path}` - Set a watchable, or a group's children, from `{"value": ...}`
//! - `GET|POST /api/set?path=..&value=..` - Set a watchable from text
//! - `GET /api/tree/{path}?slice=start:stop:step` - Child names
//!
//! ## Health
//! - `GET /health/live` - Liveness check
//! - `GET /health/ready` - Readiness check
//! - `GET /health` - Full health status
//!
//! ## WebSocket
//! - `GET /ws` - Multi-path live updates
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use watchserv::config::Config;
//! use watchserv::hub::SubscriptionHub;
//! use watchserv::server::{serve, AppState, GeneratorRegistry, RouteTable};
//! use watchserv::watchable::WatchRegistry;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let hub = SubscriptionHub::new(config.hub.to_hub_config());
//!     let registry = Arc::new(WatchRegistry::new(hub));
//!     let routes = RouteTable::build(
//!         &config.routes(),
//!         &config.server.document_root,
//!         &GeneratorRegistry::with_builtins(),
//!     )?;
//!
//!     serve(AppState::new(registry, routes, config.server)).await?;
//!     Ok(())
//! }
//! ```

pub mod dispatch;
pub mod dto;
pub mod error;
pub mod files;
pub mod generator;
mod pages;
pub mod route_table;
pub mod routes;
pub mod state;

pub use dispatch::ConnectionState;
pub use error::{ServerError, ServerResult};
pub use generator::{
    ContentGenerator, GeneratedContent, GeneratorError, GeneratorRegistry, GeneratorRequest,
};
pub use route_table::{Route, RouteKind, RouteMatch, RouteTable};
pub use state::AppState;

use axum::{extract::DefaultBodyLimit, routing::get, Router};
use std::future::Future;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::hub::websocket_handler;

/// Build the router with all routes and middleware
pub fn build_router(state: AppState) -> Router {
    let max_body = state.config.max_body_bytes;
    let timeout = state.config.request_timeout();

    let api_routes = Router::new()
        .route("/values", get(routes::values::get_root))
        .route(
            "/values/*path",
            get(routes::values::get_value).post(routes::values::set_value),
        )
        .route(
            "/set",
            get(routes::values::set_from_query).post(routes::values::set_from_query),
        )
        .route("/tree", get(routes::tree::root_children))
        .route("/tree/*path", get(routes::tree::children));

    let health_routes = Router::new()
        .route("/live", get(routes::health::liveness))
        .route("/ready", get(routes::health::readiness))
        .route("/", get(routes::health::full_health));

    let shared_state = Arc::new(state);

    // The timeout bounds the time to response headers only; streamed
    // bodies and live connections are not cut off by it.
    Router::new()
        .nest("/api", api_routes)
        .nest("/health", health_routes)
        .route("/ws", get(websocket_handler))
        .fallback(dispatch::dispatch)
        .layer(DefaultBodyLimit::max(max_body))
        .layer(TimeoutLayer::new(timeout))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(shared_state)
}

/// Start the server and run until Ctrl+C or SIGTERM
pub async fn serve(state: AppState) -> Result<(), ServerError> {
    let addr = state.config.addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("watchserv listening on {}", addr);
    serve_with_shutdown(state, listener, shutdown_signal()).await
}

/// Serve on an already bound listener until `signal` completes
///
/// On shutdown the hub closes every live connection first, so open event
/// streams end and the graceful shutdown can finish.
pub async fn serve_with_shutdown<F>(
    state: AppState,
    listener: tokio::net::TcpListener,
    signal: F,
) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let hub = state.hub.clone();
    let router = build_router(state);

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            signal.await;
            hub.shutdown();
        })
        .await
        .map_err(|e| ServerError::Internal(format!("Server error: {}", e)))?;

    tracing::info!("watchserv shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
