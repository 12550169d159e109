//! WebSocket Handler
//!
//! Handles WebSocket upgrade requests and manages the connection lifecycle.
//! A connection may follow any number of watchables and may set values.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use indexmap::IndexMap;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::hub::{ConnectionGuard, Transport};
use super::messages::{ClientMessage, ServerMessage};

/// Replies a connection may have queued before it counts as not reading
const REPLY_QUEUE: usize = 32;
use crate::server::{AppState, ServerError};
use crate::watchable::{Agent, WatchRegistry};

/// WebSocket upgrade handler
///
/// This is the entry point for WebSocket connections. The connection is
/// registered before the upgrade so a full hub is reported as an HTTP error.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    let guard = match state.hub.register(Transport::WebSocket) {
        Ok(guard) => guard,
        Err(e) => {
            tracing::warn!(error = %e, "Refusing WebSocket connection");
            return ServerError::from(e).into_response();
        }
    };

    let registry = Arc::clone(&state.registry);
    let heartbeat = state.hub.config().heartbeat;
    ws.on_upgrade(move |socket| handle_socket(socket, guard, registry, heartbeat))
}

fn encode(message: &ServerMessage) -> Option<Message> {
    match serde_json::to_string(message) {
        Ok(text) => Some(Message::Text(text)),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize message");
            None
        }
    }
}

/// Handle an established WebSocket connection
async fn handle_socket(
    socket: WebSocket,
    guard: ConnectionGuard,
    registry: Arc<WatchRegistry>,
    heartbeat: std::time::Duration,
) {
    let guard = Arc::new(guard);
    let connection_id = guard.id().to_string();
    let (mut sender, mut receiver) = socket.split();

    // Direct replies (subscribed, value, pong, error) from the receive side
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(REPLY_QUEUE);

    let connected = ServerMessage::Connected {
        connection_id: connection_id.clone(),
    };
    let Some(connected) = encode(&connected) else {
        return;
    };
    if sender.send(connected).await.is_err() {
        tracing::error!(connection_id = %connection_id, "Failed to send connected message");
        return;
    }

    let guard_for_send = Arc::clone(&guard);
    let conn_id_for_send = connection_id.clone();

    // Task to forward replies, queued changes and heartbeats to the socket
    let mut send_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(heartbeat);
        ticker.tick().await;

        loop {
            let outgoing: Vec<Message> = tokio::select! {
                reply = rx.recv() => match reply {
                    Some(msg) => encode(&msg).into_iter().collect(),
                    None => break,
                },
                frames = guard_for_send.outbox().recv() => match frames {
                    Some(frames) => frames
                        .into_iter()
                        .filter_map(|f| encode(&ServerMessage::Change(f)))
                        .collect(),
                    None => {
                        tracing::debug!(connection_id = %conn_id_for_send, "Outbox closed");
                        break;
                    }
                },
                _ = ticker.tick() => vec![Message::Ping(Vec::new())],
            };

            for msg in outgoing {
                if sender.send(msg).await.is_err() {
                    tracing::debug!(
                        connection_id = %conn_id_for_send,
                        "WebSocket send failed, closing connection"
                    );
                    return;
                }
            }
        }
        let _ = sender.send(Message::Close(None)).await;
    });

    let guard_for_recv = Arc::clone(&guard);
    let conn_id_for_recv = connection_id.clone();

    // Task to receive messages from WebSocket and handle them
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(msg) => {
                    if !handle_ws_message(&guard_for_recv, &registry, &tx, msg) {
                        break;
                    }
                }
                Err(e) => {
                    tracing::debug!(
                        connection_id = %conn_id_for_recv,
                        error = %e,
                        "WebSocket receive error"
                    );
                    break;
                }
            }
        }
    });

    // Wait for either task to complete
    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
        }
        _ = &mut recv_task => {
            send_task.abort();
        }
    }

    // Both tasks are finished or aborted; dropping the last guard unregisters
    tracing::debug!(connection_id = %connection_id, "WebSocket closed");
}

/// Handle a received WebSocket message
///
/// Returns false if the connection should be closed.
fn handle_ws_message(
    guard: &ConnectionGuard,
    registry: &WatchRegistry,
    tx: &mpsc::Sender<ServerMessage>,
    message: Message,
) -> bool {
    match message {
        Message::Text(text) => {
            let reply = match serde_json::from_str::<ClientMessage>(&text) {
                Ok(client_msg) => handle_client_message(guard, registry, client_msg),
                Err(e) => {
                    tracing::debug!(
                        connection_id = %guard.id(),
                        error = %e,
                        text = %text,
                        "Invalid client message"
                    );
                    // Send error but keep connection open
                    ServerMessage::Error {
                        message: format!("Invalid message format: {}", e),
                    }
                }
            };
            queue_reply(guard, tx, reply)
        }
        Message::Binary(_) => {
            let reply = ServerMessage::Error {
                message: "Binary messages not supported".to_string(),
            };
            queue_reply(guard, tx, reply)
        }
        // Axum answers pings; pongs just prove the peer is alive
        Message::Ping(_) | Message::Pong(_) => true,
        Message::Close(_) => {
            tracing::debug!(connection_id = %guard.id(), "Client requested close");
            false
        }
    }
}

/// A peer that keeps sending without reading its replies is dropped
fn queue_reply(
    guard: &ConnectionGuard,
    tx: &mpsc::Sender<ServerMessage>,
    reply: ServerMessage,
) -> bool {
    match tx.try_send(reply) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(_)) => {
            tracing::warn!(
                connection_id = %guard.id(),
                "Reply queue full, closing connection"
            );
            false
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}

/// Handle a parsed client message and produce the reply
fn handle_client_message(
    guard: &ConnectionGuard,
    registry: &WatchRegistry,
    message: ClientMessage,
) -> ServerMessage {
    match message {
        ClientMessage::Subscribe { paths } => {
            let mut canonical = Vec::with_capacity(paths.len());
            for path in &paths {
                match registry.watchable(path) {
                    Ok(w) => canonical.push(w.path().to_string()),
                    Err(e) => {
                        tracing::debug!(connection_id = %guard.id(), path = %path, error = %e, "Subscribe rejected");
                        return ServerMessage::Error {
                            message: e.to_string(),
                        };
                    }
                }
            }

            match guard.subscribe(canonical) {
                Ok(subscribed) => {
                    let values: IndexMap<_, _> = subscribed
                        .iter()
                        .filter_map(|p| registry.get(p).ok().map(|v| (p.clone(), v)))
                        .collect();
                    ServerMessage::Subscribed {
                        paths: subscribed,
                        values,
                    }
                }
                Err(e) => {
                    tracing::error!(connection_id = %guard.id(), error = %e, "Subscribe error");
                    ServerMessage::Error {
                        message: e.to_string(),
                    }
                }
            }
        }
        ClientMessage::Unsubscribe { paths } => {
            let paths = paths
                .into_iter()
                .map(|p| {
                    registry
                        .watchable(&p)
                        .map(|w| w.path().to_string())
                        .unwrap_or(p)
                })
                .collect();
            ServerMessage::Unsubscribed {
                paths: guard.unsubscribe(paths),
            }
        }
        ClientMessage::Set { path, value } => {
            let result = registry
                .watchable(&path)
                .and_then(|w| w.set(value, Agent::User).map(|_| w));
            match result {
                Ok(w) => ServerMessage::Value {
                    path: w.path().to_string(),
                    value: w.get(),
                },
                Err(e) => ServerMessage::Error {
                    message: e.to_string(),
                },
            }
        }
        ClientMessage::Ping => ServerMessage::Pong,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::{HubConfig, SubscriptionHub};
    use crate::watchable::{Kind, Value};

    fn setup() -> (Arc<WatchRegistry>, ConnectionGuard) {
        let hub = SubscriptionHub::new(HubConfig::default());
        let registry = Arc::new(WatchRegistry::new(hub.clone()));
        registry
            .register("/app/counter", Kind::int_range(0, 10), Some(Value::Int(0)))
            .unwrap();
        let guard = hub.register(Transport::WebSocket).unwrap();
        (registry, guard)
    }

    #[test]
    fn test_subscribe_reports_current_values() {
        let (registry, guard) = setup();
        let reply = handle_client_message(
            &guard,
            &registry,
            ClientMessage::Subscribe {
                paths: vec!["/app/./counter".to_string()],
            },
        );
        match reply {
            ServerMessage::Subscribed { paths, values } => {
                assert_eq!(paths, vec!["/app/counter"]);
                assert_eq!(values.get("/app/counter"), Some(&Value::Int(0)));
            }
            other => panic!("unexpected reply: {:?}", other),
        }
        assert_eq!(registry.hub().subscription_count("/app/counter"), 1);
    }

    #[test]
    fn test_subscribe_unknown_path_errors() {
        let (registry, guard) = setup();
        let reply = handle_client_message(
            &guard,
            &registry,
            ClientMessage::Subscribe {
                paths: vec!["/nope".to_string()],
            },
        );
        assert!(matches!(reply, ServerMessage::Error { .. }));
    }

    #[tokio::test]
    async fn test_set_is_user_change_and_reaches_subscribers() {
        let (registry, guard) = setup();
        handle_client_message(
            &guard,
            &registry,
            ClientMessage::Subscribe {
                paths: vec!["/app/counter".to_string()],
            },
        );

        let reply = handle_client_message(
            &guard,
            &registry,
            ClientMessage::Set {
                path: "/app/counter".to_string(),
                value: Value::Int(4),
            },
        );
        assert!(matches!(reply, ServerMessage::Value { value: Value::Int(4), .. }));

        let frames = guard.outbox().recv().await.unwrap();
        assert_eq!(frames[0].agent, Agent::User);
        assert_eq!(frames[0].value, Value::Int(4));
    }

    #[test]
    fn test_invalid_set_reports_error() {
        let (registry, guard) = setup();
        let reply = handle_client_message(
            &guard,
            &registry,
            ClientMessage::Set {
                path: "/app/counter".to_string(),
                value: Value::Int(99),
            },
        );
        assert!(matches!(reply, ServerMessage::Error { .. }));
        assert_eq!(registry.get("/app/counter").unwrap(), Value::Int(0));
    }

    #[test]
    fn test_unread_replies_close_connection() {
        let (registry, guard) = setup();
        let (tx, mut rx) = mpsc::channel(1);
        let ping = || Message::Text(r#"{"type":"ping"}"#.to_string());

        assert!(handle_ws_message(&guard, &registry, &tx, ping()));
        assert!(!handle_ws_message(&guard, &registry, &tx, ping()));

        assert!(matches!(rx.try_recv(), Ok(ServerMessage::Pong)));
        assert!(handle_ws_message(&guard, &registry, &tx, ping()));
        drop(rx);
        assert!(!handle_ws_message(&guard, &registry, &tx, ping()));
    }

    #[test]
    fn test_ping() {
        let (registry, guard) = setup();
        assert!(matches!(
            handle_client_message(&guard, &registry, ClientMessage::Ping),
            ServerMessage::Pong
        ));
    }
}
