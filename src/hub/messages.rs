//! Live Update Message Types
//!
//! Frames pushed to live connections and the JSON messages exchanged over
//! the WebSocket channel.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::watchable::{Agent, ChangeEvent, Value};

/// One change, as queued for and written to a live connection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveFrame {
    /// Hub-wide sequence number, sent as the SSE event id
    #[serde(skip)]
    pub seq: u64,
    pub path: String,
    pub value: Value,
    pub old_value: Value,
    /// Unix timestamp in milliseconds
    pub timestamp: i64,
    pub agent: Agent,
    /// Frames for this path discarded since the last delivery
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dropped: Option<u64>,
}

impl LiveFrame {
    pub fn from_event(seq: u64, event: &ChangeEvent) -> Self {
        Self {
            seq,
            path: event.path.clone(),
            value: event.new_value.clone(),
            old_value: event.old_value.clone(),
            timestamp: event.timestamp,
            agent: event.agent,
            dropped: None,
        }
    }
}

/// Messages sent from client to server
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Start receiving changes of these watchables
    Subscribe { paths: Vec<String> },
    /// Stop receiving changes of these watchables
    Unsubscribe { paths: Vec<String> },
    /// Set a watchable (agent `user`)
    Set { path: String, value: Value },
    /// Ping for keepalive
    Ping,
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Connection established
    Connected { connection_id: String },
    /// Subscription confirmed, with the current value of each path
    Subscribed {
        paths: Vec<String>,
        values: IndexMap<String, Value>,
    },
    /// Unsubscription confirmed
    Unsubscribed { paths: Vec<String> },
    /// A subscribed watchable changed
    Change(LiveFrame),
    /// Result of a `set`
    Value { path: String, value: Value },
    /// Pong response to ping
    Pong,
    /// Error message
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> LiveFrame {
        LiveFrame {
            seq: 7,
            path: "/app/counter".to_string(),
            value: Value::Int(1),
            old_value: Value::Int(0),
            timestamp: 1699000000000,
            agent: Agent::App,
            dropped: None,
        }
    }

    #[test]
    fn test_frame_json() {
        let json = serde_json::to_value(frame()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "path": "/app/counter",
                "value": 1,
                "old_value": 0,
                "timestamp": 1699000000000i64,
                "agent": "app"
            })
        );
    }

    #[test]
    fn test_dropped_count_serialized() {
        let mut f = frame();
        f.dropped = Some(3);
        let json = serde_json::to_value(f).unwrap();
        assert_eq!(json["dropped"], 3);
    }

    #[test]
    fn test_client_message_parsing() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"subscribe","paths":["/app/counter"]}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Subscribe { paths } if paths == ["/app/counter"]));

        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"set","path":"/app/mode","value":"run"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Set { value: Value::Text(_), .. }));

        let msg: ClientMessage = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Ping));

        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"shout"}"#).is_err());
    }

    #[test]
    fn test_server_message_tags() {
        let json = serde_json::to_value(ServerMessage::Change(frame())).unwrap();
        assert_eq!(json["type"], "change");
        assert_eq!(json["path"], "/app/counter");
        assert_eq!(json["value"], 1);

        let json = serde_json::to_value(ServerMessage::Pong).unwrap();
        assert_eq!(json, serde_json::json!({"type": "pong"}));
    }
}
