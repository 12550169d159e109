//! SSE (Server-Sent Events) live channel
//!
//! One event stream follows one watchable. Each change is written as a
//! `change` event whose id is the hub sequence number and whose data is the
//! JSON frame; SSE's blank-line framing keeps frames self-delimiting.

use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::Stream;
use std::collections::VecDeque;
use std::convert::Infallible;
use std::time::Duration;

use super::hub::ConnectionGuard;
use super::messages::LiveFrame;

/// Turn a frame into an SSE event
pub fn frame_event(frame: &LiveFrame) -> Event {
    let event = Event::default().event("change").id(frame.seq.to_string());
    match event.json_data(frame) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(path = %frame.path, error = %e, "Failed to encode SSE frame");
            Event::default().comment("encoding error")
        }
    }
}

/// Stream the frames of a registered connection
///
/// The stream owns the guard: when the client disconnects axum drops the
/// stream and the connection is unregistered. The stream ends when the
/// outbox is closed (path removed or server shutdown).
pub fn event_stream(guard: ConnectionGuard) -> impl Stream<Item = Result<Event, Infallible>> {
    futures_util::stream::unfold(
        (guard, VecDeque::<LiveFrame>::new()),
        |(guard, mut pending)| async move {
            loop {
                if let Some(frame) = pending.pop_front() {
                    tracing::trace!(connection_id = %guard.id(), seq = frame.seq, "Sending SSE event");
                    let event = frame_event(&frame);
                    return Some((Ok(event), (guard, pending)));
                }

                match guard.outbox().recv().await {
                    Some(frames) => pending.extend(frames),
                    None => {
                        tracing::debug!(connection_id = %guard.id(), "SSE stream ended");
                        return None;
                    }
                }
            }
        },
    )
}

/// Create SSE response with periodic `:heartbeat` comments
pub fn create_sse_response(
    guard: ConnectionGuard,
    heartbeat: Duration,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    Sse::new(event_stream(guard)).keep_alive(KeepAlive::new().interval(heartbeat).text("heartbeat"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::{HubConfig, SubscriptionHub, Transport};
    use crate::watchable::{Agent, ChangeEvent, Value};
    use futures_util::StreamExt;

    #[tokio::test]
    async fn test_stream_yields_frames_then_ends() {
        let hub = SubscriptionHub::new(HubConfig::default());
        let guard = hub.register(Transport::EventStream).unwrap();
        guard.subscribe(vec!["/app/counter".to_string()]).unwrap();

        hub.publish(&ChangeEvent {
            path: "/app/counter".to_string(),
            old_value: Value::Int(0),
            new_value: Value::Int(1),
            timestamp: 1,
            agent: Agent::App,
        });

        let mut stream = Box::pin(event_stream(guard));
        assert!(stream.next().await.is_some());
        assert_eq!(hub.connection_count(), 1);

        hub.forget_path("/app/counter");
        assert!(stream.next().await.is_none());

        drop(stream);
        assert_eq!(hub.connection_count(), 0);
    }
}
