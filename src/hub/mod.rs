//! Live Update Hub
//!
//! Pushes watchable changes to connected clients.
//!
//! ## Architecture
//!
//! - **SubscriptionHub**: Manages all live connections and their path subscriptions
//! - **Outbox**: Bounded drop-oldest queue per connection, one lane per path
//! - **SSE**: `text/event-stream` responses following a single watchable
//! - **Handler**: WebSocket upgrade and message processing
//! - **Messages**: Frame and client/server message formats
//!
//! A change never writes to a socket on the mutating thread: the hub only
//! queues the frame, and each connection's own task drains its outbox.
//!
//! ## Usage
//!
//! Clients either open an event stream on a live route (for example
//! `/live/app/counter`) or connect to `/ws` and subscribe to paths:
//!
//! ```javascript
//! // Browser
//! const events = new EventSource('/live/app/counter');
//! events.addEventListener('change', (e) => console.log(JSON.parse(e.data)));
//!
//! const ws = new WebSocket('ws://localhost:8080/ws');
//! ws.onopen = () => {
//!   ws.send(JSON.stringify({type: 'subscribe', paths: ['/app/counter']}));
//! };
//! ```

mod handler;
mod hub;
mod messages;
mod outbox;
mod sse;

pub use handler::websocket_handler;
pub use hub::{
    ConnectionGuard, ConnectionId, Delivery, HubConfig, HubError, SubscriptionHub, Transport,
};
pub use messages::{ClientMessage, LiveFrame, ServerMessage};
pub use outbox::Outbox;
pub use sse::{create_sse_response, event_stream, frame_event};
