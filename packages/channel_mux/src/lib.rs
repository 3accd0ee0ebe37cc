//! Channel Mux - topic-multiplexed channels over one real-time socket
//!
//! A [`ChannelMux`] owns a single physical connection and a registry of logical
//! channels keyed by topic (`"user:42"`, `"conversation:7"`, ...). Each channel
//! has its own join/leave lifecycle and a table of event listeners; inbound
//! frames are fanned out to the listeners registered for their
//! `(topic, event)` pair.
//!
//! The crate knows nothing about the application riding on top of it. Event
//! names other than the reserved `phx_join` / `phx_leave` / `phx_reply` are
//! opaque strings.
//!
//! # Example
//!
//! ```no_run
//! use channel_mux::{ChannelMux, Endpoint};
//!
//! #[tokio::main]
//! async fn main() {
//!     let endpoint = Endpoint::parse("ws://127.0.0.1:4000/socket/websocket").unwrap();
//!     let mux = ChannelMux::websocket(endpoint);
//!
//!     mux.connect("42", "secret-token");
//!
//!     let user = mux.channel("user:42");
//!     user.on("new_message", |payload| {
//!         println!("new message: {payload}");
//!     });
//!
//!     // Deferred until the socket opens; the join is sent from the on-open handler.
//!     let status = user.join().await;
//!     println!("join: {status:?}");
//! }
//! ```

mod channel;
mod error;
mod frame;
mod multiplexer;
mod registry;
pub mod transport;

pub use channel::{ChannelHandle, ChannelState, JoinStatus};
pub use error::MuxError;
pub use frame::{
    Frame, HEARTBEAT_EVENT, HEARTBEAT_TOPIC, JOIN_EVENT, LEAVE_EVENT, REPLY_EVENT, is_ok_reply,
};
pub use multiplexer::{ChannelMux, Endpoint};
pub use registry::Callback;
pub use transport::{ConnectionState, Connector, Transport, TransportEvents};
