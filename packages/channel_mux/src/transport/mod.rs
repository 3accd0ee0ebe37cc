//! Physical connection seam.
//!
//! Submodules:
//! - `websocket`: tokio-tungstenite client, one task per connection
//! - `memory`: in-process transport driven by hand, for tests and embedding

use std::sync::{Arc, Weak};

use futures::future::BoxFuture;

use crate::error::MuxError;
use crate::multiplexer::Shared;

pub mod memory;
pub mod websocket;

pub use memory::{MemoryConnector, MemoryLink};
pub use websocket::WebSocketConnector;

/// Lifecycle of the physical connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// No transport exists.
    Disconnected,
    /// Handshake in progress.
    Connecting,
    Open,
    Closed,
}

/// A live (or dying) connection owned by the multiplexer.
pub trait Transport: Send + Sync {
    fn state(&self) -> ConnectionState;

    /// Queue one text message. Must not block.
    fn send(&self, text: String) -> Result<(), MuxError>;

    fn close(&self);

    /// Resolves once everything queued before `close` has been written and
    /// the connection is torn down. Transports without a background task are
    /// finished immediately.
    fn finished(&self) -> BoxFuture<'static, ()> {
        Box::pin(std::future::ready(()))
    }
}

/// Opens transports for a multiplexer.
pub trait Connector: Send + Sync {
    /// Start connecting to `url`, reporting lifecycle through `events`.
    ///
    /// `events` must not be invoked before this call returns: the multiplexer
    /// holds its registry lock while opening.
    fn open(&self, url: &str, events: TransportEvents) -> Arc<dyn Transport>;
}

/// Sink for transport lifecycle events, bound to one connection generation.
///
/// Events from a generation the multiplexer has since replaced (by
/// `disconnect` or a fresh `connect`) are ignored.
#[derive(Clone)]
pub struct TransportEvents {
    shared: Weak<Shared>,
    generation: u64,
}

impl TransportEvents {
    pub(crate) fn new(shared: Weak<Shared>, generation: u64) -> Self {
        Self { shared, generation }
    }

    /// The transport became ready to send.
    pub fn opened(&self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.handle_open(self.generation);
        }
    }

    /// A raw text message arrived.
    pub fn message(&self, text: &str) {
        if let Some(shared) = self.shared.upgrade() {
            shared.handle_message(self.generation, text);
        }
    }

    /// The transport went away, cleanly or not.
    pub fn closed(&self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.handle_close(self.generation);
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}
