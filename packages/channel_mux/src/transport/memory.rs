//! In-process transport.
//!
//! Every `open` creates a [`MemoryLink`] that records outbound text and stays
//! in `Connecting` until the owner calls [`MemoryLink::open`]. Inbound frames
//! and drops are injected by hand, so tests can walk the multiplexer through
//! any interleaving of socket events without a network.

use std::sync::Arc;

use parking_lot::Mutex;

use super::{ConnectionState, Connector, Transport, TransportEvents};
use crate::error::MuxError;
use crate::frame::Frame;

/// Connector that hands out [`MemoryLink`]s and remembers them.
#[derive(Clone, Default)]
pub struct MemoryConnector {
    links: Arc<Mutex<Vec<Arc<MemoryLink>>>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every link opened so far, oldest first.
    pub fn links(&self) -> Vec<Arc<MemoryLink>> {
        self.links.lock().clone()
    }

    pub fn last_link(&self) -> Option<Arc<MemoryLink>> {
        self.links.lock().last().cloned()
    }
}

impl Connector for MemoryConnector {
    fn open(&self, url: &str, events: TransportEvents) -> Arc<dyn Transport> {
        let link = Arc::new(MemoryLink {
            url: url.to_string(),
            state: Mutex::new(ConnectionState::Connecting),
            sent: Mutex::new(Vec::new()),
            events,
        });
        self.links.lock().push(link.clone());
        link
    }
}

/// One simulated connection.
pub struct MemoryLink {
    url: String,
    state: Mutex<ConnectionState>,
    sent: Mutex<Vec<String>>,
    events: TransportEvents,
}

impl MemoryLink {
    /// URL the multiplexer asked for, credentials included.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Connection generation the multiplexer assigned to this link.
    pub fn generation(&self) -> u64 {
        self.events.generation()
    }

    /// Mark the link open and fire the on-open handler.
    pub fn open(&self) {
        *self.state.lock() = ConnectionState::Open;
        self.events.opened();
    }

    /// Feed raw text as if it arrived from the server.
    pub fn deliver(&self, text: &str) {
        self.events.message(text);
    }

    pub fn deliver_frame(&self, frame: &Frame) {
        if let Ok(text) = frame.encode() {
            self.deliver(&text);
        }
    }

    /// Simulate the server going away.
    pub fn drop_connection(&self) {
        *self.state.lock() = ConnectionState::Closed;
        self.events.closed();
    }

    /// Raw text sent through this link, in order.
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    /// Sent text parsed back into frames; unparsable entries are skipped.
    pub fn sent_frames(&self) -> Vec<Frame> {
        self.sent
            .lock()
            .iter()
            .filter_map(|text| Frame::decode(text).ok())
            .collect()
    }

    /// Sent frames, clearing the record.
    pub fn take_sent_frames(&self) -> Vec<Frame> {
        let sent = std::mem::take(&mut *self.sent.lock());
        sent.iter()
            .filter_map(|text| Frame::decode(text).ok())
            .collect()
    }
}

impl Transport for MemoryLink {
    fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    fn send(&self, text: String) -> Result<(), MuxError> {
        if self.state() != ConnectionState::Open {
            return Err(MuxError::NotOpen);
        }
        self.sent.lock().push(text);
        Ok(())
    }

    fn close(&self) {
        *self.state.lock() = ConnectionState::Closed;
    }
}
