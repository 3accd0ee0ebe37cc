use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::frame::Frame;
use crate::multiplexer::Shared;

/// Outcome of [`ChannelHandle::join`].
///
/// `Sent` means the join frame went out on an open socket, not that the server
/// accepted it; acceptance arrives later as a `phx_reply` and flips
/// [`ChannelHandle::is_joined`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinStatus {
    Sent,
    /// Socket not open; the join is sent when it opens.
    Deferred,
}

impl JoinStatus {
    pub fn is_ok(self) -> bool {
        matches!(self, JoinStatus::Sent)
    }
}

/// Conceptual lifecycle of a channel, derived from registry membership.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelState {
    Unjoined,
    /// Join requested before the socket opened.
    Pending,
    JoinSent,
    Joined,
    /// No registry entry exists for the topic.
    Left,
}

/// Handle bound to one topic on a [`ChannelMux`](crate::ChannelMux).
///
/// Handles are keyed by topic: every handle for the same topic operates on the
/// same registry entry, and an operation on a handle whose topic was left
/// recreates a fresh entry.
#[derive(Clone)]
pub struct ChannelHandle {
    topic: String,
    shared: Arc<Shared>,
}

impl ChannelHandle {
    pub(crate) fn new(topic: String, shared: Arc<Shared>) -> Self {
        Self { topic, shared }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Subscribe the topic on the connection.
    ///
    /// With the socket open the join frame is sent now. Otherwise the topic is
    /// parked in the pending set and joined by the on-open handler.
    pub async fn join(&self) -> JoinStatus {
        let mut state = self.shared.lock();
        state.registry.ensure(&self.topic);

        if let Some(transport) = state.open_transport() {
            let frame = Frame::join(self.topic.as_str(), self.shared.next_ref());
            match self.shared.send(transport.as_ref(), &frame) {
                Ok(()) => {
                    state.registry.cancel_pending(&self.topic);
                    if let Some(entry) = state.registry.get_mut(&self.topic) {
                        entry.join_sent = true;
                    }
                    debug!(topic = %self.topic, "join sent");
                    return JoinStatus::Sent;
                }
                Err(e) => warn!(topic = %self.topic, "join send failed, deferring: {e}"),
            }
        }

        state.registry.mark_pending(&self.topic);
        debug!(topic = %self.topic, "socket not open, join deferred");
        JoinStatus::Deferred
    }

    /// Register `callback` for `event` on this topic. Listeners accumulate and
    /// run in registration order.
    pub fn on<F>(&self, event: &str, callback: F)
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.shared
            .lock()
            .registry
            .ensure(&self.topic)
            .add_listener(event, Arc::new(callback));
    }

    /// Send `event` with `payload` on this topic.
    ///
    /// Returns `false` without queueing anything if the socket is not open.
    pub fn push(&self, event: &str, payload: Value) -> bool {
        let state = self.shared.lock();
        let Some(transport) = state.open_transport() else {
            trace!(topic = %self.topic, event, "socket not open, dropping push");
            return false;
        };

        let frame = Frame::new(self.topic.as_str(), event, payload, self.shared.next_ref());
        match self.shared.send(transport.as_ref(), &frame) {
            Ok(()) => true,
            Err(e) => {
                warn!(topic = %self.topic, event, "push failed: {e}");
                false
            }
        }
    }

    /// Unsubscribe the topic and drop its listeners.
    ///
    /// With the socket closed nothing is sent and the entry stays, but a join
    /// still waiting in the pending set is cancelled.
    pub fn leave(&self) {
        let mut state = self.shared.lock();
        let Some(transport) = state.open_transport() else {
            if state.registry.cancel_pending(&self.topic) {
                debug!(topic = %self.topic, "pending join cancelled");
            }
            return;
        };

        let frame = Frame::leave(self.topic.as_str(), self.shared.next_ref());
        if let Err(e) = self.shared.send(transport.as_ref(), &frame) {
            warn!(topic = %self.topic, "leave send failed: {e}");
        }
        state.registry.remove(&self.topic);
        debug!(topic = %self.topic, "left channel");
    }

    /// True once the server acknowledged the join (or the on-open handler sent
    /// a deferred one).
    pub fn is_joined(&self) -> bool {
        self.shared
            .lock()
            .registry
            .get(&self.topic)
            .is_some_and(|entry| entry.joined)
    }

    pub fn state(&self) -> ChannelState {
        let state = self.shared.lock();
        if state.registry.is_pending(&self.topic) {
            return ChannelState::Pending;
        }
        match state.registry.get(&self.topic) {
            None => ChannelState::Left,
            Some(entry) if entry.joined => ChannelState::Joined,
            Some(entry) if entry.join_sent => ChannelState::JoinSent,
            Some(_) => ChannelState::Unjoined,
        }
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.shared
            .lock()
            .registry
            .get(&self.topic)
            .map_or(0, |entry| entry.listener_count(event))
    }
}

impl fmt::Debug for ChannelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelHandle")
            .field("topic", &self.topic)
            .finish_non_exhaustive()
    }
}
