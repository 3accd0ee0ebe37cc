use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

use crate::channel::ChannelHandle;
use crate::error::MuxError;
use crate::frame::{Frame, is_ok_reply};
use crate::registry::Registry;
use crate::transport::{
    ConnectionState, Connector, Transport, TransportEvents, WebSocketConnector,
};

/// Socket URL the multiplexer connects to. Identity and credential are
/// appended as query parameters on every `connect`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    url: String,
}

impl Endpoint {
    /// Accepts `ws://` and `wss://` URLs with a non-empty host.
    pub fn parse(url: &str) -> Result<Self, MuxError> {
        let url = url.trim();
        let rest = url
            .strip_prefix("ws://")
            .or_else(|| url.strip_prefix("wss://"))
            .ok_or_else(|| MuxError::InvalidEndpoint(format!("expected ws:// or wss://, got {url:?}")))?;

        let host = rest.split(['/', '?']).next().unwrap_or_default();
        if host.is_empty() {
            return Err(MuxError::InvalidEndpoint(format!("missing host in {url:?}")));
        }
        if url.contains('#') {
            return Err(MuxError::InvalidEndpoint(format!("fragment not allowed in {url:?}")));
        }

        Ok(Self {
            url: url.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.url
    }

    /// Handshake URL carrying `user_id` and `token` query parameters.
    pub fn url_for(&self, user_id: &str, token: &str) -> String {
        let sep = if self.url.contains('?') { '&' } else { '?' };
        format!(
            "{}{}user_id={}&token={}",
            self.url,
            sep,
            urlencoding::encode(user_id),
            urlencoding::encode(token)
        )
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

/// Everything guarded by the registry lock.
pub(crate) struct MuxState {
    pub transport: Option<Arc<dyn Transport>>,
    /// Bumped on every connect/disconnect; stale transport events are ignored.
    pub generation: u64,
    pub registry: Registry,
}

impl MuxState {
    /// The current transport, only if it is open.
    pub fn open_transport(&self) -> Option<Arc<dyn Transport>> {
        self.transport
            .as_ref()
            .filter(|t| t.state() == ConnectionState::Open)
            .cloned()
    }

    fn connection_state(&self) -> ConnectionState {
        self.transport
            .as_ref()
            .map_or(ConnectionState::Disconnected, |t| t.state())
    }
}

pub(crate) struct Shared {
    endpoint: Endpoint,
    connector: Arc<dyn Connector>,
    state: Mutex<MuxState>,
    next_ref: AtomicU64,
    state_tx: watch::Sender<ConnectionState>,
}

impl Shared {
    pub fn lock(&self) -> MutexGuard<'_, MuxState> {
        self.state.lock()
    }

    pub fn next_ref(&self) -> String {
        self.next_ref.fetch_add(1, Ordering::Relaxed).to_string()
    }

    pub fn send(&self, transport: &dyn Transport, frame: &Frame) -> Result<(), MuxError> {
        let text = frame.encode()?;
        transport.send(text)
    }

    /// On-open: send one join per pending topic, mark it joined, empty the set.
    pub fn handle_open(&self, generation: u64) {
        let mut state = self.state.lock();
        if state.generation != generation {
            debug!(generation, "ignoring open from stale transport");
            return;
        }
        let Some(transport) = state.transport.clone() else {
            return;
        };

        let topics = state.registry.drain_pending();
        info!(pending = topics.len(), "socket open");

        for topic in topics {
            let frame = Frame::join(topic.as_str(), self.next_ref());
            match self.send(transport.as_ref(), &frame) {
                Ok(()) => {
                    debug!(%topic, "sent deferred join");
                    if let Some(entry) = state.registry.get_mut(&topic) {
                        entry.join_sent = true;
                        entry.joined = true;
                    }
                }
                Err(e) => warn!(%topic, "failed to send deferred join: {e}"),
            }
        }

        self.state_tx.send_replace(ConnectionState::Open);
    }

    /// On-message: acknowledge joins, fan everything else out to listeners.
    pub fn handle_message(&self, generation: u64, text: &str) {
        let frame = match Frame::decode(text) {
            Ok(frame) => frame,
            Err(e) => {
                debug!("dropping inbound frame: {e}");
                return;
            }
        };

        let listeners = {
            let mut state = self.state.lock();
            if state.generation != generation {
                return;
            }
            let Some(entry) = state.registry.get_mut(&frame.topic) else {
                trace!(topic = %frame.topic, event = %frame.event, "dropping frame for unknown topic");
                return;
            };

            if is_ok_reply(&frame) {
                if !entry.joined {
                    debug!(topic = %frame.topic, "join acknowledged");
                }
                entry.joined = true;
                return;
            }

            entry.listeners(&frame.event)
        };

        trace!(
            topic = %frame.topic,
            event = %frame.event,
            listeners = listeners.len(),
            "dispatching frame"
        );
        for callback in listeners {
            callback(&frame.payload);
        }
    }

    pub fn handle_close(&self, generation: u64) {
        let state = self.state.lock();
        if state.generation != generation {
            return;
        }
        info!("socket closed");
        self.state_tx.send_replace(ConnectionState::Closed);
    }
}

/// One physical connection multiplexed into topic channels.
///
/// Clones share the same connection and registry, so a single `ChannelMux`
/// can be handed to every part of an application that needs channels.
#[derive(Clone)]
pub struct ChannelMux {
    shared: Arc<Shared>,
}

impl ChannelMux {
    pub fn new(endpoint: Endpoint, connector: impl Connector + 'static) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            shared: Arc::new(Shared {
                endpoint,
                connector: Arc::new(connector),
                state: Mutex::new(MuxState {
                    transport: None,
                    generation: 0,
                    registry: Registry::default(),
                }),
                next_ref: AtomicU64::new(1),
                state_tx,
            }),
        }
    }

    /// Multiplexer over a WebSocket with default settings. Needs a tokio runtime
    /// when `connect` is called.
    pub fn websocket(endpoint: Endpoint) -> Self {
        Self::new(endpoint, WebSocketConnector::default())
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.shared.endpoint
    }

    /// Open the connection unless one is already open or opening.
    pub fn connect(&self, user_id: &str, token: &str) {
        let mut state = self.shared.lock();
        let current = state.connection_state();
        if matches!(current, ConnectionState::Connecting | ConnectionState::Open) {
            debug!(?current, "connect ignored, socket already active");
            return;
        }

        state.generation += 1;
        let events = TransportEvents::new(Arc::downgrade(&self.shared), state.generation);
        let url = self.shared.endpoint.url_for(user_id, token);

        info!(endpoint = %self.shared.endpoint, user_id, "connecting");
        state.transport = Some(self.shared.connector.open(&url, events));
        self.shared.state_tx.send_replace(ConnectionState::Connecting);
    }

    /// Close the connection and forget every channel and pending join.
    pub fn disconnect(&self) {
        self.detach();
    }

    /// [`disconnect`](Self::disconnect), then wait until the transport has
    /// written every frame pushed before the call.
    pub async fn shutdown(&self) {
        if let Some(transport) = self.detach() {
            transport.finished().await;
            debug!("transport finished");
        }
    }

    fn detach(&self) -> Option<Arc<dyn Transport>> {
        let transport = {
            let mut state = self.shared.lock();
            state.generation += 1;
            state.registry.clear();
            self.shared
                .state_tx
                .send_replace(ConnectionState::Disconnected);
            state.transport.take()
        };

        if let Some(transport) = &transport {
            transport.close();
            info!("disconnected");
        }
        transport
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state() == ConnectionState::Open
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.shared.lock().connection_state()
    }

    /// Receiver that observes connection state transitions.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    /// Handle bound to `topic`, creating the registry entry on first use.
    pub fn channel(&self, topic: impl Into<String>) -> ChannelHandle {
        let topic = topic.into();
        self.shared.lock().registry.ensure(&topic);
        ChannelHandle::new(topic, self.shared.clone())
    }

    pub fn has_channel(&self, topic: &str) -> bool {
        self.shared.lock().registry.contains(topic)
    }

    /// Registered topics, sorted.
    pub fn topics(&self) -> Vec<String> {
        self.shared.lock().registry.topics()
    }

    /// Topics waiting for the socket to open before their join is sent, sorted.
    pub fn pending_topics(&self) -> Vec<String> {
        self.shared.lock().registry.pending_topics()
    }
}

impl fmt::Debug for ChannelMux {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("ChannelMux")
            .field("endpoint", &self.shared.endpoint)
            .field("state", &state.connection_state())
            .field("topics", &state.registry.topics())
            .finish()
    }
}
