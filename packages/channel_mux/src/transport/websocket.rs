//! WebSocket transport over `tokio-tungstenite`.
//!
//! Each `open` spawns one task that owns the socket: it performs the
//! handshake, reports open, then multiplexes outbound text, inbound frames and
//! the optional heartbeat in a single `select!` loop. All inbound frames are
//! delivered from that task, in arrival order.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use futures::future::BoxFuture;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, Interval, interval_at};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::connect_async;
use tracing::{debug, info, warn};

use super::{ConnectionState, Connector, Transport, TransportEvents};
use crate::error::MuxError;
use crate::frame::Frame;

/// Default keep-alive period; Phoenix-style servers drop idle sockets after 60s.
pub const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(30);

/// How long a locally initiated close waits for the server's close reply.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Opens WebSocket transports. Requires a tokio runtime.
#[derive(Clone, Debug)]
pub struct WebSocketConnector {
    heartbeat: Option<Duration>,
}

impl Default for WebSocketConnector {
    fn default() -> Self {
        Self {
            heartbeat: Some(DEFAULT_HEARTBEAT),
        }
    }
}

impl WebSocketConnector {
    /// `None` or a zero duration disables heartbeats.
    pub fn with_heartbeat(heartbeat: Option<Duration>) -> Self {
        Self {
            heartbeat: heartbeat.filter(|d| !d.is_zero()),
        }
    }

    pub fn heartbeat(&self) -> Option<Duration> {
        self.heartbeat
    }
}

impl Connector for WebSocketConnector {
    fn open(&self, url: &str, events: TransportEvents) -> Arc<dyn Transport> {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let state = Arc::new(Mutex::new(ConnectionState::Connecting));
        let (done_tx, done_rx) = watch::channel(());

        tokio::spawn(run_socket(
            url.to_string(),
            outbound_rx,
            state.clone(),
            events,
            self.heartbeat,
            done_tx,
        ));

        Arc::new(WebSocketTransport {
            outbound: outbound_tx,
            state,
            done: done_rx,
        })
    }
}

enum Outbound {
    Text(String),
    Close,
}

struct WebSocketTransport {
    outbound: mpsc::UnboundedSender<Outbound>,
    state: Arc<Mutex<ConnectionState>>,
    /// Never written; its sender is dropped when the socket task exits.
    done: watch::Receiver<()>,
}

impl Transport for WebSocketTransport {
    fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    fn send(&self, text: String) -> Result<(), MuxError> {
        if self.state() != ConnectionState::Open {
            return Err(MuxError::NotOpen);
        }
        self.outbound
            .send(Outbound::Text(text))
            .map_err(|_| MuxError::TransportClosed)
    }

    fn close(&self) {
        *self.state.lock() = ConnectionState::Closed;
        let _ = self.outbound.send(Outbound::Close);
    }

    fn finished(&self) -> BoxFuture<'static, ()> {
        let mut done = self.done.clone();
        Box::pin(async move { while done.changed().await.is_ok() {} })
    }
}

async fn run_socket(
    url: String,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    state: Arc<Mutex<ConnectionState>>,
    events: TransportEvents,
    heartbeat: Option<Duration>,
    _done: watch::Sender<()>,
) {
    let ws_stream = match connect_async(url.as_str()).await {
        Ok((ws_stream, _)) => ws_stream,
        Err(e) => {
            warn!("WebSocket handshake failed: {e}");
            *state.lock() = ConnectionState::Closed;
            events.closed();
            return;
        }
    };

    {
        let mut state = state.lock();
        if *state == ConnectionState::Closed {
            debug!("transport closed during handshake");
            return;
        }
        *state = ConnectionState::Open;
    }
    events.opened();

    let (mut ws_write, mut ws_read) = ws_stream.split();
    let mut ticker = heartbeat.map(|period| interval_at(Instant::now() + period, period));
    let heartbeat_refs = AtomicU64::new(1);
    let mut closing = false;

    loop {
        tokio::select! {
            cmd = outbound.recv() => match cmd {
                Some(Outbound::Text(text)) => {
                    if let Err(e) = ws_write.send(Message::Text(text.into())).await {
                        warn!("WebSocket send failed: {e}");
                        break;
                    }
                }
                Some(Outbound::Close) | None => {
                    closing = ws_write.send(Message::Close(None)).await.is_ok();
                    break;
                }
            },
            msg = ws_read.next() => match msg {
                Some(Ok(Message::Text(text))) => events.message(text.as_str()),
                Some(Ok(Message::Close(_))) | None => {
                    info!("WebSocket closed by server");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("WebSocket read failed: {e}");
                    break;
                }
            },
            _ = next_tick(&mut ticker) => {
                let reference = format!("hb-{}", heartbeat_refs.fetch_add(1, Ordering::Relaxed));
                let Ok(text) = Frame::heartbeat(reference).encode() else {
                    continue;
                };
                if let Err(e) = ws_write.send(Message::Text(text.into())).await {
                    warn!("heartbeat send failed: {e}");
                    break;
                }
            }
        }
    }

    // Read until the peer answers our close so unread input does not turn
    // the socket teardown into a reset.
    if closing {
        let drain = async { while let Some(Ok(_)) = ws_read.next().await {} };
        if tokio::time::timeout(CLOSE_GRACE, drain).await.is_err() {
            debug!("no close reply from server");
        }
    }

    *state.lock() = ConnectionState::Closed;
    events.closed();
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}
