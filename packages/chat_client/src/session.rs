use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use channel_mux::{ChannelHandle, ChannelMux, ConnectionState, JoinStatus};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::SessionError;
use crate::events::{
    ChatMessage, MESSAGE_READ, MarkRead, NEW_MESSAGE, OutgoingMessage, ReadReceipt, TYPING_START,
    TYPING_STOP, TypingNotice, TypingPayload, conversation_topic, user_topic,
};

struct Identity {
    user_id: String,
    token: String,
}

/// Application-level owner of the socket and its channels.
///
/// Created once per signed-in user; screens borrow [`Conversation`] handles
/// from it rather than connecting themselves.
pub struct ChatSession {
    mux: ChannelMux,
    identity: Option<Identity>,
    user_channel: Option<ChannelHandle>,
    conversations: BTreeMap<String, Conversation>,
}

impl ChatSession {
    pub fn new(mux: ChannelMux) -> Self {
        Self {
            mux,
            identity: None,
            user_channel: None,
            conversations: BTreeMap::new(),
        }
    }

    pub fn mux(&self) -> &ChannelMux {
        &self.mux
    }

    /// Connect and join `user:<id>`.
    pub async fn start(&mut self, user_id: &str, token: &str) -> JoinStatus {
        self.identity = Some(Identity {
            user_id: user_id.to_string(),
            token: token.to_string(),
        });
        self.mux.connect(user_id, token);

        let channel = self.mux.channel(user_topic(user_id));
        let status = channel.join().await;
        self.user_channel = Some(channel);
        info!(user_id, ?status, "session started");
        status
    }

    /// The `user:<id>` channel, once started.
    pub fn user_channel(&self) -> Option<&ChannelHandle> {
        self.user_channel.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.mux.is_connected()
    }

    /// Wait until the socket opens, failing fast if it closes first.
    pub async fn wait_until_open(&self, timeout: Duration) -> Result<(), SessionError> {
        let mut rx = self.mux.watch_state();
        let settled = tokio::time::timeout(
            timeout,
            rx.wait_for(|s| matches!(s, ConnectionState::Open | ConnectionState::Closed)),
        )
        .await
        .map_err(|_| SessionError::ConnectTimeout(timeout))?
        .map(|state| *state)
        .map_err(|_| SessionError::ConnectionFailed)?;

        match settled {
            ConnectionState::Open => Ok(()),
            _ => Err(SessionError::ConnectionFailed),
        }
    }

    /// Join `conversation:<id>`, or return the already open conversation.
    pub async fn open_conversation(&mut self, conversation_id: &str) -> Conversation {
        if let Some(existing) = self.conversations.get(conversation_id) {
            return existing.clone();
        }

        let conversation = Conversation {
            id: conversation_id.to_string(),
            channel: self.mux.channel(conversation_topic(conversation_id)),
        };
        let status = conversation.channel.join().await;
        debug!(conversation_id, ?status, "conversation opened");

        self.conversations
            .insert(conversation_id.to_string(), conversation.clone());
        conversation
    }

    pub fn conversation(&self, conversation_id: &str) -> Option<&Conversation> {
        self.conversations.get(conversation_id)
    }

    /// Ids of the conversations this session keeps joined.
    pub fn open_conversations(&self) -> Vec<String> {
        self.conversations.keys().cloned().collect()
    }

    /// Leave `conversation:<id>`. Returns false if it was not open.
    pub fn close_conversation(&mut self, conversation_id: &str) -> bool {
        match self.conversations.remove(conversation_id) {
            Some(conversation) => {
                conversation.channel.leave();
                true
            }
            None => false,
        }
    }

    /// Reconnect after a silent drop and re-join every remembered topic.
    ///
    /// Returns `Ok(false)` when the socket is already open. Listeners survive
    /// because a drop without `stop` keeps the channel entries.
    pub async fn resume(&mut self) -> Result<bool, SessionError> {
        if self.mux.is_connected() {
            return Ok(false);
        }
        let identity = self.identity.as_ref().ok_or(SessionError::NotStarted)?;

        info!(user_id = %identity.user_id, "resuming session");
        self.mux.connect(&identity.user_id, &identity.token);

        if let Some(channel) = &self.user_channel {
            channel.join().await;
        }
        for conversation in self.conversations.values() {
            conversation.channel.join().await;
        }
        Ok(true)
    }

    /// Disconnect and forget every channel.
    pub fn stop(&mut self) {
        self.mux.disconnect();
        self.forget();
    }

    /// Like [`stop`](Self::stop), but waits until frames already pushed have
    /// been written to the socket. Call this before the runtime shuts down.
    pub async fn shutdown(&mut self) {
        self.forget();
        self.mux.shutdown().await;
    }

    fn forget(&mut self) {
        self.user_channel = None;
        self.conversations.clear();
        if let Some(identity) = self.identity.take() {
            info!(user_id = %identity.user_id, "session stopped");
        }
    }
}

/// One joined conversation.
#[derive(Clone, Debug)]
pub struct Conversation {
    id: String,
    channel: ChannelHandle,
}

impl Conversation {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn channel(&self) -> &ChannelHandle {
        &self.channel
    }

    pub fn send_message(&self, text: &str) -> bool {
        self.push(NEW_MESSAGE, &OutgoingMessage { text })
    }

    pub fn typing_start(&self) -> bool {
        self.push(TYPING_START, &serde_json::json!({}))
    }

    pub fn typing_stop(&self) -> bool {
        self.push(TYPING_STOP, &serde_json::json!({}))
    }

    pub fn mark_read(&self, message_id: &str) -> bool {
        self.push(MESSAGE_READ, &MarkRead { message_id })
    }

    pub fn on_new_message<F>(&self, callback: F)
    where
        F: Fn(ChatMessage) + Send + Sync + 'static,
    {
        on_typed(&self.channel, NEW_MESSAGE, callback);
    }

    /// Receives both `typing_start` and `typing_stop`.
    pub fn on_typing<F>(&self, callback: F)
    where
        F: Fn(TypingNotice) + Send + Sync + 'static,
    {
        let callback = Arc::new(callback);
        for (event, active) in [(TYPING_START, true), (TYPING_STOP, false)] {
            let callback = callback.clone();
            on_typed(&self.channel, event, move |payload: TypingPayload| {
                callback(TypingNotice {
                    user_id: payload.user_id,
                    active,
                });
            });
        }
    }

    pub fn on_read<F>(&self, callback: F)
    where
        F: Fn(ReadReceipt) + Send + Sync + 'static,
    {
        on_typed(&self.channel, MESSAGE_READ, callback);
    }

    fn push<T: Serialize>(&self, event: &str, payload: &T) -> bool {
        match serde_json::to_value(payload) {
            Ok(value) => self.channel.push(event, value),
            Err(e) => {
                warn!(event, "failed to encode payload: {e}");
                false
            }
        }
    }
}

/// Register a listener that decodes the payload into `T`, skipping payloads
/// that do not fit.
fn on_typed<T, F>(channel: &ChannelHandle, event: &'static str, callback: F)
where
    T: DeserializeOwned,
    F: Fn(T) + Send + Sync + 'static,
{
    channel.on(event, move |payload: &Value| match T::deserialize(payload) {
        Ok(decoded) => callback(decoded),
        Err(e) => debug!(event, "skipping undecodable payload: {e}"),
    });
}
