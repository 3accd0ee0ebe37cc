//! Application events carried over the chat channels.
//!
//! The multiplexer treats these names as opaque; only this layer knows their
//! payload shapes.

use serde::{Deserialize, Deserializer, Serialize};

pub const NEW_MESSAGE: &str = "new_message";
pub const TYPING_START: &str = "typing_start";
pub const TYPING_STOP: &str = "typing_stop";
pub const MESSAGE_READ: &str = "message_read";

pub fn user_topic(user_id: &str) -> String {
    format!("user:{user_id}")
}

pub fn conversation_topic(conversation_id: &str) -> String {
    format!("conversation:{conversation_id}")
}

/// Inbound `new_message` payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default, deserialize_with = "opt_id")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "opt_id")]
    pub conversation_id: Option<String>,
    #[serde(default, deserialize_with = "opt_id")]
    pub sender_id: Option<String>,
    pub text: String,
    #[serde(default)]
    pub inserted_at: Option<String>,
}

/// `typing_start` / `typing_stop`, folded into one notice.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypingNotice {
    pub user_id: Option<String>,
    pub active: bool,
}

#[derive(Deserialize)]
pub(crate) struct TypingPayload {
    #[serde(default, deserialize_with = "opt_id")]
    pub user_id: Option<String>,
}

/// Inbound `message_read` payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadReceipt {
    #[serde(deserialize_with = "id")]
    pub message_id: String,
    #[serde(default, deserialize_with = "opt_id")]
    pub user_id: Option<String>,
}

#[derive(Serialize)]
pub(crate) struct OutgoingMessage<'a> {
    pub text: &'a str,
}

#[derive(Serialize)]
pub(crate) struct MarkRead<'a> {
    pub message_id: &'a str,
}

/// Ids arrive as strings or numbers depending on the backend.
#[derive(Deserialize)]
#[serde(untagged)]
enum LooseId {
    Text(String),
    Signed(i64),
    Unsigned(u64),
    Float(f64),
}

impl From<LooseId> for String {
    fn from(id: LooseId) -> Self {
        match id {
            LooseId::Text(s) => s,
            LooseId::Signed(n) => n.to_string(),
            LooseId::Unsigned(n) => n.to_string(),
            LooseId::Float(n) => n.to_string(),
        }
    }
}

pub(crate) fn id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    LooseId::deserialize(deserializer).map(String::from)
}

pub(crate) fn opt_id<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    Ok(Option::<LooseId>::deserialize(deserializer)?.map(String::from))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn topics() {
        assert_eq!(user_topic("42"), "user:42");
        assert_eq!(conversation_topic("7"), "conversation:7");
    }

    #[test]
    fn message_accepts_numeric_ids() {
        let msg: ChatMessage = serde_json::from_value(json!({
            "id": 10,
            "conversation_id": "7",
            "sender_id": 42,
            "text": "hi"
        }))
        .unwrap();
        assert_eq!(msg.id.as_deref(), Some("10"));
        assert_eq!(msg.conversation_id.as_deref(), Some("7"));
        assert_eq!(msg.sender_id.as_deref(), Some("42"));
        assert!(msg.inserted_at.is_none());
    }

    #[test]
    fn message_requires_text() {
        assert!(serde_json::from_value::<ChatMessage>(json!({"id": 1})).is_err());
    }

    #[test]
    fn read_receipt_null_user() {
        let receipt: ReadReceipt =
            serde_json::from_value(json!({"message_id": 3, "user_id": null})).unwrap();
        assert_eq!(receipt.message_id, "3");
        assert!(receipt.user_id.is_none());
    }

    #[test]
    fn outgoing_shapes() {
        assert_eq!(
            serde_json::to_value(OutgoingMessage { text: "hi" }).unwrap(),
            json!({"text": "hi"})
        );
        assert_eq!(
            serde_json::to_value(MarkRead { message_id: "9" }).unwrap(),
            json!({"message_id": "9"})
        );
    }
}
