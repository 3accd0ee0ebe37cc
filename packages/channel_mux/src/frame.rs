//! JSON frame exchanged over the socket.
//!
//! Wire format (both directions): `{ "topic": "...", "event": "...", "payload": {...}, "ref": "..." }`

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::MuxError;

/// Join request. Empty payload.
pub const JOIN_EVENT: &str = "phx_join";
/// Leave request. Empty payload.
pub const LEAVE_EVENT: &str = "phx_leave";
/// Server reply to a request; `payload.status == "ok"` acknowledges it.
pub const REPLY_EVENT: &str = "phx_reply";
/// Topic used for keep-alive frames.
pub const HEARTBEAT_TOPIC: &str = "phoenix";
/// Event name used for keep-alive frames.
pub const HEARTBEAT_EVENT: &str = "heartbeat";

/// One message unit on the connection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    /// Correlation reference. Always set on outbound frames; servers may send `null`.
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
}

impl Frame {
    pub fn new(
        topic: impl Into<String>,
        event: impl Into<String>,
        payload: Value,
        reference: impl Into<String>,
    ) -> Self {
        Self {
            topic: topic.into(),
            event: event.into(),
            payload,
            reference: Some(reference.into()),
        }
    }

    pub fn join(topic: impl Into<String>, reference: impl Into<String>) -> Self {
        Self::new(topic, JOIN_EVENT, empty_payload(), reference)
    }

    pub fn leave(topic: impl Into<String>, reference: impl Into<String>) -> Self {
        Self::new(topic, LEAVE_EVENT, empty_payload(), reference)
    }

    pub fn heartbeat(reference: impl Into<String>) -> Self {
        Self::new(HEARTBEAT_TOPIC, HEARTBEAT_EVENT, empty_payload(), reference)
    }

    /// Parse a raw text message from the socket.
    pub fn decode(text: &str) -> Result<Self, MuxError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn encode(&self) -> Result<String, MuxError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// True for a `phx_reply` whose payload carries `status: "ok"`.
pub fn is_ok_reply(frame: &Frame) -> bool {
    frame.event == REPLY_EVENT
        && frame.payload.get("status").and_then(Value::as_str) == Some("ok")
}

fn empty_payload() -> Value {
    Value::Object(serde_json::Map::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn join_frame_shape() {
        let frame = Frame::join("user:42", "7");
        let value: Value = serde_json::from_str(&frame.encode().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"topic": "user:42", "event": "phx_join", "payload": {}, "ref": "7"})
        );
    }

    #[test]
    fn decode_accepts_null_ref() {
        let frame =
            Frame::decode(r#"{"topic":"user:1","event":"new_message","payload":{"text":"hi"},"ref":null}"#)
                .unwrap();
        assert_eq!(frame.topic, "user:1");
        assert_eq!(frame.payload, json!({"text": "hi"}));
        assert!(frame.reference.is_none());
    }

    #[test]
    fn decode_defaults_missing_payload() {
        let frame = Frame::decode(r#"{"topic":"t","event":"e"}"#).unwrap();
        assert_eq!(frame.payload, Value::Null);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(
            Frame::decode("not json"),
            Err(MuxError::MalformedFrame(_))
        ));
        assert!(Frame::decode(r#"{"topic":"t"}"#).is_err());
        assert!(Frame::decode(r#"[null,null,"t","e",{}]"#).is_err());
    }

    #[test]
    fn ok_reply_detection() {
        let ok = Frame::new("t", REPLY_EVENT, json!({"status": "ok", "response": {}}), "1");
        let err = Frame::new("t", REPLY_EVENT, json!({"status": "error"}), "2");
        let other = Frame::new("t", "new_message", json!({"status": "ok"}), "3");
        assert!(is_ok_reply(&ok));
        assert!(!is_ok_reply(&err));
        assert!(!is_ok_reply(&other));
    }

    #[test]
    fn heartbeat_targets_phoenix_topic() {
        let frame = Frame::heartbeat("hb-1");
        assert_eq!(frame.topic, HEARTBEAT_TOPIC);
        assert_eq!(frame.event, HEARTBEAT_EVENT);
    }
}
