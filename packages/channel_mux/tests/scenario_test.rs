use std::sync::{Arc, Mutex};

use channel_mux::transport::MemoryConnector;
use channel_mux::{ChannelMux, ChannelState, Endpoint, Frame, JOIN_EVENT, JoinStatus};
use serde_json::{Value, json};

fn memory_mux() -> (ChannelMux, MemoryConnector) {
    let connector = MemoryConnector::new();
    let endpoint = Endpoint::parse("ws://chat.test/socket/websocket").unwrap();
    (ChannelMux::new(endpoint, connector.clone()), connector)
}

#[tokio::test]
async fn user_channel_joins_after_open_and_receives_messages() {
    let (mux, connector) = memory_mux();
    mux.connect("42", "token-42");

    let user = mux.channel("user:42");
    let status = user.join().await;
    assert_eq!(status, JoinStatus::Deferred);
    assert!(!status.is_ok());
    assert_eq!(mux.pending_topics(), vec!["user:42".to_string()]);
    assert_eq!(user.state(), ChannelState::Pending);

    let link = connector.last_link().unwrap();
    link.open();

    let sent = link.take_sent_frames();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].topic, "user:42");
    assert_eq!(sent[0].event, JOIN_EVENT);
    assert_eq!(sent[0].payload, json!({}));
    assert!(sent[0].reference.is_some());
    assert!(mux.pending_topics().is_empty());

    link.deliver_frame(&Frame::new(
        "user:42",
        "phx_reply",
        json!({"status": "ok"}),
        "1",
    ));
    assert!(user.is_joined());

    let received: Arc<Mutex<Vec<Value>>> = Arc::default();
    let log = received.clone();
    user.on("new_message", move |payload| {
        log.lock().unwrap().push(payload.clone());
    });

    link.deliver(r#"{"topic":"user:42","event":"new_message","payload":{"text":"hi"},"ref":null}"#);
    assert_eq!(*received.lock().unwrap(), vec![json!({"text": "hi"})]);
}

#[tokio::test]
async fn conversation_flow_over_one_connection() {
    let (mux, connector) = memory_mux();
    mux.connect("42", "token-42");
    let link = connector.last_link().unwrap();
    link.open();

    let user = mux.channel("user:42");
    let convo = mux.channel("conversation:7");
    assert_eq!(user.join().await, JoinStatus::Sent);
    assert_eq!(convo.join().await, JoinStatus::Sent);

    let typing: Arc<Mutex<Vec<String>>> = Arc::default();
    let log = typing.clone();
    convo.on("typing_start", move |_| log.lock().unwrap().push("start".into()));
    let log = typing.clone();
    convo.on("typing_stop", move |_| log.lock().unwrap().push("stop".into()));

    assert!(convo.push("new_message", json!({"text": "hello"})));
    assert!(convo.push("message_read", json!({"message_id": 3})));

    link.deliver_frame(&Frame::new("conversation:7", "typing_start", json!({}), "9"));
    link.deliver_frame(&Frame::new("user:42", "typing_start", json!({}), "10"));
    link.deliver_frame(&Frame::new("conversation:7", "typing_stop", json!({}), "11"));
    assert_eq!(*typing.lock().unwrap(), vec!["start", "stop"]);

    let events: Vec<(String, String)> = link
        .sent_frames()
        .into_iter()
        .map(|f| (f.topic, f.event))
        .collect();
    assert_eq!(
        events,
        vec![
            ("user:42".to_string(), "phx_join".to_string()),
            ("conversation:7".to_string(), "phx_join".to_string()),
            ("conversation:7".to_string(), "new_message".to_string()),
            ("conversation:7".to_string(), "message_read".to_string()),
        ]
    );

    convo.leave();
    link.deliver_frame(&Frame::new("conversation:7", "typing_start", json!({}), "12"));
    assert_eq!(typing.lock().unwrap().len(), 2);
    assert_eq!(mux.topics(), vec!["user:42".to_string()]);
}

#[tokio::test]
async fn silent_drop_leaves_stale_channels_until_reconnect() {
    let (mux, connector) = memory_mux();
    mux.connect("42", "token-42");
    let first = connector.last_link().unwrap();
    first.open();

    let user = mux.channel("user:42");
    user.join().await;
    first.deliver_frame(&Frame::new("user:42", "phx_reply", json!({"status": "ok"}), "1"));
    assert!(user.is_joined());

    first.drop_connection();
    assert!(!mux.is_connected());
    // Entry survives the drop with a stale joined flag.
    assert!(user.is_joined());
    assert!(!user.push("new_message", json!({"text": "lost"})));

    mux.connect("42", "token-42");
    let second = connector.last_link().unwrap();
    assert_eq!(user.join().await, JoinStatus::Deferred);
    second.open();

    let joins: Vec<Frame> = second
        .sent_frames()
        .into_iter()
        .filter(|f| f.event == JOIN_EVENT)
        .collect();
    assert_eq!(joins.len(), 1);
    assert_eq!(joins[0].topic, "user:42");
}
