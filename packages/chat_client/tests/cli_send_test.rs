use std::process::Stdio;
use std::time::Duration;

use channel_mux::{Frame, JOIN_EVENT};
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

/// Accepts any number of clients, acknowledges joins and forwards every other
/// frame to the test.
async fn spawn_server() -> (String, mpsc::UnboundedReceiver<Frame>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (frame_tx, frame_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let frame_tx = frame_tx.clone();
            tokio::spawn(async move {
                let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
                    return;
                };
                let (mut write, mut read) = ws.split();
                while let Some(Ok(msg)) = read.next().await {
                    let Message::Text(text) = msg else { continue };
                    let Ok(frame) = Frame::decode(text.as_str()) else {
                        continue;
                    };
                    if frame.event == JOIN_EVENT {
                        let reply = Frame::new(
                            frame.topic.as_str(),
                            "phx_reply",
                            json!({"status": "ok", "response": {}}),
                            frame.reference.clone().unwrap_or_default(),
                        );
                        let _ = write
                            .send(Message::Text(reply.encode().unwrap().into()))
                            .await;
                        continue;
                    }
                    let _ = frame_tx.send(frame);
                }
            });
        }
    });

    (format!("ws://{addr}/socket/websocket"), frame_rx)
}

#[tokio::test]
async fn send_delivers_message_before_exit() {
    let (endpoint, mut frames) = spawn_server().await;
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("chat.toml");
    let runs = 10;

    for run in 0..runs {
        let text = format!("hello {run}");
        let status = Command::new(env!("CARGO_BIN_EXE_chat"))
            .args(["--config"])
            .arg(&config)
            .args(["--user-id", "42", "--token", "t"])
            .args(["send", "--conversation", "7", text.as_str()])
            .env("CHAT_SOCKET__ENDPOINT", &endpoint)
            .env("CHAT_SOCKET__HEARTBEAT_SECS", "0")
            .env_remove("RUST_LOG")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .unwrap();
        assert!(status.success(), "run {run} exited with {status}");

        let frame = tokio::time::timeout(Duration::from_secs(5), frames.recv())
            .await
            .unwrap_or_else(|_| panic!("run {run}: server never received the message"))
            .unwrap();
        assert_eq!(frame.topic, "conversation:7");
        assert_eq!(frame.event, "new_message");
        assert_eq!(frame.payload, json!({"text": text}));
    }
}

#[tokio::test]
async fn send_fails_without_server() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let dir = tempfile::tempdir().unwrap();

    let status = Command::new(env!("CARGO_BIN_EXE_chat"))
        .arg("--config")
        .arg(dir.path().join("chat.toml"))
        .args(["--user-id", "42", "--token", "t"])
        .args(["send", "--conversation", "7", "hi"])
        .env("CHAT_SOCKET__ENDPOINT", format!("ws://{addr}/socket/websocket"))
        .env_remove("RUST_LOG")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .unwrap();
    assert!(!status.success());
}
