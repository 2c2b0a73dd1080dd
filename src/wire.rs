//! TCP transport for the game protocol: newline-delimited JSON frames.
//!
//! One frame per line. The connector writes a `login` frame on connect, then
//! a reader task forwards server frames as [`ClientEvent`]s until the stream
//! ends, which is reported as a disconnect.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use crate::protocol::{ClientEvent, Connector, ProtocolClient, ProtocolError};

const EVENT_CHANNEL_DEPTH: usize = 64;

/// Frames sent to the server.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Outbound<'a> {
    Login { username: &'a str },
    Chat { message: &'a str },
    Control { control: &'static str, state: bool },
    Quit,
}

/// Frames received from the server.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Inbound {
    Spawn,
    Chat { user: String, message: String },
    Error { detail: String },
    #[serde(other)]
    Unknown,
}

/// Opens plain TCP connections to `host:port`.
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(
        &self,
        host: &str,
        username: &str,
    ) -> Result<(Arc<dyn ProtocolClient>, mpsc::Receiver<ClientEvent>), ProtocolError> {
        let stream = TcpStream::connect(host)
            .await
            .map_err(|e| ProtocolError::Connect(e.to_string()))?;
        let (read_half, write_half) = stream.into_split();

        let client = Arc::new(TcpClient {
            writer: Mutex::new(Some(write_half)),
        });
        client.send_frame(&Outbound::Login { username }).await?;

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_DEPTH);
        tokio::spawn(read_loop(read_half, tx));

        let client: Arc<dyn ProtocolClient> = client;
        Ok((client, rx))
    }
}

struct TcpClient {
    /// Taken on close; a taken writer means the connection is shut.
    writer: Mutex<Option<OwnedWriteHalf>>,
}

impl TcpClient {
    async fn send_frame(&self, frame: &Outbound<'_>) -> Result<(), ProtocolError> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(ProtocolError::Closed)?;
        let mut line = serde_json::to_vec(frame)?;
        line.push(b'\n');
        writer.write_all(&line).await?;
        Ok(())
    }
}

#[async_trait]
impl ProtocolClient for TcpClient {
    async fn send_chat(&self, message: &str) -> Result<(), ProtocolError> {
        self.send_frame(&Outbound::Chat { message }).await
    }

    async fn set_jump(&self, engaged: bool) -> Result<(), ProtocolError> {
        self.send_frame(&Outbound::Control {
            control: "jump",
            state: engaged,
        })
        .await
    }

    async fn close(&self) {
        let mut guard = self.writer.lock().await;
        if let Some(mut writer) = guard.take() {
            if let Ok(mut line) = serde_json::to_vec(&Outbound::Quit) {
                line.push(b'\n');
                let _ = writer.write_all(&line).await;
            }
            let _ = writer.shutdown().await;
        }
    }
}

async fn read_loop(read_half: OwnedReadHalf, tx: mpsc::Sender<ClientEvent>) {
    let mut lines = BufReader::new(read_half).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                match parse_event(trimmed) {
                    Some(event) => {
                        if tx.send(event).await.is_err() {
                            return;
                        }
                    }
                    None => debug!(frame = %trimmed, "unrecognized frame"),
                }
            }
            Ok(None) => break,
            Err(e) => {
                debug!(error = %e, "read error");
                break;
            }
        }
    }
    let _ = tx.send(ClientEvent::Disconnected).await;
}

/// Map one wire frame to a client event. Unknown or garbled frames yield
/// `None` and are skipped.
fn parse_event(line: &str) -> Option<ClientEvent> {
    match serde_json::from_str::<Inbound>(line) {
        Ok(Inbound::Spawn) => Some(ClientEvent::Spawned),
        Ok(Inbound::Chat { user, message }) => Some(ClientEvent::Chat { user, message }),
        Ok(Inbound::Error { detail }) => Some(ClientEvent::Error(detail)),
        Ok(Inbound::Unknown) | Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_event_spawn() {
        let event = parse_event(r#"{"type":"spawn"}"#);
        assert!(matches!(event, Some(ClientEvent::Spawned)));
    }

    #[test]
    fn test_parse_event_chat() {
        let event = parse_event(r#"{"type":"chat","user":"steve","message":"hi there"}"#);
        match event {
            Some(ClientEvent::Chat { user, message }) => {
                assert_eq!(user, "steve");
                assert_eq!(message, "hi there");
            }
            other => panic!("expected chat event, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_event_error() {
        let event = parse_event(r#"{"type":"error","detail":"kicked"}"#);
        match event {
            Some(ClientEvent::Error(detail)) => assert_eq!(detail, "kicked"),
            other => panic!("expected error event, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_event_unknown_type_skipped() {
        assert!(parse_event(r#"{"type":"weather","raining":true}"#).is_none());
    }

    #[test]
    fn test_parse_event_invalid_json_skipped() {
        assert!(parse_event("not valid json {[}").is_none());
    }

    #[test]
    fn test_outbound_frame_shapes() {
        let login = serde_json::to_string(&Outbound::Login { username: "A1" }).unwrap();
        assert_eq!(login, r#"{"type":"login","username":"A1"}"#);

        let jump = serde_json::to_string(&Outbound::Control {
            control: "jump",
            state: true,
        })
        .unwrap();
        assert_eq!(jump, r#"{"type":"control","control":"jump","state":true}"#);
    }

    #[tokio::test]
    async fn test_connect_round_trip() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read, mut write) = stream.into_split();
            let mut lines = BufReader::new(read).lines();

            let login = lines.next_line().await.unwrap().unwrap();
            assert!(login.contains(r#""type":"login""#));
            assert!(login.contains(r#""username":"A1""#));

            write
                .write_all(b"{\"type\":\"spawn\"}\n{\"type\":\"chat\",\"user\":\"steve\",\"message\":\"hi\"}\n")
                .await
                .unwrap();

            let chat = lines.next_line().await.unwrap().unwrap();
            assert!(chat.contains(r#""message":"hello""#));
        });

        let (client, mut events) = TcpConnector
            .connect(&addr.to_string(), "A1")
            .await
            .unwrap();

        assert!(matches!(events.recv().await, Some(ClientEvent::Spawned)));
        match events.recv().await {
            Some(ClientEvent::Chat { user, message }) => {
                assert_eq!(user, "steve");
                assert_eq!(message, "hi");
            }
            other => panic!("expected chat event, got {other:?}"),
        }

        client.send_chat("hello").await.unwrap();
        server.await.unwrap();

        // Server side is gone; the reader reports the disconnect.
        loop {
            match events.recv().await {
                Some(ClientEvent::Disconnected) | None => break,
                _ => {}
            }
        }

        client.close().await;
        // A second close and sends after close are tolerated.
        client.close().await;
        assert!(client.send_chat("late").await.is_err());
    }
}
