//! Newline-delimited JSON channels over TCP.
//!
//! Wire format, one JSON frame per line:
//!
//! ```text
//! -> {"type":"request","method":"infer","correlation_id":"..","payload":{..}}
//! <- {"type":"response","correlation_id":"..","payload":{..}}
//! <- {"type":"error","correlation_id":"..","error":".."}
//! ```
//!
//! Lines that are not valid frames, or frames with a foreign correlation
//! id (e.g. presence announcements from the peer), are skipped; the
//! channel only resolves on its own correlation id.
//!
//! Peer-key → socket-address resolution is fed externally (discovery is
//! not this crate's concern); [`TcpPeerConnector`] just holds the routes.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use tether_foundation::{DispatchError, DispatchResult, PeerId};

use crate::channel::{ChannelHandler, PeerChannel, PeerConnector};

const FRAME_REQUEST: &str = "request";
const FRAME_RESPONSE: &str = "response";
const FRAME_ERROR: &str = "error";

#[derive(Debug, Serialize, Deserialize)]
struct Frame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Opens NDJSON channels to peers with known socket addresses.
#[derive(Default)]
pub struct TcpPeerConnector {
    routes: DashMap<PeerId, String>,
}

impl TcpPeerConnector {
    /// Create a connector with no known routes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Learn (or update) the socket address for a peer.
    pub fn add_route(&self, peer: PeerId, addr: impl Into<String>) {
        self.routes.insert(peer, addr.into());
    }

    /// Forget a peer's route.
    pub fn remove_route(&self, peer: &PeerId) {
        self.routes.remove(peer);
    }
}

#[async_trait]
impl PeerConnector for TcpPeerConnector {
    async fn connect(&self, peer: &PeerId) -> DispatchResult<Box<dyn PeerChannel>> {
        let addr = self.routes.get(peer).map(|r| r.clone()).ok_or_else(|| {
            DispatchError::ChannelClosed(format!("no channel route to peer {}", peer.short()))
        })?;
        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|e| DispatchError::Connection(format!("{addr}: {e}")))?;
        debug!(peer = %peer.short(), addr = %addr, "peer channel open");
        let (read, write) = stream.into_split();
        Ok(Box::new(TcpChannel {
            reader: Mutex::new(BufReader::new(read)),
            writer: Mutex::new(write),
        }))
    }
}

/// One open NDJSON channel. The underlying stream halves close on drop,
/// so an abandoned call cannot leak the socket.
struct TcpChannel {
    reader: Mutex<BufReader<OwnedReadHalf>>,
    writer: Mutex<OwnedWriteHalf>,
}

#[async_trait]
impl PeerChannel for TcpChannel {
    async fn request(&self, method: &str, payload: &Value) -> DispatchResult<Value> {
        let correlation_id = Uuid::new_v4().to_string();
        let frame = json!({
            "type": FRAME_REQUEST,
            "method": method,
            "correlation_id": correlation_id,
            "payload": payload,
        });

        {
            let mut writer = self.writer.lock().await;
            writer
                .write_all(format!("{frame}\n").as_bytes())
                .await
                .map_err(|e| DispatchError::ChannelClosed(format!("write failed: {e}")))?;
        }

        let mut reader = self.reader.lock().await;
        let mut line = String::new();
        loop {
            line.clear();
            let n = reader
                .read_line(&mut line)
                .await
                .map_err(|e| DispatchError::ChannelClosed(format!("read failed: {e}")))?;
            if n == 0 {
                return Err(DispatchError::ChannelClosed(
                    "closed before response".to_string(),
                ));
            }
            let Ok(frame) = serde_json::from_str::<Frame>(line.trim()) else {
                continue;
            };
            if frame.correlation_id.as_deref() != Some(correlation_id.as_str()) {
                continue;
            }
            match frame.kind.as_str() {
                FRAME_RESPONSE => return Ok(frame.payload.unwrap_or(Value::Null)),
                FRAME_ERROR => {
                    return Err(DispatchError::Upstream(
                        frame
                            .error
                            .unwrap_or_else(|| "unspecified channel error".to_string()),
                    ));
                }
                _ => continue,
            }
        }
    }

    async fn close(self: Box<Self>) {
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }
}

/// Accept loop serving NDJSON channels: one task per connection, each
/// request answered through `handler`.
pub async fn serve_channel(
    listener: TcpListener,
    handler: Arc<dyn ChannelHandler>,
) -> std::io::Result<()> {
    loop {
        let (stream, remote) = listener.accept().await?;
        let handler = Arc::clone(&handler);
        tokio::spawn(async move {
            if let Err(e) = serve_connection(stream, handler).await {
                debug!(remote = %remote, error = %e, "channel connection ended");
            }
        });
    }
}

async fn serve_connection(
    stream: TcpStream,
    handler: Arc<dyn ChannelHandler>,
) -> std::io::Result<()> {
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let frame = match serde_json::from_str::<Frame>(line.trim()) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "dropping malformed channel frame");
                let out = json!({"type": FRAME_ERROR, "error": format!("malformed frame: {e}")});
                write.write_all(format!("{out}\n").as_bytes()).await?;
                continue;
            }
        };
        if frame.kind != FRAME_REQUEST {
            continue;
        }

        let method = frame.method.unwrap_or_default();
        let payload = frame.payload.unwrap_or(Value::Null);
        let response = handler.handle(&method, payload).await;
        let out = json!({
            "type": FRAME_RESPONSE,
            "correlation_id": frame.correlation_id,
            "payload": response,
        });
        write.write_all(format!("{out}\n").as_bytes()).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoHandler;

    #[async_trait]
    impl ChannelHandler for EchoHandler {
        async fn handle(&self, method: &str, payload: Value) -> Value {
            json!({"method": method, "echo": payload})
        }
    }

    async fn start_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(serve_channel(listener, Arc::new(EchoHandler)));
        addr
    }

    #[tokio::test]
    async fn request_response_round_trip() {
        let addr = start_server().await;
        let peer = PeerId::from_bytes([9; 32]);
        let connector = TcpPeerConnector::new();
        connector.add_route(peer, addr);

        let channel = connector.connect(&peer).await.unwrap();
        let response = channel
            .request("infer", &json!({"prompt": "Hi"}))
            .await
            .unwrap();
        assert_eq!(response["method"], "infer");
        assert_eq!(response["echo"]["prompt"], "Hi");
        channel.close().await;
    }

    #[tokio::test]
    async fn sequential_requests_on_one_channel() {
        let addr = start_server().await;
        let peer = PeerId::from_bytes([9; 32]);
        let connector = TcpPeerConnector::new();
        connector.add_route(peer, addr);

        let channel = connector.connect(&peer).await.unwrap();
        for i in 0..3 {
            let response = channel.request("health", &json!({"seq": i})).await.unwrap();
            assert_eq!(response["echo"]["seq"], i);
        }
        channel.close().await;
    }

    #[tokio::test]
    async fn unknown_peer_reports_channel_closed() {
        let connector = TcpPeerConnector::new();
        let peer = PeerId::from_bytes([1; 32]);
        let result = connector.connect(&peer).await;
        assert!(matches!(result, Err(DispatchError::ChannelClosed(_))));
    }

    #[tokio::test]
    async fn refused_connection_reports_connection_error() {
        let connector = TcpPeerConnector::new();
        let peer = PeerId::from_bytes([1; 32]);
        // Port 1 is essentially never listening.
        connector.add_route(peer, "127.0.0.1:1");
        let result = connector.connect(&peer).await;
        assert!(matches!(result, Err(DispatchError::Connection(_))));
    }

    #[tokio::test]
    async fn server_survives_malformed_lines() {
        let addr = start_server().await;
        let mut stream = TcpStream::connect(&addr).await.unwrap();
        stream.write_all(b"not json at all\n").await.unwrap();
        let frame = json!({
            "type": "request", "method": "m", "correlation_id": "c1", "payload": {}
        });
        stream
            .write_all(format!("{frame}\n").as_bytes())
            .await
            .unwrap();

        let mut lines = BufReader::new(stream).lines();
        // First reply is the malformed-frame error, second the real response.
        let first = lines.next_line().await.unwrap().unwrap();
        assert!(first.contains("malformed frame"));
        let second = lines.next_line().await.unwrap().unwrap();
        let parsed: Frame = serde_json::from_str(&second).unwrap();
        assert_eq!(parsed.kind, FRAME_RESPONSE);
        assert_eq!(parsed.correlation_id.as_deref(), Some("c1"));
    }
}
