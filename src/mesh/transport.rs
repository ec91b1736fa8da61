use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Neighbor {
    addr: String,
}

impl Neighbor {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }
}

impl fmt::Display for Neighbor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.addr)
    }
}

/// Failure to deliver one frame to one neighbor.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ForwardError {
    #[error("send timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("io error: {0}")]
    Io(String),
}

impl From<io::Error> for ForwardError {
    fn from(e: io::Error) -> Self {
        ForwardError::Io(e.to_string())
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, neighbor: &Neighbor, frame: &[u8]) -> Result<(), ForwardError>;
}

type Slot = Arc<Mutex<Option<TcpStream>>>;

/// One persistent TCP connection per neighbor, so a neighbor receives
/// frames on a single ordered stream. Dead connections are replaced on the
/// next send.
#[derive(Debug, Default, Clone)]
pub struct TcpTransport {
    connections: Arc<Mutex<HashMap<Neighbor, Slot>>>,
}

impl TcpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    async fn slot(&self, neighbor: &Neighbor) -> Slot {
        let mut connections = self.connections.lock().await;
        connections.entry(neighbor.clone()).or_default().clone()
    }

    async fn connect(neighbor: &Neighbor) -> Result<TcpStream, ForwardError> {
        let stream = TcpStream::connect(neighbor.addr()).await?;
        stream.set_nodelay(true)?;
        debug!("🔗 Connected to neighbor {}", neighbor);
        Ok(stream)
    }
}

/// Receivers never write back, so a readable EOF means the peer hung up.
fn is_open(stream: &TcpStream) -> bool {
    let mut buf = [0u8; 1];
    match stream.try_read(&mut buf) {
        Ok(0) => false,
        Ok(_) => true,
        Err(e) => e.kind() == io::ErrorKind::WouldBlock,
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send(&self, neighbor: &Neighbor, frame: &[u8]) -> Result<(), ForwardError> {
        let slot = self.slot(neighbor).await;
        let mut guard = slot.lock().await;

        // Taken out of the slot while writing: a failed or cancelled write
        // drops the stream instead of leaving a partial frame on it.
        let mut stream = match guard.take() {
            Some(stream) if is_open(&stream) => stream,
            Some(_) => {
                debug!("Connection to {} closed by peer, reconnecting", neighbor);
                Self::connect(neighbor).await?
            }
            None => Self::connect(neighbor).await?,
        };
        stream.write_all(frame).await?;
        *guard = Some(stream);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;
    use tokio::time;

    #[tokio::test]
    async fn test_tcp_transport_reuses_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 6];
            // Both frames must arrive on the first connection.
            time::timeout(Duration::from_secs(5), socket.read_exact(&mut buf))
                .await
                .unwrap()
                .unwrap();
            buf
        });

        let transport = TcpTransport::new();
        let neighbor = Neighbor::new(addr.to_string());
        transport.send(&neighbor, &[7, 8, 9]).await.unwrap();
        transport.send(&neighbor, &[10, 11, 12]).await.unwrap();

        assert_eq!(server.await.unwrap(), [7, 8, 9, 10, 11, 12]);
    }

    #[tokio::test]
    async fn test_tcp_transport_reconnects_after_peer_hangup() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let mut frames = Vec::new();
            for _ in 0..2 {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut buf = [0u8; 2];
                socket.read_exact(&mut buf).await.unwrap();
                frames.push(buf);
                // Dropping the socket hangs up on the sender.
            }
            frames
        });

        let transport = TcpTransport::new();
        let neighbor = Neighbor::new(addr.to_string());
        transport.send(&neighbor, &[1, 2]).await.unwrap();
        time::sleep(Duration::from_millis(100)).await;
        transport.send(&neighbor, &[3, 4]).await.unwrap();

        assert_eq!(server.await.unwrap(), vec![[1, 2], [3, 4]]);
    }

    #[tokio::test]
    async fn test_tcp_transport_unreachable() {
        // Bind then drop to get a port nobody listens on.
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };

        let result = TcpTransport::new()
            .send(&Neighbor::new(addr.to_string()), &[1])
            .await;
        assert!(matches!(result, Err(ForwardError::Io(_))));
    }
}
