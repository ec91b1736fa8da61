use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time;
use tracing::{debug, error, info, warn};

use super::codec::FrameCodec;
use super::event_bus::{EventBus, MeshEvent};
use super::metrics::NodeMetrics;
use super::node::{Inbound, NodeHandle};
use crate::core::error::MeshError;

/// How long a connection may stay silent before it is closed.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Accepts neighbor connections and feeds decoded frames to the node.
///
/// Each connection is drained by its own task in arrival order, so frames
/// from one neighbor reach the node in the order they were sent.
pub struct MeshListener {
    listener: TcpListener,
    codec: FrameCodec,
    node: NodeHandle,
    events: Arc<EventBus>,
    metrics: Arc<NodeMetrics>,
    read_timeout: Duration,
}

impl MeshListener {
    pub async fn bind(
        addr: &str,
        codec: FrameCodec,
        node: NodeHandle,
        events: Arc<EventBus>,
        metrics: Arc<NodeMetrics>,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("📡 Mesh listener bound on {}", listener.local_addr()?);
        Ok(Self {
            listener,
            codec,
            node,
            events,
            metrics,
            read_timeout: DEFAULT_READ_TIMEOUT,
        })
    }

    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run(self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    debug!("Neighbor connected from {}", peer);
                    let codec = self.codec;
                    let node = self.node.clone();
                    let events = self.events.clone();
                    let metrics = self.metrics.clone();
                    let read_timeout = self.read_timeout;
                    tokio::spawn(async move {
                        let conn = Connection {
                            peer,
                            codec,
                            node,
                            events,
                            metrics,
                            read_timeout,
                        };
                        conn.handle(stream).await;
                    });
                }
                Err(e) => {
                    error!("❌ Accept failed: {}", e);
                }
            }
        }
    }
}

struct Connection {
    peer: SocketAddr,
    codec: FrameCodec,
    node: NodeHandle,
    events: Arc<EventBus>,
    metrics: Arc<NodeMetrics>,
    read_timeout: Duration,
}

impl Connection {
    async fn handle(self, mut stream: TcpStream) {
        let peer = self.peer;
        let mut buf = vec![0u8; self.codec.frame_len()];

        loop {
            let read = time::timeout(self.read_timeout, read_frame(&mut stream, &mut buf)).await;
            let filled = match read {
                Ok(Ok(0)) => break,
                Ok(Ok(n)) => n,
                Ok(Err(e)) => {
                    warn!("Read from {} failed: {}", peer, e);
                    break;
                }
                Err(_) => {
                    debug!("Connection from {} idle for {:?}, closing", peer, self.read_timeout);
                    break;
                }
            };

            let frame = match self.codec.decode(&buf[..filled]) {
                Ok(frame) => frame,
                Err(e) => {
                    self.reject(&e, filled);
                    break;
                }
            };
            self.metrics.record_frame();

            let inbound = Inbound::Frame {
                from: Some(peer),
                frame,
            };
            if self.node.enqueue(inbound).await.is_err() {
                warn!("Node closed, dropping connection from {}", peer);
                break;
            }
        }
    }

    fn reject(&self, e: &MeshError, bytes: usize) {
        warn!("🚫 Rejected frame from {}: {}", self.peer, e);
        self.metrics.record_malformed();
        self.events.publish(MeshEvent::MalformedRejected {
            peer: self.peer.to_string(),
            bytes,
        });
    }
}

/// Fills `buf` unless the stream ends first. Returns the bytes read, which
/// is short only at EOF.
async fn read_frame<R>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
