use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time;
use tracing::{debug, info, warn};

use super::codec::FrameCodec;
use super::event_bus::{AlertReason, EventBus, MeshEvent};
use super::metrics::NodeMetrics;
use super::transport::{ForwardError, Neighbor, Transport};
use crate::coherence::{Score, Signal, VetoDecision};
use crate::core::error::MeshResult;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForwardAttempt {
    pub neighbor: Neighbor,
    pub result: Result<(), ForwardError>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelayReport {
    pub decision: VetoDecision,
    /// Short hex digest of the outbound frame; empty when suppressed.
    pub fingerprint: String,
    pub attempts: Vec<ForwardAttempt>,
}

impl RelayReport {
    fn suppressed() -> Self {
        Self {
            decision: VetoDecision::Veto,
            fingerprint: String::new(),
            attempts: Vec::new(),
        }
    }

    pub fn is_suppressed(&self) -> bool {
        self.decision == VetoDecision::Veto
    }

    pub fn attempted(&self) -> Vec<&Neighbor> {
        self.attempts.iter().map(|a| &a.neighbor).collect()
    }

    pub fn delivered(&self) -> usize {
        self.attempts.iter().filter(|a| a.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.attempts.len() - self.delivered()
    }
}

/// Best-effort fan-out of accepted signals to every known neighbor.
pub struct MeshRelay {
    node_id: String,
    neighbors: Vec<Neighbor>,
    transport: Arc<dyn Transport>,
    codec: FrameCodec,
    send_timeout: Duration,
    events: Arc<EventBus>,
    metrics: Arc<NodeMetrics>,
}

impl MeshRelay {
    pub fn new(
        node_id: impl Into<String>,
        neighbors: Vec<Neighbor>,
        transport: Arc<dyn Transport>,
        codec: FrameCodec,
        send_timeout: Duration,
        events: Arc<EventBus>,
        metrics: Arc<NodeMetrics>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            neighbors,
            transport,
            codec,
            send_timeout,
            events,
            metrics,
        }
    }

    /// Forwards on `Allow`, raises a local alert on `Veto`.
    ///
    /// Per-neighbor failures end up in the report and never fail the call.
    /// The only error is a signal that does not fit the frame.
    pub async fn relay(
        &self,
        score: Score,
        signal: &Signal,
        decision: VetoDecision,
    ) -> MeshResult<RelayReport> {
        match decision {
            VetoDecision::Allow => self.forward(score, signal).await,
            VetoDecision::Veto => {
                self.alert(score);
                Ok(RelayReport::suppressed())
            }
        }
    }

    async fn forward(&self, score: Score, signal: &Signal) -> MeshResult<RelayReport> {
        let frame = self.codec.encode(score, signal)?;
        let fingerprint = fingerprint(&frame);

        let attempts = join_all(
            self.neighbors
                .iter()
                .map(|neighbor| self.send_one(neighbor, &frame)),
        )
        .await;

        let report = RelayReport {
            decision: VetoDecision::Allow,
            fingerprint,
            attempts,
        };

        info!(
            "📤 Relayed {} (R={}) to {}/{} neighbors",
            report.fingerprint,
            score,
            report.delivered(),
            self.neighbors.len()
        );
        self.events.publish(MeshEvent::Relayed {
            node_id: self.node_id.clone(),
            score: score.value(),
            delivered: report.delivered(),
            failed: report.failed(),
            timestamp: Utc::now(),
        });

        Ok(report)
    }

    async fn send_one(&self, neighbor: &Neighbor, frame: &[u8]) -> ForwardAttempt {
        let started = Instant::now();
        let result = match time::timeout(self.send_timeout, self.transport.send(neighbor, frame))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(ForwardError::Timeout {
                after_ms: self.send_timeout.as_millis() as u64,
            }),
        };
        self.metrics.record_forward(result.is_ok(), started.elapsed());

        match &result {
            Ok(()) => debug!("Frame delivered to {} in {:?}", neighbor, started.elapsed()),
            Err(e) => {
                warn!("⚠️  Forward to {} failed: {}", neighbor, e);
                self.events.publish(MeshEvent::ForwardFailed {
                    node_id: self.node_id.clone(),
                    neighbor: neighbor.to_string(),
                    error: e.to_string(),
                });
            }
        }

        ForwardAttempt {
            neighbor: neighbor.clone(),
            result,
        }
    }

    fn alert(&self, score: Score) {
        warn!("🛑 VETO on {}: R={} below threshold, relay suppressed", self.node_id, score);
        self.events.publish(MeshEvent::Alert {
            node_id: self.node_id.clone(),
            score: score.value(),
            reason: AlertReason::Veto,
            timestamp: Utc::now(),
        });
    }
}

fn fingerprint(frame: &[u8]) -> String {
    Sha256::digest(frame)
        .iter()
        .take(8)
        .map(|b| format!("{:02x}", b))
        .collect()
}
