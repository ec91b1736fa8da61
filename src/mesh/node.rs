use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::codec::Frame;
use super::metrics::NodeMetrics;
use super::relay::{MeshRelay, RelayReport};
use crate::coherence::{evaluate, Score, Signal, VetoCounter, VetoDecision, VetoGate};
use crate::core::config::ScorePolicy;
use crate::core::error::{MeshError, MeshResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeState {
    Idle,
    Evaluating,
    Relaying,
    Alerting,
}

/// Snapshot published after every state change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeStatus {
    pub state: NodeState,
    pub last_score: Option<f64>,
    pub has_reference: bool,
    pub cycles: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleOutcome {
    pub score: Score,
    pub decision: VetoDecision,
    pub relay: RelayReport,
}

/// Where a signal entered the node.
#[derive(Debug, Clone)]
pub enum Inbound {
    /// Decoded frame from a neighbor; carries the neighbor's score.
    Frame {
        from: Option<SocketAddr>,
        frame: Frame,
    },
    /// Observation produced on this node.
    Observed(Signal),
}

struct Command {
    inbound: Inbound,
    reply: Option<oneshot::Sender<MeshResult<CycleOutcome>>>,
}

/// Evaluates, gates and relays one signal at a time.
///
/// Owned by a single task once spawned, so the reference signal and the
/// veto counter are only touched from one place.
pub struct Node {
    id: String,
    signal_len: usize,
    reference: Option<Signal>,
    last_score: Option<Score>,
    state: NodeState,
    cycles: u64,
    policy: ScorePolicy,
    gate: VetoGate,
    relay: MeshRelay,
    metrics: Arc<NodeMetrics>,
    status_tx: watch::Sender<NodeStatus>,
}

impl Node {
    pub fn new(
        id: impl Into<String>,
        signal_len: usize,
        reference: Option<Signal>,
        policy: ScorePolicy,
        gate: VetoGate,
        relay: MeshRelay,
        metrics: Arc<NodeMetrics>,
    ) -> Self {
        let status = NodeStatus {
            state: NodeState::Idle,
            last_score: None,
            has_reference: reference.is_some(),
            cycles: 0,
        };
        let (status_tx, _) = watch::channel(status);

        Self {
            id: id.into(),
            signal_len,
            reference,
            last_score: None,
            state: NodeState::Idle,
            cycles: 0,
            policy,
            gate,
            relay,
            metrics,
            status_tx,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn reference(&self) -> Option<&Signal> {
        self.reference.as_ref()
    }

    pub fn last_score(&self) -> Option<Score> {
        self.last_score
    }

    pub fn veto_counter(&self) -> Arc<VetoCounter> {
        self.gate.counter()
    }

    pub fn status(&self) -> watch::Receiver<NodeStatus> {
        self.status_tx.subscribe()
    }

    /// Runs one full cycle for `signal` and always leaves the node `Idle`.
    pub async fn process(
        &mut self,
        signal: Signal,
        neighbor_score: Option<Score>,
    ) -> MeshResult<CycleOutcome> {
        self.transition(NodeState::Evaluating);
        let result = self.run_cycle(signal, neighbor_score).await;
        self.transition(NodeState::Idle);
        result
    }

    async fn run_cycle(
        &mut self,
        signal: Signal,
        neighbor_score: Option<Score>,
    ) -> MeshResult<CycleOutcome> {
        let local = self.score(&signal)?;
        let score = match (self.policy, neighbor_score) {
            (ScorePolicy::MinNeighbor, Some(remote)) => local.min(remote),
            _ => local,
        };

        let decision = self.gate.decide(score);
        self.last_score = Some(score);
        self.cycles += 1;
        self.metrics.record_cycle(score, decision);
        debug!("Node {} cycle {}: R={} -> {}", self.id, self.cycles, score, decision);

        let relay = match decision {
            VetoDecision::Allow => {
                self.transition(NodeState::Relaying);
                let report = self.relay.relay(score, &signal, decision).await?;
                self.reference = Some(signal);
                report
            }
            VetoDecision::Veto => {
                self.transition(NodeState::Alerting);
                self.relay.relay(score, &signal, decision).await?
            }
        };

        Ok(CycleOutcome {
            score,
            decision,
            relay,
        })
    }

    fn score(&self, signal: &Signal) -> MeshResult<Score> {
        if signal.len() != self.signal_len {
            return Err(MeshError::LengthMismatch {
                expected: self.signal_len,
                actual: signal.len(),
            });
        }
        match &self.reference {
            Some(reference) => evaluate(reference, signal),
            None => {
                info!("🧭 Node {} has no reference yet, adopting first signal", self.id);
                Ok(Score::ONE)
            }
        }
    }

    fn transition(&mut self, to: NodeState) {
        self.state = to;
        let status = NodeStatus {
            state: to,
            last_score: self.last_score.map(Score::value),
            has_reference: self.reference.is_some(),
            cycles: self.cycles,
        };
        self.status_tx.send_replace(status);
    }

    /// Moves the node onto its own task behind a FIFO queue.
    pub fn spawn(self, queue_capacity: usize) -> (NodeHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(queue_capacity);
        let handle = NodeHandle {
            id: self.id.clone(),
            tx,
            status: self.status(),
            veto_counter: self.veto_counter(),
        };
        let task = tokio::spawn(self.run(rx));
        (handle, task)
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        info!("✅ Node {} online", self.id);

        while let Some(Command { inbound, reply }) = rx.recv().await {
            let (signal, neighbor_score, source) = match inbound {
                Inbound::Frame { from, frame } => (frame.signal, Some(frame.score), from),
                Inbound::Observed(signal) => (signal, None, None),
            };

            let result = self.process(signal, neighbor_score).await;
            if let Err(e) = &result {
                match source {
                    Some(peer) => warn!("Signal from {} rejected: {}", peer, e),
                    None => warn!("Local signal rejected: {}", e),
                }
            }

            if let Some(reply) = reply {
                let _ = reply.send(result);
            }
        }

        info!("🔌 Node {} shutting down", self.id);
    }
}

/// Cloneable entry point to a spawned [`Node`].
#[derive(Clone)]
pub struct NodeHandle {
    id: String,
    tx: mpsc::Sender<Command>,
    status: watch::Receiver<NodeStatus>,
    veto_counter: Arc<VetoCounter>,
}

impl NodeHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Queues a signal and waits for its cycle to finish.
    pub async fn submit(&self, inbound: Inbound) -> MeshResult<CycleOutcome> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Command {
                inbound,
                reply: Some(reply_tx),
            })
            .await
            .map_err(|_| MeshError::NodeClosed)?;
        reply_rx.await.map_err(|_| MeshError::NodeClosed)?
    }

    /// Queues a signal without waiting for the outcome.
    pub async fn enqueue(&self, inbound: Inbound) -> MeshResult<()> {
        self.tx
            .send(Command {
                inbound,
                reply: None,
            })
            .await
            .map_err(|_| MeshError::NodeClosed)
    }

    pub async fn observe(&self, signal: Signal) -> MeshResult<CycleOutcome> {
        self.submit(Inbound::Observed(signal)).await
    }

    pub fn status(&self) -> NodeStatus {
        self.status.borrow().clone()
    }

    pub fn veto_counter(&self) -> Arc<VetoCounter> {
        self.veto_counter.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::codec::FrameCodec;
    use crate::mesh::event_bus::{EventBus, MeshEvent};
    use crate::mesh::transport::{MockTransport, Neighbor, Transport};
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    fn node_with(
        transport: Arc<dyn Transport>,
        reference: Option<Signal>,
        policy: ScorePolicy,
        events: Arc<EventBus>,
    ) -> Node {
        let metrics = Arc::new(NodeMetrics::new().unwrap());
        let relay = MeshRelay::new(
            "n1",
            vec![Neighbor::new("a:1"), Neighbor::new("b:1")],
            transport,
            FrameCodec::new(64),
            Duration::from_millis(100),
            events,
            metrics.clone(),
        );
        Node::new("n1", 64, reference, policy, VetoGate::default(), relay, metrics)
    }

    fn accepting_transport(times: usize) -> Arc<dyn Transport> {
        let mut mock = MockTransport::new();
        mock.expect_send().times(times).returning(|_, _| Ok(()));
        Arc::new(mock)
    }

    #[tokio::test]
    async fn test_identical_signals_allow_and_relay() {
        let mut node = node_with(
            accepting_transport(2),
            Some(Signal::filled(64, 1.0)),
            ScorePolicy::Local,
            Arc::new(EventBus::default()),
        );

        let outcome = assert_ok!(node.process(Signal::filled(64, 1.0), None).await);
        assert!((outcome.score.value() - 1.0).abs() < 1e-9);
        assert_eq!(outcome.decision, VetoDecision::Allow);
        assert_eq!(outcome.relay.delivered(), 2);
        assert_eq!(node.state(), NodeState::Idle);
        assert_eq!(node.veto_counter().get(), 0);
    }

    #[tokio::test]
    async fn test_orthogonal_signal_vetoes() {
        let events = Arc::new(EventBus::default());
        let mut rx = events.subscribe();
        let reference = Signal::unit(64, 0);
        let mut node = node_with(
            accepting_transport(0),
            Some(reference.clone()),
            ScorePolicy::Local,
            events,
        );

        let outcome = node.process(Signal::unit(64, 1), None).await.unwrap();
        assert_eq!(outcome.score, Score::ZERO);
        assert_eq!(outcome.decision, VetoDecision::Veto);
        assert!(outcome.relay.attempts.is_empty());
        assert_eq!(node.veto_counter().get(), 1);
        // Vetoed signals never replace the reference.
        assert_eq!(node.reference(), Some(&reference));

        let alerts = std::iter::from_fn(|| rx.try_recv().ok())
            .filter(MeshEvent::is_alert)
            .count();
        assert_eq!(alerts, 1);
    }

    #[tokio::test]
    async fn test_length_mismatch_leaves_state_untouched() {
        let reference = Signal::filled(64, 1.0);
        let mut node = node_with(
            accepting_transport(0),
            Some(reference.clone()),
            ScorePolicy::Local,
            Arc::new(EventBus::default()),
        );

        let err = assert_err!(node.process(Signal::filled(10, 1.0), None).await);
        assert_eq!(err, MeshError::LengthMismatch { expected: 64, actual: 10 });
        assert_eq!(node.state(), NodeState::Idle);
        assert_eq!(node.last_score(), None);
        assert_eq!(node.reference(), Some(&reference));
        assert_eq!(node.veto_counter().get(), 0);
    }

    #[tokio::test]
    async fn test_first_signal_becomes_reference() {
        let mut node = node_with(
            accepting_transport(2),
            None,
            ScorePolicy::Local,
            Arc::new(EventBus::default()),
        );
        let first = Signal::new((0..64).map(|i| (i % 7) as f64 / 7.0).collect());

        let outcome = node.process(first.clone(), None).await.unwrap();
        assert_eq!(outcome.score, Score::ONE);
        assert_eq!(outcome.decision, VetoDecision::Allow);
        assert_eq!(node.reference(), Some(&first));
    }

    #[tokio::test]
    async fn test_accepted_signal_replaces_reference() {
        let mut node = node_with(
            accepting_transport(2),
            Some(Signal::filled(64, 1.0)),
            ScorePolicy::Local,
            Arc::new(EventBus::default()),
        );
        // Uniform scaling keeps the cosine at 1.
        let dimmer = Signal::filled(64, 0.5);
        node.process(dimmer.clone(), None).await.unwrap();
        assert_eq!(node.reference(), Some(&dimmer));
    }

    #[tokio::test]
    async fn test_min_neighbor_policy_uses_lower_score() {
        let mut node = node_with(
            accepting_transport(0),
            Some(Signal::filled(64, 1.0)),
            ScorePolicy::MinNeighbor,
            Arc::new(EventBus::default()),
        );

        let outcome = node
            .process(Signal::filled(64, 1.0), Some(Score::from_byte(254)))
            .await
            .unwrap();
        assert_eq!(outcome.score, Score::from_byte(254));
        assert_eq!(outcome.decision, VetoDecision::Veto);
    }

    #[tokio::test]
    async fn test_min_neighbor_score_is_written_to_outbound_frame() {
        let mut mock = MockTransport::new();
        mock.expect_send()
            .times(2)
            .withf(|_, frame| frame[0] == 200)
            .returning(|_, _| Ok(()));
        let metrics = Arc::new(NodeMetrics::new().unwrap());
        let relay = MeshRelay::new(
            "n1",
            vec![Neighbor::new("a:1"), Neighbor::new("b:1")],
            Arc::new(mock),
            FrameCodec::new(64),
            Duration::from_millis(100),
            Arc::new(EventBus::default()),
            metrics.clone(),
        );
        let gate = VetoGate::new(0.5).unwrap();
        let mut node = Node::new(
            "n1",
            64,
            Some(Signal::filled(64, 1.0)),
            ScorePolicy::MinNeighbor,
            gate,
            relay,
            metrics,
        );

        let outcome = node
            .process(Signal::filled(64, 1.0), Some(Score::from_byte(200)))
            .await
            .unwrap();
        assert_eq!(outcome.decision, VetoDecision::Allow);
        assert_eq!(outcome.score, Score::from_byte(200));
        assert_eq!(outcome.relay.delivered(), 2);
    }

    #[tokio::test]
    async fn test_local_policy_ignores_neighbor_score() {
        let mut node = node_with(
            accepting_transport(2),
            Some(Signal::filled(64, 1.0)),
            ScorePolicy::Local,
            Arc::new(EventBus::default()),
        );

        let outcome = node
            .process(Signal::filled(64, 1.0), Some(Score::ZERO))
            .await
            .unwrap();
        assert_eq!(outcome.decision, VetoDecision::Allow);
    }

    #[tokio::test]
    async fn test_spawned_node_processes_in_order() {
        let node = node_with(
            accepting_transport(4),
            Some(Signal::filled(64, 1.0)),
            ScorePolicy::Local,
            Arc::new(EventBus::default()),
        );
        let (handle, task) = node.spawn(16);

        let a = handle.observe(Signal::filled(64, 1.0)).await.unwrap();
        let b = handle.observe(Signal::unit(64, 3)).await.unwrap();
        let c = handle.observe(Signal::filled(64, 0.25)).await.unwrap();

        assert_eq!(a.decision, VetoDecision::Allow);
        assert_eq!(b.decision, VetoDecision::Veto);
        assert_eq!(c.decision, VetoDecision::Allow);
        assert_eq!(handle.veto_counter().get(), 1);

        let status = handle.status();
        assert_eq!(status.state, NodeState::Idle);
        assert_eq!(status.cycles, 3);

        drop(handle);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_closed_node_rejects_submissions() {
        let node = node_with(
            accepting_transport(0),
            None,
            ScorePolicy::Local,
            Arc::new(EventBus::default()),
        );
        let (handle, task) = node.spawn(1);
        task.abort();
        let _ = task.await;

        let err = handle.observe(Signal::filled(64, 1.0)).await.unwrap_err();
        assert_eq!(err, MeshError::NodeClosed);
        assert!(handle.is_closed());
    }
}
