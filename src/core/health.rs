use serde::{Deserialize, Serialize};
use std::sync::Arc;
use warp::Filter;

use crate::mesh::{NodeHandle, NodeMetrics, NodeState};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub node: NodeHealth,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeHealth {
    pub id: String,
    pub state: String,
    pub last_score: Option<f64>,
    pub has_reference: bool,
    pub cycles: u64,
    pub veto_count: u64,
    pub neighbors: usize,
    pub frames_received: u64,
    pub malformed_frames: u64,
    pub forwards_ok: u64,
    pub forwards_failed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VetoReset {
    pub previous: u64,
}

#[derive(Clone)]
pub struct HealthChecker {
    start_time: std::time::Instant,
    node: NodeHandle,
    metrics: Arc<NodeMetrics>,
    neighbors: usize,
}

impl HealthChecker {
    pub fn new(node: NodeHandle, metrics: Arc<NodeMetrics>, neighbors: usize) -> Self {
        Self {
            start_time: std::time::Instant::now(),
            node,
            metrics,
            neighbors,
        }
    }

    pub fn get_status(&self) -> HealthStatus {
        let status = self.node.status();
        let state = match status.state {
            NodeState::Idle => "IDLE",
            NodeState::Evaluating => "EVALUATING",
            NodeState::Relaying => "RELAYING",
            NodeState::Alerting => "ALERTING",
        };

        HealthStatus {
            status: if self.node.is_closed() {
                "down".to_string()
            } else if self.neighbors == 0 {
                "degraded".to_string()
            } else {
                "healthy".to_string()
            },
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
            node: NodeHealth {
                id: self.node.id().to_string(),
                state: state.to_string(),
                last_score: status.last_score,
                has_reference: status.has_reference,
                cycles: status.cycles,
                veto_count: self.node.veto_counter().get(),
                neighbors: self.neighbors,
                frames_received: self.metrics.frames_received(),
                malformed_frames: self.metrics.malformed_frames(),
                forwards_ok: self.metrics.forwards_ok(),
                forwards_failed: self.metrics.forwards_failed(),
            },
        }
    }

    /// Explicit administrative reset of the veto counter.
    pub fn reset_vetoes(&self) -> VetoReset {
        let previous = self.node.veto_counter().reset();
        tracing::info!("🔄 Veto counter reset by admin (was {})", previous);
        VetoReset { previous }
    }

    pub fn metrics_text(&self) -> String {
        self.metrics.render()
    }
}

/// `GET /health`, `GET /metrics`, `POST /admin/vetoes/reset`.
pub fn routes(
    checker: Arc<HealthChecker>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let with_checker = warp::any().map(move || checker.clone());

    let health = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_checker.clone())
        .map(|checker: Arc<HealthChecker>| warp::reply::json(&checker.get_status()));

    let metrics = warp::path("metrics")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_checker.clone())
        .map(|checker: Arc<HealthChecker>| checker.metrics_text());

    let reset = warp::path!("admin" / "vetoes" / "reset")
        .and(warp::post())
        .and(with_checker)
        .map(|checker: Arc<HealthChecker>| warp::reply::json(&checker.reset_vetoes()));

    health.or(metrics).or(reset)
}

pub async fn start_health_server(checker: Arc<HealthChecker>, port: u16) {
    warp::serve(routes(checker)).run(([0, 0, 0, 0], port)).await;
}
