use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

use coherence_mesh::coherence::VetoGate;
use coherence_mesh::core::{logging, Config, HealthChecker};
use coherence_mesh::core::health::start_health_server;
use coherence_mesh::mesh::{
    EventBus, FrameCodec, MeshEvent, MeshListener, MeshRelay, Neighbor, Node, NodeMetrics,
    TcpTransport,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::from_env().context("invalid configuration")?;

    // Initialize logging
    logging::init_logging(&config.monitoring.log_level, &config.node.id)?;

    tracing::info!("🚀 Coherence mesh node {} starting...", config.node.id);
    tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "Threshold: {} | signal length: {} | neighbors: {}",
        config.node.threshold,
        config.node.signal_len,
        config.mesh.neighbors.len()
    );

    let metrics = Arc::new(NodeMetrics::new().context("failed to register metrics")?);
    let events = Arc::new(EventBus::default());
    let codec = FrameCodec::new(config.node.signal_len);
    let gate = VetoGate::new(config.node.threshold)?;

    let neighbors: Vec<Neighbor> = config.mesh.neighbors.iter().map(Neighbor::new).collect();
    let relay = MeshRelay::new(
        config.node.id.clone(),
        neighbors,
        Arc::new(TcpTransport::new()),
        codec,
        config.mesh.send_timeout(),
        events.clone(),
        metrics.clone(),
    );

    let node = Node::new(
        config.node.id.clone(),
        config.node.signal_len,
        config.node.reference_signal(),
        config.node.score_policy,
        gate,
        relay,
        metrics.clone(),
    );
    let (handle, node_task) = node.spawn(config.node.queue_capacity);

    // Alert sink
    let mut alerts = events.subscribe();
    tokio::spawn(async move {
        loop {
            match alerts.recv().await {
                Ok(MeshEvent::Alert {
                    node_id,
                    score,
                    reason,
                    timestamp,
                }) => {
                    tracing::warn!(
                        "🚨 ALERT {:?} on {} at {}: R={:.4}",
                        reason,
                        node_id,
                        timestamp.to_rfc3339(),
                        score
                    );
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Alert sink lagged, skipped {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let listener = MeshListener::bind(
        &config.mesh.listen_addr,
        codec,
        handle.clone(),
        events.clone(),
        metrics.clone(),
    )
    .await
    .with_context(|| format!("failed to bind {}", config.mesh.listen_addr))?
    .with_read_timeout(config.mesh.read_timeout());
    tokio::spawn(listener.run());

    // Health and admin endpoint
    let health_checker = Arc::new(HealthChecker::new(
        handle.clone(),
        metrics.clone(),
        config.mesh.neighbors.len(),
    ));
    let health_port = config.monitoring.health_port;
    tokio::spawn(start_health_server(health_checker.clone(), health_port));
    tracing::info!("✅ Health endpoint running on port {}", health_port);

    let mut ticker = tokio::time::interval(tokio::time::Duration::from_secs(60));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let status = health_checker.get_status();
                tracing::info!(
                    "Node status: {} (state: {}, vetoes: {}, uptime: {}s)",
                    status.status,
                    status.node.state,
                    status.node.veto_count,
                    status.uptime_seconds
                );
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("🛑 Shutdown requested");
                break;
            }
        }
    }

    node_task.abort();
    Ok(())
}
