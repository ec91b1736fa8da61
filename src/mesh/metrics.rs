use prometheus::{
    Encoder, Gauge, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use std::time::Duration;

use crate::coherence::{Score, VetoDecision};

pub struct NodeMetrics {
    registry: Registry,
    frames_received: IntCounter,
    malformed_frames: IntCounter,
    cycles: IntCounterVec,
    forwards_ok: IntCounter,
    forwards_failed: IntCounter,
    forward_latency: Histogram,
    last_score: Gauge,
}

impl NodeMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new_custom(Some("coherence_mesh".to_string()), None)?;

        let frames_received = IntCounter::new("frames_received_total", "Inbound frames decoded")?;
        let malformed_frames =
            IntCounter::new("malformed_frames_total", "Inbound frames rejected as malformed")?;
        let cycles = IntCounterVec::new(
            Opts::new("cycles_total", "Completed evaluation cycles by decision"),
            &["decision"],
        )?;
        let forwards_ok = IntCounter::new("forwards_ok_total", "Frames delivered to neighbors")?;
        let forwards_failed =
            IntCounter::new("forwards_failed_total", "Per-neighbor forwarding failures")?;
        let forward_latency = Histogram::with_opts(
            HistogramOpts::new("forward_seconds", "Per-neighbor send latency").buckets(vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
            ]),
        )?;
        let last_score = Gauge::new("last_score", "Score of the most recent cycle")?;

        registry.register(Box::new(frames_received.clone()))?;
        registry.register(Box::new(malformed_frames.clone()))?;
        registry.register(Box::new(cycles.clone()))?;
        registry.register(Box::new(forwards_ok.clone()))?;
        registry.register(Box::new(forwards_failed.clone()))?;
        registry.register(Box::new(forward_latency.clone()))?;
        registry.register(Box::new(last_score.clone()))?;

        Ok(Self {
            registry,
            frames_received,
            malformed_frames,
            cycles,
            forwards_ok,
            forwards_failed,
            forward_latency,
            last_score,
        })
    }

    pub fn record_frame(&self) {
        self.frames_received.inc();
    }

    pub fn record_malformed(&self) {
        self.malformed_frames.inc();
    }

    pub fn record_cycle(&self, score: Score, decision: VetoDecision) {
        self.cycles.with_label_values(&[decision.as_str()]).inc();
        self.last_score.set(score.value());
    }

    pub fn record_forward(&self, ok: bool, latency: Duration) {
        if ok {
            self.forwards_ok.inc();
        } else {
            self.forwards_failed.inc();
        }
        self.forward_latency.observe(latency.as_secs_f64());
    }

    pub fn frames_received(&self) -> u64 {
        self.frames_received.get()
    }

    pub fn malformed_frames(&self) -> u64 {
        self.malformed_frames.get()
    }

    pub fn cycles(&self, decision: VetoDecision) -> u64 {
        self.cycles.with_label_values(&[decision.as_str()]).get()
    }

    pub fn forwards_ok(&self) -> u64 {
        self.forwards_ok.get()
    }

    pub fn forwards_failed(&self) -> u64 {
        self.forwards_failed.get()
    }

    /// Prometheus text exposition of every registered metric.
    pub fn render(&self) -> String {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buf) {
            tracing::warn!("Failed to encode metrics: {}", e);
            return String::new();
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}
