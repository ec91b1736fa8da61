use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::Score;
use crate::core::error::{MeshError, MeshResult};

pub const DEFAULT_THRESHOLD: f64 = 0.997;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VetoDecision {
    Allow,
    Veto,
}

impl VetoDecision {
    /// `Allow` iff `score >= threshold`.
    pub fn from_score(score: Score, threshold: f64) -> Self {
        if score.value() >= threshold {
            VetoDecision::Allow
        } else {
            VetoDecision::Veto
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VetoDecision::Allow => "ALLOW",
            VetoDecision::Veto => "VETO",
        }
    }
}

impl fmt::Display for VetoDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Count of vetoes since startup or the last administrative reset.
#[derive(Debug, Default)]
pub struct VetoCounter {
    count: AtomicU64,
}

impl VetoCounter {
    pub fn new() -> Self {
        Self::default()
    }

    fn increment(&self) -> u64 {
        self.count.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn get(&self) -> u64 {
        self.count.load(Ordering::SeqCst)
    }

    /// Administrative reset. Returns the value before the reset.
    pub fn reset(&self) -> u64 {
        self.count.swap(0, Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct VetoGate {
    threshold: f64,
    counter: Arc<VetoCounter>,
}

impl VetoGate {
    pub fn new(threshold: f64) -> MeshResult<Self> {
        Self::with_counter(threshold, Arc::new(VetoCounter::new()))
    }

    pub fn with_counter(threshold: f64, counter: Arc<VetoCounter>) -> MeshResult<Self> {
        if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
            return Err(MeshError::Config(format!(
                "threshold {} outside [0, 1]",
                threshold
            )));
        }
        Ok(Self { threshold, counter })
    }

    /// Decides and, on `Veto`, bumps the counter.
    pub fn decide(&self, score: Score) -> VetoDecision {
        let decision = VetoDecision::from_score(score, self.threshold);
        if decision == VetoDecision::Veto {
            let total = self.counter.increment();
            tracing::debug!("Veto #{} at score {} (threshold {})", total, score, self.threshold);
        }
        decision
    }

    pub fn counter(&self) -> Arc<VetoCounter> {
        self.counter.clone()
    }

    pub fn veto_count(&self) -> u64 {
        self.counter.get()
    }
}

impl Default for VetoGate {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            counter: Arc::new(VetoCounter::new()),
        }
    }
}
