use serde::Deserialize;
use std::env;
use std::time::Duration;

use crate::coherence::{Signal, DEFAULT_THRESHOLD};
use crate::core::error::{MeshError, MeshResult};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub node: NodeConfig,
    pub mesh: MeshConfig,
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    pub id: String,
    pub signal_len: usize,
    pub threshold: f64,
    pub score_policy: ScorePolicy,
    pub reference: Option<Vec<f64>>,
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MeshConfig {
    pub listen_addr: String,
    pub neighbors: Vec<String>,
    pub send_timeout_ms: u64,
    pub read_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitoringConfig {
    pub health_port: u16,
    pub log_level: String,
}

/// Which score the gate sees for a signal that arrived with a neighbor's
/// score attached. The gated score is also the one written into the
/// outbound frame, so `MinNeighbor` changes what goes on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScorePolicy {
    /// Only the locally computed score.
    Local,
    /// The lower of the local score and the neighbor's score. Relayed
    /// frames carry this minimum rather than the local score.
    MinNeighbor,
}

impl ScorePolicy {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "local" => Some(ScorePolicy::Local),
            "min-neighbor" | "min_neighbor" => Some(ScorePolicy::MinNeighbor),
            _ => None,
        }
    }
}

impl MeshConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl NodeConfig {
    pub fn reference_signal(&self) -> Option<Signal> {
        self.reference.clone().map(Signal::new)
    }
}

impl Config {
    pub fn from_env() -> MeshResult<Self> {
        dotenv::dotenv().ok();
        Self::from_source(|key| env::var(key).ok())
    }

    /// Builds a config from any key lookup. Missing or unparsable values
    /// fall back to defaults; semantic checks happen in [`Config::validate`].
    pub fn from_source<F>(lookup: F) -> MeshResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let parsed = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let score_policy = match parsed("SCORE_POLICY") {
            Some(raw) => ScorePolicy::parse(&raw)
                .ok_or_else(|| MeshError::Config(format!("unknown SCORE_POLICY '{}'", raw)))?,
            None => ScorePolicy::Local,
        };

        let reference = match parsed("REFERENCE_SIGNAL") {
            Some(raw) => Some(parse_samples(&raw)?),
            None => None,
        };

        let config = Config {
            node: NodeConfig {
                id: parsed("NODE_ID").unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
                signal_len: parsed("SIGNAL_LEN")
                    .and_then(|v| v.trim().parse().ok())
                    .unwrap_or(64),
                threshold: parsed("VETO_THRESHOLD")
                    .and_then(|v| v.trim().parse().ok())
                    .unwrap_or(DEFAULT_THRESHOLD),
                score_policy,
                reference,
                queue_capacity: parsed("QUEUE_CAPACITY")
                    .and_then(|v| v.trim().parse().ok())
                    .unwrap_or(1024),
            },
            mesh: MeshConfig {
                listen_addr: parsed("MESH_LISTEN_ADDR")
                    .unwrap_or_else(|| "0.0.0.0:5005".to_string()),
                neighbors: parsed("MESH_NEIGHBORS")
                    .map(|v| {
                        v.split(',')
                            .map(str::trim)
                            .filter(|s| !s.is_empty())
                            .map(String::from)
                            .collect()
                    })
                    .unwrap_or_default(),
                send_timeout_ms: parsed("SEND_TIMEOUT_MS")
                    .and_then(|v| v.trim().parse().ok())
                    .unwrap_or(500),
                read_timeout_ms: parsed("MESH_READ_TIMEOUT_MS")
                    .and_then(|v| v.trim().parse().ok())
                    .unwrap_or(60_000),
            },
            monitoring: MonitoringConfig {
                health_port: parsed("HEALTH_PORT")
                    .and_then(|v| v.trim().parse().ok())
                    .unwrap_or(3000),
                log_level: parsed("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> MeshResult<()> {
        let threshold = self.node.threshold;
        if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
            return Err(MeshError::Config(format!(
                "threshold {} outside [0, 1]",
                threshold
            )));
        }
        if self.node.signal_len == 0 {
            return Err(MeshError::Config("signal length must be positive".into()));
        }
        if self.node.queue_capacity == 0 {
            return Err(MeshError::Config("queue capacity must be positive".into()));
        }
        if self.mesh.read_timeout_ms == 0 {
            return Err(MeshError::Config("read timeout must be positive".into()));
        }
        if let Some(reference) = &self.node.reference {
            if reference.len() != self.node.signal_len {
                return Err(MeshError::Config(format!(
                    "reference signal has {} samples, expected {}",
                    reference.len(),
                    self.node.signal_len
                )));
            }
            // Wire-decoded signals are always intensities in [0, 1].
            if let Some(bad) = reference
                .iter()
                .find(|s| !s.is_finite() || !(0.0..=1.0).contains(*s))
            {
                return Err(MeshError::Config(format!(
                    "reference sample {} outside [0, 1]",
                    bad
                )));
            }
        }
        Ok(())
    }
}

fn parse_samples(raw: &str) -> MeshResult<Vec<f64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<f64>()
                .map_err(|e| MeshError::Config(format!("bad reference sample '{}': {}", s, e)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_source(lookup(&[])).unwrap();
        assert_eq!(config.node.signal_len, 64);
        assert_eq!(config.node.threshold, 0.997);
        assert_eq!(config.node.score_policy, ScorePolicy::Local);
        assert!(config.node.reference.is_none());
        assert!(config.mesh.neighbors.is_empty());
        assert_eq!(config.mesh.send_timeout(), Duration::from_millis(500));
        assert_eq!(config.mesh.read_timeout(), Duration::from_secs(60));
        assert_eq!(config.monitoring.log_level, "info");
        assert!(!config.node.id.is_empty());
    }

    #[test]
    fn test_neighbor_list_parsing() {
        let config = Config::from_source(lookup(&[(
            "MESH_NEIGHBORS",
            "10.0.0.2:5005, 10.0.0.3:5005,,",
        )]))
        .unwrap();
        assert_eq!(config.mesh.neighbors, vec!["10.0.0.2:5005", "10.0.0.3:5005"]);
    }

    #[test]
    fn test_rejects_threshold_out_of_range() {
        let err = Config::from_source(lookup(&[("VETO_THRESHOLD", "1.5")])).unwrap_err();
        assert!(matches!(err, MeshError::Config(_)));
    }

    #[test]
    fn test_score_policy_parsing() {
        let config = Config::from_source(lookup(&[("SCORE_POLICY", "min-neighbor")])).unwrap();
        assert_eq!(config.node.score_policy, ScorePolicy::MinNeighbor);

        let err = Config::from_source(lookup(&[("SCORE_POLICY", "average")])).unwrap_err();
        assert!(matches!(err, MeshError::Config(_)));
    }

    #[test]
    fn test_reference_signal_length_checked() {
        let config = Config::from_source(lookup(&[
            ("SIGNAL_LEN", "4"),
            ("REFERENCE_SIGNAL", "1, 0, 0, 0"),
        ]))
        .unwrap();
        assert_eq!(config.node.reference_signal().map(|s| s.len()), Some(4));

        let err = Config::from_source(lookup(&[
            ("SIGNAL_LEN", "4"),
            ("REFERENCE_SIGNAL", "1,0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, MeshError::Config(_)));
    }

    #[test]
    fn test_reference_samples_must_be_intensities() {
        for raw in ["NaN,1,1,1", "inf,1,1,1", "1,1,1,1.5", "-0.1,1,1,1"] {
            let result = Config::from_source(lookup(&[
                ("SIGNAL_LEN", "4"),
                ("REFERENCE_SIGNAL", raw),
            ]));
            assert!(
                matches!(result, Err(MeshError::Config(_))),
                "accepted reference {}",
                raw
            );
        }

        let config = Config::from_source(lookup(&[
            ("SIGNAL_LEN", "4"),
            ("REFERENCE_SIGNAL", "0,1,0.5,1"),
        ]));
        assert!(config.is_ok());
    }
}
