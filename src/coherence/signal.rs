use serde::{Deserialize, Serialize};

/// Fixed-length ordered observation. Samples are intensities; the wire
/// form carries each one as a byte over `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    samples: Vec<f64>,
}

impl Signal {
    pub fn new(samples: Vec<f64>) -> Self {
        Self { samples }
    }

    pub fn filled(len: usize, value: f64) -> Self {
        Self {
            samples: vec![value; len],
        }
    }

    /// Signal with `1.0` at `index` and zero elsewhere.
    pub fn unit(len: usize, index: usize) -> Self {
        let mut samples = vec![0.0; len];
        if let Some(slot) = samples.get_mut(index) {
            *slot = 1.0;
        }
        Self { samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    /// Dot product over the common prefix of both signals.
    pub fn dot(&self, other: &Signal) -> f64 {
        self.samples
            .iter()
            .zip(&other.samples)
            .map(|(a, b)| a * b)
            .sum()
    }

    pub fn norm(&self) -> f64 {
        self.samples.iter().map(|s| s * s).sum::<f64>().sqrt()
    }
}
