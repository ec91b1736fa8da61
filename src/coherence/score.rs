use serde::{Deserialize, Serialize};
use std::fmt;

/// Normalized agreement between two signals. Always within `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Score(f64);

impl Score {
    pub const ZERO: Score = Score(0.0);
    pub const ONE: Score = Score(1.0);

    /// Clamps into `[0, 1]`; NaN maps to zero.
    pub fn new(value: f64) -> Self {
        if value.is_nan() {
            return Score::ZERO;
        }
        Score(value.clamp(0.0, 1.0))
    }

    pub fn value(self) -> f64 {
        self.0
    }

    /// Byte-scaled wire form (`0..=255`).
    pub fn to_byte(self) -> u8 {
        (self.0 * 255.0).round() as u8
    }

    pub fn from_byte(byte: u8) -> Self {
        Score(byte as f64 / 255.0)
    }

    pub fn min(self, other: Score) -> Score {
        if other.0 < self.0 {
            other
        } else {
            self
        }
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamping() {
        assert_eq!(Score::new(1.3), Score::ONE);
        assert_eq!(Score::new(-0.2), Score::ZERO);
        assert_eq!(Score::new(f64::NAN), Score::ZERO);
        assert_eq!(Score::new(0.5).value(), 0.5);
    }

    #[test]
    fn test_byte_scaling() {
        assert_eq!(Score::ONE.to_byte(), 255);
        assert_eq!(Score::ZERO.to_byte(), 0);
        assert_eq!(Score::from_byte(255), Score::ONE);
        // 0.997 * 255 = 254.2, the byte form cannot hold the threshold exactly
        assert_eq!(Score::new(0.997).to_byte(), 254);
    }

    #[test]
    fn test_min() {
        assert_eq!(Score::new(0.4).min(Score::new(0.9)), Score::new(0.4));
        assert_eq!(Score::new(0.9).min(Score::new(0.4)), Score::new(0.4));
    }
}
