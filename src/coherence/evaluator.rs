//! Cosine agreement between a reference signal and an incoming one.

use super::{Score, Signal};
use crate::core::error::{MeshError, MeshResult};

/// Keeps the denominator away from zero for silent signals.
pub const EPSILON: f64 = 1e-8;

/// `dot(a, b) / (|a| * |b| + EPSILON)`, clamped to `[0, 1]`.
///
/// Pure. Fails with [`MeshError::LengthMismatch`] when the signals differ in
/// length; `expected` is the reference length.
pub fn evaluate(reference: &Signal, incoming: &Signal) -> MeshResult<Score> {
    if reference.len() != incoming.len() {
        return Err(MeshError::LengthMismatch {
            expected: reference.len(),
            actual: incoming.len(),
        });
    }

    let dot = reference.dot(incoming);
    let denom = reference.norm() * incoming.norm() + EPSILON;
    Ok(Score::new(dot / denom))
}
