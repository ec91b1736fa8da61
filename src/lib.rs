//! Threshold-gated coherence relay for a mesh of nodes.
//!
//! A node scores each incoming signal against its reference, vetoes it
//! below the threshold and otherwise forwards it to every neighbor.

pub mod coherence;
pub mod core;
pub mod mesh;
