use thiserror::Error;

/// Failures scoped to a single signal or message. None of them is fatal
/// to the node.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MeshError {
    /// Reference and incoming signal differ in length.
    #[error("signal length mismatch: expected {expected} samples, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    /// Inbound frame shorter than the fixed frame length.
    #[error("malformed message: {actual} bytes, expected {expected}")]
    MalformedMessage { expected: usize, actual: usize },

    /// The node actor has stopped and no longer accepts signals.
    #[error("node is closed")]
    NodeClosed,

    #[error("config error: {0}")]
    Config(String),
}

pub type MeshResult<T> = Result<T, MeshError>;
