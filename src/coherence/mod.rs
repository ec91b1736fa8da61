pub mod evaluator;
pub mod gate;
pub mod score;
pub mod signal;

pub use evaluator::{evaluate, EPSILON};
pub use gate::{VetoCounter, VetoDecision, VetoGate, DEFAULT_THRESHOLD};
pub use score::Score;
pub use signal::Signal;
