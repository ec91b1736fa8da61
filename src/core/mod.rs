pub mod config;
pub mod error;
pub mod health;
pub mod logging;

pub use config::{Config, ScorePolicy};
pub use error::{MeshError, MeshResult};
pub use health::HealthChecker;
