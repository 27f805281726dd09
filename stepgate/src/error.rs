use stepgate_state::StateError;
use thiserror::Error;

/// Configuration and precondition errors.
///
/// Operational risk (inspector failures, failed actions, drift) is never an
/// `Error`; it is reported as a [`crate::Finding`].
#[derive(Error, Debug)]
pub enum Error {
    #[error("migration plan validation failed: {}", .0.join("; "))]
    InvalidPlan(Vec<String>),

    #[error("step {0:?} is not idempotent; all steps must be idempotent")]
    NonIdempotentStep(String),

    #[error("check {0:?} is not read-only")]
    NotReadOnly(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
