//! Engine session error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(&'static str),

    #[error("Failed to start engine: {0}")]
    Spawn(String),

    /// Worker-level failure; logged, never fatal to the session
    #[error("Engine communication error: {0}")]
    Communication(String),
}
