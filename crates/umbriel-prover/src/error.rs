//! error types for umbriel-prover

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProverError {
    // protocol
    #[error("worker request timed out")]
    WorkerTimeout,

    #[error("worker not ready: {0}")]
    WorkerNotReady(String),

    #[error("unknown message type: {0}")]
    UnknownMessageType(String),

    #[error("worker request queue is full")]
    QueueFull,

    #[error("worker is gone")]
    WorkerGone,

    // proving
    #[error("prover failure: {0}")]
    ProverFailure(String),

    #[error("invalid witness: {0}")]
    InvalidWitness(String),

    #[error("invalid r1cs: {0}")]
    InvalidR1cs(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    // external
    #[error("artifact fetch failed: {0}")]
    ArtifactFetch(String),
}

pub type Result<T> = std::result::Result<T, ProverError>;
