use thiserror::Error;

use crate::queue::QueueError;

/// All errors produced by flumen-core.
#[derive(Debug, Error)]
pub enum FlumenError {
    #[error("hardware failure: {0}")]
    Hardware(String),

    #[error("device read error: {0}")]
    Device(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("sample queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, FlumenError>;
