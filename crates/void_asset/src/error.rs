//! Error types shared by the asset crate

use crate::loader::LoadError;
use crate::writer::WriteError;
use thiserror::Error;

/// Errors raised by the asset pipeline core
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("Asset {0} has unknown protocol!")]
    UnknownProtocol(String),

    #[error("Invalid asset key: {0}")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Write(#[from] WriteError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Binary encoding error: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Load(#[from] LoadError),
}

/// Result alias for the asset core
pub type AssetResult<T> = Result<T, AssetError>;
