//! Compile errors

use thiserror::Error;
use void_asset::{AssetError, WriteError};

/// Errors raised while turning a source file into compiled artifacts
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Write(#[from] WriteError),

    #[error("{program} failed: {output}")]
    Process { program: String, output: String },

    #[error("Import error: {0}")]
    Import(String),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("glTF error: {0}")]
    Gltf(#[from] gltf::Error),

    #[error("Metadata error: {0}")]
    Meta(#[from] AssetError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Binary encoding error: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("Unsupported: {0}")]
    Unsupported(String),
}

pub type CompileResult<T> = Result<T, CompileError>;
