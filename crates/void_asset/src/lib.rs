//! # void_asset - Asset Pipeline Core
//!
//! Addressing, durability and loading for the Void asset pipeline:
//! - Virtual keys (`root:/relative/path`) resolved through a protocol table
//! - Crash-safe atomic writes for every persisted artifact
//! - A named worker pool with shared, waitable futures
//! - Handles whose payload fills in from a scheduled load job
//! - Sidecar metadata, a uid database and per-key deduplication
//!
//! ## Example
//!
//! ```ignore
//! use void_asset::prelude::*;
//!
//! let ctx = PipelineContext::new(PipelineConfig::load(None)?)?;
//! ctx.assets.register_loader(MyMaterialLoader);
//!
//! // Never blocks; the handle fills in on a worker
//! let key = AssetKey::parse("app:/data/materials/wall.mat")?;
//! let handle: Handle<Material> = ctx.assets.get_asset(&key);
//!
//! // Same key, same job
//! let again: Handle<Material> = ctx.assets.get_asset(&key);
//! assert!(handle.shares_job(&again));
//!
//! let material = handle.wait()?;
//! ```

pub mod config;
pub mod context;
pub mod database;
pub mod error;
pub mod handle;
pub mod job;
pub mod key;
pub mod loader;
pub mod manager;
pub mod meta;
pub mod protocol;
pub mod recompile;
pub mod types;
pub mod writer;

pub use config::{
    ConversionThresholds, ImportSettings, PipelineConfig, ProjectSettings, ShaderSettings, ToolPaths,
    WorkflowWeights,
};
pub use context::PipelineContext;
pub use database::{AssetDatabase, DatabaseEntry};
pub use error::{AssetError, AssetResult};
pub use handle::{AssetId, Handle, LoadOutcome, LoadState, UntypedHandle};
pub use job::{promise, when_all, JobError, JobPool, Promise, SharedFuture};
pub use key::AssetKey;
pub use loader::{
    AssetLoader, AsyncLoader, CompileHook, ErasedLoader, LoadContext, LoadError, LoadResult, LoaderRegistry,
};
pub use manager::AssetManager;
pub use meta::{
    AnimationImporter, AssetMeta, CompressionQuality, ImporterSettings, MeshImporter, RootMotion, TextureImporter,
    TextureSize, TextureType,
};
pub use protocol::ProtocolTable;
pub use recompile::{RecompileCommand, RecompileRequests};
pub use types::{AssetType, RendererBackend};
pub use writer::{
    atomic_copy_file, atomic_write_bincode, atomic_write_bytes, atomic_write_file, atomic_write_json, WriteError,
    WriteStage,
};

/// Prelude - commonly used types
pub mod prelude {
    pub use crate::config::PipelineConfig;
    pub use crate::context::PipelineContext;
    pub use crate::error::{AssetError, AssetResult};
    pub use crate::handle::{Handle, LoadState};
    pub use crate::key::AssetKey;
    pub use crate::loader::{AssetLoader, LoadContext, LoadError, LoadResult};
    pub use crate::manager::AssetManager;
    pub use crate::types::AssetType;
}
