//! Pipeline context
//!
//! Owns the pieces every compile and load shares: configuration, protocol
//! table, worker pool, asset manager and pending recompile requests.

use crate::config::PipelineConfig;
use crate::error::{AssetError, AssetResult};
use crate::job::JobPool;
use crate::manager::AssetManager;
use crate::recompile::RecompileRequests;
use crate::protocol::ProtocolTable;
use std::sync::Arc;

pub struct PipelineContext {
    pub config: PipelineConfig,
    pub protocols: Arc<ProtocolTable>,
    pub pool: Arc<JobPool>,
    pub assets: Arc<AssetManager>,
    pub recompile: Arc<RecompileRequests>,
}

impl PipelineContext {
    /// Build a context from configuration
    pub fn new(config: PipelineConfig) -> AssetResult<Self> {
        if config.protocols.is_empty() {
            return Err(AssetError::Config("no protocol roots configured".into()));
        }

        let protocols = Arc::new(config.protocol_table());
        let pool = Arc::new(JobPool::new(config.workers)?);
        let assets = Arc::new(AssetManager::new(protocols.clone(), pool.clone()));

        log::info!(
            "Asset pipeline ready: {} roots, {} workers, renderer {}",
            config.protocols.len(),
            pool.worker_count(),
            config.renderer
        );

        Ok(Self {
            config,
            protocols,
            pool,
            assets,
            recompile: Arc::new(RecompileRequests::new()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_context_from_testing_config() {
        let dir = TempDir::new().unwrap();
        let ctx = PipelineContext::new(PipelineConfig::testing(dir.path())).unwrap();
        assert_eq!(ctx.pool.worker_count(), 2);
        assert!(ctx.protocols.root_base("app").is_some());
        assert!(!ctx.recompile.has_pending());
    }

    #[test]
    fn test_context_needs_roots() {
        let mut config = PipelineConfig::development();
        config.protocols.clear();
        assert!(matches!(PipelineContext::new(config), Err(AssetError::Config(_))));
    }
}
