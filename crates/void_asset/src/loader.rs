//! Asset Loader - Asynchronous, pluggable asset loading
//!
//! Loaders turn compiled (or raw, for source-servable types) bytes into
//! runtime values. [`AsyncLoader`] resolves a key, decides where the bytes
//! come from and schedules a named job on the [`JobPool`]; it never blocks
//! the caller.

use crate::handle::{AssetId, Handle, LoadOutcome};
use crate::job::JobPool;
use crate::key::AssetKey;
use crate::protocol::ProtocolTable;
use crate::types::AssetType;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Error during asset loading
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LoadError {
    #[error("Asset not found: {0}")]
    NotFound(String),

    #[error("Asset {0} has unknown protocol!")]
    UnknownProtocol(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Compilation failed: {0}")]
    Compile(String),

    #[error("Load was cancelled")]
    Cancelled,

    #[error("{0}")]
    Custom(String),
}

impl From<std::io::Error> for LoadError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

/// Result type for asset loading
pub type LoadResult<T> = Result<T, LoadError>;

/// Context provided to loaders during loading
pub struct LoadContext<'a> {
    /// Key of the asset being loaded
    pub key: &'a AssetKey,
    /// File the bytes were read from
    pub path: &'a Path,
    /// Raw bytes
    pub data: &'a [u8],
    /// True when the bytes are the source file rather than a compiled artifact
    pub from_source: bool,
}

impl<'a> LoadContext<'a> {
    /// Create a new load context
    pub fn new(key: &'a AssetKey, path: &'a Path, data: &'a [u8], from_source: bool) -> Self {
        Self {
            key,
            path,
            data,
            from_source,
        }
    }

    /// Source extension of the key
    pub fn extension(&self) -> Option<&str> {
        self.key.extension()
    }

    /// Read data as string (UTF-8)
    pub fn read_string(&self) -> LoadResult<&str> {
        std::str::from_utf8(self.data).map_err(|e| LoadError::Parse(format!("Invalid UTF-8: {}", e)))
    }

    /// Decode JSON data
    pub fn read_json<T: DeserializeOwned>(&self) -> LoadResult<T> {
        serde_json::from_slice(self.data).map_err(|e| LoadError::Parse(e.to_string()))
    }

    /// Decode bincode data
    pub fn read_bincode<T: DeserializeOwned>(&self) -> LoadResult<T> {
        bincode::deserialize(self.data).map_err(|e| LoadError::Parse(e.to_string()))
    }
}

/// Trait for asset loaders
pub trait AssetLoader: Send + Sync + 'static {
    /// Asset type this loader produces
    type Asset: Send + Sync + 'static;

    /// Pipeline type of the keys this loader reads
    fn asset_type(&self) -> AssetType;

    /// Load an asset from raw data
    fn load(&self, ctx: &LoadContext) -> LoadResult<Self::Asset>;
}

/// Type-erased asset loader
pub trait ErasedLoader: Send + Sync {
    /// Pipeline type of the keys this loader reads
    fn asset_type(&self) -> AssetType;

    /// Load an asset into a shared Any
    fn load_erased(&self, ctx: &LoadContext) -> LoadResult<Arc<dyn Any + Send + Sync>>;

    /// Get the asset type name
    fn asset_type_name(&self) -> &'static str;
}

impl<L: AssetLoader> ErasedLoader for L {
    fn asset_type(&self) -> AssetType {
        AssetLoader::asset_type(self)
    }

    fn load_erased(&self, ctx: &LoadContext) -> LoadResult<Arc<dyn Any + Send + Sync>> {
        self.load(ctx).map(|asset| Arc::new(asset) as Arc<dyn Any + Send + Sync>)
    }

    fn asset_type_name(&self) -> &'static str {
        std::any::type_name::<L::Asset>()
    }
}

/// Registry of loaders keyed by the Rust type they produce
#[derive(Default)]
pub struct LoaderRegistry {
    by_type: HashMap<TypeId, Arc<dyn ErasedLoader>>,
}

impl LoaderRegistry {
    /// Create a new loader registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a loader, replacing any previous one for the same asset type
    pub fn register<L: AssetLoader>(&mut self, loader: L) {
        self.by_type.insert(TypeId::of::<L::Asset>(), Arc::new(loader));
    }

    /// Loader producing `T`
    pub fn get<T: 'static>(&self) -> Option<Arc<dyn ErasedLoader>> {
        self.by_type.get(&TypeId::of::<T>()).cloned()
    }

    /// Number of registered loaders
    pub fn len(&self) -> usize {
        self.by_type.len()
    }

    /// Whether no loader is registered
    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }
}

/// Produces a missing compiled artifact on demand
pub trait CompileHook: Send + Sync {
    /// Compile `key` into `output`; returns false on failure
    fn compile(&self, key: &AssetKey, output: &Path) -> bool;
}

enum LoadPlan {
    Read { path: PathBuf, from_source: bool },
    CompileThenRead { compiled: PathBuf },
}

/// Asynchronous loader
pub struct AsyncLoader {
    protocols: Arc<ProtocolTable>,
    pool: Arc<JobPool>,
    loaders: RwLock<LoaderRegistry>,
    compile_hook: RwLock<Option<Arc<dyn CompileHook>>>,
    next_id: AtomicU64,
}

impl AsyncLoader {
    /// Create a loader over a resolver and a worker pool
    pub fn new(protocols: Arc<ProtocolTable>, pool: Arc<JobPool>) -> Self {
        Self {
            protocols,
            pool,
            loaders: RwLock::new(LoaderRegistry::new()),
            compile_hook: RwLock::new(None),
            next_id: AtomicU64::new(0),
        }
    }

    /// Register a loader
    pub fn register_loader<L: AssetLoader>(&self, loader: L) {
        self.loaders.write().register(loader);
    }

    /// Install the compile-on-demand hook
    pub fn set_compile_hook(&self, hook: Arc<dyn CompileHook>) {
        *self.compile_hook.write() = Some(hook);
    }

    /// Protocol table used for resolution
    pub fn protocols(&self) -> &Arc<ProtocolTable> {
        &self.protocols
    }

    fn allocate_id(&self) -> AssetId {
        AssetId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Begin loading `key` as `T`
    ///
    /// Returns immediately. The handle fails at once if the key's protocol is
    /// unknown, no loader produces `T`, or neither the compiled artifact nor
    /// the source exists.
    pub fn load<T: Send + Sync + 'static>(&self, key: &AssetKey) -> Handle<T> {
        let id = self.allocate_id();

        let loader = match self.loaders.read().get::<T>() {
            Some(loader) => loader,
            None => {
                log::error!("No loader registered for {}", std::any::type_name::<T>());
                return Handle::failed(
                    id,
                    key.clone(),
                    LoadError::UnsupportedFormat(std::any::type_name::<T>().to_string()),
                );
            }
        };

        let plan = match self.plan(key, loader.asset_type()) {
            Ok(plan) => plan,
            Err(err) => return Handle::failed(id, key.clone(), err),
        };

        let job_key = key.clone();
        let hook = self.compile_hook.read().clone();
        let name = format!("Loading {}", loader.asset_type().name());
        let future = self.pool.schedule(name, move || -> LoadOutcome<T> {
            let (path, from_source) = match plan {
                LoadPlan::Read { path, from_source } => (path, from_source),
                LoadPlan::CompileThenRead { compiled } => {
                    let compiled_ok = hook
                        .as_ref()
                        .map(|h| h.compile(&job_key, &compiled))
                        .unwrap_or(false);
                    if !compiled_ok || !compiled.exists() {
                        return Err(LoadError::Compile(job_key.to_string()));
                    }
                    (compiled, false)
                }
            };

            let data = std::fs::read(&path)?;
            let ctx = LoadContext::new(&job_key, &path, &data, from_source);
            let asset = loader.load_erased(&ctx)?;
            asset.downcast::<T>().map_err(|_| {
                LoadError::Custom(format!(
                    "Loader for {} produced a different type",
                    std::any::type_name::<T>()
                ))
            })
        });

        Handle::pending(id, key.clone(), future)
    }

    fn plan(&self, key: &AssetKey, asset_type: AssetType) -> Result<LoadPlan, LoadError> {
        if !self.protocols.has_known_protocol(key) {
            log::error!("Asset {} has unknown protocol!", key);
            return Err(LoadError::UnknownProtocol(key.to_string()));
        }

        let unknown = |_| LoadError::UnknownProtocol(key.to_string());
        let compiled = self.protocols.compiled_path_for(key).map_err(unknown)?;
        if compiled.exists() {
            return Ok(LoadPlan::Read {
                path: compiled,
                from_source: false,
            });
        }

        let source = self.protocols.resolve(key).map_err(unknown)?;
        if !source.exists() {
            log::error!("Asset {} does not exist!", key);
            return Err(LoadError::NotFound(key.to_string()));
        }

        let has_hook = self.compile_hook.read().is_some();
        if asset_type.is_source_servable() || !has_hook {
            log::warn!(
                "Compiled asset {} does not exist! Falling back to raw asset.",
                compiled.display()
            );
            return Ok(LoadPlan::Read {
                path: source,
                from_source: true,
            });
        }

        Ok(LoadPlan::CompileThenRead { compiled })
    }

    /// Handle that is immediately ready with an existing value
    pub fn load_from_instance<T: Send + Sync + 'static>(&self, key: &AssetKey, instance: Arc<T>) -> Handle<T> {
        Handle::from_instance(self.allocate_id(), key.clone(), instance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::LoadState;
    use crate::types::RendererBackend;
    use std::fs;
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    struct ScriptSource(String);

    struct ScriptLoader;

    impl AssetLoader for ScriptLoader {
        type Asset = ScriptSource;

        fn asset_type(&self) -> AssetType {
            AssetType::Script
        }

        fn load(&self, ctx: &LoadContext) -> LoadResult<Self::Asset> {
            Ok(ScriptSource(ctx.read_string()?.to_string()))
        }
    }

    struct MaterialBytes(Vec<u8>, bool);

    struct MaterialLoader;

    impl AssetLoader for MaterialLoader {
        type Asset = MaterialBytes;

        fn asset_type(&self) -> AssetType {
            AssetType::Material
        }

        fn load(&self, ctx: &LoadContext) -> LoadResult<Self::Asset> {
            Ok(MaterialBytes(ctx.data.to_vec(), ctx.from_source))
        }
    }

    struct CopyHook(AtomicUsize);

    impl CompileHook for CopyHook {
        fn compile(&self, key: &AssetKey, output: &Path) -> bool {
            self.0.fetch_add(1, Ordering::SeqCst);
            let _ = key;
            fs::create_dir_all(output.parent().unwrap()).unwrap();
            fs::write(output, b"compiled").is_ok()
        }
    }

    fn setup() -> (TempDir, AsyncLoader) {
        let dir = TempDir::new().unwrap();
        let table = ProtocolTable::new(RendererBackend::Vulkan).with_root("app", dir.path());
        let pool = Arc::new(JobPool::new(2).unwrap());
        let loader = AsyncLoader::new(Arc::new(table), pool);
        loader.register_loader(ScriptLoader);
        loader.register_loader(MaterialLoader);
        (dir, loader)
    }

    fn key(s: &str) -> AssetKey {
        AssetKey::parse(s).unwrap()
    }

    #[test]
    fn test_load_compiled() {
        let (dir, loader) = setup();
        fs::create_dir_all(dir.path().join("compiled")).unwrap();
        fs::write(dir.path().join("compiled/a.mat.asset"), b"bin").unwrap();

        let handle: Handle<MaterialBytes> = loader.load(&key("app:/data/a.mat"));
        let asset = handle.wait().unwrap();
        assert_eq!(asset.0, b"bin");
        assert!(!asset.1);
    }

    #[test]
    fn test_source_fallback_for_scripts() {
        let (dir, loader) = setup();
        fs::create_dir_all(dir.path().join("data")).unwrap();
        fs::write(dir.path().join("data/player.cs"), "class Player {}").unwrap();

        let handle: Handle<ScriptSource> = loader.load(&key("app:/data/player.cs"));
        assert_eq!(handle.wait().unwrap().0, "class Player {}");
    }

    #[test]
    fn test_missing_everything_fails_immediately() {
        let (_dir, loader) = setup();
        let handle: Handle<ScriptSource> = loader.load(&key("app:/data/missing.cs"));
        assert_eq!(handle.state(), LoadState::Failed);
        assert!(matches!(handle.error(), Some(LoadError::NotFound(_))));
    }

    #[test]
    fn test_unknown_protocol_fails_immediately() {
        let (_dir, loader) = setup();
        let handle: Handle<ScriptSource> = loader.load(&key("mods:/data/a.cs"));
        assert!(matches!(handle.error(), Some(LoadError::UnknownProtocol(_))));
    }

    #[test]
    fn test_compile_hook_runs_for_non_servable_types() {
        let (dir, loader) = setup();
        fs::create_dir_all(dir.path().join("data")).unwrap();
        fs::write(dir.path().join("data/b.mat"), b"{}").unwrap();
        let hook = Arc::new(CopyHook(AtomicUsize::new(0)));
        loader.set_compile_hook(hook.clone());

        let handle: Handle<MaterialBytes> = loader.load(&key("app:/data/b.mat"));
        let asset = handle.wait().unwrap();
        assert_eq!(asset.0, b"compiled");
        assert_eq!(hook.0.load(Ordering::SeqCst), 1);
        assert!(dir.path().join("compiled/b.mat.asset").exists());
    }

    #[test]
    fn test_unregistered_type_fails() {
        let (_dir, loader) = setup();
        let handle: Handle<u32> = loader.load(&key("app:/data/a.mat"));
        assert!(matches!(handle.error(), Some(LoadError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_load_from_instance_is_ready() {
        let (_dir, loader) = setup();
        let handle = loader.load_from_instance(&key("app:/data/x.cs"), Arc::new(ScriptSource("x".into())));
        assert_eq!(handle.state(), LoadState::Ready);
        assert_eq!(handle.get().unwrap().0, "x");
    }
}
