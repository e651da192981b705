//! Asset Manager - Central asset management
//!
//! The manager deduplicates loads per key, owns the uid database and hands
//! out handles backed by the [`AsyncLoader`]. A key is loaded at most once
//! per epoch; [`reload`](AssetManager::reload) starts a new epoch.

use crate::database::{AssetDatabase, DatabaseEntry};
use crate::error::{AssetError, AssetResult};
use crate::handle::{Handle, UntypedHandle};
use crate::job::JobPool;
use crate::key::AssetKey;
use crate::loader::{AssetLoader, AsyncLoader, CompileHook};
use crate::meta::AssetMeta;
use crate::protocol::ProtocolTable;
use crate::types::AssetType;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

struct CachedHandle {
    epoch: u64,
    handle: UntypedHandle,
}

/// Deduplicating front end over the async loader
pub struct AssetManager {
    protocols: Arc<ProtocolTable>,
    loader: AsyncLoader,
    database: RwLock<AssetDatabase>,
    cache: RwLock<HashMap<AssetKey, CachedHandle>>,
    epochs: RwLock<HashMap<AssetKey, u64>>,
}

impl AssetManager {
    /// Create a manager over a resolver and a worker pool
    pub fn new(protocols: Arc<ProtocolTable>, pool: Arc<JobPool>) -> Self {
        Self {
            loader: AsyncLoader::new(protocols.clone(), pool),
            protocols,
            database: RwLock::new(AssetDatabase::new()),
            cache: RwLock::new(HashMap::new()),
            epochs: RwLock::new(HashMap::new()),
        }
    }

    /// Protocol table
    pub fn protocols(&self) -> &Arc<ProtocolTable> {
        &self.protocols
    }

    /// Register a loader
    pub fn register_loader<L: AssetLoader>(&self, loader: L) {
        self.loader.register_loader(loader);
    }

    /// Install the compile-on-demand hook used for missing artifacts
    pub fn set_compile_hook(&self, hook: Arc<dyn CompileHook>) {
        self.loader.set_compile_hook(hook);
    }

    fn epoch(&self, key: &AssetKey) -> u64 {
        self.epochs.read().get(key).copied().unwrap_or(0)
    }

    /// Handle for `key`, starting a load only if this epoch has none yet
    pub fn get_asset<T: Send + Sync + 'static>(&self, key: &AssetKey) -> Handle<T> {
        let epoch = self.epoch(key);
        let mut cache = self.cache.write();

        if let Some(cached) = cache.get(key) {
            if cached.epoch == epoch {
                if let Some(handle) = cached.handle.typed::<T>() {
                    return handle;
                }
                log::warn!(
                    "Asset {} requested as {} but cached as {}",
                    key,
                    std::any::type_name::<T>(),
                    cached.handle.type_name()
                );
            }
        }

        let handle = self.loader.load::<T>(key);
        cache.insert(
            key.clone(),
            CachedHandle {
                epoch,
                handle: handle.untyped(),
            },
        );
        handle
    }

    /// Register an existing value under `key`
    pub fn load_from_instance<T: Send + Sync + 'static>(&self, key: &AssetKey, instance: Arc<T>) -> Handle<T> {
        let handle = self.loader.load_from_instance(key, instance);
        self.cache.write().insert(
            key.clone(),
            CachedHandle {
                epoch: self.epoch(key),
                handle: handle.untyped(),
            },
        );
        handle
    }

    /// Start a new epoch for `key` and load it again
    pub fn reload<T: Send + Sync + 'static>(&self, key: &AssetKey) -> Handle<T> {
        *self.epochs.write().entry(key.clone()).or_insert(0) += 1;
        log::debug!("Reloading {}", key);
        self.get_asset::<T>(key)
    }

    /// Drop the cached handle for `key`
    pub fn unload(&self, key: &AssetKey) -> bool {
        self.cache.write().remove(key).is_some()
    }

    /// Whether a handle for `key` is cached
    pub fn is_cached(&self, key: &AssetKey) -> bool {
        self.cache.read().contains_key(key)
    }

    /// Number of cached handles
    pub fn cached_count(&self) -> usize {
        self.cache.read().len()
    }

    /// Register metadata for an absolute source path and return its uid
    pub fn add_asset_info_for_path(&self, path: &Path, meta: &AssetMeta, override_meta: bool) -> AssetResult<Uuid> {
        let key = self
            .protocols
            .key_for_path(path)
            .ok_or_else(|| AssetError::InvalidKey(path.display().to_string()))?;
        Ok(self.add_asset_info_for_key(&key, meta, override_meta))
    }

    /// Register metadata for a key and return its uid
    pub fn add_asset_info_for_key(&self, key: &AssetKey, meta: &AssetMeta, override_meta: bool) -> Uuid {
        self.database.write().add_asset(key.as_str(), meta, override_meta)
    }

    /// Uid of a key
    pub fn get_uuid(&self, key: &AssetKey) -> Option<Uuid> {
        self.database.read().get_uuid(key.as_str())
    }

    /// Database row of a uid
    pub fn get_metadata(&self, uid: &Uuid) -> Option<DatabaseEntry> {
        self.database.read().get_metadata(uid).cloned()
    }

    /// Move an asset to a new key, keeping its uid
    pub fn rename_asset(&self, old: &AssetKey, new: &AssetKey) -> bool {
        let renamed = self.database.write().rename_asset(old.as_str(), new.as_str());
        let mut cache = self.cache.write();
        if let Some(cached) = cache.remove(old) {
            cache.insert(new.clone(), cached);
        }
        renamed
    }

    /// Forget an asset entirely
    pub fn remove_asset(&self, key: &AssetKey) -> Option<Uuid> {
        self.cache.write().remove(key);
        self.database.write().remove_asset(key.as_str())
    }

    /// Read access to the database
    pub fn with_database<R>(&self, f: impl FnOnce(&AssetDatabase) -> R) -> R {
        f(&self.database.read())
    }

    /// Persist the entries of one root
    pub fn save_database(&self, root: &str, path: &Path) -> AssetResult<()> {
        self.database.read().filtered(root).save(path)
    }

    /// Merge a database file into the in-memory table
    pub fn load_database(&self, path: &Path) -> AssetResult<()> {
        let loaded = AssetDatabase::load(path)?;
        log::info!("Loaded {} asset entries from {}", loaded.len(), path.display());
        self.database.write().merge(loaded);
        Ok(())
    }

    /// Every source key of `asset_type` under the data directory of `root`
    pub fn source_keys(&self, root: &str, asset_type: AssetType) -> Vec<AssetKey> {
        let data_dir = match self.protocols.data_dir(root) {
            Some(dir) => dir,
            None => return Vec::new(),
        };

        let mut files = Vec::new();
        collect_files(&data_dir, &mut files);

        let mut keys: Vec<AssetKey> = files
            .iter()
            .filter(|p| AssetType::from_path(p) == Some(asset_type))
            .filter_map(|p| self.protocols.key_for_path(p))
            .collect();
        keys.sort();
        keys
    }
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return,
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_files(&path, out);
        } else {
            out.push(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::LoadState;
    use crate::loader::{LoadContext, LoadResult};
    use crate::types::RendererBackend;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct Text(String);

    struct CountingLoader(Arc<AtomicUsize>);

    impl AssetLoader for CountingLoader {
        type Asset = Text;

        fn asset_type(&self) -> AssetType {
            AssetType::Script
        }

        fn load(&self, ctx: &LoadContext) -> LoadResult<Self::Asset> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(Text(ctx.read_string()?.to_string()))
        }
    }

    fn setup() -> (TempDir, AssetManager, Arc<AtomicUsize>) {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("compiled/scripts")).unwrap();
        fs::write(dir.path().join("compiled/scripts/a.cs.asset"), "class A {}").unwrap();

        let table = ProtocolTable::new(RendererBackend::Vulkan).with_root("app", dir.path());
        let manager = AssetManager::new(Arc::new(table), Arc::new(JobPool::new(2).unwrap()));
        let loads = Arc::new(AtomicUsize::new(0));
        manager.register_loader(CountingLoader(loads.clone()));
        (dir, manager, loads)
    }

    #[test]
    fn test_get_asset_dedups() {
        let (_dir, manager, loads) = setup();
        let key = AssetKey::parse("app:/data/scripts/a.cs").unwrap();

        let a: Handle<Text> = manager.get_asset(&key);
        let b: Handle<Text> = manager.get_asset(&key);
        assert!(a.shares_job(&b));
        assert_eq!(b.wait().unwrap().0, "class A {}");
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(manager.cached_count(), 1);
    }

    #[test]
    fn test_reload_starts_new_job() {
        let (_dir, manager, loads) = setup();
        let key = AssetKey::parse("app:/data/scripts/a.cs").unwrap();

        let first: Handle<Text> = manager.get_asset(&key);
        first.wait().unwrap();
        let second: Handle<Text> = manager.reload(&key);
        second.wait().unwrap();

        assert!(!first.shares_job(&second));
        assert_eq!(loads.load(Ordering::SeqCst), 2);
        let third: Handle<Text> = manager.get_asset(&key);
        assert!(third.shares_job(&second));
    }

    #[test]
    fn test_instance_is_cached() {
        let (_dir, manager, loads) = setup();
        let key = AssetKey::parse("app:/data/runtime.cs").unwrap();
        let handle = manager.load_from_instance(&key, Arc::new(Text("made".into())));
        assert_eq!(handle.state(), LoadState::Ready);

        let again: Handle<Text> = manager.get_asset(&key);
        assert!(again.shares_job(&handle));
        assert_eq!(loads.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_asset_info_for_path() {
        let (dir, manager, _) = setup();
        let meta = AssetMeta::new(AssetType::Texture);
        let uid = manager
            .add_asset_info_for_path(&dir.path().join("data/t/wall.png"), &meta, true)
            .unwrap();
        let key = AssetKey::parse("app:/data/t/wall.png").unwrap();
        assert_eq!(manager.get_uuid(&key), Some(uid));
        assert_eq!(manager.get_metadata(&uid).unwrap().location, key.as_str());

        assert!(manager
            .add_asset_info_for_path(Path::new("/not/a/root/x.png"), &meta, true)
            .is_err());
    }

    #[test]
    fn test_source_keys() {
        let (dir, manager, _) = setup();
        fs::create_dir_all(dir.path().join("data/scripts/ai")).unwrap();
        fs::write(dir.path().join("data/scripts/a.cs"), "").unwrap();
        fs::write(dir.path().join("data/scripts/ai/b.cs"), "").unwrap();
        fs::write(dir.path().join("data/scripts/readme.txt"), "").unwrap();

        let keys = manager.source_keys("app", AssetType::Script);
        let names: Vec<&str> = keys.iter().map(|k| k.as_str()).collect();
        assert_eq!(names, vec!["app:/data/scripts/a.cs", "app:/data/scripts/ai/b.cs"]);
    }

    #[test]
    fn test_save_database_per_root() {
        let (dir, manager, _) = setup();
        let key = AssetKey::parse("app:/data/a.mat").unwrap();
        manager.add_asset_info_for_key(&key, &AssetMeta::new(AssetType::Material), false);

        let path = dir.path().join("app.adb");
        manager.save_database("app", &path).unwrap();
        assert_eq!(AssetDatabase::load(&path).unwrap().len(), 1);
    }
}
