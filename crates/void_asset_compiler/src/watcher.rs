//! Source watcher
//!
//! Watches the data directories of every root and keeps the compiled cache
//! in step with the sources:
//! - Changed sources are recompiled on the job pool
//! - A changed shader include recompiles every shader that includes it
//! - Deleted sources lose their compiled artifact and sidecar
//! - Changed scripts request a rebuild of their root's script library

use crate::dispatch::CompilerRegistry;
use crate::error::CompileResult;
use crate::shader::IncludeGraph;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use void_asset::{AssetKey, AssetType, ProtocolTable, SharedFuture};

#[cfg(feature = "file-watcher")]
use crate::error::CompileError;
#[cfg(feature = "file-watcher")]
use notify::{Event, EventKind, RecursiveMode, Watcher};

/// A file change event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub path: PathBuf,
    pub kind: FileChangeKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileChangeKind {
    Created,
    Modified,
    Deleted,
}

/// Work derived from one change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchAction {
    Compile(AssetKey),
    RemoveArtifacts(AssetKey),
    RecompileScripts(String),
}

const META_SUFFIX: &str = ".meta";

fn is_data_key(key: &AssetKey) -> bool {
    key.relative().starts_with("data/")
}

/// Key for a path, also accepting canonicalized paths
fn key_for_path(protocols: &ProtocolTable, path: &Path) -> Option<AssetKey> {
    if let Some(key) = protocols.key_for_path(path) {
        return Some(key);
    }
    protocols.roots().find_map(|(_, base)| {
        let canonical = fs::canonicalize(base).ok()?;
        let rest = path.strip_prefix(&canonical).ok()?;
        protocols.key_for_path(&base.join(rest))
    })
}

/// Actions for a single change
pub fn plan_change(protocols: &ProtocolTable, includes: &IncludeGraph, change: &FileChange) -> Vec<WatchAction> {
    let Some(key) = key_for_path(protocols, &change.path) else {
        return Vec::new();
    };
    if !is_data_key(&key) {
        return Vec::new();
    }

    // Edited importer settings recompile their source
    if let Some(source) = key.as_str().strip_suffix(META_SUFFIX) {
        return match (change.kind, AssetKey::parse(source)) {
            (FileChangeKind::Deleted, _) | (_, Err(_)) => Vec::new(),
            (_, Ok(source)) => vec![WatchAction::Compile(source)],
        };
    }

    if void_asset::types::is_dependency_path(&change.path) {
        return includes
            .dependents(&change.path)
            .iter()
            .filter_map(|shader| key_for_path(protocols, shader))
            .map(WatchAction::Compile)
            .collect();
    }

    let Some(asset_type) = AssetType::from_key(&key) else {
        return Vec::new();
    };

    let mut actions = vec![match change.kind {
        FileChangeKind::Deleted => WatchAction::RemoveArtifacts(key.clone()),
        FileChangeKind::Created | FileChangeKind::Modified => WatchAction::Compile(key.clone()),
    }];
    if asset_type == AssetType::Script {
        actions.push(WatchAction::RecompileScripts(key.root().to_string()));
    }
    actions
}

/// Debounce tracking - drops repeated events for the same path
struct Debounce {
    last_event: HashMap<PathBuf, Instant>,
    duration: Duration,
}

#[cfg_attr(not(feature = "file-watcher"), allow(dead_code))]
impl Debounce {
    fn new(duration: Duration) -> Self {
        Self {
            last_event: HashMap::new(),
            duration,
        }
    }

    fn should_trigger(&mut self, path: &Path, kind: FileChangeKind, now: Instant) -> bool {
        // Deletions always go through
        if kind != FileChangeKind::Deleted {
            if let Some(last) = self.last_event.get(path) {
                if now.duration_since(*last) < self.duration {
                    return false;
                }
            }
        }
        self.last_event.insert(path.to_path_buf(), now);
        true
    }

    fn prune(&mut self, now: Instant) {
        self.last_event
            .retain(|_, time| now.duration_since(*time) < Duration::from_secs(5));
    }
}

/// Watches source directories and recompiles what changed
pub struct SourceWatcher {
    registry: Arc<CompilerRegistry>,
    #[cfg(feature = "file-watcher")]
    watcher: notify::RecommendedWatcher,
    #[cfg(feature = "file-watcher")]
    rx: crossbeam_channel::Receiver<notify::Result<Event>>,
    debounce: Debounce,
    includes: IncludeGraph,
    include_dirs: Vec<PathBuf>,
    watch_dirs: Vec<PathBuf>,
}

impl SourceWatcher {
    /// Create a watcher that compiles through `registry`
    #[cfg(feature = "file-watcher")]
    pub fn new(registry: Arc<CompilerRegistry>) -> CompileResult<Self> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let watcher = notify::recommended_watcher(move |res| {
            let _ = tx.send(res);
        })
        .map_err(|e| CompileError::Import(format!("Failed to create file watcher: {}", e)))?;

        Ok(Self::with_parts(registry, watcher, rx))
    }

    #[cfg(feature = "file-watcher")]
    fn with_parts(
        registry: Arc<CompilerRegistry>,
        watcher: notify::RecommendedWatcher,
        rx: crossbeam_channel::Receiver<notify::Result<Event>>,
    ) -> Self {
        let include_dirs = Self::shader_include_dirs(&registry);
        Self {
            registry,
            watcher,
            rx,
            debounce: Debounce::new(Duration::from_millis(100)),
            includes: IncludeGraph::new(),
            include_dirs,
            watch_dirs: Vec::new(),
        }
    }

    /// Create a watcher (events never arrive without the `file-watcher` feature)
    #[cfg(not(feature = "file-watcher"))]
    pub fn new(registry: Arc<CompilerRegistry>) -> CompileResult<Self> {
        let include_dirs = Self::shader_include_dirs(&registry);
        Ok(Self {
            registry,
            debounce: Debounce::new(Duration::from_millis(100)),
            includes: IncludeGraph::new(),
            include_dirs,
            watch_dirs: Vec::new(),
        })
    }

    fn shader_include_dirs(registry: &CompilerRegistry) -> Vec<PathBuf> {
        let ctx = registry.context();
        AssetKey::parse(&ctx.config().shader.include_dir)
            .ok()
            .and_then(|key| ctx.protocols().resolve(&key).ok())
            .into_iter()
            .collect()
    }

    /// Watch the data directory of every registered root
    pub fn watch_all_roots(&mut self) -> CompileResult<()> {
        let dirs: Vec<PathBuf> = {
            let protocols = self.registry.context().protocols();
            protocols
                .roots()
                .filter_map(|(name, _)| protocols.data_dir(name))
                .collect()
        };
        for dir in dirs {
            self.watch(&dir)?;
        }
        Ok(())
    }

    /// Watch one directory recursively
    pub fn watch(&mut self, dir: &Path) -> CompileResult<()> {
        let path = dir.to_path_buf();
        if !path.exists() {
            fs::create_dir_all(&path)?;
        }

        #[cfg(feature = "file-watcher")]
        self.watcher
            .watch(&path, RecursiveMode::Recursive)
            .map_err(|e| CompileError::Import(format!("Failed to watch {}: {}", path.display(), e)))?;

        self.rescan_shaders_in(&path);
        log::info!("Watching directory: {}", path.display());
        self.watch_dirs.push(path);
        Ok(())
    }

    fn rescan_shaders_in(&mut self, dir: &Path) {
        let scanned = IncludeGraph::scan(&[dir.to_path_buf()], &self.include_dirs);
        self.includes.merge(scanned);
    }

    pub fn watch_dirs(&self) -> &[PathBuf] {
        &self.watch_dirs
    }

    pub fn set_debounce(&mut self, duration: Duration) {
        self.debounce.duration = duration;
    }

    pub fn includes(&self) -> &IncludeGraph {
        &self.includes
    }

    /// Drain pending file system events
    #[cfg(feature = "file-watcher")]
    pub fn poll_changes(&mut self) -> Vec<FileChange> {
        let mut changes = Vec::new();
        let now = Instant::now();

        while let Ok(result) = self.rx.try_recv() {
            let event = match result {
                Ok(event) => event,
                Err(e) => {
                    log::warn!("File watcher error: {}", e);
                    continue;
                }
            };
            let kind = match event.kind {
                EventKind::Create(_) => FileChangeKind::Created,
                EventKind::Modify(_) => FileChangeKind::Modified,
                EventKind::Remove(_) => FileChangeKind::Deleted,
                _ => continue,
            };
            for path in event.paths {
                if path.is_dir() {
                    continue;
                }
                if self.debounce.should_trigger(&path, kind, now) {
                    changes.push(FileChange { path, kind });
                }
            }
        }

        self.debounce.prune(now);
        changes
    }

    #[cfg(not(feature = "file-watcher"))]
    pub fn poll_changes(&mut self) -> Vec<FileChange> {
        Vec::new()
    }

    /// Drain events and schedule the resulting compiles
    ///
    /// Returns one future per scheduled compile.
    pub fn poll(&mut self) -> Vec<SharedFuture<bool>> {
        let changes = self.poll_changes();
        self.process(&changes)
    }

    /// Turn changes into work
    ///
    /// Compiles are scheduled on the job pool; removals and script requests
    /// happen immediately.
    pub fn process(&mut self, changes: &[FileChange]) -> Vec<SharedFuture<bool>> {
        let mut scheduled = Vec::new();
        for change in changes {
            self.track_includes(change);
            let actions = {
                let protocols = self.registry.context().protocols();
                plan_change(protocols, &self.includes, change)
            };
            for action in actions {
                match action {
                    WatchAction::Compile(key) => {
                        let registry = self.registry.clone();
                        let pool = registry.context().pipeline().pool.clone();
                        scheduled.push(pool.schedule(format!("Compiling {}", key), move || {
                            registry.compile_key(&key)
                        }));
                    }
                    other => {
                        self.apply(&other);
                    }
                }
            }
        }
        scheduled
    }

    /// Keep the include graph current for shader sources
    fn track_includes(&mut self, change: &FileChange) {
        let is_shader_file = matches!(
            change.path.extension().and_then(|e| e.to_str()),
            Some("sc") | Some("sh")
        );
        if !is_shader_file {
            return;
        }
        match change.kind {
            FileChangeKind::Deleted => self.includes.remove_source(&change.path),
            _ => match fs::read_to_string(&change.path) {
                Ok(text) => self.includes.add_source(&change.path, &text, &self.include_dirs),
                Err(e) => log::warn!("Could not scan {}: {}", change.path.display(), e),
            },
        }
    }

    /// Run one action on the calling thread
    pub fn apply(&self, action: &WatchAction) -> bool {
        let ctx = self.registry.context();
        match action {
            WatchAction::Compile(key) => self.registry.compile_key(key),
            WatchAction::RemoveArtifacts(key) => {
                let protocols = ctx.protocols();
                for path in [protocols.compiled_path_for(key), protocols.meta_path_for(key)]
                    .into_iter()
                    .flatten()
                {
                    match fs::remove_file(&path) {
                        Ok(()) => log::trace!("Removed {}", path.display()),
                        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                        Err(e) => log::warn!("Could not remove {}: {}", path.display(), e),
                    }
                }
                ctx.assets().remove_asset(key);
                log::info!("Source {} removed", key);
                true
            }
            WatchAction::RecompileScripts(root) => {
                ctx.pipeline().recompile.set_needs_recompile(root, false);
                true
            }
        }
    }
}
