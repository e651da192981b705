//! Protocol resolver
//!
//! Maps `root:/relative` keys to physical paths. Each root owns a base
//! directory with source files under `data/` and build output under
//! `compiled/`. The table is populated once at startup and then shared
//! read-only between threads.

use crate::error::AssetError;
use crate::key::AssetKey;
use crate::types::{AssetType, RendererBackend};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

/// First path segment of source files inside a root
pub const DATA_DIR: &str = "data";
/// First path segment of compiled files inside a root
pub const COMPILED_DIR: &str = "compiled";
/// Extension appended to every compiled artifact
pub const COMPILED_EXTENSION: &str = ".asset";
/// Extension appended to source paths for sidecar metadata
pub const META_EXTENSION: &str = ".meta";

/// Table of content roots
#[derive(Clone, Debug, Default)]
pub struct ProtocolTable {
    roots: BTreeMap<String, PathBuf>,
    renderer: RendererBackend,
}

impl ProtocolTable {
    /// Create an empty table targeting the given renderer
    pub fn new(renderer: RendererBackend) -> Self {
        Self {
            roots: BTreeMap::new(),
            renderer,
        }
    }

    /// Register a root and its base directory
    pub fn add_root(&mut self, name: impl Into<String>, base: impl Into<PathBuf>) {
        let name = name.into();
        let base = base.into();
        log::debug!("Registered protocol '{}' -> {}", name, base.display());
        self.roots.insert(name, base);
    }

    /// Builder form of [`add_root`](Self::add_root)
    pub fn with_root(mut self, name: impl Into<String>, base: impl Into<PathBuf>) -> Self {
        self.add_root(name, base);
        self
    }

    /// Renderer used for compiled shader names
    pub fn renderer(&self) -> RendererBackend {
        self.renderer
    }

    /// Registered roots in name order
    pub fn roots(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.roots.iter().map(|(k, v)| (k.as_str(), v.as_path()))
    }

    /// Base directory of a root
    pub fn root_base(&self, root: &str) -> Option<&Path> {
        self.roots.get(root).map(|p| p.as_path())
    }

    /// Source directory of a root
    pub fn data_dir(&self, root: &str) -> Option<PathBuf> {
        self.root_base(root).map(|b| b.join(DATA_DIR))
    }

    /// Compiled directory of a root
    pub fn compiled_dir(&self, root: &str) -> Option<PathBuf> {
        self.root_base(root).map(|b| b.join(COMPILED_DIR))
    }

    /// Whether the key's root is registered
    pub fn has_known_protocol(&self, key: &AssetKey) -> bool {
        self.roots.contains_key(key.root())
    }

    /// Absolute path of a key
    pub fn resolve(&self, key: &AssetKey) -> Result<PathBuf, AssetError> {
        let base = self
            .roots
            .get(key.root())
            .ok_or_else(|| AssetError::UnknownProtocol(key.to_string()))?;

        let mut path = base.clone();
        for segment in key.relative().split('/').filter(|s| !s.is_empty()) {
            path.push(segment);
        }
        Ok(path)
    }

    /// Compiled key for a source key
    ///
    /// `<root>:/data/...` becomes `<root>:/compiled/...` and `.asset` is
    /// appended. Shaders also get the renderer extension.
    pub fn compiled_key_for(&self, key: &AssetKey) -> AssetKey {
        let relative = key.relative();
        let swapped = match relative.strip_prefix(DATA_DIR) {
            Some(rest) if rest.is_empty() || rest.starts_with('/') => {
                format!("{}{}", COMPILED_DIR, rest)
            }
            _ => relative.to_string(),
        };

        let mut compiled = key.with_relative(&swapped).with_suffix(COMPILED_EXTENSION);
        if AssetType::from_key(key) == Some(AssetType::Shader) {
            compiled = compiled.with_suffix(self.renderer.extension());
        }
        compiled
    }

    /// Absolute path of the compiled artifact for a source key
    pub fn compiled_path_for(&self, key: &AssetKey) -> Result<PathBuf, AssetError> {
        self.resolve(&self.compiled_key_for(key))
    }

    /// Absolute path of the sidecar metadata for a source key
    pub fn meta_path_for(&self, key: &AssetKey) -> Result<PathBuf, AssetError> {
        self.resolve(&key.with_suffix(META_EXTENSION))
    }

    /// Source key that produced a compiled key
    pub fn source_key_for_compiled(&self, key: &AssetKey) -> AssetKey {
        let relative = reduce_trailing_extensions(key.relative());
        let swapped = match relative.strip_prefix(COMPILED_DIR) {
            Some(rest) if rest.is_empty() || rest.starts_with('/') => {
                format!("{}{}", DATA_DIR, rest)
            }
            _ => relative.to_string(),
        };
        key.with_relative(&swapped)
    }

    /// Key for an absolute path under one of the registered roots
    ///
    /// The root with the longest matching base directory wins.
    pub fn key_for_path(&self, path: &Path) -> Option<AssetKey> {
        self.roots
            .iter()
            .filter_map(|(name, base)| {
                path.strip_prefix(base)
                    .ok()
                    .map(|rest| (name, base.components().count(), rest))
            })
            .max_by_key(|(_, depth, _)| *depth)
            .map(|(name, _, rest)| {
                let relative: Vec<String> = rest
                    .components()
                    .filter_map(|c| match c {
                        Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
                        _ => None,
                    })
                    .collect();
                AssetKey::from_parts(name, &relative.join("/"))
            })
    }
}

/// Strip compiled-artifact extensions (`.asset` and a renderer suffix)
pub fn reduce_trailing_extensions(relative: &str) -> &str {
    let mut current = relative;
    if let Some(dot) = current.rfind('.') {
        if RendererBackend::from_extension(&current[dot..]).is_some()
            && current[..dot].ends_with(COMPILED_EXTENSION)
        {
            current = &current[..dot];
        }
    }
    current.strip_suffix(COMPILED_EXTENSION).unwrap_or(current)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> ProtocolTable {
        ProtocolTable::new(RendererBackend::Vulkan)
            .with_root("app", "/projects/game")
            .with_root("engine", "/opt/void/engine")
    }

    fn key(s: &str) -> AssetKey {
        AssetKey::parse(s).unwrap()
    }

    #[test]
    fn test_resolve() {
        let t = table();
        assert_eq!(
            t.resolve(&key("app:/data/textures/wall.png")).unwrap(),
            PathBuf::from("/projects/game/data/textures/wall.png")
        );
    }

    #[test]
    fn test_unknown_protocol() {
        let t = table();
        let err = t.resolve(&key("mods:/data/a.png")).unwrap_err();
        assert!(matches!(err, AssetError::UnknownProtocol(_)));
        assert!(!t.has_known_protocol(&key("mods:/data/a.png")));
        assert!(t.has_known_protocol(&key("engine:/data/a.png")));
    }

    #[test]
    fn test_compiled_key() {
        let t = table();
        assert_eq!(
            t.compiled_key_for(&key("app:/data/textures/wall.png")).as_str(),
            "app:/compiled/textures/wall.png.asset"
        );
        assert_eq!(
            t.compiled_key_for(&key("engine:/data/shaders/vs_pbr.sc")).as_str(),
            "engine:/compiled/shaders/vs_pbr.sc.asset.spirv"
        );
        assert_eq!(
            t.compiled_path_for(&key("app:/data/a.mat")).unwrap(),
            PathBuf::from("/projects/game/compiled/a.mat.asset")
        );
    }

    #[test]
    fn test_meta_path_is_sibling() {
        let t = table();
        assert_eq!(
            t.meta_path_for(&key("app:/data/textures/wall.png")).unwrap(),
            PathBuf::from("/projects/game/data/textures/wall.png.meta")
        );
    }

    #[test]
    fn test_source_key_for_compiled() {
        let t = table();
        let source = key("engine:/data/shaders/fs_pbr.sc");
        let compiled = t.compiled_key_for(&source);
        assert_eq!(t.source_key_for_compiled(&compiled), source);

        let tex = key("app:/data/t/wall.png");
        assert_eq!(t.source_key_for_compiled(&t.compiled_key_for(&tex)), tex);
    }

    #[test]
    fn test_key_for_path_prefers_longest_root() {
        let t = ProtocolTable::new(RendererBackend::Vulkan)
            .with_root("app", "/projects/game")
            .with_root("plugin", "/projects/game/plugins/water");

        assert_eq!(
            t.key_for_path(Path::new("/projects/game/plugins/water/data/foam.png")).unwrap().as_str(),
            "plugin:/data/foam.png"
        );
        assert_eq!(
            t.key_for_path(Path::new("/projects/game/data/foam.png")).unwrap().as_str(),
            "app:/data/foam.png"
        );
        assert!(t.key_for_path(Path::new("/elsewhere/foam.png")).is_none());
    }
}
