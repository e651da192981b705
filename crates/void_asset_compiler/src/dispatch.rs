//! Compiler dispatch
//!
//! A table from [`AssetType`] to a compile function. Every function takes the
//! shared [`CompileContext`], the source key and the output path, reports
//! success as a `bool` and logs its own failures. Artifacts are always
//! committed through the atomic writer, so a failed compile leaves the
//! previous artifact in place.

use crate::animation::{compile_animation_clip, ClipImporter};
use crate::audio::compile_audio_clip;
use crate::error::{CompileError, CompileResult};
use crate::gltf_import::import_scene;
use crate::material::{MaterialImporter, PbrMaterial};
use crate::mesh::build_mesh_data;
use crate::physics::PhysicsMaterial;
use crate::pixels::write_embedded_textures;
use crate::process::{ProcessRunner, SystemProcessRunner};
use crate::shader::compile_shader;
use crate::texture::compile_texture;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Weak};
use void_asset::{
    atomic_copy_file, atomic_write_bincode, atomic_write_json, AssetKey, AssetManager, AssetMeta, AssetType,
    CompileHook, ImporterSettings, PipelineConfig, PipelineContext, ProtocolTable,
};

/// Everything a compile function may touch
#[derive(Clone)]
pub struct CompileContext {
    pipeline: Arc<PipelineContext>,
    runner: Arc<dyn ProcessRunner>,
}

impl CompileContext {
    pub fn new(pipeline: Arc<PipelineContext>, runner: Arc<dyn ProcessRunner>) -> Self {
        Self { pipeline, runner }
    }

    /// Context that runs tools as real processes
    pub fn with_system_runner(pipeline: Arc<PipelineContext>) -> Self {
        Self::new(pipeline, Arc::new(SystemProcessRunner))
    }

    pub fn pipeline(&self) -> &Arc<PipelineContext> {
        &self.pipeline
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.pipeline.config
    }

    pub fn protocols(&self) -> &ProtocolTable {
        &self.pipeline.protocols
    }

    pub fn assets(&self) -> &AssetManager {
        &self.pipeline.assets
    }

    pub fn runner(&self) -> &dyn ProcessRunner {
        self.runner.as_ref()
    }
}

/// Compile `key` into `output`
pub type CompileFn = fn(&CompileContext, &AssetKey, &Path) -> bool;

/// Importer settings from the sidecar of `key`
///
/// A missing sidecar, or one without importer settings, is created with the
/// type's default importer and registered in the asset database. `None` is
/// returned in that case: there is nothing to compile until the sidecar
/// exists.
pub fn read_importer(
    ctx: &CompileContext,
    key: &AssetKey,
    asset_type: AssetType,
) -> CompileResult<Option<ImporterSettings>> {
    let meta_path = ctx.protocols().meta_path_for(key)?;
    let existing = match AssetMeta::read_optional(&meta_path) {
        Ok(meta) => meta,
        Err(e) => {
            log::warn!("Ignoring unreadable metadata {}: {}", meta_path.display(), e);
            None
        }
    };

    if let Some(importer) = existing.as_ref().and_then(|meta| meta.importer.clone()) {
        return Ok(Some(importer));
    }

    let default = ImporterSettings::default_for(asset_type)
        .ok_or_else(|| CompileError::Unsupported(format!("importer settings for {}", asset_type)))?;
    let mut meta = match existing {
        Some(meta) => meta.with_importer(default),
        None => AssetMeta::new(asset_type).with_importer(default),
    };

    let source = ctx.protocols().resolve(key)?;
    meta.uid = ctx.assets().add_asset_info_for_path(&source, &meta, true)?;
    meta.write(&meta_path)?;
    log::trace!("Created importer settings for {}", key);
    Ok(None)
}

/// Log the outcome of a compile and turn it into the dispatch result
fn report(key: &AssetKey, output: &Path, result: CompileResult<()>) -> bool {
    match result {
        Ok(()) => {
            log::trace!("Successful compilation of {} -> {}", key, output.display());
            true
        }
        Err(e) => {
            log::error!("Failed compilation of {} -> {} with error: {}", key, output.display(), e);
            false
        }
    }
}

fn source_path(ctx: &CompileContext, key: &AssetKey) -> CompileResult<std::path::PathBuf> {
    Ok(ctx.protocols().resolve(key)?)
}

fn compile_texture_asset(ctx: &CompileContext, key: &AssetKey, output: &Path) -> bool {
    let result = (|| -> CompileResult<()> {
        let Some(settings) = read_importer(ctx, key, AssetType::Texture)? else {
            return Ok(());
        };
        let importer = settings.as_texture().cloned().unwrap_or_default();
        compile_texture(ctx, key, &source_path(ctx, key)?, output, &importer)
    })();
    report(key, output, result)
}

fn compile_shader_asset(ctx: &CompileContext, key: &AssetKey, output: &Path) -> bool {
    let result = source_path(ctx, key).and_then(|source| compile_shader(ctx, key, &source, output));
    report(key, output, result)
}

/// Import a model and write its mesh, clips, materials and textures
pub fn compile_mesh(ctx: &CompileContext, key: &AssetKey, output: &Path) -> CompileResult<()> {
    let Some(settings) = read_importer(ctx, key, AssetType::Mesh)? else {
        return Ok(());
    };
    let importer = settings.as_mesh().cloned().unwrap_or_default();
    let import = &ctx.config().import;

    let source = source_path(ctx, key)?;
    let file = key.file_stem().to_string();
    let dir = source
        .parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| CompileError::Import(format!("{} has no parent directory", source.display())))?;

    let scene = import_scene(&source)?;

    if importer.model.import_meshes {
        let data = build_mesh_data(&scene, import)?;
        if data.has_vertices() {
            atomic_write_bincode(output, &data)?;
        } else {
            log::warn!("{} has no vertex data", key);
        }
    }

    if importer.animations.import_animations {
        let clips = ClipImporter::new(&scene, &file, import.default_ticks_per_second);
        for (animation, clip) in scene.animations.iter().zip(clips.run()) {
            let anim_output = if animation.name.is_empty() {
                dir.join(format!("{}.anim", file))
            } else {
                dir.join(format!("{}.anim", clip.name))
            };
            atomic_write_json(&anim_output, &clip)?;
        }
    }

    if importer.materials.import_materials {
        let key_dir = key.parent();
        let imported = MaterialImporter::new(&scene, &file, key_dir.as_str(), &import.workflow, &import.conversion)
            .split_channels(import.split_metallic_roughness)
            .run();
        for material in &imported.materials {
            let mat_output = if material.name.is_empty() {
                dir.join(format!("{}.mat", file))
            } else {
                dir.join(format!("{}.mat", material.name))
            };
            atomic_write_json(&mat_output, &material.material)?;
        }
        let written = write_embedded_textures(&scene.textures, &imported.textures, &file, &dir, &import.conversion);
        log::trace!("{} wrote {} embedded textures", key, written.len());
    }

    Ok(())
}

fn compile_mesh_asset(ctx: &CompileContext, key: &AssetKey, output: &Path) -> bool {
    report(key, output, compile_mesh(ctx, key, output))
}

fn compile_animation_asset(ctx: &CompileContext, key: &AssetKey, output: &Path) -> bool {
    let result = (|| -> CompileResult<()> {
        let Some(settings) = read_importer(ctx, key, AssetType::AnimationClip)? else {
            return Ok(());
        };
        let importer = settings.as_animation().cloned().unwrap_or_default();
        compile_animation_clip(&source_path(ctx, key)?, output, &importer.root_motion)
    })();
    report(key, output, result)
}

fn compile_material_asset(ctx: &CompileContext, key: &AssetKey, output: &Path) -> bool {
    let result = (|| -> CompileResult<()> {
        let text = fs::read_to_string(source_path(ctx, key)?)?;
        let material: PbrMaterial = serde_json::from_str(&text)?;
        atomic_write_bincode(output, &material)?;
        Ok(())
    })();
    report(key, output, result)
}

fn compile_physics_material_asset(ctx: &CompileContext, key: &AssetKey, output: &Path) -> bool {
    let result = (|| -> CompileResult<()> {
        let text = fs::read_to_string(source_path(ctx, key)?)?;
        let material: PhysicsMaterial = serde_json::from_str(&text)?;
        atomic_write_bincode(output, &material.sanitized())?;
        Ok(())
    })();
    report(key, output, result)
}

fn compile_audio_asset(ctx: &CompileContext, key: &AssetKey, output: &Path) -> bool {
    let result = source_path(ctx, key).and_then(|source| compile_audio_clip(&source, output));
    report(key, output, result)
}

/// Types whose compiled form is the source bytes
fn copy_through(ctx: &CompileContext, key: &AssetKey, output: &Path) -> bool {
    let result = source_path(ctx, key).and_then(|source| Ok(atomic_copy_file(&source, output)?));
    report(key, output, result)
}

/// Table of compile functions by asset type
pub struct CompilerRegistry {
    ctx: CompileContext,
    compilers: RwLock<HashMap<AssetType, CompileFn>>,
}

impl CompilerRegistry {
    /// Registry without any compilers
    pub fn empty(ctx: CompileContext) -> Self {
        Self {
            ctx,
            compilers: RwLock::new(HashMap::new()),
        }
    }

    /// Registry with a compiler for every asset type
    pub fn new(ctx: CompileContext) -> Self {
        let registry = Self::empty(ctx);
        registry.register(AssetType::Texture, compile_texture_asset);
        registry.register(AssetType::Shader, compile_shader_asset);
        registry.register(AssetType::Mesh, compile_mesh_asset);
        registry.register(AssetType::AnimationClip, compile_animation_asset);
        registry.register(AssetType::Material, compile_material_asset);
        registry.register(AssetType::PhysicsMaterial, compile_physics_material_asset);
        registry.register(AssetType::AudioClip, compile_audio_asset);
        for ty in [AssetType::Script, AssetType::Prefab, AssetType::Scene, AssetType::Font] {
            registry.register(ty, copy_through);
        }
        registry
    }

    /// Replace the compiler of a type
    pub fn register(&self, asset_type: AssetType, compiler: CompileFn) {
        self.compilers.write().insert(asset_type, compiler);
    }

    pub fn context(&self) -> &CompileContext {
        &self.ctx
    }

    pub fn has_compiler(&self, asset_type: AssetType) -> bool {
        self.compilers.read().contains_key(&asset_type)
    }

    /// Compile `key` into `output` with the compiler of its type
    pub fn compile(&self, key: &AssetKey, output: &Path) -> bool {
        let Some(asset_type) = AssetType::from_key(key) else {
            log::error!("Asset {} has no known type", key);
            return false;
        };
        let compiler = self.compilers.read().get(&asset_type).copied();
        match compiler {
            Some(compiler) => compiler(&self.ctx, key, output),
            None => {
                log::error!("No compiler registered for {} ({})", key, asset_type);
                false
            }
        }
    }

    /// Compile `key` into its compiled cache path
    pub fn compile_key(&self, key: &AssetKey) -> bool {
        match self.ctx.protocols().compiled_path_for(key) {
            Ok(output) => self.compile(key, &output),
            Err(e) => {
                log::error!("Cannot compile {}: {}", key, e);
                false
            }
        }
    }

    /// Compile every source of every type under `root`
    ///
    /// Returns the number of failed assets.
    pub fn compile_root(&self, root: &str) -> usize {
        let assets = self.ctx.assets();
        let mut failed = 0;
        for asset_type in AssetType::ALL {
            for key in assets.source_keys(root, asset_type) {
                if !self.compile_key(&key) {
                    failed += 1;
                }
            }
        }
        log::info!("Compiled root '{}' with {} failures", root, failed);
        failed
    }

    /// Let the asset manager compile missing artifacts on demand
    pub fn install(self: &Arc<Self>) {
        let hook = RegistryHook {
            registry: Arc::downgrade(self),
        };
        self.ctx.assets().set_compile_hook(Arc::new(hook));
    }
}

impl CompileHook for CompilerRegistry {
    fn compile(&self, key: &AssetKey, output: &Path) -> bool {
        CompilerRegistry::compile(self, key, output)
    }
}

/// Hook installed into the asset manager
///
/// Holds the registry weakly; the registry owns the pipeline that owns the
/// hook.
struct RegistryHook {
    registry: Weak<CompilerRegistry>,
}

impl CompileHook for RegistryHook {
    fn compile(&self, key: &AssetKey, output: &Path) -> bool {
        match self.registry.upgrade() {
            Some(registry) => registry.compile(key, output),
            None => {
                log::warn!("Compiler registry dropped before compiling {}", key);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::RecordingRunner;
    use tempfile::TempDir;

    fn setup() -> (TempDir, CompilerRegistry, Arc<RecordingRunner>) {
        let dir = TempDir::new().unwrap();
        let pipeline = Arc::new(PipelineContext::new(PipelineConfig::testing(dir.path())).unwrap());
        let runner = Arc::new(RecordingRunner::new());
        let ctx = CompileContext::new(pipeline, runner.clone());
        (dir, CompilerRegistry::new(ctx), runner)
    }

    fn write_source(registry: &CompilerRegistry, key: &AssetKey, content: &str) -> std::path::PathBuf {
        let path = registry.context().protocols().resolve(key).unwrap();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_every_type_has_a_compiler() {
        let (_dir, registry, _) = setup();
        for ty in AssetType::ALL {
            assert!(registry.has_compiler(ty), "{} has no compiler", ty);
        }
        assert!(!CompilerRegistry::empty(registry.context().clone()).has_compiler(AssetType::Mesh));
    }

    #[test]
    fn test_first_texture_compile_creates_sidecar() {
        let (_dir, registry, runner) = setup();
        let key = AssetKey::parse("app:/data/textures/wall.png").unwrap();
        write_source(&registry, &key, "not really a png");

        assert!(registry.compile_key(&key));
        assert!(runner.calls().is_empty());

        let meta_path = registry.context().protocols().meta_path_for(&key).unwrap();
        let meta = AssetMeta::read(&meta_path).unwrap();
        assert_eq!(meta.asset_type(), Some(AssetType::Texture));
        assert!(meta.importer.as_ref().and_then(|i| i.as_texture()).is_some());
        assert_eq!(registry.context().assets().get_uuid(&key), Some(meta.uid));

        // The sidecar now exists, so the second compile runs the transcoder
        assert!(registry.compile_key(&key));
        assert_eq!(runner.calls().len(), 1);
        assert_eq!(runner.calls()[0].program, "texturec");
    }

    #[test]
    fn test_material_compiles_to_bincode() {
        let (_dir, registry, _) = setup();
        let key = AssetKey::parse("app:/data/materials/wall.mat").unwrap();
        write_source(&registry, &key, r#"{ "roughness": 0.25, "color_map": "app:/data/wall.png" }"#);

        assert!(registry.compile_key(&key));
        let output = registry.context().protocols().compiled_path_for(&key).unwrap();
        let material: PbrMaterial = bincode::deserialize(&fs::read(output).unwrap()).unwrap();
        assert_eq!(material.roughness, 0.25);
        assert_eq!(material.color_map.as_deref(), Some("app:/data/wall.png"));
    }

    #[test]
    fn test_bad_document_keeps_previous_artifact() {
        let (_dir, registry, _) = setup();
        let key = AssetKey::parse("app:/data/physics/ice.phm").unwrap();
        write_source(&registry, &key, r#"{ "friction": 0.05 }"#);
        assert!(registry.compile_key(&key));

        let output = registry.context().protocols().compiled_path_for(&key).unwrap();
        let before = fs::read(&output).unwrap();

        write_source(&registry, &key, "{ broken");
        assert!(!registry.compile_key(&key));
        assert_eq!(fs::read(&output).unwrap(), before);
    }

    #[test]
    fn test_copy_through_types() {
        let (_dir, registry, _) = setup();
        let key = AssetKey::parse("app:/data/levels/intro.spfb").unwrap();
        write_source(&registry, &key, "scene bytes");

        assert!(registry.compile_key(&key));
        let output = registry.context().protocols().compiled_path_for(&key).unwrap();
        assert_eq!(fs::read_to_string(output).unwrap(), "scene bytes");
    }

    #[test]
    fn test_missing_source_fails() {
        let (_dir, registry, _) = setup();
        let key = AssetKey::parse("app:/data/fonts/missing.ttf").unwrap();
        assert!(!registry.compile_key(&key));
    }

    #[test]
    fn test_unknown_type_and_protocol() {
        let (_dir, registry, _) = setup();
        let unknown_type = AssetKey::parse("app:/data/readme.txt").unwrap();
        assert!(!registry.compile_key(&unknown_type));
        let unknown_root = AssetKey::parse("nowhere:/data/a.mat").unwrap();
        assert!(!registry.compile_key(&unknown_root));
    }

    #[test]
    fn test_registered_compiler_replaces_default() {
        fn always_fails(_: &CompileContext, _: &AssetKey, _: &Path) -> bool {
            false
        }
        let (_dir, registry, _) = setup();
        let key = AssetKey::parse("app:/data/levels/intro.spfb").unwrap();
        write_source(&registry, &key, "scene bytes");

        registry.register(AssetType::Scene, always_fails);
        assert!(!registry.compile_key(&key));
    }
}
