//! Integration tests for void_asset_compiler

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use void_asset::prelude::*;
use void_asset::AssetMeta;
use void_asset_compiler::{AnimationClip, CompileContext, CompilerRegistry, MeshData, PbrMaterial, RecordingRunner};

const CRATE_GLTF: &str = include_str!("fixtures/crate.gltf");

struct MaterialLoader;

impl AssetLoader for MaterialLoader {
    type Asset = PbrMaterial;

    fn asset_type(&self) -> AssetType {
        AssetType::Material
    }

    fn load(&self, ctx: &LoadContext) -> LoadResult<Self::Asset> {
        ctx.read_bincode()
    }
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn setup(dir: &TempDir) -> (Arc<CompilerRegistry>, Arc<RecordingRunner>) {
    let pipeline = Arc::new(PipelineContext::new(PipelineConfig::testing(dir.path())).unwrap());
    let runner = Arc::new(RecordingRunner::new());
    let registry = Arc::new(CompilerRegistry::new(CompileContext::new(pipeline, runner.clone())));
    (registry, runner)
}

fn write_source(registry: &CompilerRegistry, key: &str, content: &[u8]) -> (AssetKey, PathBuf) {
    let key = AssetKey::parse(key).unwrap();
    let path = registry.context().protocols().resolve(&key).unwrap();
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, content).unwrap();
    (key, path)
}

#[test]
fn test_missing_artifact_compiles_on_load() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let (registry, _) = setup(&dir);
    registry.install();

    let assets = registry.context().assets();
    assets.register_loader(MaterialLoader);
    let (key, _) = write_source(
        &registry,
        "app:/data/materials/floor.mat",
        br#"{ "roughness": 0.75, "metalness": 1.0 }"#,
    );

    let handle = assets.get_asset::<PbrMaterial>(&key);
    let material = handle.wait().unwrap();
    assert_eq!(material.roughness, 0.75);
    assert_eq!(material.metalness, 1.0);
    assert!(registry.context().protocols().compiled_path_for(&key).unwrap().exists());
}

#[test]
fn test_load_fails_when_compile_fails() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let (registry, _) = setup(&dir);
    registry.install();

    let assets = registry.context().assets();
    assets.register_loader(MaterialLoader);
    let (key, _) = write_source(&registry, "app:/data/materials/broken.mat", b"{ not json");

    let handle = assets.get_asset::<PbrMaterial>(&key);
    assert!(matches!(handle.wait(), Err(LoadError::Compile(_))));
}

#[test]
fn test_gltf_model_import() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let (registry, _) = setup(&dir);
    let (key, source) = write_source(&registry, "app:/data/models/crate.gltf", CRATE_GLTF.as_bytes());
    let output = registry.context().protocols().compiled_path_for(&key).unwrap();
    let models = source.parent().unwrap();

    // First compile only creates the sidecar
    assert!(registry.compile_key(&key));
    assert!(!output.exists());
    let meta = AssetMeta::read(&registry.context().protocols().meta_path_for(&key).unwrap()).unwrap();
    assert_eq!(meta.asset_type(), Some(AssetType::Mesh));

    assert!(registry.compile_key(&key));
    let mesh: MeshData = bincode::deserialize(&fs::read(&output).unwrap()).unwrap();
    assert_eq!(mesh.vertices.len(), 3);
    assert_eq!(mesh.indices.len(), 3);
    assert_eq!(mesh.bounds.min, [0.0, 0.0, 0.0]);
    assert_eq!(mesh.bounds.max, [1.0, 1.0, 0.0]);

    let clip_path = models.join("crate_Slide.anim");
    let clip: AnimationClip = serde_json::from_str(&fs::read_to_string(&clip_path).unwrap()).unwrap();
    assert_eq!(clip.duration, 1.0);
    // "Mover" carries no mesh and no bones
    assert!(clip.channels.is_empty());

    let material_path = models.join("[0] Gold_001.mat");
    let material: PbrMaterial = serde_json::from_str(&fs::read_to_string(&material_path).unwrap()).unwrap();
    assert!(material.metalness >= 0.0 && material.metalness <= 1.0);

    // The extracted material is a source of its own
    let material_key = AssetKey::parse("app:/data/models/[0] Gold_001.mat").unwrap();
    assert!(registry.compile_key(&material_key));
    assert!(registry.context().protocols().compiled_path_for(&material_key).unwrap().exists());
}

#[test]
fn test_extracted_clip_compiles() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let (registry, _) = setup(&dir);
    let (key, _) = write_source(&registry, "app:/data/models/crate.gltf", CRATE_GLTF.as_bytes());
    assert!(registry.compile_key(&key));
    assert!(registry.compile_key(&key));

    let clip_key = AssetKey::parse("app:/data/models/crate_Slide.anim").unwrap();
    let clip_output = registry.context().protocols().compiled_path_for(&clip_key).unwrap();
    assert!(registry.compile_key(&clip_key));
    assert!(!clip_output.exists());
    assert!(registry.compile_key(&clip_key));
    assert!(clip_output.exists());
}

#[test]
fn test_shader_renderer_from_output() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let (registry, runner) = setup(&dir);
    let (key, _) = write_source(&registry, "app:/data/shaders/vs_mesh.sc", b"void main() {}");

    let compiled = registry.context().protocols().compiled_path_for(&key).unwrap();
    let gl_output = compiled.with_extension("gl");
    assert!(registry.compile(&key, &gl_output));
    assert!(gl_output.exists());

    let calls = runner.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].program, "shaderc");
    assert!(calls[0].args.windows(2).any(|w| w[0] == "--platform" && w[1] == "linux"));
    assert!(calls[0].args.windows(2).any(|w| w[0] == "--type" && w[1] == "vertex"));
}

#[test]
fn test_png_texture_selects_bc3() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let (registry, runner) = setup(&dir);
    let key = AssetKey::parse("app:/data/textures/decal.png").unwrap();
    let path = registry.context().protocols().resolve(&key).unwrap();
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    image::RgbaImage::from_pixel(2, 2, image::Rgba([255, 0, 0, 128])).save(&path).unwrap();

    assert!(registry.compile_key(&key));
    assert!(registry.compile_key(&key));

    let calls = runner.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].args.windows(2).any(|w| w[0] == "-t" && w[1] == "BC3"));
}

#[test]
fn test_compile_root_counts_failures() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let (registry, _) = setup(&dir);
    let (good, _) = write_source(&registry, "app:/data/materials/good.mat", b"{}");
    write_source(&registry, "app:/data/materials/bad.mat", b"[1, 2");
    write_source(&registry, "app:/data/prefabs/door.pfb", b"{}");
    let assets = registry.context().assets();
    assert_eq!(assets.source_keys("app", AssetType::Material).len(), 2);

    assert_eq!(registry.compile_root("app"), 1);
    assert!(registry.context().protocols().compiled_path_for(&good).unwrap().exists());
}

#[test]
fn test_recompile_is_byte_identical() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let (registry, _) = setup(&dir);
    let (key, _) = write_source(&registry, "app:/data/models/crate.gltf", CRATE_GLTF.as_bytes());
    let output = registry.context().protocols().compiled_path_for(&key).unwrap();

    assert!(registry.compile_key(&key));
    assert!(registry.compile_key(&key));
    let first = fs::read(&output).unwrap();
    assert!(registry.compile_key(&key));
    assert_eq!(fs::read(&output).unwrap(), first);
}

#[test]
fn test_copy_through_matches_source() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let (registry, _) = setup(&dir);
    let bytes = b"\x00\x01font bytes\xff";
    let (key, _) = write_source(&registry, "app:/data/fonts/mono.ttf", bytes);

    assert!(registry.compile_key(&key));
    let output = registry.context().protocols().compiled_path_for(&key).unwrap();
    assert_eq!(fs::read(output).unwrap(), bytes);
}
