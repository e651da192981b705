//! # void_asset_compiler - Source to Runtime Asset Compilers
//!
//! Turns author-facing sources into the compiled cache:
//! - A registry of per-type compile functions ([`CompilerRegistry`])
//! - Texture block format selection and `texturec` arguments
//! - `shaderc` arguments, renderer profiles and include tracking
//! - glTF import with material workflow detection and conversion
//! - Mesh flattening, animation clips and animated bounding volumes
//! - Audio clips, script libraries and a source watcher
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use void_asset::{AssetKey, PipelineConfig, PipelineContext};
//! use void_asset_compiler::{CompileContext, CompilerRegistry};
//!
//! let pipeline = Arc::new(PipelineContext::new(PipelineConfig::load(None)?)?);
//! let registry = Arc::new(CompilerRegistry::new(CompileContext::with_system_runner(pipeline)));
//!
//! // Missing artifacts are now compiled when a handle is requested
//! registry.install();
//!
//! let key = AssetKey::parse("app:/data/textures/wall.png")?;
//! assert!(registry.compile_key(&key));
//! ```

pub mod animation;
pub mod audio;
pub mod dispatch;
pub mod error;
pub mod gltf_import;
pub mod material;
pub mod mesh;
pub mod physics;
pub mod pixels;
pub mod process;
pub mod scene;
pub mod script;
pub mod shader;
pub mod texture;
pub mod watcher;

pub use animation::{AnimationClip, ClipImporter, RootMotionParams};
pub use audio::SoundData;
pub use dispatch::{read_importer, CompileContext, CompileFn, CompilerRegistry};
pub use error::{CompileError, CompileResult};
pub use gltf_import::import_scene;
pub use material::{
    convert_specular_gloss_to_metallic_roughness, detect_workflow, resolve_pbr_parameters, select_texture_source,
    MaterialImporter, MaterialProperties, PbrMaterial, Workflow, WorkflowDetection,
};
pub use mesh::{build_mesh_data, Bounds, MeshData, MeshVertex};
pub use physics::PhysicsMaterial;
pub use pixels::PixelTransform;
pub use process::{ProcessOutput, ProcessRunner, RecordingRunner, SystemProcessRunner};
pub use scene::ImportScene;
pub use script::{compile_script_library, script_library_key, ScriptDiagnostic};
pub use shader::{shaderc_args, IncludeGraph, ShaderStage};
pub use texture::{select_format, SourceFormat, TextureFormat};
pub use watcher::{FileChange, FileChangeKind, SourceWatcher, WatchAction};
