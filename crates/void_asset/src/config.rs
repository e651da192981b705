//! Pipeline configuration
//!
//! # Configuration Sources (in priority order)
//!
//! 1. Environment variables: `VOID_ASSET_WORKERS`, `VOID_ASSET_TEXTUREC`,
//!    `VOID_ASSET_SHADERC`, `VOID_ASSET_SCRIPT_COMPILER`, `VOID_ASSET_RENDERER`
//! 2. Config file passed on the command line or `void_asset.toml`
//! 3. Built-in defaults
//!
//! # Example Config File
//!
//! ```toml
//! workers = 8
//! renderer = "vulkan"
//!
//! [protocols]
//! engine = "/opt/void/engine_data"
//! app = "./project"
//!
//! [tools]
//! texturec = "tools/texturec"
//! shaderc = "tools/shaderc"
//!
//! [project]
//! default_compression = "high"
//! default_max_size = "s4096"
//!
//! [import]
//! sample_interval = 0.2
//! ```

use crate::error::AssetError;
use crate::meta::{CompressionQuality, TextureSize};
use crate::protocol::ProtocolTable;
use crate::types::RendererBackend;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// External tool executables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPaths {
    /// Texture transcoder
    pub texturec: PathBuf,
    /// Shader compiler
    pub shaderc: PathBuf,
    /// Managed-code compiler for script libraries
    pub script_compiler: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            texturec: PathBuf::from("texturec"),
            shaderc: PathBuf::from("shaderc"),
            script_compiler: PathBuf::from("mcs"),
        }
    }
}

/// Shader compilation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShaderSettings {
    /// Key of the shared shader include directory
    pub include_dir: String,
    /// Value of `BGFX_CONFIG_MAX_BONES`
    pub max_bones: u32,
}

impl Default for ShaderSettings {
    fn default() -> Self {
        Self {
            include_dir: "engine:/data/shaders".to_string(),
            max_bones: 128,
        }
    }
}

/// Project-wide defaults for `ProjectDefault` importer values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectSettings {
    pub default_compression: CompressionQuality,
    pub default_max_size: TextureSize,
}

impl ProjectSettings {
    /// Compression used when an importer asks for the project default
    pub fn resolve_compression(&self, requested: CompressionQuality) -> CompressionQuality {
        match (requested, self.default_compression) {
            (CompressionQuality::ProjectDefault, CompressionQuality::ProjectDefault) => CompressionQuality::Normal,
            (CompressionQuality::ProjectDefault, project) => project,
            (explicit, _) => explicit,
        }
    }

    /// Maximum size used when an importer asks for the project default
    pub fn resolve_max_size(&self, requested: TextureSize) -> TextureSize {
        match (requested, self.default_max_size) {
            (TextureSize::ProjectDefault, TextureSize::ProjectDefault) => TextureSize::S2048,
            (TextureSize::ProjectDefault, project) => project,
            (explicit, _) => explicit,
        }
    }
}

/// Scores used to classify a material's workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowWeights {
    pub metallic_factor: i32,
    pub roughness_factor: i32,
    pub base_color_factor: i32,
    pub metallic_roughness_texture: i32,
    pub metallic_texture: i32,
    pub roughness_texture: i32,
    pub base_color_texture: i32,
    pub metallic_and_roughness_bonus: i32,

    pub specular_factor: i32,
    pub glossiness_factor: i32,
    pub diffuse_color: i32,
    pub specular_color: i32,
    pub specular_texture: i32,
    pub glossiness_texture: i32,
    pub diffuse_texture: i32,
    pub shininess: i32,
    pub reflectivity: i32,
    pub specular_diffuse_texture_bonus: i32,
    pub specular_diffuse_color_bonus: i32,

    /// Minimum score for a confident classification
    pub minimum_score: i32,
}

impl Default for WorkflowWeights {
    fn default() -> Self {
        Self {
            metallic_factor: 8,
            roughness_factor: 8,
            base_color_factor: 4,
            metallic_roughness_texture: 12,
            metallic_texture: 10,
            roughness_texture: 6,
            base_color_texture: 3,
            metallic_and_roughness_bonus: 5,

            specular_factor: 8,
            glossiness_factor: 8,
            diffuse_color: 4,
            specular_color: 6,
            specular_texture: 10,
            glossiness_texture: 10,
            diffuse_texture: 6,
            shininess: 4,
            reflectivity: 3,
            specular_diffuse_texture_bonus: 8,
            specular_diffuse_color_bonus: 6,

            minimum_score: 5,
        }
    }
}

/// Thresholds of the specular → metallic ramp
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionThresholds {
    /// Specular at or below this is a dielectric
    pub dielectric_specular: f32,
    /// Specular at or above this is a metal
    pub metal_specular: f32,
    /// Minimum channel variance for a tinted specular
    pub tint_variance: f32,
    /// Minimum average for a tinted specular
    pub tint_average: f32,
    /// Metallic floor for tinted specular
    pub tint_metallic: f32,
}

impl Default for ConversionThresholds {
    fn default() -> Self {
        Self {
            dielectric_specular: 0.04,
            metal_specular: 0.9,
            tint_variance: 0.1,
            tint_average: 0.3,
            tint_metallic: 0.8,
        }
    }
}

/// Mesh and animation import settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportSettings {
    /// Seconds between bounding volume samples
    pub sample_interval: f32,
    /// Fraction of the extents added to each animation bound
    pub bounds_inflation: f32,
    /// Fallback ticks per second when a clip reports none
    pub default_ticks_per_second: f64,
    /// Write separate metallic and roughness maps from a combined embedded texture
    pub split_metallic_roughness: bool,
    pub workflow: WorkflowWeights,
    pub conversion: ConversionThresholds,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            sample_interval: 0.2,
            bounds_inflation: 0.05,
            default_ticks_per_second: 25.0,
            split_metallic_roughness: false,
            workflow: WorkflowWeights::default(),
            conversion: ConversionThresholds::default(),
        }
    }
}

/// Complete pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Content roots: protocol name → base directory
    pub protocols: BTreeMap<String, PathBuf>,
    /// Worker threads in the job pool
    pub workers: usize,
    /// Renderer compiled shaders target
    pub renderer: RendererBackend,
    pub tools: ToolPaths,
    pub shader: ShaderSettings,
    pub project: ProjectSettings,
    pub import: ImportSettings,
    /// File the configuration was read from
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            protocols: BTreeMap::new(),
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            renderer: RendererBackend::default(),
            tools: ToolPaths::default(),
            shader: ShaderSettings::default(),
            project: ProjectSettings::default(),
            import: ImportSettings::default(),
            config_path: None,
        }
    }
}

impl PipelineConfig {
    /// Config for development (roots relative to the working directory)
    pub fn development() -> Self {
        let mut config = Self::default();
        config.protocols.insert("engine".to_string(), PathBuf::from("./engine_data"));
        config.protocols.insert("app".to_string(), PathBuf::from("./project"));
        config
    }

    /// Config for tests: a single `app` root plus an `engine` root under `root`
    pub fn testing(root: &Path) -> Self {
        let mut config = Self {
            workers: 2,
            ..Self::default()
        };
        config.protocols.insert("app".to_string(), root.join("app"));
        config.protocols.insert("engine".to_string(), root.join("engine"));
        config
    }

    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, AssetError> {
        toml::from_str(content).map_err(|e| AssetError::Config(e.to_string()))
    }

    /// Load configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, AssetError> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&content)?;
        config.config_path = Some(path.to_path_buf());
        log::info!("Loaded pipeline config from {}", path.display());
        Ok(config)
    }

    /// Load from an optional file, then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, AssetError> {
        let mut config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => {
                let fallback = Path::new("void_asset.toml");
                if fallback.exists() {
                    Self::load_from_file(fallback)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply `VOID_ASSET_*` environment overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(workers) = std::env::var("VOID_ASSET_WORKERS") {
            match workers.parse::<usize>() {
                Ok(n) if n > 0 => {
                    self.workers = n;
                    log::info!("Workers from env: {}", n);
                }
                _ => log::warn!("Ignoring invalid VOID_ASSET_WORKERS={}", workers),
            }
        }

        if let Ok(path) = std::env::var("VOID_ASSET_TEXTUREC") {
            self.tools.texturec = PathBuf::from(path);
        }

        if let Ok(path) = std::env::var("VOID_ASSET_SHADERC") {
            self.tools.shaderc = PathBuf::from(path);
        }

        if let Ok(path) = std::env::var("VOID_ASSET_SCRIPT_COMPILER") {
            self.tools.script_compiler = PathBuf::from(path);
        }

        if let Ok(renderer) = std::env::var("VOID_ASSET_RENDERER") {
            match renderer.parse() {
                Ok(r) => {
                    self.renderer = r;
                    log::info!("Renderer from env: {}", self.renderer);
                }
                Err(e) => log::warn!("{}", e),
            }
        }
    }

    /// Build the protocol table described by this config
    pub fn protocol_table(&self) -> ProtocolTable {
        let mut table = ProtocolTable::new(self.renderer);
        for (name, base) in &self.protocols {
            table.add_root(name.clone(), base.clone());
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert!(config.workers >= 1);
        assert_eq!(config.import.sample_interval, 0.2);
        assert!(!config.import.split_metallic_roughness);
        assert_eq!(config.import.workflow.metallic_roughness_texture, 12);
        assert_eq!(config.shader.include_dir, "engine:/data/shaders");
    }

    #[test]
    fn test_parse_toml() {
        let config = PipelineConfig::from_toml_str(
            r#"
            workers = 3
            renderer = "metal"

            [protocols]
            app = "/projects/game"

            [project]
            default_compression = "high"

            [import]
            split_metallic_roughness = true

            [import.workflow]
            minimum_score = 7
            "#,
        )
        .unwrap();

        assert_eq!(config.workers, 3);
        assert_eq!(config.renderer, RendererBackend::Metal);
        assert_eq!(config.protocols["app"], PathBuf::from("/projects/game"));
        assert_eq!(config.project.default_compression, CompressionQuality::High);
        assert_eq!(config.import.workflow.minimum_score, 7);
        assert!(config.import.split_metallic_roughness);
        assert_eq!(config.import.workflow.specular_texture, 10);
    }

    #[test]
    fn test_bad_toml() {
        assert!(matches!(
            PipelineConfig::from_toml_str("workers = \"many\""),
            Err(AssetError::Config(_))
        ));
    }

    #[test]
    fn test_project_defaults_resolve() {
        let project = ProjectSettings::default();
        assert_eq!(project.resolve_compression(CompressionQuality::ProjectDefault), CompressionQuality::Normal);
        assert_eq!(project.resolve_max_size(TextureSize::ProjectDefault), TextureSize::S2048);
        assert_eq!(project.resolve_compression(CompressionQuality::Low), CompressionQuality::Low);

        let project = ProjectSettings {
            default_compression: CompressionQuality::High,
            default_max_size: TextureSize::S512,
        };
        assert_eq!(project.resolve_compression(CompressionQuality::ProjectDefault), CompressionQuality::High);
        assert_eq!(project.resolve_max_size(TextureSize::ProjectDefault), TextureSize::S512);
    }

    #[test]
    fn test_protocol_table() {
        let config = PipelineConfig::testing(Path::new("/tmp/pipeline"));
        let table = config.protocol_table();
        assert_eq!(table.root_base("app"), Some(Path::new("/tmp/pipeline/app")));
        assert_eq!(table.renderer(), RendererBackend::Vulkan);
    }
}
