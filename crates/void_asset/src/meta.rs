//! Sidecar metadata
//!
//! Every source file may carry a `<source>.meta` JSON sidecar holding its
//! stable uid, type name and importer settings. Sidecars are created on
//! first compile and written through the atomic writer.

use crate::error::AssetError;
use crate::types::AssetType;
use crate::writer::atomic_write_json;
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

/// How a texture is interpreted
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextureType {
    #[default]
    Automatic,
    NormalMap,
    Equirect,
}

/// Block compression quality requested for a texture
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionQuality {
    #[default]
    ProjectDefault,
    None,
    Low,
    Normal,
    High,
}

/// Maximum texture dimension
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextureSize {
    #[default]
    ProjectDefault,
    S32,
    S64,
    S128,
    S256,
    S512,
    S1024,
    S2048,
    S4096,
    S8192,
    S16384,
}

impl TextureSize {
    /// Pixel dimension, `None` for the project default
    pub fn pixels(self) -> Option<u32> {
        match self {
            Self::ProjectDefault => None,
            Self::S32 => Some(32),
            Self::S64 => Some(64),
            Self::S128 => Some(128),
            Self::S256 => Some(256),
            Self::S512 => Some(512),
            Self::S1024 => Some(1024),
            Self::S2048 => Some(2048),
            Self::S4096 => Some(4096),
            Self::S8192 => Some(8192),
            Self::S16384 => Some(16384),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextureQuality {
    pub max_size: TextureSize,
    pub compression: CompressionQuality,
}

/// Texture importer settings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextureImporter {
    #[serde(rename = "type")]
    pub texture_type: TextureType,
    pub generate_mipmaps: bool,
    pub quality: TextureQuality,
}

impl Default for TextureImporter {
    fn default() -> Self {
        Self {
            texture_type: TextureType::Automatic,
            generate_mipmaps: true,
            quality: TextureQuality::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelImport {
    pub import_meshes: bool,
    pub weld_vertices: bool,
    pub optimize_meshes: bool,
    pub split_large_meshes: bool,
    pub find_degenerates: bool,
    pub find_invalid_data: bool,
}

impl Default for ModelImport {
    fn default() -> Self {
        Self {
            import_meshes: true,
            weld_vertices: true,
            optimize_meshes: true,
            split_large_meshes: true,
            find_degenerates: true,
            find_invalid_data: true,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RigImport {}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationsImport {
    pub import_animations: bool,
}

impl Default for AnimationsImport {
    fn default() -> Self {
        Self {
            import_animations: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterialsImport {
    pub import_materials: bool,
    pub remove_redundant_materials: bool,
}

impl Default for MaterialsImport {
    fn default() -> Self {
        Self {
            import_materials: true,
            remove_redundant_materials: true,
        }
    }
}

/// Mesh importer settings
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshImporter {
    pub model: ModelImport,
    pub rig: RigImport,
    pub animations: AnimationsImport,
    pub materials: MaterialsImport,
}

/// Root motion extraction flags
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RootMotion {
    pub keep_position_y: bool,
    pub keep_position_xz: bool,
    pub keep_rotation: bool,
    pub keep_in_place: bool,
}

impl Default for RootMotion {
    fn default() -> Self {
        Self {
            keep_position_y: true,
            keep_position_xz: false,
            keep_rotation: false,
            keep_in_place: false,
        }
    }
}

/// Animation importer settings
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationImporter {
    pub root_motion: RootMotion,
}

/// Importer settings for one asset
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImporterSettings {
    Texture(TextureImporter),
    Mesh(MeshImporter),
    Animation(AnimationImporter),
}

impl ImporterSettings {
    /// Default importer for a type, if the type has configurable import
    pub fn default_for(asset_type: AssetType) -> Option<Self> {
        match asset_type {
            AssetType::Texture => Some(Self::Texture(TextureImporter::default())),
            AssetType::Mesh => Some(Self::Mesh(MeshImporter::default())),
            AssetType::AnimationClip => Some(Self::Animation(AnimationImporter::default())),
            _ => None,
        }
    }

    pub fn as_texture(&self) -> Option<&TextureImporter> {
        match self {
            Self::Texture(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_mesh(&self) -> Option<&MeshImporter> {
        match self {
            Self::Mesh(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_animation(&self) -> Option<&AnimationImporter> {
        match self {
            Self::Animation(a) => Some(a),
            _ => None,
        }
    }
}

/// Contents of a `.meta` sidecar
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetMeta {
    pub uid: Uuid,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub importer: Option<ImporterSettings>,
}

impl AssetMeta {
    /// Fresh metadata with a new random uid
    pub fn new(asset_type: AssetType) -> Self {
        Self {
            uid: Uuid::new_v4(),
            type_name: asset_type.name().to_string(),
            importer: None,
        }
    }

    /// Attach importer settings
    pub fn with_importer(mut self, importer: ImporterSettings) -> Self {
        self.importer = Some(importer);
        self
    }

    /// Pipeline type named by the sidecar
    pub fn asset_type(&self) -> Option<AssetType> {
        AssetType::from_name(&self.type_name)
    }

    /// Read a sidecar
    pub fn read(path: &Path) -> Result<Self, AssetError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Read a sidecar if it exists
    pub fn read_optional(path: &Path) -> Result<Option<Self>, AssetError> {
        if !path.exists() {
            return Ok(None);
        }
        Self::read(path).map(Some)
    }

    /// Persist the sidecar atomically
    pub fn write(&self, path: &Path) -> Result<(), AssetError> {
        atomic_write_json(path, self)?;
        Ok(())
    }
}
