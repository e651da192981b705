//! Asset type registry and renderer backends

use crate::key::AssetKey;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Kind of asset handled by the pipeline
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AssetType {
    Texture,
    Mesh,
    AudioClip,
    Shader,
    Material,
    AnimationClip,
    Prefab,
    Scene,
    PhysicsMaterial,
    Script,
    Font,
}

impl AssetType {
    /// Every asset type, in registry order
    pub const ALL: [AssetType; 11] = [
        AssetType::Texture,
        AssetType::Mesh,
        AssetType::AudioClip,
        AssetType::Shader,
        AssetType::Material,
        AssetType::AnimationClip,
        AssetType::Prefab,
        AssetType::Scene,
        AssetType::PhysicsMaterial,
        AssetType::Script,
        AssetType::Font,
    ];

    /// Human readable type name
    pub fn name(self) -> &'static str {
        match self {
            Self::Texture => "Texture",
            Self::Mesh => "Mesh",
            Self::AudioClip => "Audio Clip",
            Self::Shader => "Shader",
            Self::Material => "Material",
            Self::AnimationClip => "Animation Clip",
            Self::Prefab => "Prefab",
            Self::Scene => "Scene",
            Self::PhysicsMaterial => "Physics Material",
            Self::Script => "Script",
            Self::Font => "Font",
        }
    }

    /// Source extensions, lowercase with a leading dot
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            Self::Texture => &[
                ".etex", ".png", ".jpg", ".jpeg", ".tga", ".dds", ".ktx", ".pvr", ".exr", ".hdr",
                ".bmp", ".gif", ".psd",
            ],
            Self::Mesh => &[".emesh", ".gltf", ".glb", ".obj", ".fbx", ".dae", ".blend", ".3ds"],
            Self::AudioClip => &[".eaudioclip", ".ogg", ".wav", ".flac", ".mp3"],
            Self::Shader => &[".sc"],
            Self::Material => &[".mat", ".ematerial"],
            Self::AnimationClip => &[".anim"],
            Self::Prefab => &[".pfb"],
            Self::Scene => &[".spfb"],
            Self::PhysicsMaterial => &[".phm", ".ephmaterial"],
            Self::Script => &[".cs"],
            Self::Font => &[".ttf", ".otf"],
        }
    }

    /// Extensions of files that are dependencies rather than assets
    pub fn dependency_extensions(self) -> &'static [&'static str] {
        match self {
            Self::Shader => &[".sh"],
            _ => &[],
        }
    }

    /// Types whose source bytes are already in runtime form
    pub fn is_source_servable(self) -> bool {
        matches!(self, Self::Script | Self::Font | Self::Prefab | Self::Scene)
    }

    /// Look up a type by extension (with or without the dot, any case)
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.to_lowercase();
        let ext = if ext.starts_with('.') { ext } else { format!(".{}", ext) };
        Self::ALL
            .iter()
            .copied()
            .find(|ty| ty.extensions().contains(&ext.as_str()))
    }

    /// Look up a type from a file path
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    /// Look up a type from a key
    pub fn from_key(key: &AssetKey) -> Option<Self> {
        key.extension().and_then(Self::from_extension)
    }

    /// Look up a type by its display name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|ty| ty.name() == name)
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// True when the path has a dependency extension of any type
pub fn is_dependency_path(path: &Path) -> bool {
    let ext = match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!(".{}", ext.to_lowercase()),
        None => return false,
    };
    AssetType::ALL
        .iter()
        .any(|ty| ty.dependency_extensions().contains(&ext.as_str()))
}

/// Renderer backend that compiled shaders target
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RendererBackend {
    Vulkan,
    Direct3D11,
    Direct3D12,
    OpenGL,
    OpenGLES,
    Metal,
}

impl RendererBackend {
    pub const ALL: [RendererBackend; 6] = [
        RendererBackend::Vulkan,
        RendererBackend::Direct3D11,
        RendererBackend::Direct3D12,
        RendererBackend::OpenGL,
        RendererBackend::OpenGLES,
        RendererBackend::Metal,
    ];

    /// Extension appended to compiled shader artifacts
    pub fn extension(self) -> &'static str {
        match self {
            Self::Vulkan => ".spirv",
            Self::Direct3D11 => ".dx11",
            Self::Direct3D12 => ".dx12",
            Self::OpenGL => ".gl",
            Self::OpenGLES => ".essl",
            Self::Metal => ".metal",
        }
    }

    /// Backend from a compiled artifact extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = if ext.starts_with('.') { ext.to_string() } else { format!(".{}", ext) };
        Self::ALL.iter().copied().find(|r| r.extension() == ext)
    }
}

impl Default for RendererBackend {
    fn default() -> Self {
        Self::Vulkan
    }
}

impl FromStr for RendererBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "vulkan" | "spirv" => Ok(Self::Vulkan),
            "direct3d11" | "dx11" | "d3d11" => Ok(Self::Direct3D11),
            "direct3d12" | "dx12" | "d3d12" => Ok(Self::Direct3D12),
            "opengl" | "gl" => Ok(Self::OpenGL),
            "opengles" | "gles" | "essl" => Ok(Self::OpenGLES),
            "metal" => Ok(Self::Metal),
            other => Err(format!("Unknown renderer backend: {}", other)),
        }
    }
}

impl fmt::Display for RendererBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Vulkan => "vulkan",
            Self::Direct3D11 => "direct3d11",
            Self::Direct3D12 => "direct3d12",
            Self::OpenGL => "opengl",
            Self::OpenGLES => "opengles",
            Self::Metal => "metal",
        };
        f.write_str(name)
    }
}
