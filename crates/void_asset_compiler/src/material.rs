//! Material workflow detection and conversion
//!
//! Source materials come in two flavours: metallic/roughness and the older
//! specular/glossiness model. Detection scores the properties a material
//! carries; conversion maps specular/glossiness values (and textures) onto
//! metallic/roughness so the runtime only ever sees one model.

use crate::scene::ImportScene;
use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use void_asset::{ConversionThresholds, WorkflowWeights};

/// Default dielectric reflectance
pub const DIELECTRIC_SPECULAR: f32 = 0.04;

/// Texture slot of a source material
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureSlot {
    BaseColor,
    MetallicRoughness,
    Metallic,
    Roughness,
    Diffuse,
    Specular,
    Glossiness,
    Normal,
    Occlusion,
    Emissive,
}

/// Where a material's texture lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextureRef {
    /// Index into the scene's embedded textures
    Embedded(usize),
    /// Path relative to the source file
    External(String),
}

/// Alpha handling of a material
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlphaMode {
    #[default]
    Opaque,
    Mask,
    Blend,
}

/// Properties present on a source material
///
/// `None` means the source did not define the property.
#[derive(Debug, Clone, Default)]
pub struct MaterialProperties {
    pub name: Option<String>,

    pub base_color: Option<Vec3>,
    pub metallic: Option<f32>,
    pub roughness: Option<f32>,

    pub diffuse_color: Option<Vec3>,
    pub specular_color: Option<Vec3>,
    pub specular_factor: Option<f32>,
    pub glossiness: Option<f32>,

    pub shininess: Option<f32>,
    pub reflectivity: Option<f32>,

    pub opacity: Option<f32>,
    pub emissive_color: Option<Vec3>,
    pub normal_scale: Option<f32>,
    pub alpha_mode: AlphaMode,
    pub alpha_cutoff: Option<f32>,
    pub double_sided: bool,

    pub textures: HashMap<TextureSlot, TextureRef>,
}

impl MaterialProperties {
    pub fn has_texture(&self, slot: TextureSlot) -> bool {
        self.textures.contains_key(&slot)
    }

    pub fn texture(&self, slot: TextureSlot) -> Option<&TextureRef> {
        self.textures.get(&slot)
    }

    /// Builder-style texture assignment
    pub fn with_texture(mut self, slot: TextureSlot, texture: TextureRef) -> Self {
        self.textures.insert(slot, texture);
        self
    }
}

/// Shading model a material was authored for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Workflow {
    MetallicRoughness,
    SpecularGlossiness,
    Unknown,
}

impl fmt::Display for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::MetallicRoughness => "Metallic/Roughness",
            Self::SpecularGlossiness => "Specular/Gloss",
            Self::Unknown => "Unknown",
        })
    }
}

/// Result of workflow detection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkflowDetection {
    pub workflow: Workflow,
    pub metallic_roughness_score: i32,
    pub specular_glossiness_score: i32,
}

/// Score a material for both workflows and pick one
pub fn detect_workflow(props: &MaterialProperties, weights: &WorkflowWeights) -> WorkflowDetection {
    use TextureSlot::*;

    let score = |present: bool, weight: i32| if present { weight } else { 0 };

    let mut mr = score(props.metallic.is_some(), weights.metallic_factor)
        + score(props.roughness.is_some(), weights.roughness_factor)
        + score(props.base_color.is_some(), weights.base_color_factor)
        + score(props.has_texture(MetallicRoughness), weights.metallic_roughness_texture)
        + score(props.has_texture(Metallic), weights.metallic_texture)
        + score(props.has_texture(Roughness), weights.roughness_texture)
        + score(props.has_texture(BaseColor), weights.base_color_texture);

    let mut sg = score(props.specular_factor.is_some(), weights.specular_factor)
        + score(props.glossiness.is_some(), weights.glossiness_factor)
        + score(props.diffuse_color.is_some(), weights.diffuse_color)
        + score(props.specular_color.is_some(), weights.specular_color)
        + score(props.has_texture(Specular), weights.specular_texture)
        + score(props.has_texture(Glossiness), weights.glossiness_texture)
        + score(props.has_texture(Diffuse), weights.diffuse_texture)
        + score(props.shininess.is_some(), weights.shininess)
        + score(props.reflectivity.is_some(), weights.reflectivity);

    if props.metallic.is_some() && props.roughness.is_some() {
        mr += weights.metallic_and_roughness_bonus;
    }
    if props.has_texture(Specular) && props.has_texture(Diffuse) {
        sg += weights.specular_diffuse_texture_bonus;
    }
    if props.specular_color.is_some() && props.diffuse_color.is_some() {
        sg += weights.specular_diffuse_color_bonus;
    }

    log::trace!(
        "Material workflow detection scores - Metallic/Roughness: {}, Specular/Gloss: {}",
        mr,
        sg
    );

    let workflow = if mr > sg && mr >= weights.minimum_score {
        Workflow::MetallicRoughness
    } else if sg >= weights.minimum_score {
        Workflow::SpecularGlossiness
    } else {
        Workflow::Unknown
    };

    WorkflowDetection {
        workflow,
        metallic_roughness_score: mr,
        specular_glossiness_score: sg,
    }
}

/// Metallic value for a specular intensity
///
/// Zero at or below the dielectric threshold, one at or above the metal
/// threshold, linear in between.
pub fn specular_to_metallic(max_specular: f32, thresholds: &ConversionThresholds) -> f32 {
    let low = thresholds.dielectric_specular;
    let high = thresholds.metal_specular;
    if max_specular <= low {
        0.0
    } else if max_specular >= high {
        1.0
    } else {
        ((max_specular - low) / (high - low)).clamp(0.0, 1.0)
    }
}

/// Colored specular with enough energy reads as metal
pub fn is_tinted_specular(specular: Vec3, thresholds: &ConversionThresholds) -> bool {
    let average = (specular.x + specular.y + specular.z) / 3.0;
    let deviation = (specular - Vec3::splat(average)).abs();
    let variance = deviation.x + deviation.y + deviation.z;
    variance > thresholds.tint_variance && average > thresholds.tint_average
}

/// Metallic for a specular color, including the tint boost
pub fn metallic_from_specular_color(specular: Vec3, thresholds: &ConversionThresholds) -> f32 {
    let max_specular = specular.max_element();
    let metallic = specular_to_metallic(max_specular, thresholds);
    let in_ramp = max_specular > thresholds.dielectric_specular && max_specular < thresholds.metal_specular;
    if in_ramp && is_tinted_specular(specular, thresholds) {
        metallic.max(thresholds.tint_metallic)
    } else {
        metallic
    }
}

/// Specular/glossiness → (base color, metallic, roughness)
pub fn convert_specular_gloss_to_metallic_roughness(
    diffuse: Vec3,
    specular: Vec3,
    glossiness: f32,
    thresholds: &ConversionThresholds,
) -> (Vec3, f32, f32) {
    let max_specular = specular.max_element();
    let metallic = metallic_from_specular_color(specular, thresholds);

    let base_color = if metallic > 0.5 {
        specular + diffuse * (1.0 - max_specular) * (1.0 - metallic)
    } else {
        diffuse
    };

    let roughness = 1.0 - glossiness;
    (
        base_color.clamp(Vec3::ZERO, Vec3::ONE),
        metallic.clamp(0.0, 1.0),
        roughness.clamp(0.0, 1.0),
    )
}

/// Phong shininess exponent → glossiness
pub fn glossiness_from_shininess(shininess: f32) -> f32 {
    ((shininess + 2.0) / 1024.0).sqrt().clamp(0.0, 1.0)
}

/// Resolved metallic/roughness parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PbrParameters {
    pub base_color: Vec3,
    pub metallic: f32,
    pub roughness: f32,
}

/// Fill in base color, metallic and roughness where the source lacks them
pub fn resolve_pbr_parameters(
    props: &MaterialProperties,
    workflow: Workflow,
    thresholds: &ConversionThresholds,
) -> PbrParameters {
    let specular_glossiness = workflow == Workflow::SpecularGlossiness;
    let specular = props
        .specular_color
        .unwrap_or(Vec3::splat(DIELECTRIC_SPECULAR))
        * props.specular_factor.unwrap_or(1.0);
    let glossiness = props
        .glossiness
        .or_else(|| props.shininess.map(glossiness_from_shininess))
        .unwrap_or(0.5);

    let base_color = match props.base_color {
        Some(color) => color,
        None => {
            let diffuse = props.diffuse_color.unwrap_or(Vec3::ONE);
            if specular_glossiness {
                let (color, _, _) =
                    convert_specular_gloss_to_metallic_roughness(diffuse, specular, glossiness, thresholds);
                log::trace!("Converted base color from specular/diffuse workflow");
                color
            } else {
                diffuse
            }
        }
    };

    let metallic = match props.metallic {
        Some(metallic) => metallic,
        None if specular_glossiness => {
            let diffuse = props.diffuse_color.unwrap_or(base_color);
            let (_, metallic, _) =
                convert_specular_gloss_to_metallic_roughness(diffuse, specular, glossiness, thresholds);
            log::trace!("Converted metallic factor from specular workflow: {:.3}", metallic);
            metallic
        }
        None => props.reflectivity.unwrap_or(0.0),
    };

    let roughness = match props.roughness {
        Some(roughness) => roughness,
        None if specular_glossiness => match (props.glossiness, props.shininess) {
            (Some(glossiness), _) => 1.0 - glossiness,
            (None, Some(shininess)) => 1.0 - glossiness_from_shininess(shininess),
            (None, None) => {
                let diffuse = props.diffuse_color.unwrap_or(base_color);
                let (_, _, roughness) =
                    convert_specular_gloss_to_metallic_roughness(diffuse, specular, glossiness, thresholds);
                roughness
            }
        },
        None => props
            .shininess
            .map(|s| (2.0 / (s + 2.0)).sqrt())
            .unwrap_or(0.5),
    };

    PbrParameters {
        base_color: base_color.clamp(Vec3::ZERO, Vec3::ONE),
        metallic: metallic.clamp(0.0, 1.0),
        roughness: roughness.clamp(0.0, 1.0),
    }
}

/// Runtime texture a source texture is converted into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureSemantic {
    BaseColor,
    MetallicRoughness,
    Metallic,
    Roughness,
    SpecularToMetallic,
    GlossToRoughness,
    SpecularToRoughness,
    SpecularToMetallicRoughness,
    /// Metallic channel split out of a combined texture
    ExtractMetallic,
    /// Roughness channel split out of a combined texture
    ExtractRoughness,
    Normals,
    Occlusion,
    Emissive,
}

impl TextureSemantic {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BaseColor => "BaseColor",
            Self::MetallicRoughness => "MetallicRoughness",
            Self::Metallic => "Metallic",
            Self::Roughness => "Roughness",
            Self::SpecularToMetallic => "SpecularToMetallic",
            Self::GlossToRoughness => "GlossToRoughness",
            Self::SpecularToRoughness => "SpecularToRoughness",
            Self::SpecularToMetallicRoughness => "SpecularToMetallicRoughness",
            Self::ExtractMetallic => "ExtractMetallic",
            Self::ExtractRoughness => "ExtractRoughness",
            Self::Normals => "Normals",
            Self::Occlusion => "Occlusion",
            Self::Emissive => "Emissive",
        }
    }
}

impl fmt::Display for TextureSemantic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runtime slot being filled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureTarget {
    BaseColor,
    Metallic,
    Roughness,
}

/// Source texture chosen for a runtime slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureSource {
    pub slot: TextureSlot,
    pub semantic: TextureSemantic,
    pub inverse: bool,
}

impl TextureSource {
    fn direct(slot: TextureSlot, semantic: TextureSemantic) -> Self {
        Self {
            slot,
            semantic,
            inverse: false,
        }
    }
}

/// Pick the source texture for `target`, converting across workflows
///
/// With `combined` set, specular conversions are left to a single
/// [`TextureSemantic::SpecularToMetallicRoughness`] pass.
pub fn select_texture_source(
    props: &MaterialProperties,
    workflow: Workflow,
    target: TextureTarget,
    combined: bool,
) -> Option<TextureSource> {
    use TextureSlot as Slot;

    let convert = workflow == Workflow::SpecularGlossiness && !combined;
    let pick = |slot: Slot, semantic: TextureSemantic| {
        props
            .has_texture(slot)
            .then(|| TextureSource::direct(slot, semantic))
    };

    match target {
        TextureTarget::BaseColor => pick(Slot::BaseColor, TextureSemantic::BaseColor)
            .or_else(|| pick(Slot::Diffuse, TextureSemantic::BaseColor)),
        TextureTarget::Metallic => pick(Slot::MetallicRoughness, TextureSemantic::MetallicRoughness)
            .or_else(|| pick(Slot::Metallic, TextureSemantic::Metallic))
            .or_else(|| {
                convert
                    .then(|| pick(Slot::Specular, TextureSemantic::SpecularToMetallic))
                    .flatten()
            }),
        TextureTarget::Roughness => pick(Slot::MetallicRoughness, TextureSemantic::MetallicRoughness)
            .or_else(|| pick(Slot::Roughness, TextureSemantic::Roughness))
            .or_else(|| {
                if !convert {
                    return None;
                }
                pick(Slot::Glossiness, TextureSemantic::GlossToRoughness)
                    .or_else(|| pick(Slot::Specular, TextureSemantic::SpecularToRoughness))
                    .map(|source| TextureSource {
                        inverse: true,
                        ..source
                    })
            }),
    }
}

/// A lone specular texture would feed both metallic and roughness
pub fn detect_duplicate_specular_usage(props: &MaterialProperties, workflow: Workflow) -> bool {
    use TextureSlot::*;

    if workflow != Workflow::SpecularGlossiness {
        return false;
    }
    let dedicated = [Metallic, Roughness, MetallicRoughness, Glossiness]
        .iter()
        .any(|slot| props.has_texture(*slot));
    let duplicate = !dedicated && props.has_texture(Specular);
    if duplicate {
        log::trace!("Detected duplicate specular usage, converting to combined metallic/roughness");
    }
    duplicate
}

/// Runtime material document
///
/// Written as JSON beside an imported model and compiled to bincode.
/// Texture fields hold asset keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PbrMaterial {
    pub base_color: [f32; 4],
    pub emissive_color: [f32; 3],
    pub metalness: f32,
    pub roughness: f32,
    pub bumpiness: f32,
    pub alpha_mode: AlphaMode,
    pub alpha_cutoff: f32,
    pub double_sided: bool,
    pub color_map: Option<String>,
    pub normal_map: Option<String>,
    pub metalness_map: Option<String>,
    pub roughness_map: Option<String>,
    pub ao_map: Option<String>,
    pub emissive_map: Option<String>,
}

impl Default for PbrMaterial {
    fn default() -> Self {
        Self {
            base_color: [1.0, 1.0, 1.0, 1.0],
            emissive_color: [0.0, 0.0, 0.0],
            metalness: 0.0,
            roughness: 0.5,
            bumpiness: 1.0,
            alpha_mode: AlphaMode::Opaque,
            alpha_cutoff: 0.5,
            double_sided: false,
            color_map: None,
            normal_map: None,
            metalness_map: None,
            roughness_map: None,
            ao_map: None,
            emissive_map: None,
        }
    }
}

/// Texture referenced by an imported material
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedTexture {
    /// File name relative to the source's directory
    pub name: String,
    pub semantic: TextureSemantic,
    pub inverse: bool,
    pub embedded_index: Option<usize>,
}

/// Material ready to be written beside the source
#[derive(Debug, Clone)]
pub struct ImportedMaterial {
    pub name: String,
    pub workflow: Workflow,
    pub material: PbrMaterial,
}

/// Materials and the textures they need
#[derive(Debug, Clone, Default)]
pub struct MaterialImport {
    pub materials: Vec<ImportedMaterial>,
    pub textures: Vec<ImportedTexture>,
}

/// `[index] <semantic> <file>.png`
pub fn embedded_texture_name(index: usize, semantic: &str, file: &str) -> String {
    format!("[{}] {} {}.png", index, semantic, file)
}

/// Builds runtime materials for every material of a scene
///
/// `key_dir` is the key of the source's directory; texture fields of the
/// produced materials are keys under it.
pub struct MaterialImporter<'a> {
    scene: &'a ImportScene,
    file: &'a str,
    key_dir: &'a str,
    weights: &'a WorkflowWeights,
    thresholds: &'a ConversionThresholds,
    split_channels: bool,
    textures: Vec<ImportedTexture>,
}

impl<'a> MaterialImporter<'a> {
    pub fn new(
        scene: &'a ImportScene,
        file: &'a str,
        key_dir: &'a str,
        weights: &'a WorkflowWeights,
        thresholds: &'a ConversionThresholds,
    ) -> Self {
        Self {
            scene,
            file,
            key_dir,
            weights,
            thresholds,
            split_channels: false,
            textures: Vec::new(),
        }
    }

    /// Give embedded combined metallic/roughness textures one grayscale map per channel
    pub fn split_channels(mut self, split: bool) -> Self {
        self.split_channels = split;
        self
    }

    /// Import all materials
    pub fn run(mut self) -> MaterialImport {
        let materials = self
            .scene
            .materials
            .iter()
            .enumerate()
            .map(|(i, props)| {
                let raw = props
                    .name
                    .clone()
                    .filter(|n| !n.is_empty())
                    .unwrap_or_else(|| format!("Material {}", self.file));
                let name = format!("[{}] {}", i, raw).replace('.', "_");
                let (workflow, material) = self.import_material(props);
                ImportedMaterial {
                    name,
                    workflow,
                    material,
                }
            })
            .collect();

        MaterialImport {
            materials,
            textures: self.textures,
        }
    }

    fn import_material(&mut self, props: &MaterialProperties) -> (Workflow, PbrMaterial) {
        let detection = detect_workflow(props, self.weights);
        let workflow = detection.workflow;
        log::trace!("Material workflow detected: {}", workflow);

        let params = resolve_pbr_parameters(props, workflow, self.thresholds);
        let mut material = PbrMaterial {
            base_color: params.base_color.extend(props.opacity.unwrap_or(1.0)).to_array(),
            metalness: params.metallic,
            roughness: params.roughness,
            alpha_mode: props.alpha_mode,
            alpha_cutoff: props.alpha_cutoff.unwrap_or(0.5),
            double_sided: props.double_sided,
            bumpiness: props.normal_scale.unwrap_or(1.0),
            emissive_color: props
                .emissive_color
                .map(|c| c.clamp(Vec3::ZERO, Vec3::ONE).to_array())
                .unwrap_or([0.0; 3]),
            ..Default::default()
        };

        if let Some(source) = select_texture_source(props, workflow, TextureTarget::BaseColor, false) {
            material.color_map = self.reference(props, source);
        }

        if detect_duplicate_specular_usage(props, workflow) {
            let source = TextureSource::direct(TextureSlot::Specular, TextureSemantic::SpecularToMetallicRoughness);
            let key = self.reference(props, source);
            material.metalness_map = key.clone();
            material.roughness_map = key;
        } else {
            if let Some(source) = select_texture_source(props, workflow, TextureTarget::Metallic, false) {
                let source = self.split_source(props, source, TextureSemantic::ExtractMetallic);
                material.metalness_map = self.reference(props, source);
            }
            if let Some(source) = select_texture_source(props, workflow, TextureTarget::Roughness, false) {
                let source = self.split_source(props, source, TextureSemantic::ExtractRoughness);
                material.roughness_map = self.reference(props, source);
            }
        }

        let plain = [
            (TextureSlot::Normal, TextureSemantic::Normals),
            (TextureSlot::Occlusion, TextureSemantic::Occlusion),
            (TextureSlot::Emissive, TextureSemantic::Emissive),
        ];
        for (slot, semantic) in plain {
            if !props.has_texture(slot) {
                continue;
            }
            let key = self.reference(props, TextureSource::direct(slot, semantic));
            match slot {
                TextureSlot::Normal => material.normal_map = key,
                TextureSlot::Occlusion => material.ao_map = key,
                _ => material.emissive_map = key,
            }
        }

        (workflow, material)
    }

    fn split_source(
        &self,
        props: &MaterialProperties,
        source: TextureSource,
        channel: TextureSemantic,
    ) -> TextureSource {
        let embedded = matches!(props.texture(source.slot), Some(TextureRef::Embedded(_)));
        if self.split_channels && embedded && source.semantic == TextureSemantic::MetallicRoughness {
            TextureSource {
                semantic: channel,
                ..source
            }
        } else {
            source
        }
    }

    /// Register a texture use and return its key
    ///
    /// Uses of an embedded texture with the same semantic and inversion share
    /// one file. A different conversion of the same image gets its own file.
    fn reference(&mut self, props: &MaterialProperties, source: TextureSource) -> Option<String> {
        let name = match props.texture(source.slot)? {
            TextureRef::Embedded(index) => {
                let index = *index;
                let existing = self.textures.iter().find(|t| {
                    t.embedded_index == Some(index) && t.semantic == source.semantic && t.inverse == source.inverse
                });
                if let Some(existing) = existing {
                    return Some(self.key_for(&existing.name));
                }
                let name = embedded_texture_name(index, source.semantic.as_str(), self.file);
                self.textures.push(ImportedTexture {
                    name: name.clone(),
                    semantic: source.semantic,
                    inverse: source.inverse,
                    embedded_index: Some(index),
                });
                name
            }
            TextureRef::External(path) => {
                let name = sanitize_external_name(path);
                self.textures.push(ImportedTexture {
                    name: name.clone(),
                    semantic: source.semantic,
                    inverse: source.inverse,
                    embedded_index: None,
                });
                name
            }
        };
        Some(self.key_for(&name))
    }

    fn key_for(&self, name: &str) -> String {
        format!("{}/{}", self.key_dir.trim_end_matches('/'), name)
    }
}

/// External texture path with dots in the stem replaced
fn sanitize_external_name(path: &str) -> String {
    let path = path.replace('\\', "/");
    let (dir, file) = match path.rfind('/') {
        Some(i) => (&path[..=i], &path[i + 1..]),
        None => ("", path.as_str()),
    };
    let (stem, ext) = match file.rfind('.') {
        Some(i) if i > 0 => (&file[..i], &file[i..]),
        _ => (file, ""),
    };
    format!("{}{}{}", dir, stem.replace('.', "_"), ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weights() -> WorkflowWeights {
        WorkflowWeights::default()
    }

    fn thresholds() -> ConversionThresholds {
        ConversionThresholds::default()
    }

    fn spec_gloss() -> MaterialProperties {
        MaterialProperties {
            diffuse_color: Some(Vec3::new(0.8, 0.2, 0.2)),
            specular_color: Some(Vec3::splat(0.04)),
            glossiness: Some(0.7),
            ..Default::default()
        }
    }

    #[test]
    fn test_detect_metallic_roughness() {
        let props = MaterialProperties {
            metallic: Some(1.0),
            roughness: Some(0.3),
            ..Default::default()
        }
        .with_texture(TextureSlot::MetallicRoughness, TextureRef::Embedded(0));

        let detection = detect_workflow(&props, &weights());
        assert_eq!(detection.workflow, Workflow::MetallicRoughness);
        assert_eq!(detection.metallic_roughness_score, 8 + 8 + 12 + 5);
        assert_eq!(detection.specular_glossiness_score, 0);
    }

    #[test]
    fn test_detect_specular_gloss() {
        let detection = detect_workflow(&spec_gloss(), &weights());
        assert_eq!(detection.workflow, Workflow::SpecularGlossiness);
        assert_eq!(detection.specular_glossiness_score, 4 + 6 + 8 + 6);
    }

    #[test]
    fn test_detect_ties_and_weak_scores() {
        let empty = MaterialProperties::default();
        assert_eq!(detect_workflow(&empty, &weights()).workflow, Workflow::Unknown);

        let reflective = MaterialProperties {
            reflectivity: Some(0.2),
            ..Default::default()
        };
        assert_eq!(detect_workflow(&reflective, &weights()).workflow, Workflow::Unknown);

        // Equal scores fall to specular/gloss
        let tie = MaterialProperties {
            metallic: Some(0.0),
            specular_factor: Some(1.0),
            ..Default::default()
        };
        assert_eq!(detect_workflow(&tie, &weights()).workflow, Workflow::SpecularGlossiness);
    }

    #[test]
    fn test_custom_weights() {
        let mut custom = weights();
        custom.minimum_score = 100;
        assert_eq!(detect_workflow(&spec_gloss(), &custom).workflow, Workflow::Unknown);
    }

    #[test]
    fn test_metallic_ramp() {
        let t = thresholds();
        assert_eq!(specular_to_metallic(0.0, &t), 0.0);
        assert_eq!(specular_to_metallic(0.04, &t), 0.0);
        assert_eq!(specular_to_metallic(0.9, &t), 1.0);
        assert_eq!(specular_to_metallic(1.0, &t), 1.0);

        let mut last = 0.0;
        for i in 5..90 {
            let m = specular_to_metallic(i as f32 / 100.0, &t);
            assert!(m >= last);
            last = m;
        }
        let mid = specular_to_metallic(0.47, &t);
        assert!((mid - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_tinted_specular_boost() {
        let t = thresholds();
        let gold = Vec3::new(0.8, 0.6, 0.2);
        assert!(is_tinted_specular(gold, &t));
        assert!(metallic_from_specular_color(gold, &t) >= 0.8);
        assert!(!is_tinted_specular(Vec3::splat(0.5), &t));
    }

    #[test]
    fn test_conversion_outputs() {
        let t = thresholds();
        let (base, metallic, roughness) =
            convert_specular_gloss_to_metallic_roughness(Vec3::new(0.8, 0.2, 0.2), Vec3::splat(0.04), 0.7, &t);
        assert_eq!(base, Vec3::new(0.8, 0.2, 0.2));
        assert_eq!(metallic, 0.0);
        assert!((roughness - 0.3).abs() < 1e-6);

        let (base, metallic, _) =
            convert_specular_gloss_to_metallic_roughness(Vec3::splat(0.5), Vec3::splat(0.95), 1.0, &t);
        assert_eq!(metallic, 1.0);
        assert!((base - Vec3::splat(0.95)).length() < 1e-6);
    }

    #[test]
    fn test_glossiness_from_shininess() {
        assert!((glossiness_from_shininess(1022.0) - 1.0).abs() < 1e-6);
        assert!((glossiness_from_shininess(30.0) - (32.0f32 / 1024.0).sqrt()).abs() < 1e-6);
        assert_eq!(glossiness_from_shininess(5000.0), 1.0);
    }

    #[test]
    fn test_resolve_keeps_present_values() {
        let props = MaterialProperties {
            base_color: Some(Vec3::new(0.1, 0.2, 0.3)),
            metallic: Some(0.7),
            roughness: Some(0.2),
            ..Default::default()
        };
        let params = resolve_pbr_parameters(&props, Workflow::MetallicRoughness, &thresholds());
        assert_eq!(params.base_color, Vec3::new(0.1, 0.2, 0.3));
        assert_eq!(params.metallic, 0.7);
        assert_eq!(params.roughness, 0.2);
    }

    #[test]
    fn test_resolve_specular_gloss() {
        let params = resolve_pbr_parameters(&spec_gloss(), Workflow::SpecularGlossiness, &thresholds());
        assert_eq!(params.base_color, Vec3::new(0.8, 0.2, 0.2));
        assert_eq!(params.metallic, 0.0);
        assert!((params.roughness - 0.3).abs() < 1e-6);

        let shiny = MaterialProperties {
            shininess: Some(254.0),
            specular_color: Some(Vec3::splat(0.5)),
            ..Default::default()
        };
        let params = resolve_pbr_parameters(&shiny, Workflow::SpecularGlossiness, &thresholds());
        assert!((params.roughness - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_resolve_legacy() {
        let props = MaterialProperties {
            shininess: Some(30.0),
            reflectivity: Some(0.25),
            ..Default::default()
        };
        let params = resolve_pbr_parameters(&props, Workflow::Unknown, &thresholds());
        assert_eq!(params.base_color, Vec3::ONE);
        assert_eq!(params.metallic, 0.25);
        assert!((params.roughness - 0.25).abs() < 1e-6);

        let bare = resolve_pbr_parameters(&MaterialProperties::default(), Workflow::Unknown, &thresholds());
        assert_eq!(bare.metallic, 0.0);
        assert_eq!(bare.roughness, 0.5);
    }

    #[test]
    fn test_texture_selection_fallbacks() {
        let sg = MaterialProperties::default()
            .with_texture(TextureSlot::Diffuse, TextureRef::Embedded(0))
            .with_texture(TextureSlot::Specular, TextureRef::Embedded(1))
            .with_texture(TextureSlot::Glossiness, TextureRef::Embedded(2));
        let wf = Workflow::SpecularGlossiness;

        let base = select_texture_source(&sg, wf, TextureTarget::BaseColor, false).unwrap();
        assert_eq!((base.slot, base.semantic), (TextureSlot::Diffuse, TextureSemantic::BaseColor));

        let metal = select_texture_source(&sg, wf, TextureTarget::Metallic, false).unwrap();
        assert_eq!(metal.semantic, TextureSemantic::SpecularToMetallic);
        assert!(!metal.inverse);

        let rough = select_texture_source(&sg, wf, TextureTarget::Roughness, false).unwrap();
        assert_eq!(rough.semantic, TextureSemantic::GlossToRoughness);
        assert!(rough.inverse);

        assert!(select_texture_source(&sg, wf, TextureTarget::Metallic, true).is_none());
        assert!(select_texture_source(&sg, Workflow::MetallicRoughness, TextureTarget::Roughness, false).is_none());
    }

    #[test]
    fn test_specular_roughness_fallback() {
        let sg = MaterialProperties::default().with_texture(TextureSlot::Specular, TextureRef::Embedded(0));
        let rough =
            select_texture_source(&sg, Workflow::SpecularGlossiness, TextureTarget::Roughness, false).unwrap();
        assert_eq!(rough.semantic, TextureSemantic::SpecularToRoughness);
        assert!(rough.inverse);
    }

    #[test]
    fn test_duplicate_specular_usage() {
        let lone = MaterialProperties::default().with_texture(TextureSlot::Specular, TextureRef::Embedded(0));
        assert!(detect_duplicate_specular_usage(&lone, Workflow::SpecularGlossiness));
        assert!(!detect_duplicate_specular_usage(&lone, Workflow::MetallicRoughness));

        let with_gloss = lone.clone().with_texture(TextureSlot::Glossiness, TextureRef::Embedded(1));
        assert!(!detect_duplicate_specular_usage(&with_gloss, Workflow::SpecularGlossiness));
    }

    #[test]
    fn test_material_import_names_and_textures() {
        let mut scene = ImportScene::default();
        scene.materials.push(
            MaterialProperties {
                name: Some("Steel.001".into()),
                metallic: Some(1.0),
                roughness: Some(0.4),
                ..Default::default()
            }
            .with_texture(TextureSlot::BaseColor, TextureRef::Embedded(0))
            .with_texture(TextureSlot::MetallicRoughness, TextureRef::Embedded(1))
            .with_texture(TextureSlot::Normal, TextureRef::External("tex/steel.normal.png".into())),
        );
        scene.materials.push(
            MaterialProperties::default().with_texture(TextureSlot::Diffuse, TextureRef::Embedded(0)),
        );

        let w = weights();
        let t = thresholds();
        let import = MaterialImporter::new(&scene, "robot", "app:/data/models", &w, &t).run();

        assert_eq!(import.materials[0].name, "[0] Steel_001");
        assert_eq!(import.materials[1].name, "[1] Material robot");

        let steel = &import.materials[0].material;
        assert_eq!(steel.color_map.as_deref(), Some("app:/data/models/[0] BaseColor robot.png"));
        assert_eq!(steel.metalness_map, steel.roughness_map);
        assert_eq!(steel.normal_map.as_deref(), Some("app:/data/models/tex/steel_normal.png"));

        // Embedded texture 0 is shared and recorded once
        let second = &import.materials[1].material;
        assert_eq!(second.color_map, steel.color_map);
        let embedded: Vec<_> = import.textures.iter().filter_map(|t| t.embedded_index).collect();
        assert_eq!(embedded, vec![0, 1]);
    }

    #[test]
    fn test_combined_specular_material() {
        let mut scene = ImportScene::default();
        scene.materials.push(
            MaterialProperties {
                diffuse_color: Some(Vec3::ONE),
                specular_color: Some(Vec3::splat(0.2)),
                ..Default::default()
            }
            .with_texture(TextureSlot::Specular, TextureRef::Embedded(3)),
        );
        let w = weights();
        let t = thresholds();
        let import = MaterialImporter::new(&scene, "crate", "app:/data", &w, &t).run();

        let material = &import.materials[0].material;
        assert_eq!(import.materials[0].workflow, Workflow::SpecularGlossiness);
        assert_eq!(
            material.metalness_map.as_deref(),
            Some("app:/data/[3] SpecularToMetallicRoughness crate.png")
        );
        assert_eq!(material.metalness_map, material.roughness_map);
        assert_eq!(import.textures.len(), 1);
    }

    #[test]
    fn test_shared_image_with_two_conversions() {
        let mut scene = ImportScene::default();
        scene.materials.push(
            MaterialProperties {
                diffuse_color: Some(Vec3::ONE),
                specular_color: Some(Vec3::splat(0.2)),
                ..Default::default()
            }
            .with_texture(TextureSlot::Specular, TextureRef::Embedded(2))
            .with_texture(TextureSlot::Glossiness, TextureRef::Embedded(2)),
        );
        let w = weights();
        let t = thresholds();
        let import = MaterialImporter::new(&scene, "box", "app:/data", &w, &t).run();

        let material = &import.materials[0].material;
        assert_eq!(import.materials[0].workflow, Workflow::SpecularGlossiness);
        assert_eq!(
            material.metalness_map.as_deref(),
            Some("app:/data/[2] SpecularToMetallic box.png")
        );
        assert_eq!(
            material.roughness_map.as_deref(),
            Some("app:/data/[2] GlossToRoughness box.png")
        );
        let semantics: Vec<_> = import.textures.iter().map(|t| (t.embedded_index, t.semantic)).collect();
        assert_eq!(
            semantics,
            vec![
                (Some(2), TextureSemantic::SpecularToMetallic),
                (Some(2), TextureSemantic::GlossToRoughness),
            ]
        );
    }

    #[test]
    fn test_split_combined_channels() {
        let mut scene = ImportScene::default();
        scene.materials.push(
            MaterialProperties {
                metallic: Some(1.0),
                roughness: Some(0.4),
                ..Default::default()
            }
            .with_texture(TextureSlot::MetallicRoughness, TextureRef::Embedded(1)),
        );
        let w = weights();
        let t = thresholds();

        let shared = MaterialImporter::new(&scene, "robot", "app:/data", &w, &t).run();
        assert_eq!(shared.textures.len(), 1);

        let split = MaterialImporter::new(&scene, "robot", "app:/data", &w, &t)
            .split_channels(true)
            .run();
        let material = &split.materials[0].material;
        assert_eq!(
            material.metalness_map.as_deref(),
            Some("app:/data/[1] ExtractMetallic robot.png")
        );
        assert_eq!(
            material.roughness_map.as_deref(),
            Some("app:/data/[1] ExtractRoughness robot.png")
        );
        assert_eq!(split.textures.len(), 2);
    }
}
