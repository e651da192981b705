//! glTF/GLB importer
//!
//! Reads a glTF 2.0 file into an [`ImportScene`]:
//! - Node hierarchy with local transforms
//! - One scene mesh per primitive, with skins resolved to node bones
//! - Animations (key times in seconds, one tick per second)
//! - Metallic/roughness and `KHR_materials_pbrSpecularGlossiness` materials
//! - Images stored in the file (buffer views and data URIs)

use crate::error::{CompileError, CompileResult};
use crate::material::{AlphaMode, MaterialProperties, TextureRef, TextureSlot};
use crate::scene::{
    EmbeddedData, EmbeddedTexture, ImportScene, QuatKey, SceneAnimation, SceneBone, SceneChannel, SceneMesh,
    SceneNode, VectorKey, VertexWeight,
};
use glam::{Mat4, Quat, Vec2, Vec3, Vec4};
use gltf::animation::util::ReadOutputs;
use std::collections::HashMap;
use std::path::Path;

/// Name given to the node added above multiple scene roots
pub const SYNTHETIC_ROOT: &str = "RootNode";

/// Skin attributes of a primitive, kept until the skin is known
#[derive(Default)]
struct SkinAttributes {
    joints: Vec<[u16; 4]>,
    weights: Vec<[f32; 4]>,
}

/// Import a `.gltf` or `.glb` file
pub fn import_gltf(path: &Path) -> CompileResult<ImportScene> {
    let (document, buffers, images) = gltf::import(path)?;
    GltfImporter::new(&document, &buffers, &images).run()
}

/// Import any supported 3D source by extension
pub fn import_scene(path: &Path) -> CompileResult<ImportScene> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();
    match extension.as_str() {
        "gltf" | "glb" => import_gltf(path),
        other => Err(CompileError::Unsupported(format!("'.{}' model files", other))),
    }
}

struct GltfImporter<'a> {
    document: &'a gltf::Document,
    buffers: &'a [gltf::buffer::Data],
    images: &'a [gltf::image::Data],
    scene: ImportScene,
    /// glTF mesh index → scene mesh indices (one per primitive)
    primitives: HashMap<usize, Vec<usize>>,
    skins: HashMap<usize, SkinAttributes>,
    /// glTF image index → embedded texture index
    embedded: HashMap<usize, usize>,
}

impl<'a> GltfImporter<'a> {
    fn new(document: &'a gltf::Document, buffers: &'a [gltf::buffer::Data], images: &'a [gltf::image::Data]) -> Self {
        Self {
            document,
            buffers,
            images,
            scene: ImportScene::default(),
            primitives: HashMap::new(),
            skins: HashMap::new(),
            embedded: HashMap::new(),
        }
    }

    fn run(mut self) -> CompileResult<ImportScene> {
        self.load_images();
        self.load_materials();
        self.load_meshes()?;
        self.load_nodes();
        self.load_skins();
        self.load_animations();
        Ok(self.scene)
    }

    fn load_images(&mut self) {
        for image in self.document.images() {
            let name = match image.source() {
                gltf::image::Source::View { .. } => image.name().map(str::to_string),
                gltf::image::Source::Uri { uri, .. } if uri.starts_with("data:") => image.name().map(str::to_string),
                // External files are referenced by path, not copied
                gltf::image::Source::Uri { .. } => continue,
            };
            let Some(data) = self.images.get(image.index()) else { continue };
            let Some(pixels) = to_rgba8(data) else {
                log::warn!("Image {} has an unsupported pixel format {:?}", image.index(), data.format);
                continue;
            };

            self.embedded.insert(image.index(), self.scene.textures.len());
            self.scene.textures.push(EmbeddedTexture {
                file_name: name,
                data: EmbeddedData::Rgba8 {
                    width: data.width,
                    height: data.height,
                    pixels,
                },
            });
        }
    }

    fn texture_ref(&self, texture: gltf::Texture<'_>) -> Option<TextureRef> {
        let image = texture.source();
        if let Some(&index) = self.embedded.get(&image.index()) {
            return Some(TextureRef::Embedded(index));
        }
        match image.source() {
            gltf::image::Source::Uri { uri, .. } if !uri.starts_with("data:") => {
                Some(TextureRef::External(uri.to_string()))
            }
            _ => None,
        }
    }

    fn load_materials(&mut self) {
        for material in self.document.materials() {
            let mut props = MaterialProperties {
                name: material.name().map(str::to_string),
                emissive_color: Some(Vec3::from(material.emissive_factor())),
                alpha_mode: match material.alpha_mode() {
                    gltf::material::AlphaMode::Opaque => AlphaMode::Opaque,
                    gltf::material::AlphaMode::Mask => AlphaMode::Mask,
                    gltf::material::AlphaMode::Blend => AlphaMode::Blend,
                },
                alpha_cutoff: material.alpha_cutoff(),
                double_sided: material.double_sided(),
                ..Default::default()
            };

            let mut slots = Vec::new();
            if let Some(sg) = material.pbr_specular_glossiness() {
                let diffuse = sg.diffuse_factor();
                props.diffuse_color = Some(Vec3::new(diffuse[0], diffuse[1], diffuse[2]));
                props.opacity = Some(diffuse[3]);
                props.specular_color = Some(Vec3::from(sg.specular_factor()));
                props.glossiness = Some(sg.glossiness_factor());
                slots.push((TextureSlot::Diffuse, sg.diffuse_texture().map(|t| t.texture())));
                slots.push((
                    TextureSlot::Specular,
                    sg.specular_glossiness_texture().map(|t| t.texture()),
                ));
            } else {
                let pbr = material.pbr_metallic_roughness();
                let base = pbr.base_color_factor();
                props.base_color = Some(Vec3::new(base[0], base[1], base[2]));
                props.opacity = Some(base[3]);
                props.metallic = Some(pbr.metallic_factor());
                props.roughness = Some(pbr.roughness_factor());
                slots.push((TextureSlot::BaseColor, pbr.base_color_texture().map(|t| t.texture())));
                slots.push((
                    TextureSlot::MetallicRoughness,
                    pbr.metallic_roughness_texture().map(|t| t.texture()),
                ));
            }

            props.normal_scale = material.normal_texture().map(|t| t.scale());
            slots.push((TextureSlot::Normal, material.normal_texture().map(|t| t.texture())));
            slots.push((TextureSlot::Occlusion, material.occlusion_texture().map(|t| t.texture())));
            slots.push((TextureSlot::Emissive, material.emissive_texture().map(|t| t.texture())));

            for (slot, texture) in slots {
                if let Some(texture) = texture.and_then(|t| self.texture_ref(t)) {
                    props.textures.insert(slot, texture);
                }
            }
            self.scene.materials.push(props);
        }
    }

    fn load_meshes(&mut self) -> CompileResult<()> {
        let buffers = self.buffers;
        for mesh in self.document.meshes() {
            let base_name = mesh
                .name()
                .map(str::to_string)
                .unwrap_or_else(|| format!("Mesh {}", mesh.index()));
            let count = mesh.primitives().len();
            let mut indices = Vec::with_capacity(count);

            for primitive in mesh.primitives() {
                let reader = primitive.reader(|buffer| Some(&buffers[buffer.index()]));

                let positions: Vec<Vec3> = reader
                    .read_positions()
                    .ok_or_else(|| CompileError::Import(format!("mesh {} is missing positions", base_name)))?
                    .map(Vec3::from)
                    .collect();
                let normals = reader
                    .read_normals()
                    .map(|n| n.map(Vec3::from).collect())
                    .unwrap_or_default();
                let tangents = reader
                    .read_tangents()
                    .map(|t| t.map(Vec4::from).collect())
                    .unwrap_or_default();
                let uvs = reader
                    .read_tex_coords(0)
                    .map(|t| t.into_f32().map(Vec2::from).collect())
                    .unwrap_or_default();
                let triangle_indices = reader
                    .read_indices()
                    .map(|i| i.into_u32().collect())
                    .unwrap_or_else(|| (0..positions.len() as u32).collect());

                let scene_index = self.scene.meshes.len();
                if let (Some(joints), Some(weights)) = (reader.read_joints(0), reader.read_weights(0)) {
                    self.skins.insert(
                        scene_index,
                        SkinAttributes {
                            joints: joints.into_u16().collect(),
                            weights: weights.into_f32().collect(),
                        },
                    );
                }

                let name = if count > 1 {
                    format!("{} {}", base_name, primitive.index())
                } else {
                    base_name.clone()
                };
                self.scene.meshes.push(SceneMesh {
                    name,
                    positions,
                    normals,
                    tangents,
                    uvs,
                    indices: triangle_indices,
                    material: primitive.material().index(),
                    bones: Vec::new(),
                });
                indices.push(scene_index);
            }
            self.primitives.insert(mesh.index(), indices);
        }
        Ok(())
    }

    fn load_nodes(&mut self) {
        for node in self.document.nodes() {
            let mut scene_node = SceneNode::new(
                node.name()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("Node {}", node.index())),
            );
            scene_node.transform = Mat4::from_cols_array_2d(&node.transform().matrix());
            if let Some(mesh) = node.mesh() {
                scene_node.meshes = self.primitives.get(&mesh.index()).cloned().unwrap_or_default();
            }
            scene_node.children = node.children().map(|c| c.index()).collect();
            self.scene.nodes.push(scene_node);
        }
        for parent in 0..self.scene.nodes.len() {
            for child in self.scene.nodes[parent].children.clone() {
                if let Some(node) = self.scene.nodes.get_mut(child) {
                    node.parent = Some(parent);
                }
            }
        }

        let roots: Vec<usize> = match self.document.default_scene().or_else(|| self.document.scenes().next()) {
            Some(scene) => scene.nodes().map(|n| n.index()).collect(),
            None => (0..self.scene.nodes.len())
                .filter(|&i| self.scene.nodes[i].parent.is_none())
                .collect(),
        };

        self.scene.root = match roots.as_slice() {
            [single] => *single,
            _ => {
                let root = self.scene.add_node(SceneNode::new(SYNTHETIC_ROOT), None);
                for child in roots {
                    self.scene.nodes[child].parent = Some(root);
                    self.scene.nodes[root].children.push(child);
                }
                root
            }
        };
    }

    fn load_skins(&mut self) {
        let buffers = self.buffers;
        for node in self.document.nodes() {
            let (Some(skin), Some(mesh)) = (node.skin(), node.mesh()) else { continue };
            let joints: Vec<usize> = skin.joints().map(|j| j.index()).collect();
            let inverse_binds: Vec<Mat4> = skin
                .reader(|buffer| Some(&buffers[buffer.index()]))
                .read_inverse_bind_matrices()
                .map(|m| m.map(|m| Mat4::from_cols_array_2d(&m)).collect())
                .unwrap_or_default();

            for &scene_mesh in self.primitives.get(&mesh.index()).into_iter().flatten() {
                let Some(attributes) = self.skins.get(&scene_mesh) else { continue };
                let Some(target) = self.scene.meshes.get_mut(scene_mesh) else { continue };
                if target.has_bones() {
                    continue;
                }

                let mut bones: Vec<SceneBone> = joints
                    .iter()
                    .enumerate()
                    .map(|(j, &node)| SceneBone {
                        node,
                        offset: inverse_binds.get(j).copied().unwrap_or(Mat4::IDENTITY),
                        weights: Vec::new(),
                    })
                    .collect();

                for (vertex, (joint_set, weight_set)) in attributes.joints.iter().zip(&attributes.weights).enumerate() {
                    for (&joint, &weight) in joint_set.iter().zip(weight_set) {
                        if weight <= 0.0 {
                            continue;
                        }
                        if let Some(bone) = bones.get_mut(joint as usize) {
                            bone.weights.push(VertexWeight {
                                vertex: vertex as u32,
                                weight,
                            });
                        }
                    }
                }
                bones.retain(|b| !b.weights.is_empty());
                target.bones = bones;
            }
        }
    }

    fn load_animations(&mut self) {
        let buffers = self.buffers;
        for animation in self.document.animations() {
            let mut channels: HashMap<usize, SceneChannel> = HashMap::new();
            let mut duration = 0.0f64;

            for channel in animation.channels() {
                let node = channel.target().node().index();
                let reader = channel.reader(|buffer| Some(&buffers[buffer.index()]));
                let (Some(inputs), Some(outputs)) = (reader.read_inputs(), reader.read_outputs()) else {
                    continue;
                };
                let times: Vec<f64> = inputs.map(f64::from).collect();
                duration = times.iter().copied().fold(duration, f64::max);

                let entry = channels.entry(node).or_insert_with(|| SceneChannel {
                    node,
                    ..Default::default()
                });
                match outputs {
                    ReadOutputs::Translations(values) => {
                        entry.positions = vector_keys(&times, values);
                    }
                    ReadOutputs::Scales(values) => {
                        entry.scales = vector_keys(&times, values);
                    }
                    ReadOutputs::Rotations(values) => {
                        entry.rotations = times
                            .iter()
                            .zip(values.into_f32())
                            .map(|(&time, value)| QuatKey {
                                time,
                                value: Quat::from_array(value),
                            })
                            .collect();
                    }
                    ReadOutputs::MorphTargetWeights(_) => {
                        log::trace!("Skipping morph target weights on node {}", node);
                    }
                }
            }

            let mut channels: Vec<SceneChannel> = channels.into_values().collect();
            channels.sort_by_key(|c| c.node);
            self.scene.animations.push(SceneAnimation {
                name: animation
                    .name()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("Animation {}", animation.index())),
                duration,
                ticks_per_second: 1.0,
                channels,
            });
        }
    }
}

fn vector_keys(times: &[f64], values: impl Iterator<Item = [f32; 3]>) -> Vec<VectorKey> {
    times
        .iter()
        .zip(values)
        .map(|(&time, value)| VectorKey {
            time,
            value: Vec3::from(value),
        })
        .collect()
}

/// Expand decoded glTF image data to RGBA8
fn to_rgba8(image: &gltf::image::Data) -> Option<Vec<u8>> {
    use gltf::image::Format;

    let pixels = match image.format {
        Format::R8G8B8A8 => image.pixels.clone(),
        Format::R8G8B8 => image
            .pixels
            .chunks_exact(3)
            .flat_map(|c| [c[0], c[1], c[2], 255])
            .collect(),
        Format::R8G8 => image
            .pixels
            .chunks_exact(2)
            .flat_map(|c| [c[0], c[1], 0, 255])
            .collect(),
        Format::R8 => image.pixels.iter().flat_map(|&v| [v, v, v, 255]).collect(),
        _ => return None,
    };
    Some(pixels)
}
