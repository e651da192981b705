//! Mesh import
//!
//! Flattens scene meshes into one vertex/index stream, rebuilds the node
//! hierarchy with depth-first indices and computes bounding volumes. Skinned
//! meshes get a bound that covers every sampled pose of every animation.

use crate::error::{CompileError, CompileResult};
use crate::scene::{ImportScene, QuatKey, SceneAnimation, SceneChannel, SceneMesh, VectorKey};
use crossbeam_utils::thread;
use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use void_asset::ImportSettings;

/// Maximum bone influences per vertex
pub const MAX_INFLUENCES: usize = 4;

/// Runtime vertex layout
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub tangent: [f32; 4],
    pub uv: [f32; 2],
    /// Indices into [`MeshData::bones`]
    pub bone_indices: [u32; 4],
    pub bone_weights: [f32; 4],
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

impl Default for Bounds {
    fn default() -> Self {
        Self::empty()
    }
}

impl Bounds {
    /// Box containing nothing
    pub fn empty() -> Self {
        Self {
            min: [f32::MAX; 3],
            max: [f32::MIN; 3],
        }
    }

    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Self {
        let mut bounds = Self::empty();
        for point in points {
            bounds.add_point(point);
        }
        bounds
    }

    pub fn is_populated(&self) -> bool {
        (0..3).all(|axis| self.min[axis] <= self.max[axis])
    }

    pub fn add_point(&mut self, point: Vec3) {
        self.min = Vec3::from(self.min).min(point).to_array();
        self.max = Vec3::from(self.max).max(point).to_array();
    }

    pub fn union(&mut self, other: &Bounds) {
        if other.is_populated() {
            self.add_point(Vec3::from(other.min));
            self.add_point(Vec3::from(other.max));
        }
    }

    /// Half the size along each axis
    pub fn extents(&self) -> Vec3 {
        (Vec3::from(self.max) - Vec3::from(self.min)) * 0.5
    }

    pub fn inflate(&mut self, amount: Vec3) {
        self.min = (Vec3::from(self.min) - amount).to_array();
        self.max = (Vec3::from(self.max) + amount).to_array();
    }

    /// Box around the eight transformed corners
    pub fn transformed(&self, transform: &Mat4) -> Bounds {
        if !self.is_populated() {
            return *self;
        }
        let (min, max) = (Vec3::from(self.min), Vec3::from(self.max));
        Bounds::from_points((0..8).map(|i| {
            let corner = Vec3::new(
                if i & 1 == 0 { min.x } else { max.x },
                if i & 2 == 0 { min.y } else { max.y },
                if i & 4 == 0 { min.z } else { max.z },
            );
            transform.transform_point3(corner)
        }))
    }
}

/// Contiguous range of [`MeshData`] belonging to one source mesh
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Submesh {
    pub name: String,
    /// Name of the node the submesh hangs from
    pub node: Option<String>,
    pub vertex_start: u32,
    pub vertex_count: u32,
    pub index_start: u32,
    pub index_count: u32,
    pub material: Option<usize>,
    pub skinned: bool,
    /// Mesh-space bounds
    pub bounds: Bounds,
}

/// Node of the runtime hierarchy, stored in depth-first order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArmatureNode {
    pub name: String,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    /// Column-major local transform
    pub local_transform: [f32; 16],
    pub submeshes: Vec<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoneInfluence {
    /// Index into [`MeshData::vertices`]
    pub vertex: u32,
    pub weight: f32,
}

/// Skinning bone with every vertex it influences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkinBone {
    pub node_name: String,
    /// Depth-first node index
    pub node_index: usize,
    /// Mesh space to bone space
    pub bind_pose: [f32; 16],
    pub influences: Vec<BoneInfluence>,
}

/// Compiled mesh
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshData {
    pub vertices: Vec<MeshVertex>,
    pub indices: Vec<u32>,
    pub submeshes: Vec<Submesh>,
    pub nodes: Vec<ArmatureNode>,
    pub bones: Vec<SkinBone>,
    pub material_count: usize,
    /// Union of the animated bounds, or the static bounds without animations
    pub bounds: Bounds,
    /// One entry per source animation
    pub animation_bounds: Vec<Bounds>,
}

impl MeshData {
    pub fn has_vertices(&self) -> bool {
        !self.vertices.is_empty()
    }
}

/// Build the runtime mesh for a scene
pub fn build_mesh_data(scene: &ImportScene, settings: &ImportSettings) -> CompileResult<MeshData> {
    let mut data = MeshData::default();
    let mut bone_lookup = HashMap::new();
    let dfs = scene.dfs_indices();

    for mesh in &scene.meshes {
        flatten_mesh(scene, mesh, &dfs, &mut bone_lookup, &mut data);
    }
    normalize_influences(&mut data);
    build_hierarchy(scene, &dfs, &mut data);

    let static_bounds = static_bounds(scene, &data);
    data.animation_bounds = scene
        .animations
        .iter()
        .map(|animation| animation_bounds(scene, animation, settings))
        .collect::<CompileResult<_>>()?;

    let mut animated = Bounds::empty();
    for bounds in &data.animation_bounds {
        animated.union(bounds);
    }
    data.bounds = if animated.is_populated() { animated } else { static_bounds };

    Ok(data)
}

fn flatten_mesh(
    scene: &ImportScene,
    mesh: &SceneMesh,
    dfs: &HashMap<usize, usize>,
    bone_lookup: &mut HashMap<usize, usize>,
    data: &mut MeshData,
) {
    let vertex_start = data.vertices.len() as u32;
    let index_start = data.indices.len() as u32;

    data.vertices.extend(mesh.positions.iter().enumerate().map(|(i, position)| MeshVertex {
        position: position.to_array(),
        normal: mesh.normals.get(i).copied().unwrap_or(Vec3::Z).to_array(),
        tangent: mesh.tangents.get(i).map(|t| t.to_array()).unwrap_or([1.0, 0.0, 0.0, 1.0]),
        uv: mesh.uvs.get(i).map(|uv| uv.to_array()).unwrap_or_default(),
        ..Default::default()
    }));
    data.indices.extend(mesh.indices.iter().map(|i| i + vertex_start));

    for bone in &mesh.bones {
        let slot = *bone_lookup.entry(bone.node).or_insert_with(|| {
            data.bones.push(SkinBone {
                node_name: scene.nodes.get(bone.node).map(|n| n.name.clone()).unwrap_or_default(),
                node_index: dfs.get(&bone.node).copied().unwrap_or_default(),
                bind_pose: bone.offset.to_cols_array(),
                influences: Vec::new(),
            });
            data.bones.len() - 1
        });
        data.bones[slot]
            .influences
            .extend(bone.weights.iter().map(|w| BoneInfluence {
                vertex: w.vertex + vertex_start,
                weight: w.weight,
            }));
    }

    if let Some(material) = mesh.material {
        data.material_count = data.material_count.max(material + 1);
    }

    data.submeshes.push(Submesh {
        name: mesh.name.clone(),
        node: None,
        vertex_start,
        vertex_count: mesh.positions.len() as u32,
        index_start,
        index_count: mesh.indices.len() as u32,
        material: mesh.material,
        skinned: mesh.has_bones(),
        bounds: Bounds::from_points(mesh.positions.iter().copied()),
    });
}

/// Keep the strongest influences per vertex and renormalize them
fn normalize_influences(data: &mut MeshData) {
    let mut per_vertex: Vec<Vec<(u32, f32)>> = vec![Vec::new(); data.vertices.len()];
    for (bone, skin) in data.bones.iter().enumerate() {
        for influence in &skin.influences {
            if let Some(list) = per_vertex.get_mut(influence.vertex as usize) {
                list.push((bone as u32, influence.weight));
            }
        }
    }

    for (vertex, mut influences) in data.vertices.iter_mut().zip(per_vertex) {
        if influences.is_empty() {
            continue;
        }
        influences.sort_by(|a, b| b.1.total_cmp(&a.1));
        influences.truncate(MAX_INFLUENCES);
        let total: f32 = influences.iter().map(|(_, w)| w).sum();
        for (slot, (bone, weight)) in influences.into_iter().enumerate() {
            vertex.bone_indices[slot] = bone;
            vertex.bone_weights[slot] = if total > 0.0 { weight / total } else { 0.0 };
        }
    }
}

fn build_hierarchy(scene: &ImportScene, dfs: &HashMap<usize, usize>, data: &mut MeshData) {
    let order = scene.depth_first();
    data.nodes = order
        .iter()
        .map(|&node| {
            let source = &scene.nodes[node];
            for &mesh in &source.meshes {
                if let Some(submesh) = data.submeshes.get_mut(mesh) {
                    submesh.node = Some(source.name.clone());
                }
            }
            ArmatureNode {
                name: source.name.clone(),
                parent: source.parent.and_then(|p| dfs.get(&p).copied()),
                children: source.children.iter().filter_map(|c| dfs.get(c).copied()).collect(),
                local_transform: source.transform.to_cols_array(),
                submeshes: source.meshes.clone(),
            }
        })
        .collect();
}

/// Submesh bounds moved by their nodes' bind-pose transforms
fn static_bounds(scene: &ImportScene, data: &MeshData) -> Bounds {
    let mut bounds = Bounds::empty();
    for node in scene.mesh_nodes() {
        let global = scene.global_transform(node);
        for &mesh in &scene.nodes[node].meshes {
            if let Some(submesh) = data.submeshes.get(mesh) {
                bounds.union(&submesh.bounds.transformed(&global));
            }
        }
    }
    bounds
}

/// Position of a vector track at `time` ticks
fn sample_vector(keys: &[VectorKey], time: f64) -> Option<Vec3> {
    let first = keys.first()?;
    for pair in keys.windows(2) {
        if time < pair[1].time {
            let span = pair[1].time - pair[0].time;
            let factor = if span > 0.0 { ((time - pair[0].time) / span) as f32 } else { 0.0 };
            return Some(pair[0].value.lerp(pair[1].value, factor.clamp(0.0, 1.0)));
        }
    }
    Some(keys.last().unwrap_or(first).value)
}

fn sample_rotation(keys: &[QuatKey], time: f64) -> Option<Quat> {
    let first = keys.first()?;
    for pair in keys.windows(2) {
        if time < pair[1].time {
            let span = pair[1].time - pair[0].time;
            let factor = if span > 0.0 { ((time - pair[0].time) / span) as f32 } else { 0.0 };
            return Some(pair[0].value.slerp(pair[1].value, factor.clamp(0.0, 1.0)).normalize());
        }
    }
    Some(keys.last().unwrap_or(first).value)
}

fn sample_local(bind: &Mat4, channel: &SceneChannel, time: f64) -> Mat4 {
    let (bind_scale, bind_rotation, bind_translation) = bind.to_scale_rotation_translation();
    let translation = sample_vector(&channel.positions, time).unwrap_or(bind_translation);
    let rotation = sample_rotation(&channel.rotations, time).unwrap_or(bind_rotation);
    let scale = sample_vector(&channel.scales, time).unwrap_or(bind_scale);
    Mat4::from_scale_rotation_translation(scale, rotation, translation)
}

/// Global transform of every node at `time` ticks
pub fn pose_at(scene: &ImportScene, animation: &SceneAnimation, time: f64) -> Vec<Mat4> {
    let mut globals = vec![Mat4::IDENTITY; scene.nodes.len()];
    for node in scene.depth_first() {
        let source = &scene.nodes[node];
        let local = match animation.channel_for(node) {
            Some(channel) => sample_local(&source.transform, channel, time),
            None => source.transform,
        };
        let parent = source.parent.map(|p| globals[p]).unwrap_or(Mat4::IDENTITY);
        globals[node] = parent * local;
    }
    globals
}

/// Skinned vertex positions of `mesh` in the pose `globals`
///
/// Bones are split across scoped worker threads; each accumulates a partial
/// sum that is reduced afterwards.
pub fn skin_positions(mesh: &SceneMesh, globals: &[Mat4]) -> CompileResult<Vec<Vec3>> {
    let workers = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(mesh.bones.len())
        .max(1);
    let chunk = (mesh.bones.len() + workers - 1) / workers;
    let vertex_count = mesh.positions.len();

    let partials = thread::scope(|scope| {
        let handles: Vec<_> = mesh
            .bones
            .chunks(chunk.max(1))
            .map(|bones| {
                scope.spawn(move |_| {
                    let mut partial = vec![Vec3::ZERO; vertex_count];
                    for bone in bones {
                        let skin = globals.get(bone.node).copied().unwrap_or(Mat4::IDENTITY) * bone.offset;
                        for weight in &bone.weights {
                            let vertex = weight.vertex as usize;
                            if let (Some(out), Some(position)) = (partial.get_mut(vertex), mesh.positions.get(vertex)) {
                                *out += skin.transform_point3(*position) * weight.weight;
                            }
                        }
                    }
                    partial
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join()).collect::<Result<Vec<_>, _>>()
    })
    .map_err(|_| CompileError::Import("skinning worker panicked".into()))?
    .map_err(|_| CompileError::Import("skinning worker panicked".into()))?;

    let mut positions = vec![Vec3::ZERO; vertex_count];
    for partial in partials {
        for (out, value) in positions.iter_mut().zip(partial) {
            *out += value;
        }
    }
    Ok(positions)
}

/// Bound of every skinned mesh an animation moves, over all sampled frames
pub fn animation_bounds(
    scene: &ImportScene,
    animation: &SceneAnimation,
    settings: &ImportSettings,
) -> CompileResult<Bounds> {
    let affected: HashSet<usize> = animation
        .channels
        .iter()
        .flat_map(|channel| scene.subtree(channel.node))
        .collect();
    let meshes: Vec<&SceneMesh> = scene
        .meshes
        .iter()
        .filter(|mesh| mesh.bones.iter().any(|bone| affected.contains(&bone.node)))
        .collect();

    let mut bounds = Bounds::empty();
    if meshes.is_empty() {
        return Ok(bounds);
    }

    let ticks_per_second = if animation.ticks_per_second < 0.001 {
        settings.default_ticks_per_second
    } else {
        animation.ticks_per_second
    };
    let step = settings.sample_interval as f64 * ticks_per_second;

    let mut sample = 0u32;
    loop {
        let time = sample as f64 * step;
        let globals = pose_at(scene, animation, time);
        for mesh in &meshes {
            let mut frame = Bounds::from_points(skin_positions(mesh, &globals)?);
            frame.inflate(frame.extents() * settings.bounds_inflation);
            bounds.union(&frame);
        }

        sample += 1;
        if step <= 0.0 || sample as f64 * step > animation.duration {
            break;
        }
    }

    log::trace!("Computed bounds for animation {}", animation.name);
    Ok(bounds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::fixtures::skinned_scene;

    fn settings() -> ImportSettings {
        ImportSettings::default()
    }

    fn approx(a: [f32; 3], b: [f32; 3]) -> bool {
        a.iter().zip(b).all(|(x, y)| (x - y).abs() < 1e-4)
    }

    #[test]
    fn test_bounds_operations() {
        let mut bounds = Bounds::empty();
        assert!(!bounds.is_populated());
        bounds.add_point(Vec3::new(-1.0, 0.0, 0.0));
        bounds.add_point(Vec3::new(1.0, 2.0, 0.0));
        assert_eq!(bounds.extents(), Vec3::new(1.0, 1.0, 0.0));

        bounds.inflate(bounds.extents() * 0.05);
        assert!(approx(bounds.min, [-1.05, -0.05, 0.0]));
        assert!(approx(bounds.max, [1.05, 2.05, 0.0]));

        let moved = bounds.transformed(&Mat4::from_translation(Vec3::X));
        assert!(approx(moved.min, [-0.05, -0.05, 0.0]));
    }

    #[test]
    fn test_flatten_and_hierarchy() {
        let scene = skinned_scene();
        let data = build_mesh_data(&scene, &settings()).unwrap();

        assert_eq!(data.vertices.len(), 4);
        assert_eq!(data.indices, vec![0, 1, 2, 0, 2, 3]);
        assert_eq!(data.submeshes[0].node.as_deref(), Some("Body"));
        assert!(data.submeshes[0].skinned);
        assert_eq!(data.material_count, 1);

        let names: Vec<_> = data.nodes.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["Root", "Hips", "Spine", "Head", "Body"]);
        assert_eq!(data.nodes[0].children, vec![1, 4]);
        assert_eq!(data.nodes[3].parent, Some(2));
        assert_eq!(data.nodes[4].submeshes, vec![0]);
    }

    #[test]
    fn test_influences_are_packed() {
        let scene = skinned_scene();
        let data = build_mesh_data(&scene, &settings()).unwrap();
        assert_eq!(data.bones.len(), 2);
        assert_eq!(data.bones[1].node_name, "Spine");
        assert_eq!(data.vertices[0].bone_indices[0], 0);
        assert_eq!(data.vertices[2].bone_indices[0], 1);
        assert_eq!(data.vertices[2].bone_weights, [1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_skinning_matches_bind_pose() {
        let scene = skinned_scene();
        let globals: Vec<Mat4> = (0..scene.nodes.len()).map(|n| scene.global_transform(n)).collect();
        let skinned = skin_positions(&scene.meshes[0], &globals).unwrap();
        for (a, b) in skinned.iter().zip(&scene.meshes[0].positions) {
            assert!((*a - *b).length() < 1e-5);
        }
    }

    #[test]
    fn test_animation_bounds_cover_motion() {
        let scene = skinned_scene();
        let data = build_mesh_data(&scene, &settings()).unwrap();
        assert_eq!(data.animation_bounds.len(), 1);

        // Hips travels towards x = 2; the quad is one unit wide
        let bounds = data.bounds;
        assert!(bounds.max[0] >= 2.2);
        assert!(bounds.min[0] <= -0.5);
        assert!(bounds.max[1] >= 1.0);
    }

    #[test]
    fn test_static_bounds_without_animation() {
        let mut scene = skinned_scene();
        scene.animations.clear();
        scene.nodes[4].transform = Mat4::from_translation(Vec3::new(0.0, 0.0, 3.0));
        let data = build_mesh_data(&scene, &settings()).unwrap();
        assert!(data.animation_bounds.is_empty());
        assert!(approx(data.bounds.min, [-0.5, 0.0, 3.0]));
        assert!(approx(data.bounds.max, [0.5, 1.0, 3.0]));
    }
}
