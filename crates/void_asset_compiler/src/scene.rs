//! Imported scene model
//!
//! Format-neutral view of a 3D source file. Importers fill it in; the mesh,
//! animation and material steps read from it.

use crate::material::MaterialProperties;
use glam::{Mat4, Quat, Vec2, Vec3, Vec4};
use std::collections::{HashMap, HashSet};

/// Node of the scene hierarchy
#[derive(Debug, Clone)]
pub struct SceneNode {
    pub name: String,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    pub transform: Mat4,
    /// Meshes attached to this node
    pub meshes: Vec<usize>,
}

impl SceneNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            children: Vec::new(),
            transform: Mat4::IDENTITY,
            meshes: Vec::new(),
        }
    }
}

/// One bone influence on a vertex of a mesh
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VertexWeight {
    pub vertex: u32,
    pub weight: f32,
}

/// Bone of a skinned mesh
#[derive(Debug, Clone)]
pub struct SceneBone {
    /// Node driving the bone
    pub node: usize,
    /// Mesh space to bone space
    pub offset: Mat4,
    pub weights: Vec<VertexWeight>,
}

/// Triangle mesh with optional skin
#[derive(Debug, Clone, Default)]
pub struct SceneMesh {
    pub name: String,
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub tangents: Vec<Vec4>,
    pub uvs: Vec<Vec2>,
    pub indices: Vec<u32>,
    pub material: Option<usize>,
    pub bones: Vec<SceneBone>,
}

impl SceneMesh {
    pub fn has_bones(&self) -> bool {
        !self.bones.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VectorKey {
    /// Time in ticks
    pub time: f64,
    pub value: Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuatKey {
    /// Time in ticks
    pub time: f64,
    pub value: Quat,
}

/// Keyframes animating one node
#[derive(Debug, Clone, Default)]
pub struct SceneChannel {
    pub node: usize,
    pub positions: Vec<VectorKey>,
    pub rotations: Vec<QuatKey>,
    pub scales: Vec<VectorKey>,
}

#[derive(Debug, Clone)]
pub struct SceneAnimation {
    pub name: String,
    /// Duration in ticks
    pub duration: f64,
    pub ticks_per_second: f64,
    pub channels: Vec<SceneChannel>,
}

impl SceneAnimation {
    /// Channel animating `node`
    pub fn channel_for(&self, node: usize) -> Option<&SceneChannel> {
        self.channels.iter().find(|c| c.node == node)
    }
}

/// Pixel payload of an embedded texture
#[derive(Debug, Clone)]
pub enum EmbeddedData {
    /// Encoded file bytes (PNG, JPEG, ...)
    Encoded(Vec<u8>),
    /// Raw RGBA8 pixels
    Rgba8 { width: u32, height: u32, pixels: Vec<u8> },
}

/// Texture stored inside the source file
#[derive(Debug, Clone)]
pub struct EmbeddedTexture {
    /// Original file name, when the source kept one
    pub file_name: Option<String>,
    pub data: EmbeddedData,
}

/// Everything an importer extracted from a source file
#[derive(Debug, Clone, Default)]
pub struct ImportScene {
    pub nodes: Vec<SceneNode>,
    pub root: usize,
    pub meshes: Vec<SceneMesh>,
    pub animations: Vec<SceneAnimation>,
    pub materials: Vec<MaterialProperties>,
    pub textures: Vec<EmbeddedTexture>,
}

impl ImportScene {
    /// Append a node under `parent` and return its index
    pub fn add_node(&mut self, mut node: SceneNode, parent: Option<usize>) -> usize {
        let index = self.nodes.len();
        node.parent = parent;
        self.nodes.push(node);
        if let Some(parent) = parent {
            self.nodes[parent].children.push(index);
        }
        index
    }

    /// Index of the node called `name`
    pub fn find_node(&self, name: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.name == name)
    }

    /// `node` and everything below it
    pub fn subtree(&self, node: usize) -> Vec<usize> {
        let mut out = Vec::new();
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            if current >= self.nodes.len() {
                continue;
            }
            out.push(current);
            stack.extend(self.nodes[current].children.iter().rev());
        }
        out
    }

    /// Whether `ancestor` is a strict ancestor of `node`
    pub fn is_ancestor(&self, ancestor: usize, node: usize) -> bool {
        let mut current = self.nodes.get(node).and_then(|n| n.parent);
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.nodes.get(parent).and_then(|n| n.parent);
        }
        false
    }

    /// Nodes driving a bone of any mesh
    pub fn bone_nodes(&self) -> Vec<usize> {
        let mut bones: Vec<usize> = self
            .meshes
            .iter()
            .flat_map(|m| m.bones.iter().map(|b| b.node))
            .collect();
        bones.sort_unstable();
        bones.dedup();
        bones
    }

    /// Nodes with at least one mesh attached
    pub fn mesh_nodes(&self) -> Vec<usize> {
        (0..self.nodes.len())
            .filter(|&i| !self.nodes[i].meshes.is_empty())
            .collect()
    }

    /// Node indices in depth-first order from the root
    pub fn depth_first(&self) -> Vec<usize> {
        if self.nodes.is_empty() {
            return Vec::new();
        }
        self.subtree(self.root)
    }

    /// Scene node index → depth-first position
    pub fn dfs_indices(&self) -> HashMap<usize, usize> {
        self.depth_first()
            .into_iter()
            .enumerate()
            .map(|(position, node)| (node, position))
            .collect()
    }

    /// Nodes that are a bone, a mesh node, or an ancestor of either
    pub fn skeleton_relevant_nodes(&self) -> HashSet<usize> {
        let mut relevant = HashSet::new();
        for start in self.bone_nodes().into_iter().chain(self.mesh_nodes()) {
            let mut current = Some(start);
            while let Some(node) = current {
                if !relevant.insert(node) {
                    break;
                }
                current = self.nodes.get(node).and_then(|n| n.parent);
            }
        }
        relevant
    }

    /// Bind-pose global transform of a node
    pub fn global_transform(&self, node: usize) -> Mat4 {
        let mut transform = Mat4::IDENTITY;
        let mut current = Some(node);
        while let Some(index) = current {
            let Some(n) = self.nodes.get(index) else { break };
            transform = n.transform * transform;
            current = n.parent;
        }
        transform
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// Root → Hips → Spine → Head plus a mesh node under the root
    ///
    /// The mesh is a unit quad skinned half to Hips and half to Spine. The
    /// single animation moves Hips along +X over 2 seconds at 30 ticks/s.
    pub fn skinned_scene() -> ImportScene {
        let mut scene = ImportScene::default();
        let root = scene.add_node(SceneNode::new("Root"), None);
        let hips = scene.add_node(SceneNode::new("Hips"), Some(root));
        let spine = scene.add_node(
            SceneNode {
                transform: Mat4::from_translation(Vec3::Y),
                ..SceneNode::new("Spine")
            },
            Some(hips),
        );
        scene.add_node(SceneNode::new("Head"), Some(spine));
        let body = scene.add_node(SceneNode::new("Body"), Some(root));
        scene.nodes[body].meshes.push(0);
        scene.root = root;

        let positions = vec![
            Vec3::new(-0.5, 0.0, 0.0),
            Vec3::new(0.5, 0.0, 0.0),
            Vec3::new(0.5, 1.0, 0.0),
            Vec3::new(-0.5, 1.0, 0.0),
        ];
        scene.meshes.push(SceneMesh {
            name: "Body".into(),
            normals: vec![Vec3::Z; 4],
            uvs: vec![Vec2::ZERO; 4],
            indices: vec![0, 1, 2, 0, 2, 3],
            positions,
            material: Some(0),
            bones: vec![
                SceneBone {
                    node: hips,
                    offset: Mat4::IDENTITY,
                    weights: vec![
                        VertexWeight { vertex: 0, weight: 1.0 },
                        VertexWeight { vertex: 1, weight: 1.0 },
                    ],
                },
                SceneBone {
                    node: spine,
                    offset: Mat4::from_translation(-Vec3::Y),
                    weights: vec![
                        VertexWeight { vertex: 2, weight: 1.0 },
                        VertexWeight { vertex: 3, weight: 1.0 },
                    ],
                },
            ],
            ..Default::default()
        });

        scene.animations.push(SceneAnimation {
            name: "Armature|walk.001".into(),
            duration: 60.0,
            ticks_per_second: 30.0,
            channels: vec![SceneChannel {
                node: hips,
                positions: vec![
                    VectorKey { time: 0.0, value: Vec3::ZERO },
                    VectorKey { time: 60.0, value: Vec3::new(2.0, 0.0, 0.0) },
                ],
                rotations: vec![QuatKey { time: 0.0, value: Quat::IDENTITY }],
                scales: vec![VectorKey { time: 0.0, value: Vec3::ONE }],
            }],
        });
        scene
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hierarchy_queries() {
        let scene = fixtures::skinned_scene();
        assert_eq!(scene.depth_first(), vec![0, 1, 2, 3, 4]);
        assert_eq!(scene.subtree(1), vec![1, 2, 3]);
        assert!(scene.is_ancestor(0, 3));
        assert!(!scene.is_ancestor(3, 0));
        assert_eq!(scene.bone_nodes(), vec![1, 2]);
        assert_eq!(scene.mesh_nodes(), vec![4]);
        assert_eq!(scene.find_node("Head"), Some(3));

        let relevant = scene.skeleton_relevant_nodes();
        assert!(relevant.contains(&0) && relevant.contains(&2) && relevant.contains(&4));
        assert!(!relevant.contains(&3));
    }

    #[test]
    fn test_global_transform_chains_parents() {
        let scene = fixtures::skinned_scene();
        let head = scene.global_transform(3);
        assert!((head.w_axis.truncate() - Vec3::Y).length() < 1e-6);
    }
}
