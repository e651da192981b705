//! Animation clip import
//!
//! Converts scene animations into runtime clips: key times in seconds,
//! channels limited to nodes that can move a mesh, and the nodes carrying
//! root motion.

use crate::error::CompileResult;
use crate::scene::{ImportScene, SceneAnimation, SceneChannel};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::Path;
use void_asset::{atomic_write_bincode, RootMotion};

/// Keyframe with time in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Key<T> {
    pub time: f32,
    pub value: T,
}

/// Keys animating one node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnimationChannel {
    pub node_name: String,
    /// Depth-first index of the node in the mesh hierarchy
    pub node_index: usize,
    pub position_keys: Vec<Key<[f32; 3]>>,
    /// Quaternions as x, y, z, w
    pub rotation_keys: Vec<Key<[f32; 4]>>,
    pub scaling_keys: Vec<Key<[f32; 3]>>,
}

/// Node carrying root motion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootMotionNode {
    pub name: String,
    pub index: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RootMotionParams {
    pub keep_position_y: bool,
    pub keep_position_xz: bool,
    pub keep_rotation: bool,
    pub keep_in_place: bool,
    pub position_node: Option<RootMotionNode>,
    pub rotation_node: Option<RootMotionNode>,
}

impl RootMotionParams {
    /// Root motion is extracted unless every component is kept
    pub fn applies_root_motion(&self) -> bool {
        !self.keep_position_y || !self.keep_position_xz || !self.keep_rotation
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationClip {
    pub name: String,
    /// Seconds
    pub duration: f32,
    pub channels: Vec<AnimationChannel>,
    pub root_motion: RootMotionParams,
}

/// Copy the importer's root motion flags onto a clip
pub fn apply_root_motion_flags(clip: &mut AnimationClip, settings: &RootMotion) {
    clip.root_motion.keep_position_y = settings.keep_position_y;
    clip.root_motion.keep_position_xz = settings.keep_position_xz;
    clip.root_motion.keep_rotation = settings.keep_rotation;
    clip.root_motion.keep_in_place = settings.keep_in_place;
}

/// Which key track a root motion search looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelRequirement {
    Translation,
    Rotation,
}

/// Shallowest node animated by more than one key of the given kind
pub fn find_root_motion_node(
    scene: &ImportScene,
    animation: &SceneAnimation,
    requirement: ChannelRequirement,
) -> Option<usize> {
    if scene.nodes.is_empty() {
        return None;
    }

    let animated = |node: usize| {
        animation.channel_for(node).map_or(false, |channel| match requirement {
            ChannelRequirement::Translation => channel.positions.len() > 1,
            ChannelRequirement::Rotation => channel.rotations.len() > 1,
        })
    };

    let mut queue = VecDeque::from([scene.root]);
    while let Some(node) = queue.pop_front() {
        if animated(node) {
            return Some(node);
        }
        if let Some(n) = scene.nodes.get(node) {
            queue.extend(n.children.iter().copied());
        }
    }
    None
}

/// Builds runtime clips from a scene's animations
pub struct ClipImporter<'a> {
    scene: &'a ImportScene,
    file: &'a str,
    default_ticks_per_second: f64,
    dfs: HashMap<usize, usize>,
}

impl<'a> ClipImporter<'a> {
    pub fn new(scene: &'a ImportScene, file: &'a str, default_ticks_per_second: f64) -> Self {
        Self {
            scene,
            file,
            default_ticks_per_second,
            dfs: scene.dfs_indices(),
        }
    }

    pub fn run(&self) -> Vec<AnimationClip> {
        self.scene.animations.iter().map(|a| self.import(a)).collect()
    }

    /// Convert one animation
    pub fn import(&self, animation: &SceneAnimation) -> AnimationClip {
        let name = format!("{}_{}", self.file, animation.name.replace('.', "_"));
        let ticks_per_second = if animation.ticks_per_second < 0.001 {
            self.default_ticks_per_second
        } else {
            animation.ticks_per_second
        };
        let seconds = |ticks: f64| (ticks / ticks_per_second) as f32;

        let relevant = self.scene.skeleton_relevant_nodes();
        let mut channels: Vec<AnimationChannel> = Vec::with_capacity(animation.channels.len());
        let mut skipped = 0usize;
        let mut needs_sort = false;

        for channel in &animation.channels {
            if !relevant.contains(&channel.node) {
                skipped += 1;
                continue;
            }
            let converted = self.convert_channel(channel, &seconds);
            if let Some(previous) = channels.last() {
                needs_sort |= converted.node_index < previous.node_index;
            }
            channels.push(converted);
        }

        if needs_sort {
            channels.sort_by_key(|c| c.node_index);
        }

        let root_motion = RootMotionParams {
            position_node: self.root_motion_node(animation, ChannelRequirement::Translation),
            rotation_node: self.root_motion_node(animation, ChannelRequirement::Rotation),
            ..Default::default()
        };

        log::trace!("Animation {} discarded {} non relevant node keys", name, skipped);

        AnimationClip {
            name,
            duration: seconds(animation.duration),
            channels,
            root_motion,
        }
    }

    fn convert_channel(&self, channel: &SceneChannel, seconds: &impl Fn(f64) -> f32) -> AnimationChannel {
        AnimationChannel {
            node_name: self.node_name(channel.node),
            node_index: self.dfs.get(&channel.node).copied().unwrap_or_default(),
            position_keys: channel
                .positions
                .iter()
                .map(|k| Key {
                    time: seconds(k.time),
                    value: k.value.to_array(),
                })
                .collect(),
            rotation_keys: channel
                .rotations
                .iter()
                .map(|k| Key {
                    time: seconds(k.time),
                    value: k.value.to_array(),
                })
                .collect(),
            scaling_keys: channel
                .scales
                .iter()
                .map(|k| Key {
                    time: seconds(k.time),
                    value: k.value.to_array(),
                })
                .collect(),
        }
    }

    fn root_motion_node(&self, animation: &SceneAnimation, requirement: ChannelRequirement) -> Option<RootMotionNode> {
        find_root_motion_node(self.scene, animation, requirement).map(|node| RootMotionNode {
            name: self.node_name(node),
            index: self.dfs.get(&node).copied().unwrap_or_default(),
        })
    }

    fn node_name(&self, node: usize) -> String {
        self.scene.nodes.get(node).map(|n| n.name.clone()).unwrap_or_default()
    }
}

/// Compile a JSON clip into its runtime binary with the importer's flags
pub fn compile_animation_clip(source: &Path, output: &Path, settings: &RootMotion) -> CompileResult<()> {
    let text = fs::read_to_string(source)?;
    let mut clip: AnimationClip = serde_json::from_str(&text)?;
    apply_root_motion_flags(&mut clip, settings);
    atomic_write_bincode(output, &clip)?;
    Ok(())
}
