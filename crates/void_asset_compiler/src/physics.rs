//! Physics material documents

use serde::{Deserialize, Serialize};

/// How two colliders' coefficients combine on contact
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CombineRule {
    #[default]
    Average,
    Minimum,
    Multiply,
    Maximum,
}

/// Surface response of a collider
///
/// Authored as JSON (`.phm`), compiled to bincode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsMaterial {
    pub friction: f32,
    pub restitution: f32,
    /// kg/m³
    pub density: f32,
    pub friction_combine: CombineRule,
    pub restitution_combine: CombineRule,
}

impl Default for PhysicsMaterial {
    fn default() -> Self {
        Self {
            friction: 0.5,
            restitution: 0.0,
            density: 1.0,
            friction_combine: CombineRule::Average,
            restitution_combine: CombineRule::Average,
        }
    }
}

impl PhysicsMaterial {
    /// Clamp authored values into their valid ranges
    pub fn sanitized(self) -> Self {
        Self {
            friction: self.friction.max(0.0),
            restitution: self.restitution.clamp(0.0, 1.0),
            density: self.density.max(0.001),
            ..self
        }
    }
}
