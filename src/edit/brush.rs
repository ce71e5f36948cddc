//! Carve/fill kernels: a sphere SDF with a one-voxel linear falloff.

use glam::{UVec3, Vec3};

use crate::edit::region::EditRegion;

/// Direction of a density edit
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BrushKind {
    /// Remove material (density decreases, floored at 0)
    Carve,
    /// Add material (density increases, capped at 1)
    Fill,
}

impl BrushKind {
    pub fn sign(self) -> f32 {
        match self {
            BrushKind::Carve => -1.0,
            BrushKind::Fill => 1.0,
        }
    }

    /// Kernel entry point in `brush.wgsl`.
    pub fn entry_point(self) -> &'static str {
        match self {
            BrushKind::Carve => "carve",
            BrushKind::Fill => "fill",
        }
    }

    pub fn as_u32(self) -> u32 {
        match self {
            BrushKind::Carve => 0,
            BrushKind::Fill => 1,
        }
    }
}

/// One brush application on one chunk, in chunk-local voxel units.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BrushDispatch {
    pub kind: BrushKind,
    pub center: Vec3,
    pub radius: f32,
    pub strength: f32,
    pub region: EditRegion,
}

impl BrushDispatch {
    /// Build the dispatch for a chunk, or `None` when the clipped region is
    /// empty.
    pub fn for_chunk(
        kind: BrushKind,
        center: Vec3,
        radius: f32,
        strength: f32,
        chunk_size: u32,
    ) -> Option<Self> {
        let region = EditRegion::clip(center, radius, chunk_size)?;
        Some(Self { kind, center, radius, strength, region })
    }

    /// Falloff weight at sample `p`: 1 well inside the sphere, 0 outside,
    /// linear across the last voxel.
    #[inline]
    pub fn weight(&self, p: UVec3) -> f32 {
        (self.radius - p.as_vec3().distance(self.center)).clamp(0.0, 1.0)
    }

    /// New density of sample `p` given its current value.
    #[inline]
    pub fn apply(&self, value: f32, p: UVec3) -> f32 {
        (value + self.kind.sign() * self.strength * self.weight(p)).clamp(0.0, 1.0)
    }
}
