//! Clipping an edit sphere to a chunk's editable samples.

use glam::{UVec3, Vec3};

/// Inclusive block of sample coordinates an edit dispatch covers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EditRegion {
    /// First sample on each axis
    pub start: UVec3,
    /// Samples per axis, all non-zero
    pub extent: UVec3,
}

impl EditRegion {
    /// Clip the sphere `(center, radius)` (chunk-local voxel units) to the
    /// chunk's editable samples `[0, chunk_size]`.
    ///
    /// Returns `None` when the clamped box is empty or holds no sample,
    /// in which case the chunk is neither edited nor remeshed.
    pub fn clip(center: Vec3, radius: f32, chunk_size: u32) -> Option<Self> {
        let limit = Vec3::splat(chunk_size as f32);
        let low = (center - Vec3::splat(radius)).clamp(Vec3::ZERO, limit);
        let high = (center + Vec3::splat(radius)).clamp(Vec3::ZERO, limit);
        if (high - low).cmple(Vec3::ZERO).any() {
            return None;
        }

        let first = low.ceil();
        let last = high.floor();
        if first.cmpgt(last).any() {
            return None;
        }

        let start = first.as_uvec3();
        Some(Self {
            start,
            extent: last.as_uvec3() - start + UVec3::ONE,
        })
    }

    /// One past the last sample on each axis.
    pub fn end(&self) -> UVec3 {
        self.start + self.extent
    }

    pub fn sample_count(&self) -> usize {
        (self.extent.x * self.extent.y * self.extent.z) as usize
    }

    pub fn contains(&self, p: UVec3) -> bool {
        p.cmpge(self.start).all() && p.cmplt(self.end()).all()
    }
}
