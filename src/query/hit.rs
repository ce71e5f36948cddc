//! Query results.

use glam::Vec3;

use crate::voxel::chunk::ChunkIndex;

/// Nearest surface contact of a query, in world space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Hit {
    pub position: Vec3,
    pub normal: Vec3,
    /// Distance from the sphere centre or ray origin
    pub distance: f32,
    /// Chunk whose mesh produced the contact
    pub chunk: ChunkIndex,
}

/// Result of a query. A miss (`hit == None`) is a normal outcome.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct QueryOutcome {
    pub hit: Option<Hit>,
    /// Candidates read back across all dispatches
    pub candidates: u32,
    /// Some dispatch recorded more candidates than it could store
    pub overflowed: bool,
    /// Chunk queries dispatched
    pub dispatches: u32,
}

impl QueryOutcome {
    pub fn miss() -> Self {
        Self::default()
    }

    pub fn is_hit(&self) -> bool {
        self.hit.is_some()
    }

    /// Fold another chunk's outcome in, keeping the nearer hit.
    pub fn merge(&mut self, other: QueryOutcome) {
        self.candidates += other.candidates;
        self.overflowed |= other.overflowed;
        self.dispatches += other.dispatches;
        self.hit = match (self.hit, other.hit) {
            (Some(a), Some(b)) => Some(if b.distance < a.distance { b } else { a }),
            (a, b) => a.or(b),
        };
    }
}
