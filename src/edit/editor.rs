//! Carve/fill over the chunk grid with synchronous remeshing.

use std::sync::Arc;

use glam::Vec3;

use crate::compute::ComputeBackend;
use crate::core::error::Error;
use crate::core::types::Result;
use crate::edit::brush::{BrushDispatch, BrushKind};
use crate::mesh::IsosurfaceExtractor;
use crate::voxel::border::sync_chunks;
use crate::voxel::chunk::{ChunkId, ChunkIndex};
use crate::voxel::grid::ChunkGrid;

/// What one edit touched.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EditReport {
    /// Chunks whose density was mutated and which were remeshed
    pub edited: Vec<ChunkIndex>,
    /// Chunks whose box touches the sphere but whose clipped region held no
    /// sample; left untouched
    pub skipped: Vec<ChunkIndex>,
    /// Triangles across the remeshed chunks
    pub triangles: u32,
    /// Some remesh overflowed its accumulator
    pub overflowed: bool,
}

/// Applies sphere brushes to every affected chunk, then remeshes them.
pub struct TerrainEditor<B: ComputeBackend> {
    extractor: IsosurfaceExtractor<B>,
}

impl<B: ComputeBackend> TerrainEditor<B> {
    pub fn new(backend: Arc<B>, iso_level: f32) -> Self {
        Self {
            extractor: IsosurfaceExtractor::new(backend, iso_level),
        }
    }

    pub fn extractor(&self) -> &IsosurfaceExtractor<B> {
        &self.extractor
    }

    pub fn carve(
        &self,
        grid: &mut ChunkGrid<B::ChunkResources>,
        center: Vec3,
        radius: f32,
        strength: f32,
    ) -> Result<EditReport> {
        self.apply(grid, BrushKind::Carve, center, radius, strength)
    }

    pub fn fill(
        &self,
        grid: &mut ChunkGrid<B::ChunkResources>,
        center: Vec3,
        radius: f32,
        strength: f32,
    ) -> Result<EditReport> {
        self.apply(grid, BrushKind::Fill, center, radius, strength)
    }

    /// Edit every chunk whose box intersects the sphere (world units).
    ///
    /// Each affected chunk gets its own clipped dispatch. Once all density
    /// mutations are done, shared border samples of the edited chunks are
    /// resynced and each edited chunk is remeshed before returning.
    pub fn apply(
        &self,
        grid: &mut ChunkGrid<B::ChunkResources>,
        kind: BrushKind,
        center: Vec3,
        radius: f32,
        strength: f32,
    ) -> Result<EditReport> {
        if !center.is_finite() {
            return Err(Error::InvalidArgument(format!("edit center {:?} is not finite", center)));
        }
        if !(radius.is_finite() && radius > 0.0) {
            return Err(Error::InvalidArgument(format!("edit radius must be positive, got {}", radius)));
        }
        if !(strength.is_finite() && strength >= 0.0) {
            return Err(Error::InvalidArgument(format!("edit strength must be non-negative, got {}", strength)));
        }

        let backend = self.extractor.backend();
        let mut report = EditReport::default();
        let mut edited: Vec<ChunkId> = Vec::new();

        for index in grid.chunks_intersecting(center, radius) {
            let Some(id) = grid.id(index) else {
                continue;
            };
            let chunk = grid.chunk_mut(id);
            let n = chunk.chunk_size();
            let local_center = chunk.world_to_local(center);
            let local_radius = radius / chunk.scale();

            let Some(dispatch) = BrushDispatch::for_chunk(kind, local_center, local_radius, strength, n) else {
                log::trace!("{:?} skips chunk {:?}: clipped region is empty", kind, index);
                report.skipped.push(index);
                continue;
            };

            let (field, _, res) = chunk.parts_mut(|| backend.create_chunk_resources(n))?;
            backend.apply_brush(res, field, &dispatch)?;
            edited.push(id);
        }

        sync_chunks(grid, &edited);

        for id in edited {
            let chunk = grid.chunk_mut(id);
            let extract = self.extractor.extract(chunk)?;
            report.edited.push(chunk.index());
            report.triangles += extract.triangle_count;
            report.overflowed |= extract.overflowed;
        }

        log::debug!(
            "{:?} at {:?} r={} s={}: {} chunks edited, {} skipped",
            kind, center, radius, strength, report.edited.len(), report.skipped.len()
        );
        Ok(report)
    }
}
