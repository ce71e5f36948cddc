//! Two-stage isosurface extraction for one chunk.

use std::sync::Arc;

use glam::Vec3;

use crate::compute::{ComputeBackend, sanitize_count, triangle_capacity};
use crate::core::types::Result;
use crate::math::Aabb;
use crate::voxel::chunk::Chunk;

/// Outcome of one extraction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExtractReport {
    /// Triangles now in the chunk's mesh
    pub triangle_count: u32,
    /// Triangles the triangulate stage tried to append
    pub emitted: u32,
    /// `emitted` exceeded the accumulator capacity; the excess was dropped
    pub overflowed: bool,
}

/// Runs triangulate then compact on a chunk's density field.
pub struct IsosurfaceExtractor<B: ComputeBackend> {
    backend: Arc<B>,
    iso_level: f32,
}

impl<B: ComputeBackend> IsosurfaceExtractor<B> {
    pub fn new(backend: Arc<B>, iso_level: f32) -> Self {
        Self { backend, iso_level }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn iso_level(&self) -> f32 {
        self.iso_level
    }

    /// Rebuild the chunk's mesh from its density field.
    ///
    /// Sequence: counter reset, triangulate, counter readback, compact
    /// (skipped for zero triangles), bounds, counter reset. The mesh is only
    /// valid once this returns `Ok`.
    pub fn extract(&self, chunk: &mut Chunk<B::ChunkResources>) -> Result<ExtractReport> {
        let n = chunk.chunk_size();
        let index = chunk.index();
        let backend = &self.backend;

        let (field, geometry, res) = chunk.parts_mut(|| backend.create_chunk_resources(n))?;

        backend.reset_triangle_counter(res)?;
        let raw = backend.triangulate(res, field, self.iso_level)?;
        let count = sanitize_count(raw, triangle_capacity(n), "triangle accumulator");

        if count.recorded == 0 {
            geometry.clear();
        } else {
            backend.compact(res, count.recorded, geometry)?;
        }

        let half = n as f32 * 0.5;
        geometry.set_bounds(Aabb::from_center_half_extent(Vec3::splat(half), Vec3::splat(half)));
        backend.reset_triangle_counter(res)?;

        chunk.mark_regenerated();
        log::debug!(
            "Remeshed chunk ({}, {}, {}): {} triangles on {}",
            index.x, index.y, index.z, count.recorded, backend.name()
        );

        Ok(ExtractReport {
            triangle_count: count.recorded,
            emitted: count.raw,
            overflowed: count.overflowed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::CpuBackend;
    use crate::voxel::chunk::ChunkIndex;

    fn chunk(n: u32) -> Chunk<<CpuBackend as ComputeBackend>::ChunkResources> {
        Chunk::new(ChunkIndex::new(0, 0, 0), Vec3::ZERO, n, 1.0)
    }

    fn extractor() -> IsosurfaceExtractor<CpuBackend> {
        IsosurfaceExtractor::new(Arc::new(CpuBackend::new()), 0.5)
    }

    fn assert_layout(chunk: &Chunk<<CpuBackend as ComputeBackend>::ChunkResources>, report: &ExtractReport) {
        let geometry = chunk.geometry();
        let t = report.triangle_count as usize;
        assert_eq!(geometry.triangle_count(), t);
        assert_eq!(geometry.indices().len(), 3 * t);
        assert_eq!(geometry.vertices().len(), 3 * t);
    }

    #[test]
    fn test_uniform_below_iso_is_empty() {
        let extractor = extractor();
        let mut chunk = chunk(8);
        chunk.density_mut().fill_with(|_| 0.2);
        let report = extractor.extract(&mut chunk).unwrap();
        assert_eq!(report.triangle_count, 0);
        assert!(chunk.geometry().is_empty());
        assert_layout(&chunk, &report);
        assert_eq!(chunk.generation(), 1);
    }

    #[test]
    fn test_single_raised_voxel() {
        let extractor = extractor();
        let mut chunk = chunk(8);
        chunk.density_mut().set(4, 4, 4, 1.0);
        let report = extractor.extract(&mut chunk).unwrap();
        assert!(report.triangle_count > 0 && report.triangle_count <= 12);
        assert!(!report.overflowed);
        assert_layout(&chunk, &report);
    }

    #[test]
    fn test_bounds_are_chunk_cube() {
        let extractor = extractor();
        let mut chunk = chunk(8);
        extractor.extract(&mut chunk).unwrap();
        let bounds = chunk.geometry().bounds();
        assert_eq!(bounds.min, Vec3::ZERO);
        assert_eq!(bounds.max, Vec3::splat(8.0));
        assert_eq!(bounds.center(), Vec3::splat(4.0));
    }

    #[test]
    fn test_extract_is_idempotent() {
        let extractor = extractor();
        let mut chunk = chunk(12);
        chunk.density_mut().fill_with(|p| {
            let d = (p.as_vec3() - Vec3::splat(6.0)).length();
            (1.0 - d / 8.0).clamp(0.0, 1.0)
        });

        let first = extractor.extract(&mut chunk).unwrap();
        let (v1, i1) = chunk.geometry().as_bytes();
        let (v1, i1) = (v1.to_vec(), i1.to_vec());

        let second = extractor.extract(&mut chunk).unwrap();
        let (v2, i2) = chunk.geometry().as_bytes();
        assert_eq!(first, second);
        assert!(first.triangle_count > 0);
        assert_eq!(v1, v2);
        assert_eq!(i1, i2);
        assert_layout(&chunk, &second);
    }

    #[test]
    fn test_counter_reset_after_extract() {
        let extractor = extractor();
        let mut chunk = chunk(6);
        chunk.density_mut().set(3, 3, 3, 1.0);
        extractor.extract(&mut chunk).unwrap();
        assert_eq!(chunk.resources().unwrap().counter(), 0);
    }

    #[test]
    fn test_mesh_stays_inside_chunk() {
        let extractor = extractor();
        let mut chunk = chunk(8);
        chunk.density_mut().fill_with(|p| if (p.x + p.y + p.z) % 3 == 0 { 1.0 } else { 0.0 });
        let report = extractor.extract(&mut chunk).unwrap();
        assert!(report.triangle_count > 0);
        let bounds = chunk.geometry().bounds();
        for v in chunk.geometry().vertices() {
            assert!(bounds.contains_point(v.position));
        }
    }
}
