//! Sphere/mesh and ray/mesh nearest-hit search against one chunk.
//!
//! Kernels record at most [`QUERY_CANDIDATE_CAPACITY`] candidates per
//! dispatch. When more triangles qualify, the result is the nearest of the
//! recorded ones and the outcome is flagged `overflowed`. On the CPU backend
//! the recorded set is the first candidates in triangle order, so the result
//! is deterministic.

use std::sync::Arc;

use glam::Vec3;

use crate::compute::{ComputeBackend, QUERY_CANDIDATE_CAPACITY, sanitize_count};
use crate::core::types::Result;
use crate::query::candidate::Candidate;
use crate::query::hit::{Hit, QueryOutcome};
use crate::voxel::chunk::Chunk;

/// Candidate nearest to `point`. Ties keep the earliest.
pub fn nearest_to(candidates: &[Candidate], point: Vec3) -> Option<Candidate> {
    candidates.iter().copied().fold(None, |best: Option<Candidate>, c| match best {
        Some(b) if b.position.distance_squared(point) <= c.position.distance_squared(point) => Some(b),
        _ => Some(c),
    })
}

/// Drop ray candidates behind the origin or beyond `|direction|`.
pub fn filter_ray_candidates(candidates: &[Candidate], origin: Vec3, direction: Vec3) -> Vec<Candidate> {
    let forward = direction.normalize_or_zero();
    let max_distance = direction.length();
    candidates
        .iter()
        .copied()
        .filter(|c| {
            let to = c.position - origin;
            to.dot(forward) >= 0.0 && to.length() <= max_distance
        })
        .collect()
}

/// Per-chunk query runner owning one candidate buffer.
pub struct GeometryQuery<B: ComputeBackend> {
    backend: Arc<B>,
    scratch: B::QueryScratch,
}

impl<B: ComputeBackend> GeometryQuery<B> {
    pub fn new(backend: Arc<B>) -> Result<Self> {
        let scratch = backend.create_query_scratch()?;
        Ok(Self { backend, scratch })
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Nearest point of the chunk's mesh within `radius` of `center` (world).
    pub fn sphere_intersect_mesh(
        &mut self,
        chunk: &Chunk<B::ChunkResources>,
        center: Vec3,
        radius: f32,
    ) -> Result<QueryOutcome> {
        let Some(res) = chunk.resources() else {
            return Ok(QueryOutcome::miss());
        };
        if chunk.geometry().is_empty() {
            return Ok(QueryOutcome::miss());
        }

        let local_center = chunk.world_to_local(center);
        let local_radius = radius / chunk.scale();
        let raw = self.backend.dispatch_sphere_query(
            &mut self.scratch,
            res,
            chunk.geometry(),
            local_center,
            local_radius,
        )?;
        let count = sanitize_count(raw, QUERY_CANDIDATE_CAPACITY, "sphere query candidates");
        let candidates = self.backend.read_candidates(&mut self.scratch, count.recorded)?;

        let hit = nearest_to(&candidates, local_center).map(|c| {
            let position = chunk.local_to_world(c.position);
            Hit {
                position,
                normal: c.normal,
                distance: position.distance(center),
                chunk: chunk.index(),
            }
        });

        Ok(QueryOutcome {
            hit,
            candidates: count.recorded,
            overflowed: count.overflowed,
            dispatches: 1,
        })
    }

    /// Nearest intersection of the segment `origin + s * direction`,
    /// `s in [0, 1]`, with the chunk's mesh (world units).
    pub fn ray_intersect_mesh(
        &mut self,
        chunk: &Chunk<B::ChunkResources>,
        origin: Vec3,
        direction: Vec3,
    ) -> Result<QueryOutcome> {
        let Some(res) = chunk.resources() else {
            return Ok(QueryOutcome::miss());
        };
        if chunk.geometry().is_empty() {
            return Ok(QueryOutcome::miss());
        }

        let local_origin = chunk.world_to_local(origin);
        let local_direction = direction / chunk.scale();
        let raw = self.backend.dispatch_ray_query(
            &mut self.scratch,
            res,
            chunk.geometry(),
            local_origin,
            local_direction,
        )?;
        let count = sanitize_count(raw, QUERY_CANDIDATE_CAPACITY, "ray query candidates");
        let candidates = self.backend.read_candidates(&mut self.scratch, count.recorded)?;

        let survivors = filter_ray_candidates(&candidates, local_origin, local_direction);
        let hit = nearest_to(&survivors, local_origin).map(|c| {
            let position = chunk.local_to_world(c.position);
            Hit {
                position,
                normal: c.normal,
                distance: position.distance(origin),
                chunk: chunk.index(),
            }
        });

        Ok(QueryOutcome {
            hit,
            candidates: count.recorded,
            overflowed: count.overflowed,
            dispatches: 1,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::CpuBackend;
    use crate::mesh::{IsosurfaceExtractor, Vertex};
    use crate::voxel::chunk::ChunkIndex;

    type CpuChunk = Chunk<<CpuBackend as ComputeBackend>::ChunkResources>;

    fn candidate(x: f32) -> Candidate {
        Candidate { position: Vec3::new(x, 0.0, 0.0), normal: Vec3::Y }
    }

    /// Chunk with a horizontal density step: solid below local y = 4.5.
    fn slab_chunk(backend: &Arc<CpuBackend>, origin: Vec3, scale: f32) -> CpuChunk {
        let mut chunk = Chunk::new(ChunkIndex::new(0, 0, 0), origin, 8, scale);
        chunk.density_mut().fill_with(|p| if p.y <= 4 { 1.0 } else { 0.0 });
        IsosurfaceExtractor::new(backend.clone(), 0.5).extract(&mut chunk).unwrap();
        chunk
    }

    #[test]
    fn test_nearest_to() {
        let c = [candidate(5.0), candidate(-2.0), candidate(3.0)];
        assert_eq!(nearest_to(&c, Vec3::new(2.5, 0.0, 0.0)).unwrap().position.x, 3.0);
        assert!(nearest_to(&[], Vec3::ZERO).is_none());
        // Ties keep the first
        let tie = [candidate(1.0), candidate(-1.0)];
        assert_eq!(nearest_to(&tie, Vec3::ZERO).unwrap().position.x, 1.0);
    }

    #[test]
    fn test_filter_ray_candidates() {
        let c = [candidate(-1.0), candidate(2.0), candidate(4.0), candidate(6.0)];
        let kept = filter_ray_candidates(&c, Vec3::ZERO, Vec3::new(5.0, 0.0, 0.0));
        let xs: Vec<f32> = kept.iter().map(|c| c.position.x).collect();
        assert_eq!(xs, vec![2.0, 4.0]);
    }

    #[test]
    fn test_sphere_query_hits_slab() {
        let backend = Arc::new(CpuBackend::new());
        let chunk = slab_chunk(&backend, Vec3::new(10.0, 0.0, 0.0), 0.5);
        let mut query = GeometryQuery::new(backend).unwrap();

        // Surface at local y = 4.5 -> world y = 2.25
        let center = Vec3::new(12.0, 3.0, 2.0);
        let outcome = query.sphere_intersect_mesh(&chunk, center, 1.0).unwrap();
        let hit = outcome.hit.unwrap();
        assert!((hit.position - Vec3::new(12.0, 2.25, 2.0)).length() < 1e-4);
        assert!((hit.distance - 0.75).abs() < 1e-4);
        assert!((hit.normal - Vec3::Y).length() < 1e-4);
        assert_eq!(outcome.dispatches, 1);

        let outcome = query.sphere_intersect_mesh(&chunk, center, 0.5).unwrap();
        assert!(outcome.hit.is_none());
    }

    #[test]
    fn test_ray_query_respects_length_and_direction() {
        let backend = Arc::new(CpuBackend::new());
        let chunk = slab_chunk(&backend, Vec3::ZERO, 1.0);
        let mut query = GeometryQuery::new(backend).unwrap();

        let origin = Vec3::new(3.3, 7.0, 2.6);
        let hit = query
            .ray_intersect_mesh(&chunk, origin, Vec3::new(0.0, -5.0, 0.0))
            .unwrap()
            .hit
            .unwrap();
        assert!((hit.position.y - 4.5).abs() < 1e-4);
        assert!((hit.distance - 2.5).abs() < 1e-4);

        // Too short
        let short = query.ray_intersect_mesh(&chunk, origin, Vec3::new(0.0, -2.0, 0.0)).unwrap();
        assert!(short.hit.is_none());
        // Pointing away
        let away = query.ray_intersect_mesh(&chunk, origin, Vec3::new(0.0, 5.0, 0.0)).unwrap();
        assert!(away.hit.is_none());
    }

    #[test]
    fn test_empty_mesh_is_miss_without_dispatch() {
        let backend = Arc::new(CpuBackend::new());
        let mut chunk: CpuChunk = Chunk::new(ChunkIndex::new(0, 0, 0), Vec3::ZERO, 8, 1.0);
        IsosurfaceExtractor::new(backend.clone(), 0.5).extract(&mut chunk).unwrap();
        assert!(chunk.geometry().is_empty());

        let mut query = GeometryQuery::new(backend.clone()).unwrap();
        let before = backend.stats().dispatches();
        let outcome = query.sphere_intersect_mesh(&chunk, Vec3::splat(4.0), 100.0).unwrap();
        assert!(outcome.hit.is_none());
        assert_eq!(outcome.dispatches, 0);
        assert_eq!(backend.stats().dispatches(), before);
    }

    #[test]
    fn test_ray_over_capacity_is_deterministic() {
        // 60 stacked quads; a vertical ray crosses one triangle of each
        let backend = Arc::new(CpuBackend::new());
        let mut chunk: CpuChunk = Chunk::new(ChunkIndex::new(0, 0, 0), Vec3::ZERO, 8, 1.0);
        let mut triangles = Vec::new();
        for layer in 0..60 {
            let y = 0.1 * layer as f32;
            let v = |x: f32, z: f32| Vertex::new(Vec3::new(x, y, z), Vec3::Y);
            triangles.push([v(0.0, 0.0), v(8.0, 0.0), v(8.0, 8.0)]);
            triangles.push([v(0.0, 0.0), v(8.0, 8.0), v(0.0, 8.0)]);
        }
        chunk.parts_mut(|| backend.create_chunk_resources(8)).unwrap().1.set_triangles(&triangles);

        let mut query = GeometryQuery::new(backend).unwrap();
        // Downward ray from above the stack: true nearest layer is y = 5.9
        let origin = Vec3::new(3.0, 7.0, 5.0);
        let direction = Vec3::new(0.0, -7.5, 0.0);
        let first = query.ray_intersect_mesh(&chunk, origin, direction).unwrap();
        let second = query.ray_intersect_mesh(&chunk, origin, direction).unwrap();

        assert!(first.overflowed);
        assert_eq!(first.candidates, QUERY_CANDIDATE_CAPACITY);
        assert_eq!(first, second);
        // Only layers 0..50 are recorded, so layer 49 wins over the true nearest
        let hit = first.hit.unwrap();
        assert!((hit.position.y - 4.9).abs() < 1e-4);
    }

    #[test]
    fn test_sphere_over_capacity_is_deterministic() {
        // Same 60-layer stack; a large sphere reaches all 120 triangles
        let backend = Arc::new(CpuBackend::new());
        let mut chunk: CpuChunk = Chunk::new(ChunkIndex::new(0, 0, 0), Vec3::ZERO, 8, 1.0);
        let mut triangles = Vec::new();
        for layer in 0..60 {
            let y = 0.1 * layer as f32;
            let v = |x: f32, z: f32| Vertex::new(Vec3::new(x, y, z), Vec3::Y);
            triangles.push([v(0.0, 0.0), v(8.0, 0.0), v(8.0, 8.0)]);
            triangles.push([v(0.0, 0.0), v(8.0, 8.0), v(0.0, 8.0)]);
        }
        chunk.parts_mut(|| backend.create_chunk_resources(8)).unwrap().1.set_triangles(&triangles);

        let mut query = GeometryQuery::new(backend).unwrap();
        let center = Vec3::new(3.0, 7.0, 5.0);
        let first = query.sphere_intersect_mesh(&chunk, center, 10.0).unwrap();
        let second = query.sphere_intersect_mesh(&chunk, center, 10.0).unwrap();

        assert!(first.overflowed);
        assert_eq!(first.candidates, QUERY_CANDIDATE_CAPACITY);
        assert_eq!(first, second);
        // The first 50 triangles are layers 0..25; layer 24 is the nearest of them
        let hit = first.hit.unwrap();
        assert!((hit.position - Vec3::new(3.0, 2.4, 5.0)).length() < 1e-4);
        assert!((hit.distance - 4.6).abs() < 1e-4);
    }
}
