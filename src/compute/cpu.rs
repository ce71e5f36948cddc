//! Rayon implementation of the terrain kernels.
//!
//! Work items run in parallel; their outputs are appended in work-item
//! order, so every kernel is deterministic.

use glam::{UVec3, Vec3};
use rayon::prelude::*;

use crate::compute::{ComputeBackend, DispatchStats, QUERY_CANDIDATE_CAPACITY, triangle_capacity};
use crate::core::types::Result;
use crate::edit::brush::BrushDispatch;
use crate::mesh::polygonise::polygonise_cell;
use crate::mesh::{GeometryBuffers, Vertex};
use crate::query::candidate::{Candidate, ray_candidate, sphere_candidate};
use crate::voxel::density::DensityField;

/// Per-chunk state of the CPU pipeline.
#[derive(Debug, Default)]
pub struct CpuChunkResources {
    capacity: u32,
    counter: u32,
    accumulator: Vec<[Vertex; 3]>,
}

impl CpuChunkResources {
    pub fn counter(&self) -> u32 {
        self.counter
    }
}

/// Candidate buffer of one query caller.
#[derive(Debug)]
pub struct CpuQueryScratch {
    counter: u32,
    candidates: Vec<Candidate>,
}

/// Data-parallel CPU backend.
#[derive(Debug, Default)]
pub struct CpuBackend {
    stats: DispatchStats,
}

impl CpuBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `items` to a bounded buffer. `counter` keeps the attempted
    /// total, like a device-side atomic would.
    fn append<T>(buffer: &mut Vec<T>, counter: &mut u32, capacity: u32, items: Vec<T>) {
        let room = (capacity as usize).saturating_sub(buffer.len());
        *counter = counter.saturating_add(items.len() as u32);
        buffer.extend(items.into_iter().take(room));
    }
}

impl ComputeBackend for CpuBackend {
    type ChunkResources = CpuChunkResources;
    type QueryScratch = CpuQueryScratch;

    fn name(&self) -> &'static str {
        "cpu"
    }

    fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    fn create_chunk_resources(&self, chunk_size: u32) -> Result<CpuChunkResources> {
        Ok(CpuChunkResources {
            capacity: triangle_capacity(chunk_size),
            counter: 0,
            accumulator: Vec::new(),
        })
    }

    fn create_query_scratch(&self) -> Result<CpuQueryScratch> {
        Ok(CpuQueryScratch {
            counter: 0,
            candidates: Vec::with_capacity(QUERY_CANDIDATE_CAPACITY as usize),
        })
    }

    fn reset_triangle_counter(&self, res: &mut CpuChunkResources) -> Result<()> {
        res.counter = 0;
        res.accumulator = Vec::new();
        Ok(())
    }

    fn triangulate(&self, res: &mut CpuChunkResources, field: &DensityField, iso_level: f32) -> Result<u32> {
        self.stats.record_dispatch();
        let n = field.chunk_size();
        let cells = (n * n * n) as usize;

        let emitted: Vec<[Vertex; 3]> = (0..cells)
            .into_par_iter()
            .flat_map_iter(|i| {
                let i = i as u32;
                let cell = UVec3::new(i % n, (i / n) % n, i / (n * n));
                polygonise_cell(field, cell, iso_level)
            })
            .collect();

        let capacity = res.capacity;
        Self::append(&mut res.accumulator, &mut res.counter, capacity, emitted);
        self.stats.record_readback();
        log::trace!("cpu triangulate: {} cells, counter {}", cells, res.counter);
        Ok(res.counter)
    }

    fn compact(&self, res: &mut CpuChunkResources, count: u32, out: &mut GeometryBuffers) -> Result<()> {
        self.stats.record_dispatch();
        let count = (count as usize).min(res.accumulator.len());
        out.set_triangles(&res.accumulator[..count]);
        self.stats.record_readback();
        Ok(())
    }

    fn apply_brush(
        &self,
        _res: &mut CpuChunkResources,
        field: &mut DensityField,
        brush: &BrushDispatch,
    ) -> Result<()> {
        self.stats.record_dispatch();
        let dim = field.dim();
        let region = brush.region;
        let (start, end) = (region.start, region.end());

        field
            .samples_mut()
            .par_chunks_mut((dim * dim) as usize)
            .enumerate()
            .filter(|(z, _)| (start.z..end.z).contains(&(*z as u32)))
            .for_each(|(z, slab)| {
                for y in start.y..end.y {
                    for x in start.x..end.x {
                        let slot = (x + y * dim) as usize;
                        slab[slot] = brush.apply(slab[slot], UVec3::new(x, y, z as u32));
                    }
                }
            });

        self.stats.record_readback();
        Ok(())
    }

    fn dispatch_sphere_query(
        &self,
        scratch: &mut CpuQueryScratch,
        _res: &CpuChunkResources,
        geometry: &GeometryBuffers,
        center: Vec3,
        radius: f32,
    ) -> Result<u32> {
        self.stats.record_dispatch();
        let found: Vec<Candidate> = (0..geometry.triangle_count())
            .into_par_iter()
            .filter_map(|i| sphere_candidate(geometry, i, center, radius))
            .collect();

        scratch.counter = 0;
        scratch.candidates.clear();
        Self::append(&mut scratch.candidates, &mut scratch.counter, QUERY_CANDIDATE_CAPACITY, found);
        self.stats.record_readback();
        Ok(scratch.counter)
    }

    fn dispatch_ray_query(
        &self,
        scratch: &mut CpuQueryScratch,
        _res: &CpuChunkResources,
        geometry: &GeometryBuffers,
        origin: Vec3,
        direction: Vec3,
    ) -> Result<u32> {
        self.stats.record_dispatch();
        let found: Vec<Candidate> = (0..geometry.triangle_count())
            .into_par_iter()
            .filter_map(|i| ray_candidate(geometry, i, origin, direction))
            .collect();

        scratch.counter = 0;
        scratch.candidates.clear();
        Self::append(&mut scratch.candidates, &mut scratch.counter, QUERY_CANDIDATE_CAPACITY, found);
        self.stats.record_readback();
        Ok(scratch.counter)
    }

    fn read_candidates(&self, scratch: &mut CpuQueryScratch, count: u32) -> Result<Vec<Candidate>> {
        self.stats.record_readback();
        let count = (count as usize).min(scratch.candidates.len());
        Ok(scratch.candidates[..count].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edit::brush::BrushKind;

    #[test]
    fn test_append_tracks_overflow() {
        let mut buffer = Vec::new();
        let mut counter = 0;
        CpuBackend::append(&mut buffer, &mut counter, 3, vec![1, 2]);
        CpuBackend::append(&mut buffer, &mut counter, 3, vec![3, 4, 5]);
        assert_eq!(buffer, vec![1, 2, 3]);
        assert_eq!(counter, 5);
    }

    #[test]
    fn test_triangulate_counts_and_resets() {
        let backend = CpuBackend::new();
        let mut res = backend.create_chunk_resources(4).unwrap();
        let mut field = DensityField::new(4);
        field.set(2, 2, 2, 1.0);

        let raw = backend.triangulate(&mut res, &field, 0.5).unwrap();
        assert_eq!(raw, 8);
        assert_eq!(res.counter(), 8);

        backend.reset_triangle_counter(&mut res).unwrap();
        assert_eq!(res.counter(), 0);
        assert!(res.accumulator.is_empty());
    }

    #[test]
    fn test_apply_brush_touches_region_only() {
        let backend = CpuBackend::new();
        let mut res = backend.create_chunk_resources(8).unwrap();
        let mut field = DensityField::filled(8, 1.0);
        let brush = BrushDispatch::for_chunk(BrushKind::Carve, Vec3::splat(4.0), 2.0, 1.0, 8).unwrap();

        backend.apply_brush(&mut res, &mut field, &brush).unwrap();
        assert_eq!(field.get(4, 4, 4), 0.0);
        for slot in 0..field.len() {
            let p = field.coord(slot);
            if !brush.region.contains(p) {
                assert_eq!(field.samples()[slot], 1.0, "sample {:?} changed", p);
            }
        }
        assert_eq!(backend.stats().dispatches(), 1);
    }
}
