//! Regular 3-D grid of chunks: arena storage, world/chunk index mapping and
//! the sphere broad phase.

use glam::{IVec3, UVec3, Vec3};
use rayon::prelude::*;

use crate::core::config::TerrainConfig;
use crate::core::types::Result;
use crate::math::Aabb;
use crate::voxel::chunk::{Chunk, ChunkId, ChunkIndex};

/// Owns every chunk of the terrain in a flat arena, x-fastest.
pub struct ChunkGrid<R> {
    dims: UVec3,
    chunk_size: u32,
    scale: f32,
    step: f32,
    bounds: Aabb,
    chunks: Vec<Chunk<R>>,
}

impl<R> ChunkGrid<R> {
    /// Allocate every chunk with an empty density field and no mesh.
    pub fn new(config: &TerrainConfig) -> Result<Self> {
        config.validate()?;

        let dims = config.chunks;
        let step = config.step_size();
        let bounds = config.grid_bounds();

        let mut chunks = Vec::with_capacity(config.chunk_count());
        for z in 0..dims.z as i32 {
            for y in 0..dims.y as i32 {
                for x in 0..dims.x as i32 {
                    let index = ChunkIndex::new(x, y, z);
                    let origin = bounds.min + index.as_ivec3().as_vec3() * step;
                    chunks.push(Chunk::new(index, origin, config.chunk_size, config.chunk_scale));
                }
            }
        }

        log::info!(
            "Chunk grid {}x{}x{} ({} chunks, {} cells/axis, step {:.3})",
            dims.x, dims.y, dims.z, chunks.len(), config.chunk_size, step
        );

        Ok(Self {
            dims,
            chunk_size: config.chunk_size,
            scale: config.chunk_scale,
            step,
            bounds,
            chunks,
        })
    }

    /// Chunks per axis.
    pub fn dims(&self) -> UVec3 {
        self.dims
    }

    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn step_size(&self) -> f32 {
        self.step
    }

    /// World box `[min_corner, max_corner]` covered by the grid.
    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Linear remap of `pos` from the grid box onto `[0, dims]`, truncated.
    ///
    /// Only meaningful for positions inside [`Self::bounds`]; the result must
    /// pass [`Self::is_valid_index`] before it is used.
    pub fn world_to_chunk_index(&self, pos: Vec3) -> IVec3 {
        let t = (pos - self.bounds.min) / self.bounds.size();
        (t * self.dims.as_vec3()).as_ivec3()
    }

    pub fn is_valid_index(&self, index: IVec3) -> bool {
        index.cmpge(IVec3::ZERO).all() && index.cmplt(self.dims.as_ivec3()).all()
    }

    /// Chunk containing `pos`, if `pos` lies inside the grid.
    pub fn chunk_at(&self, pos: Vec3) -> Option<ChunkIndex> {
        if !self.bounds.contains_point(pos) {
            return None;
        }
        // The max face maps to `dims`; fold it into the last chunk.
        let index = self
            .world_to_chunk_index(pos)
            .min(self.dims.as_ivec3() - IVec3::ONE);
        self.is_valid_index(index).then(|| ChunkIndex::from(index))
    }

    /// Arena handle of a chunk index.
    pub fn id(&self, index: ChunkIndex) -> Option<ChunkId> {
        let v = index.as_ivec3();
        if !self.is_valid_index(v) {
            return None;
        }
        let d = self.dims.as_ivec3();
        Some(ChunkId((v.x + v.y * d.x + v.z * d.x * d.y) as usize))
    }

    /// World position of a chunk's local origin.
    pub fn chunk_origin(&self, index: ChunkIndex) -> Vec3 {
        self.bounds.min + index.as_ivec3().as_vec3() * self.step
    }

    /// The step-sized cell of the grid partition owned by `index`.
    pub fn cell_bounds(&self, index: ChunkIndex) -> Aabb {
        let min = self.chunk_origin(index);
        Aabb::new(min, min + Vec3::splat(self.step))
    }

    pub fn chunk(&self, id: ChunkId) -> &Chunk<R> {
        &self.chunks[id.0]
    }

    pub fn chunk_mut(&mut self, id: ChunkId) -> &mut Chunk<R> {
        &mut self.chunks[id.0]
    }

    pub fn get(&self, index: ChunkIndex) -> Option<&Chunk<R>> {
        self.id(index).map(|id| &self.chunks[id.0])
    }

    pub fn get_mut(&mut self, index: ChunkIndex) -> Option<&mut Chunk<R>> {
        self.id(index).map(move |id| &mut self.chunks[id.0])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Chunk<R>> {
        self.chunks.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Chunk<R>> {
        self.chunks.iter_mut()
    }

    /// Chunks whose world box (side `chunk_size` voxels from the origin)
    /// intersects the sphere, in arena order.
    pub fn chunks_intersecting(&self, center: Vec3, radius: f32) -> Vec<ChunkIndex> {
        if !(center.is_finite() && radius.is_finite() && radius >= 0.0) {
            return Vec::new();
        }

        // Chunk boxes overhang their step-sized cell, so widen the low side.
        let extent = self.chunk_size as f32 * self.scale;
        let lo = ((center - radius - extent - self.bounds.min) / self.step).floor().as_ivec3();
        let hi = ((center + radius - self.bounds.min) / self.step).floor().as_ivec3();
        let lo = lo.max(IVec3::ZERO);
        let hi = hi.min(self.dims.as_ivec3() - IVec3::ONE);

        let mut hits = Vec::new();
        for z in lo.z..=hi.z {
            for y in lo.y..=hi.y {
                for x in lo.x..=hi.x {
                    let index = ChunkIndex::new(x, y, z);
                    if let Some(id) = self.id(index) {
                        if self.chunks[id.0].world_bounds().intersects_sphere(center, radius) {
                            hits.push(index);
                        }
                    }
                }
            }
        }
        hits
    }

    /// Release every chunk's compute resources.
    pub fn release_all(&mut self) {
        for chunk in &mut self.chunks {
            chunk.release();
        }
    }
}

impl<R: Send> ChunkGrid<R> {
    /// Parallel mutable access; chunks are independent.
    pub fn par_iter_mut(&mut self) -> rayon::slice::IterMut<'_, Chunk<R>> {
        self.chunks.par_iter_mut()
    }
}
