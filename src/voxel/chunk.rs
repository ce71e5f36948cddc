//! Chunk records: identity, density, derived mesh and compute resources.

use glam::{IVec3, Vec3};

use crate::math::Aabb;
use crate::mesh::GeometryBuffers;
use crate::voxel::density::DensityField;

/// Integer coordinate identifying a chunk in the grid
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkIndex {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl ChunkIndex {
    /// Create a new chunk index
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub fn as_ivec3(self) -> IVec3 {
        IVec3::new(self.x, self.y, self.z)
    }

    /// Index offset by `d` chunks.
    pub fn offset(self, d: IVec3) -> Self {
        Self::from(self.as_ivec3() + d)
    }
}

impl From<IVec3> for ChunkIndex {
    fn from(v: IVec3) -> Self {
        Self::new(v.x, v.y, v.z)
    }
}

/// Stable handle to a chunk slot in the grid's arena.
///
/// Handles are plain indices: copying one never touches the chunk's resources.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkId(pub(crate) usize);

impl ChunkId {
    pub fn slot(self) -> usize {
        self.0
    }
}

/// A cubic region of the world with its own density field and mesh.
///
/// `R` holds the compute backend's per-chunk resources. They are allocated on
/// the first remesh and released when the chunk is dropped. Chunks are not
/// `Clone`; they live in the grid's arena and are addressed by [`ChunkId`].
pub struct Chunk<R> {
    index: ChunkIndex,
    origin: Vec3,
    scale: f32,
    density: DensityField,
    geometry: GeometryBuffers,
    resources: Option<R>,
    /// Completed mesh regenerations
    generation: u64,
}

impl<R> Chunk<R> {
    /// Create a chunk with an empty density field and no mesh.
    pub fn new(index: ChunkIndex, origin: Vec3, chunk_size: u32, scale: f32) -> Self {
        Self {
            index,
            origin,
            scale,
            density: DensityField::new(chunk_size),
            geometry: GeometryBuffers::default(),
            resources: None,
            generation: 0,
        }
    }

    pub fn index(&self) -> ChunkIndex {
        self.index
    }

    /// World-space position of local point `(0, 0, 0)`.
    pub fn origin(&self) -> Vec3 {
        self.origin
    }

    /// World units per voxel.
    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn chunk_size(&self) -> u32 {
        self.density.chunk_size()
    }

    pub fn density(&self) -> &DensityField {
        &self.density
    }

    /// Direct access for generators. Callers must remesh afterwards.
    pub fn density_mut(&mut self) -> &mut DensityField {
        &mut self.density
    }

    pub fn geometry(&self) -> &GeometryBuffers {
        &self.geometry
    }

    pub fn resources(&self) -> Option<&R> {
        self.resources.as_ref()
    }

    pub fn has_resources(&self) -> bool {
        self.resources.is_some()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// World box of side `chunk_size` voxels starting at the origin (broad phase).
    pub fn world_bounds(&self) -> Aabb {
        Aabb::new(
            self.origin,
            self.origin + Vec3::splat(self.chunk_size() as f32 * self.scale),
        )
    }

    pub fn world_to_local(&self, p: Vec3) -> Vec3 {
        (p - self.origin) / self.scale
    }

    pub fn local_to_world(&self, p: Vec3) -> Vec3 {
        self.origin + p * self.scale
    }

    /// Split borrow used by the extractor and the editor: density, mesh and
    /// resources (allocated with `allocate` on first use).
    pub(crate) fn parts_mut<E>(
        &mut self,
        allocate: impl FnOnce() -> Result<R, E>,
    ) -> Result<(&mut DensityField, &mut GeometryBuffers, &mut R), E> {
        let resources = match self.resources.take() {
            Some(resources) => resources,
            None => allocate()?,
        };
        let resources = self.resources.insert(resources);
        Ok((&mut self.density, &mut self.geometry, resources))
    }

    pub(crate) fn mark_regenerated(&mut self) {
        self.generation += 1;
    }

    /// Drop compute resources and the mesh; the density field is kept.
    pub fn release(&mut self) {
        self.resources = None;
        self.geometry.clear();
    }
}
