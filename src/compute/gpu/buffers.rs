//! Device-side layouts and the buffers each chunk and query caller owns.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

use crate::mesh::Vertex;
use crate::query::candidate::Candidate;

/// Vertex as stored by the kernels (vec4 aligned)
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct GpuVertex {
    pub position: [f32; 4],
    pub normal: [f32; 4],
}

impl From<GpuVertex> for Vertex {
    fn from(v: GpuVertex) -> Self {
        Vertex::new(
            Vec3::new(v.position[0], v.position[1], v.position[2]),
            Vec3::new(v.normal[0], v.normal[1], v.normal[2]),
        )
    }
}

/// Accumulator entry written by `triangulate.wgsl`
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct GpuTriangle {
    pub vertices: [GpuVertex; 3],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct GpuCandidate {
    pub position: [f32; 4],
    pub normal: [f32; 4],
}

impl From<GpuCandidate> for Candidate {
    fn from(c: GpuCandidate) -> Self {
        Candidate {
            position: Vec3::new(c.position[0], c.position[1], c.position[2]),
            normal: Vec3::new(c.normal[0], c.normal[1], c.normal[2]),
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct TriangulateParams {
    pub chunk_size: u32,
    pub dim: u32,
    pub capacity: u32,
    pub iso_level: f32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct CompactParams {
    pub count: u32,
    pub _pad: [u32; 3],
}

/// Carve/fill uniforms; see `brush.wgsl` for the packing.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct BrushParams {
    pub center: [f32; 4],
    pub start: [u32; 4],
    pub extent: [u32; 4],
    pub strength: f32,
    pub _pad: [f32; 3],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct QueryParams {
    pub origin: [f32; 4],
    pub direction: [f32; 4],
    pub triangle_count: u32,
    pub capacity: u32,
    pub _pad: [u32; 2],
}

/// Buffers owned by one chunk.
///
/// The triangle accumulator is transient: allocated by triangulate, dropped
/// by the counter reset that ends an extraction. The vertex/index buffers
/// are sized exactly to the last extraction and stay resident for queries.
pub struct GpuChunkResources {
    pub(crate) chunk_size: u32,
    pub(crate) capacity: u32,
    pub(crate) density: wgpu::Buffer,
    pub(crate) counter: wgpu::Buffer,
    pub(crate) triangulate_params: wgpu::Buffer,
    pub(crate) compact_params: wgpu::Buffer,
    pub(crate) brush_params: wgpu::Buffer,
    pub(crate) brush_bind_group: wgpu::BindGroup,
    pub(crate) accumulator: Option<wgpu::Buffer>,
    pub(crate) vertices: Option<wgpu::Buffer>,
    pub(crate) indices: Option<wgpu::Buffer>,
    pub(crate) triangle_count: u32,
}

impl GpuChunkResources {
    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    /// Triangles resident in the device vertex/index buffers.
    pub fn triangle_count(&self) -> u32 {
        self.triangle_count
    }

    pub(crate) fn release_accumulator(&mut self) {
        if let Some(buffer) = self.accumulator.take() {
            buffer.destroy();
        }
    }

    pub(crate) fn release_mesh(&mut self) {
        if let Some(buffer) = self.vertices.take() {
            buffer.destroy();
        }
        if let Some(buffer) = self.indices.take() {
            buffer.destroy();
        }
        self.triangle_count = 0;
    }
}

impl Drop for GpuChunkResources {
    fn drop(&mut self) {
        self.release_accumulator();
        self.release_mesh();
        self.density.destroy();
        self.counter.destroy();
        self.triangulate_params.destroy();
        self.compact_params.destroy();
        self.brush_params.destroy();
    }
}

/// Candidate buffer, counter and uniforms of one query caller.
pub struct GpuQueryScratch {
    pub(crate) params: wgpu::Buffer,
    pub(crate) candidates: wgpu::Buffer,
    pub(crate) counter: wgpu::Buffer,
}

impl Drop for GpuQueryScratch {
    fn drop(&mut self) {
        self.params.destroy();
        self.candidates.destroy();
        self.counter.destroy();
    }
}
