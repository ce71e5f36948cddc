//! Chunk mesh output: vertex/index lists and bounding volume.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

use crate::math::{Aabb, Triangle};

/// Mesh vertex in chunk-local voxel units
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
}

impl Vertex {
    pub fn new(position: Vec3, normal: Vec3) -> Self {
        Self { position, normal }
    }
}

/// A chunk's extracted surface.
///
/// Triangles are unshared: `indices[i] == i` and
/// `vertices.len() == indices.len() == 3 * triangle_count()`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GeometryBuffers {
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
    bounds: Aabb,
}

impl GeometryBuffers {
    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Local-space culling box (the chunk cube, not a tight fit).
    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn clear(&mut self) {
        self.vertices.clear();
        self.indices.clear();
    }

    /// Replace the mesh with `triangles`, sized exactly and indexed
    /// sequentially.
    pub fn set_triangles(&mut self, triangles: &[[Vertex; 3]]) {
        self.vertices = Vec::with_capacity(triangles.len() * 3);
        self.vertices.extend(triangles.iter().flatten().copied());
        self.indices = (0..self.vertices.len() as u32).collect();
    }

    /// Install buffers produced elsewhere (GPU readback).
    pub(crate) fn set_raw(&mut self, vertices: Vec<Vertex>, indices: Vec<u32>) {
        debug_assert_eq!(vertices.len(), indices.len());
        self.vertices = vertices;
        self.indices = indices;
    }

    pub(crate) fn set_bounds(&mut self, bounds: Aabb) {
        self.bounds = bounds;
    }

    /// Triangle `i` by its index triple.
    pub fn triangle(&self, i: usize) -> Triangle {
        let idx = &self.indices[i * 3..i * 3 + 3];
        Triangle::new(
            self.vertices[idx[0] as usize].position,
            self.vertices[idx[1] as usize].position,
            self.vertices[idx[2] as usize].position,
        )
    }

    /// Vertex normals of triangle `i`.
    pub fn triangle_normals(&self, i: usize) -> [Vec3; 3] {
        let idx = &self.indices[i * 3..i * 3 + 3];
        [
            self.vertices[idx[0] as usize].normal,
            self.vertices[idx[1] as usize].normal,
            self.vertices[idx[2] as usize].normal,
        ]
    }

    pub fn triangles(&self) -> impl Iterator<Item = Triangle> + '_ {
        (0..self.triangle_count()).map(|i| self.triangle(i))
    }

    /// Sum of triangle areas, in square voxel units.
    pub fn surface_area(&self) -> f32 {
        self.triangles().map(|t| t.area()).sum()
    }

    /// Area of the triangles whose centroid lies inside `region`.
    pub fn surface_area_in(&self, region: &Aabb) -> f32 {
        self.triangles()
            .filter(|t| region.contains_point((t.a + t.b + t.c) / 3.0))
            .map(|t| t.area())
            .sum()
    }

    /// Raw bytes of both buffers, for exact comparisons.
    pub fn as_bytes(&self) -> (&[u8], &[u8]) {
        (bytemuck::cast_slice(&self.vertices), bytemuck::cast_slice(&self.indices))
    }
}
