//! Per-chunk scalar density grid.
//!
//! A chunk with `n` cells per axis stores `(n + 2)^3` samples, x-fastest.
//! Sample `(x, y, z)` sits at chunk-local position `(x, y, z)` in voxel
//! units. Samples `0..=n` are cell corners; layer `n + 1` is the apron read
//! only by gradient estimation, so edge interpolation and normals never
//! leave the field.

use glam::{IVec3, UVec3, Vec3};
use rayon::prelude::*;

/// Scalar density samples of one chunk, conceptually in `[0, 1]`.
#[derive(Clone, Debug, PartialEq)]
pub struct DensityField {
    chunk_size: u32,
    dim: u32,
    samples: Vec<f32>,
}

impl DensityField {
    /// Create a field of `chunk_size` cells per axis, all samples zero (empty).
    pub fn new(chunk_size: u32) -> Self {
        Self::filled(chunk_size, 0.0)
    }

    /// Create a field with every sample set to `value`.
    pub fn filled(chunk_size: u32, value: f32) -> Self {
        let dim = chunk_size + 2;
        Self {
            chunk_size,
            dim,
            samples: vec![value; (dim * dim * dim) as usize],
        }
    }

    /// Cells per axis.
    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    /// Samples per axis (`chunk_size + 2`).
    pub fn dim(&self) -> u32 {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn samples_mut(&mut self) -> &mut [f32] {
        &mut self.samples
    }

    /// Linear index of a sample. Coordinates must be inside the field.
    #[inline]
    pub fn index(&self, x: u32, y: u32, z: u32) -> usize {
        debug_assert!(x < self.dim && y < self.dim && z < self.dim);
        (x + y * self.dim + z * self.dim * self.dim) as usize
    }

    /// Sample coordinate of a linear index.
    #[inline]
    pub fn coord(&self, index: usize) -> UVec3 {
        let i = index as u32;
        UVec3::new(i % self.dim, (i / self.dim) % self.dim, i / (self.dim * self.dim))
    }

    #[inline]
    pub fn contains(&self, p: IVec3) -> bool {
        p.cmpge(IVec3::ZERO).all() && p.cmplt(IVec3::splat(self.dim as i32)).all()
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32, z: u32) -> f32 {
        self.samples[self.index(x, y, z)]
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32, z: u32, value: f32) {
        let i = self.index(x, y, z);
        self.samples[i] = value;
    }

    /// Bounds-checked read.
    pub fn sample(&self, p: IVec3) -> Option<f32> {
        self.contains(p)
            .then(|| self.get(p.x as u32, p.y as u32, p.z as u32))
    }

    /// Read with coordinates clamped into the field.
    #[inline]
    pub fn sample_clamped(&self, p: IVec3) -> f32 {
        let c = p.clamp(IVec3::ZERO, IVec3::splat(self.dim as i32 - 1));
        self.get(c.x as u32, c.y as u32, c.z as u32)
    }

    /// Overwrite every sample from `f(sample_coord)`, one z-slab per task.
    pub fn fill_with<F>(&mut self, f: F)
    where
        F: Fn(UVec3) -> f32 + Sync,
    {
        let dim = self.dim;
        self.samples
            .par_chunks_mut((dim * dim) as usize)
            .enumerate()
            .for_each(|(z, slab)| {
                for y in 0..dim {
                    for x in 0..dim {
                        slab[(x + y * dim) as usize] = f(UVec3::new(x, y, z as u32));
                    }
                }
            });
    }

    /// Density gradient by central differences, clamped at the field edges.
    pub fn gradient(&self, p: UVec3) -> Vec3 {
        let p = p.as_ivec3();
        Vec3::new(
            self.sample_clamped(p + IVec3::X) - self.sample_clamped(p - IVec3::X),
            self.sample_clamped(p + IVec3::Y) - self.sample_clamped(p - IVec3::Y),
            self.sample_clamped(p + IVec3::Z) - self.sample_clamped(p - IVec3::Z),
        )
    }

    /// Smallest and largest sample.
    pub fn range(&self) -> (f32, f32) {
        self.samples
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)))
    }

    /// Clamp every sample into `[0, 1]`.
    pub fn clamp_to_unit(&mut self) {
        self.samples.par_iter_mut().for_each(|v| *v = v.clamp(0.0, 1.0));
    }
}
