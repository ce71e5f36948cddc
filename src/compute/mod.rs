//! Compute context: the kernels behind extraction, editing and queries.
//!
//! A [`ComputeBackend`] is created once and shared (`Arc`) by everything that
//! dispatches work. It owns the compiled kernels; per-chunk buffers live in
//! [`ComputeBackend::ChunkResources`] inside each chunk, and query candidate
//! buffers in [`ComputeBackend::QueryScratch`] owned by the caller. Two
//! independent backends never share state.

pub mod cpu;
pub mod gpu;

use std::sync::atomic::{AtomicU64, Ordering};

use glam::Vec3;

use crate::core::types::Result;
use crate::edit::brush::BrushDispatch;
use crate::mesh::GeometryBuffers;
use crate::query::candidate::Candidate;
use crate::voxel::density::DensityField;

pub use cpu::CpuBackend;
pub use gpu::GpuBackend;

/// Candidate slots of one query dispatch.
pub const QUERY_CANDIDATE_CAPACITY: u32 = 50;

/// Triangle accumulator capacity of a chunk with `chunk_size` cells per axis.
pub fn triangle_capacity(chunk_size: u32) -> u32 {
    chunk_size * chunk_size * chunk_size * 3
}

/// A counter read back from an append buffer, checked against its capacity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CountReadback {
    /// Value as read from the device
    pub raw: u32,
    /// Entries actually stored and safe to read
    pub recorded: u32,
    /// More appends were attempted than the buffer holds
    pub overflowed: bool,
    /// The counter is not a plausible count (negative when read signed)
    pub corrupted: bool,
}

/// Clamp a raw append counter into `[0, capacity]`.
///
/// Overflow and corruption are logged; nothing is dropped without a trace.
pub fn sanitize_count(raw: u32, capacity: u32, what: &str) -> CountReadback {
    if (raw as i32) < 0 {
        log::warn!("{}: counter read back as {} (corrupted), treating as empty", what, raw as i32);
        return CountReadback { raw, recorded: 0, overflowed: false, corrupted: true };
    }
    if raw > capacity {
        log::warn!(
            "{}: {} entries appended but capacity is {}, {} dropped",
            what, raw, capacity, raw - capacity
        );
        return CountReadback { raw, recorded: capacity, overflowed: true, corrupted: false };
    }
    CountReadback { raw, recorded: raw, overflowed: false, corrupted: false }
}

/// Counters of submitted kernel dispatches and blocking readbacks.
#[derive(Debug, Default)]
pub struct DispatchStats {
    dispatches: AtomicU64,
    readbacks: AtomicU64,
}

impl DispatchStats {
    pub fn dispatches(&self) -> u64 {
        self.dispatches.load(Ordering::Relaxed)
    }

    pub fn readbacks(&self) -> u64 {
        self.readbacks.load(Ordering::Relaxed)
    }

    pub(crate) fn record_dispatch(&self) {
        self.dispatches.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_readback(&self) {
        self.readbacks.fetch_add(1, Ordering::Relaxed);
    }
}

/// The kernels of the terrain pipeline.
///
/// Every method blocks until its work is complete. Implementations must be
/// safe to call from several threads as long as each `ChunkResources` /
/// `QueryScratch` value is used by one caller at a time (the `&mut`
/// receivers enforce this).
pub trait ComputeBackend: Send + Sync + 'static {
    /// Per-chunk device state: density mirror, triangle accumulator and
    /// counter, output vertex/index buffers and kernel uniforms.
    type ChunkResources: Send;
    /// Candidate buffer and counter of one query caller.
    type QueryScratch: Send;

    fn name(&self) -> &'static str;

    fn stats(&self) -> &DispatchStats;

    /// Allocate a chunk's resources. Failure is fatal for that chunk.
    fn create_chunk_resources(&self, chunk_size: u32) -> Result<Self::ChunkResources>;

    fn create_query_scratch(&self) -> Result<Self::QueryScratch>;

    /// Zero the triangle counter and drop transient accumulator contents.
    fn reset_triangle_counter(&self, res: &mut Self::ChunkResources) -> Result<()>;

    /// Run the triangulate kernel over every cell and return the raw
    /// triangle counter.
    fn triangulate(
        &self,
        res: &mut Self::ChunkResources,
        field: &DensityField,
        iso_level: f32,
    ) -> Result<u32>;

    /// Scatter the first `count` accumulated triangles into exactly sized
    /// vertex/index buffers and copy them into `out`.
    fn compact(
        &self,
        res: &mut Self::ChunkResources,
        count: u32,
        out: &mut GeometryBuffers,
    ) -> Result<()>;

    /// Run a carve or fill kernel over the dispatch region of `field`.
    fn apply_brush(
        &self,
        res: &mut Self::ChunkResources,
        field: &mut DensityField,
        brush: &BrushDispatch,
    ) -> Result<()>;

    /// Sphere vs mesh in mesh-local units; returns the raw candidate counter.
    fn dispatch_sphere_query(
        &self,
        scratch: &mut Self::QueryScratch,
        res: &Self::ChunkResources,
        geometry: &GeometryBuffers,
        center: Vec3,
        radius: f32,
    ) -> Result<u32>;

    /// Ray vs mesh in mesh-local units; returns the raw candidate counter.
    fn dispatch_ray_query(
        &self,
        scratch: &mut Self::QueryScratch,
        res: &Self::ChunkResources,
        geometry: &GeometryBuffers,
        origin: Vec3,
        direction: Vec3,
    ) -> Result<u32>;

    /// Read back the first `count` candidates of the last query dispatch.
    fn read_candidates(&self, scratch: &mut Self::QueryScratch, count: u32) -> Result<Vec<Candidate>>;
}
