//! wgpu implementation of the terrain kernels.
//!
//! Every operation records one compute pass, submits it and blocks on the
//! readback it needs. Host density fields stay authoritative: they are
//! uploaded before triangulate and brush dispatches, and brush results are
//! read back into the field.
//!
//! Append order in the accumulator and candidate buffers follows device
//! scheduling, so unlike the CPU backend the vertex order of a mesh may
//! differ between two extractions of the same field.

pub mod buffers;
pub mod context;
pub mod pipelines;

use glam::Vec3;

use crate::compute::{ComputeBackend, DispatchStats, QUERY_CANDIDATE_CAPACITY, triangle_capacity};
use crate::core::error::Error;
use crate::core::types::Result;
use crate::edit::brush::BrushDispatch;
use crate::mesh::{GeometryBuffers, Vertex};
use crate::query::candidate::Candidate;
use crate::voxel::density::DensityField;

pub use buffers::{GpuChunkResources, GpuQueryScratch};
pub use context::GpuContext;
pub use pipelines::Kernels;

use buffers::{
    BrushParams, CompactParams, GpuCandidate, GpuTriangle, GpuVertex, QueryParams,
    TriangulateParams,
};
use pipelines::{BRUSH_WORKGROUP, LINEAR_WORKGROUP, TRIANGULATE_WORKGROUP, workgroups};

/// Compute backend running the WGSL kernels on a wgpu device.
pub struct GpuBackend {
    context: GpuContext,
    kernels: Kernels,
    stats: DispatchStats,
}

impl GpuBackend {
    /// Create a headless device and compile the kernels.
    pub fn new() -> Result<Self> {
        Ok(Self::with_context(GpuContext::new()?))
    }

    pub fn with_context(context: GpuContext) -> Self {
        let kernels = Kernels::new(&context.device);
        Self {
            context,
            kernels,
            stats: DispatchStats::default(),
        }
    }

    pub fn context(&self) -> &GpuContext {
        &self.context
    }

    fn create_buffer(&self, label: &str, size: u64, usage: wgpu::BufferUsages) -> wgpu::Buffer {
        self.context.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage,
            mapped_at_creation: false,
        })
    }

    fn uniform_buffer(&self, label: &str, size: usize) -> wgpu::Buffer {
        self.create_buffer(
            label,
            size as u64,
            wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        )
    }

    fn counter_buffer(&self, label: &str) -> wgpu::Buffer {
        self.create_buffer(
            label,
            std::mem::size_of::<u32>() as u64,
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST,
        )
    }

    fn bind_group(&self, label: &str, layout: &wgpu::BindGroupLayout, buffers: &[&wgpu::Buffer]) -> wgpu::BindGroup {
        let entries: Vec<wgpu::BindGroupEntry> = buffers
            .iter()
            .enumerate()
            .map(|(binding, buffer)| wgpu::BindGroupEntry {
                binding: binding as u32,
                resource: buffer.as_entire_binding(),
            })
            .collect();
        self.context.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout,
            entries: &entries,
        })
    }

    /// Record one compute pass, submit it and wait for completion.
    fn dispatch(
        &self,
        label: &str,
        pipeline: &wgpu::ComputePipeline,
        bind_group: &wgpu::BindGroup,
        groups: (u32, u32, u32),
    ) {
        let mut encoder = self.context.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some(label),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(label),
                timestamp_writes: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, bind_group, &[]);
            pass.dispatch_workgroups(groups.0, groups.1, groups.2);
        }
        self.context.submit_and_wait(encoder);
        self.stats.record_dispatch();
        log::trace!("{}: {:?} workgroups", label, groups);
    }

    fn upload_density(&self, res: &GpuChunkResources, field: &DensityField) {
        self.context
            .queue
            .write_buffer(&res.density, 0, bytemuck::cast_slice(field.samples()));
    }

    fn zero_counter(&self, counter: &wgpu::Buffer) {
        self.context.queue.write_buffer(counter, 0, bytemuck::bytes_of(&0u32));
    }

    fn run_query(
        &self,
        label: &str,
        pipeline: &wgpu::ComputePipeline,
        scratch: &mut GpuQueryScratch,
        res: &GpuChunkResources,
        params: QueryParams,
    ) -> Result<u32> {
        let (Some(vertices), Some(indices)) = (&res.vertices, &res.indices) else {
            return Err(Error::Gpu(format!("{}: chunk has no resident mesh", label)));
        };

        self.context.queue.write_buffer(&scratch.params, 0, bytemuck::bytes_of(&params));
        self.zero_counter(&scratch.counter);
        let bind_group = self.bind_group(
            label,
            &self.kernels.query_layout,
            &[&scratch.params, vertices, indices, &scratch.candidates, &scratch.counter],
        );
        self.dispatch(
            label,
            pipeline,
            &bind_group,
            (workgroups(params.triangle_count, LINEAR_WORKGROUP), 1, 1),
        );

        let raw = self.context.read_counter(&scratch.counter)?;
        self.stats.record_readback();
        Ok(raw)
    }
}

impl ComputeBackend for GpuBackend {
    type ChunkResources = GpuChunkResources;
    type QueryScratch = GpuQueryScratch;

    fn name(&self) -> &'static str {
        "gpu"
    }

    fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    fn create_chunk_resources(&self, chunk_size: u32) -> Result<GpuChunkResources> {
        let capacity = triangle_capacity(chunk_size);
        let accumulator_size = capacity as u64 * std::mem::size_of::<GpuTriangle>() as u64;
        let limits = self.context.device.limits();
        if accumulator_size > limits.max_storage_buffer_binding_size as u64 {
            return Err(Error::Gpu(format!(
                "triangle accumulator of {} bytes exceeds the storage binding limit of {} bytes",
                accumulator_size, limits.max_storage_buffer_binding_size
            )));
        }

        let dim = (chunk_size + 2) as u64;
        let density = self.create_buffer(
            "chunk_density",
            dim * dim * dim * std::mem::size_of::<f32>() as u64,
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC,
        );
        let brush_params = self.uniform_buffer("chunk_brush_params", std::mem::size_of::<BrushParams>());
        let brush_bind_group = self.bind_group("chunk_brush_bg", &self.kernels.brush_layout, &[&brush_params, &density]);

        Ok(GpuChunkResources {
            chunk_size,
            capacity,
            density,
            counter: self.counter_buffer("chunk_triangle_counter"),
            triangulate_params: self.uniform_buffer("chunk_triangulate_params", std::mem::size_of::<TriangulateParams>()),
            compact_params: self.uniform_buffer("chunk_compact_params", std::mem::size_of::<CompactParams>()),
            brush_params,
            brush_bind_group,
            accumulator: None,
            vertices: None,
            indices: None,
            triangle_count: 0,
        })
    }

    fn create_query_scratch(&self) -> Result<GpuQueryScratch> {
        Ok(GpuQueryScratch {
            params: self.uniform_buffer("query_params", std::mem::size_of::<QueryParams>()),
            candidates: self.create_buffer(
                "query_candidates",
                QUERY_CANDIDATE_CAPACITY as u64 * std::mem::size_of::<GpuCandidate>() as u64,
                wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            ),
            counter: self.counter_buffer("query_counter"),
        })
    }

    fn reset_triangle_counter(&self, res: &mut GpuChunkResources) -> Result<()> {
        self.zero_counter(&res.counter);
        res.release_accumulator();
        Ok(())
    }

    fn triangulate(&self, res: &mut GpuChunkResources, field: &DensityField, iso_level: f32) -> Result<u32> {
        let n = field.chunk_size();
        if n != res.chunk_size {
            return Err(Error::Gpu(format!(
                "density field of {} cells does not fit chunk resources of {}",
                n, res.chunk_size
            )));
        }

        self.upload_density(res, field);
        let params = TriangulateParams {
            chunk_size: n,
            dim: field.dim(),
            capacity: res.capacity,
            iso_level,
        };
        self.context
            .queue
            .write_buffer(&res.triangulate_params, 0, bytemuck::bytes_of(&params));

        if res.accumulator.is_none() {
            res.accumulator = Some(self.create_buffer(
                "chunk_triangle_accumulator",
                res.capacity as u64 * std::mem::size_of::<GpuTriangle>() as u64,
                wgpu::BufferUsages::STORAGE,
            ));
        }
        let Some(accumulator) = &res.accumulator else {
            return Err(Error::Gpu("triangle accumulator missing".into()));
        };

        let bind_group = self.bind_group(
            "triangulate_bg",
            &self.kernels.triangulate_layout,
            &[&res.triangulate_params, &res.density, &self.kernels.tri_table, accumulator, &res.counter],
        );
        let groups = workgroups(n, TRIANGULATE_WORKGROUP);
        self.dispatch("triangulate", &self.kernels.triangulate, &bind_group, (groups, groups, groups));

        let raw = self.context.read_counter(&res.counter)?;
        self.stats.record_readback();
        Ok(raw)
    }

    fn compact(&self, res: &mut GpuChunkResources, count: u32, out: &mut GeometryBuffers) -> Result<()> {
        res.release_mesh();
        let count = count.min(res.capacity);
        if count == 0 {
            out.clear();
            return Ok(());
        }
        let Some(accumulator) = &res.accumulator else {
            return Err(Error::Gpu("compact dispatched before triangulate".into()));
        };

        let slots = count as u64 * 3;
        let vertices = self.create_buffer(
            "chunk_vertices",
            slots * std::mem::size_of::<GpuVertex>() as u64,
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
        );
        let indices = self.create_buffer(
            "chunk_indices",
            slots * std::mem::size_of::<u32>() as u64,
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
        );

        let params = CompactParams { count, _pad: [0; 3] };
        self.context
            .queue
            .write_buffer(&res.compact_params, 0, bytemuck::bytes_of(&params));
        let bind_group = self.bind_group(
            "compact_bg",
            &self.kernels.compact_layout,
            &[&res.compact_params, accumulator, &vertices, &indices],
        );
        self.dispatch("compact", &self.kernels.compact, &bind_group, (workgroups(count, LINEAR_WORKGROUP), 1, 1));

        let gpu_vertices: Vec<GpuVertex> = self.context.read_pod(&vertices, slots as usize)?;
        let gpu_indices: Vec<u32> = self.context.read_pod(&indices, slots as usize)?;
        self.stats.record_readback();

        out.set_raw(gpu_vertices.into_iter().map(Vertex::from).collect(), gpu_indices);
        res.vertices = Some(vertices);
        res.indices = Some(indices);
        res.triangle_count = count;
        Ok(())
    }

    fn apply_brush(&self, res: &mut GpuChunkResources, field: &mut DensityField, brush: &BrushDispatch) -> Result<()> {
        self.upload_density(res, field);

        let region = brush.region;
        let params = BrushParams {
            center: [brush.center.x, brush.center.y, brush.center.z, brush.radius],
            start: [region.start.x, region.start.y, region.start.z, field.dim()],
            extent: [region.extent.x, region.extent.y, region.extent.z, brush.kind.as_u32()],
            strength: brush.strength,
            _pad: [0.0; 3],
        };
        self.context
            .queue
            .write_buffer(&res.brush_params, 0, bytemuck::bytes_of(&params));

        let groups = (
            workgroups(region.extent.x, BRUSH_WORKGROUP),
            workgroups(region.extent.y, BRUSH_WORKGROUP),
            workgroups(region.extent.z, BRUSH_WORKGROUP),
        );
        self.dispatch(brush.kind.entry_point(), self.kernels.brush(brush.kind), &res.brush_bind_group, groups);

        let samples: Vec<f32> = self.context.read_pod(&res.density, field.len())?;
        field.samples_mut().copy_from_slice(&samples);
        self.stats.record_readback();
        Ok(())
    }

    fn dispatch_sphere_query(
        &self,
        scratch: &mut GpuQueryScratch,
        res: &GpuChunkResources,
        geometry: &GeometryBuffers,
        center: Vec3,
        radius: f32,
    ) -> Result<u32> {
        debug_assert_eq!(geometry.triangle_count(), res.triangle_count as usize);
        if res.triangle_count == 0 {
            return Ok(0);
        }
        let params = QueryParams {
            origin: [center.x, center.y, center.z, radius],
            direction: [0.0; 4],
            triangle_count: res.triangle_count,
            capacity: QUERY_CANDIDATE_CAPACITY,
            _pad: [0; 2],
        };
        self.run_query("sphere_query", &self.kernels.sphere_query, scratch, res, params)
    }

    fn dispatch_ray_query(
        &self,
        scratch: &mut GpuQueryScratch,
        res: &GpuChunkResources,
        geometry: &GeometryBuffers,
        origin: Vec3,
        direction: Vec3,
    ) -> Result<u32> {
        debug_assert_eq!(geometry.triangle_count(), res.triangle_count as usize);
        if res.triangle_count == 0 {
            return Ok(0);
        }
        let params = QueryParams {
            origin: [origin.x, origin.y, origin.z, 0.0],
            direction: [direction.x, direction.y, direction.z, 0.0],
            triangle_count: res.triangle_count,
            capacity: QUERY_CANDIDATE_CAPACITY,
            _pad: [0; 2],
        };
        self.run_query("ray_query", &self.kernels.ray_query, scratch, res, params)
    }

    fn read_candidates(&self, scratch: &mut GpuQueryScratch, count: u32) -> Result<Vec<Candidate>> {
        let count = count.min(QUERY_CANDIDATE_CAPACITY) as usize;
        if count == 0 {
            return Ok(Vec::new());
        }
        let raw: Vec<GpuCandidate> = self.context.read_pod(&scratch.candidates, count)?;
        self.stats.record_readback();
        Ok(raw.into_iter().map(Candidate::from).collect())
    }
}
