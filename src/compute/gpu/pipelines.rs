//! Compiled compute kernels, shared read-only by every chunk.

use wgpu::util::DeviceExt;

use crate::edit::brush::BrushKind;
use crate::mesh::tables::tri_table_flat;

pub const TRIANGULATE_WORKGROUP: u32 = 4;
pub const BRUSH_WORKGROUP: u32 = 4;
pub const LINEAR_WORKGROUP: u32 = 64;

fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn compute_pipeline(
    device: &wgpu::Device,
    label: &str,
    layout: &wgpu::BindGroupLayout,
    module: &wgpu::ShaderModule,
    entry_point: &str,
) -> wgpu::ComputePipeline {
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts: &[layout],
        immediate_size: 0,
    });

    device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(label),
        layout: Some(&pipeline_layout),
        module,
        entry_point: Some(entry_point),
        compilation_options: Default::default(),
        cache: None,
    })
}

/// The six terrain kernels and their bind group layouts.
pub struct Kernels {
    pub tri_table: wgpu::Buffer,
    pub triangulate_layout: wgpu::BindGroupLayout,
    pub triangulate: wgpu::ComputePipeline,
    pub compact_layout: wgpu::BindGroupLayout,
    pub compact: wgpu::ComputePipeline,
    pub brush_layout: wgpu::BindGroupLayout,
    pub carve: wgpu::ComputePipeline,
    pub fill: wgpu::ComputePipeline,
    pub query_layout: wgpu::BindGroupLayout,
    pub sphere_query: wgpu::ComputePipeline,
    pub ray_query: wgpu::ComputePipeline,
}

impl Kernels {
    pub fn new(device: &wgpu::Device) -> Self {
        let tri_table = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("mc_tri_table"),
            contents: bytemuck::cast_slice(&tri_table_flat()),
            usage: wgpu::BufferUsages::STORAGE,
        });

        // Triangulate: params, density, tri table, accumulator, counter
        let triangulate_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("triangulate_shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../../../shaders/triangulate.wgsl").into()),
        });
        let triangulate_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("triangulate_layout"),
            entries: &[
                uniform_entry(0),
                storage_entry(1, true),
                storage_entry(2, true),
                storage_entry(3, false),
                storage_entry(4, false),
            ],
        });
        let triangulate = compute_pipeline(device, "triangulate_pipeline", &triangulate_layout, &triangulate_shader, "main");

        // Compact: params, accumulator, vertices, indices
        let compact_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("compact_shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../../../shaders/compact.wgsl").into()),
        });
        let compact_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("compact_layout"),
            entries: &[
                uniform_entry(0),
                storage_entry(1, true),
                storage_entry(2, false),
                storage_entry(3, false),
            ],
        });
        let compact = compute_pipeline(device, "compact_pipeline", &compact_layout, &compact_shader, "main");

        // Brush: params, density
        let brush_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("brush_shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../../../shaders/brush.wgsl").into()),
        });
        let brush_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("brush_layout"),
            entries: &[uniform_entry(0), storage_entry(1, false)],
        });
        let carve = compute_pipeline(
            device, "carve_pipeline", &brush_layout, &brush_shader, BrushKind::Carve.entry_point(),
        );
        let fill = compute_pipeline(
            device, "fill_pipeline", &brush_layout, &brush_shader, BrushKind::Fill.entry_point(),
        );

        // Queries: params, vertices, indices, candidates, counter
        let query_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("query_shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../../../shaders/query.wgsl").into()),
        });
        let query_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("query_layout"),
            entries: &[
                uniform_entry(0),
                storage_entry(1, true),
                storage_entry(2, true),
                storage_entry(3, false),
                storage_entry(4, false),
            ],
        });
        let sphere_query = compute_pipeline(device, "sphere_query_pipeline", &query_layout, &query_shader, "sphere_query");
        let ray_query = compute_pipeline(device, "ray_query_pipeline", &query_layout, &query_shader, "ray_query");

        log::info!("Compiled terrain kernels (triangulate, compact, carve, fill, sphere_query, ray_query)");

        Self {
            tri_table,
            triangulate_layout,
            triangulate,
            compact_layout,
            compact,
            brush_layout,
            carve,
            fill,
            query_layout,
            sphere_query,
            ray_query,
        }
    }

    pub fn brush(&self, kind: BrushKind) -> &wgpu::ComputePipeline {
        match kind {
            BrushKind::Carve => &self.carve,
            BrushKind::Fill => &self.fill,
        }
    }
}

/// Workgroups needed to cover `items` with groups of `size`.
pub fn workgroups(items: u32, size: u32) -> u32 {
    items.div_ceil(size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workgroups() {
        assert_eq!(workgroups(0, 64), 0);
        assert_eq!(workgroups(1, 64), 1);
        assert_eq!(workgroups(64, 64), 1);
        assert_eq!(workgroups(65, 64), 2);
        assert_eq!(workgroups(32, 4), 8);
    }
}
