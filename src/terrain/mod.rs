//! Editable density terrain: the chunk grid plus its extractor, editor and
//! query runner, behind one host-facing API.

pub mod generator;
pub use generator::{CaveGenerator, CaveParams, DensitySource};

use std::sync::Arc;

use glam::{IVec3, Vec3};
use rayon::prelude::*;

use crate::compute::{ComputeBackend, DispatchStats};
use crate::core::config::TerrainConfig;
use crate::core::error::Error;
use crate::core::types::Result;
use crate::edit::{EditCommand, EditQueue, EditReport, TerrainEditor};
use crate::mesh::ExtractReport;
use crate::query::{GeometryQuery, QueryOutcome, RaycastSettings};
use crate::voxel::border::sync_borders;
use crate::voxel::chunk::ChunkIndex;
use crate::voxel::grid::ChunkGrid;

/// A chunked terrain bound to one compute backend.
///
/// Calls are serialized through `&mut self`, so no chunk ever has two
/// operations in flight.
pub struct Terrain<B: ComputeBackend> {
    config: TerrainConfig,
    backend: Arc<B>,
    grid: ChunkGrid<B::ChunkResources>,
    editor: TerrainEditor<B>,
    query: GeometryQuery<B>,
    queue: EditQueue,
}

impl<B: ComputeBackend> Terrain<B> {
    /// Build the grid and the query scratch. Every chunk starts empty.
    pub fn new(config: TerrainConfig, backend: Arc<B>) -> Result<Self> {
        let grid = ChunkGrid::new(&config)?;
        let editor = TerrainEditor::new(backend.clone(), config.iso_level);
        let query = GeometryQuery::new(backend.clone())?;

        log::info!("Terrain ready on {} backend", backend.name());

        Ok(Self {
            config,
            backend,
            grid,
            editor,
            query,
            queue: EditQueue::new(),
        })
    }

    pub fn config(&self) -> &TerrainConfig {
        &self.config
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn stats(&self) -> &DispatchStats {
        self.backend.stats()
    }

    pub fn grid(&self) -> &ChunkGrid<B::ChunkResources> {
        &self.grid
    }

    /// Direct grid access. Chunks whose density is changed here must be
    /// remeshed with [`Self::regenerate_mesh`] or [`Self::regenerate_all`].
    pub fn grid_mut(&mut self) -> &mut ChunkGrid<B::ChunkResources> {
        &mut self.grid
    }

    pub fn queue(&self) -> &EditQueue {
        &self.queue
    }

    /// Truncated chunk coordinate of a world position; not range checked.
    pub fn world_to_chunk_index(&self, pos: Vec3) -> IVec3 {
        self.grid.world_to_chunk_index(pos)
    }

    /// Fill every chunk from `source` sampled at world positions, then share
    /// border samples between neighbours. Meshes are not rebuilt.
    pub fn populate<S: DensitySource>(&mut self, source: &S) {
        let scale = self.grid.scale();
        self.grid.par_iter_mut().for_each(|chunk| {
            let origin = chunk.origin();
            chunk
                .density_mut()
                .fill_with(|p| source.density(origin + p.as_vec3() * scale).clamp(0.0, 1.0));
        });
        let synced = sync_borders(&mut self.grid);
        log::debug!("Populated {} chunks ({} border samples shared)", self.grid.len(), synced);
    }

    /// Remesh one chunk from its current density.
    pub fn regenerate_mesh(&mut self, index: ChunkIndex) -> Result<ExtractReport> {
        let chunk = self.grid.get_mut(index).ok_or(Error::ChunkOutOfRange {
            x: index.x,
            y: index.y,
            z: index.z,
        })?;
        self.editor.extractor().extract(chunk)
    }

    /// Remesh every chunk, in parallel. Reports are in arena order.
    pub fn regenerate_all(&mut self) -> Result<Vec<ExtractReport>> {
        let extractor = self.editor.extractor();
        let reports = self
            .grid
            .par_iter_mut()
            .map(|chunk| extractor.extract(chunk))
            .collect::<Result<Vec<_>>>()?;

        let triangles: u64 = reports.iter().map(|r| r.triangle_count as u64).sum();
        let overflowed = reports.iter().filter(|r| r.overflowed).count();
        if overflowed > 0 {
            log::warn!("{} chunks overflowed their triangle accumulator", overflowed);
        }
        log::info!("Regenerated {} chunks, {} triangles", reports.len(), triangles);
        Ok(reports)
    }

    /// Remove material in a sphere (world units) and remesh affected chunks.
    pub fn carve_sphere(&mut self, center: Vec3, radius: f32, strength: f32) -> Result<EditReport> {
        self.editor.carve(&mut self.grid, center, radius, strength)
    }

    /// Add material in a sphere (world units) and remesh affected chunks.
    pub fn fill_sphere(&mut self, center: Vec3, radius: f32, strength: f32) -> Result<EditReport> {
        self.editor.fill(&mut self.grid, center, radius, strength)
    }

    /// Nearest surface point within `radius` of `center`.
    pub fn sphere_query(&mut self, center: Vec3, radius: f32) -> Result<QueryOutcome> {
        if !(radius.is_finite() && radius >= 0.0) {
            return Err(Error::InvalidArgument(format!("query radius must be non-negative, got {}", radius)));
        }
        crate::query::sphere_query(&self.grid, &mut self.query, center, radius)
    }

    /// Nearest surface hit of `origin + s * direction`, `s in [0, 1]`.
    pub fn raycast_query(&mut self, origin: Vec3, direction: Vec3) -> Result<QueryOutcome> {
        let settings = RaycastSettings { max_hops: self.config.max_raycast_hops };
        crate::query::raycast(&self.grid, &mut self.query, origin, direction, settings)
    }

    /// Run one edit command now.
    pub fn apply(&mut self, command: EditCommand) -> Result<EditReport> {
        match command {
            EditCommand::Carve { center, radius, strength } => self.carve_sphere(center, radius, strength),
            EditCommand::Fill { center, radius, strength } => self.fill_sphere(center, radius, strength),
            EditCommand::CarveAlongRay { origin, direction, radius, strength } => {
                match self.raycast_query(origin, direction)?.hit {
                    Some(hit) => self.carve_sphere(hit.position, radius, strength),
                    None => {
                        log::debug!("CarveAlongRay from {:?} hit nothing", origin);
                        Ok(EditReport::default())
                    }
                }
            }
        }
    }

    /// Queue a command for [`Self::process`].
    pub fn submit(&mut self, command: EditCommand) {
        self.queue.push(command);
    }

    /// Apply queued commands in submission order.
    ///
    /// On error the failing command is dropped and later ones stay queued.
    pub fn process(&mut self) -> Result<Vec<EditReport>> {
        let mut reports = Vec::with_capacity(self.queue.len());
        while let Some(command) = self.queue.pop() {
            reports.push(self.apply(command)?);
        }
        Ok(reports)
    }
}
