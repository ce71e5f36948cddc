//! Grid-level queries: chunk-walking raycast and multi-chunk sphere query.

use glam::{IVec3, Vec3};

use crate::compute::ComputeBackend;
use crate::core::types::Result;
use crate::math::Ray;
use crate::query::hit::QueryOutcome;
use crate::query::mesh_query::GeometryQuery;
use crate::voxel::chunk::ChunkIndex;
use crate::voxel::grid::ChunkGrid;

/// Limits of the chunk walk.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RaycastSettings {
    /// Chunks visited before giving up
    pub max_hops: u32,
}

impl Default for RaycastSettings {
    fn default() -> Self {
        Self { max_hops: 10 }
    }
}

/// Chunk cells crossed by the segment `origin + s * direction`, `s in [0, 1]`,
/// front to back, at most `max_hops` of them.
///
/// 3-D DDA over the step-sized cells of the grid partition: every cell the
/// segment passes through is visited, however short the clipped piece. Empty
/// when the segment never enters the grid box.
pub fn chunk_walk<R>(grid: &ChunkGrid<R>, origin: Vec3, direction: Vec3, max_hops: u32) -> Vec<ChunkIndex> {
    let mut cells = Vec::new();
    let Some((ray, length)) = Ray::from_segment(origin, direction) else {
        return cells;
    };
    let bounds = grid.bounds();
    let Some((t_enter, _)) = ray.intersects_aabb(&bounds) else {
        return cells;
    };
    if t_enter > length {
        return cells;
    }

    // The slab entry point can round to just outside the box; clamp it in.
    let entry = bounds.closest_point(ray.at(t_enter));
    let last = grid.dims().as_ivec3() - IVec3::ONE;
    let mut cell = grid.world_to_chunk_index(entry).clamp(IVec3::ZERO, last);

    let size = grid.step_size();
    let dir = ray.direction;
    let step = IVec3::new(axis_step(dir.x), axis_step(dir.y), axis_step(dir.z));
    let mut t_max = Vec3::ZERO;
    let mut t_delta = Vec3::ZERO;
    for axis in 0..3 {
        if step[axis] == 0 {
            t_max[axis] = f32::INFINITY;
            t_delta[axis] = f32::INFINITY;
            continue;
        }
        let next = cell[axis] + step[axis].max(0);
        let boundary = bounds.min[axis] + next as f32 * size;
        t_max[axis] = (boundary - ray.origin[axis]) / dir[axis];
        t_delta[axis] = size / dir[axis].abs();
    }

    let mut t = t_enter;
    while (cells.len() as u32) < max_hops && t <= length && grid.is_valid_index(cell) {
        cells.push(ChunkIndex::from(cell));

        let axis = if t_max.x <= t_max.y && t_max.x <= t_max.z {
            0
        } else if t_max.y <= t_max.z {
            1
        } else {
            2
        };
        t = t_max[axis];
        t_max[axis] += t_delta[axis];
        cell[axis] += step[axis];
    }
    cells
}

fn axis_step(d: f32) -> i32 {
    if d > 0.0 {
        1
    } else if d < 0.0 {
        -1
    } else {
        0
    }
}

/// Nearest hit of the segment `origin + s * direction`, `s in [0, 1]`,
/// against the grid's meshes.
///
/// Rays that never enter the grid box cost no dispatch. Inside, the chunks
/// from [`chunk_walk`] are queried front to back with the full original
/// segment; chunks with empty meshes are skipped and the first chunk that
/// reports a hit ends the walk.
pub fn raycast<B: ComputeBackend>(
    grid: &ChunkGrid<B::ChunkResources>,
    query: &mut GeometryQuery<B>,
    origin: Vec3,
    direction: Vec3,
    settings: RaycastSettings,
) -> Result<QueryOutcome> {
    let mut outcome = QueryOutcome::miss();
    let cells = chunk_walk(grid, origin, direction, settings.max_hops);
    log::trace!("raycast from {:?} crosses {} chunks", origin, cells.len());

    for index in cells {
        let Some(chunk) = grid.get(index) else {
            break;
        };
        if chunk.geometry().is_empty() {
            continue;
        }
        outcome.merge(query.ray_intersect_mesh(chunk, origin, direction)?);
        if outcome.is_hit() {
            break;
        }
    }
    Ok(outcome)
}

/// Nearest mesh point within `radius` of `center` over every chunk whose box
/// intersects the sphere. Chunks with empty meshes are skipped.
pub fn sphere_query<B: ComputeBackend>(
    grid: &ChunkGrid<B::ChunkResources>,
    query: &mut GeometryQuery<B>,
    center: Vec3,
    radius: f32,
) -> Result<QueryOutcome> {
    let mut outcome = QueryOutcome::miss();
    for index in grid.chunks_intersecting(center, radius) {
        let Some(chunk) = grid.get(index) else {
            continue;
        };
        if chunk.geometry().is_empty() {
            continue;
        }
        outcome.merge(query.sphere_intersect_mesh(chunk, center, radius)?);
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use glam::UVec3;

    use crate::compute::CpuBackend;
    use crate::core::config::TerrainConfig;
    use crate::mesh::IsosurfaceExtractor;
    use crate::voxel::border::sync_borders;

    type CpuGrid = ChunkGrid<<CpuBackend as ComputeBackend>::ChunkResources>;

    /// 3x2x3 grid of 9-cell chunks (step 8, bounds [0, 24]x[0, 16]x[0, 24]).
    fn grid() -> (Arc<CpuBackend>, CpuGrid) {
        let backend = Arc::new(CpuBackend::new());
        let grid = ChunkGrid::new(&TerrainConfig::small(9, UVec3::new(3, 2, 3))).unwrap();
        (backend, grid)
    }

    /// Solid block in samples [1, n-1]^3 of one chunk, then remesh everything.
    fn solid_block(backend: &Arc<CpuBackend>, grid: &mut CpuGrid, index: ChunkIndex) {
        let n = grid.chunk_size();
        let chunk = grid.get_mut(index).unwrap();
        chunk.density_mut().fill_with(|p| {
            let inside = p.cmpge(UVec3::ONE).all() && p.cmple(UVec3::splat(n - 1)).all();
            if inside { 1.0 } else { 0.0 }
        });
        let extractor = IsosurfaceExtractor::new(backend.clone(), 0.5);
        for chunk in grid.iter_mut() {
            extractor.extract(chunk).unwrap();
        }
    }

    #[test]
    fn test_ray_pointing_away_costs_nothing() {
        let (backend, mut grid) = grid();
        solid_block(&backend, &mut grid, ChunkIndex::new(0, 0, 0));
        let mut query = GeometryQuery::new(backend.clone()).unwrap();

        let before = backend.stats().dispatches();
        let outcome = raycast(
            &grid,
            &mut query,
            Vec3::new(-10.0, 5.0, 5.0),
            Vec3::new(-100.0, 0.0, 0.0),
            RaycastSettings::default(),
        )
        .unwrap();
        assert!(outcome.hit.is_none());
        assert_eq!(outcome.dispatches, 0);
        assert_eq!(backend.stats().dispatches(), before);
    }

    #[test]
    fn test_ray_too_short_to_reach_grid() {
        let (backend, grid) = grid();
        let mut query = GeometryQuery::new(backend.clone()).unwrap();
        let outcome = raycast(
            &grid,
            &mut query,
            Vec3::new(-10.0, 5.0, 5.0),
            Vec3::new(5.0, 0.0, 0.0),
            RaycastSettings::default(),
        )
        .unwrap();
        assert!(outcome.hit.is_none());
        assert_eq!(backend.stats().dispatches(), 0);
    }

    #[test]
    fn test_ray_from_far_outside_hits_solid_chunk() {
        let (backend, mut grid) = grid();
        solid_block(&backend, &mut grid, ChunkIndex::new(0, 0, 0));
        let mut query = GeometryQuery::new(backend).unwrap();

        let center = grid.get(ChunkIndex::new(0, 0, 0)).unwrap().world_bounds().center();
        let origin = Vec3::new(-40.0, 30.0, -25.0);
        let direction = (center - origin) * 2.0;
        let outcome = raycast(&grid, &mut query, origin, direction, RaycastSettings::default()).unwrap();

        let hit = outcome.hit.unwrap();
        assert_eq!(hit.chunk, ChunkIndex::new(0, 0, 0));
        let n = grid.chunk_size() as f32 * grid.scale();
        assert!(hit.position.distance(center) <= n * 3f32.sqrt() / 2.0);
        assert!(hit.distance < origin.distance(center));
        assert!(hit.normal.dot(direction) < 0.0);
    }

    #[test]
    fn test_ray_walks_through_empty_chunks() {
        let (backend, mut grid) = grid();
        solid_block(&backend, &mut grid, ChunkIndex::new(2, 0, 0));
        let mut query = GeometryQuery::new(backend).unwrap();

        // Starts inside chunk (0,0,0), travels +x across two chunks
        let origin = Vec3::new(0.5, 4.3, 4.6);
        let outcome = raycast(
            &grid,
            &mut query,
            origin,
            Vec3::new(30.0, 0.0, 0.0),
            RaycastSettings::default(),
        )
        .unwrap();
        let hit = outcome.hit.unwrap();
        assert_eq!(hit.chunk, ChunkIndex::new(2, 0, 0));
        // Block face at local x = 0.5 of chunk 2 (origin x = 16)
        assert!((hit.position.x - 16.5).abs() < 1e-3);
    }

    #[test]
    fn test_ray_gives_up_after_hop_budget() {
        let (backend, mut grid) = grid();
        solid_block(&backend, &mut grid, ChunkIndex::new(2, 0, 0));
        let mut query = GeometryQuery::new(backend).unwrap();

        let settings = RaycastSettings { max_hops: 1 };
        let outcome = raycast(
            &grid,
            &mut query,
            Vec3::new(0.5, 4.3, 4.6),
            Vec3::new(30.0, 0.0, 0.0),
            settings,
        )
        .unwrap();
        assert!(outcome.hit.is_none());
    }

    /// Ground solid up to world y = 8 in every chunk, remeshed.
    fn ground(backend: &Arc<CpuBackend>, grid: &mut CpuGrid) {
        let scale = grid.scale();
        for chunk in grid.iter_mut() {
            let origin = chunk.origin();
            chunk
                .density_mut()
                .fill_with(|p| if origin.y + p.y as f32 * scale <= 8.0 { 1.0 } else { 0.0 });
        }
        sync_borders(grid);
        let extractor = IsosurfaceExtractor::new(backend.clone(), 0.5);
        for chunk in grid.iter_mut() {
            extractor.extract(chunk).unwrap();
        }
    }

    /// Deterministic LCG for reproducible ray sets
    struct SimpleRng {
        state: u64,
    }

    impl SimpleRng {
        fn new(seed: u64) -> Self {
            Self { state: seed }
        }

        fn next(&mut self) -> u64 {
            self.state = self.state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            self.state
        }

        fn range(&mut self, lo: f32, hi: f32) -> f32 {
            let unit = (self.next() >> 40) as f32 / (1u64 << 24) as f32;
            lo + (hi - lo) * unit
        }
    }

    #[test]
    fn test_chunk_walk_visits_cells_in_order() {
        let (_, grid) = grid();
        let cells = chunk_walk(&grid, Vec3::new(0.5, 4.3, 4.6), Vec3::new(30.0, 0.0, 0.0), 10);
        assert_eq!(
            cells,
            vec![ChunkIndex::new(0, 0, 0), ChunkIndex::new(1, 0, 0), ChunkIndex::new(2, 0, 0)]
        );
        // Budget caps the walk
        assert_eq!(chunk_walk(&grid, Vec3::new(0.5, 4.3, 4.6), Vec3::new(30.0, 0.0, 0.0), 2).len(), 2);
        // Stops where the segment ends
        assert_eq!(chunk_walk(&grid, Vec3::new(0.5, 4.3, 4.6), Vec3::new(5.0, 0.0, 0.0), 10).len(), 1);
    }

    #[test]
    fn test_chunk_walk_keeps_corner_clipped_cell() {
        let (_, grid) = grid();
        // Crosses y = 8 at x = 7.97 and x = 8 at y = 8.03: the piece inside
        // cell (0,1,0) is about 0.04 long
        let cells = chunk_walk(&grid, Vec3::new(0.0, 0.03, 4.0), Vec3::new(20.0, 20.0, 0.0), 10);
        assert_eq!(
            cells,
            vec![ChunkIndex::new(0, 0, 0), ChunkIndex::new(0, 1, 0), ChunkIndex::new(1, 1, 0)]
        );
    }

    #[test]
    fn test_chunk_walk_enters_from_outside() {
        let (_, grid) = grid();
        let cells = chunk_walk(&grid, Vec3::new(-30.0, 4.3, 4.6), Vec3::new(60.0, 0.0, 0.0), 10);
        assert_eq!(cells.first(), Some(&ChunkIndex::new(0, 0, 0)));
        assert_eq!(cells.len(), 3);

        // Entry on the max face starts in the last chunk
        let cells = chunk_walk(&grid, Vec3::new(40.0, 4.3, 4.6), Vec3::new(-60.0, 0.0, 0.0), 10);
        assert_eq!(cells.first(), Some(&ChunkIndex::new(2, 0, 0)));

        assert!(chunk_walk(&grid, Vec3::new(-30.0, 4.3, 4.6), Vec3::new(-60.0, 0.0, 0.0), 10).is_empty());
    }

    #[test]
    fn test_random_rays_from_outside_hit_ground() {
        let (backend, mut grid) = grid();
        ground(&backend, &mut grid);
        let mut query = GeometryQuery::new(backend).unwrap();
        let bounds = grid.bounds();

        // Surface at y = 8.5; targets sit just below it so the crossing stays
        // inside the grid whichever face the ray enters through
        let mut rng = SimpleRng::new(7);
        for _ in 0..300 {
            let origin = Vec3::new(rng.range(-40.0, 64.0), rng.range(17.0, 60.0), rng.range(-40.0, 64.0));
            let target = Vec3::new(rng.range(8.0, 16.0), rng.range(7.5, 8.2), rng.range(8.0, 16.0));
            assert!(!bounds.contains_point(origin));

            let outcome = raycast(&grid, &mut query, origin, target - origin, RaycastSettings::default()).unwrap();
            let hit = outcome
                .hit
                .unwrap_or_else(|| panic!("ray {:?} -> {:?} missed", origin, target));
            assert!((hit.position.y - 8.5).abs() < 1e-3, "hit {:?}", hit.position);
            assert!(outcome.dispatches > 0);
        }
    }

    #[test]
    fn test_sphere_query_across_chunks() {
        let (backend, mut grid) = grid();
        solid_block(&backend, &mut grid, ChunkIndex::new(1, 0, 1));
        let mut query = GeometryQuery::new(backend.clone()).unwrap();

        // Chunk (1,0,1) block spans world [8.5, 16.5] in x and z, y in [0.5, 8.5]
        let outcome = sphere_query(&grid, &mut query, Vec3::new(12.0, 10.0, 12.0), 2.0).unwrap();
        let hit = outcome.hit.unwrap();
        assert!((hit.position.y - 8.5).abs() < 1e-3);
        assert!((hit.distance - 1.5).abs() < 1e-3);

        let miss = sphere_query(&grid, &mut query, Vec3::new(12.0, 14.0, 12.0), 2.0).unwrap();
        assert!(miss.hit.is_none());
    }
}
