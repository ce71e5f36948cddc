//! Boundary-consistency pass between neighbouring chunks.
//!
//! Chunk origins are `(n - 1)` voxels apart, so the last three sample layers
//! of a chunk (`n - 1`, `n` and the apron `n + 1`) sit at the same world
//! positions as the first three layers of its higher-index neighbour. The
//! higher-index chunk owns those samples. Syncing copies the owner's values
//! into the lower chunk so both triangulate identical data along the seam,
//! for all 26 neighbour directions.

use glam::{BVec3, IVec3, UVec3};

use crate::voxel::chunk::ChunkId;
use crate::voxel::grid::ChunkGrid;

/// Sync every chunk of the grid. Returns the number of samples rewritten.
pub fn sync_borders<R>(grid: &mut ChunkGrid<R>) -> usize {
    let all: Vec<ChunkId> = (0..grid.len()).map(ChunkId).collect();
    sync_chunks(grid, &all)
}

/// Sync only `targets`; samples of other chunks are read but never written.
///
/// Targets are processed from the highest arena slot down, so an owner that
/// is itself a target is settled before anything copies from it.
pub fn sync_chunks<R>(grid: &mut ChunkGrid<R>, targets: &[ChunkId]) -> usize {
    let mut order = targets.to_vec();
    order.sort_unstable();
    order.dedup();

    let mut written = 0;
    for &id in order.iter().rev() {
        let updates = collect_owned(grid, id);
        if updates.is_empty() {
            continue;
        }
        let field = grid.chunk_mut(id).density_mut();
        for &(slot, value) in &updates {
            field.samples_mut()[slot] = value;
        }
        written += updates.len();
    }

    if written > 0 {
        log::debug!("Border sync rewrote {} samples in {} chunks", written, order.len());
    }
    written
}

/// Values owned by higher-index neighbours, as `(sample slot, value)`.
fn collect_owned<R>(grid: &ChunkGrid<R>, id: ChunkId) -> Vec<(usize, f32)> {
    let chunk = grid.chunk(id);
    let index = chunk.index();

    // Axes with a neighbour on the high side
    let reach = IVec3::new(
        grid.is_valid_index(index.as_ivec3() + IVec3::X) as i32,
        grid.is_valid_index(index.as_ivec3() + IVec3::Y) as i32,
        grid.is_valid_index(index.as_ivec3() + IVec3::Z) as i32,
    );
    if reach == IVec3::ZERO {
        return Vec::new();
    }

    let field = chunk.density();
    let shared = field.chunk_size() - 1;
    let mut updates = Vec::new();

    for slot in 0..field.len() {
        let s = field.coord(slot);
        let owner = owner_offset(s, shared, reach);
        if owner == IVec3::ZERO {
            continue;
        }
        let Some(source) = grid.get(index.offset(owner)) else {
            continue;
        };
        let t = (s.as_ivec3() - owner * shared as i32).as_uvec3();
        updates.push((slot, source.density().get(t.x, t.y, t.z)));
    }
    updates
}

/// Offset of the chunk owning sample `s`, zero when the chunk owns it itself.
#[inline]
fn owner_offset(s: UVec3, shared: u32, reach: IVec3) -> IVec3 {
    let high: BVec3 = s.cmpge(UVec3::splat(shared));
    IVec3::select(high, IVec3::ONE, IVec3::ZERO) * reach
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::TerrainConfig;
    use crate::voxel::chunk::ChunkIndex;

    fn grid(n: u32, dims: UVec3) -> ChunkGrid<()> {
        ChunkGrid::new(&TerrainConfig::small(n, dims)).unwrap()
    }

    /// Fill each chunk with a function of world position plus a per-chunk bias
    /// so unsynced samples are detectable.
    fn fill_biased(grid: &mut ChunkGrid<()>) {
        let scale = grid.scale();
        for (k, chunk) in grid.iter_mut().enumerate() {
            let origin = chunk.origin();
            chunk.density_mut().fill_with(|s| {
                let p = origin + s.as_vec3() * scale;
                (p.x * 0.01 + p.y * 0.02 + p.z * 0.03) + k as f32
            });
        }
    }

    fn world_value_matches(grid: &ChunkGrid<()>, a: ChunkIndex, b: ChunkIndex) {
        let ca = grid.get(a).unwrap();
        let cb = grid.get(b).unwrap();
        let dim = ca.density().dim();
        for slot in 0..ca.density().len() {
            let s = ca.density().coord(slot);
            let world = ca.origin() + s.as_vec3() * grid.scale();
            let t = cb.world_to_local(world).round().as_ivec3();
            if t.cmpge(IVec3::ZERO).all() && t.cmplt(IVec3::splat(dim as i32)).all() {
                let tb = t.as_uvec3();
                assert_eq!(
                    ca.density().get(s.x, s.y, s.z),
                    cb.density().get(tb.x, tb.y, tb.z),
                    "sample {:?} of {:?} differs from {:?} of {:?}",
                    s, a, tb, b
                );
            }
        }
    }

    #[test]
    fn test_sync_along_x() {
        let mut grid = grid(4, UVec3::new(2, 1, 1));
        fill_biased(&mut grid);
        let written = sync_borders(&mut grid);
        // Three layers of 6x6 samples
        assert_eq!(written, 3 * 36);
        world_value_matches(&grid, ChunkIndex::new(0, 0, 0), ChunkIndex::new(1, 0, 0));
    }

    #[test]
    fn test_sync_all_neighbours() {
        let mut grid = grid(5, UVec3::new(2, 2, 2));
        fill_biased(&mut grid);
        sync_borders(&mut grid);
        let all: Vec<ChunkIndex> = grid.iter().map(|c| c.index()).collect();
        for &a in &all {
            for &b in &all {
                if a != b {
                    world_value_matches(&grid, a, b);
                }
            }
        }
    }

    #[test]
    fn test_last_chunk_is_untouched() {
        let mut grid = grid(4, UVec3::new(2, 2, 1));
        fill_biased(&mut grid);
        let before = grid.get(ChunkIndex::new(1, 1, 0)).unwrap().density().clone();
        sync_borders(&mut grid);
        assert_eq!(grid.get(ChunkIndex::new(1, 1, 0)).unwrap().density(), &before);
    }

    #[test]
    fn test_sync_chunks_writes_only_targets() {
        let mut grid = grid(4, UVec3::new(3, 1, 1));
        fill_biased(&mut grid);
        let untouched = grid.get(ChunkIndex::new(0, 0, 0)).unwrap().density().clone();
        let target = grid.id(ChunkIndex::new(1, 0, 0)).unwrap();
        sync_chunks(&mut grid, &[target]);
        assert_eq!(grid.get(ChunkIndex::new(0, 0, 0)).unwrap().density(), &untouched);
        world_value_matches(&grid, ChunkIndex::new(1, 0, 0), ChunkIndex::new(2, 0, 0));
    }

    #[test]
    fn test_sync_is_idempotent() {
        let mut grid = grid(6, UVec3::new(2, 1, 2));
        fill_biased(&mut grid);
        sync_borders(&mut grid);
        let snapshot: Vec<_> = grid.iter().map(|c| c.density().clone()).collect();
        sync_borders(&mut grid);
        for (chunk, before) in grid.iter().zip(&snapshot) {
            assert_eq!(chunk.density(), before);
        }
    }
}
