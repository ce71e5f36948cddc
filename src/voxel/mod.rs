//! Voxel data structures: density fields, chunks and the chunk grid

pub mod density;
pub mod chunk;
pub mod grid;
pub mod border;

pub use chunk::{Chunk, ChunkId, ChunkIndex};
pub use density::DensityField;
pub use grid::ChunkGrid;
pub use border::sync_borders;
