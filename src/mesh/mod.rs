//! Isosurface meshes: geometry buffers, marching cubes and the extraction pipeline

pub mod geometry;
pub mod tables;
pub mod polygonise;
pub mod extractor;

pub use geometry::{GeometryBuffers, Vertex};
pub use polygonise::{polygonise_cell, MAX_TRIANGLES_PER_CELL};
pub use extractor::{ExtractReport, IsosurfaceExtractor};
