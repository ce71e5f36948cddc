//! Delve - chunked density terrain with marching-cubes meshing, sphere
//! carve/fill edits and mesh queries on a pluggable compute backend

pub mod core;
pub mod math;
pub mod voxel;
pub mod mesh;
pub mod compute;
pub mod edit;
pub mod query;
pub mod terrain;
