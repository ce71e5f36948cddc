//! Ray/mesh and sphere/mesh nearest-hit queries

pub mod candidate;
pub mod hit;
pub mod mesh_query;
pub mod raycast;

pub use candidate::Candidate;
pub use hit::{Hit, QueryOutcome};
pub use mesh_query::GeometryQuery;
pub use raycast::{chunk_walk, raycast, sphere_query, RaycastSettings};
