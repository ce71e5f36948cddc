//! Per-triangle contact candidates, written by the query kernels.

use glam::Vec3;

use crate::mesh::GeometryBuffers;

/// A contact recorded by a query kernel, in mesh-local units.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Candidate {
    pub position: Vec3,
    /// Interpolated vertex normal at `position`
    pub normal: Vec3,
}

fn interpolated_normal(geometry: &GeometryBuffers, triangle: usize, bary: Vec3) -> Vec3 {
    let [na, nb, nc] = geometry.triangle_normals(triangle);
    (na * bary.x + nb * bary.y + nc * bary.z).normalize_or_zero()
}

/// Sphere test of one triangle: the triangle point nearest `center`, if it
/// lies within `radius`.
pub fn sphere_candidate(
    geometry: &GeometryBuffers,
    triangle: usize,
    center: Vec3,
    radius: f32,
) -> Option<Candidate> {
    let (position, bary) = geometry.triangle(triangle).closest_point(center);
    if position.distance_squared(center) > radius * radius {
        return None;
    }
    Some(Candidate {
        position,
        normal: interpolated_normal(geometry, triangle, bary),
    })
}

/// Ray test of one triangle at any `t >= 0` along `direction`.
pub fn ray_candidate(
    geometry: &GeometryBuffers,
    triangle: usize,
    origin: Vec3,
    direction: Vec3,
) -> Option<Candidate> {
    let (t, u, v) = geometry.triangle(triangle).intersect_ray(origin, direction)?;
    Some(Candidate {
        position: origin + direction * t,
        normal: interpolated_normal(geometry, triangle, Vec3::new(1.0 - u - v, u, v)),
    })
}
