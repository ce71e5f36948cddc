//! Per-cell marching cubes.
//!
//! Shared by the CPU backend and mirrored by `shaders/triangulate.wgsl`.

use glam::{UVec3, Vec3};

use crate::mesh::geometry::Vertex;
use crate::mesh::tables::{CORNER_OFFSETS, EDGE_CORNERS, EDGE_TABLE, TRI_TABLE};
use crate::voxel::density::DensityField;

/// Upper bound of triangles a single cell can emit.
pub const MAX_TRIANGLES_PER_CELL: usize = 5;

/// Marching cubes case of the cell whose lower corner is `cell`.
pub fn cell_case(field: &DensityField, cell: UVec3, iso_level: f32) -> usize {
    let mut case = 0;
    for (i, offset) in CORNER_OFFSETS.iter().enumerate() {
        let p = cell + UVec3::from_array(*offset);
        if field.get(p.x, p.y, p.z) < iso_level {
            case |= 1 << i;
        }
    }
    case
}

/// Interpolation parameter of the iso crossing between two samples.
#[inline]
pub fn crossing(d0: f32, d1: f32, iso_level: f32) -> f32 {
    let delta = d1 - d0;
    if delta.abs() < 1e-6 {
        return 0.5;
    }
    ((iso_level - d0) / delta).clamp(0.0, 1.0)
}

/// Triangles of one cell, positions in chunk-local voxel units.
///
/// The cell must satisfy `cell < chunk_size` on every axis so that corner
/// reads stay inside the field.
pub fn polygonise_cell(field: &DensityField, cell: UVec3, iso_level: f32) -> Vec<[Vertex; 3]> {
    let case = cell_case(field, cell, iso_level);
    let crossed = EDGE_TABLE[case];
    if crossed == 0 {
        return Vec::new();
    }

    let corners: [UVec3; 8] = CORNER_OFFSETS.map(|o| cell + UVec3::from_array(o));

    let mut edge_vertices = [Vertex::default(); 12];
    for (edge, &[a, b]) in EDGE_CORNERS.iter().enumerate() {
        if crossed & (1 << edge) == 0 {
            continue;
        }
        let (ca, cb) = (corners[a], corners[b]);
        let da = field.get(ca.x, ca.y, ca.z);
        let db = field.get(cb.x, cb.y, cb.z);
        let t = crossing(da, db, iso_level);

        let position = ca.as_vec3().lerp(cb.as_vec3(), t);
        let gradient = field.gradient(ca).lerp(field.gradient(cb), t);
        edge_vertices[edge] = Vertex::new(position, surface_normal(gradient));
    }

    TRI_TABLE[case]
        .chunks_exact(3)
        .take_while(|tri| tri[0] >= 0)
        .map(|tri| {
            [
                edge_vertices[tri[0] as usize],
                edge_vertices[tri[1] as usize],
                edge_vertices[tri[2] as usize],
            ]
        })
        .collect()
}

/// Outward normal: density grows into the solid, so flip the gradient.
#[inline]
fn surface_normal(gradient: Vec3) -> Vec3 {
    (-gradient).normalize_or_zero()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crossing() {
        assert!((crossing(0.0, 1.0, 0.5) - 0.5).abs() < 1e-6);
        assert!((crossing(0.2, 0.6, 0.5) - 0.75).abs() < 1e-6);
        assert_eq!(crossing(0.5, 0.5, 0.5), 0.5);
    }

    #[test]
    fn test_uniform_cells_emit_nothing() {
        let empty = DensityField::new(4);
        let solid = DensityField::filled(4, 1.0);
        for cell in [UVec3::ZERO, UVec3::new(3, 3, 3), UVec3::new(1, 2, 3)] {
            assert!(polygonise_cell(&empty, cell, 0.5).is_empty());
            assert!(polygonise_cell(&solid, cell, 0.5).is_empty());
        }
    }

    #[test]
    fn test_single_corner_cell() {
        let mut field = DensityField::new(4);
        field.set(2, 2, 2, 1.0);
        // Corner 6 of cell (1,1,1) is the raised sample
        assert_eq!(cell_case(&field, UVec3::ONE, 0.5), 255 & !(1 << 6));
        let tris = polygonise_cell(&field, UVec3::ONE, 0.5);
        assert_eq!(tris.len(), 1);
        for v in tris[0] {
            // Crossings sit halfway along edges touching (2,2,2)
            assert!(((v.position - Vec3::splat(2.0)).length() - 0.5).abs() < 1e-5);
            assert!(v.normal.length() > 0.99);
        }
    }

    #[test]
    fn test_plane_normals_point_out_of_solid() {
        // Solid below y = 2.5
        let mut field = DensityField::new(6);
        field.fill_with(|p| if p.y <= 2 { 1.0 } else { 0.0 });
        let tris = polygonise_cell(&field, UVec3::new(2, 2, 2), 0.5);
        assert_eq!(tris.len(), 2);
        for tri in &tris {
            for v in tri {
                assert!((v.position.y - 2.5).abs() < 1e-6);
                assert!((v.normal - Vec3::Y).length() < 1e-5);
            }
        }
    }

    #[test]
    fn test_triangle_bound() {
        // Checkerboard corners give the densest cases
        let mut field = DensityField::new(2);
        field.fill_with(|p| ((p.x + p.y + p.z) % 2) as f32);
        let tris = polygonise_cell(&field, UVec3::ZERO, 0.5);
        assert!(!tris.is_empty());
        assert!(tris.len() <= MAX_TRIANGLES_PER_CELL);
    }
}
