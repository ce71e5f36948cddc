//! Triangle primitives used by the mesh query kernels.

use glam::Vec3;

/// Parallel-ray rejection threshold for Möller–Trumbore.
const RAY_EPSILON: f32 = 1e-7;

/// Triangle given by three corners.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Triangle {
    pub a: Vec3,
    pub b: Vec3,
    pub c: Vec3,
}

impl Triangle {
    pub fn new(a: Vec3, b: Vec3, c: Vec3) -> Self {
        Self { a, b, c }
    }

    /// Unnormalized face normal (length = 2 * area).
    pub fn cross(&self) -> Vec3 {
        (self.b - self.a).cross(self.c - self.a)
    }

    pub fn area(&self) -> f32 {
        self.cross().length() * 0.5
    }

    /// Unit face normal, or zero for degenerate triangles.
    pub fn normal(&self) -> Vec3 {
        self.cross().normalize_or_zero()
    }

    /// Point on the triangle nearest to `p`, with its barycentric weights
    /// `(wa, wb, wc)`.
    ///
    /// Region classification after Ericson, "Real-Time Collision Detection" 5.1.5.
    pub fn closest_point(&self, p: Vec3) -> (Vec3, Vec3) {
        let (a, b, c) = (self.a, self.b, self.c);
        let ab = b - a;
        let ac = c - a;
        let ap = p - a;

        let d1 = ab.dot(ap);
        let d2 = ac.dot(ap);
        if d1 <= 0.0 && d2 <= 0.0 {
            return (a, Vec3::X);
        }

        let bp = p - b;
        let d3 = ab.dot(bp);
        let d4 = ac.dot(bp);
        if d3 >= 0.0 && d4 <= d3 {
            return (b, Vec3::Y);
        }

        let vc = d1 * d4 - d3 * d2;
        if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
            let v = d1 / (d1 - d3);
            return (a + ab * v, Vec3::new(1.0 - v, v, 0.0));
        }

        let cp = p - c;
        let d5 = ab.dot(cp);
        let d6 = ac.dot(cp);
        if d6 >= 0.0 && d5 <= d6 {
            return (c, Vec3::Z);
        }

        let vb = d5 * d2 - d1 * d6;
        if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
            let w = d2 / (d2 - d6);
            return (a + ac * w, Vec3::new(1.0 - w, 0.0, w));
        }

        let va = d3 * d6 - d5 * d4;
        if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
            let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
            return (b + (c - b) * w, Vec3::new(0.0, 1.0 - w, w));
        }

        let denom = 1.0 / (va + vb + vc);
        let v = vb * denom;
        let w = vc * denom;
        (a + ab * v + ac * w, Vec3::new(1.0 - v - w, v, w))
    }

    /// Möller–Trumbore ray intersection, double sided.
    ///
    /// `direction` need not be normalized; the returned `t` is in units of it.
    /// Returns `(t, u, v)` with barycentrics `(1-u-v, u, v)` for hits at `t >= 0`.
    pub fn intersect_ray(&self, origin: Vec3, direction: Vec3) -> Option<(f32, f32, f32)> {
        let edge1 = self.b - self.a;
        let edge2 = self.c - self.a;
        let h = direction.cross(edge2);
        let det = edge1.dot(h);
        if det.abs() < RAY_EPSILON {
            return None;
        }

        let inv_det = 1.0 / det;
        let s = origin - self.a;
        let u = s.dot(h) * inv_det;
        if !(0.0..=1.0).contains(&u) {
            return None;
        }

        let q = s.cross(edge1);
        let v = direction.dot(q) * inv_det;
        if v < 0.0 || u + v > 1.0 {
            return None;
        }

        let t = edge2.dot(q) * inv_det;
        (t >= 0.0).then_some((t, u, v))
    }
}
