//! Additional math helpers layered on top of `glam`.

use glam::{Mat4, Vec2, Vec3};

/// Exact element-wise equality; motion detection must not hide sub-epsilon movement.
pub fn mat4_identical(a: &Mat4, b: &Mat4) -> bool {
    a.to_cols_array() == b.to_cols_array()
}

pub fn points_identical(a: &[Vec3], b: &[Vec3]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(p, q)| p == q)
}

/// Unnormalized polygon normal by Newell's method; its length is twice the polygon area.
pub fn newell_normal(points: &[Vec3], polygon: &[u32]) -> Vec3 {
    let mut normal = Vec3::ZERO;
    let count = polygon.len();
    for i in 0..count {
        let current = points
            .get(polygon[i] as usize)
            .copied()
            .unwrap_or(Vec3::ZERO);
        let next = points
            .get(polygon[(i + 1) % count] as usize)
            .copied()
            .unwrap_or(Vec3::ZERO);
        normal.x += (current.y - next.y) * (current.z + next.z);
        normal.y += (current.z - next.z) * (current.x + next.x);
        normal.z += (current.x - next.x) * (current.y + next.y);
    }
    normal
}

/// Tangent along +u for a triangle with texture coordinates, or `None` when
/// the UV mapping is degenerate.
pub fn triangle_tangent(p: [Vec3; 3], uv: [Vec2; 3]) -> Option<Vec3> {
    let edge1 = p[1] - p[0];
    let edge2 = p[2] - p[0];
    let duv1 = uv[1] - uv[0];
    let duv2 = uv[2] - uv[0];
    let det = duv1.x * duv2.y - duv2.x * duv1.y;
    if det.abs() < 1e-12 {
        return None;
    }
    let tangent = (edge1 * duv2.y - edge2 * duv1.y) / det;
    let tangent = tangent.normalize_or_zero();
    if tangent == Vec3::ZERO {
        None
    } else {
        Some(tangent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn newell_normal_of_unit_quad_points_up() {
        let points = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        ];
        let n = newell_normal(&points, &[0, 1, 2, 3]);
        assert_relative_eq!(n.z, 2.0);
        assert_relative_eq!(n.x, 0.0);
    }

    #[test]
    fn degenerate_uvs_have_no_tangent() {
        let p = [Vec3::ZERO, Vec3::X, Vec3::Y];
        assert!(triangle_tangent(p, [Vec2::ZERO; 3]).is_none());
        let t = triangle_tangent(p, [Vec2::ZERO, Vec2::X, Vec2::Y]).unwrap();
        assert_relative_eq!(t.x, 1.0);
    }
}
