use glam::{Vec2, Vec3};

use crate::{host::HostMesh, utils::math::triangle_tangent};

/// Per-corner tangents from the first triangle of each polygon.
///
/// `uvs` may be per-corner or per-point. Fails on the first face whose UV
/// mapping is degenerate.
pub fn corner_tangents(mesh: &HostMesh, uvs: &[Vec2]) -> Result<Vec<Vec3>, String> {
    let per_corner = uvs.len() == mesh.corner_count();
    if !per_corner && uvs.len() != mesh.point_count() {
        return Err(format!(
            "uv layer has {} values for {} corners",
            uvs.len(),
            mesh.corner_count()
        ));
    }

    let mut tangents = Vec::with_capacity(mesh.corner_count());
    let mut corner = 0;
    for (face, polygon) in mesh.polygons.iter().enumerate() {
        if polygon.vertices.len() < 3 {
            return Err(format!("face {face} has fewer than three corners"));
        }
        let point = |i: usize| {
            mesh.positions
                .get(polygon.vertices[i] as usize)
                .copied()
                .unwrap_or(Vec3::ZERO)
        };
        let uv = |i: usize| {
            let index = if per_corner {
                corner + i
            } else {
                polygon.vertices[i] as usize
            };
            uvs.get(index).copied().unwrap_or(Vec2::ZERO)
        };
        let tangent = triangle_tangent([point(0), point(1), point(2)], [uv(0), uv(1), uv(2)])
            .ok_or_else(|| format!("degenerate uv mapping on face {face}"))?;
        tangents.extend(std::iter::repeat(tangent).take(polygon.vertices.len()));
        corner += polygon.vertices.len();
    }
    Ok(tangents)
}
