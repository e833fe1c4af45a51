use glam::Vec3;

use crate::{config::PARALLEL_NORMALS_THRESHOLD, host::HostMesh, utils::math::newell_normal};

/// How per-face work is scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobMode {
    Serial,
    Parallel,
}

impl JobMode {
    /// Parallel only when allowed, compiled in, and the mesh is big enough.
    pub fn for_faces(parallel: bool, faces: usize) -> Self {
        if parallel && cfg!(feature = "parallel") && faces > PARALLEL_NORMALS_THRESHOLD {
            Self::Parallel
        } else {
            Self::Serial
        }
    }
}

/// Area-weighted (unnormalized) face normals.
pub fn raw_face_normals(mesh: &HostMesh, mode: JobMode) -> Vec<Vec3> {
    match mode {
        #[cfg(feature = "parallel")]
        JobMode::Parallel => {
            use rayon::prelude::*;
            mesh.polygons
                .par_iter()
                .map(|polygon| newell_normal(&mesh.positions, &polygon.vertices))
                .collect()
        }
        _ => mesh
            .polygons
            .iter()
            .map(|polygon| newell_normal(&mesh.positions, &polygon.vertices))
            .collect(),
    }
}

pub fn face_normals(mesh: &HostMesh, mode: JobMode) -> Vec<Vec3> {
    raw_face_normals(mesh, mode)
        .into_iter()
        .map(Vec3::normalize_or_zero)
        .collect()
}

/// Per-corner normals. Smooth faces take the area-weighted vertex normal,
/// flat faces repeat their face normal on every corner.
pub fn corner_normals(mesh: &HostMesh, smooth_all: bool, mode: JobMode) -> Vec<Vec3> {
    let raw = raw_face_normals(mesh, mode);
    let mut vertex = vec![Vec3::ZERO; mesh.point_count()];
    for (polygon, normal) in mesh.polygons.iter().zip(&raw) {
        for index in &polygon.vertices {
            if let Some(slot) = vertex.get_mut(*index as usize) {
                *slot += *normal;
            }
        }
    }
    for normal in &mut vertex {
        *normal = normal.normalize_or_zero();
    }

    let mut corners = Vec::with_capacity(mesh.corner_count());
    for (polygon, normal) in mesh.polygons.iter().zip(&raw) {
        let flat = normal.normalize_or_zero();
        for index in &polygon.vertices {
            let n = if smooth_all || polygon.smooth {
                vertex.get(*index as usize).copied().unwrap_or(flat)
            } else {
                flat
            };
            corners.push(n);
        }
    }
    corners
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Polygon;
    use approx::assert_relative_eq;

    fn tent() -> HostMesh {
        // Two quads folded 90 degrees along the shared edge 1-4.
        let positions = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, -1.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(1.0, 1.0, -1.0),
        ];
        HostMesh::new(
            "tent",
            positions,
            vec![Polygon::new([0, 1, 4, 3]), Polygon::new([1, 2, 5, 4])],
        )
    }

    #[test]
    fn flat_faces_repeat_face_normal() {
        let mesh = tent();
        let corners = corner_normals(&mesh, false, JobMode::Serial);
        assert_eq!(corners.len(), 8);
        assert_relative_eq!(corners[1].z, 1.0);
        assert_relative_eq!(corners[4].x, 1.0);
    }

    #[test]
    fn smooth_faces_average_shared_vertices() {
        let mesh = tent();
        let corners = corner_normals(&mesh, true, JobMode::Serial);
        let shared = corners[1];
        let half = std::f32::consts::FRAC_1_SQRT_2;
        assert_relative_eq!(shared.x, half, epsilon = 1e-6);
        assert_relative_eq!(shared.z, half, epsilon = 1e-6);
        assert_relative_eq!(corners[0].z, 1.0);
    }

    #[test]
    fn parallel_matches_serial() {
        let mesh = HostMesh::grid("big", 80, 60);
        let serial = face_normals(&mesh, JobMode::Serial);
        let parallel = face_normals(&mesh, JobMode::for_faces(true, mesh.face_count()));
        assert_eq!(serial, parallel);
    }
}
