use crate::{
    config::CREASE_SHARPNESS_SCALE,
    host::{EdgeCrease, HostMesh, SubdivSettings},
    retained::{SubdivTag, Subdivision},
};

/// Renderer sharpness approximating the host's visual crease strength.
pub fn crease_sharpness(weight: f32) -> f32 {
    weight * weight * CREASE_SHARPNESS_SCALE
}

fn crease_tag(crease: &EdgeCrease) -> Option<SubdivTag> {
    if crease.weight <= 0.0 {
        return None;
    }
    Some(SubdivTag {
        name: "crease",
        ints: vec![crease.v0 as i32, crease.v1 as i32],
        floats: vec![crease_sharpness(crease.weight)],
    })
}

/// Subdivision scheme and tags for `mesh`, or `None` for a polygon mesh.
pub fn subdivision_tags(mesh: &HostMesh) -> Option<Subdivision> {
    let settings: SubdivSettings = mesh.subdivision?;
    let mut tags = vec![
        SubdivTag {
            name: "interpolateboundary",
            ints: vec![settings.boundary.code()],
            floats: Vec::new(),
        },
        SubdivTag {
            name: "facevaryinginterpolateboundary",
            ints: vec![settings.face_varying.code()],
            floats: Vec::new(),
        },
    ];
    tags.extend(mesh.creases.iter().filter_map(crease_tag));
    Some(Subdivision {
        scheme: settings.scheme.as_str(),
        tags,
    })
}
