use glam::{Vec2, Vec3};
use log::trace;

use super::{
    material::{partition, MaterialSubset},
    normals::{corner_normals, face_normals, JobMode},
    subdiv::subdivision_tags,
    tangents::corner_tangents,
};
use crate::{
    config::SyncSettings,
    error::ExtractionWarning,
    host::{AttributeLayer, HostMesh, HostObject},
    identity::sanitize,
    retained::{Detail, PrimvarSet, PrimvarValue, Topology},
};

/// Switches that shape one extraction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractOptions {
    pub smooth_normals: bool,
    /// Export normals even on subdivision meshes.
    pub force_normals: bool,
    pub export_tangents: bool,
    pub parallel: bool,
    /// Extra attribute layers to export besides the active ones.
    pub requested_layers: Vec<String>,
}

impl ExtractOptions {
    pub fn new(settings: &SyncSettings, object: &HostObject) -> Self {
        Self {
            smooth_normals: settings.smooth_normals,
            force_normals: object.forces_normals(),
            export_tangents: settings.export_tangents,
            parallel: settings.parallel,
            requested_layers: object.primvar_requests.clone(),
        }
    }
}

/// Renderer-ready flattening of one host mesh.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshExtract {
    pub topology: Topology,
    /// Every primvar except `P`, which is sent separately so it can carry
    /// deformation samples.
    pub primvars: PrimvarSet,
    pub positions: Vec<Vec3>,
    /// Ascending by material id; more than one entry means the mesh splits.
    pub subsets: Vec<MaterialSubset>,
}

impl MeshExtract {
    pub fn is_empty(&self) -> bool {
        self.topology.face_count() == 0
    }

    pub fn point_count(&self) -> usize {
        self.topology.point_count
    }

    pub fn face_count(&self) -> usize {
        self.topology.face_count()
    }

    pub fn corner_count(&self) -> usize {
        self.topology.corner_count()
    }

    pub fn is_split(&self) -> bool {
        self.subsets.len() > 1
    }
}

/// Element counts of the three canonical details.
#[derive(Debug, Clone, Copy)]
struct Counts {
    points: usize,
    faces: usize,
    corners: usize,
}

impl Counts {
    fn count(self, detail: Detail) -> usize {
        match detail {
            Detail::Constant => 1,
            Detail::Uniform => self.faces,
            Detail::Vertex => self.points,
            Detail::FaceVarying => self.corners,
        }
    }

    /// First detail in `order` whose count equals `len`.
    fn detail_for(self, len: usize, order: &[Detail]) -> Result<Detail, Vec<(Detail, usize)>> {
        order
            .iter()
            .copied()
            .find(|detail| self.count(*detail) == len)
            .ok_or_else(|| {
                order
                    .iter()
                    .map(|detail| (*detail, self.count(*detail)))
                    .collect()
            })
    }
}

const LAYER_DETAILS: [Detail; 2] = [Detail::FaceVarying, Detail::Vertex];
const REFERENCE_DETAILS: [Detail; 3] = [Detail::Vertex, Detail::FaceVarying, Detail::Uniform];

struct Extraction<'a> {
    mesh: &'a HostMesh,
    counts: Counts,
    primvars: PrimvarSet,
    warnings: &'a mut Vec<ExtractionWarning>,
}

impl Extraction<'_> {
    fn attach(&mut self, name: &str, order: &[Detail], value: PrimvarValue) {
        match self.counts.detail_for(value.len(), order) {
            Ok(detail) => self.primvars.set(name, detail, value),
            Err(expected) => self.warnings.push(ExtractionWarning::CardinalityMismatch {
                mesh: self.mesh.name.clone(),
                primvar: name.to_string(),
                len: value.len(),
                expected,
            }),
        }
    }

    fn uv_layer(&mut self, name: &str, layer: &AttributeLayer<Vec2>) {
        // Host V runs bottom-up, renderer t runs top-down.
        let st = layer.values.iter().map(|uv| Vec2::new(uv.x, 1.0 - uv.y)).collect();
        self.attach(name, &LAYER_DETAILS, PrimvarValue::Float2(st));
    }

    fn color_layer(&mut self, name: &str, layer: &AttributeLayer<Vec3>) {
        self.attach(name, &LAYER_DETAILS, PrimvarValue::Color(layer.values.clone()));
    }

    fn missing_layer(&mut self, layer: &str) {
        self.warnings.push(ExtractionWarning::MissingLayer {
            mesh: self.mesh.name.clone(),
            layer: layer.to_string(),
        });
    }

    fn tangent_failure(&mut self, reason: String) {
        self.warnings.push(ExtractionWarning::TangentFailure {
            mesh: self.mesh.name.clone(),
            reason,
        });
    }
}

fn topology(mesh: &HostMesh) -> Topology {
    Topology {
        point_count: mesh.point_count(),
        face_vertex_counts: mesh
            .polygons
            .iter()
            .map(|polygon| polygon.vertices.len() as i32)
            .collect(),
        face_vertex_indices: mesh
            .polygons
            .iter()
            .flat_map(|polygon| polygon.vertices.iter().map(|v| *v as i32))
            .collect(),
        subdivision: subdivision_tags(mesh),
    }
}

/// Flattens `mesh` into topology, primvars and material subsets.
///
/// Attribute problems are pushed to `warnings` and the attribute is left
/// out; extraction itself never fails.
pub fn extract(
    mesh: &HostMesh,
    options: &ExtractOptions,
    warnings: &mut Vec<ExtractionWarning>,
) -> MeshExtract {
    if mesh.polygons.is_empty() {
        return MeshExtract::default();
    }

    let topology = topology(mesh);
    let mode = JobMode::for_faces(options.parallel, mesh.face_count());
    let mut cx = Extraction {
        mesh,
        counts: Counts {
            points: mesh.point_count(),
            faces: mesh.face_count(),
            corners: mesh.corner_count(),
        },
        primvars: PrimvarSet::new(),
        warnings: &mut *warnings,
    };

    if topology.subdivision.is_none() || options.force_normals {
        let smooth = options.smooth_normals || mesh.smooth_all;
        if smooth || mesh.polygons.iter().any(|p| p.smooth) {
            let normals = corner_normals(mesh, smooth, mode);
            cx.primvars
                .set("N", Detail::FaceVarying, PrimvarValue::Normal(normals));
        } else {
            let normals = face_normals(mesh, mode);
            cx.primvars.set("N", Detail::Uniform, PrimvarValue::Normal(normals));
        }
    }

    if let Some(active) = mesh.uv_layers.first() {
        cx.uv_layer("st", active);
    }
    if let Some(active) = mesh.color_layers.first() {
        cx.color_layer("Cs", active);
    }
    for requested in &options.requested_layers {
        let uv = mesh.uv_layers.iter().position(|l| &l.name == requested);
        let color = mesh.color_layers.iter().position(|l| &l.name == requested);
        let name = sanitize(requested);
        match (uv, color) {
            (Some(0), _) | (None, Some(0)) => {}
            (Some(index), _) => cx.uv_layer(&name, &mesh.uv_layers[index]),
            (None, Some(index)) => cx.color_layer(&name, &mesh.color_layers[index]),
            (None, None) => cx.missing_layer(requested),
        }
    }

    if options.export_tangents {
        match mesh.uv_layers.first() {
            Some(active) => match corner_tangents(mesh, &active.values) {
                Ok(tangents) => {
                    cx.primvars
                        .set("Tn", Detail::FaceVarying, PrimvarValue::Vector(tangents))
                }
                Err(reason) => cx.tangent_failure(reason),
            },
            None => cx.tangent_failure("mesh has no uv layer".to_string()),
        }
    }

    let pose = &mesh.reference_pose;
    if let Some(pref) = &pose.pref {
        cx.attach("__Pref", &REFERENCE_DETAILS, PrimvarValue::Point(pref.clone()));
    }
    if let Some(wpref) = &pose.wpref {
        cx.attach("__WPref", &REFERENCE_DETAILS, PrimvarValue::Point(wpref.clone()));
    }
    if let Some(nref) = &pose.nref {
        cx.attach("__Nref", &REFERENCE_DETAILS, PrimvarValue::Normal(nref.clone()));
    }
    if let Some(wnref) = &pose.wnref {
        cx.attach("__WNref", &REFERENCE_DETAILS, PrimvarValue::Normal(wnref.clone()));
    }

    let primvars = cx.primvars;
    let subsets = partition(mesh, warnings);
    trace!(
        "{}: {} points, {} faces, {} primvars, {} material subsets",
        mesh.name,
        topology.point_count,
        topology.face_count(),
        primvars.len(),
        subsets.len()
    );
    MeshExtract {
        topology,
        primvars,
        positions: mesh.positions.clone(),
        subsets,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{Polygon, ReferencePose, SubdivSettings};

    fn options() -> ExtractOptions {
        ExtractOptions::default()
    }

    #[test]
    fn topology_is_flattened_per_corner() {
        let mesh = HostMesh::grid("plane", 2, 1);
        let out = extract(&mesh, &options(), &mut Vec::new());
        assert_eq!(out.topology.face_vertex_counts, vec![4, 4]);
        assert_eq!(
            out.topology.face_vertex_indices,
            vec![0, 1, 4, 3, 1, 2, 5, 4]
        );
        assert_eq!(out.point_count(), 6);
        assert_eq!(out.positions.len(), 6);
    }

    #[test]
    fn normal_detail_follows_shading() {
        let mut mesh = HostMesh::grid("plane", 2, 1);
        let flat = extract(&mesh, &options(), &mut Vec::new());
        assert_eq!(flat.primvars.get("N").unwrap().detail, Detail::Uniform);

        mesh.polygons[1] = Polygon::new([1, 2, 5, 4]).smooth();
        let smooth = extract(&mesh, &options(), &mut Vec::new());
        let n = smooth.primvars.get("N").unwrap();
        assert_eq!(n.detail, Detail::FaceVarying);
        assert_eq!(n.value().unwrap().len(), 8);
    }

    #[test]
    fn subdivision_meshes_skip_normals_unless_forced() {
        let mut mesh = HostMesh::grid("cage", 1, 1);
        mesh.subdivision = Some(SubdivSettings::default());
        let out = extract(&mesh, &options(), &mut Vec::new());
        assert!(!out.primvars.contains("N"));
        assert!(out.topology.subdivision.is_some());

        let forced = ExtractOptions {
            force_normals: true,
            ..options()
        };
        assert!(extract(&mesh, &forced, &mut Vec::new()).primvars.contains("N"));
    }

    #[test]
    fn layer_detail_is_chosen_by_length() {
        let mut mesh = HostMesh::grid("plane", 2, 1);
        mesh.uv_layers
            .push(AttributeLayer::new("UVMap", vec![Vec2::ZERO; 8]));
        mesh.color_layers
            .push(AttributeLayer::new("Col", vec![Vec3::ONE; 6]));
        let out = extract(&mesh, &options(), &mut Vec::new());
        assert_eq!(out.primvars.get("st").unwrap().detail, Detail::FaceVarying);
        assert_eq!(out.primvars.get("Cs").unwrap().detail, Detail::Vertex);
        assert_eq!(
            out.primvars.get("st").unwrap().value(),
            Some(&PrimvarValue::Float2(vec![Vec2::new(0.0, 1.0); 8]))
        );
    }

    #[test]
    fn missing_requested_layers_warn() {
        let mut mesh = HostMesh::grid("plane", 1, 1);
        mesh.uv_layers
            .push(AttributeLayer::new("UVMap", vec![Vec2::ZERO; 4]));
        mesh.uv_layers
            .push(AttributeLayer::new("Detail UV", vec![Vec2::ONE; 4]));
        let opts = ExtractOptions {
            requested_layers: vec!["Detail UV".into(), "Dirt".into()],
            ..options()
        };
        let mut warnings = Vec::new();
        let out = extract(&mesh, &opts, &mut warnings);
        assert!(out.primvars.contains("DetailUV"));
        assert_eq!(
            warnings,
            vec![ExtractionWarning::MissingLayer {
                mesh: "plane".into(),
                layer: "Dirt".into()
            }]
        );
    }

    #[test]
    fn reference_pose_mismatch_skips_only_that_primvar() {
        let mut mesh = HostMesh::grid("plane", 2, 1);
        mesh.reference_pose = ReferencePose {
            pref: Some(mesh.positions.clone()),
            nref: Some(vec![Vec3::Z; 5]),
            ..Default::default()
        };
        let mut warnings = Vec::new();
        let out = extract(&mesh, &options(), &mut warnings);
        assert_eq!(out.primvars.get("__Pref").unwrap().detail, Detail::Vertex);
        assert!(!out.primvars.contains("__Nref"));
        assert!(matches!(
            &warnings[..],
            [ExtractionWarning::CardinalityMismatch { primvar, len: 5, .. }] if primvar == "__Nref"
        ));
    }

    #[test]
    fn tangent_failures_skip_the_primvar() {
        let mut mesh = HostMesh::grid("plane", 1, 1);
        let opts = ExtractOptions {
            export_tangents: true,
            ..options()
        };
        let mut warnings = Vec::new();
        assert!(!extract(&mesh, &opts, &mut warnings).primvars.contains("Tn"));
        assert!(matches!(warnings[0], ExtractionWarning::TangentFailure { .. }));

        let uvs = mesh.positions.iter().map(|p| p.truncate()).collect();
        mesh.uv_layers.push(AttributeLayer::new("UVMap", uvs));
        let out = extract(&mesh, &opts, &mut Vec::new());
        assert_eq!(out.primvars.get("Tn").unwrap().detail, Detail::FaceVarying);
    }

    #[test]
    fn empty_mesh_extracts_nothing() {
        let mesh = HostMesh::new("void", vec![Vec3::ZERO], Vec::new());
        assert!(extract(&mesh, &options(), &mut Vec::new()).is_empty());
    }
}
