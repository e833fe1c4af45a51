use std::collections::BTreeMap;

use crate::{
    error::ExtractionWarning,
    host::HostMesh,
    retained::{Detail, PrimvarSet, PrimvarValue},
};

/// Name of the constant int-array primvar listing a node's faces.
pub const FACE_SUBSET: &str = "faceSubset";

/// Faces of one mesh that share a material slot.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialSubset {
    pub material_id: u32,
    pub material: Option<String>,
    pub faces: Vec<i32>,
}

/// Groups faces by material slot, ascending by slot id.
///
/// Slot indices past the end of the material list fall back to the last
/// slot. A mesh without material slots yields a single slot-0 subset.
pub fn partition(mesh: &HostMesh, warnings: &mut Vec<ExtractionWarning>) -> Vec<MaterialSubset> {
    let slots = mesh.materials.len();
    let mut by_id: BTreeMap<u32, Vec<i32>> = BTreeMap::new();
    for (face, polygon) in mesh.polygons.iter().enumerate() {
        let mut id = polygon.material_index;
        if slots == 0 {
            id = 0;
        } else if id as usize >= slots {
            let clamped = (slots - 1) as u32;
            warnings.push(ExtractionWarning::MaterialIndexOutOfRange {
                mesh: mesh.name.clone(),
                face,
                index: id,
                clamped,
            });
            id = clamped;
        }
        by_id.entry(id).or_default().push(face as i32);
    }
    by_id
        .into_iter()
        .map(|(material_id, faces)| MaterialSubset {
            material_id,
            material: mesh.materials.get(material_id as usize).cloned().flatten(),
            faces,
        })
        .collect()
}

/// The full primvar set tagged with one subset's faces.
pub fn subset_primvars(base: &PrimvarSet, subset: &MaterialSubset) -> PrimvarSet {
    let mut primvars = base.clone();
    primvars.set(
        FACE_SUBSET,
        Detail::Constant,
        PrimvarValue::Int(subset.faces.clone()),
    );
    primvars
}
