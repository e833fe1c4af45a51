//! Mesh Data Extractor: flattens evaluated host meshes into renderer-ready
//! topology and primvars.

pub mod extract;
pub mod material;
pub mod normals;
pub mod subdiv;
pub mod tangents;

pub use extract::{extract, ExtractOptions, MeshExtract};
pub use material::{partition, subset_primvars, MaterialSubset, FACE_SUBSET};
pub use normals::JobMode;
pub use subdiv::{crease_sharpness, subdivision_tags};
