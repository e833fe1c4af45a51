//! Retained-mode renderer scene graph API consumed by the translators.
//!
//! The renderer itself is a black box; [`RetainedScene`] is the fixed
//! surface the engine drives, and [`RecordingScene`] is the in-memory
//! implementation used when no renderer is attached and by the tests.

pub mod primvar;
pub mod recording;

pub use primvar::{Detail, ParamList, ParamValue, Primvar, PrimvarSet, PrimvarValue};
pub use recording::{NodeRecord, RecordingScene};

use glam::Mat4;
use serde::Serialize;

use crate::utils::allocator::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum NodeKind {
    Group,
    Mesh,
    Light,
    LightFilter,
    CoordinateSystem,
}

/// Handle plus kind of a renderer node owned by the prototype cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RetainedNode {
    pub id: NodeId,
    pub kind: NodeKind,
}

/// One subdivision tag record: name plus its int and float arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct SubdivTag {
    pub name: &'static str,
    pub ints: Vec<i32>,
    pub floats: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Subdivision {
    pub scheme: &'static str,
    pub tags: Vec<SubdivTag>,
}

/// Face-varying polygon topology, optionally subdivision-tagged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Topology {
    pub point_count: usize,
    pub face_vertex_counts: Vec<i32>,
    pub face_vertex_indices: Vec<i32>,
    pub subdivision: Option<Subdivision>,
}

impl Topology {
    pub fn face_count(&self) -> usize {
        self.face_vertex_counts.len()
    }

    pub fn corner_count(&self) -> usize {
        self.face_vertex_indices.len()
    }
}

pub trait RetainedScene {
    fn root(&self) -> NodeId;

    fn create_node(&mut self, kind: NodeKind, name: &str) -> NodeId;

    /// Destroys a node and detaches it from every parent.
    fn destroy_node(&mut self, node: NodeId);

    fn add_child(&mut self, parent: NodeId, child: NodeId);

    fn remove_child(&mut self, parent: NodeId, child: NodeId);

    fn define_topology(&mut self, node: NodeId, topology: &Topology);

    fn set_primvars(&mut self, node: NodeId, primvars: &PrimvarSet);

    fn clear_primvars(&mut self, node: NodeId);

    fn set_params(&mut self, node: NodeId, params: &ParamList);

    fn set_material(&mut self, node: NodeId, material: Option<&str>);

    fn set_transform(&mut self, node: NodeId, transform: Mat4);

    fn set_transform_samples(&mut self, node: NodeId, times: &[f32], transforms: &[Mat4]);

    fn attach_coordinate_system(&mut self, node: NodeId, coordsys: NodeId);

    fn detach_coordinate_system(&mut self, node: NodeId, coordsys: NodeId);
}

/// Parameter schema lookup for shader nodes; only used to spot texture inputs.
pub trait ShaderSchema {
    fn is_texture_param(&self, shader: &str, param: &str) -> bool;
}

/// Schema that reports no texture parameters.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTextureSchema;

impl ShaderSchema for NoTextureSchema {
    fn is_texture_param(&self, _shader: &str, _param: &str) -> bool {
        false
    }
}
