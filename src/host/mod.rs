//! Host scene schema and the traversal/evaluation API the engine consumes.

pub mod arena;
pub mod mesh;
pub mod object;

pub use arena::{DeformTrack, SceneArena, TransformTrack};
pub use mesh::{
    AttributeLayer, BoundaryInterpolation, EdgeCrease, FaceVaryingInterpolation, HostMesh,
    Polygon, ReferencePose, SubdivScheme, SubdivSettings,
};
pub use object::{
    CameraData, CombineMode, HostObject, LightData, LightFilterData, Modifier, ModifierKind,
    ObjectKind, ParticleInstance, OBJECT_SCHEMA_VERSION,
};

use glam::Mat4;

use crate::{error::HostError, utils::allocator::ObjectId};

/// Read/evaluate access to the host application's scene.
///
/// Time changes through [`HostScene::set_frame`] are synchronous: every
/// evaluation after the call observes the new time.
pub trait HostScene {
    /// Every live object, parents before or after children in any order.
    fn object_ids(&self) -> Vec<ObjectId>;

    fn object(&self, id: ObjectId) -> Option<&HostObject>;

    fn find_object(&self, name: &str) -> Option<ObjectId>;

    fn frame(&self) -> f64;

    fn set_frame(&mut self, frame: f64);

    /// Local transform of `id` at the current frame.
    fn evaluate_local_transform(&self, id: ObjectId) -> Result<Mat4, HostError>;

    /// Re-evaluates the mesh data block of `id` at the current frame.
    fn evaluate_mesh(&self, id: ObjectId) -> Result<HostMesh, HostError>;

    /// Change counter of the data `id` renders with. Defaults to the
    /// object's own revision.
    fn data_revision(&self, id: ObjectId) -> Option<u64> {
        self.object(id).map(|object| object.revision)
    }
}
