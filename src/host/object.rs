use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

use crate::{retained::ParamList, utils::allocator::ObjectId};

/// Version of the [`HostObject`] layout.
pub const OBJECT_SCHEMA_VERSION: u32 = 1;

/// How a light filter contributes when several filters are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CombineMode {
    Mult,
    Max,
    Min,
    Screen,
}

impl CombineMode {
    pub const ALL: [CombineMode; 4] = [Self::Mult, Self::Max, Self::Min, Self::Screen];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mult => "mult",
            Self::Max => "max",
            Self::Min => "min",
            Self::Screen => "screen",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LightData {
    pub shader: String,
    pub intensity: f32,
    pub exposure: f32,
    pub color: Vec3,
    pub params: ParamList,
    /// Names of light filter objects, in declaration order.
    pub filters: Vec<String>,
}

impl LightData {
    pub fn new(shader: impl Into<String>) -> Self {
        Self {
            shader: shader.into(),
            intensity: 1.0,
            exposure: 0.0,
            color: Vec3::ONE,
            params: ParamList::default(),
            filters: Vec::new(),
        }
    }

    pub fn with_filters<I, S>(mut self, filters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filters = filters.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LightFilterData {
    pub shader: String,
    pub combine_mode: Option<CombineMode>,
    pub params: ParamList,
}

impl LightFilterData {
    pub fn new(shader: impl Into<String>, combine_mode: Option<CombineMode>) -> Self {
        Self {
            shader: shader.into(),
            combine_mode,
            params: ParamList::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraData {
    /// Horizontal field of view in degrees.
    pub fov: f32,
    pub clip_start: f32,
    pub clip_end: f32,
}

impl Default for CameraData {
    fn default() -> Self {
        Self {
            fov: 39.6,
            clip_start: 0.1,
            clip_end: 1000.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ObjectKind {
    /// Geometry object referencing a mesh data block by name.
    Mesh { data: String },
    Light(LightData),
    LightFilter(LightFilterData),
    Empty,
    Camera(CameraData),
}

impl ObjectKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Mesh { .. } => "mesh",
            Self::Light(_) => "light",
            Self::LightFilter(_) => "light filter",
            Self::Empty => "empty",
            Self::Camera(_) => "camera",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModifierKind {
    /// Moves points without changing topology (armature, lattice, cloth).
    Deform,
    /// Changes the evaluated topology (array, boolean, mirror).
    Topology,
    /// Forces normal export on subdivision meshes.
    NormalOverride,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Modifier {
    pub name: String,
    pub kind: ModifierKind,
    /// Opaque settings digest; two stacks with equal digests evaluate alike.
    pub settings: String,
}

impl Modifier {
    pub fn new(name: impl Into<String>, kind: ModifierKind) -> Self {
        Self {
            name: name.into(),
            kind,
            settings: String::new(),
        }
    }

    pub fn is_deforming(&self) -> bool {
        self.kind == ModifierKind::Deform
    }
}

/// One particle placement of another object, emitted by the owning object.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticleInstance {
    pub object: ObjectId,
    pub particle_system: String,
    pub persistent_id: Vec<i32>,
    /// Placement relative to the emitter.
    pub transform: Mat4,
}

/// Host object schema. Optional host fields are `Option`s with the defaults
/// documented on [`HostObject::new`].
#[derive(Debug, Clone, PartialEq)]
pub struct HostObject {
    pub name: String,
    pub kind: ObjectKind,
    pub parent: Option<ObjectId>,
    /// Local transform relative to `parent`.
    pub transform: Mat4,
    /// Has animation data on its transform.
    pub animated: bool,
    pub modifiers: Vec<Modifier>,
    /// Overrides the global motion sample count for this object and its particles.
    pub motion_segments: Option<u32>,
    pub hidden: bool,
    /// Bumped by the host when the object's render data changes. Transform
    /// edits are picked up by comparing matrices and do not count.
    pub revision: u64,
    pub particle_instances: Vec<ParticleInstance>,
    /// Attribute layers the object's shading asks for.
    pub primvar_requests: Vec<String>,
}

impl HostObject {
    /// Identity transform, no parent, not animated, no modifiers, visible.
    pub fn new(name: impl Into<String>, kind: ObjectKind) -> Self {
        Self {
            name: name.into(),
            kind,
            parent: None,
            transform: Mat4::IDENTITY,
            animated: false,
            modifiers: Vec::new(),
            motion_segments: None,
            hidden: false,
            revision: 0,
            particle_instances: Vec::new(),
            primvar_requests: Vec::new(),
        }
    }

    pub fn mesh(name: impl Into<String>, data: impl Into<String>) -> Self {
        Self::new(name, ObjectKind::Mesh { data: data.into() })
    }

    pub fn with_parent(mut self, parent: ObjectId) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_transform(mut self, transform: Mat4) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_modifier(mut self, modifier: Modifier) -> Self {
        self.modifiers.push(modifier);
        self
    }

    pub fn data_name(&self) -> Option<&str> {
        match &self.kind {
            ObjectKind::Mesh { data } => Some(data.as_str()),
            _ => None,
        }
    }

    pub fn has_deforming_modifier(&self) -> bool {
        self.modifiers.iter().any(Modifier::is_deforming)
    }

    /// Modifiers that change what the renderer sees for the data block.
    pub fn render_modifiers(&self) -> impl Iterator<Item = &Modifier> {
        self.modifiers.iter()
    }

    pub fn forces_normals(&self) -> bool {
        self.modifiers
            .iter()
            .any(|m| m.kind == ModifierKind::NormalOverride)
    }
}
