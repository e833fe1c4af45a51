//! Per-entity-kind translators and the fixed dispatch table.
//!
//! Each host object is classified once into an [`EntityKind`]; the kind
//! indexes [`TranslatorRegistry`], which holds exactly one
//! [`AnyTranslator`] per kind. No other runtime type probing happens.

pub mod camera;
pub mod empty;
pub mod light;
pub mod light_filter;
pub mod mesh;

pub use camera::CameraTranslator;
pub use empty::EmptyTranslator;
pub use light::{linked_params, LightTranslator, LIGHT_FILTERS_PARAM};
pub use light_filter::LightFilterTranslator;
pub use mesh::MeshTranslator;

use glam::{Mat4, Vec3};
use serde::Serialize;

use crate::{
    cache::TranslatorState,
    config::SyncSettings,
    error::{ExtractionWarning, HostError, TranslateError},
    host::{HostObject, HostScene, ObjectKind, ParticleInstance},
    identity::{InstanceKey, PrototypeKey},
    motion::{DeformMotion, TransformMotion},
    retained::{ParamList, ParamValue, RetainedNode, RetainedScene, ShaderSchema},
    utils::allocator::{NodeId, ObjectId},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum EntityKind {
    Mesh,
    Light,
    LightFilter,
    Empty,
    Camera,
}

impl EntityKind {
    pub const COUNT: usize = 5;
    pub const ALL: [EntityKind; Self::COUNT] = [
        Self::Mesh,
        Self::Light,
        Self::LightFilter,
        Self::Empty,
        Self::Camera,
    ];

    pub fn of(kind: &ObjectKind) -> Self {
        match kind {
            ObjectKind::Mesh { .. } => Self::Mesh,
            ObjectKind::Light(_) => Self::Light,
            ObjectKind::LightFilter(_) => Self::LightFilter,
            ObjectKind::Empty => Self::Empty,
            ObjectKind::Camera(_) => Self::Camera,
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Mesh => "mesh",
            Self::Light => "light",
            Self::LightFilter => "light filter",
            Self::Empty => "empty",
            Self::Camera => "camera",
        }
    }
}

/// One visited placement, resolved during traversal.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub id: ObjectId,
    pub kind: EntityKind,
    pub prototype: PrototypeKey,
    pub instance: InstanceKey,
    /// Emitter that instanced this placement, if any.
    pub emitter: Option<ObjectId>,
    pub particle: Option<ParticleInstance>,
}

impl Entity {
    pub fn object<'a>(&self, host: &'a dyn HostScene) -> Result<&'a HostObject, HostError> {
        host.object(self.id).ok_or(HostError::MissingObject(self.id))
    }

    /// World transform at the host's current frame.
    pub fn world_transform(&self, host: &dyn HostScene) -> Result<Mat4, HostError> {
        match (&self.particle, self.emitter) {
            (Some(particle), Some(emitter)) => {
                Ok(world_transform(host, emitter)? * particle.transform)
            }
            _ => world_transform(host, self.id),
        }
    }

    /// Objects whose animation moves this placement: the object's parent
    /// chain, plus the emitter's chain for particle placements.
    pub fn transform_sources(&self, host: &dyn HostScene) -> Vec<ObjectId> {
        match self.emitter {
            Some(emitter) if self.particle.is_some() => ancestry(host, emitter),
            _ => ancestry(host, self.id),
        }
    }
}

/// `id` followed by its parents up to the first root or missing parent.
pub fn ancestry(host: &dyn HostScene, id: ObjectId) -> Vec<ObjectId> {
    let limit = host.object_ids().len() + 1;
    let mut chain = Vec::new();
    let mut current = Some(id);
    while let Some(next) = current {
        if chain.len() > limit || chain.contains(&next) {
            break;
        }
        let Some(object) = host.object(next) else {
            break;
        };
        chain.push(next);
        current = object.parent;
    }
    chain
}

pub fn world_transform(host: &dyn HostScene, id: ObjectId) -> Result<Mat4, HostError> {
    let chain = ancestry(host, id);
    if chain.is_empty() {
        return Err(HostError::MissingObject(id));
    }
    let mut world = Mat4::IDENTITY;
    for ancestor in chain.iter().rev() {
        world *= host.evaluate_local_transform(*ancestor)?;
    }
    Ok(world)
}

/// Everything a translator reads while building or refreshing a prototype.
pub struct TranslateCx<'a> {
    pub host: &'a dyn HostScene,
    pub settings: &'a SyncSettings,
    pub schema: &'a dyn ShaderSchema,
    /// Deformation samples captured for this prototype by the motion pre-pass.
    pub deform: Option<&'a DeformMotion>,
    pub warnings: &'a mut Vec<ExtractionWarning>,
}

/// A freshly exported prototype, not yet in the cache.
#[derive(Debug)]
pub struct Exported {
    pub node: RetainedNode,
    pub state: TranslatorState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated,
    /// The entity evaluated to nothing renderable; the prototype is now a
    /// pure transform carrier.
    Empty,
}

pub trait Translator {
    fn kind(&self) -> EntityKind;

    /// Creates the prototype node for `entity`. Performs no cache lookup.
    fn export(
        &self,
        cx: &mut TranslateCx<'_>,
        scene: &mut dyn RetainedScene,
        entity: &Entity,
    ) -> Result<Exported, TranslateError>;

    /// Re-synchronizes attributes/topology of an existing prototype.
    fn update(
        &self,
        cx: &mut TranslateCx<'_>,
        scene: &mut dyn RetainedScene,
        entity: &Entity,
        node: RetainedNode,
        state: &mut TranslatorState,
    ) -> Result<UpdateOutcome, TranslateError>;

    /// Whether `update` has anything new to send at the host's current state.
    fn needs_update(
        &self,
        cx: &TranslateCx<'_>,
        entity: &Entity,
        state: &TranslatorState,
    ) -> bool {
        state.stale
            || cx
                .host
                .data_revision(entity.id)
                .map(|revision| revision != state.synced_revision)
                .unwrap_or(false)
    }

    /// Renderer-space correction applied to every transform of this kind.
    fn orient(&self, transform: Mat4) -> Mat4 {
        transform
    }

    fn update_transform(&self, scene: &mut dyn RetainedScene, group: NodeId, transform: Mat4) {
        scene.set_transform(group, self.orient(transform));
    }

    fn update_transform_sample(
        &self,
        motion: &mut TransformMotion,
        segment: usize,
        time: f32,
        transform: Mat4,
    ) {
        motion.record(segment, time, self.orient(transform));
    }

    fn clear_motion(&self, state: &mut TranslatorState) {
        state.clear_motion();
    }

    /// Cheap structural motion test: animation on the placement's transform
    /// sources, or a deforming modifier for kinds that deform.
    fn has_motion(&self, host: &dyn HostScene, entity: &Entity) -> bool {
        entity
            .transform_sources(host)
            .into_iter()
            .filter_map(|id| host.object(id))
            .any(|object| object.animated)
            || self.deforms(host, entity)
    }

    fn deforms(&self, _host: &dyn HostScene, _entity: &Entity) -> bool {
        false
    }

    /// Point positions of the deforming data at the host's current frame.
    fn sample_deformation(
        &self,
        _host: &dyn HostScene,
        entity: &Entity,
    ) -> Result<Vec<Vec3>, HostError> {
        Err(HostError::NoMeshData(entity.id))
    }
}

/// Texture-like string parameters point at the converted texture.
pub(crate) fn shader_params(
    schema: &dyn ShaderSchema,
    shader: &str,
    params: &ParamList,
) -> ParamList {
    let mut out = ParamList::new();
    for (name, value) in params.iter() {
        let value = match value {
            ParamValue::String(path)
                if !path.is_empty() && schema.is_texture_param(shader, name) =>
            {
                ParamValue::String(texture_name(path))
            }
            other => other.clone(),
        };
        out.set(name, value);
    }
    out
}

fn texture_name(path: &str) -> String {
    if path.ends_with(".tex") {
        path.to_string()
    } else {
        format!("{path}.tex")
    }
}

pub(crate) fn kind_mismatch(entity: &Entity, host: &dyn HostScene, expected: EntityKind) -> TranslateError {
    let found = host
        .object(entity.id)
        .map(|object| object.kind.name())
        .unwrap_or("missing");
    TranslateError::KindMismatch {
        name: entity.instance.to_string(),
        expected: expected.name(),
        found,
    }
}

#[derive(Debug, Clone)]
pub enum AnyTranslator {
    Mesh(MeshTranslator),
    Light(LightTranslator),
    LightFilter(LightFilterTranslator),
    Empty(EmptyTranslator),
    Camera(CameraTranslator),
}

macro_rules! dispatch {
    ($self:ident, $t:ident => $body:expr) => {
        match $self {
            AnyTranslator::Mesh($t) => $body,
            AnyTranslator::Light($t) => $body,
            AnyTranslator::LightFilter($t) => $body,
            AnyTranslator::Empty($t) => $body,
            AnyTranslator::Camera($t) => $body,
        }
    };
}

impl Translator for AnyTranslator {
    fn kind(&self) -> EntityKind {
        dispatch!(self, t => t.kind())
    }

    fn export(
        &self,
        cx: &mut TranslateCx<'_>,
        scene: &mut dyn RetainedScene,
        entity: &Entity,
    ) -> Result<Exported, TranslateError> {
        dispatch!(self, t => t.export(cx, scene, entity))
    }

    fn update(
        &self,
        cx: &mut TranslateCx<'_>,
        scene: &mut dyn RetainedScene,
        entity: &Entity,
        node: RetainedNode,
        state: &mut TranslatorState,
    ) -> Result<UpdateOutcome, TranslateError> {
        dispatch!(self, t => t.update(cx, scene, entity, node, state))
    }

    fn needs_update(
        &self,
        cx: &TranslateCx<'_>,
        entity: &Entity,
        state: &TranslatorState,
    ) -> bool {
        dispatch!(self, t => t.needs_update(cx, entity, state))
    }

    fn orient(&self, transform: Mat4) -> Mat4 {
        dispatch!(self, t => t.orient(transform))
    }

    fn clear_motion(&self, state: &mut TranslatorState) {
        dispatch!(self, t => t.clear_motion(state))
    }

    fn has_motion(&self, host: &dyn HostScene, entity: &Entity) -> bool {
        dispatch!(self, t => t.has_motion(host, entity))
    }

    fn deforms(&self, host: &dyn HostScene, entity: &Entity) -> bool {
        dispatch!(self, t => t.deforms(host, entity))
    }

    fn sample_deformation(
        &self,
        host: &dyn HostScene,
        entity: &Entity,
    ) -> Result<Vec<Vec3>, HostError> {
        dispatch!(self, t => t.sample_deformation(host, entity))
    }
}

/// Fixed lookup table from [`EntityKind`] to its translator.
#[derive(Debug, Clone)]
pub struct TranslatorRegistry {
    table: [AnyTranslator; EntityKind::COUNT],
}

impl Default for TranslatorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TranslatorRegistry {
    pub fn new() -> Self {
        Self {
            table: [
                AnyTranslator::Mesh(MeshTranslator),
                AnyTranslator::Light(LightTranslator),
                AnyTranslator::LightFilter(LightFilterTranslator),
                AnyTranslator::Empty(EmptyTranslator),
                AnyTranslator::Camera(CameraTranslator),
            ],
        }
    }

    pub fn get(&self, kind: EntityKind) -> &AnyTranslator {
        &self.table[kind.index()]
    }
}
