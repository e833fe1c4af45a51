use glam::Mat4;

use super::{kind_mismatch, Entity, EntityKind, Exported, TranslateCx, Translator, UpdateOutcome};
use crate::{
    cache::TranslatorState,
    error::TranslateError,
    host::{CameraData, ObjectKind},
    retained::{NodeKind, ParamList, ParamValue, RetainedNode, RetainedScene},
};

/// Host cameras look down -Z, renderer cameras down +Z.
const CAMERA_ORIENTATION: Mat4 = Mat4::from_cols_array(&[
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, -1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
]);

/// Cameras become named coordinate systems on the scene root.
#[derive(Debug, Clone, Copy, Default)]
pub struct CameraTranslator;

impl CameraTranslator {
    fn data(&self, cx: &TranslateCx<'_>, entity: &Entity) -> Result<CameraData, TranslateError> {
        match &entity.object(cx.host)?.kind {
            ObjectKind::Camera(data) => Ok(*data),
            _ => Err(kind_mismatch(entity, cx.host, EntityKind::Camera)),
        }
    }

    fn apply(
        &self,
        cx: &TranslateCx<'_>,
        scene: &mut dyn RetainedScene,
        entity: &Entity,
        node: RetainedNode,
        state: &mut TranslatorState,
    ) -> Result<(), TranslateError> {
        let data = self.data(cx, entity)?;
        let params = ParamList::new()
            .with("fov", ParamValue::Float(data.fov))
            .with(
                "clippingRange",
                ParamValue::FloatArray(vec![data.clip_start, data.clip_end]),
            );
        scene.set_params(node.id, &params);
        state.params = params;
        state.synced_revision = cx.host.data_revision(entity.id).unwrap_or_default();
        state.stale = false;
        Ok(())
    }
}

impl Translator for CameraTranslator {
    fn kind(&self) -> EntityKind {
        EntityKind::Camera
    }

    fn export(
        &self,
        cx: &mut TranslateCx<'_>,
        scene: &mut dyn RetainedScene,
        entity: &Entity,
    ) -> Result<Exported, TranslateError> {
        self.data(cx, entity)?;
        let node = RetainedNode {
            id: scene.create_node(NodeKind::CoordinateSystem, entity.prototype.as_str()),
            kind: NodeKind::CoordinateSystem,
        };
        let mut state = TranslatorState::new(EntityKind::Camera);
        self.apply(cx, scene, entity, node, &mut state)?;
        scene.attach_coordinate_system(scene.root(), node.id);
        Ok(Exported { node, state })
    }

    fn update(
        &self,
        cx: &mut TranslateCx<'_>,
        scene: &mut dyn RetainedScene,
        entity: &Entity,
        node: RetainedNode,
        state: &mut TranslatorState,
    ) -> Result<UpdateOutcome, TranslateError> {
        self.apply(cx, scene, entity, node, state)?;
        Ok(UpdateOutcome::Updated)
    }

    fn orient(&self, transform: Mat4) -> Mat4 {
        transform * CAMERA_ORIENTATION
    }
}
