use glam::Mat4;

use super::{
    kind_mismatch, shader_params, Entity, EntityKind, Exported, TranslateCx, Translator,
    UpdateOutcome,
};
use crate::{
    cache::TranslatorState,
    error::TranslateError,
    host::{LightData, ObjectKind},
    retained::{NodeKind, ParamList, ParamValue, RetainedNode, RetainedScene},
};

/// Light parameter listing linked filter names.
pub const LIGHT_FILTERS_PARAM: &str = "lightFilters";

/// Lights emit down their local -Z in the host and +Z in the renderer.
const LIGHT_ORIENTATION: Mat4 = Mat4::from_cols_array(&[
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, -1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
]);

/// Parameters last sent to a light, with its filter links merged in.
pub fn linked_params(state: &TranslatorState) -> ParamList {
    let mut params = state.params.clone();
    if !state.light_filters.is_empty() {
        params.set(
            LIGHT_FILTERS_PARAM,
            ParamValue::StringArray(state.light_filters.clone()),
        );
    }
    params
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LightTranslator;

impl LightTranslator {
    fn data<'a>(&self, cx: &TranslateCx<'a>, entity: &Entity) -> Result<&'a LightData, TranslateError> {
        match &entity.object(cx.host)?.kind {
            ObjectKind::Light(data) => Ok(data),
            _ => Err(kind_mismatch(entity, cx.host, EntityKind::Light)),
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
        let mut params = shader_params(cx.schema, &data.shader, &data.params);
        params.set("shader", ParamValue::String(data.shader.clone()));
        params.set("intensity", ParamValue::Float(data.intensity));
        params.set("exposure", ParamValue::Float(data.exposure));
        params.set("lightColor", ParamValue::Color(data.color));
        state.params = params;
        scene.set_params(node.id, &linked_params(state));
        state.synced_revision = cx.host.data_revision(entity.id).unwrap_or_default();
        state.stale = false;
        Ok(())
    }
}

impl Translator for LightTranslator {
    fn kind(&self) -> EntityKind {
        EntityKind::Light
    }

    fn export(
        &self,
        cx: &mut TranslateCx<'_>,
        scene: &mut dyn RetainedScene,
        entity: &Entity,
    ) -> Result<Exported, TranslateError> {
        self.data(cx, entity)?;
        let node = RetainedNode {
            id: scene.create_node(NodeKind::Light, entity.prototype.as_str()),
            kind: NodeKind::Light,
        };
        let mut state = TranslatorState::new(EntityKind::Light);
        self.apply(cx, scene, entity, node, &mut state)?;
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
        transform * LIGHT_ORIENTATION
    }
}
