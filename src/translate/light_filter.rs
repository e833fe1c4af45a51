use super::{
    kind_mismatch, shader_params, Entity, EntityKind, Exported, TranslateCx, Translator,
    UpdateOutcome,
};
use crate::{
    cache::TranslatorState,
    error::TranslateError,
    host::{LightFilterData, ObjectKind},
    retained::{NodeKind, ParamValue, RetainedNode, RetainedScene},
};

#[derive(Debug, Clone, Copy, Default)]
pub struct LightFilterTranslator;

impl LightFilterTranslator {
    pub(crate) fn data<'a>(
        &self,
        cx: &TranslateCx<'a>,
        entity: &Entity,
    ) -> Result<&'a LightFilterData, TranslateError> {
        match &entity.object(cx.host)?.kind {
            ObjectKind::LightFilter(data) => Ok(data),
            _ => Err(kind_mismatch(entity, cx.host, EntityKind::LightFilter)),
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
        scene.set_params(node.id, &params);
        state.params = params;
        state.synced_revision = cx.host.data_revision(entity.id).unwrap_or_default();
        state.stale = false;
        Ok(())
    }
}

impl Translator for LightFilterTranslator {
    fn kind(&self) -> EntityKind {
        EntityKind::LightFilter
    }

    fn export(
        &self,
        cx: &mut TranslateCx<'_>,
        scene: &mut dyn RetainedScene,
        entity: &Entity,
    ) -> Result<Exported, TranslateError> {
        self.data(cx, entity)?;
        let node = RetainedNode {
            id: scene.create_node(NodeKind::LightFilter, entity.prototype.as_str()),
            kind: NodeKind::LightFilter,
        };
        let mut state = TranslatorState::new(EntityKind::LightFilter);
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
}
