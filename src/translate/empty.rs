use super::{Entity, EntityKind, Exported, TranslateCx, Translator, UpdateOutcome};
use crate::{
    cache::TranslatorState,
    error::TranslateError,
    retained::{NodeKind, RetainedNode, RetainedScene},
};

/// Empties only carry a transform; their prototype is an empty group.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyTranslator;

impl Translator for EmptyTranslator {
    fn kind(&self) -> EntityKind {
        EntityKind::Empty
    }

    fn export(
        &self,
        cx: &mut TranslateCx<'_>,
        scene: &mut dyn RetainedScene,
        entity: &Entity,
    ) -> Result<Exported, TranslateError> {
        entity.object(cx.host)?;
        let node = RetainedNode {
            id: scene.create_node(NodeKind::Group, entity.prototype.as_str()),
            kind: NodeKind::Group,
        };
        let mut state = TranslatorState::new(EntityKind::Empty);
        state.is_empty = true;
        state.synced_revision = cx.host.data_revision(entity.id).unwrap_or_default();
        Ok(Exported { node, state })
    }

    fn update(
        &self,
        cx: &mut TranslateCx<'_>,
        _scene: &mut dyn RetainedScene,
        entity: &Entity,
        _node: RetainedNode,
        state: &mut TranslatorState,
    ) -> Result<UpdateOutcome, TranslateError> {
        state.synced_revision = cx.host.data_revision(entity.id).unwrap_or_default();
        state.stale = false;
        Ok(UpdateOutcome::Empty)
    }
}
