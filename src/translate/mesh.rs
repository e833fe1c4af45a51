use glam::Vec3;
use log::debug;

use super::{kind_mismatch, Entity, EntityKind, Exported, TranslateCx, Translator, UpdateOutcome};
use crate::{
    cache::TranslatorState,
    error::{HostError, TranslateError},
    host::{HostMesh, HostScene, ObjectKind},
    mesh::{extract, subset_primvars, ExtractOptions, MaterialSubset},
    retained::{Detail, NodeKind, PrimvarValue, RetainedNode, RetainedScene},
    utils::allocator::NodeId,
};

/// Mesh prototypes are a group holding one geometry node, plus one extra
/// node per additional material when the mesh is split by material.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeshTranslator;

impl MeshTranslator {
    fn evaluate(
        &self,
        cx: &TranslateCx<'_>,
        entity: &Entity,
    ) -> Result<(HostMesh, ExtractOptions), TranslateError> {
        let object = entity.object(cx.host)?;
        if !matches!(object.kind, ObjectKind::Mesh { .. }) {
            return Err(kind_mismatch(entity, cx.host, EntityKind::Mesh));
        }
        let mesh = cx.host.evaluate_mesh(entity.id)?;
        Ok((mesh, ExtractOptions::new(cx.settings, object)))
    }

    fn detach_geometry(&self, scene: &mut dyn RetainedScene, group: NodeId, state: &mut TranslatorState) {
        let owned: Vec<NodeId> = state.owned_nodes().collect();
        for node in owned {
            scene.remove_child(group, node);
            scene.destroy_node(node);
        }
        state.geometry = None;
        state.material_children.clear();
    }

    #[allow(clippy::too_many_arguments)]
    fn apply(
        &self,
        cx: &mut TranslateCx<'_>,
        scene: &mut dyn RetainedScene,
        entity: &Entity,
        group: NodeId,
        state: &mut TranslatorState,
        mesh: &HostMesh,
        options: &ExtractOptions,
    ) -> UpdateOutcome {
        let extracted = extract(mesh, options, cx.warnings);
        state.synced_revision = cx.host.data_revision(entity.id).unwrap_or_default();
        state.synced_frame = cx.host.frame();
        state.stale = false;

        if extracted.is_empty() {
            debug!("{}: no faces, geometry detached", entity.prototype);
            self.detach_geometry(scene, group, state);
            state.set_counts(0, 0, 0);
            state.is_empty = true;
            state.is_transforming = false;
            self.clear_motion(state);
            return UpdateOutcome::Empty;
        }
        state.is_empty = false;

        let geometry = match state.geometry {
            Some(node) => node,
            None => {
                let node = scene.create_node(NodeKind::Mesh, &format!("{}-GEO", entity.prototype));
                scene.add_child(group, node);
                state.geometry = Some(node);
                node
            }
        };

        let mut primvars = extracted.primvars.clone();
        let deform = cx
            .deform
            .filter(|motion| motion.matches_point_count(extracted.point_count()));
        match deform {
            Some(motion) => {
                primvars.set_sampled(
                    "P",
                    Detail::Vertex,
                    &motion.times,
                    motion.samples.iter().cloned().map(PrimvarValue::Point).collect(),
                );
                state.is_deforming = true;
                state.motion_times = motion.times.clone();
                state.deform_samples = motion.samples.clone();
            }
            None => {
                if cx.deform.is_some() {
                    debug!("{}: point count changed across the shutter", entity.prototype);
                }
                primvars.set(
                    "P",
                    Detail::Vertex,
                    PrimvarValue::Point(extracted.positions.clone()),
                );
                self.clear_motion(state);
            }
        }

        let subsets = &extracted.subsets;
        scene.define_topology(geometry, &extracted.topology);
        let rest: &[MaterialSubset] = if extracted.is_split() {
            let primary = &subsets[0];
            scene.set_primvars(geometry, &subset_primvars(&primvars, primary));
            scene.set_material(geometry, primary.material.as_deref());
            &subsets[1..]
        } else {
            scene.set_primvars(geometry, &primvars);
            let material = subsets.first().and_then(|s| s.material.as_deref());
            scene.set_material(geometry, material);
            &[]
        };

        let mut previous = std::mem::take(&mut state.material_children).into_iter();
        let mut children = Vec::with_capacity(rest.len());
        for subset in rest {
            let child = match previous.next() {
                Some((material_id, node)) if material_id == subset.material_id => node,
                replaced => {
                    if let Some((_, node)) = replaced {
                        scene.destroy_node(node);
                    }
                    let name = format!("{}-MAT{}", entity.prototype, subset.material_id);
                    let node = scene.create_node(NodeKind::Mesh, &name);
                    scene.add_child(group, node);
                    node
                }
            };
            scene.define_topology(child, &extracted.topology);
            scene.set_primvars(child, &subset_primvars(&primvars, subset));
            scene.set_material(child, subset.material.as_deref());
            children.push((subset.material_id, child));
        }
        for (_, node) in previous {
            scene.destroy_node(node);
        }
        state.material_children = children;

        state.set_counts(
            extracted.point_count(),
            extracted.face_count(),
            extracted.corner_count(),
        );
        UpdateOutcome::Updated
    }
}

impl Translator for MeshTranslator {
    fn kind(&self) -> EntityKind {
        EntityKind::Mesh
    }

    fn export(
        &self,
        cx: &mut TranslateCx<'_>,
        scene: &mut dyn RetainedScene,
        entity: &Entity,
    ) -> Result<Exported, TranslateError> {
        let (mesh, options) = self.evaluate(cx, entity)?;
        let group = scene.create_node(NodeKind::Group, entity.prototype.as_str());
        let mut state = TranslatorState::new(EntityKind::Mesh);
        self.apply(cx, scene, entity, group, &mut state, &mesh, &options);
        Ok(Exported {
            node: RetainedNode {
                id: group,
                kind: NodeKind::Group,
            },
            state,
        })
    }

    fn update(
        &self,
        cx: &mut TranslateCx<'_>,
        scene: &mut dyn RetainedScene,
        entity: &Entity,
        node: RetainedNode,
        state: &mut TranslatorState,
    ) -> Result<UpdateOutcome, TranslateError> {
        let (mesh, options) = self.evaluate(cx, entity)?;
        Ok(self.apply(cx, scene, entity, node.id, state, &mesh, &options))
    }

    fn needs_update(
        &self,
        cx: &TranslateCx<'_>,
        entity: &Entity,
        state: &TranslatorState,
    ) -> bool {
        let revised = state.stale
            || cx
                .host
                .data_revision(entity.id)
                .map_or(false, |revision| revision != state.synced_revision);
        let deformed_in_time = self.deforms(cx.host, entity) && state.synced_frame != cx.host.frame();
        let motion_changed = match cx.deform {
            Some(motion) => {
                !state.is_deforming
                    || state.motion_times != motion.times
                    || state.deform_samples != motion.samples
            }
            None => state.is_deforming,
        };
        revised || deformed_in_time || motion_changed
    }

    fn deforms(&self, host: &dyn HostScene, entity: &Entity) -> bool {
        host.object(entity.id)
            .map_or(false, |object| object.has_deforming_modifier())
    }

    fn sample_deformation(
        &self,
        host: &dyn HostScene,
        entity: &Entity,
    ) -> Result<Vec<Vec3>, HostError> {
        Ok(host.evaluate_mesh(entity.id)?.positions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::SyncSettings,
        host::{HostObject, SceneArena},
        identity::IdentityResolver,
        mesh::FACE_SUBSET,
        motion::DeformMotion,
        retained::{NoTextureSchema, RecordingScene},
        utils::allocator::ObjectId,
    };

    fn entity(host: &SceneArena, id: ObjectId) -> Entity {
        let resolver = IdentityResolver::default();
        Entity {
            id,
            kind: EntityKind::Mesh,
            prototype: resolver.resolve_prototype_key(host, id).unwrap(),
            instance: resolver.resolve_instance_key(host, id, None, None, None).unwrap(),
            emitter: None,
            particle: None,
        }
    }

    fn split_scene() -> (SceneArena, ObjectId) {
        let mut host = SceneArena::new();
        let mut mesh = HostMesh::grid("Strip", 4, 1).with_materials(["A", "B", "C"]);
        for (polygon, slot) in mesh.polygons.iter_mut().zip([0, 1, 0, 2]) {
            polygon.material_index = slot;
        }
        host.add_mesh(mesh);
        let id = host.add_object(HostObject::mesh("Strip", "Strip"));
        (host, id)
    }

    #[test]
    fn multi_material_split_shares_primvars() {
        let (host, id) = split_scene();
        let settings = SyncSettings::default();
        let mut warnings = Vec::new();
        let mut cx = TranslateCx {
            host: &host,
            settings: &settings,
            schema: &NoTextureSchema,
            deform: None,
            warnings: &mut warnings,
        };
        let mut scene = RecordingScene::new();
        let exported = MeshTranslator
            .export(&mut cx, &mut scene, &entity(&host, id))
            .unwrap();

        let state = &exported.state;
        let primary = scene.node(state.geometry.unwrap()).unwrap();
        assert_eq!(primary.material.as_deref(), Some("A"));
        assert_eq!(
            primary.primvars.get(FACE_SUBSET).unwrap().value(),
            Some(&PrimvarValue::Int(vec![0, 2]))
        );

        assert_eq!(state.material_children.len(), 2);
        let expected = [("B", vec![1]), ("C", vec![3])];
        for ((_, child), (material, faces)) in state.material_children.iter().zip(expected) {
            let child = scene.node(*child).unwrap();
            assert_eq!(child.material.as_deref(), Some(material));
            assert_eq!(
                child.primvars.get(FACE_SUBSET).unwrap().value(),
                Some(&PrimvarValue::Int(faces))
            );
            for primvar in primary.primvars.iter().filter(|p| p.name != FACE_SUBSET) {
                assert_eq!(child.primvars.get(&primvar.name), Some(primvar));
            }
        }
        assert_eq!(scene.children(exported.node.id).len(), 3);
    }

    #[test]
    fn material_nodes_follow_their_material_id() {
        let (mut host, id) = split_scene();
        let settings = SyncSettings::default();
        let mut scene = RecordingScene::new();
        let entity = entity(&host, id);
        let mut warnings = Vec::new();
        let exported = {
            let mut cx = TranslateCx {
                host: &host,
                settings: &settings,
                schema: &NoTextureSchema,
                deform: None,
                warnings: &mut warnings,
            };
            MeshTranslator.export(&mut cx, &mut scene, &entity).unwrap()
        };
        let kept = exported.state.material_children[0];
        assert_eq!(kept.0, 1);

        // Material 2 goes away, so its slot is rebuilt for material 3.
        {
            let mesh = host.mesh_mut("Strip").unwrap();
            mesh.materials.push(Some("D".to_string()));
            mesh.polygons[3].material_index = 3;
        }
        let mut state = exported.state;
        let mut cx = TranslateCx {
            host: &host,
            settings: &settings,
            schema: &NoTextureSchema,
            deform: None,
            warnings: &mut warnings,
        };
        MeshTranslator
            .update(&mut cx, &mut scene, &entity, exported.node, &mut state)
            .unwrap();

        assert_eq!(state.material_children.len(), 2);
        assert_eq!(state.material_children[0], kept);
        let (material_id, node) = state.material_children[1];
        assert_eq!(material_id, 3);
        let record = scene.node(node).unwrap();
        assert_eq!(record.name, format!("{}-MAT3", entity.prototype));
        assert_eq!(record.material.as_deref(), Some("D"));
        assert!(scene.find(&format!("{}-MAT2", entity.prototype)).is_none());
        assert_eq!(scene.children(exported.node.id).len(), 3);
    }

    #[test]
    fn emptied_mesh_becomes_a_transform_carrier() {
        let (mut host, id) = split_scene();
        let settings = SyncSettings::default();
        let mut scene = RecordingScene::new();
        let entity = entity(&host, id);
        let mut warnings = Vec::new();
        let exported = {
            let mut cx = TranslateCx {
                host: &host,
                settings: &settings,
                schema: &NoTextureSchema,
                deform: None,
                warnings: &mut warnings,
            };
            MeshTranslator.export(&mut cx, &mut scene, &entity).unwrap()
        };

        host.mesh_mut("Strip").unwrap().polygons.clear();
        let mut state = exported.state;
        let mut cx = TranslateCx {
            host: &host,
            settings: &settings,
            schema: &NoTextureSchema,
            deform: None,
            warnings: &mut warnings,
        };
        assert!(MeshTranslator.needs_update(&cx, &entity, &state));
        let outcome = MeshTranslator
            .update(&mut cx, &mut scene, &entity, exported.node, &mut state)
            .unwrap();
        assert_eq!(outcome, UpdateOutcome::Empty);
        assert!(state.is_empty);
        assert_eq!((state.point_count, state.face_count, state.vertex_count), (0, 0, 0));
        assert!(!state.is_transforming && !state.is_deforming);
        assert!(scene.children(exported.node.id).is_empty());
    }

    #[test]
    fn deformation_samples_become_time_sampled_points() {
        let mut host = SceneArena::new();
        host.add_mesh(HostMesh::grid("Cloth", 1, 1));
        let id = host.add_object(HostObject::mesh("Cloth", "Cloth"));
        let points = host.evaluate_mesh(id).unwrap().positions;
        let moved: Vec<Vec3> = points.iter().map(|p| *p + Vec3::Z).collect();
        let motion = DeformMotion {
            times: vec![-0.25, 0.25],
            samples: vec![points, moved],
        };
        let settings = SyncSettings::default();
        let mut warnings = Vec::new();
        let mut cx = TranslateCx {
            host: &host,
            settings: &settings,
            schema: &NoTextureSchema,
            deform: Some(&motion),
            warnings: &mut warnings,
        };
        let mut scene = RecordingScene::new();
        let exported = MeshTranslator
            .export(&mut cx, &mut scene, &entity(&host, id))
            .unwrap();
        assert!(exported.state.is_deforming);
        assert_eq!(exported.state.motion_times, vec![-0.25, 0.25]);
        let geometry = scene.node(exported.state.geometry.unwrap()).unwrap();
        let p = geometry.primvars.get("P").unwrap();
        assert!(p.is_time_sampled());
        assert_eq!(p.samples[1].0, 0.25);
        assert!(!MeshTranslator.needs_update(&cx, &entity(&host, id), &exported.state));
    }
}
