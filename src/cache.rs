//! Reference-counted prototype cache.
//!
//! Every renderer prototype is owned by exactly one [`CacheEntry`]. Entries
//! are counted by the set of referrers (instance keys, or link keys derived
//! from them) that point at them, so the instance count can never drift from
//! the live references. A prototype is attached under the scene root while
//! cached and destroyed when its last referrer is released.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use glam::Vec3;
use log::{debug, trace};

use crate::{
    error::CacheConsistencyError,
    identity::{InstanceKey, PrototypeKey},
    retained::{NodeKind, ParamList, RetainedNode, RetainedScene},
    translate::{EntityKind, Exported},
    utils::allocator::NodeId,
};

/// Per-prototype bookkeeping carried between passes.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslatorState {
    pub kind: EntityKind,
    pub point_count: usize,
    pub face_count: usize,
    pub vertex_count: usize,
    /// Evaluated to nothing renderable; only a transform carrier remains.
    pub is_empty: bool,
    /// Some referencing instance has sampled transform motion this pass.
    pub is_transforming: bool,
    pub is_deforming: bool,
    /// Shutter-relative times of `deform_samples`.
    pub motion_times: Vec<f32>,
    pub deform_samples: Vec<Vec<Vec3>>,
    /// Geometry child of a mesh prototype group.
    pub geometry: Option<NodeId>,
    /// Extra per-material nodes with the material id each was built for,
    /// ascending by material id.
    pub material_children: Vec<(u32, NodeId)>,
    /// Lights that link this filter.
    pub owning_lights: BTreeSet<InstanceKey>,
    /// Names of filters linked to this light, in link order.
    pub light_filters: Vec<String>,
    /// Parameters last sent, before filter links are merged in.
    pub params: ParamList,
    pub synced_revision: u64,
    pub synced_frame: f64,
    /// Forces the next `needs_update` check to succeed.
    pub stale: bool,
}

impl TranslatorState {
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            point_count: 0,
            face_count: 0,
            vertex_count: 0,
            is_empty: false,
            is_transforming: false,
            is_deforming: false,
            motion_times: Vec::new(),
            deform_samples: Vec::new(),
            geometry: None,
            material_children: Vec::new(),
            owning_lights: BTreeSet::new(),
            light_filters: Vec::new(),
            params: ParamList::new(),
            synced_revision: 0,
            synced_frame: 0.0,
            stale: false,
        }
    }

    pub fn clear_motion(&mut self) {
        self.is_deforming = false;
        self.motion_times.clear();
        self.deform_samples.clear();
    }

    pub fn set_counts(&mut self, points: usize, faces: usize, vertices: usize) {
        self.point_count = points;
        self.face_count = faces;
        self.vertex_count = vertices;
    }

    /// Every node this state created below the prototype node itself.
    pub fn owned_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.material_children
            .iter()
            .map(|(_, node)| *node)
            .chain(self.geometry)
    }
}

#[derive(Debug)]
pub struct CacheEntry {
    pub node: RetainedNode,
    pub state: TranslatorState,
    referrers: BTreeSet<InstanceKey>,
}

impl CacheEntry {
    pub fn instance_count(&self) -> usize {
        self.referrers.len()
    }

    pub fn referrers(&self) -> impl Iterator<Item = &InstanceKey> {
        self.referrers.iter()
    }

    fn teardown(self, scene: &mut dyn RetainedScene) {
        for node in self.state.owned_nodes() {
            scene.destroy_node(node);
        }
        if self.node.kind == NodeKind::CoordinateSystem {
            scene.detach_coordinate_system(scene.root(), self.node.id);
        }
        scene.remove_child(scene.root(), self.node.id);
        scene.destroy_node(self.node.id);
    }
}

/// Outcome of [`PrototypeCache::get_or_create`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lookup {
    pub node: RetainedNode,
    pub created: bool,
}

#[derive(Debug, Default)]
pub struct PrototypeCache {
    entries: BTreeMap<PrototypeKey, CacheEntry>,
}

impl PrototypeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &PrototypeKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &PrototypeKey) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &PrototypeKey) -> Option<&mut CacheEntry> {
        self.entries.get_mut(key)
    }

    pub fn node(&self, key: &PrototypeKey) -> Option<RetainedNode> {
        self.entries.get(key).map(|entry| entry.node)
    }

    pub fn state(&self, key: &PrototypeKey) -> Option<&TranslatorState> {
        self.entries.get(key).map(|entry| &entry.state)
    }

    pub fn instance_count(&self, key: &PrototypeKey) -> usize {
        self.entries.get(key).map_or(0, CacheEntry::instance_count)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PrototypeKey, &CacheEntry)> {
        self.entries.iter()
    }

    /// Returns the cached prototype for `key`, exporting it with `factory`
    /// on a miss, and registers `referrer` against it.
    ///
    /// The entry is inserted only after `factory` succeeds, so a failed
    /// export leaves the cache untouched.
    pub fn get_or_create<F, E>(
        &mut self,
        key: &PrototypeKey,
        referrer: &InstanceKey,
        scene: &mut dyn RetainedScene,
        factory: F,
    ) -> Result<Lookup, E>
    where
        F: FnOnce(&mut dyn RetainedScene) -> Result<Exported, E>,
    {
        if let Some(entry) = self.entries.get_mut(key) {
            if entry.referrers.insert(referrer.clone()) {
                trace!("{key}: +{referrer} ({})", entry.referrers.len());
            }
            return Ok(Lookup {
                node: entry.node,
                created: false,
            });
        }

        let Exported { node, state } = factory(&mut *scene)?;
        scene.add_child(scene.root(), node.id);
        debug!("{key}: exported as {:?} {:?}", node.kind, node.id);
        self.entries.insert(
            key.clone(),
            CacheEntry {
                node,
                state,
                referrers: BTreeSet::from([referrer.clone()]),
            },
        );
        Ok(Lookup {
            node,
            created: true,
        })
    }

    /// Drops `referrer` from `key`; evicts the prototype when it was the
    /// last one. Returns whether the prototype was evicted.
    pub fn release(
        &mut self,
        key: &PrototypeKey,
        referrer: &InstanceKey,
        scene: &mut dyn RetainedScene,
    ) -> Result<bool, CacheConsistencyError> {
        let entry = self
            .entries
            .get_mut(key)
            .ok_or_else(|| CacheConsistencyError::UnknownPrototype {
                prototype: key.to_string(),
                instance: referrer.to_string(),
            })?;
        if !entry.referrers.remove(referrer) {
            return Err(CacheConsistencyError::Underflow {
                prototype: key.to_string(),
                instance: referrer.to_string(),
            });
        }
        trace!("{key}: -{referrer} ({})", entry.referrers.len());
        Ok(self.evict_if_unreferenced(key, scene))
    }

    pub fn evict_if_unreferenced(
        &mut self,
        key: &PrototypeKey,
        scene: &mut dyn RetainedScene,
    ) -> bool {
        let unreferenced = self
            .entries
            .get(key)
            .map_or(false, |entry| entry.referrers.is_empty());
        if !unreferenced {
            return false;
        }
        if let Some(entry) = self.entries.remove(key) {
            debug!("{key}: evicted");
            entry.teardown(scene);
        }
        true
    }

    /// Checks the cache against the full set of live `(referrer, prototype)`
    /// references held outside it.
    pub fn validate<'a, I>(&self, live: I) -> Result<(), CacheConsistencyError>
    where
        I: IntoIterator<Item = (&'a InstanceKey, &'a PrototypeKey)>,
    {
        let mut seen: HashSet<(&InstanceKey, &PrototypeKey)> = HashSet::new();
        for (referrer, key) in live {
            let entry =
                self.entries
                    .get(key)
                    .ok_or_else(|| CacheConsistencyError::DanglingInstance {
                        prototype: key.to_string(),
                        instance: referrer.to_string(),
                    })?;
            if !entry.referrers.contains(referrer) {
                return Err(CacheConsistencyError::DanglingInstance {
                    prototype: key.to_string(),
                    instance: referrer.to_string(),
                });
            }
            seen.insert((referrer, key));
        }
        for (key, entry) in &self.entries {
            if entry.referrers.is_empty() {
                return Err(CacheConsistencyError::Unreferenced(key.to_string()));
            }
            if let Some(stale) = entry.referrers.iter().find(|r| !seen.contains(&(*r, key))) {
                return Err(CacheConsistencyError::StaleReferrer {
                    prototype: key.to_string(),
                    referrer: stale.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Marks every cached prototype for a full refresh on its next visit.
    pub fn mark_stale(&mut self) {
        for entry in self.entries.values_mut() {
            entry.state.stale = true;
        }
    }

    /// Evicts everything, regardless of referrers.
    pub fn clear(&mut self, scene: &mut dyn RetainedScene) {
        for (_, entry) in std::mem::take(&mut self.entries) {
            entry.teardown(scene);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::HostError,
        retained::RecordingScene,
        utils::allocator::ObjectId,
    };

    fn keys() -> (PrototypeKey, InstanceKey, InstanceKey) {
        (
            PrototypeKey::from("Grid-MESH"),
            InstanceKey::from("PlaneA"),
            InstanceKey::from("PlaneB"),
        )
    }

    fn export(scene: &mut dyn RetainedScene) -> Result<Exported, HostError> {
        let id = scene.create_node(NodeKind::Group, "Grid-MESH");
        let geometry = scene.create_node(NodeKind::Mesh, "Grid-MESH-GEO");
        scene.add_child(id, geometry);
        let mut state = TranslatorState::new(EntityKind::Mesh);
        state.geometry = Some(geometry);
        Ok(Exported {
            node: RetainedNode {
                id,
                kind: NodeKind::Group,
            },
            state,
        })
    }

    #[test]
    fn second_referrer_hits_the_cache() {
        let (key, a, b) = keys();
        let mut scene = RecordingScene::new();
        let mut cache = PrototypeCache::new();
        let first = cache.get_or_create(&key, &a, &mut scene, export).unwrap();
        let second = cache
            .get_or_create(&key, &b, &mut scene, |_| -> Result<Exported, HostError> {
                panic!("cache hit must not export")
            })
            .unwrap();
        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.node, second.node);
        assert_eq!(cache.instance_count(&key), 2);
        assert!(scene.is_child(scene.root(), first.node.id));
    }

    #[test]
    fn failed_export_leaves_cache_untouched() {
        let (key, a, _) = keys();
        let mut scene = RecordingScene::new();
        let mut cache = PrototypeCache::new();
        let result = cache.get_or_create(&key, &a, &mut scene, |_| {
            Err::<Exported, _>(HostError::NoMeshData(ObjectId::from_index(0)))
        });
        assert!(result.is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn last_release_evicts_and_destroys_nodes() {
        let (key, a, b) = keys();
        let mut scene = RecordingScene::new();
        let mut cache = PrototypeCache::new();
        let node = cache.get_or_create(&key, &a, &mut scene, export).unwrap().node;
        cache.get_or_create(&key, &b, &mut scene, export).unwrap();
        let before = scene.node_count();

        assert_eq!(cache.release(&key, &a, &mut scene), Ok(false));
        assert!(scene.node(node.id).is_some());
        assert_eq!(cache.release(&key, &b, &mut scene), Ok(true));
        assert!(!cache.contains(&key));
        assert!(scene.node(node.id).is_none());
        assert_eq!(scene.node_count(), before - 2);
        assert!(scene.children(scene.root()).is_empty());
    }

    #[test]
    fn release_underflow_is_a_consistency_error() {
        let (key, a, b) = keys();
        let mut scene = RecordingScene::new();
        let mut cache = PrototypeCache::new();
        cache.get_or_create(&key, &a, &mut scene, export).unwrap();
        assert!(matches!(
            cache.release(&key, &b, &mut scene),
            Err(CacheConsistencyError::Underflow { .. })
        ));
        assert!(matches!(
            cache.release(&PrototypeKey::from("Other-MESH"), &a, &mut scene),
            Err(CacheConsistencyError::UnknownPrototype { .. })
        ));
    }

    #[test]
    fn validate_detects_stale_and_dangling_references() {
        let (key, a, b) = keys();
        let mut scene = RecordingScene::new();
        let mut cache = PrototypeCache::new();
        cache.get_or_create(&key, &a, &mut scene, export).unwrap();
        cache.get_or_create(&key, &b, &mut scene, export).unwrap();

        assert_eq!(cache.validate([(&a, &key), (&b, &key)]), Ok(()));
        assert!(matches!(
            cache.validate([(&a, &key)]),
            Err(CacheConsistencyError::StaleReferrer { .. })
        ));
        let missing = PrototypeKey::from("Gone-MESH");
        assert!(matches!(
            cache.validate([(&a, &key), (&b, &key), (&a, &missing)]),
            Err(CacheConsistencyError::DanglingInstance { .. })
        ));
    }
}
