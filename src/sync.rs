//! The per-frame sync pass.
//!
//! `SyncContext::sync_frame` runs, in order: cache validation, traversal,
//! the motion pre-pass, the main translate pass, instance removal, and
//! light filter linking. Everything runs on the calling thread.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Instant;

use glam::Mat4;
use log::{debug, error, trace, warn};
use serde::Serialize;

use crate::{
    cache::PrototypeCache,
    config::SyncSettings,
    error::{
        ExtractionWarning, IdentityError, MotionSampleError, SyncError, TranslateError,
    },
    host::HostScene,
    identity::{IdentityResolver, InstanceKey, PrototypeKey},
    linker::{LightFilterLinker, LinkEnv},
    motion::{MotionCache, MotionPass, MotionSampler, TransformMotion},
    retained::{NodeKind, NoTextureSchema, RetainedScene, ShaderSchema},
    translate::{AnyTranslator, Entity, EntityKind, TranslateCx, Translator, TranslatorRegistry},
    utils::{
        allocator::{NodeId, ObjectId},
        logging::{warn_if_pass_budget_exceeded, PassProfile, ScopedTimer},
        math::mat4_identical,
    },
};

/// What one pass changed, plus every non-fatal error it hit.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub frame: f64,
    pub created: Vec<PrototypeKey>,
    pub updated: Vec<PrototypeKey>,
    pub evicted: Vec<PrototypeKey>,
    pub instances_added: Vec<InstanceKey>,
    pub instances_removed: Vec<InstanceKey>,
    pub transforms_updated: Vec<InstanceKey>,
    /// Lights whose filter list was rebuilt or re-sent.
    pub links_updated: Vec<InstanceKey>,
    pub warnings: Vec<ExtractionWarning>,
    pub identity_errors: Vec<IdentityError>,
    pub motion_errors: Vec<MotionSampleError>,
    #[serde(skip)]
    pub translate_errors: Vec<(InstanceKey, TranslateError)>,
    /// Entities found animated but static over the shutter.
    pub static_motion: usize,
    pub profile: PassProfile,
}

impl SyncReport {
    /// No renderer-visible change happened.
    pub fn is_empty(&self) -> bool {
        self.created.is_empty()
            && self.updated.is_empty()
            && self.evicted.is_empty()
            && self.instances_added.is_empty()
            && self.instances_removed.is_empty()
            && self.transforms_updated.is_empty()
            && self.links_updated.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        !self.identity_errors.is_empty()
            || !self.motion_errors.is_empty()
            || !self.translate_errors.is_empty()
    }

    pub(crate) fn translate_error(&mut self, instance: &InstanceKey, err: TranslateError) {
        warn!("{instance}: {err}");
        self.translate_errors.push((instance.clone(), err));
    }
}

/// Cooperative whole-pass cancellation flag, checked between entities.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// One placement as last sent to the renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceState {
    pub prototype: PrototypeKey,
    pub kind: EntityKind,
    /// Group carrying the placement transform; parent of the prototype node.
    pub group: NodeId,
    pub transform: Option<Mat4>,
    pub motion: Option<TransformMotion>,
}

impl InstanceState {
    pub fn is_transforming(&self) -> bool {
        self.motion.is_some()
    }

    pub fn motion_sample_count(&self) -> usize {
        self.motion.as_ref().map_or(0, TransformMotion::len)
    }
}

/// Parent-to-children index over the host's objects, built once per pass.
#[derive(Debug, Default)]
pub struct ChildrenIndex {
    roots: Vec<ObjectId>,
    children: HashMap<ObjectId, Vec<ObjectId>>,
    total: usize,
}

impl ChildrenIndex {
    pub fn build(host: &dyn HostScene) -> Self {
        let mut ids = host.object_ids();
        ids.sort();
        let mut index = Self {
            total: ids.len(),
            ..Self::default()
        };
        for id in ids {
            let parent = host.object(id).and_then(|object| object.parent);
            match parent {
                Some(parent) if parent != id && host.object(parent).is_some() => {
                    index.children.entry(parent).or_default().push(id)
                }
                _ => index.roots.push(id),
            }
        }
        index
    }

    pub fn roots(&self) -> &[ObjectId] {
        &self.roots
    }

    pub fn children(&self, id: ObjectId) -> &[ObjectId] {
        self.children.get(&id).map_or(&[], Vec::as_slice)
    }

    /// Depth-first, parents before children.
    pub fn walk(&self) -> Vec<ObjectId> {
        let mut order = Vec::with_capacity(self.total);
        let mut stack: Vec<ObjectId> = self.roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.children(id).iter().rev().copied());
        }
        if order.len() < self.total {
            warn!(
                "{} objects are unreachable from any root (parent cycle)",
                self.total - order.len()
            );
        }
        order
    }
}

/// Owns everything that persists between passes for one render session.
pub struct SyncContext {
    settings: SyncSettings,
    resolver: IdentityResolver,
    registry: TranslatorRegistry,
    cache: PrototypeCache,
    instances: BTreeMap<InstanceKey, InstanceState>,
    linker: LightFilterLinker,
    schema: Box<dyn ShaderSchema + Send + Sync>,
    cancel: CancelToken,
    passes: u64,
}

impl Default for SyncContext {
    fn default() -> Self {
        Self::new(SyncSettings::default())
    }
}

impl std::fmt::Debug for SyncContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncContext")
            .field("settings", &self.settings)
            .field("prototypes", &self.cache.len())
            .field("instances", &self.instances.len())
            .field("passes", &self.passes)
            .finish()
    }
}

impl SyncContext {
    pub fn new(settings: SyncSettings) -> Self {
        Self {
            resolver: IdentityResolver::new(settings.share_data_workaround),
            settings,
            registry: TranslatorRegistry::new(),
            cache: PrototypeCache::new(),
            instances: BTreeMap::new(),
            linker: LightFilterLinker::new(),
            schema: Box::new(NoTextureSchema),
            cancel: CancelToken::new(),
            passes: 0,
        }
    }

    pub fn with_schema(mut self, schema: impl ShaderSchema + Send + Sync + 'static) -> Self {
        self.schema = Box::new(schema);
        self
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Applies new settings. Extraction-affecting changes refresh every
    /// prototype on its next visit; motion changes are picked up by change
    /// detection.
    pub fn set_settings(&mut self, settings: SyncSettings) {
        if settings == self.settings {
            return;
        }
        let refresh = settings.smooth_normals != self.settings.smooth_normals
            || settings.export_tangents != self.settings.export_tangents;
        self.resolver = IdentityResolver::new(settings.share_data_workaround);
        self.settings = settings;
        if refresh {
            self.cache.mark_stale();
        }
    }

    pub fn cache(&self) -> &PrototypeCache {
        &self.cache
    }

    pub fn instance(&self, key: &InstanceKey) -> Option<&InstanceState> {
        self.instances.get(key)
    }

    pub fn instances(&self) -> impl Iterator<Item = (&InstanceKey, &InstanceState)> {
        self.instances.iter()
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    pub fn linker(&self) -> &LightFilterLinker {
        &self.linker
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn passes(&self) -> u64 {
        self.passes
    }

    /// Checks the cache against every live reference.
    pub fn validate(&self) -> Result<(), SyncError> {
        let live = self
            .instances
            .iter()
            .map(|(key, state)| (key, &state.prototype))
            .chain(self.linker.references());
        self.cache.validate(live).map_err(|err| {
            error!("prototype cache is inconsistent: {err}");
            SyncError::from(err)
        })
    }

    /// Visits every visible object and particle placement, resolving keys.
    pub fn traverse(&self, host: &dyn HostScene, report: &mut SyncReport) -> Vec<Entity> {
        let index = ChildrenIndex::build(host);
        let mut entities = Vec::new();
        for id in index.walk() {
            let Some(object) = host.object(id) else {
                continue;
            };
            if object.hidden {
                trace!("{}: hidden", object.name);
                continue;
            }
            let kind = EntityKind::of(&object.kind);
            let resolved = self
                .resolver
                .resolve_prototype_key(host, id)
                .and_then(|prototype| {
                    let instance = self.resolver.resolve_instance_key(host, id, None, None, None)?;
                    Ok((prototype, instance))
                });
            match resolved {
                Ok((prototype, instance)) => entities.push(Entity {
                    id,
                    kind,
                    prototype,
                    instance,
                    emitter: None,
                    particle: None,
                }),
                Err(err) => {
                    warn!("skipping {}: {err}", object.name);
                    report.identity_errors.push(err);
                    continue;
                }
            }

            for particle in &object.particle_instances {
                let resolved = host
                    .object(particle.object)
                    .ok_or(IdentityError::MissingObject(particle.object))
                    .and_then(|target| {
                        let prototype = self.resolver.resolve_prototype_key(host, particle.object)?;
                        let instance = self.resolver.resolve_instance_key(
                            host,
                            particle.object,
                            Some(id),
                            Some(particle.particle_system.as_str()),
                            Some(particle.persistent_id.as_slice()),
                        )?;
                        Ok((EntityKind::of(&target.kind), prototype, instance))
                    });
                match resolved {
                    Ok((kind, prototype, instance)) => entities.push(Entity {
                        id: particle.object,
                        kind,
                        prototype,
                        instance,
                        emitter: Some(id),
                        particle: Some(particle.clone()),
                    }),
                    Err(err) => {
                        warn!("skipping particle of {}: {err}", object.name);
                        report.identity_errors.push(err);
                    }
                }
            }
        }
        entities
    }

    /// Brings `scene` in line with `host` at `frame`.
    pub fn sync_frame(
        &mut self,
        host: &mut dyn HostScene,
        scene: &mut dyn RetainedScene,
        frame: f64,
    ) -> Result<SyncReport, SyncError> {
        let started = Instant::now();
        let mut report = SyncReport {
            frame,
            ..SyncReport::default()
        };
        let mut profile = PassProfile::default();
        self.validate()?;
        if self.cancel.is_cancelled() {
            self.cancel.reset();
            return Err(SyncError::Cancelled);
        }

        if host.frame() != frame {
            host.set_frame(frame);
        }

        let entities = {
            let _timer = ScopedTimer::new("traversal", &mut profile.traversal);
            self.traverse(&*host, &mut report)
        };

        let motion = if self.settings.motion.enabled {
            let _timer = ScopedTimer::new("motion", &mut profile.motion);
            MotionSampler::new(&self.settings.motion, &self.registry).sample(host, &entities, frame)
        } else {
            MotionPass::default()
        };
        report.motion_errors = motion.errors;
        report.static_motion = motion.static_entities;

        let host: &dyn HostScene = &*host;
        let mut seen: BTreeSet<InstanceKey> = BTreeSet::new();
        {
            let _timer = ScopedTimer::new("translate", &mut profile.translate);
            let mut pass = Pass {
                host,
                scene: &mut *scene,
                settings: &self.settings,
                registry: &self.registry,
                schema: self.schema.as_ref(),
                cache: &mut self.cache,
                instances: &mut self.instances,
                motion: &motion.cache,
                report: &mut report,
                refreshed: HashSet::new(),
            };
            for entity in &entities {
                if self.cancel.is_cancelled() {
                    self.cancel.reset();
                    warn!("sync of frame {frame} cancelled");
                    return Err(SyncError::Cancelled);
                }
                if !seen.insert(entity.instance.clone()) {
                    let err = IdentityError::DuplicateInstance {
                        key: entity.instance.to_string(),
                        object: entity.id,
                    };
                    warn!("{err}");
                    pass.report.identity_errors.push(err);
                    continue;
                }
                pass.sync_entity(entity)?;
            }

            let removed: Vec<InstanceKey> = pass
                .instances
                .keys()
                .filter(|key| !seen.contains(*key))
                .cloned()
                .collect();
            for key in removed {
                if let Some(state) = pass.remove_instance(&key)? {
                    if state.kind == EntityKind::Light {
                        self.linker
                            .unlink(&key, pass.cache, &mut *pass.scene, pass.report)?;
                    }
                }
            }
        }

        {
            let _timer = ScopedTimer::new("link", &mut profile.link);
            let mut env = LinkEnv {
                host,
                scene: &mut *scene,
                settings: &self.settings,
                resolver: &self.resolver,
                registry: &self.registry,
                schema: self.schema.as_ref(),
                cache: &mut self.cache,
                report: &mut report,
            };
            for light in entities.iter().filter(|e| e.kind == EntityKind::Light) {
                let synced = self
                    .instances
                    .get(&light.instance)
                    .map_or(false, |state| state.prototype == light.prototype);
                if synced {
                    self.linker.link(light, &mut env)?;
                }
            }
        }

        self.passes += 1;
        profile.total = started.elapsed();
        if let Some(budget) = self.settings.pass_budget_ms {
            warn_if_pass_budget_exceeded(profile.total, budget);
        }
        report.profile = profile;
        debug!(
            "frame {frame}: +{} ~{} -{} prototypes, +{} -{} instances, {} transforms",
            report.created.len(),
            report.updated.len(),
            report.evicted.len(),
            report.instances_added.len(),
            report.instances_removed.len(),
            report.transforms_updated.len()
        );
        Ok(report)
    }

    /// Removes every instance and prototype from `scene`.
    pub fn clear(&mut self, scene: &mut dyn RetainedScene) {
        self.linker.clear(scene);
        for (_, state) in std::mem::take(&mut self.instances) {
            scene.destroy_node(state.group);
        }
        self.cache.clear(scene);
    }
}

/// Borrowed state of the main translate pass.
struct Pass<'a> {
    host: &'a dyn HostScene,
    scene: &'a mut dyn RetainedScene,
    settings: &'a SyncSettings,
    registry: &'a TranslatorRegistry,
    schema: &'a dyn ShaderSchema,
    cache: &'a mut PrototypeCache,
    instances: &'a mut BTreeMap<InstanceKey, InstanceState>,
    motion: &'a MotionCache,
    report: &'a mut SyncReport,
    /// Prototypes already checked for updates this pass.
    refreshed: HashSet<PrototypeKey>,
}

impl Pass<'_> {
    fn sync_entity(&mut self, entity: &Entity) -> Result<(), SyncError> {
        trace!("{} -> {}", entity.instance, entity.prototype);
        let (registry, motion) = (self.registry, self.motion);
        let translator = registry.get(entity.kind);
        let mut cx = TranslateCx {
            host: self.host,
            settings: self.settings,
            schema: self.schema,
            deform: motion.deform(&entity.prototype),
            warnings: &mut self.report.warnings,
        };

        let lookup = self.cache.get_or_create(
            &entity.prototype,
            &entity.instance,
            &mut *self.scene,
            |scene| translator.export(&mut cx, scene, entity),
        );
        let lookup = match lookup {
            Ok(lookup) => lookup,
            Err(err) => {
                self.report.translate_error(&entity.instance, err);
                return Ok(());
            }
        };

        let first_visit = self.refreshed.insert(entity.prototype.clone());
        if lookup.created {
            self.report.created.push(entity.prototype.clone());
        } else if let Some(entry) = self.cache.get_mut(&entity.prototype) {
            if first_visit {
                entry.state.is_transforming = false;
                if translator.needs_update(&cx, entity, &entry.state) {
                    match translator.update(&mut cx, &mut *self.scene, entity, entry.node, &mut entry.state) {
                        Ok(_) => self.report.updated.push(entity.prototype.clone()),
                        Err(err) => self.report.translate_error(&entity.instance, err),
                    }
                }
            }
        }

        self.place_instance(entity, lookup.node.id)?;
        self.sync_transform(entity, translator);
        Ok(())
    }

    /// Creates the instance group, or repoints it at a new prototype.
    fn place_instance(&mut self, entity: &Entity, prototype_node: NodeId) -> Result<(), SyncError> {
        let scene = &mut *self.scene;
        match self.instances.get_mut(&entity.instance) {
            None => {
                let group = scene.create_node(NodeKind::Group, entity.instance.as_str());
                scene.add_child(scene.root(), group);
                scene.add_child(group, prototype_node);
                self.instances.insert(
                    entity.instance.clone(),
                    InstanceState {
                        prototype: entity.prototype.clone(),
                        kind: entity.kind,
                        group,
                        transform: None,
                        motion: None,
                    },
                );
                self.report.instances_added.push(entity.instance.clone());
            }
            Some(state) if state.prototype != entity.prototype => {
                if let Some(old) = self.cache.node(&state.prototype) {
                    scene.remove_child(state.group, old.id);
                }
                scene.add_child(state.group, prototype_node);
                let old = std::mem::replace(&mut state.prototype, entity.prototype.clone());
                state.kind = entity.kind;
                debug!("{}: {old} -> {}", entity.instance, entity.prototype);
                if self.cache.release(&old, &entity.instance, scene)? {
                    self.report.evicted.push(old);
                }
            }
            Some(_) => {}
        }
        Ok(())
    }

    fn sync_transform(&mut self, entity: &Entity, translator: &AnyTranslator) {
        let Some(state) = self.instances.get_mut(&entity.instance) else {
            return;
        };
        match self.motion.transform(&entity.instance) {
            Some(motion) => {
                if let Some(entry) = self.cache.get_mut(&entity.prototype) {
                    entry.state.is_transforming = true;
                }
                if state.motion.as_ref() != Some(motion) {
                    self.scene
                        .set_transform_samples(state.group, &motion.times, &motion.samples);
                    state.motion = Some(motion.clone());
                    state.transform = None;
                    self.report.transforms_updated.push(entity.instance.clone());
                }
            }
            None => {
                let world = match entity.world_transform(self.host) {
                    Ok(world) => world,
                    Err(err) => {
                        self.report
                            .translate_error(&entity.instance, TranslateError::Host(err));
                        return;
                    }
                };
                let oriented = translator.orient(world);
                let unchanged = state.motion.is_none()
                    && state
                        .transform
                        .map_or(false, |previous| mat4_identical(&previous, &oriented));
                if !unchanged {
                    translator.update_transform(&mut *self.scene, state.group, world);
                    state.transform = Some(oriented);
                    state.motion = None;
                    self.report.transforms_updated.push(entity.instance.clone());
                }
            }
        }
    }

    fn remove_instance(&mut self, key: &InstanceKey) -> Result<Option<InstanceState>, SyncError> {
        let Some(state) = self.instances.remove(key) else {
            return Ok(None);
        };
        self.scene.destroy_node(state.group);
        self.report.instances_removed.push(key.clone());
        if self.cache.release(&state.prototype, key, &mut *self.scene)? {
            self.report.evicted.push(state.prototype.clone());
        }
        Ok(Some(state))
    }
}
