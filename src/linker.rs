//! Light filter links.
//!
//! Each linked filter is a regular cached prototype, referenced by a key
//! derived from the light's instance key. Two or more filters on one light
//! get a combiner node appended after them in the light's filter list; the
//! combiner's inputs are the filter names grouped by combine mode.

use std::collections::BTreeMap;

use log::{debug, trace};

use crate::{
    cache::PrototypeCache,
    config::SyncSettings,
    error::SyncError,
    host::{CombineMode, HostScene, ObjectKind},
    identity::{IdentityResolver, InstanceKey, PrototypeKey},
    retained::{NodeKind, ParamList, ParamValue, RetainedScene, ShaderSchema},
    sync::SyncReport,
    translate::{linked_params, Entity, EntityKind, TranslateCx, Translator, TranslatorRegistry},
    utils::allocator::{NodeId, ObjectId},
};

/// Shader of the synthesized combiner node.
pub const COMBINER_SHADER: &str = "PxrCombinerLightFilter";

/// One light-to-filter reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterLink {
    /// Renderer name of the filter node.
    pub name: String,
    pub object: ObjectId,
    pub prototype: PrototypeKey,
    /// Key this link holds the filter prototype under.
    pub referrer: InstanceKey,
    pub mode: Option<CombineMode>,
}

#[derive(Debug, Clone, Default)]
pub struct LinkRecord {
    links: Vec<FilterLink>,
    combiner: Option<(NodeId, String)>,
}

impl LinkRecord {
    pub fn links(&self) -> &[FilterLink] {
        &self.links
    }

    pub fn combiner(&self) -> Option<NodeId> {
        self.combiner.as_ref().map(|(node, _)| *node)
    }

    /// Filter list as sent to the light: every filter, then the combiner.
    pub fn filter_names(&self) -> Vec<String> {
        self.links
            .iter()
            .map(|link| link.name.clone())
            .chain(self.combiner.as_ref().map(|(_, name)| name.clone()))
            .collect()
    }
}

/// Everything `link` needs from the running pass.
pub struct LinkEnv<'a> {
    pub host: &'a dyn HostScene,
    pub scene: &'a mut dyn RetainedScene,
    pub settings: &'a SyncSettings,
    pub resolver: &'a IdentityResolver,
    pub registry: &'a TranslatorRegistry,
    pub schema: &'a dyn ShaderSchema,
    pub cache: &'a mut PrototypeCache,
    pub report: &'a mut SyncReport,
}

/// Per-light link records, keyed by light instance.
#[derive(Debug, Default)]
pub struct LightFilterLinker {
    records: BTreeMap<InstanceKey, LinkRecord>,
}

impl LightFilterLinker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, light: &InstanceKey) -> Option<&LinkRecord> {
        self.records.get(light)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Every `(referrer, filter prototype)` reference the links hold.
    pub fn references(&self) -> impl Iterator<Item = (&InstanceKey, &PrototypeKey)> {
        self.records
            .values()
            .flat_map(|record| record.links.iter())
            .map(|link| (&link.referrer, &link.prototype))
    }

    /// Filters the light references that exist in the host, in declaration order.
    fn resolve(&self, light: &Entity, env: &LinkEnv<'_>) -> Vec<FilterLink> {
        let Some(ObjectKind::Light(data)) = env.host.object(light.id).map(|o| &o.kind) else {
            return Vec::new();
        };
        let mut links: Vec<FilterLink> = Vec::with_capacity(data.filters.len());
        for name in &data.filters {
            let Some(id) = env.host.find_object(name) else {
                debug!("{}: light filter {name} no longer exists", light.instance);
                continue;
            };
            let mode = match env.host.object(id).map(|o| &o.kind) {
                Some(ObjectKind::LightFilter(filter)) => filter.combine_mode,
                _ => {
                    debug!("{}: {name} is not a light filter", light.instance);
                    continue;
                }
            };
            let prototype = match env.resolver.resolve_prototype_key(env.host, id) {
                Ok(prototype) => prototype,
                Err(err) => {
                    debug!("{}: skipping filter {name}: {err}", light.instance);
                    continue;
                }
            };
            let referrer = light.instance.derive(&format!("filter.{prototype}"));
            if links.iter().any(|link| link.referrer == referrer) {
                continue;
            }
            links.push(FilterLink {
                name: prototype.to_string(),
                object: id,
                prototype,
                referrer,
                mode,
            });
        }
        links
    }

    /// Brings the light's filter links in line with the host.
    pub fn link(&mut self, light: &Entity, env: &mut LinkEnv<'_>) -> Result<(), SyncError> {
        let desired = self.resolve(light, env);
        let record = self.records.entry(light.instance.clone()).or_default();
        let changed = record.links != desired;

        if changed {
            trace!("{}: relinking {} filters", light.instance, desired.len());
            let mut acquired = Vec::with_capacity(desired.len());
            for link in desired {
                if record.links.contains(&link) || acquire(light, &link, env) {
                    acquired.push(link);
                }
            }
            for link in std::mem::take(&mut record.links) {
                if !acquired.contains(&link) {
                    release(&light.instance, &link, env.cache, &mut *env.scene, env.report)?;
                }
            }
            if let Some((node, _)) = record.combiner.take() {
                destroy_combiner(&mut *env.scene, node);
            }
            if acquired.len() > 1 {
                let name = format!("{}_combiner", light.prototype);
                let node = build_combiner(&mut *env.scene, &name, &acquired);
                record.combiner = Some((node, name));
            }
            record.links = acquired;
            env.report.links_updated.push(light.instance.clone());
        }

        let names = record.filter_names();
        if record.links.is_empty() && record.combiner.is_none() {
            self.records.remove(&light.instance);
        }
        if let Some(entry) = env.cache.get_mut(&light.prototype) {
            if entry.state.light_filters != names {
                entry.state.light_filters = names;
                env.scene.set_params(entry.node.id, &linked_params(&entry.state));
                if !changed {
                    env.report.links_updated.push(light.instance.clone());
                }
            }
        }
        Ok(())
    }

    /// Drops every link held by a removed light.
    pub fn unlink(
        &mut self,
        light: &InstanceKey,
        cache: &mut PrototypeCache,
        scene: &mut dyn RetainedScene,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        let Some(record) = self.records.remove(light) else {
            return Ok(());
        };
        debug!("{light}: unlinking {} filters", record.links.len());
        for link in &record.links {
            release(light, link, cache, scene, report)?;
        }
        if let Some((node, _)) = record.combiner {
            destroy_combiner(scene, node);
        }
        Ok(())
    }

    /// Destroys combiners and forgets every record. Filter prototypes are
    /// left to the cache.
    pub fn clear(&mut self, scene: &mut dyn RetainedScene) {
        for (_, record) in std::mem::take(&mut self.records) {
            if let Some((node, _)) = record.combiner {
                destroy_combiner(scene, node);
            }
        }
    }
}

/// Exports or refreshes the filter prototype and registers the link.
fn acquire(light: &Entity, link: &FilterLink, env: &mut LinkEnv<'_>) -> bool {
    let translator = env.registry.get(EntityKind::LightFilter);
    let filter = Entity {
        id: link.object,
        kind: EntityKind::LightFilter,
        prototype: link.prototype.clone(),
        instance: link.referrer.clone(),
        emitter: None,
        particle: None,
    };
    let mut cx = TranslateCx {
        host: env.host,
        settings: env.settings,
        schema: env.schema,
        deform: None,
        warnings: &mut env.report.warnings,
    };
    let lookup = env.cache.get_or_create(
        &link.prototype,
        &link.referrer,
        &mut *env.scene,
        |scene| translator.export(&mut cx, scene, &filter),
    );
    let lookup = match lookup {
        Ok(lookup) => lookup,
        Err(err) => {
            env.report.translate_error(&light.instance, err);
            return false;
        }
    };
    if lookup.created {
        env.report.created.push(link.prototype.clone());
    }
    if let Some(entry) = env.cache.get_mut(&link.prototype) {
        if !lookup.created && translator.needs_update(&cx, &filter, &entry.state) {
            match translator.update(&mut cx, &mut *env.scene, &filter, entry.node, &mut entry.state) {
                Ok(_) => env.report.updated.push(link.prototype.clone()),
                Err(err) => env.report.translate_error(&light.instance, err),
            }
        }
        entry.state.owning_lights.insert(light.instance.clone());
    }
    true
}

fn release(
    light: &InstanceKey,
    link: &FilterLink,
    cache: &mut PrototypeCache,
    scene: &mut dyn RetainedScene,
    report: &mut SyncReport,
) -> Result<(), SyncError> {
    if let Some(entry) = cache.get_mut(&link.prototype) {
        entry.state.owning_lights.remove(light);
    }
    if cache.release(&link.prototype, &link.referrer, scene)? {
        report.evicted.push(link.prototype.clone());
    }
    Ok(())
}

fn build_combiner(scene: &mut dyn RetainedScene, name: &str, links: &[FilterLink]) -> NodeId {
    let mut params = ParamList::new().with("shader", ParamValue::String(COMBINER_SHADER.into()));
    for mode in CombineMode::ALL {
        let inputs: Vec<String> = links
            .iter()
            .filter(|link| link.mode == Some(mode))
            .map(|link| link.name.clone())
            .collect();
        if !inputs.is_empty() {
            params.set(mode.as_str(), ParamValue::StringArray(inputs));
        }
    }
    let node = scene.create_node(NodeKind::LightFilter, name);
    scene.set_params(node, &params);
    scene.add_child(scene.root(), node);
    debug!("{name}: combining {} filters", links.len());
    node
}

fn destroy_combiner(scene: &mut dyn RetainedScene, node: NodeId) {
    scene.remove_child(scene.root(), node);
    scene.destroy_node(node);
}
