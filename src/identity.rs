//! Stable naming for prototypes and instances.
//!
//! Data-block names carry a type suffix (`-MESH`) because the host keeps
//! data blocks in a namespace separate from objects. Lights, light filters,
//! cameras and empties are never shared, so they use their object's own
//! identity. Every emitted name is restricted to `[A-Za-z0-9_.-]`; the
//! separators `|` and `:` only ever appear between sanitized components.
//!
//! Names that lose characters to sanitizing, or that contain the reserved
//! `-MESH` tag, get a digest of the raw name appended, so two distinct host
//! names never map to the same key.

use std::fmt;

use serde::Serialize;

use crate::{
    error::IdentityError,
    host::{HostObject, HostScene},
    translate::EntityKind,
    utils::allocator::ObjectId,
};

/// Identifies one shared data block as seen by the renderer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PrototypeKey(String);

impl PrototypeKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PrototypeKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl fmt::Display for PrototypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifies one placement of a prototype.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct InstanceKey(String);

impl InstanceKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key for a link owned by this instance (e.g. a light's filter reference).
    pub fn derive(&self, suffix: &str) -> InstanceKey {
        InstanceKey(format!("{}:{}", self.0, sanitize(suffix)))
    }
}

impl From<&str> for InstanceKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

const MESH_SUFFIX: &str = "-MESH";

/// Strips every character the renderer's node-name grammar rejects.
pub fn sanitize(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect()
}

/// Renderer-safe name that stays distinct for distinct inputs.
///
/// Names already in the identifier set and free of the `-MESH` tag pass
/// through unchanged; anything else gets `_` plus a digest of the raw name.
pub fn unique_name(name: &str) -> String {
    let cleaned = sanitize(name);
    if cleaned == name && !name.contains(MESH_SUFFIX) {
        return cleaned;
    }
    let digest = fnv1a64(name.bytes());
    format!("{cleaned}_{:08x}", (digest ^ (digest >> 32)) as u32)
}

fn fnv1a64(bytes: impl IntoIterator<Item = u8>) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityResolver {
    /// Key mesh data by owning object; see `SyncSettings::share_data_workaround`.
    pub share_data_workaround: bool,
}

impl IdentityResolver {
    pub fn new(share_data_workaround: bool) -> Self {
        Self {
            share_data_workaround,
        }
    }

    fn owner<'a>(
        &self,
        host: &'a dyn HostScene,
        id: ObjectId,
    ) -> Result<&'a HostObject, IdentityError> {
        let object = host.object(id).ok_or(IdentityError::MissingObject(id))?;
        if object.name.is_empty() {
            return Err(IdentityError::Unnamed(id));
        }
        Ok(object)
    }

    fn clean(raw: &str) -> Result<String, IdentityError> {
        if sanitize(raw).is_empty() {
            return Err(IdentityError::EmptyName(raw.to_string()));
        }
        Ok(unique_name(raw))
    }

    /// Type-tagged renderer name for `id` seen as `kind`.
    pub fn resolve_db_name(
        &self,
        host: &dyn HostScene,
        id: ObjectId,
        kind: EntityKind,
    ) -> Result<String, IdentityError> {
        let object = self.owner(host, id)?;
        match kind {
            EntityKind::Mesh => {
                let base = match object.data_name() {
                    Some(data) if !self.share_data_workaround && !data.is_empty() => data,
                    _ => object.name.as_str(),
                };
                Ok(format!("{}{MESH_SUFFIX}", Self::clean(base)?))
            }
            EntityKind::Light | EntityKind::LightFilter | EntityKind::Camera | EntityKind::Empty => {
                Self::clean(&object.name)
            }
        }
    }

    /// Key of the shared data `id` renders with.
    ///
    /// Meshes with a modifier stack or extra attribute requests get a digest
    /// of both appended, so only objects that would extract the same
    /// primvars share a prototype.
    pub fn resolve_prototype_key(
        &self,
        host: &dyn HostScene,
        id: ObjectId,
    ) -> Result<PrototypeKey, IdentityError> {
        let object = self.owner(host, id)?;
        let kind = EntityKind::of(&object.kind);
        let name = self.resolve_db_name(host, id, kind)?;
        if kind != EntityKind::Mesh
            || (object.modifiers.is_empty() && object.primvar_requests.is_empty())
        {
            return Ok(PrototypeKey(name));
        }
        let modifiers = object.render_modifiers().flat_map(|m| {
            format!("{:?}\u{1f}{}\u{1f}", m.kind, m.settings).into_bytes()
        });
        let requests = object
            .primvar_requests
            .iter()
            .flat_map(|layer| format!("\u{1e}{layer}").into_bytes());
        let digest = fnv1a64(modifiers.chain(requests));
        Ok(PrototypeKey(format!("{name}-{digest:016x}")))
    }

    /// Key of one placement of `id`.
    ///
    /// `parent` is the instancing object (particle emitter), not the
    /// transform parent; top-level placements are keyed by the object alone.
    pub fn resolve_instance_key(
        &self,
        host: &dyn HostScene,
        id: ObjectId,
        parent: Option<ObjectId>,
        particle_system: Option<&str>,
        persistent_id: Option<&[i32]>,
    ) -> Result<InstanceKey, IdentityError> {
        let object = self.owner(host, id)?;
        let name = Self::clean(&object.name)?;
        let mut key = match parent {
            None => name,
            Some(parent_id) => {
                let parent = host
                    .object(parent_id)
                    .ok_or_else(|| IdentityError::MissingParent {
                        object: object.name.clone(),
                        parent: parent_id,
                    })?;
                let parent_name = Self::clean(&parent.name)?;
                match particle_system {
                    Some(psys) => format!("{parent_name}|{}|{name}", Self::clean(psys)?),
                    None => format!("{parent_name}|{name}"),
                }
            }
        };
        if let Some(ids) = persistent_id.filter(|ids| !ids.is_empty()) {
            let ids: Vec<String> = ids.iter().map(i32::to_string).collect();
            key.push(':');
            key.push_str(&ids.join("_"));
        }
        Ok(InstanceKey(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{HostMesh, LightData, Modifier, ModifierKind, ObjectKind, SceneArena};

    fn scene() -> (SceneArena, ObjectId, ObjectId, ObjectId) {
        let mut scene = SceneArena::new();
        scene.add_mesh(HostMesh::grid("Grid", 1, 1));
        let a = scene.add_object(HostObject::mesh("Plane A", "Grid"));
        let b = scene.add_object(HostObject::mesh("Plane.B", "Grid"));
        let light = scene.add_object(HostObject::new(
            "Grid",
            ObjectKind::Light(LightData::new("PxrRectLight")),
        ));
        (scene, a, b, light)
    }

    #[test]
    fn shared_data_shares_prototype_but_not_instance() {
        let (scene, a, b, _) = scene();
        let resolver = IdentityResolver::default();
        let pa = resolver.resolve_prototype_key(&scene, a).unwrap();
        let pb = resolver.resolve_prototype_key(&scene, b).unwrap();
        assert_eq!(pa, pb);
        assert_eq!(pa.as_str(), "Grid-MESH");

        let ia = resolver.resolve_instance_key(&scene, a, None, None, None).unwrap();
        let ib = resolver.resolve_instance_key(&scene, b, None, None, None).unwrap();
        assert_ne!(ia, ib);
        assert!(ia.as_str().starts_with("PlaneA_"));
        assert_eq!(ib.as_str(), "Plane.B");
    }

    #[test]
    fn kinds_with_same_base_name_do_not_collide() {
        let (scene, a, _, light) = scene();
        let resolver = IdentityResolver::default();
        let mesh = resolver.resolve_prototype_key(&scene, a).unwrap();
        let light = resolver.resolve_prototype_key(&scene, light).unwrap();
        assert_eq!(light.as_str(), "Grid");
        assert_ne!(mesh, light);
    }

    #[test]
    fn modifier_stacks_split_prototypes() {
        let (mut scene, a, b, _) = scene();
        scene.object_mut(b).unwrap().modifiers =
            vec![Modifier::new("Array", ModifierKind::Topology)];
        let resolver = IdentityResolver::default();
        let pa = resolver.resolve_prototype_key(&scene, a).unwrap();
        let pb = resolver.resolve_prototype_key(&scene, b).unwrap();
        assert_ne!(pa, pb);
        assert!(pb.as_str().starts_with("Grid-MESH-"));

        scene.object_mut(a).unwrap().modifiers =
            vec![Modifier::new("Array", ModifierKind::Topology)];
        assert_eq!(resolver.resolve_prototype_key(&scene, a).unwrap(), pb);
    }

    #[test]
    fn workaround_keys_mesh_by_owning_object() {
        let (scene, a, b, _) = scene();
        let resolver = IdentityResolver::new(true);
        let pa = resolver.resolve_prototype_key(&scene, a).unwrap();
        let pb = resolver.resolve_prototype_key(&scene, b).unwrap();
        assert_eq!(pa.as_str(), format!("{}-MESH", unique_name("Plane A")));
        assert_eq!(pb.as_str(), "Plane.B-MESH");
    }

    #[test]
    fn particle_instances_include_system_and_persistent_id() {
        let (scene, a, b, _) = scene();
        let resolver = IdentityResolver::default();
        let key = resolver
            .resolve_instance_key(&scene, b, Some(a), Some("Hair System"), Some(&[3, -1]))
            .unwrap();
        assert_eq!(
            key.as_str(),
            format!("{}|{}|Plane.B:3_-1", unique_name("Plane A"), unique_name("Hair System"))
        );

        let other = resolver
            .resolve_instance_key(&scene, b, Some(a), Some("Hair System"), Some(&[4, -1]))
            .unwrap();
        assert_ne!(key, other);
    }

    #[test]
    fn unresolvable_owners_are_identity_errors() {
        let (mut scene, a, b, _) = scene();
        let resolver = IdentityResolver::default();
        scene.remove_object(a);
        assert_eq!(
            resolver.resolve_prototype_key(&scene, a),
            Err(IdentityError::MissingObject(a))
        );
        assert!(matches!(
            resolver.resolve_instance_key(&scene, b, Some(a), None, None),
            Err(IdentityError::MissingParent { .. })
        ));

        let blank = scene.add_object(HostObject::new("%%", ObjectKind::Empty));
        assert!(matches!(
            resolver.resolve_instance_key(&scene, blank, None, None, None),
            Err(IdentityError::EmptyName(_))
        ));
    }

    #[test]
    fn sanitize_strips_outside_identifier_set() {
        assert_eq!(sanitize("Cube (1)/é.001"), "Cube1.001");
    }

    #[test]
    fn names_differing_only_in_stripped_characters_stay_distinct() {
        let variants = [
            "PlaneA", "Plane A", "Plane  A", "Plane-A", "Plane_A", "Plane/A", "(PlaneA)",
            "PlaneA ", "Planeé",
        ];
        let mut scene = SceneArena::new();
        let mut prototypes = Vec::new();
        let mut instances = Vec::new();
        let resolver = IdentityResolver::default();
        for (i, name) in variants.iter().enumerate() {
            scene.add_mesh(HostMesh::grid(*name, 1, 1));
            let id = scene.add_object(HostObject::mesh(*name, *name));
            let light = scene.add_object(HostObject::new(
                format!("{name}-MESH"),
                ObjectKind::Light(LightData::new("PxrRectLight")),
            ));
            prototypes.push(resolver.resolve_prototype_key(&scene, id).unwrap());
            prototypes.push(resolver.resolve_prototype_key(&scene, light).unwrap());
            instances.push(resolver.resolve_instance_key(&scene, id, None, None, None).unwrap());
            instances.push(resolver.resolve_instance_key(&scene, light, None, None, None).unwrap());
            assert!(unique_name(name)
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')), "{i}");
        }
        let distinct: std::collections::BTreeSet<_> = prototypes.iter().collect();
        assert_eq!(distinct.len(), prototypes.len(), "{prototypes:?}");
        let distinct: std::collections::BTreeSet<_> = instances.iter().collect();
        assert_eq!(distinct.len(), instances.len(), "{instances:?}");
    }

    #[test]
    fn lights_never_take_a_mesh_data_key() {
        let (mut scene, a, _, _) = scene();
        let light = scene.add_object(HostObject::new(
            "Grid-MESH",
            ObjectKind::Light(LightData::new("PxrRectLight")),
        ));
        let resolver = IdentityResolver::default();
        let mesh = resolver.resolve_prototype_key(&scene, a).unwrap();
        let light = resolver.resolve_prototype_key(&scene, light).unwrap();
        assert_eq!(mesh.as_str(), "Grid-MESH");
        assert_ne!(mesh, light);
    }

    #[test]
    fn attribute_requests_split_prototypes() {
        let (mut scene, a, b, _) = scene();
        scene.object_mut(b).unwrap().primvar_requests = vec!["Detail".to_string()];
        let resolver = IdentityResolver::default();
        let pa = resolver.resolve_prototype_key(&scene, a).unwrap();
        let pb = resolver.resolve_prototype_key(&scene, b).unwrap();
        assert_eq!(pa.as_str(), "Grid-MESH");
        assert!(pb.as_str().starts_with("Grid-MESH-"));

        scene.object_mut(a).unwrap().primvar_requests = vec!["Detail".to_string()];
        assert_eq!(resolver.resolve_prototype_key(&scene, a).unwrap(), pb);
    }
}
