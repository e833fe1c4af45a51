//! Motion Blur Sampler.
//!
//! Runs before the main sync pass. Moving entities are grouped by their
//! sample count; the union of every group's sub-frame offsets is visited in
//! ascending order, one host time change per distinct offset, and the host
//! is left on the nominal frame afterwards.

use std::collections::{BTreeMap, HashSet};

use glam::{Mat4, Vec3};
use log::{trace, warn};

use crate::{
    config::{MotionSettings, ShutterTiming, MOTION_OFFSET_EPSILON},
    error::MotionSampleError,
    host::HostScene,
    identity::{InstanceKey, PrototypeKey},
    translate::{Entity, Translator, TranslatorRegistry},
    utils::math::{mat4_identical, points_identical},
};

/// Evenly spaced sub-frame offsets for one shutter configuration.
///
/// The shutter interval is `shutter_angle / 360` frames. `Center` spans
/// `[-interval/2, +interval/2]`, `Pre` spans `[-interval, 0]` and `Post`
/// spans `[0, +interval]`. One segment yields just the interval start.
pub fn subframe_offsets(timing: ShutterTiming, shutter_angle: f32, segments: u32) -> Vec<f32> {
    let interval = shutter_angle / 360.0;
    let min = match timing {
        ShutterTiming::Center => -interval * 0.5,
        ShutterTiming::Pre => -interval,
        ShutterTiming::Post => 0.0,
    };
    match segments {
        0 => Vec::new(),
        1 => vec![min],
        n => {
            let step = interval / (n - 1) as f32;
            (0..n).map(|i| min + i as f32 * step).collect()
        }
    }
}

/// Transform samples of one instance, ordered by segment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransformMotion {
    pub times: Vec<f32>,
    pub samples: Vec<Mat4>,
}

impl TransformMotion {
    pub fn record(&mut self, segment: usize, time: f32, transform: Mat4) {
        if segment < self.samples.len() {
            self.times[segment] = time;
            self.samples[segment] = transform;
        } else {
            self.times.push(time);
            self.samples.push(transform);
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// First and last samples differ.
    pub fn is_moving(&self) -> bool {
        match (self.samples.first(), self.samples.last()) {
            (Some(first), Some(last)) => !mat4_identical(first, last),
            _ => false,
        }
    }
}

/// Deformed point positions of one prototype, ordered by segment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeformMotion {
    pub times: Vec<f32>,
    pub samples: Vec<Vec<Vec3>>,
}

impl DeformMotion {
    pub fn record(&mut self, segment: usize, time: f32, points: Vec<Vec3>) {
        if segment < self.samples.len() {
            self.times[segment] = time;
            self.samples[segment] = points;
        } else {
            self.times.push(time);
            self.samples.push(points);
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn is_moving(&self) -> bool {
        match (self.samples.first(), self.samples.last()) {
            (Some(first), Some(last)) => !points_identical(first, last),
            _ => false,
        }
    }

    /// Every sample has `points` positions.
    pub fn matches_point_count(&self, points: usize) -> bool {
        self.samples.iter().all(|sample| sample.len() == points)
    }
}

/// Samples that survived the actual-motion check, consumed by the main pass.
#[derive(Debug, Clone, Default)]
pub struct MotionCache {
    pub transforms: BTreeMap<InstanceKey, TransformMotion>,
    pub deforms: BTreeMap<PrototypeKey, DeformMotion>,
}

impl MotionCache {
    pub fn transform(&self, instance: &InstanceKey) -> Option<&TransformMotion> {
        self.transforms.get(instance)
    }

    pub fn deform(&self, prototype: &PrototypeKey) -> Option<&DeformMotion> {
        self.deforms.get(prototype)
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty() && self.deforms.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
struct Member {
    entity: usize,
    transform: bool,
    deform: bool,
}

/// Entities sharing one sample count, sampled at the same offsets.
#[derive(Debug, Clone)]
pub struct MotionGroup {
    pub segments: u32,
    pub offsets: Vec<f32>,
    members: Vec<Member>,
}

impl MotionGroup {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Result of one sampling pre-pass.
#[derive(Debug, Default)]
pub struct MotionPass {
    pub cache: MotionCache,
    pub errors: Vec<MotionSampleError>,
    /// Distinct sub-frame offsets visited, in visit order.
    pub offsets: Vec<f32>,
    /// Sampled entities found static by the actual-motion check.
    pub static_entities: usize,
}

pub struct MotionSampler<'a> {
    settings: &'a MotionSettings,
    registry: &'a TranslatorRegistry,
}

impl<'a> MotionSampler<'a> {
    pub fn new(settings: &'a MotionSettings, registry: &'a TranslatorRegistry) -> Self {
        Self { settings, registry }
    }

    fn segments_for(&self, host: &dyn HostScene, entity: &Entity) -> u32 {
        let own = host.object(entity.id).and_then(|o| o.motion_segments);
        let owner = entity
            .emitter
            .and_then(|id| host.object(id))
            .and_then(|o| o.motion_segments);
        own.or(owner).unwrap_or(self.settings.segments)
    }

    /// Groups moving entities by sample count. Deformation of a shared
    /// prototype is claimed by its first moving entity.
    pub fn group(&self, host: &dyn HostScene, entities: &[Entity]) -> BTreeMap<u32, MotionGroup> {
        let mut groups: BTreeMap<u32, MotionGroup> = BTreeMap::new();
        let mut claimed: HashSet<&PrototypeKey> = HashSet::new();
        for (index, entity) in entities.iter().enumerate() {
            let translator = self.registry.get(entity.kind);
            if !translator.has_motion(host, entity) {
                continue;
            }
            let segments = self.segments_for(host, entity);
            if segments < 2 {
                trace!("{}: {segments} motion segments, not sampled", entity.instance);
                continue;
            }
            let deform = self.settings.deformation
                && translator.deforms(host, entity)
                && claimed.insert(&entity.prototype);
            groups
                .entry(segments)
                .or_insert_with(|| MotionGroup {
                    segments,
                    offsets: subframe_offsets(
                        self.settings.shutter_timing,
                        self.settings.shutter_angle,
                        segments,
                    ),
                    members: Vec::new(),
                })
                .members
                .push(Member {
                    entity: index,
                    transform: true,
                    deform,
                });
        }
        groups
    }

    /// Samples every moving entity and restores the host to `frame`.
    pub fn sample(&self, host: &mut dyn HostScene, entities: &[Entity], frame: f64) -> MotionPass {
        let groups = self.group(host, entities);
        let mut pass = MotionPass::default();
        if groups.is_empty() {
            return pass;
        }

        let mut distinct: Vec<f32> = groups
            .values()
            .flat_map(|group| group.offsets.iter().copied())
            .collect();
        distinct.sort_by(f32::total_cmp);
        distinct.dedup_by(|b, a| (*b - *a).abs() < MOTION_OFFSET_EPSILON);

        let mut transforms: BTreeMap<usize, TransformMotion> = BTreeMap::new();
        let mut deforms: BTreeMap<usize, DeformMotion> = BTreeMap::new();
        let mut failed: HashSet<usize> = HashSet::new();

        for offset in &distinct {
            host.set_frame(frame + f64::from(*offset));
            pass.offsets.push(*offset);
            for group in groups.values() {
                for (segment, group_offset) in group.offsets.iter().enumerate() {
                    if (group_offset - offset).abs() >= MOTION_OFFSET_EPSILON {
                        continue;
                    }
                    for member in &group.members {
                        if failed.contains(&member.entity) {
                            continue;
                        }
                        let result = self.sample_member(
                            &*host,
                            &entities[member.entity],
                            *member,
                            segment,
                            *group_offset,
                            &mut transforms,
                            &mut deforms,
                        );
                        if let Err(reason) = result {
                            let entity = &entities[member.entity];
                            let error = MotionSampleError {
                                entity: entity.instance.to_string(),
                                segment,
                                offset: *group_offset,
                                reason,
                            };
                            warn!("{error}");
                            pass.errors.push(error);
                            failed.insert(member.entity);
                            transforms.remove(&member.entity);
                            deforms.remove(&member.entity);
                        }
                    }
                }
            }
        }
        if host.frame() != frame {
            host.set_frame(frame);
        }

        for group in groups.values() {
            let expected = group.offsets.len();
            for member in &group.members {
                let entity = &entities[member.entity];
                if let Some(motion) = transforms.remove(&member.entity) {
                    if motion.len() == expected && motion.is_moving() {
                        pass.cache.transforms.insert(entity.instance.clone(), motion);
                    } else {
                        trace!("{}: animated but static over the shutter", entity.instance);
                        pass.static_entities += 1;
                    }
                }
                if let Some(motion) = deforms.remove(&member.entity) {
                    if motion.len() == expected && motion.is_moving() {
                        pass.cache.deforms.insert(entity.prototype.clone(), motion);
                    }
                }
            }
        }
        pass
    }

    #[allow(clippy::too_many_arguments)]
    fn sample_member(
        &self,
        host: &dyn HostScene,
        entity: &Entity,
        member: Member,
        segment: usize,
        offset: f32,
        transforms: &mut BTreeMap<usize, TransformMotion>,
        deforms: &mut BTreeMap<usize, DeformMotion>,
    ) -> Result<(), String> {
        let translator = self.registry.get(entity.kind);
        if member.transform {
            let world = entity.world_transform(host).map_err(|e| e.to_string())?;
            translator.update_transform_sample(
                transforms.entry(member.entity).or_default(),
                segment,
                offset,
                world,
            );
        }
        if member.deform {
            let points = translator
                .sample_deformation(host, entity)
                .map_err(|e| e.to_string())?;
            deforms
                .entry(member.entity)
                .or_default()
                .record(segment, offset, points);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        host::{HostObject, ObjectKind, SceneArena, TransformTrack},
        identity::IdentityResolver,
        translate::EntityKind,
        utils::allocator::ObjectId,
    };
    use approx::assert_relative_eq;

    #[test]
    fn offsets_follow_shutter_timing() {
        assert_eq!(subframe_offsets(ShutterTiming::Center, 180.0, 2), vec![-0.25, 0.25]);
        assert_eq!(subframe_offsets(ShutterTiming::Pre, 180.0, 2), vec![-0.5, 0.0]);
        assert_eq!(subframe_offsets(ShutterTiming::Post, 180.0, 2), vec![0.0, 0.5]);

        let five = subframe_offsets(ShutterTiming::Center, 360.0, 5);
        assert_eq!(five.len(), 5);
        assert_relative_eq!(five[1], -0.25);
        assert_relative_eq!(five[4], 0.5);
    }

    #[test]
    fn degenerate_segment_counts() {
        assert!(subframe_offsets(ShutterTiming::Center, 180.0, 0).is_empty());
        assert_eq!(subframe_offsets(ShutterTiming::Center, 180.0, 1), vec![-0.25]);
    }

    fn entity(scene: &SceneArena, id: ObjectId) -> Entity {
        let resolver = IdentityResolver::default();
        Entity {
            id,
            kind: EntityKind::Empty,
            prototype: resolver.resolve_prototype_key(scene, id).unwrap(),
            instance: resolver
                .resolve_instance_key(scene, id, None, None, None)
                .unwrap(),
            emitter: None,
            particle: None,
        }
    }

    fn moving(scene: &mut SceneArena, name: &str) -> ObjectId {
        let id = scene.add_object(HostObject::new(name, ObjectKind::Empty));
        scene.animate_transform(
            id,
            TransformTrack::new()
                .key(0.0, Mat4::IDENTITY)
                .key(2.0, Mat4::from_translation(Vec3::X * 2.0)),
        );
        id
    }

    #[test]
    fn one_time_change_per_distinct_offset() {
        let mut scene = SceneArena::new();
        let a = moving(&mut scene, "A");
        let b = moving(&mut scene, "B");
        scene.object_mut(b).unwrap().motion_segments = Some(3);
        let entities = vec![entity(&scene, a), entity(&scene, b)];

        let settings = MotionSettings::default().enabled();
        let registry = TranslatorRegistry::new();
        scene.set_frame(1.0);
        scene.clear_frame_history();
        let pass = MotionSampler::new(&settings, &registry).sample(&mut scene, &entities, 1.0);

        // 2 segments: [-0.25, 0.25]; 3 segments: [-0.25, 0.0, 0.25].
        assert_eq!(pass.offsets, vec![-0.25, 0.0, 0.25]);
        assert_eq!(scene.frame_history(), &[0.75, 1.0, 1.25, 1.0]);
        assert_eq!(scene.frame(), 1.0);
        assert_eq!(pass.cache.transforms[&entities[0].instance].len(), 2);
        assert_eq!(pass.cache.transforms[&entities[1].instance].len(), 3);
    }

    #[test]
    fn static_animation_is_dropped() {
        let mut scene = SceneArena::new();
        let id = scene.add_object(HostObject::new("Held", ObjectKind::Empty));
        scene.animate_transform(id, TransformTrack::new().key(0.0, Mat4::IDENTITY));
        let entities = vec![entity(&scene, id)];

        let settings = MotionSettings::default().enabled();
        let registry = TranslatorRegistry::new();
        let pass = MotionSampler::new(&settings, &registry).sample(&mut scene, &entities, 1.0);
        assert!(pass.cache.is_empty());
        assert_eq!(pass.static_entities, 1);
    }

    #[test]
    fn failures_clear_only_the_failing_entity() {
        let mut scene = SceneArena::new();
        let a = moving(&mut scene, "A");
        let b = moving(&mut scene, "B");
        scene.fail_evaluation(a, true);
        let entities = vec![entity(&scene, a), entity(&scene, b)];

        let settings = MotionSettings::default().enabled();
        let registry = TranslatorRegistry::new();
        let pass = MotionSampler::new(&settings, &registry).sample(&mut scene, &entities, 1.0);
        assert_eq!(pass.errors.len(), 1);
        assert_eq!(pass.errors[0].entity, "A");
        assert!(pass.cache.transform(&entities[0].instance).is_none());
        assert!(pass.cache.transform(&entities[1].instance).is_some());
    }

    #[test]
    fn single_segment_entities_are_not_sampled() {
        let mut scene = SceneArena::new();
        let a = moving(&mut scene, "A");
        scene.object_mut(a).unwrap().motion_segments = Some(1);
        let entities = vec![entity(&scene, a)];

        let settings = MotionSettings::default().enabled();
        let registry = TranslatorRegistry::new();
        scene.clear_frame_history();
        let pass = MotionSampler::new(&settings, &registry).sample(&mut scene, &entities, 1.0);
        assert!(pass.offsets.is_empty());
        assert!(scene.frame_history().is_empty());
    }
}
