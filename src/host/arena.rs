use std::collections::{HashMap, HashSet};

use glam::{Mat4, Vec3};

use super::{HostMesh, HostObject, HostScene, Modifier, ModifierKind, ObjectKind};
use crate::{
    error::HostError,
    utils::allocator::{Arena, ObjectId},
};

/// Keyframed local transform, interpolated linearly in scale/rotation/translation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransformTrack {
    keys: Vec<(f64, Mat4)>,
}

impl TransformTrack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(mut self, frame: f64, transform: Mat4) -> Self {
        self.keys.push((frame, transform));
        self.keys.sort_by(|a, b| a.0.total_cmp(&b.0));
        self
    }

    pub fn sample(&self, frame: f64) -> Option<Mat4> {
        let (lo, hi, t) = bracket(&self.keys, frame)?;
        if t == 0.0 {
            return Some(lo.1);
        }
        let (s0, r0, p0) = lo.1.to_scale_rotation_translation();
        let (s1, r1, p1) = hi.1.to_scale_rotation_translation();
        let t = t as f32;
        Some(Mat4::from_scale_rotation_translation(
            s0.lerp(s1, t),
            r0.slerp(r1, t),
            p0.lerp(p1, t),
        ))
    }
}

/// Keyframed point positions for a deforming mesh.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeformTrack {
    keys: Vec<(f64, Vec<Vec3>)>,
}

impl DeformTrack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(mut self, frame: f64, positions: Vec<Vec3>) -> Self {
        self.keys.push((frame, positions));
        self.keys.sort_by(|a, b| a.0.total_cmp(&b.0));
        self
    }

    pub fn sample(&self, frame: f64) -> Option<Vec<Vec3>> {
        let (lo, hi, t) = bracket(&self.keys, frame)?;
        if t == 0.0 || lo.1.len() != hi.1.len() {
            return Some(lo.1.clone());
        }
        let t = t as f32;
        Some(
            lo.1.iter()
                .zip(&hi.1)
                .map(|(a, b)| a.lerp(*b, t))
                .collect(),
        )
    }
}

fn bracket<T>(keys: &[(f64, T)], frame: f64) -> Option<(&(f64, T), &(f64, T), f64)> {
    let first = keys.first()?;
    let last = keys.last()?;
    if frame <= first.0 {
        return Some((first, first, 0.0));
    }
    if frame >= last.0 {
        return Some((last, last, 0.0));
    }
    let upper = keys.iter().position(|(f, _)| *f > frame)?;
    let lo = &keys[upper - 1];
    let hi = &keys[upper];
    Some((lo, hi, (frame - lo.0) / (hi.0 - lo.0)))
}

/// In-memory host scene: an arena of objects plus named mesh data blocks.
#[derive(Debug, Default)]
pub struct SceneArena {
    objects: Arena<HostObject, ObjectId>,
    meshes: HashMap<String, HostMesh>,
    transform_tracks: HashMap<ObjectId, TransformTrack>,
    deform_tracks: HashMap<ObjectId, DeformTrack>,
    failing: HashSet<ObjectId>,
    frame: f64,
    frame_history: Vec<f64>,
}

impl SceneArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_object(&mut self, object: HostObject) -> ObjectId {
        self.objects.insert(object)
    }

    pub fn remove_object(&mut self, id: ObjectId) -> Option<HostObject> {
        self.transform_tracks.remove(&id);
        self.deform_tracks.remove(&id);
        self.failing.remove(&id);
        self.objects.remove(id)
    }

    /// Mutable access that marks the object's render data as changed.
    pub fn object_mut(&mut self, id: ObjectId) -> Option<&mut HostObject> {
        let object = self.objects.get_mut(id)?;
        object.revision += 1;
        Some(object)
    }

    /// Moves `id` without touching its data revision.
    pub fn set_transform(&mut self, id: ObjectId, transform: Mat4) {
        if let Some(object) = self.objects.get_mut(id) {
            object.transform = transform;
        }
    }

    pub fn add_mesh(&mut self, mesh: HostMesh) {
        self.meshes.insert(mesh.name.clone(), mesh);
    }

    /// Mutable access that marks the data block as changed.
    pub fn mesh_mut(&mut self, name: &str) -> Option<&mut HostMesh> {
        let mesh = self.meshes.get_mut(name)?;
        mesh.revision += 1;
        Some(mesh)
    }

    pub fn animate_transform(&mut self, id: ObjectId, track: TransformTrack) {
        if let Some(object) = self.objects.get_mut(id) {
            object.animated = true;
            self.transform_tracks.insert(id, track);
        }
    }

    /// Attaches a deformation track, adding a deform modifier if the object has none.
    pub fn animate_deformation(&mut self, id: ObjectId, track: DeformTrack) {
        if let Some(object) = self.object_mut(id) {
            if !object.has_deforming_modifier() {
                object
                    .modifiers
                    .push(Modifier::new("Deform", ModifierKind::Deform));
            }
            self.deform_tracks.insert(id, track);
        }
    }

    /// Makes every evaluation of `id` fail until switched off again.
    pub fn fail_evaluation(&mut self, id: ObjectId, failing: bool) {
        if failing {
            self.failing.insert(id);
        } else {
            self.failing.remove(&id);
        }
    }

    /// Every frame passed to `set_frame`, in call order.
    pub fn frame_history(&self) -> &[f64] {
        &self.frame_history
    }

    pub fn clear_frame_history(&mut self) {
        self.frame_history.clear();
    }

    fn check_failing(&self, id: ObjectId, object: &HostObject) -> Result<(), HostError> {
        if self.failing.contains(&id) {
            return Err(HostError::Evaluation {
                name: object.name.clone(),
                reason: format!("scripted failure at frame {}", self.frame),
            });
        }
        Ok(())
    }
}

impl HostScene for SceneArena {
    fn object_ids(&self) -> Vec<ObjectId> {
        self.objects.ids().collect()
    }

    fn object(&self, id: ObjectId) -> Option<&HostObject> {
        self.objects.get(id)
    }

    fn find_object(&self, name: &str) -> Option<ObjectId> {
        self.objects
            .iter()
            .find(|(_, object)| object.name == name)
            .map(|(id, _)| id)
    }

    fn frame(&self) -> f64 {
        self.frame
    }

    fn set_frame(&mut self, frame: f64) {
        self.frame = frame;
        self.frame_history.push(frame);
    }

    fn evaluate_local_transform(&self, id: ObjectId) -> Result<Mat4, HostError> {
        let object = self.objects.get(id).ok_or(HostError::MissingObject(id))?;
        self.check_failing(id, object)?;
        Ok(self
            .transform_tracks
            .get(&id)
            .and_then(|track| track.sample(self.frame))
            .unwrap_or(object.transform))
    }

    fn evaluate_mesh(&self, id: ObjectId) -> Result<HostMesh, HostError> {
        let object = self.objects.get(id).ok_or(HostError::MissingObject(id))?;
        self.check_failing(id, object)?;
        let ObjectKind::Mesh { data } = &object.kind else {
            return Err(HostError::NoMeshData(id));
        };
        let mut mesh = self
            .meshes
            .get(data)
            .cloned()
            .ok_or(HostError::NoMeshData(id))?;
        if let Some(positions) = self
            .deform_tracks
            .get(&id)
            .and_then(|track| track.sample(self.frame))
        {
            if positions.len() == mesh.positions.len() {
                mesh.positions = positions;
            }
        }
        Ok(mesh)
    }

    fn data_revision(&self, id: ObjectId) -> Option<u64> {
        let object = self.objects.get(id)?;
        match &object.kind {
            ObjectKind::Mesh { data } => self.meshes.get(data).map(|mesh| mesh.revision),
            _ => Some(object.revision),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn transform_track_interpolates_between_keys() {
        let track = TransformTrack::new()
            .key(1.0, Mat4::IDENTITY)
            .key(3.0, Mat4::from_translation(Vec3::new(4.0, 0.0, 0.0)));
        let mid = track.sample(2.0).unwrap();
        assert_relative_eq!(mid.w_axis.x, 2.0, epsilon = 1e-5);
        assert_eq!(track.sample(0.0), Some(Mat4::IDENTITY));
        assert_relative_eq!(track.sample(9.0).unwrap().w_axis.x, 4.0);
    }

    #[test]
    fn failing_objects_report_evaluation_errors() {
        let mut scene = SceneArena::new();
        scene.add_mesh(HostMesh::grid("Grid", 1, 1));
        let id = scene.add_object(HostObject::mesh("Plane", "Grid"));
        assert!(scene.evaluate_mesh(id).is_ok());
        scene.fail_evaluation(id, true);
        assert!(matches!(
            scene.evaluate_mesh(id),
            Err(HostError::Evaluation { .. })
        ));
    }

    #[test]
    fn only_data_edits_bump_revision() {
        let mut scene = SceneArena::new();
        let id = scene.add_object(HostObject::new("Null", ObjectKind::Empty));
        scene.set_transform(id, Mat4::from_translation(Vec3::Y));
        scene.animate_transform(id, TransformTrack::new().key(0.0, Mat4::IDENTITY));
        assert_eq!(scene.data_revision(id), Some(0));

        scene.object_mut(id).unwrap().hidden = false;
        assert_eq!(scene.data_revision(id), Some(1));
    }
}
