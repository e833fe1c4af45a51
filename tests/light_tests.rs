use glam::{Mat4, Vec3};
use scene_graph_sync::host::{CombineMode, HostObject, LightData, LightFilterData, ObjectKind, SceneArena};
use scene_graph_sync::retained::{ParamValue, RecordingScene};
use scene_graph_sync::translate::LIGHT_FILTERS_PARAM;
use scene_graph_sync::{InstanceKey, ObjectId, PrototypeKey, ShaderSchema, SyncContext};

fn filter(host: &mut SceneArena, name: &str, mode: Option<CombineMode>) -> ObjectId {
    host.add_object(HostObject::new(
        name,
        ObjectKind::LightFilter(LightFilterData::new("PxrRodLightFilter", mode)),
    ))
}

fn light(host: &mut SceneArena, name: &str, filters: &[&str]) -> ObjectId {
    host.add_object(HostObject::new(
        name,
        ObjectKind::Light(LightData::new("PxrRectLight").with_filters(filters.iter().copied())),
    ))
}

fn light_params(context: &SyncContext, scene: &RecordingScene, name: &str) -> Option<ParamValue> {
    let node = context.cache().node(&PrototypeKey::from(name))?;
    scene
        .node(node.id)?
        .params
        .get(LIGHT_FILTERS_PARAM)
        .cloned()
}

fn names(list: &[&str]) -> Option<ParamValue> {
    Some(ParamValue::StringArray(list.iter().map(|s| s.to_string()).collect()))
}

#[test]
fn single_filter_is_linked_directly() {
    let mut host = SceneArena::new();
    filter(&mut host, "Rod", Some(CombineMode::Mult));
    light(&mut host, "Key", &["Rod"]);
    let mut scene = RecordingScene::new();
    let mut context = SyncContext::default();
    let report = context.sync_frame(&mut host, &mut scene, 1.0).unwrap();

    assert_eq!(report.links_updated, vec![InstanceKey::from("Key")]);
    assert_eq!(light_params(&context, &scene, "Key"), names(&["Rod"]));
    assert!(scene.find("Key_combiner").is_none());
    // Held by the filter's own instance and by the link.
    assert_eq!(context.cache().instance_count(&PrototypeKey::from("Rod")), 2);
    assert!(context.validate().is_ok());
}

#[test]
fn several_filters_get_a_combiner_appended() {
    let mut host = SceneArena::new();
    filter(&mut host, "Blocker", Some(CombineMode::Mult));
    filter(&mut host, "Barn", Some(CombineMode::Screen));
    filter(&mut host, "Gobo", Some(CombineMode::Mult));
    light(&mut host, "Key", &["Blocker", "Barn", "Gobo"]);
    let mut scene = RecordingScene::new();
    let mut context = SyncContext::default();
    context.sync_frame(&mut host, &mut scene, 1.0).unwrap();

    assert_eq!(
        light_params(&context, &scene, "Key"),
        names(&["Blocker", "Barn", "Gobo", "Key_combiner"])
    );
    let (_, combiner) = scene.find("Key_combiner").unwrap();
    assert_eq!(combiner.params.get("mult").cloned(), names(&["Blocker", "Gobo"]));
    assert_eq!(combiner.params.get("screen").cloned(), names(&["Barn"]));
    assert_eq!(
        combiner.params.get("shader"),
        Some(&ParamValue::String("PxrCombinerLightFilter".into()))
    );
}

#[test]
fn deleted_filters_are_skipped_without_error() {
    let mut host = SceneArena::new();
    let a = filter(&mut host, "A", Some(CombineMode::Max));
    filter(&mut host, "B", Some(CombineMode::Max));
    light(&mut host, "Key", &["A", "B"]);
    let mut scene = RecordingScene::new();
    let mut context = SyncContext::default();
    context.sync_frame(&mut host, &mut scene, 1.0).unwrap();
    assert!(scene.find("Key_combiner").is_some());

    host.remove_object(a);
    let report = context.sync_frame(&mut host, &mut scene, 1.0).unwrap();
    assert!(!report.has_errors(), "{report:?}");
    assert_eq!(report.evicted, vec![PrototypeKey::from("A")]);
    assert_eq!(light_params(&context, &scene, "Key"), names(&["B"]));
    assert!(scene.find("Key_combiner").is_none());
    assert!(context.validate().is_ok());
}

#[test]
fn filters_referenced_only_by_a_light_live_with_the_link() {
    let mut host = SceneArena::new();
    let rod = filter(&mut host, "Rod", None);
    host.object_mut(rod).unwrap().hidden = true;
    let key = light(&mut host, "Key", &["Rod"]);
    let mut scene = RecordingScene::new();
    let mut context = SyncContext::default();
    let report = context.sync_frame(&mut host, &mut scene, 1.0).unwrap();
    assert!(report.created.contains(&PrototypeKey::from("Rod")));
    assert_eq!(context.cache().instance_count(&PrototypeKey::from("Rod")), 1);

    host.remove_object(key);
    let report = context.sync_frame(&mut host, &mut scene, 1.0).unwrap();
    assert!(report.evicted.contains(&PrototypeKey::from("Rod")));
    assert!(report.evicted.contains(&PrototypeKey::from("Key")));
    assert!(context.cache().is_empty());
    assert!(context.linker().is_empty());
}

#[test]
fn unchanged_links_are_idle_and_light_edits_keep_them() {
    let mut host = SceneArena::new();
    filter(&mut host, "A", Some(CombineMode::Min));
    filter(&mut host, "B", Some(CombineMode::Min));
    let key = light(&mut host, "Key", &["A", "B"]);
    let mut scene = RecordingScene::new();
    let mut context = SyncContext::default();
    context.sync_frame(&mut host, &mut scene, 1.0).unwrap();

    let before = scene.mutation_count();
    let report = context.sync_frame(&mut host, &mut scene, 1.0).unwrap();
    assert!(report.is_empty(), "{report:?}");
    assert_eq!(scene.mutation_count(), before);

    if let ObjectKind::Light(data) = &mut host.object_mut(key).unwrap().kind {
        data.intensity = 8.0;
    }
    let report = context.sync_frame(&mut host, &mut scene, 1.0).unwrap();
    assert_eq!(report.updated, vec![PrototypeKey::from("Key")]);
    assert!(report.links_updated.is_empty());
    assert_eq!(light_params(&context, &scene, "Key"), names(&["A", "B", "Key_combiner"]));
}

#[test]
fn lights_point_down_renderer_z() {
    let mut host = SceneArena::new();
    let key = light(&mut host, "Key", &[]);
    host.set_transform(key, Mat4::from_translation(Vec3::Y));
    let mut scene = RecordingScene::new();
    let mut context = SyncContext::default();
    context.sync_frame(&mut host, &mut scene, 1.0).unwrap();

    let state = context.instance(&InstanceKey::from("Key")).unwrap();
    let transform = state.transform.unwrap();
    assert_eq!(transform.transform_vector3(Vec3::Z), -Vec3::Z);
    assert_eq!(transform.transform_point3(Vec3::ZERO), Vec3::Y);
    assert!(light_params(&context, &scene, "Key").is_none());
}

#[test]
fn moving_a_light_only_resends_its_transform() {
    let mut host = SceneArena::new();
    filter(&mut host, "Rod", Some(CombineMode::Mult));
    let key = light(&mut host, "Key", &["Rod"]);
    let mut scene = RecordingScene::new();
    let mut context = SyncContext::default();
    context.sync_frame(&mut host, &mut scene, 1.0).unwrap();

    host.set_transform(key, Mat4::from_translation(Vec3::new(0.0, 4.0, 0.0)));
    let report = context.sync_frame(&mut host, &mut scene, 1.0).unwrap();
    assert_eq!(report.transforms_updated, vec![InstanceKey::from("Key")]);
    assert!(report.updated.is_empty(), "{report:?}");
    assert!(report.links_updated.is_empty());
}

struct GoboTextures;

impl ShaderSchema for GoboTextures {
    fn is_texture_param(&self, _shader: &str, param: &str) -> bool {
        param == "map"
    }
}

#[test]
fn texture_params_use_converted_names() {
    let mut host = SceneArena::new();
    let mut data = LightFilterData::new("PxrGoboLightFilter", None);
    data.params.set("map", ParamValue::String("gobo.png".into()));
    host.add_object(HostObject::new("Gobo", ObjectKind::LightFilter(data)));
    let mut scene = RecordingScene::new();
    let mut context = SyncContext::default().with_schema(GoboTextures);
    context.sync_frame(&mut host, &mut scene, 1.0).unwrap();

    let node = context.cache().node(&PrototypeKey::from("Gobo")).unwrap();
    assert_eq!(
        scene.node(node.id).unwrap().params.get("map"),
        Some(&ParamValue::String("gobo.png.tex".into()))
    );
}
