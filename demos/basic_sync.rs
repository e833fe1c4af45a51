use scene_graph_sync::host::TransformTrack;
use scene_graph_sync::*;

fn main() {
    env_logger::init();

    let mut host = SceneArena::new();
    host.add_mesh(HostMesh::grid("Floor", 4, 4).with_materials(["Concrete"]));
    host.add_mesh(HostMesh::grid("Crate", 1, 1));
    host.add_object(HostObject::mesh("Floor", "Floor"));
    for i in 0..3 {
        host.add_object(
            HostObject::mesh(format!("Crate{i}"), "Crate")
                .with_transform(Mat4::from_translation(Vec3::new(i as f32 * 2.0, 0.0, 1.0))),
        );
    }
    let thrown = host.add_object(HostObject::mesh("Thrown", "Crate"));
    host.animate_transform(
        thrown,
        TransformTrack::new()
            .key(1.0, Mat4::IDENTITY)
            .key(24.0, Mat4::from_translation(Vec3::new(0.0, 8.0, 3.0))),
    );
    host.add_object(HostObject::new(
        "Barn",
        ObjectKind::LightFilter(LightFilterData::new("PxrBarnLightFilter", Some(CombineMode::Mult))),
    ));
    host.add_object(HostObject::new(
        "Key",
        ObjectKind::Light(LightData::new("PxrRectLight").with_filters(["Barn"])),
    ));

    let settings = SyncSettings {
        motion: MotionSettings::default().enabled(),
        ..SyncSettings::default()
    };
    let engine = SyncEngine::new(host, RecordingScene::new(), settings);

    for frame in [1.0, 2.0, 2.0] {
        match engine.sync_frame(frame) {
            Ok(report) => println!(
                "frame {frame}: {} created, {} updated, {} transforms, idle: {}",
                report.created.len(),
                report.updated.len(),
                report.transforms_updated.len(),
                report.is_empty()
            ),
            Err(err) => eprintln!("frame {frame}: {err}"),
        }
    }

    engine.with_context_ref(|context| {
        for (key, entry) in context.cache().iter() {
            println!("{key}: {} instance(s)", entry.instance_count());
        }
    });
    engine.with_scene(|scene| println!("{} retained nodes", scene.node_count()));
}
