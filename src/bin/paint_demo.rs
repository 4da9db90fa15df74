use bevy::{
    app::AppExit,
    log::LogPlugin,
    prelude::*,
};
use bevy_args::parse_args;

use bevy_vertex_paint::{
    color::Channel,
    config::VertexPaintConfig,
    provider::PaintableMeshes,
    queue::{PaintTaskQueue, PaintTaskRequest},
    registry::{MaterialId, PhysicsSurface, PhysicsSurfaceRegistry},
    settings::{
        ApplyRule, ChannelPaint, ColorApplication, FalloffKind, FalloffSettings,
        OperationDescriptor, PaintArea, PhysicsSurfacePaint, RandomVertices, SurfacePaint,
    },
    snippet::{ColorSnippet, SnippetLibrary},
    systems::{PaintTaskCompleted, PaintableMesh, TrackVertexPaint},
    VertexPaintPlugin,
};


const TERRAIN: MaterialId = MaterialId(1);


#[derive(Component)]
struct DemoSubmitted;


#[derive(Resource, Default)]
struct DemoProgress {
    expected: usize,
    completed: usize,
    failed: usize,
}


fn main() {
    let config = parse_args::<VertexPaintConfig>();

    let mut app = App::new();
    app.add_plugins((MinimalPlugins, LogPlugin::default(), AssetPlugin::default()))
        .init_asset::<Mesh>()
        .insert_resource(config)
        .add_plugins(VertexPaintPlugin)
        .init_resource::<DemoProgress>()
        .add_systems(Startup, (register_surfaces, spawn_meshes))
        .add_systems(Update, (submit_operations, report_results).chain());

    app.run();
}


fn register_surfaces(mut registry: ResMut<PhysicsSurfaceRegistry>) {
    registry.register_channel(TERRAIN, Channel::Red, "mud");
    registry.register_channel(TERRAIN, Channel::Green, "moss");
    registry.register_channel(TERRAIN, Channel::Blue, "puddle");
    registry.register_family("wet_mud", [PhysicsSurface::from("mud")]);
}


fn spawn_meshes(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    config: Res<VertexPaintConfig>,
) {
    for i in 0..config.demo_meshes {
        let radius = 0.5 + i as f32 * 0.1;
        let lod0 = meshes.add(Sphere::new(radius).mesh().uv(32, 18));
        let lod1 = meshes.add(Sphere::new(radius).mesh().uv(12, 8));

        commands.spawn((
            Name::new(format!("paintable_{i}")),
            Mesh3d(lod0),
            Transform::from_xyz(i as f32 * 2.0, 0.0, 0.0),
            TrackVertexPaint {
                material: Some(TERRAIN),
                lods: vec![lod1],
            },
        ));
    }
}


fn demo_operations(transform: Transform) -> Vec<OperationDescriptor> {
    let center = transform.translation;
    let top = center + Vec3::Y * 0.5;

    vec![
        OperationDescriptor::paint_at_location(top, 0.6)
            .with_component_transform(transform)
            .with_colors(ColorApplication::red(ChannelPaint::add(0.8)))
            .with_falloff(FalloffSettings::new(FalloffKind::Spherical, 1.0).with_edge_limit())
            .with_propagation(true),
        OperationDescriptor::paint_within_area(PaintArea::sphere(center, 0.4))
            .with_component_transform(transform)
            .with_colors(ColorApplication::PhysicsSurface(
                PhysicsSurfacePaint::new(vec![SurfacePaint::new("moss", ApplyRule::Add(0.5))])
                    .with_other_channels(ApplyRule::Add(-0.25)),
            ))
            .with_propagation(true),
        OperationDescriptor::paint_random_vertices(RandomVertices::new(0.1).with_seed(7))
            .with_component_transform(transform)
            .with_colors(ColorApplication::blue(ChannelPaint::set(1.0))),
        OperationDescriptor::detect_closest_vertex(top).with_component_transform(transform),
        OperationDescriptor::detect_within_area(PaintArea::sphere(top, 0.5))
            .with_component_transform(transform),
    ]
}


fn submit_operations(
    mut commands: Commands,
    mut queue: ResMut<PaintTaskQueue>,
    meshes: Res<PaintableMeshes>,
    mut progress: ResMut<DemoProgress>,
    ready: Query<(Entity, &PaintableMesh, &Transform), Without<DemoSubmitted>>,
) {
    for (entity, painted, transform) in ready.iter() {
        for operation in demo_operations(*transform) {
            queue.submit(&meshes, PaintTaskRequest::new(painted.handle, operation));
            progress.expected += 1;
        }
        commands.entity(entity).insert(DemoSubmitted);
    }
}


fn report_results(
    mut completed: EventReader<PaintTaskCompleted>,
    mut progress: ResMut<DemoProgress>,
    mut snippets: ResMut<SnippetLibrary>,
    mut queue: ResMut<PaintTaskQueue>,
    meshes: Res<PaintableMeshes>,
    mut exit: EventWriter<AppExit>,
) {
    for event in completed.read() {
        let result = event.result.as_ref();
        progress.completed += 1;
        if !result.success {
            progress.failed += 1;
        }

        let stats = &result.stats;
        info!(
            "task {} {} on {:?}: success {}, red {:.1}%, moss {:.1}%, changed {}",
            result.task_id,
            result.operation,
            result.mesh,
            result.success,
            stats.channel(Channel::Red).percent,
            stats.surface("moss").map_or(0.0, |moss| moss.percent),
            result.colors_changed,
        );
        if let Some(closest) = &result.closest_vertex {
            info!("  closest vertex {} at {:.3}", closest.index, closest.distance);
        }

        #[cfg(feature = "perftest")]
        info!("  took {:?}", result.duration);

        // re-apply the first moss pattern as a snippet once
        if result.operation == "paint_within_area" && snippets.is_empty() {
            if let Some(snippet) = ColorSnippet::capture("first_moss", result) {
                info!("  captured snippet, {} bytes serialized", snippet.serialize().len());
                let operation = OperationDescriptor::paint_color_snippet(snippet.clone())
                    .with_propagation(true);
                snippets.insert(snippet);
                queue.submit(&meshes, PaintTaskRequest::new(event.mesh, operation));
                progress.expected += 1;
            }
        }
    }

    if progress.expected > 0 && progress.completed >= progress.expected {
        info!(
            "demo finished: {} tasks, {} failed",
            progress.completed, progress.failed
        );
        exit.write(AppExit::Success);
    }
}
