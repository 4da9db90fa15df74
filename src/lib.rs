use bevy::prelude::*;

pub mod color;
pub mod condition;
pub mod config;
pub mod error;
pub mod intent;
pub mod kernel;
pub mod lod;
pub mod provider;
pub mod queue;
pub mod registry;
pub mod settings;
pub mod snippet;
pub mod systems;
pub mod task;
pub mod vertex;


#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexPaintSystems;


pub struct VertexPaintPlugin;

impl Plugin for VertexPaintPlugin {
    fn build(&self, app: &mut App) {
        info!("initializing VertexPaintPlugin...");

        let queue = app
            .world()
            .get_resource::<config::VertexPaintConfig>()
            .map(|config| queue::PaintTaskQueue::new(config.queue_settings()))
            .unwrap_or_default();

        app.insert_resource(queue);
        app.init_resource::<provider::PaintableMeshes>();
        app.init_resource::<registry::PhysicsSurfaceRegistry>();
        app.init_resource::<snippet::SnippetLibrary>();
        app.init_resource::<systems::TrackedMeshes>();

        app.add_event::<systems::PaintTaskCompleted>();

        app.register_type::<config::VertexPaintConfig>();
        app.register_type::<systems::TrackVertexPaint>();
        app.register_type::<systems::PaintableMesh>();

        app.add_systems(
            Update,
            (
                systems::track_new_paintable_meshes,
                systems::untrack_removed_meshes,
                systems::invalidate_changed_geometry,
                systems::sync_surface_registry,
                systems::poll_paint_tasks,
                systems::apply_painted_colors,
            )
                .chain()
                .in_set(VertexPaintSystems),
        );
    }
}
