use std::{collections::HashMap, sync::Arc};

use bevy::prelude::*;

use crate::{
    provider::{write_colors_to_mesh, MeshHandle, MeshVertexData, PaintableMeshes},
    queue::{PaintTaskQueue, TaskCategory, TaskId},
    registry::{MaterialId, PhysicsSurfaceRegistry},
    task::TaskResult,
};


/// Opts a `Mesh3d` entity into vertex painting. `lods` lists the lower-detail meshes,
/// highest detail first; the entity's own mesh is LOD0.
#[derive(Component, Clone, Debug, Default, Reflect)]
pub struct TrackVertexPaint {
    pub material: Option<MaterialId>,
    pub lods: Vec<Handle<Mesh>>,
}


/// Added once the entity's vertex data lives in [`PaintableMeshes`].
#[derive(Component, Clone, Copy, Debug, PartialEq, Eq, Reflect)]
pub struct PaintableMesh {
    pub handle: MeshHandle,
}


#[derive(Resource, Debug, Default)]
pub struct TrackedMeshes {
    by_entity: HashMap<Entity, MeshHandle>,
}

impl TrackedMeshes {
    pub fn get(&self, entity: Entity) -> Option<MeshHandle> {
        self.by_entity.get(&entity).copied()
    }

    pub fn entity(&self, handle: MeshHandle) -> Option<Entity> {
        self.by_entity
            .iter()
            .find_map(|(entity, tracked)| (*tracked == handle).then_some(*entity))
    }
}


#[derive(Event, Clone, Debug)]
pub struct PaintTaskCompleted {
    pub task_id: TaskId,
    pub mesh: MeshHandle,
    pub success: bool,
    pub result: Arc<TaskResult>,
}


fn vertex_data(
    meshes: &Assets<Mesh>,
    mesh: &Mesh3d,
    track: &TrackVertexPaint,
) -> Option<Result<MeshVertexData, crate::error::MeshDataError>> {
    let mut lods = vec![meshes.get(&mesh.0)?];
    for lod in track.lods.iter() {
        lods.push(meshes.get(lod)?);
    }
    Some(MeshVertexData::from_meshes(&lods, track.material))
}


pub fn track_new_paintable_meshes(
    mut commands: Commands,
    assets: Option<Res<Assets<Mesh>>>,
    mut paintable: ResMut<PaintableMeshes>,
    mut tracked: ResMut<TrackedMeshes>,
    pending: Query<(Entity, &TrackVertexPaint, &Mesh3d), Without<PaintableMesh>>,
) {
    let Some(assets) = assets else {
        return;
    };

    for (entity, track, mesh) in pending.iter() {
        // assets still loading are retried next frame
        let Some(data) = vertex_data(&assets, mesh, track) else {
            continue;
        };

        match data {
            Ok(data) => {
                let handle = paintable.insert(data);
                tracked.by_entity.insert(entity, handle);
                commands.entity(entity).insert(PaintableMesh { handle });
                debug!("tracking vertex colors of {:?} as {:?}", entity, handle);
            }
            Err(err) => {
                warn!("{:?} cannot be painted: {}", entity, err);
                commands.entity(entity).remove::<TrackVertexPaint>();
            }
        }
    }
}


pub fn untrack_removed_meshes(
    mut removed: RemovedComponents<TrackVertexPaint>,
    mut paintable: ResMut<PaintableMeshes>,
    mut tracked: ResMut<TrackedMeshes>,
    mut queue: ResMut<PaintTaskQueue>,
) {
    for entity in removed.read() {
        let Some(handle) = tracked.by_entity.remove(&entity) else {
            continue;
        };

        let cancelled = queue.cancel_mesh(handle);
        paintable.remove(handle);
        debug!("stopped tracking {:?}, {} tasks cancelled", entity, cancelled);
    }
}


/// Swapping an entity's mesh invalidates tasks still working on the old geometry.
pub fn invalidate_changed_geometry(
    assets: Option<Res<Assets<Mesh>>>,
    mut paintable: ResMut<PaintableMeshes>,
    changed: Query<(Entity, &PaintableMesh, &TrackVertexPaint, Ref<Mesh3d>)>,
) {
    let Some(assets) = assets else {
        return;
    };

    for (entity, painted, track, mesh) in changed.iter() {
        if !mesh.is_changed() || mesh.is_added() {
            continue;
        }

        match vertex_data(&assets, &mesh, track) {
            Some(Ok(data)) => {
                if paintable.replace_geometry(painted.handle, data) {
                    debug!("geometry of {:?} changed, in-flight tasks invalidated", entity);
                }
            }
            Some(Err(err)) => warn!("new geometry of {:?} cannot be painted: {}", entity, err),
            None => {}
        }
    }
}


pub fn sync_surface_registry(
    registry: Res<PhysicsSurfaceRegistry>,
    mut queue: ResMut<PaintTaskQueue>,
) {
    if registry.is_changed() {
        queue.set_surface_registry(Arc::new(registry.clone()));
    }
}


pub fn poll_paint_tasks(
    mut queue: ResMut<PaintTaskQueue>,
    mut paintable: ResMut<PaintableMeshes>,
    mut completed: EventWriter<PaintTaskCompleted>,
) {
    for result in queue.poll(&mut paintable) {
        completed.write(PaintTaskCompleted {
            task_id: result.task_id,
            mesh: result.mesh,
            success: result.success,
            result: Arc::new(result),
        });
    }
}


/// Mirrors committed LOD0 colors into the entity's render mesh.
pub fn apply_painted_colors(
    mut completed: EventReader<PaintTaskCompleted>,
    assets: Option<ResMut<Assets<Mesh>>>,
    paintable: Res<PaintableMeshes>,
    tracked: Res<TrackedMeshes>,
    meshes: Query<&Mesh3d>,
) {
    let Some(mut assets) = assets else {
        completed.clear();
        return;
    };

    for event in completed.read() {
        let result = event.result.as_ref();
        if !result.success || result.category != TaskCategory::Paint || !result.colors_changed {
            continue;
        }

        let Some(colors) = paintable
            .get(event.mesh)
            .and_then(|data| data.lod(0))
            .map(|lod| lod.colors.as_slice())
        else {
            continue;
        };
        let Some(mesh) = tracked
            .entity(event.mesh)
            .and_then(|entity| meshes.get(entity).ok())
            .and_then(|mesh| assets.get_mut(&mesh.0))
        else {
            continue;
        };

        write_colors_to_mesh(mesh, colors);
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use bevy::{
        asset::RenderAssetUsages,
        render::{mesh::VertexAttributeValues, render_resource::PrimitiveTopology},
        MinimalPlugins,
    };
    use crate::{
        config::VertexPaintConfig,
        queue::PaintTaskRequest,
        settings::{ChannelPaint, ColorApplication, OperationDescriptor},
        VertexPaintPlugin,
    };

    #[derive(Resource, Default)]
    struct Completed(Vec<Arc<TaskResult>>);

    fn collect_completed(
        mut events: EventReader<PaintTaskCompleted>,
        mut completed: ResMut<Completed>,
    ) {
        completed.0.extend(events.read().map(|event| Arc::clone(&event.result)));
    }

    fn quad_mesh() -> Mesh {
        let mut mesh = Mesh::new(
            PrimitiveTopology::TriangleList,
            RenderAssetUsages::default(),
        );
        mesh.insert_attribute(
            Mesh::ATTRIBUTE_POSITION,
            vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [1.0, 1.0, 0.0]],
        );
        mesh.insert_attribute(Mesh::ATTRIBUTE_NORMAL, vec![[0.0, 0.0, 1.0]; 4]);
        mesh
    }

    fn app() -> App {
        let mut app = App::new();
        app.add_plugins(MinimalPlugins);
        app.insert_resource(Assets::<Mesh>::default());
        app.insert_resource(VertexPaintConfig {
            synchronous: true,
            ..Default::default()
        });
        app.add_plugins(VertexPaintPlugin);
        app.init_resource::<Completed>();
        app.add_systems(Update, collect_completed.after(crate::VertexPaintSystems));
        app
    }

    fn spawn_quad(app: &mut App) -> (Entity, Handle<Mesh>) {
        let mesh = app
            .world_mut()
            .resource_mut::<Assets<Mesh>>()
            .add(quad_mesh());
        let entity = app
            .world_mut()
            .spawn((Mesh3d(mesh.clone()), TrackVertexPaint::default()))
            .id();
        (entity, mesh)
    }

    fn submit(app: &mut App, handle: MeshHandle, descriptor: OperationDescriptor) {
        app.world_mut()
            .resource_scope(|world, mut queue: Mut<PaintTaskQueue>| {
                let meshes = world.resource::<PaintableMeshes>();
                queue.submit(meshes, PaintTaskRequest::new(handle, descriptor));
            });
    }

    #[test]
    fn painted_colors_reach_the_render_mesh() {
        let mut app = app();
        let (entity, mesh) = spawn_quad(&mut app);
        app.update();

        let handle = app.world().entity(entity).get::<PaintableMesh>().unwrap().handle;
        assert_eq!(app.world().resource::<TrackedMeshes>().get(entity), Some(handle));

        let descriptor = OperationDescriptor::paint_entire_mesh()
            .with_colors(ColorApplication::red(ChannelPaint::add(1.0)));
        submit(&mut app, handle, descriptor);
        app.update();

        let completed = &app.world().resource::<Completed>().0;
        assert_eq!(completed.len(), 1);
        assert!(completed[0].success);

        let meshes = app.world().resource::<Assets<Mesh>>();
        let colors = meshes.get(&mesh).unwrap().attribute(Mesh::ATTRIBUTE_COLOR);
        match colors {
            Some(VertexAttributeValues::Float32x4(colors)) => {
                assert_eq!(colors, &vec![[1.0, 0.0, 0.0, 0.0]; 4]);
            }
            other => panic!("unexpected colors {other:?}"),
        }
    }

    #[test]
    fn despawned_meshes_are_untracked() {
        let mut app = app();
        let (entity, _) = spawn_quad(&mut app);
        app.update();

        let handle = app.world().entity(entity).get::<PaintableMesh>().unwrap().handle;
        submit(&mut app, handle, OperationDescriptor::get_all());
        submit(&mut app, handle, OperationDescriptor::get_all());
        app.world_mut().despawn(entity);
        app.update();

        assert!(!app.world().resource::<PaintableMeshes>().contains(handle));
        app.update();

        let completed = &app.world().resource::<Completed>().0;
        assert_eq!(completed.len(), 2);
        assert!(completed.iter().all(|result| !result.success));
    }

    #[test]
    fn swapped_geometry_is_reimported() {
        let mut app = app();
        let (entity, _) = spawn_quad(&mut app);
        app.update();

        let handle = app.world().entity(entity).get::<PaintableMesh>().unwrap().handle;
        let mut triangle = quad_mesh();
        triangle.insert_attribute(
            Mesh::ATTRIBUTE_POSITION,
            vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
        );
        triangle.insert_attribute(Mesh::ATTRIBUTE_NORMAL, vec![[0.0, 0.0, 1.0]; 3]);
        let triangle = app.world_mut().resource_mut::<Assets<Mesh>>().add(triangle);
        app.world_mut().entity_mut(entity).insert(Mesh3d(triangle));
        app.update();

        let meshes = app.world().resource::<PaintableMeshes>();
        assert_eq!(meshes.lod0_vertex_count(handle), Some(3));
    }
}
