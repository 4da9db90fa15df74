use std::{
    sync::{mpsc, Arc},
    time::{Duration, Instant},
};

use bevy::prelude::*;
use bevy_vertex_paint::{
    color::Channel,
    provider::{LodBuffers, MeshHandle, MeshKind, MeshVertexData, PaintableMeshes},
    queue::{
        PaintTaskQueue, PaintTaskRequest, PoolSettings, QueueSettings, StartOutcome, TaskCategory,
    },
    settings::{ChannelPaint, ColorApplication, OperationDescriptor, PaintArea},
    task::TaskResult,
};


fn queue(synchronous: bool, cap: usize) -> PaintTaskQueue {
    PaintTaskQueue::new(QueueSettings {
        paint_cap: cap,
        detect_cap: cap,
        pool: PoolSettings {
            worker_threads: 2,
            synchronous,
            ..Default::default()
        },
        ..Default::default()
    })
}

fn square() -> MeshVertexData {
    let positions = vec![
        Vec3::new(0.0, 0.0, 0.0),
        Vec3::new(1.0, 0.0, 0.0),
        Vec3::new(0.0, 1.0, 0.0),
        Vec3::new(1.0, 1.0, 0.0),
    ];
    let lod0 = LodBuffers::new(positions, vec![Vec3::Z; 4]);
    MeshVertexData::new(MeshKind::Static, vec![lod0]).unwrap()
}

fn run_to_completion(queue: &mut PaintTaskQueue, meshes: &mut PaintableMeshes) -> Vec<TaskResult> {
    let deadline = Instant::now() + Duration::from_secs(30);
    let mut results = Vec::new();
    while !queue.is_idle() {
        results.extend(queue.poll(meshes));
        assert!(Instant::now() < deadline, "tasks did not finish");
        std::thread::sleep(Duration::from_millis(1));
    }
    results
}


#[test]
fn adding_full_red_paints_every_vertex() {
    let mut meshes = PaintableMeshes::default();
    let mesh = meshes.insert(square());
    let mut queue = queue(true, 15);

    let descriptor = OperationDescriptor::paint_entire_mesh()
        .with_colors(ColorApplication::red(ChannelPaint::add(1.0)));
    queue.submit(&meshes, PaintTaskRequest::new(mesh, descriptor));
    let results = run_to_completion(&mut queue, &mut meshes);

    let result = &results[0];
    assert!(result.success);
    assert_eq!(result.lod0_colors(), Some(&[[255, 0, 0, 0]; 4][..]));
    assert_eq!(result.stats.channel(Channel::Red).percent, 100.0);
    assert_eq!(result.stats.channel(Channel::Red).average, 1.0);
    assert_eq!(meshes.get(mesh).unwrap().lod(0).unwrap().colors, vec![[255, 0, 0, 0]; 4]);
}


#[test]
fn painting_within_area_touches_only_inside_vertices() {
    let mut meshes = PaintableMeshes::default();
    let mesh = meshes.insert(square());
    let mut queue = queue(true, 15);

    // covers the two vertices on the x axis
    let area = PaintArea::cuboid(Transform::from_xyz(0.5, 0.0, 0.0), Vec3::new(2.0, 0.5, 1.0));
    let descriptor = OperationDescriptor::paint_within_area(area)
        .with_colors(ColorApplication::green(ChannelPaint::set(1.0)));
    queue.submit(&meshes, PaintTaskRequest::new(mesh, descriptor));
    let results = run_to_completion(&mut queue, &mut meshes);

    let result = &results[0];
    assert!(result.success);
    assert_eq!(
        result.lod0_colors().unwrap(),
        &[[0, 255, 0, 0], [0, 255, 0, 0], [0, 0, 0, 0], [0, 0, 0, 0]]
    );
    let within = result.stats.within_area.as_ref().unwrap();
    assert_eq!(within.vertices_within_area, 2);
    assert_eq!(within.channels[Channel::Green].percent, 100.0);
    assert_eq!(result.stats.channel(Channel::Green).percent, 50.0);
}


#[test]
fn propagated_lods_copy_their_nearest_lod0_color() {
    let lod0_positions: Vec<Vec3> = (0..8).map(|i| Vec3::X * i as f32).collect();
    let lod1_positions: Vec<Vec3> = (0..4).map(|i| Vec3::X * (i as f32 * 2.0 + 0.1)).collect();
    let lod0 = LodBuffers::new(lod0_positions.clone(), vec![Vec3::Y; 8]);
    let lod1 = LodBuffers::new(lod1_positions.clone(), vec![Vec3::Y; 4]);

    let mut meshes = PaintableMeshes::default();
    let mesh = meshes.insert(MeshVertexData::new(MeshKind::Static, vec![lod0, lod1]).unwrap());
    let mut queue = queue(false, 15);

    let colors: Vec<[u8; 4]> = (0..8).map(|i| [i as u8 * 10, 0, 0, 255]).collect();
    let descriptor = OperationDescriptor::set_directly(vec![colors.clone()]).with_propagation(true);
    queue.submit(&meshes, PaintTaskRequest::new(mesh, descriptor));
    let results = run_to_completion(&mut queue, &mut meshes);
    assert!(results[0].success);
    assert!(results[0].lod(1).unwrap().propagated);

    let data = meshes.get(mesh).unwrap();
    for (index, position) in lod1_positions.iter().enumerate() {
        let nearest = lod0_positions
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.distance(*position).total_cmp(&b.1.distance(*position)))
            .map(|(nearest, _)| nearest)
            .unwrap();
        assert_eq!(data.lod(1).unwrap().colors[index], colors[nearest]);
    }
}


#[test]
fn cap_holds_for_twenty_meshes() {
    let mut meshes = PaintableMeshes::default();
    let handles: Vec<MeshHandle> = (0..20).map(|_| meshes.insert(square())).collect();
    let mut queue = queue(true, 15);

    let descriptor = OperationDescriptor::paint_entire_mesh()
        .with_colors(ColorApplication::blue(ChannelPaint::add(0.5)));
    let mut ids = Vec::new();
    for mesh in handles {
        let (enqueued, _) = queue.submit(&meshes, PaintTaskRequest::new(mesh, descriptor.clone()));
        ids.push(enqueued.id);
    }
    assert_eq!(queue.running_count(TaskCategory::Paint), 15);
    assert_eq!(queue.parked_count(TaskCategory::Paint), 5);

    let first = queue.poll(&mut meshes);
    assert_eq!(first.len(), 15);
    assert_eq!(queue.running_count(TaskCategory::Paint), 5);

    let second: Vec<u32> = queue.poll(&mut meshes).iter().map(|result| result.task_id).collect();
    assert_eq!(second, ids[15..].to_vec());
}


#[test]
fn threaded_tasks_of_one_mesh_finish_in_order() {
    let mut meshes = PaintableMeshes::default();
    let mesh = meshes.insert(square());
    let other = meshes.insert(square());
    let mut queue = queue(false, 2);
    let (sender, receiver) = mpsc::channel();

    for step in 0..5 {
        for target in [mesh, other] {
            let sender = sender.clone();
            let descriptor = OperationDescriptor::paint_entire_mesh()
                .with_colors(ColorApplication::red(ChannelPaint::add(0.1)));
            let request = PaintTaskRequest::new(target, descriptor).with_callback(move |result| {
                sender.send((result.mesh, step, result.success)).unwrap();
            });
            let (_, outcome) = queue.submit(&meshes, request);
            if step > 0 {
                assert_eq!(outcome, StartOutcome::WaitingForMesh);
            }
        }
    }
    run_to_completion(&mut queue, &mut meshes);

    let finished: Vec<_> = receiver.try_iter().collect();
    assert_eq!(finished.len(), 10);
    for target in [mesh, other] {
        let steps: Vec<_> = finished
            .iter()
            .filter(|(finished_mesh, _, success)| *finished_mesh == target && *success)
            .map(|(_, step, _)| *step)
            .collect();
        assert_eq!(steps, vec![0, 1, 2, 3, 4]);
    }

    let red = meshes.get(mesh).unwrap().lod(0).unwrap().colors[0][0];
    assert_eq!(red, 130);
}


#[test]
fn detect_results_carry_no_commit() {
    let mut meshes = PaintableMeshes::default();
    let mesh = meshes.insert(square());
    let mut queue = queue(true, 15);
    let results = Arc::new(std::sync::Mutex::new(Vec::new()));

    let sink = Arc::clone(&results);
    let detect = OperationDescriptor::detect_closest_vertex(Vec3::new(0.9, 0.9, 0.0));
    let request = PaintTaskRequest::new(mesh, detect)
        .with_callback(move |result| sink.lock().unwrap().push(result.closest_vertex.clone()));
    queue.submit(&meshes, request);
    run_to_completion(&mut queue, &mut meshes);

    let closest = results.lock().unwrap()[0].clone().unwrap();
    assert_eq!(closest.index, 3);
    assert_eq!(meshes.get(mesh).unwrap().lod(0).unwrap().colors, vec![[0; 4]; 4]);
}
