use std::sync::Arc;

use bevy::prelude::*;
use bevy_vertex_paint::{
    condition::ConditionContext,
    kernel::{resolve, ChannelPlan},
    lod::LodPropagator,
    provider::{MeshVertexData, PaintableMeshes, VertexDataProvider},
    registry::PhysicsSurfaceRegistry,
    settings::{
        ChannelPaint, ColorApplication, Condition, FalloffKind, FalloffSettings,
        OperationDescriptor, PropagationSettings,
    },
    task::CalculateColorsTask,
    vertex::VertexRecord,
};
use criterion::{criterion_group, criterion_main, BatchSize, Criterion};


fn sphere(sectors: u32, stacks: u32) -> MeshVertexData {
    let mesh = Sphere::new(1.0).mesh().uv(sectors, stacks);
    MeshVertexData::from_meshes(&[&mesh], None).unwrap()
}


fn kernel_benchmark(c: &mut Criterion) {
    let registry = PhysicsSurfaceRegistry::default();
    let ctx = ConditionContext {
        registry: &registry,
        tracer: None,
        bone_names: &[],
    };
    let application = ColorApplication::red(
        ChannelPaint::add(0.25).with_condition(Condition::above(0.0)),
    );
    let plan = ChannelPlan::for_section(&application, None, &registry);
    let falloff = FalloffSettings::new(FalloffKind::Spherical, 1.0).with_edge_limit();

    let records: Vec<VertexRecord> = (0..10_000)
        .map(|i| {
            let t = i as f32 / 10_000.0;
            let position = Vec3::new(t.cos(), t * 2.0 - 1.0, t.sin());
            VertexRecord {
                lod: 0,
                index: i,
                local_position: position,
                position,
                normal: position.normalize(),
                bone: None,
                section: 0,
                material: None,
                color: [(i % 256) as u8, 0, 0, 255],
            }
        })
        .collect();

    let mut group = c.benchmark_group("kernel");
    group.bench_function("resolve_10k", |b| {
        b.iter(|| {
            records
                .iter()
                .map(|record| {
                    let sample = falloff.sample(Vec3::ZERO, record.position, 1.0);
                    resolve(record, &plan, sample, &ctx, None).color[0] as u32
                })
                .sum::<u32>()
        });
    });
    group.finish();
}


fn task_benchmark(c: &mut Criterion) {
    let mut arena = PaintableMeshes::default();
    let handle = arena.insert(sphere(128, 64));
    let mesh = arena.provider(handle).unwrap();
    let registry = Arc::new(PhysicsSurfaceRegistry::default());
    let vertices = mesh.vertex_count(0);

    let mut group = c.benchmark_group("calculate_colors");
    group.sample_size(20);

    let operations = [
        (
            "paint_at_location",
            OperationDescriptor::paint_at_location(Vec3::Y, 0.75)
                .with_colors(ColorApplication::green(ChannelPaint::add(0.5))),
        ),
        ("get_all", OperationDescriptor::get_all()),
    ];
    for (name, descriptor) in operations {
        let descriptor = Arc::new(descriptor);
        group.bench_function(name, |b| {
            b.iter_batched(
                || {
                    CalculateColorsTask::new(
                        1,
                        handle,
                        Arc::clone(&descriptor),
                        Arc::clone(&mesh),
                        registry.clone(),
                        vertices,
                    )
                },
                |mut task| task.run(),
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}


fn propagation_benchmark(c: &mut Criterion) {
    let lod0 = sphere(128, 64);
    let lod1 = sphere(32, 16);
    let settings = PropagationSettings::default();
    let lod0_colors: Vec<[u8; 4]> =
        (0..lod0.vertex_count(0)).map(|i| [(i % 256) as u8; 4]).collect();

    let mut group = c.benchmark_group("lod_propagation");
    group.sample_size(20);
    group.bench_function("map_and_copy", |b| {
        b.iter(|| {
            let propagator =
                LodPropagator::new(lod0.positions(0), lod0.normals(0), &settings).unwrap();
            let mut colors = vec![[0; 4]; lod1.vertex_count(0)];
            propagator.propagate(&lod0_colors, lod1.positions(0), lod1.normals(0), &mut colors)
        });
    });
    group.finish();
}


criterion_group!(
    benches,
    kernel_benchmark,
    task_benchmark,
    propagation_benchmark
);
criterion_main!(benches);
