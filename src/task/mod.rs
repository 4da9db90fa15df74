use std::{
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    time::Instant,
};

use crate::{
    color::VertexColor,
    condition::{ConditionContext, LineOfSightTracer},
    error::PaintTaskError,
    intent::{strategy_for, LodVisit, VertexIntent, VisitStrategy},
    kernel::{resolve, ChannelPlan},
    lod::LodPropagator,
    provider::{MeshHandle, VertexDataProvider},
    queue::{TaskCategory, TaskId},
    registry::{ChannelSurfaces, SurfaceRegistry},
    settings::{ColorApplication, FalloffSample, OperationDescriptor, OperationKind},
    snippet::serialize_lod_colors,
    vertex::VertexRecord,
};

pub mod result;
pub mod stats;

pub use result::{ClosestVertex, LodResult, Severity, TaskLog, TaskMessage, TaskResult};
pub use stats::{BoneColor, ChannelAmount, PaintStats, WithinAreaStats};

use stats::StatsAccumulator;


#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TaskState {
    #[default]
    Created,
    Running { lod: usize },
    Aggregating,
    Finished { success: bool },
}


/// Worker output handed back to the scheduler.
#[derive(Debug)]
pub struct TaskOutput {
    pub result: TaskResult,
    /// New color buffer per LOD; `None` where nothing is to be committed.
    pub final_colors: Vec<Option<Vec<VertexColor>>>,
}


struct LodOutcome {
    lod: usize,
    original: Vec<VertexColor>,
    colors: Vec<VertexColor>,
    visited: Vec<usize>,
    within_area: Vec<bool>,
    changed: usize,
    propagated: bool,
    error: Option<PaintTaskError>,
}

impl LodOutcome {
    fn skipped(lod: usize, error: PaintTaskError) -> Self {
        Self {
            lod,
            original: Vec::new(),
            colors: Vec::new(),
            visited: Vec::new(),
            within_area: Vec::new(),
            changed: 0,
            propagated: false,
            error: Some(error),
        }
    }
}


/// Computes the colors of one mesh for one operation, LOD by LOD, section by section,
/// vertex by vertex. Runs on a worker against an immutable snapshot of the mesh.
pub struct CalculateColorsTask {
    pub id: TaskId,
    pub mesh: MeshHandle,
    pub descriptor: Arc<OperationDescriptor>,
    pub provider: Arc<dyn VertexDataProvider>,
    pub registry: Arc<dyn SurfaceRegistry>,
    pub expected_lod0_vertices: usize,
    state: TaskState,
}

impl CalculateColorsTask {
    pub fn new(
        id: TaskId,
        mesh: MeshHandle,
        descriptor: Arc<OperationDescriptor>,
        provider: Arc<dyn VertexDataProvider>,
        registry: Arc<dyn SurfaceRegistry>,
        expected_lod0_vertices: usize,
    ) -> Self {
        Self {
            id,
            mesh,
            descriptor,
            provider,
            registry,
            expected_lod0_vertices,
            state: TaskState::Created,
        }
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn run(&mut self) -> TaskOutput {
        let started = Instant::now();
        let mut log = TaskLog::default();
        let category = self.descriptor.category();
        let operation = self.descriptor.kind.label();

        let outcome = self.calculate(&mut log);
        let success = outcome.is_ok();
        self.state = TaskState::Finished { success };

        let mut output = match outcome {
            Ok(output) => output,
            Err(error) => TaskOutput {
                result: TaskResult::failed(self.id, self.mesh, category, operation, error),
                final_colors: Vec::new(),
            },
        };

        output.result.duration = started.elapsed();
        if self.descriptor.fundamental.debug.log_summary {
            log.info(format!(
                "finished in {:?}, success: {}, lod0 changed: {}",
                output.result.duration, success, output.result.colors_changed
            ));
        }
        let mut messages = log.into_messages();
        messages.append(&mut output.result.messages);
        output.result.messages = messages;
        output
    }

    /// Runs the task, turning a panic in the task or in a user hook into a failed result.
    pub fn run_contained(&mut self) -> TaskOutput {
        match panic::catch_unwind(AssertUnwindSafe(|| self.run())) {
            Ok(output) => output,
            Err(payload) => {
                self.state = TaskState::Finished { success: false };
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|message| message.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic payload".to_string());
                TaskOutput {
                    result: TaskResult::failed(
                        self.id,
                        self.mesh,
                        self.descriptor.category(),
                        self.descriptor.kind.label(),
                        PaintTaskError::WorkerPanicked(message),
                    ),
                    final_colors: Vec::new(),
                }
            }
        }
    }

    /// Higher LODs take LOD0's colors instead of running the kernel themselves.
    fn propagates(&self) -> bool {
        self.descriptor.category() == TaskCategory::Paint && self.descriptor.propagate_to_lods
    }

    fn calculate(&mut self, log: &mut TaskLog) -> Result<TaskOutput, PaintTaskError> {
        self.ensure_start_valid()?;

        let descriptor = Arc::clone(&self.descriptor);
        let mut strategy = strategy_for(&descriptor)?;

        let lod_count = descriptor
            .lods_to_process
            .map_or(self.provider.lod_count(), |lods| lods.min(self.provider.lod_count()));

        let mut lods = Vec::with_capacity(lod_count);
        let mut closest = None;
        for lod in 0..lod_count {
            self.state = TaskState::Running { lod };
            match self.process_lod(lod, strategy.as_mut(), &mut closest, log) {
                Ok(outcome) => lods.push(outcome),
                Err(error) if lod == 0 || error.is_task_fatal() => return Err(error),
                Err(error) => {
                    log.warn(format!("skipping LOD {lod}: {error}"));
                    lods.push(LodOutcome::skipped(lod, error));
                }
            }
        }

        if self.propagates() && lods.len() > 1 {
            self.propagate(&mut lods, log);
        }

        self.state = TaskState::Aggregating;
        self.ensure_valid(lod_count.saturating_sub(1))?;

        let stats = self.aggregate(&lods);
        Ok(self.finish(lods, stats, closest))
    }

    fn ensure_start_valid(&self) -> Result<(), PaintTaskError> {
        if !self.provider.is_still_valid() {
            return Err(PaintTaskError::InvalidWorldOrMesh);
        }

        let found = self.provider.vertex_count(0);
        if found != self.expected_lod0_vertices {
            return Err(PaintTaskError::VertexCountMismatch {
                lod: 0,
                buffer: "position",
                expected: self.expected_lod0_vertices,
                found,
            });
        }
        Ok(())
    }

    fn ensure_valid(&self, lod: usize) -> Result<(), PaintTaskError> {
        if !self.provider.is_still_valid() {
            return Err(PaintTaskError::InvalidWorldOrMesh);
        }
        if self.provider.vertex_count(0) != self.expected_lod0_vertices {
            return Err(PaintTaskError::TopologyChangedMidTask { lod });
        }
        Ok(())
    }

    fn process_lod(
        &self,
        lod: usize,
        strategy: &mut (dyn VisitStrategy + '_),
        closest: &mut Option<ClosestVertex>,
        log: &mut TaskLog,
    ) -> Result<LodOutcome, PaintTaskError> {
        self.ensure_valid(lod)?;

        let provider = self.provider.as_ref();
        let descriptor = self.descriptor.as_ref();
        let vertex_count = provider.vertex_count(lod);
        if vertex_count == 0 {
            return Err(PaintTaskError::EmptyLod { lod });
        }

        let original = provider.color_buffer(lod);
        let buffers = [
            ("position", provider.positions(lod).len()),
            ("normal", provider.normals(lod).len()),
            ("color", original.len()),
        ];
        for (buffer, found) in buffers {
            if found != vertex_count {
                return Err(PaintTaskError::VertexCountMismatch {
                    lod,
                    buffer,
                    expected: vertex_count,
                    found,
                });
            }
        }

        let sections = provider.sections(lod);
        if let Some(end) = sections
            .iter()
            .map(|section| section.range().end)
            .find(|end| *end > vertex_count)
        {
            return Err(PaintTaskError::VertexCountMismatch {
                lod,
                buffer: "section",
                expected: vertex_count,
                found: end,
            });
        }

        let mut colors = match descriptor.initial_colors.as_ref().and_then(|s| s.lods.get(lod)) {
            Some(initial) if initial.len() == vertex_count => initial.clone(),
            Some(initial) if !initial.is_empty() => {
                log.warn(format!(
                    "LOD {lod} initial colors hold {}, expected {vertex_count}; ignored",
                    initial.len()
                ));
                original.clone()
            }
            _ => original.clone(),
        };

        let mut outcome = LodOutcome {
            lod,
            original: Vec::new(),
            colors: Vec::new(),
            visited: Vec::new(),
            within_area: vec![false; vertex_count],
            changed: 0,
            propagated: false,
            error: None,
        };

        // propagation fills higher LODs from LOD0 once every LOD is processed
        let propagated_later = lod > 0 && self.propagates();
        if propagated_later || strategy.prepare_lod(lod, vertex_count)? == LodVisit::Untouched {
            outcome.changed = count_changed(&original, &colors);
            outcome.original = original;
            outcome.colors = colors;
            return Ok(outcome);
        }

        let outside = match &descriptor.kind {
            OperationKind::PaintWithinArea {
                outside_area: Some(application),
                ..
            } => Some(application),
            _ => None,
        };
        let tracer = descriptor
            .fundamental
            .line_of_sight
            .as_ref()
            .map(|hook| hook.0.as_ref() as &dyn LineOfSightTracer);
        let ctx = ConditionContext {
            registry: self.registry.as_ref(),
            tracer,
            bone_names: provider.bone_names(),
        };
        let closest_query = if lod == 0 { strategy.closest() } else { None };
        let transform = &descriptor.fundamental.component_transform;
        let color_override = descriptor.color_override.as_ref();

        'sections: for (section_index, section) in sections.iter().enumerate() {
            self.ensure_valid(lod)?;
            if !strategy.visits_section(lod, section_index) {
                continue;
            }

            let plan = ChannelPlan::for_section(&descriptor.colors, section.material, ctx.registry);
            let outside_plan = outside.map(|application: &ColorApplication| {
                ChannelPlan::for_section(application, section.material, ctx.registry)
            });
            let contributes =
                plan.contributes() || outside_plan.is_some_and(|plan| plan.contributes());
            if !strategy.requires_full_scan() && !contributes {
                if descriptor.fundamental.debug.log_skipped_sections {
                    log.debug(format!("LOD {lod} section {section_index} skipped"));
                }
                continue;
            }

            for index in section.range() {
                self.ensure_valid(lod)?;

                let record = VertexRecord::read(
                    provider,
                    transform,
                    lod,
                    index,
                    section_index,
                    section.material,
                    colors[index],
                );

                let resolved = match strategy.intent(&record) {
                    VertexIntent::Skip => continue,
                    VertexIntent::Observe { within_area } => {
                        outcome.within_area[index] = within_area;
                        None
                    }
                    VertexIntent::Paint {
                        falloff,
                        within_area,
                    } => {
                        outcome.within_area[index] = within_area;
                        Some(resolve(&record, &plan, falloff, &ctx, color_override).color)
                    }
                    VertexIntent::PaintOutsideArea => outside_plan.as_ref().map(|plan| {
                        resolve(&record, plan, FalloffSample::NONE, &ctx, color_override).color
                    }),
                    VertexIntent::Assign(color) => Some(
                        color_override
                            .and_then(|hook| (hook.0)(&record, color))
                            .unwrap_or(color),
                    ),
                };

                outcome.visited.push(index);
                if let Some(color) = resolved {
                    colors[index] = color;
                }

                if let Some(query) = closest_query {
                    let distance = record.position.distance(query.location);
                    if closest.as_ref().is_none_or(|best| distance < best.distance) {
                        *closest = Some(ClosestVertex {
                            lod,
                            index,
                            distance,
                            position: record.position,
                            normal: record.normal,
                            color: colors[index],
                            section: section_index,
                            material: section.material,
                            bone: record
                                .bone
                                .map(|influence| bone_name(provider.bone_names(), influence.bone)),
                        });
                    }
                    if query.accept_within.is_some_and(|accept| distance <= accept) {
                        log.debug(format!("accepted vertex {index} at distance {distance:.4}"));
                        break 'sections;
                    }
                }
            }
        }

        outcome.changed = count_changed(&original, &colors);
        outcome.original = original;
        outcome.colors = colors;
        Ok(outcome)
    }

    fn propagate(&self, lods: &mut [LodOutcome], log: &mut TaskLog) {
        let Some((lod0, higher)) = lods.split_first_mut() else {
            return;
        };

        let provider = self.provider.as_ref();
        let Some(propagator) = LodPropagator::new(
            provider.positions(0),
            provider.normals(0),
            &self.descriptor.propagation,
        ) else {
            return;
        };

        for outcome in higher.iter_mut().filter(|outcome| outcome.error.is_none()) {
            propagator.propagate(
                &lod0.colors,
                provider.positions(outcome.lod),
                provider.normals(outcome.lod),
                &mut outcome.colors,
            );
            outcome.changed = count_changed(&outcome.original, &outcome.colors);
            outcome.propagated = true;
            log.debug(format!(
                "propagated LOD0 onto LOD {} ({} vertices changed)",
                outcome.lod, outcome.changed
            ));
        }
    }

    fn aggregate(&self, lods: &[LodOutcome]) -> PaintStats {
        let tracks_area = matches!(
            self.descriptor.kind,
            OperationKind::PaintAtLocation { .. }
                | OperationKind::PaintWithinArea { .. }
                | OperationKind::DetectWithinArea { .. }
        );
        let mut stats = StatsAccumulator::new(tracks_area);

        let Some(lod0) = lods.first().filter(|lod0| lod0.error.is_none()) else {
            return stats.finish(&[]);
        };

        let provider = self.provider.as_ref();
        let sections = provider.sections(0);
        let section_surfaces: Vec<ChannelSurfaces> = sections
            .iter()
            .map(|section| {
                section
                    .material
                    .map(|material| self.registry.registered_surfaces(material))
                    .unwrap_or_default()
            })
            .collect();
        let mut section_of = vec![None; lod0.colors.len()];
        for (section_index, section) in sections.iter().enumerate() {
            for index in section.range() {
                if let Some(slot) = section_of.get_mut(index) {
                    *slot = Some(section_index);
                }
            }
        }

        let unregistered = ChannelSurfaces::default();
        for (index, color) in lod0.colors.iter().enumerate() {
            let surfaces = section_of[index]
                .and_then(|section| section_surfaces.get(section))
                .unwrap_or(&unregistered);
            stats.add(
                *color,
                surfaces,
                lod0.within_area.get(index).copied().unwrap_or(false),
                provider.bone(0, index),
            );
        }

        stats.finish(provider.bone_names())
    }

    fn finish(
        &self,
        lods: Vec<LodOutcome>,
        stats: PaintStats,
        closest: Option<ClosestVertex>,
    ) -> TaskOutput {
        let descriptor = self.descriptor.as_ref();
        let callback = &descriptor.fundamental.callback;
        let provider = self.provider.as_ref();
        let paints = descriptor.category() == TaskCategory::Paint;

        let serialized_colors = callback.include_serialized.then(|| {
            let colors: Vec<Vec<VertexColor>> = lods.iter().map(|lod| lod.colors.clone()).collect();
            serialize_lod_colors(&colors)
        });
        let colors_changed = lods.first().is_some_and(|lod0| lod0.changed > 0);

        let mut final_colors = Vec::with_capacity(lods.len());
        let mut results = Vec::with_capacity(lods.len());
        for outcome in lods {
            let lod = outcome.lod;
            let commit = paints && outcome.error.is_none() && outcome.changed > 0;

            results.push(LodResult {
                lod,
                vertex_count: outcome.colors.len(),
                colors: callback
                    .include_colors
                    .includes(lod)
                    .then(|| outcome.colors.clone())
                    .filter(|_| outcome.error.is_none()),
                positions: callback
                    .include_positions
                    .includes(lod)
                    .then(|| provider.positions(lod).to_vec()),
                normals: callback
                    .include_normals
                    .includes(lod)
                    .then(|| provider.normals(lod).to_vec()),
                visited: callback.include_visited_indices.then(|| outcome.visited.clone()),
                changed_vertices: outcome.changed,
                propagated: outcome.propagated,
                error: outcome.error,
            });
            final_colors.push(commit.then_some(outcome.colors));
        }

        TaskOutput {
            result: TaskResult {
                task_id: self.id,
                mesh: self.mesh,
                category: descriptor.category(),
                operation: descriptor.kind.label(),
                success: true,
                error: None,
                lods: results,
                colors_changed,
                stats,
                closest_vertex: closest,
                serialized_colors,
                duration: Default::default(),
                messages: Vec::new(),
            },
            final_colors,
        }
    }
}

fn count_changed(original: &[VertexColor], colors: &[VertexColor]) -> usize {
    original
        .iter()
        .zip(colors.iter())
        .filter(|(before, after)| before != after)
        .count()
}

fn bone_name(names: &[String], bone: usize) -> String {
    names
        .get(bone)
        .cloned()
        .unwrap_or_else(|| format!("bone_{bone}"))
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use bevy::prelude::*;
    use crate::{
        color::Channel,
        provider::{
            BoneInfluence, LodBuffers, MeshKind, MeshSection, MeshVertexData, PaintableMeshes,
        },
        registry::PhysicsSurfaceRegistry,
        settings::{CallbackSettings, ChannelPaint, LodSelection},
        snippet::{deserialize_lod_colors, ColorSnippet},
    };

    fn row(count: usize, spacing: f32) -> LodBuffers {
        let positions = (0..count).map(|i| Vec3::X * i as f32 * spacing).collect();
        LodBuffers::new(positions, vec![Vec3::Y; count])
    }

    fn two_lods() -> MeshVertexData {
        MeshVertexData::new(MeshKind::Static, vec![row(4, 1.0), row(2, 3.0)]).unwrap()
    }

    fn task(
        mesh: impl VertexDataProvider + 'static,
        descriptor: OperationDescriptor,
    ) -> CalculateColorsTask {
        let mut arena = PaintableMeshes::default();
        let handle = arena.insert(two_lods());
        let vertices = mesh.vertex_count(0);
        CalculateColorsTask::new(
            7,
            handle,
            Arc::new(descriptor),
            Arc::new(mesh),
            Arc::new(PhysicsSurfaceRegistry::default()),
            vertices,
        )
    }

    fn add_red(amount: f32) -> OperationDescriptor {
        OperationDescriptor::paint_entire_mesh()
            .with_colors(ColorApplication::red(ChannelPaint::add(amount)))
    }

    /// Delegates to a mesh but drops the last normal of one LOD.
    struct ShortNormals {
        inner: MeshVertexData,
        lod: usize,
    }

    impl VertexDataProvider for ShortNormals {
        fn kind(&self) -> MeshKind {
            self.inner.kind()
        }

        fn lod_count(&self) -> usize {
            self.inner.lod_count()
        }

        fn vertex_count(&self, lod: usize) -> usize {
            self.inner.vertex_count(lod)
        }

        fn sections(&self, lod: usize) -> &[MeshSection] {
            self.inner.sections(lod)
        }

        fn positions(&self, lod: usize) -> &[Vec3] {
            self.inner.positions(lod)
        }

        fn normals(&self, lod: usize) -> &[Vec3] {
            let normals = self.inner.normals(lod);
            if lod == self.lod {
                &normals[..normals.len() - 1]
            } else {
                normals
            }
        }

        fn bones(&self, lod: usize) -> &[Option<BoneInfluence>] {
            self.inner.bones(lod)
        }

        fn bone_names(&self) -> &[String] {
            self.inner.bone_names()
        }

        fn color_buffer(&self, lod: usize) -> Vec<VertexColor> {
            self.inner.color_buffer(lod)
        }

        fn is_still_valid(&self) -> bool {
            self.inner.is_still_valid()
        }
    }

    /// Delegates to a mesh, optionally overriding LOD0 sections and failing validity or
    /// shrinking LOD0 once `is_still_valid` was asked more than a given number of times.
    #[derive(Default)]
    struct Flaky {
        inner: Option<MeshVertexData>,
        lod0_sections: Option<Vec<MeshSection>>,
        valid_for: Option<usize>,
        shrink_after: Option<usize>,
        checks: AtomicUsize,
    }

    impl Flaky {
        fn new(inner: MeshVertexData) -> Self {
            Self {
                inner: Some(inner),
                ..Default::default()
            }
        }

        fn mesh(&self) -> &MeshVertexData {
            self.inner.as_ref().unwrap()
        }

        fn checks(&self) -> usize {
            self.checks.load(Ordering::SeqCst)
        }
    }

    impl VertexDataProvider for Flaky {
        fn kind(&self) -> MeshKind {
            self.mesh().kind()
        }

        fn lod_count(&self) -> usize {
            self.mesh().lod_count()
        }

        fn vertex_count(&self, lod: usize) -> usize {
            let count = self.mesh().vertex_count(lod);
            match self.shrink_after {
                Some(after) if lod == 0 && self.checks() > after => count - 1,
                _ => count,
            }
        }

        fn sections(&self, lod: usize) -> &[MeshSection] {
            match &self.lod0_sections {
                Some(sections) if lod == 0 => sections,
                _ => self.mesh().sections(lod),
            }
        }

        fn positions(&self, lod: usize) -> &[Vec3] {
            self.mesh().positions(lod)
        }

        fn normals(&self, lod: usize) -> &[Vec3] {
            self.mesh().normals(lod)
        }

        fn bones(&self, lod: usize) -> &[Option<BoneInfluence>] {
            self.mesh().bones(lod)
        }

        fn bone_names(&self) -> &[String] {
            self.mesh().bone_names()
        }

        fn color_buffer(&self, lod: usize) -> Vec<VertexColor> {
            self.mesh().color_buffer(lod)
        }

        fn is_still_valid(&self) -> bool {
            let checks = self.checks.fetch_add(1, Ordering::SeqCst) + 1;
            self.mesh().is_still_valid()
                && self.valid_for.is_none_or(|valid_for| checks <= valid_for)
        }
    }

    #[test]
    fn paint_commits_every_changed_lod() {
        let mut task = task(two_lods(), add_red(1.0));
        assert_eq!(task.state(), TaskState::Created);

        let output = task.run();
        assert_eq!(task.state(), TaskState::Finished { success: true });
        assert!(output.result.success);
        assert!(output.result.colors_changed);
        assert_eq!(output.final_colors[0], Some(vec![[255, 0, 0, 0]; 4]));
        assert_eq!(output.final_colors[1], Some(vec![[255, 0, 0, 0]; 2]));
        assert_eq!(output.result.stats.channel(Channel::Red).percent, 100.0);
    }

    #[test]
    fn lod0_vertex_count_is_checked_at_start() {
        let mut task = task(two_lods(), add_red(1.0));
        task.expected_lod0_vertices = 5;

        let output = task.run();
        assert!(!output.result.success);
        assert_eq!(
            output.result.error,
            Some(PaintTaskError::VertexCountMismatch {
                lod: 0,
                buffer: "position",
                expected: 5,
                found: 4,
            })
        );
        assert!(output.final_colors.is_empty());
    }

    #[test]
    fn mismatched_higher_lod_is_skipped() {
        let mesh = ShortNormals {
            inner: two_lods(),
            lod: 1,
        };
        let output = task(mesh, add_red(1.0)).run();

        assert!(output.result.success);
        let lod1 = output.result.lod(1).unwrap();
        assert!(matches!(
            lod1.error,
            Some(PaintTaskError::VertexCountMismatch { lod: 1, buffer: "normal", .. })
        ));
        assert_eq!(output.final_colors[1], None);
        assert!(output.final_colors[0].is_some());
    }

    #[test]
    fn mismatched_lod0_fails_the_task() {
        let mesh = ShortNormals {
            inner: two_lods(),
            lod: 0,
        };
        let output = task(mesh, add_red(1.0)).run();
        assert!(!output.result.success);
    }

    #[test]
    fn invalidated_mesh_fails() {
        let mesh = two_lods();
        mesh.invalidate();
        let output = task(mesh, add_red(1.0)).run();
        assert_eq!(output.result.error, Some(PaintTaskError::InvalidWorldOrMesh));
    }

    #[test]
    fn detect_closest_vertex_never_commits() {
        let descriptor = OperationDescriptor::detect_closest_vertex(Vec3::new(2.2, 0.0, 0.0));
        let output = task(two_lods(), descriptor).run();

        assert!(output.result.success);
        let closest = output.result.closest_vertex.unwrap();
        assert_eq!(closest.lod, 0);
        assert_eq!(closest.index, 2);
        assert!((closest.distance - 0.2).abs() < 1e-5);
        assert!(output.final_colors.iter().all(Option::is_none));
    }

    #[test]
    fn accept_within_stops_at_the_first_close_vertex() {
        let descriptor = OperationDescriptor::detect_closest_vertex(Vec3::new(2.2, 0.0, 0.0))
            .with_accept_within(5.0)
            .with_callback(CallbackSettings {
                include_visited_indices: true,
                ..Default::default()
            });
        let output = task(two_lods(), descriptor).run();

        assert_eq!(output.result.closest_vertex.as_ref().unwrap().index, 0);
        assert_eq!(output.result.lod(0).unwrap().visited, Some(vec![0]));
    }

    #[test]
    fn initial_colors_are_painted_over() {
        let snippet = ColorSnippet::new("base", vec![vec![[0, 10, 0, 0]; 4]]);
        let descriptor = add_red(0.2).with_initial_colors(snippet).with_lods_to_process(1);
        let output = task(two_lods(), descriptor).run();

        assert_eq!(output.final_colors.len(), 1);
        assert_eq!(output.final_colors[0], Some(vec![[51, 10, 0, 0]; 4]));
    }

    #[test]
    fn serialized_colors_cover_every_lod() {
        let descriptor = add_red(1.0).with_callback(CallbackSettings {
            include_colors: LodSelection::All,
            include_serialized: true,
            ..Default::default()
        });
        let output = task(two_lods(), descriptor).run();

        let serialized = output.result.serialized_colors.as_deref().unwrap();
        let lods = deserialize_lod_colors(serialized).unwrap();
        assert_eq!(lods, vec![vec![[255, 0, 0, 0]; 4], vec![[255, 0, 0, 0]; 2]]);
        assert_eq!(output.result.lod(1).unwrap().colors.as_ref().unwrap().len(), 2);
    }

    #[test]
    fn unchanged_colors_are_not_committed() {
        let output = task(two_lods(), add_red(0.0)).run();
        assert!(output.result.success);
        assert!(!output.result.colors_changed);
        assert!(output.final_colors.iter().all(Option::is_none));
    }

    #[test]
    fn topology_change_between_vertices_fails_the_task() {
        let mesh = Flaky {
            shrink_after: Some(3),
            ..Flaky::new(two_lods())
        };
        let output = task(mesh, add_red(1.0)).run();

        assert!(!output.result.success);
        assert_eq!(output.result.error, Some(PaintTaskError::TopologyChangedMidTask { lod: 0 }));
        assert!(output.final_colors.is_empty());
    }

    #[test]
    fn invalidation_between_vertices_fails_the_task() {
        let mesh = Flaky {
            valid_for: Some(4),
            ..Flaky::new(two_lods())
        };
        let mut task = task(mesh, add_red(1.0));
        let output = task.run();

        assert_eq!(output.result.error, Some(PaintTaskError::InvalidWorldOrMesh));
        assert_eq!(task.state(), TaskState::Finished { success: false });
        assert!(output.final_colors.is_empty());
    }

    #[test]
    fn empty_lods_are_reported() {
        let mesh = MeshVertexData::new(MeshKind::Static, vec![row(4, 1.0), row(0, 1.0)]).unwrap();
        let output = task(mesh, add_red(1.0)).run();

        assert!(output.result.success);
        assert_eq!(output.result.lod(1).unwrap().error, Some(PaintTaskError::EmptyLod { lod: 1 }));
        assert_eq!(output.final_colors[1], None);

        let mesh = MeshVertexData::new(MeshKind::Static, vec![row(0, 1.0)]).unwrap();
        let output = task(mesh, add_red(1.0)).run();
        assert_eq!(output.result.error, Some(PaintTaskError::EmptyLod { lod: 0 }));
    }

    #[test]
    fn sections_past_the_vertex_count_are_rejected() {
        let mesh = Flaky {
            lod0_sections: Some(vec![MeshSection::new(None, 0, 6)]),
            ..Flaky::new(two_lods())
        };
        let output = task(mesh, add_red(1.0)).run();

        assert_eq!(
            output.result.error,
            Some(PaintTaskError::VertexCountMismatch {
                lod: 0,
                buffer: "section",
                expected: 4,
                found: 6,
            })
        );
    }

    #[test]
    fn propagated_lods_skip_the_kernel() {
        let lod0_calls = Arc::new(AtomicUsize::new(0));
        let higher_calls = Arc::new(AtomicUsize::new(0));
        let (lod0, higher) = (Arc::clone(&lod0_calls), Arc::clone(&higher_calls));
        let descriptor = add_red(1.0)
            .with_propagation(true)
            .with_color_override(move |record, _| {
                let calls = if record.lod == 0 { &lod0 } else { &higher };
                calls.fetch_add(1, Ordering::SeqCst);
                None
            });
        let output = task(two_lods(), descriptor).run();

        assert!(output.result.success);
        assert_eq!(lod0_calls.load(Ordering::SeqCst), 4);
        assert_eq!(higher_calls.load(Ordering::SeqCst), 0);
        assert!(output.result.lod(1).unwrap().propagated);
        assert_eq!(output.final_colors[1], Some(vec![[255, 0, 0, 0]; 2]));
    }

    #[test]
    fn panicking_hook_becomes_a_failed_result() {
        let descriptor = add_red(1.0).with_color_override(|_, _| panic!("hook exploded"));
        let mut task = task(two_lods(), descriptor);
        let output = task.run_contained();

        assert!(!output.result.success);
        assert_eq!(
            output.result.error,
            Some(PaintTaskError::WorkerPanicked("hook exploded".to_string()))
        );
        assert_eq!(task.state(), TaskState::Finished { success: false });
        assert!(output.final_colors.is_empty());
    }
}
