use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{mpsc, Arc, Mutex},
    time::{Duration, Instant},
};

use bevy::prelude::*;

use crate::{
    error::PaintTaskError,
    provider::{MeshHandle, PaintableMeshes},
    registry::{PhysicsSurfaceRegistry, SurfaceRegistry},
    settings::OperationDescriptor,
    task::{result::emit_messages, CalculateColorsTask, TaskOutput, TaskResult},
};

pub mod pool;

pub use pool::{PoolSettings, WorkerPool};


pub type TaskId = u32;

const MAX_TASK_ID: TaskId = i32::MAX as TaskId;


#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Reflect)]
pub enum TaskCategory {
    Paint,
    Detect,
}


pub type CompletionCallback = Box<dyn FnOnce(&TaskResult) + Send + Sync>;


pub struct PaintTaskRequest {
    pub mesh: MeshHandle,
    pub descriptor: OperationDescriptor,
    pub callback: Option<CompletionCallback>,
}

impl PaintTaskRequest {
    pub fn new(mesh: MeshHandle, descriptor: OperationDescriptor) -> Self {
        Self {
            mesh,
            descriptor,
            callback: None,
        }
    }

    pub fn with_callback(
        mut self,
        callback: impl FnOnce(&TaskResult) + Send + Sync + 'static,
    ) -> Self {
        self.callback = Some(Box::new(callback));
        self
    }
}


#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Enqueued {
    pub id: TaskId,
    /// The task is the only one queued for its mesh.
    pub can_start_immediately: bool,
}


#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
    /// An earlier task of the same mesh has to finish first.
    WaitingForMesh,
    /// The category is at its cap; the task starts once a slot frees up.
    Parked,
    NotQueued,
}


#[derive(Clone, Debug)]
pub struct QueueSettings {
    pub paint_cap: usize,
    pub detect_cap: usize,
    pub pool: PoolSettings,
    pub teardown_grace: Duration,
    pub mesh_queue_warning_depth: usize,
    pub log_task_summaries: bool,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            paint_cap: 15,
            detect_cap: 15,
            pool: PoolSettings::default(),
            teardown_grace: Duration::from_secs(5),
            mesh_queue_warning_depth: 50,
            log_task_summaries: false,
        }
    }
}


struct QueuedTask {
    id: TaskId,
    mesh: MeshHandle,
    category: TaskCategory,
    descriptor: Arc<OperationDescriptor>,
    expected_lod0_vertices: usize,
    enqueued_at: Instant,
    started_at: Option<Instant>,
    callback: Option<CompletionCallback>,
    cancelled: bool,
}

impl QueuedTask {
    fn failed(&self, error: PaintTaskError) -> TaskResult {
        TaskResult::failed(self.id, self.mesh, self.category, self.descriptor.kind.label(), error)
    }
}


struct SubQueue {
    tasks: HashMap<TaskId, QueuedTask>,
    per_mesh: HashMap<MeshHandle, VecDeque<TaskId>>,
    running: HashSet<TaskId>,
    parked: VecDeque<TaskId>,
    cap: usize,
}

impl SubQueue {
    fn new(cap: usize) -> Self {
        Self {
            tasks: HashMap::new(),
            per_mesh: HashMap::new(),
            running: HashSet::new(),
            parked: VecDeque::new(),
            cap: cap.max(1),
        }
    }

    fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    fn has_headroom(&self) -> bool {
        self.running.len() < self.cap
    }

    fn push(&mut self, task: QueuedTask) -> usize {
        let list = self.per_mesh.entry(task.mesh).or_default();
        list.push_back(task.id);
        let depth = list.len();
        self.tasks.insert(task.id, task);
        depth
    }

    fn remove(&mut self, id: TaskId) -> Option<QueuedTask> {
        let task = self.tasks.remove(&id)?;
        self.running.remove(&id);
        self.parked.retain(|parked| *parked != id);
        if let Some(list) = self.per_mesh.get_mut(&task.mesh) {
            list.retain(|queued| *queued != id);
            if list.is_empty() {
                self.per_mesh.remove(&task.mesh);
            }
        }
        Some(task)
    }

    fn head(&self, mesh: MeshHandle) -> Option<TaskId> {
        self.per_mesh.get(&mesh).and_then(|list| list.front().copied())
    }

    fn ids_for(&self, mesh: MeshHandle) -> Vec<TaskId> {
        self.per_mesh
            .get(&mesh)
            .map(|list| list.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Removes every task of `mesh` that has not started yet.
    fn purge_waiting(&mut self, mesh: MeshHandle) -> Vec<QueuedTask> {
        let waiting: Vec<TaskId> = self
            .ids_for(mesh)
            .into_iter()
            .filter(|id| !self.running.contains(id))
            .collect();
        waiting.into_iter().filter_map(|id| self.remove(id)).collect()
    }
}


/// Admits, throttles and retires calculate-colors tasks.
///
/// Tasks of one mesh run strictly in enqueue order per category, and no category ever
/// runs more tasks than its cap. Workers hand their output back over a channel that
/// [`PaintTaskQueue::poll`] drains on the main thread, where colors are committed and
/// callbacks fire.
#[derive(Resource)]
pub struct PaintTaskQueue {
    paint: SubQueue,
    detect: SubQueue,
    next_id: TaskId,
    pool: WorkerPool,
    sender: mpsc::Sender<TaskOutput>,
    receiver: Mutex<mpsc::Receiver<TaskOutput>>,
    registry: Arc<dyn SurfaceRegistry>,
    settings: QueueSettings,
    idle_since: Option<Instant>,
    retired: Vec<(QueuedTask, PaintTaskError)>,
}

impl Default for PaintTaskQueue {
    fn default() -> Self {
        Self::new(QueueSettings::default())
    }
}

impl PaintTaskQueue {
    pub fn new(settings: QueueSettings) -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            paint: SubQueue::new(settings.paint_cap),
            detect: SubQueue::new(settings.detect_cap),
            next_id: 1,
            pool: WorkerPool::new(settings.pool.clone()),
            sender,
            receiver: Mutex::new(receiver),
            registry: Arc::new(PhysicsSurfaceRegistry::default()),
            settings,
            idle_since: None,
            retired: Vec::new(),
        }
    }

    pub fn settings(&self) -> &QueueSettings {
        &self.settings
    }

    pub fn set_surface_registry(&mut self, registry: Arc<dyn SurfaceRegistry>) {
        self.registry = registry;
    }

    fn sub_queue(&self, category: TaskCategory) -> &SubQueue {
        match category {
            TaskCategory::Paint => &self.paint,
            TaskCategory::Detect => &self.detect,
        }
    }

    fn sub_queue_mut(&mut self, category: TaskCategory) -> &mut SubQueue {
        match category {
            TaskCategory::Paint => &mut self.paint,
            TaskCategory::Detect => &mut self.detect,
        }
    }

    fn category_of(&self, id: TaskId) -> Option<TaskCategory> {
        [TaskCategory::Paint, TaskCategory::Detect]
            .into_iter()
            .find(|category| self.sub_queue(*category).tasks.contains_key(&id))
    }

    fn allocate_id(&mut self) -> TaskId {
        let id = self.next_id;
        self.next_id = if id >= MAX_TASK_ID { 1 } else { id + 1 };
        id
    }

    pub fn enqueue(&mut self, meshes: &PaintableMeshes, request: PaintTaskRequest) -> Enqueued {
        let id = self.allocate_id();
        let category = request.descriptor.category();
        let supersedes = category == TaskCategory::Paint && request.descriptor.supersedes_queued;

        let task = QueuedTask {
            id,
            mesh: request.mesh,
            category,
            descriptor: Arc::new(request.descriptor),
            expected_lod0_vertices: meshes.lod0_vertex_count(request.mesh).unwrap_or(0),
            enqueued_at: Instant::now(),
            started_at: None,
            callback: request.callback,
            cancelled: false,
        };

        if !meshes.is_valid(request.mesh) {
            debug!("paint task {} targets an invalid mesh, retiring", id);
            self.retired.push((task, PaintTaskError::InvalidWorldOrMesh));
            return Enqueued {
                id,
                can_start_immediately: false,
            };
        }

        if supersedes {
            for category in [TaskCategory::Paint, TaskCategory::Detect] {
                let purged = self.sub_queue_mut(category).purge_waiting(request.mesh);
                for task in purged {
                    debug!("paint task {} superseded by {}", task.id, id);
                    self.retired
                        .push((task, PaintTaskError::QueueSuperseded { superseded_by: id }));
                }
            }
        }

        let mesh = task.mesh;
        let depth = self.sub_queue_mut(category).push(task);
        if depth > self.settings.mesh_queue_warning_depth {
            warn!(
                "{} {:?} tasks queued for mesh {:?}, painted faster than processed",
                depth, category, mesh
            );
        }
        self.idle_since = None;

        Enqueued {
            id,
            can_start_immediately: depth == 1,
        }
    }

    pub fn start(&mut self, id: TaskId, meshes: &PaintableMeshes) -> StartOutcome {
        let Some(category) = self.category_of(id) else {
            return StartOutcome::NotQueued;
        };

        let queue = self.sub_queue_mut(category);
        if queue.running.contains(&id) {
            return StartOutcome::AlreadyRunning;
        }
        let Some(mesh) = queue.tasks.get(&id).map(|task| task.mesh) else {
            return StartOutcome::NotQueued;
        };
        if queue.head(mesh) != Some(id) {
            return StartOutcome::WaitingForMesh;
        }
        if !queue.has_headroom() {
            if !queue.parked.contains(&id) {
                queue.parked.push_back(id);
            }
            return StartOutcome::Parked;
        }

        queue.parked.retain(|parked| *parked != id);
        queue.running.insert(id);
        let Some(task) = queue.tasks.get_mut(&id) else {
            return StartOutcome::NotQueued;
        };
        task.started_at = Some(Instant::now());
        let descriptor = Arc::clone(&task.descriptor);
        let expected_lod0_vertices = task.expected_lod0_vertices;
        let unavailable = task.failed(PaintTaskError::InvalidWorldOrMesh);

        let sender = self.sender.clone();
        match meshes.provider(mesh) {
            Some(provider) => {
                let mut job = CalculateColorsTask::new(
                    id,
                    mesh,
                    descriptor,
                    provider,
                    Arc::clone(&self.registry),
                    expected_lod0_vertices,
                );
                self.pool.execute(move || {
                    let output = job.run_contained();
                    // the queue may already be gone during app shutdown
                    let _ = sender.send(output);
                });
            }
            None => {
                let _ = sender.send(TaskOutput {
                    result: unavailable,
                    final_colors: Vec::new(),
                });
            }
        }

        self.idle_since = None;
        StartOutcome::Started
    }

    /// Enqueues and starts the task if its mesh and category allow it.
    pub fn submit(
        &mut self,
        meshes: &PaintableMeshes,
        request: PaintTaskRequest,
    ) -> (Enqueued, StartOutcome) {
        let enqueued = self.enqueue(meshes, request);
        let outcome = if enqueued.can_start_immediately {
            self.start(enqueued.id, meshes)
        } else if self.category_of(enqueued.id).is_some() {
            StartOutcome::WaitingForMesh
        } else {
            StartOutcome::NotQueued
        };
        (enqueued, outcome)
    }

    /// Retires finished tasks and starts the ones they were holding back.
    pub fn poll(&mut self, meshes: &mut PaintableMeshes) -> Vec<TaskResult> {
        let outputs: Vec<TaskOutput> = match self.receiver.lock() {
            Ok(receiver) => receiver.try_iter().collect(),
            Err(poisoned) => poisoned.into_inner().try_iter().collect(),
        };

        let mut results = Vec::new();
        let mut touched = Vec::new();
        for output in outputs {
            let mesh = output.result.mesh;
            if let Some(result) = self.finish_task(meshes, output) {
                results.push(result);
            }
            if !touched.contains(&mesh) {
                touched.push(mesh);
            }
        }

        for (mut task, error) in std::mem::take(&mut self.retired) {
            let result = task.failed(error);
            results.push(self.retire(&mut task, result));
        }

        self.start_waiting(meshes, &touched);
        self.teardown_when_idle();
        results
    }

    fn finish_task(
        &mut self,
        meshes: &mut PaintableMeshes,
        output: TaskOutput,
    ) -> Option<TaskResult> {
        let TaskOutput {
            mut result,
            final_colors,
        } = output;

        let Some(mut task) = self.sub_queue_mut(result.category).remove(result.task_id) else {
            warn!("paint task {} finished but is no longer queued", result.task_id);
            return None;
        };

        if !meshes.is_valid(task.mesh) {
            if result.success {
                result.fail(PaintTaskError::InvalidWorldOrMesh);
            }
            for category in [TaskCategory::Paint, TaskCategory::Detect] {
                for purged in self.sub_queue_mut(category).purge_waiting(task.mesh) {
                    self.retired.push((purged, PaintTaskError::InvalidWorldOrMesh));
                }
            }
        } else if task.cancelled {
            result.fail(PaintTaskError::Cancelled);
        } else if result.success && task.category == TaskCategory::Paint {
            if let Err(error) = meshes.commit_colors(task.mesh, final_colors) {
                result.fail(error);
            }
        }

        Some(self.retire(&mut task, result))
    }

    fn retire(&mut self, task: &mut QueuedTask, result: TaskResult) -> TaskResult {
        emit_messages(result.task_id, result.operation, &result.messages);

        if self.settings.log_task_summaries {
            let waited = task
                .started_at
                .map_or_else(|| task.enqueued_at.elapsed(), |started| started - task.enqueued_at);
            info!(
                "paint task {} ({}) on mesh {:?}: success: {}, waited {:?}, ran {:?}",
                result.task_id,
                result.operation,
                result.mesh,
                result.success,
                waited,
                result.duration
            );
        }

        if let Some(callback) = task.callback.take() {
            callback(&result);
        }
        result
    }

    fn start_waiting(&mut self, meshes: &PaintableMeshes, touched: &[MeshHandle]) {
        for category in [TaskCategory::Paint, TaskCategory::Detect] {
            while self.sub_queue(category).has_headroom() {
                let Some(id) = self.sub_queue_mut(category).parked.pop_front() else {
                    break;
                };
                self.start(id, meshes);
            }
        }

        for mesh in touched {
            for category in [TaskCategory::Paint, TaskCategory::Detect] {
                if let Some(head) = self.sub_queue(category).head(*mesh) {
                    self.start(head, meshes);
                }
            }
        }
    }

    fn teardown_when_idle(&mut self) {
        if !(self.paint.is_empty() && self.detect.is_empty()) {
            self.idle_since = None;
            return;
        }

        let idle_since = *self.idle_since.get_or_insert_with(Instant::now);
        if self.pool.is_active() && idle_since.elapsed() >= self.settings.teardown_grace {
            self.pool.shutdown();
        }
    }

    /// Drops every task of `mesh`. Waiting tasks report `Cancelled` on the next poll,
    /// running ones once they finish.
    pub fn cancel_mesh(&mut self, mesh: MeshHandle) -> usize {
        let mut cancelled = 0;
        for category in [TaskCategory::Paint, TaskCategory::Detect] {
            let queue = self.sub_queue_mut(category);
            for id in queue.running.iter() {
                if let Some(task) = queue.tasks.get_mut(id).filter(|task| task.mesh == mesh) {
                    task.cancelled = true;
                    cancelled += 1;
                }
            }

            for task in queue.purge_waiting(mesh) {
                cancelled += 1;
                self.retired.push((task, PaintTaskError::Cancelled));
            }
        }
        cancelled
    }

    pub fn is_running(&self, id: TaskId) -> bool {
        self.paint.running.contains(&id) || self.detect.running.contains(&id)
    }

    pub fn is_queued(&self, id: TaskId) -> bool {
        self.category_of(id).is_some()
    }

    pub fn running_count(&self, category: TaskCategory) -> usize {
        self.sub_queue(category).running.len()
    }

    pub fn parked_count(&self, category: TaskCategory) -> usize {
        self.sub_queue(category).parked.len()
    }

    pub fn queued_count(&self) -> usize {
        self.paint.tasks.len() + self.detect.tasks.len()
    }

    pub fn mesh_queue_depth(&self, mesh: MeshHandle) -> usize {
        self.paint.ids_for(mesh).len() + self.detect.ids_for(mesh).len()
    }

    pub fn is_idle(&self) -> bool {
        self.queued_count() == 0 && self.retired.is_empty()
    }

    pub fn pool_active(&self) -> bool {
        self.pool.is_active()
    }
}
