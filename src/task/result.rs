use std::time::Duration;

use bevy::prelude::*;

use crate::{
    color::VertexColor,
    error::PaintTaskError,
    provider::MeshHandle,
    queue::{TaskCategory, TaskId},
    registry::MaterialId,
    task::stats::PaintStats,
};


#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
}


#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskMessage {
    pub severity: Severity,
    pub message: String,
}


/// Messages collected on the worker and emitted once when the task retires.
#[derive(Clone, Debug, Default)]
pub struct TaskLog {
    messages: Vec<TaskMessage>,
}

impl TaskLog {
    pub fn push(&mut self, severity: Severity, message: impl Into<String>) {
        self.messages.push(TaskMessage {
            severity,
            message: message.into(),
        });
    }

    pub fn debug(&mut self, message: impl Into<String>) {
        self.push(Severity::Debug, message);
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.push(Severity::Info, message);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.push(Severity::Warning, message);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.push(Severity::Error, message);
    }

    pub fn into_messages(self) -> Vec<TaskMessage> {
        self.messages
    }
}

/// Forwards task messages to the bevy log.
pub fn emit_messages(task_id: TaskId, operation: &str, messages: &[TaskMessage]) {
    for TaskMessage { severity, message } in messages {
        match severity {
            Severity::Debug => debug!("paint task {} ({}): {}", task_id, operation, message),
            Severity::Info => info!("paint task {} ({}): {}", task_id, operation, message),
            Severity::Warning => warn!("paint task {} ({}): {}", task_id, operation, message),
            Severity::Error => error!("paint task {} ({}): {}", task_id, operation, message),
        }
    }
}


#[derive(Clone, Debug, Default, PartialEq)]
pub struct LodResult {
    pub lod: usize,
    pub vertex_count: usize,
    pub colors: Option<Vec<VertexColor>>,
    pub positions: Option<Vec<Vec3>>,
    pub normals: Option<Vec<Vec3>>,
    pub visited: Option<Vec<usize>>,
    pub changed_vertices: usize,
    pub propagated: bool,
    /// Set when this LOD was skipped after a non-fatal failure.
    pub error: Option<PaintTaskError>,
}


#[derive(Clone, Debug, PartialEq)]
pub struct ClosestVertex {
    pub lod: usize,
    pub index: usize,
    pub distance: f32,
    pub position: Vec3,
    pub normal: Vec3,
    pub color: VertexColor,
    pub section: usize,
    pub material: Option<MaterialId>,
    pub bone: Option<String>,
}


#[derive(Clone, Debug)]
pub struct TaskResult {
    pub task_id: TaskId,
    pub mesh: MeshHandle,
    pub category: TaskCategory,
    pub operation: &'static str,
    pub success: bool,
    pub error: Option<PaintTaskError>,
    pub lods: Vec<LodResult>,
    /// Any LOD0 color differs from the buffer the task started from.
    pub colors_changed: bool,
    pub stats: PaintStats,
    pub closest_vertex: Option<ClosestVertex>,
    pub serialized_colors: Option<String>,
    pub duration: Duration,
    pub messages: Vec<TaskMessage>,
}

impl TaskResult {
    pub fn failed(
        task_id: TaskId,
        mesh: MeshHandle,
        category: TaskCategory,
        operation: &'static str,
        error: PaintTaskError,
    ) -> Self {
        Self {
            task_id,
            mesh,
            category,
            operation,
            success: false,
            messages: vec![TaskMessage {
                severity: Severity::Warning,
                message: error.to_string(),
            }],
            error: Some(error),
            lods: Vec::new(),
            colors_changed: false,
            stats: PaintStats::default(),
            closest_vertex: None,
            serialized_colors: None,
            duration: Duration::ZERO,
        }
    }

    pub fn lod(&self, lod: usize) -> Option<&LodResult> {
        self.lods.iter().find(|result| result.lod == lod)
    }

    pub fn lod0_colors(&self) -> Option<&[VertexColor]> {
        self.lod(0).and_then(|lod| lod.colors.as_deref())
    }

    /// Turns a computed result into a failure, keeping its diagnostics.
    pub(crate) fn fail(&mut self, error: PaintTaskError) {
        self.success = false;
        self.messages.push(TaskMessage {
            severity: Severity::Warning,
            message: error.to_string(),
        });
        self.error = Some(error);
    }
}
