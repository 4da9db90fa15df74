use thiserror::Error;

use crate::queue::TaskId;


/// Reasons a calculate-colors task did not finish successfully.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PaintTaskError {
    #[error("target mesh is no longer valid")]
    InvalidWorldOrMesh,

    #[error("LOD {lod} has no vertices")]
    EmptyLod { lod: usize },

    #[error("LOD {lod} {buffer} buffer holds {found} entries, expected {expected}")]
    VertexCountMismatch {
        lod: usize,
        buffer: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("mesh topology changed while processing LOD {lod}")]
    TopologyChangedMidTask { lod: usize },

    #[error("superseded by task {superseded_by} before it started")]
    QueueSuperseded { superseded_by: TaskId },

    #[error("malformed serialized colors: {0}")]
    MalformedSerializedColors(String),

    #[error("cancelled before completion")]
    Cancelled,

    #[error("worker panicked: {0}")]
    WorkerPanicked(String),
}

impl PaintTaskError {
    /// Errors that invalidate the whole task regardless of the LOD they surfaced on.
    pub fn is_task_fatal(&self) -> bool {
        matches!(
            self,
            PaintTaskError::InvalidWorldOrMesh
                | PaintTaskError::TopologyChangedMidTask { .. }
                | PaintTaskError::QueueSuperseded { .. }
                | PaintTaskError::MalformedSerializedColors(_)
                | PaintTaskError::Cancelled
                | PaintTaskError::WorkerPanicked(_)
        )
    }
}


#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum MeshDataError {
    #[error("mesh is missing the {0} attribute")]
    MissingAttribute(&'static str),

    #[error("{attribute} attribute has {found} entries, expected {expected}")]
    AttributeLength {
        attribute: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("section {section} spans vertices {first}..{end} beyond vertex count {vertex_count}")]
    SectionOutOfRange {
        section: usize,
        first: usize,
        end: usize,
        vertex_count: usize,
    },

    #[error("mesh data has no LODs")]
    NoLods,
}
