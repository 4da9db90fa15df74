use std::ops::Range;

use bevy::prelude::*;

use crate::{color::VertexColor, registry::MaterialId};

pub mod arena;
pub mod mesh_data;

pub use arena::{MeshHandle, PaintableMeshes};
pub use mesh_data::{write_colors_to_mesh, LodBuffers, MeshVertexData};


#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Reflect)]
pub enum MeshKind {
    #[default]
    Static,
    Skinned,
    Procedural,
    Fractured,
}


/// Contiguous run of vertices sharing one material.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MeshSection {
    pub material: Option<MaterialId>,
    pub first_vertex: usize,
    pub vertex_count: usize,
}

impl MeshSection {
    pub fn new(material: Option<MaterialId>, first_vertex: usize, vertex_count: usize) -> Self {
        Self {
            material,
            first_vertex,
            vertex_count,
        }
    }

    pub fn range(&self) -> Range<usize> {
        self.first_vertex..self.first_vertex + self.vertex_count
    }
}


/// Dominant skinning influence of a vertex.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoneInfluence {
    pub bone: usize,
    pub weight: f32,
}


/// Uniform vertex access over any mesh representation.
///
/// Positions and normals are in component space. Implementations must be cheap to query per
/// vertex; the calculate-colors task reads them from worker threads.
pub trait VertexDataProvider: Send + Sync {
    fn kind(&self) -> MeshKind;

    fn lod_count(&self) -> usize;

    fn vertex_count(&self, lod: usize) -> usize;

    fn sections(&self, lod: usize) -> &[MeshSection];

    fn positions(&self, lod: usize) -> &[Vec3];

    fn normals(&self, lod: usize) -> &[Vec3];

    /// Empty unless the mesh is skinned.
    fn bones(&self, lod: usize) -> &[Option<BoneInfluence>];

    fn bone_names(&self) -> &[String];

    /// Copy of the current color buffer; the task mutates its own copy.
    fn color_buffer(&self, lod: usize) -> Vec<VertexColor>;

    fn is_still_valid(&self) -> bool;

    fn position(&self, lod: usize, index: usize) -> Vec3 {
        self.positions(lod).get(index).copied().unwrap_or(Vec3::ZERO)
    }

    fn normal(&self, lod: usize, index: usize) -> Vec3 {
        self.normals(lod).get(index).copied().unwrap_or(Vec3::ZERO)
    }

    fn bone(&self, lod: usize, index: usize) -> Option<BoneInfluence> {
        self.bones(lod).get(index).copied().flatten()
    }
}
