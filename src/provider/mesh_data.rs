use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use bevy::{
    prelude::*,
    render::mesh::VertexAttributeValues,
};
use itertools::izip;

use crate::{
    color::{channel_to_unit, unit_to_channel, VertexColor},
    error::MeshDataError,
    provider::{BoneInfluence, MeshKind, MeshSection, VertexDataProvider},
    registry::MaterialId,
};


/// Vertex buffers of one LOD.
#[derive(Clone, Debug, Default)]
pub struct LodBuffers {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub colors: Vec<VertexColor>,
    pub sections: Vec<MeshSection>,
    pub bones: Vec<Option<BoneInfluence>>,
}

impl LodBuffers {
    /// Single untextured section, zeroed colors.
    pub fn new(positions: Vec<Vec3>, normals: Vec<Vec3>) -> Self {
        let count = positions.len();
        Self {
            positions,
            normals,
            colors: vec![[0; 4]; count],
            sections: vec![MeshSection::new(None, 0, count)],
            bones: Vec::new(),
        }
    }

    pub fn with_colors(mut self, colors: Vec<VertexColor>) -> Self {
        self.colors = colors;
        self
    }

    pub fn with_sections(mut self, sections: Vec<MeshSection>) -> Self {
        self.sections = sections;
        self
    }

    pub fn with_material(mut self, material: MaterialId) -> Self {
        for section in self.sections.iter_mut() {
            section.material = Some(material);
        }
        self
    }

    pub fn with_bones(mut self, bones: Vec<Option<BoneInfluence>>) -> Self {
        self.bones = bones;
        self
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Reads positions, normals, colors and dominant joints from a Bevy mesh.
    pub fn from_mesh(mesh: &Mesh, material: Option<MaterialId>) -> Result<Self, MeshDataError> {
        let positions: Vec<Vec3> = mesh
            .attribute(Mesh::ATTRIBUTE_POSITION)
            .and_then(VertexAttributeValues::as_float3)
            .ok_or(MeshDataError::MissingAttribute("position"))?
            .iter()
            .map(|p| Vec3::from_array(*p))
            .collect();
        let count = positions.len();

        let normals = match mesh
            .attribute(Mesh::ATTRIBUTE_NORMAL)
            .and_then(VertexAttributeValues::as_float3)
        {
            Some(normals) => normals.iter().map(|n| Vec3::from_array(*n)).collect(),
            None => vec![Vec3::ZERO; count],
        };

        let colors = match mesh.attribute(Mesh::ATTRIBUTE_COLOR) {
            Some(VertexAttributeValues::Float32x4(colors)) => colors
                .iter()
                .map(|c| c.map(unit_to_channel))
                .collect(),
            Some(VertexAttributeValues::Unorm8x4(colors)) => colors.clone(),
            _ => vec![[0; 4]; count],
        };

        let bones = match (
            mesh.attribute(Mesh::ATTRIBUTE_JOINT_INDEX),
            mesh.attribute(Mesh::ATTRIBUTE_JOINT_WEIGHT),
        ) {
            (
                Some(VertexAttributeValues::Uint16x4(joints)),
                Some(VertexAttributeValues::Float32x4(weights)),
            ) => izip!(joints.iter(), weights.iter())
                .map(|(joints, weights)| dominant_influence(joints, weights))
                .collect(),
            _ => Vec::new(),
        };

        let buffers = Self {
            positions,
            normals,
            colors,
            sections: vec![MeshSection::new(material, 0, count)],
            bones,
        };
        buffers.validate()?;
        Ok(buffers)
    }

    fn validate(&self) -> Result<(), MeshDataError> {
        let expected = self.positions.len();
        let lengths = [
            ("normal", self.normals.len()),
            ("color", self.colors.len()),
        ];
        for (attribute, found) in lengths {
            if found != expected {
                return Err(MeshDataError::AttributeLength {
                    attribute,
                    expected,
                    found,
                });
            }
        }
        if !self.bones.is_empty() && self.bones.len() != expected {
            return Err(MeshDataError::AttributeLength {
                attribute: "joint",
                expected,
                found: self.bones.len(),
            });
        }
        for (section, range) in self.sections.iter().map(MeshSection::range).enumerate() {
            if range.end > expected {
                return Err(MeshDataError::SectionOutOfRange {
                    section,
                    first: range.start,
                    end: range.end,
                    vertex_count: expected,
                });
            }
        }
        Ok(())
    }
}

fn dominant_influence(joints: &[u16; 4], weights: &[f32; 4]) -> Option<BoneInfluence> {
    joints
        .iter()
        .zip(weights.iter())
        .filter(|(_, weight)| **weight > 0.0)
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(joint, weight)| BoneInfluence {
            bone: *joint as usize,
            weight: *weight,
        })
}


/// In-memory vertex data of a tracked mesh.
///
/// Clones share the liveness flag, so a snapshot handed to a worker observes removal or
/// geometry replacement of the tracked mesh it was taken from.
#[derive(Clone, Debug)]
pub struct MeshVertexData {
    kind: MeshKind,
    lods: Vec<LodBuffers>,
    bone_names: Vec<String>,
    alive: Arc<AtomicBool>,
}

impl MeshVertexData {
    pub fn new(kind: MeshKind, lods: Vec<LodBuffers>) -> Result<Self, MeshDataError> {
        if lods.is_empty() {
            return Err(MeshDataError::NoLods);
        }
        for lod in lods.iter() {
            lod.validate()?;
        }

        Ok(Self {
            kind,
            lods,
            bone_names: Vec::new(),
            alive: Arc::new(AtomicBool::new(true)),
        })
    }

    /// One LOD per mesh, highest resolution first.
    pub fn from_meshes(
        meshes: &[&Mesh],
        material: Option<MaterialId>,
    ) -> Result<Self, MeshDataError> {
        let lods = meshes
            .iter()
            .map(|mesh| LodBuffers::from_mesh(mesh, material))
            .collect::<Result<Vec<_>, _>>()?;

        let kind = if lods.iter().any(|lod| !lod.bones.is_empty()) {
            MeshKind::Skinned
        } else {
            MeshKind::Static
        };
        Self::new(kind, lods)
    }

    pub fn with_bone_names(mut self, names: Vec<String>) -> Self {
        self.bone_names = names;
        self
    }

    pub fn lod(&self, lod: usize) -> Option<&LodBuffers> {
        self.lods.get(lod)
    }

    pub fn lods(&self) -> &[LodBuffers] {
        &self.lods
    }

    pub(crate) fn set_colors(&mut self, lod: usize, colors: Vec<VertexColor>) -> bool {
        match self.lods.get_mut(lod) {
            Some(buffers) if buffers.colors.len() == colors.len() => {
                buffers.colors = colors;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn invalidate(&self) {
        self.alive.store(false, Ordering::Release);
    }

    /// Fresh liveness flag, detaching this data from snapshots taken before.
    pub(crate) fn revive(&mut self) {
        self.alive = Arc::new(AtomicBool::new(true));
    }
}

impl VertexDataProvider for MeshVertexData {
    fn kind(&self) -> MeshKind {
        self.kind
    }

    fn lod_count(&self) -> usize {
        self.lods.len()
    }

    fn vertex_count(&self, lod: usize) -> usize {
        self.lods.get(lod).map_or(0, LodBuffers::vertex_count)
    }

    fn sections(&self, lod: usize) -> &[MeshSection] {
        self.lods.get(lod).map(|l| l.sections.as_slice()).unwrap_or(&[])
    }

    fn positions(&self, lod: usize) -> &[Vec3] {
        self.lods.get(lod).map(|l| l.positions.as_slice()).unwrap_or(&[])
    }

    fn normals(&self, lod: usize) -> &[Vec3] {
        self.lods.get(lod).map(|l| l.normals.as_slice()).unwrap_or(&[])
    }

    fn bones(&self, lod: usize) -> &[Option<BoneInfluence>] {
        self.lods.get(lod).map(|l| l.bones.as_slice()).unwrap_or(&[])
    }

    fn bone_names(&self) -> &[String] {
        &self.bone_names
    }

    fn color_buffer(&self, lod: usize) -> Vec<VertexColor> {
        self.lods
            .get(lod)
            .map(|l| l.colors.clone())
            .unwrap_or_default()
    }

    fn is_still_valid(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }
}


/// Writes colors into `Mesh::ATTRIBUTE_COLOR` as linear floats.
pub fn write_colors_to_mesh(mesh: &mut Mesh, colors: &[VertexColor]) {
    let values: Vec<[f32; 4]> = colors
        .iter()
        .map(|color| color.map(channel_to_unit))
        .collect();
    mesh.insert_attribute(Mesh::ATTRIBUTE_COLOR, values);
}
