use bevy::prelude::*;

use crate::{
    color::{to_linear, VertexColor},
    provider::{BoneInfluence, VertexDataProvider},
    registry::MaterialId,
};


/// Attributes of one vertex visit. Built per vertex and dropped after it is resolved.
#[derive(Clone, Debug, PartialEq)]
pub struct VertexRecord {
    pub lod: usize,
    pub index: usize,
    pub local_position: Vec3,
    pub position: Vec3,
    pub normal: Vec3,
    pub bone: Option<BoneInfluence>,
    pub section: usize,
    pub material: Option<MaterialId>,
    pub color: VertexColor,
}

impl VertexRecord {
    pub fn read(
        provider: &dyn VertexDataProvider,
        transform: &Transform,
        lod: usize,
        index: usize,
        section: usize,
        material: Option<MaterialId>,
        color: VertexColor,
    ) -> Self {
        let local_position = provider.position(lod, index);
        Self {
            lod,
            index,
            local_position,
            position: transform.transform_point(local_position),
            normal: (transform.rotation * provider.normal(lod, index)).normalize_or_zero(),
            bone: provider.bone(lod, index),
            section,
            material,
            color,
        }
    }

    pub fn linear(&self) -> LinearRgba {
        to_linear(self.color)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{LodBuffers, MeshKind, MeshVertexData};

    #[test]
    fn record_is_in_world_space() {
        let data = MeshVertexData::new(
            MeshKind::Static,
            vec![LodBuffers::new(vec![Vec3::X], vec![Vec3::X])],
        )
        .unwrap();
        let transform = Transform::from_xyz(0.0, 2.0, 0.0)
            .with_rotation(Quat::from_rotation_z(std::f32::consts::FRAC_PI_2));

        let record = VertexRecord::read(&data, &transform, 0, 0, 0, None, [255, 0, 0, 255]);
        assert_eq!(record.local_position, Vec3::X);
        assert!(record.position.distance(Vec3::new(0.0, 3.0, 0.0)) < 1e-5);
        assert!(record.normal.distance(Vec3::Y) < 1e-5);
        assert_eq!(record.linear(), LinearRgba::new(1.0, 0.0, 0.0, 1.0));
    }
}
