use std::collections::HashMap;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::color::{Channel, PerChannel};


#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Reflect,
    Serialize,
    Deserialize,
)]
pub struct MaterialId(pub u64);


/// Named surface classification (e.g. "wet", "sand") that a material can register on a channel.
#[derive(
    Clone,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Reflect,
    Serialize,
    Deserialize,
)]
pub struct PhysicsSurface(pub String);

impl PhysicsSurface {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PhysicsSurface {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}


/// Surfaces registered on each channel of a material; `None` when a channel carries nothing.
pub type ChannelSurfaces = PerChannel<Option<PhysicsSurface>>;


pub trait SurfaceRegistry: Send + Sync {
    fn registered_surfaces(&self, material: MaterialId) -> ChannelSurfaces;

    /// Parent surfaces of `surface`, nearest first.
    fn surface_family(&self, surface: &PhysicsSurface) -> Vec<PhysicsSurface>;

    fn material_parent(&self, material: MaterialId) -> Option<MaterialId>;

    /// Whether `registered` satisfies a request for `requested`.
    fn surfaces_match(
        &self,
        registered: &PhysicsSurface,
        requested: &PhysicsSurface,
        include_family: bool,
    ) -> bool {
        if registered == requested {
            return true;
        }
        if !include_family {
            return false;
        }

        self.surface_family(registered).contains(requested)
            || self.surface_family(requested).contains(registered)
    }
}


#[derive(Resource, Clone, Debug, Default)]
pub struct PhysicsSurfaceRegistry {
    materials: HashMap<MaterialId, ChannelSurfaces>,
    families: HashMap<PhysicsSurface, Vec<PhysicsSurface>>,
    parents: HashMap<MaterialId, MaterialId>,
}

impl PhysicsSurfaceRegistry {
    pub fn register_material(&mut self, material: MaterialId, surfaces: ChannelSurfaces) {
        self.materials.insert(material, surfaces);
    }

    pub fn register_channel(
        &mut self,
        material: MaterialId,
        channel: Channel,
        surface: impl Into<PhysicsSurface>,
    ) {
        let entry = self.materials.entry(material).or_default();
        entry[channel] = Some(surface.into());
    }

    pub fn register_family(
        &mut self,
        surface: impl Into<PhysicsSurface>,
        parents: impl IntoIterator<Item = PhysicsSurface>,
    ) {
        self.families
            .insert(surface.into(), parents.into_iter().collect());
    }

    pub fn set_material_parent(&mut self, material: MaterialId, parent: MaterialId) {
        if material != parent {
            self.parents.insert(material, parent);
        }
    }

    pub fn is_registered(&self, material: MaterialId) -> bool {
        self.materials.contains_key(&material)
    }
}

impl SurfaceRegistry for PhysicsSurfaceRegistry {
    fn registered_surfaces(&self, material: MaterialId) -> ChannelSurfaces {
        // material instances inherit the registration of the closest registered parent
        let mut current = Some(material);
        let mut hops = 0;
        while let Some(id) = current {
            if let Some(surfaces) = self.materials.get(&id) {
                return surfaces.clone();
            }
            current = self.parents.get(&id).copied();
            hops += 1;
            if hops > self.parents.len() {
                break;
            }
        }
        ChannelSurfaces::default()
    }

    fn surface_family(&self, surface: &PhysicsSurface) -> Vec<PhysicsSurface> {
        self.families.get(surface).cloned().unwrap_or_default()
    }

    fn material_parent(&self, material: MaterialId) -> Option<MaterialId> {
        self.parents.get(&material).copied()
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instances_inherit_parent_registration() {
        let mut registry = PhysicsSurfaceRegistry::default();
        registry.register_channel(MaterialId(1), Channel::Red, "wet");
        registry.set_material_parent(MaterialId(2), MaterialId(1));

        let surfaces = registry.registered_surfaces(MaterialId(2));
        assert_eq!(surfaces.red, Some(PhysicsSurface::from("wet")));
        assert_eq!(surfaces.green, None);
        assert_eq!(
            registry.registered_surfaces(MaterialId(3)),
            ChannelSurfaces::default()
        );
    }

    #[test]
    fn family_matching_is_opt_in() {
        let mut registry = PhysicsSurfaceRegistry::default();
        registry.register_family("mud", vec![PhysicsSurface::from("wet")]);

        let mud = PhysicsSurface::from("mud");
        let wet = PhysicsSurface::from("wet");
        assert!(!registry.surfaces_match(&mud, &wet, false));
        assert!(registry.surfaces_match(&mud, &wet, true));
        assert!(registry.surfaces_match(&wet, &mud, true));
    }

    #[test]
    fn parent_cycles_terminate() {
        let mut registry = PhysicsSurfaceRegistry::default();
        registry.set_material_parent(MaterialId(1), MaterialId(2));
        registry.set_material_parent(MaterialId(2), MaterialId(1));
        assert_eq!(
            registry.registered_surfaces(MaterialId(1)),
            ChannelSurfaces::default()
        );
    }
}
