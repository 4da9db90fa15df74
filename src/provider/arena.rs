use std::sync::Arc;

use bevy::prelude::*;

use crate::{
    color::VertexColor,
    error::PaintTaskError,
    provider::{MeshVertexData, VertexDataProvider},
};


/// Opaque stable reference to a tracked mesh. Stale handles never resolve.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Reflect)]
pub struct MeshHandle {
    index: u32,
    generation: u32,
}

impl MeshHandle {
    pub fn index(&self) -> u32 {
        self.index
    }
}


#[derive(Default)]
struct MeshSlot {
    generation: u32,
    mesh: Option<Arc<MeshVertexData>>,
}


/// Arena of meshes that paint tasks may target.
#[derive(Resource, Default)]
pub struct PaintableMeshes {
    slots: Vec<MeshSlot>,
    free: Vec<u32>,
}

impl PaintableMeshes {
    pub fn insert(&mut self, mesh: MeshVertexData) -> MeshHandle {
        let mesh = Some(Arc::new(mesh));
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.mesh = mesh;
            return MeshHandle {
                index,
                generation: slot.generation,
            };
        }

        self.slots.push(MeshSlot {
            generation: 0,
            mesh,
        });
        MeshHandle {
            index: (self.slots.len() - 1) as u32,
            generation: 0,
        }
    }

    /// Stops tracking the mesh; in-flight tasks observe it as invalid.
    pub fn remove(&mut self, handle: MeshHandle) -> Option<Arc<MeshVertexData>> {
        let slot = self.slot_mut(handle)?;
        let mesh = slot.mesh.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        mesh.invalidate();
        self.free.push(handle.index);
        Some(mesh)
    }

    /// Swaps in new geometry under the same handle. Tasks reading the old geometry are invalidated.
    pub fn replace_geometry(&mut self, handle: MeshHandle, mut mesh: MeshVertexData) -> bool {
        let Some(slot) = self.slot_mut(handle) else {
            return false;
        };
        let Some(previous) = slot.mesh.as_ref() else {
            return false;
        };

        previous.invalidate();
        mesh.revive();
        slot.mesh = Some(Arc::new(mesh));
        true
    }

    pub fn get(&self, handle: MeshHandle) -> Option<&Arc<MeshVertexData>> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.mesh.as_ref())
    }

    pub fn contains(&self, handle: MeshHandle) -> bool {
        self.is_valid(handle)
    }

    pub fn is_valid(&self, handle: MeshHandle) -> bool {
        self.get(handle).is_some_and(|mesh| mesh.is_still_valid())
    }

    /// Snapshot for a worker thread.
    pub fn provider(&self, handle: MeshHandle) -> Option<Arc<dyn VertexDataProvider>> {
        self.get(handle)
            .filter(|mesh| mesh.is_still_valid())
            .map(|mesh| Arc::clone(mesh) as Arc<dyn VertexDataProvider>)
    }

    pub fn lod0_vertex_count(&self, handle: MeshHandle) -> Option<usize> {
        self.get(handle).map(|mesh| mesh.vertex_count(0))
    }

    /// Commits task colors; `None` entries leave that LOD untouched.
    pub fn commit_colors(
        &mut self,
        handle: MeshHandle,
        lods: Vec<Option<Vec<VertexColor>>>,
    ) -> Result<usize, PaintTaskError> {
        let slot = self
            .slot_mut(handle)
            .ok_or(PaintTaskError::InvalidWorldOrMesh)?;
        let mesh = slot.mesh.as_mut().ok_or(PaintTaskError::InvalidWorldOrMesh)?;
        if !mesh.is_still_valid() {
            return Err(PaintTaskError::InvalidWorldOrMesh);
        }

        for (lod, colors) in lods.iter().enumerate() {
            if let Some(colors) = colors {
                let expected = mesh.vertex_count(lod);
                if colors.len() != expected {
                    return Err(PaintTaskError::VertexCountMismatch {
                        lod,
                        buffer: "color",
                        expected,
                        found: colors.len(),
                    });
                }
            }
        }

        // snapshots still held by workers keep the previous buffers
        let data = Arc::make_mut(mesh);
        let mut committed = 0;
        for (lod, colors) in lods.into_iter().enumerate() {
            if let Some(colors) = colors {
                if data.set_colors(lod, colors) {
                    committed += 1;
                }
            }
        }
        Ok(committed)
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.mesh.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn handles(&self) -> impl Iterator<Item = MeshHandle> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.mesh.as_ref().map(|_| MeshHandle {
                index: index as u32,
                generation: slot.generation,
            })
        })
    }

    fn slot_mut(&mut self, handle: MeshHandle) -> Option<&mut MeshSlot> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
    }
}
