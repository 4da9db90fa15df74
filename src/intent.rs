use std::borrow::Cow;

use bevy::prelude::*;
use rand::{rngs::StdRng, SeedableRng};

use crate::{
    color::VertexColor,
    error::PaintTaskError,
    settings::{
        FalloffSample, FalloffSettings, OperationDescriptor, OperationKind, PaintArea,
        RandomVertices,
    },
    snippet::deserialize_lod_colors,
    vertex::VertexRecord,
};


/// What the task does with one visited vertex.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum VertexIntent {
    Skip,
    Observe { within_area: bool },
    Paint { falloff: FalloffSample, within_area: bool },
    PaintOutsideArea,
    Assign(VertexColor),
}


#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LodVisit {
    Visit,
    /// Keep the LOD's buffer as is.
    Untouched,
}


#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClosestQuery {
    pub location: Vec3,
    pub accept_within: Option<f32>,
}


/// Per-kind visiting behavior, chosen once per task.
pub trait VisitStrategy: Send {
    fn prepare_lod(
        &mut self,
        _lod: usize,
        _vertex_count: usize,
    ) -> Result<LodVisit, PaintTaskError> {
        Ok(LodVisit::Visit)
    }

    fn visits_section(&self, _lod: usize, _section: usize) -> bool {
        true
    }

    /// Sections are visited even when their plan cannot change a color.
    fn requires_full_scan(&self) -> bool {
        false
    }

    fn closest(&self) -> Option<ClosestQuery> {
        None
    }

    fn intent(&self, vertex: &VertexRecord) -> VertexIntent;
}


pub fn strategy_for(
    descriptor: &OperationDescriptor,
) -> Result<Box<dyn VisitStrategy + '_>, PaintTaskError> {
    let falloff = descriptor.falloff.as_ref();
    let strategy: Box<dyn VisitStrategy + '_> = match &descriptor.kind {
        OperationKind::GetAll => Box::new(ObserveAll),
        OperationKind::DetectClosestVertex {
            location,
            section,
            accept_within,
        } => Box::new(ClosestVertex {
            query: ClosestQuery {
                location: *location,
                accept_within: *accept_within,
            },
            section: *section,
        }),
        OperationKind::DetectWithinArea { area } => Box::new(ObserveArea { area }),
        OperationKind::PaintAtLocation { location, radius } => Box::new(PaintAtLocation {
            location: *location,
            radius: radius.max(0.0),
            falloff,
        }),
        OperationKind::PaintWithinArea { area, outside_area } => Box::new(PaintWithinArea {
            area,
            center: area.center(),
            extent: area.extent(),
            paint_outside: outside_area.is_some(),
            falloff,
        }),
        OperationKind::PaintEntireMesh { random } => Box::new(PaintEntireMesh {
            random: *random,
            selected: None,
        }),
        OperationKind::SetDirectly { lods } => Box::new(AssignColors {
            lods: Cow::Borrowed(lods.as_slice()),
            current: None,
        }),
        OperationKind::SetFromSerialized { serialized } => Box::new(AssignColors {
            lods: Cow::Owned(deserialize_lod_colors(serialized)?),
            current: None,
        }),
        OperationKind::PaintColorSnippet { snippet } => Box::new(AssignColors {
            lods: Cow::Borrowed(snippet.lods.as_slice()),
            current: None,
        }),
    };
    Ok(strategy)
}


struct ObserveAll;

impl VisitStrategy for ObserveAll {
    fn requires_full_scan(&self) -> bool {
        true
    }

    fn intent(&self, _vertex: &VertexRecord) -> VertexIntent {
        VertexIntent::Observe { within_area: false }
    }
}


struct ClosestVertex {
    query: ClosestQuery,
    section: Option<usize>,
}

impl VisitStrategy for ClosestVertex {
    fn prepare_lod(
        &mut self,
        lod: usize,
        _vertex_count: usize,
    ) -> Result<LodVisit, PaintTaskError> {
        Ok(if lod == 0 {
            LodVisit::Visit
        } else {
            LodVisit::Untouched
        })
    }

    fn visits_section(&self, _lod: usize, section: usize) -> bool {
        self.section.is_none_or(|wanted| wanted == section)
    }

    fn requires_full_scan(&self) -> bool {
        true
    }

    fn closest(&self) -> Option<ClosestQuery> {
        Some(self.query)
    }

    fn intent(&self, _vertex: &VertexRecord) -> VertexIntent {
        VertexIntent::Observe { within_area: false }
    }
}


struct ObserveArea<'a> {
    area: &'a PaintArea,
}

impl VisitStrategy for ObserveArea<'_> {
    fn requires_full_scan(&self) -> bool {
        true
    }

    fn intent(&self, vertex: &VertexRecord) -> VertexIntent {
        VertexIntent::Observe {
            within_area: self.area.contains(vertex.position),
        }
    }
}


struct PaintAtLocation<'a> {
    location: Vec3,
    radius: f32,
    falloff: Option<&'a FalloffSettings>,
}

impl VisitStrategy for PaintAtLocation<'_> {
    fn intent(&self, vertex: &VertexRecord) -> VertexIntent {
        if vertex.position.distance(self.location) > self.radius {
            return VertexIntent::Skip;
        }

        VertexIntent::Paint {
            falloff: self.falloff.map_or(FalloffSample::NONE, |falloff| {
                falloff.sample(self.location, vertex.position, self.radius)
            }),
            within_area: true,
        }
    }
}


struct PaintWithinArea<'a> {
    area: &'a PaintArea,
    center: Vec3,
    extent: f32,
    paint_outside: bool,
    falloff: Option<&'a FalloffSettings>,
}

impl VisitStrategy for PaintWithinArea<'_> {
    fn requires_full_scan(&self) -> bool {
        true
    }

    fn intent(&self, vertex: &VertexRecord) -> VertexIntent {
        if self.area.contains(vertex.position) {
            VertexIntent::Paint {
                falloff: self.falloff.map_or(FalloffSample::NONE, |falloff| {
                    falloff.sample(self.center, vertex.position, self.extent)
                }),
                within_area: true,
            }
        } else if self.paint_outside {
            VertexIntent::PaintOutsideArea
        } else {
            VertexIntent::Skip
        }
    }
}


struct PaintEntireMesh {
    random: Option<RandomVertices>,
    selected: Option<Vec<bool>>,
}

impl VisitStrategy for PaintEntireMesh {
    fn prepare_lod(&mut self, lod: usize, vertex_count: usize) -> Result<LodVisit, PaintTaskError> {
        self.selected = self
            .random
            .map(|random| select_random_vertices(random, lod, vertex_count));
        Ok(LodVisit::Visit)
    }

    fn intent(&self, vertex: &VertexRecord) -> VertexIntent {
        let picked = self
            .selected
            .as_ref()
            .is_none_or(|selected| selected.get(vertex.index).copied().unwrap_or(false));

        if picked {
            VertexIntent::Paint {
                falloff: FalloffSample::NONE,
                within_area: false,
            }
        } else {
            VertexIntent::Skip
        }
    }
}

/// Distinct vertex picks; each LOD draws its own subset.
fn select_random_vertices(random: RandomVertices, lod: usize, vertex_count: usize) -> Vec<bool> {
    let amount = ((random.fraction.clamp(0.0, 1.0) * vertex_count as f32).round() as usize)
        .min(vertex_count);

    let mut rng = match random.seed {
        Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(lod as u64)),
        None => StdRng::from_entropy(),
    };

    let mut selected = vec![false; vertex_count];
    for index in rand::seq::index::sample(&mut rng, vertex_count, amount).iter() {
        selected[index] = true;
    }
    selected
}


struct AssignColors<'a> {
    lods: Cow<'a, [Vec<VertexColor>]>,
    current: Option<usize>,
}

impl VisitStrategy for AssignColors<'_> {
    fn prepare_lod(&mut self, lod: usize, vertex_count: usize) -> Result<LodVisit, PaintTaskError> {
        self.current = None;
        let Some(colors) = self.lods.get(lod).filter(|colors| !colors.is_empty()) else {
            return Ok(LodVisit::Untouched);
        };

        if colors.len() != vertex_count {
            return Err(PaintTaskError::VertexCountMismatch {
                lod,
                buffer: "assigned color",
                expected: vertex_count,
                found: colors.len(),
            });
        }

        self.current = Some(lod);
        Ok(LodVisit::Visit)
    }

    fn requires_full_scan(&self) -> bool {
        true
    }

    fn intent(&self, vertex: &VertexRecord) -> VertexIntent {
        self.current
            .and_then(|lod| self.lods.get(lod))
            .and_then(|colors| colors.get(vertex.index))
            .map_or(VertexIntent::Skip, |color| VertexIntent::Assign(*color))
    }
}
