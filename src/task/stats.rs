use std::collections::HashMap;

use bevy::prelude::*;
use strum::IntoEnumIterator;

use crate::{
    color::{channel_to_unit, to_linear, Channel, PerChannel, VertexColor},
    provider::BoneInfluence,
    registry::{ChannelSurfaces, PhysicsSurface},
};


/// How much of a channel is painted: vertices above zero, their share, and the mean value.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ChannelAmount {
    pub vertices: usize,
    pub percent: f32,
    pub average: f32,
}


#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoneColor {
    pub vertices: usize,
    pub average: LinearRgba,
}


#[derive(Clone, Debug, Default, PartialEq)]
pub struct WithinAreaStats {
    pub vertices_within_area: usize,
    pub channels: PerChannel<ChannelAmount>,
    pub surfaces: HashMap<PhysicsSurface, ChannelAmount>,
}


/// Aggregates over the final LOD0 colors.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PaintStats {
    pub vertex_count: usize,
    pub channels: PerChannel<ChannelAmount>,
    pub surfaces: HashMap<PhysicsSurface, ChannelAmount>,
    pub within_area: Option<WithinAreaStats>,
    pub bones: HashMap<String, BoneColor>,
}

impl PaintStats {
    pub fn channel(&self, channel: Channel) -> ChannelAmount {
        self.channels[channel]
    }

    pub fn surface(&self, surface: &str) -> Option<ChannelAmount> {
        self.surfaces.get(&PhysicsSurface::new(surface)).copied()
    }
}


#[derive(Clone, Copy, Debug, Default)]
struct Tally {
    total: usize,
    painted: usize,
    sum: f32,
}

impl Tally {
    fn add(&mut self, value: u8) {
        self.total += 1;
        if value > 0 {
            self.painted += 1;
        }
        self.sum += channel_to_unit(value);
    }

    fn amount(&self) -> ChannelAmount {
        if self.total == 0 {
            return ChannelAmount::default();
        }
        ChannelAmount {
            vertices: self.painted,
            percent: self.painted as f32 / self.total as f32 * 100.0,
            average: self.sum / self.total as f32,
        }
    }
}


#[derive(Default)]
struct RegionTally {
    vertices: usize,
    channels: PerChannel<Tally>,
    surfaces: HashMap<PhysicsSurface, Tally>,
}

impl RegionTally {
    fn add(&mut self, color: VertexColor, surfaces: &ChannelSurfaces) {
        self.vertices += 1;
        for channel in Channel::iter() {
            let value = color[channel.index()];
            self.channels[channel].add(value);
            if let Some(surface) = &surfaces[channel] {
                self.surfaces.entry(surface.clone()).or_default().add(value);
            }
        }
    }

    fn channels(&self) -> PerChannel<ChannelAmount> {
        PerChannel::from_fn(|channel| self.channels[channel].amount())
    }

    fn surfaces(&self) -> HashMap<PhysicsSurface, ChannelAmount> {
        self.surfaces
            .iter()
            .map(|(surface, tally)| (surface.clone(), tally.amount()))
            .collect()
    }
}


#[derive(Default)]
pub(crate) struct StatsAccumulator {
    all: RegionTally,
    within: Option<RegionTally>,
    bones: HashMap<usize, (usize, Vec4)>,
}

impl StatsAccumulator {
    pub fn new(tracks_area: bool) -> Self {
        Self {
            within: tracks_area.then(RegionTally::default),
            ..Default::default()
        }
    }

    pub fn add(
        &mut self,
        color: VertexColor,
        surfaces: &ChannelSurfaces,
        within_area: bool,
        bone: Option<BoneInfluence>,
    ) {
        self.all.add(color, surfaces);
        if within_area {
            if let Some(within) = self.within.as_mut() {
                within.add(color, surfaces);
            }
        }
        if let Some(bone) = bone {
            let entry = self.bones.entry(bone.bone).or_insert((0, Vec4::ZERO));
            entry.0 += 1;
            entry.1 += to_linear(color).to_vec4();
        }
    }

    pub fn finish(self, bone_names: &[String]) -> PaintStats {
        let bones = self
            .bones
            .into_iter()
            .map(|(bone, (vertices, sum))| {
                let name = bone_names
                    .get(bone)
                    .cloned()
                    .unwrap_or_else(|| format!("bone_{bone}"));
                let average = LinearRgba::from_vec4(sum / vertices.max(1) as f32);
                (name, BoneColor { vertices, average })
            })
            .collect();

        PaintStats {
            vertex_count: self.all.vertices,
            channels: self.all.channels(),
            surfaces: self.all.surfaces(),
            within_area: self.within.map(|within| WithinAreaStats {
                vertices_within_area: within.vertices,
                channels: within.channels(),
                surfaces: within.surfaces(),
            }),
            bones,
        }
    }
}
