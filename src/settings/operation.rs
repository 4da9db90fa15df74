use std::{fmt, sync::Arc};

use bevy::prelude::*;

use crate::{
    color::VertexColor,
    condition::LineOfSightTracer,
    queue::TaskCategory,
    settings::{apply::ColorApplication, area::PaintArea, falloff::FalloffSettings},
    snippet::ColorSnippet,
    vertex::VertexRecord,
};


/// Random subset of vertices per LOD, each picked at most once.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RandomVertices {
    pub fraction: f32,
    pub seed: Option<u64>,
}

impl RandomVertices {
    pub fn new(fraction: f32) -> Self {
        Self {
            fraction: fraction.clamp(0.0, 1.0),
            seed: None,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}


#[derive(Clone, Debug, PartialEq)]
pub enum OperationKind {
    GetAll,
    DetectClosestVertex {
        location: Vec3,
        /// Restrict the search to one LOD0 section.
        section: Option<usize>,
        /// Stop scanning once a vertex this close is found.
        accept_within: Option<f32>,
    },
    DetectWithinArea {
        area: PaintArea,
    },
    PaintAtLocation {
        location: Vec3,
        radius: f32,
    },
    PaintWithinArea {
        area: PaintArea,
        /// Applied to vertices outside the area instead of leaving them untouched.
        outside_area: Option<ColorApplication>,
    },
    PaintEntireMesh {
        random: Option<RandomVertices>,
    },
    /// Colors per LOD; LODs without an entry are left alone.
    SetDirectly {
        lods: Vec<Vec<VertexColor>>,
    },
    SetFromSerialized {
        serialized: String,
    },
    PaintColorSnippet {
        snippet: ColorSnippet,
    },
}

impl OperationKind {
    pub fn category(&self) -> TaskCategory {
        match self {
            OperationKind::GetAll
            | OperationKind::DetectClosestVertex { .. }
            | OperationKind::DetectWithinArea { .. } => TaskCategory::Detect,
            _ => TaskCategory::Paint,
        }
    }

    /// Whole-buffer replacements make earlier queued paint redundant.
    pub fn supersedes_by_default(&self) -> bool {
        matches!(
            self,
            OperationKind::SetDirectly { .. }
                | OperationKind::SetFromSerialized { .. }
                | OperationKind::PaintColorSnippet { .. }
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            OperationKind::GetAll => "get_all",
            OperationKind::DetectClosestVertex { .. } => "detect_closest_vertex",
            OperationKind::DetectWithinArea { .. } => "detect_within_area",
            OperationKind::PaintAtLocation { .. } => "paint_at_location",
            OperationKind::PaintWithinArea { .. } => "paint_within_area",
            OperationKind::PaintEntireMesh { .. } => "paint_entire_mesh",
            OperationKind::SetDirectly { .. } => "set_directly",
            OperationKind::SetFromSerialized { .. } => "set_from_serialized",
            OperationKind::PaintColorSnippet { .. } => "paint_color_snippet",
        }
    }
}


#[derive(Clone, Debug, PartialEq)]
pub struct PropagationSettings {
    /// Candidates this much farther than the nearest LOD0 vertex still compete on normal alignment.
    pub normal_grace_distance: f32,
    pub use_normal_similarity: bool,
    /// Average LOD0 vertices per grid cell.
    pub vertices_per_cell: usize,
}

impl Default for PropagationSettings {
    fn default() -> Self {
        Self {
            normal_grace_distance: 0.01,
            use_normal_similarity: true,
            vertices_per_cell: 8,
        }
    }
}


#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LodSelection {
    None,
    #[default]
    Lod0,
    All,
}

impl LodSelection {
    pub fn includes(&self, lod: usize) -> bool {
        match self {
            LodSelection::None => false,
            LodSelection::Lod0 => lod == 0,
            LodSelection::All => true,
        }
    }
}


/// Shapes the result handed to the completion callback.
#[derive(Clone, Debug, PartialEq)]
pub struct CallbackSettings {
    pub include_colors: LodSelection,
    pub include_positions: LodSelection,
    pub include_normals: LodSelection,
    pub include_visited_indices: bool,
    pub include_serialized: bool,
}

impl Default for CallbackSettings {
    fn default() -> Self {
        Self {
            include_colors: LodSelection::Lod0,
            include_positions: LodSelection::None,
            include_normals: LodSelection::None,
            include_visited_indices: false,
            include_serialized: false,
        }
    }
}


#[derive(Clone, Debug, Default, PartialEq)]
pub struct DebugSettings {
    pub log_summary: bool,
    pub log_skipped_sections: bool,
}


pub struct LineOfSightHook(pub Arc<dyn LineOfSightTracer>);

impl Clone for LineOfSightHook {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl fmt::Debug for LineOfSightHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LineOfSightHook")
    }
}


pub type ColorOverrideFn = dyn Fn(&VertexRecord, VertexColor) -> Option<VertexColor> + Send + Sync;

/// Replaces a computed color when it returns `Some`.
pub struct ColorOverrideHook(pub Arc<ColorOverrideFn>);

impl Clone for ColorOverrideHook {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl fmt::Debug for ColorOverrideHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ColorOverrideHook")
    }
}


#[derive(Clone, Debug, Default)]
pub struct FundamentalSettings {
    /// Component-to-world transform of the target mesh.
    pub component_transform: Transform,
    pub callback: CallbackSettings,
    pub debug: DebugSettings,
    pub line_of_sight: Option<LineOfSightHook>,
}


/// Immutable description of one paint or detect operation.
#[derive(Clone, Debug)]
pub struct OperationDescriptor {
    pub kind: OperationKind,
    pub colors: ColorApplication,
    pub falloff: Option<FalloffSettings>,
    pub propagate_to_lods: bool,
    pub propagation: PropagationSettings,
    /// Number of LODs to visit, all when `None`.
    pub lods_to_process: Option<usize>,
    /// Colors applied before the operation itself runs.
    pub initial_colors: Option<ColorSnippet>,
    pub supersedes_queued: bool,
    pub fundamental: FundamentalSettings,
    pub color_override: Option<ColorOverrideHook>,
}

impl OperationDescriptor {
    pub fn new(kind: OperationKind) -> Self {
        Self {
            supersedes_queued: kind.supersedes_by_default(),
            kind,
            colors: ColorApplication::default(),
            falloff: None,
            propagate_to_lods: false,
            propagation: PropagationSettings::default(),
            lods_to_process: None,
            initial_colors: None,
            fundamental: FundamentalSettings::default(),
            color_override: None,
        }
    }

    pub fn get_all() -> Self {
        Self::new(OperationKind::GetAll)
    }

    pub fn detect_closest_vertex(location: Vec3) -> Self {
        Self::new(OperationKind::DetectClosestVertex {
            location,
            section: None,
            accept_within: None,
        })
    }

    pub fn detect_within_area(area: PaintArea) -> Self {
        Self::new(OperationKind::DetectWithinArea { area })
    }

    pub fn paint_at_location(location: Vec3, radius: f32) -> Self {
        Self::new(OperationKind::PaintAtLocation { location, radius })
    }

    pub fn paint_within_area(area: PaintArea) -> Self {
        Self::new(OperationKind::PaintWithinArea {
            area,
            outside_area: None,
        })
    }

    pub fn paint_entire_mesh() -> Self {
        Self::new(OperationKind::PaintEntireMesh { random: None })
    }

    pub fn paint_random_vertices(random: RandomVertices) -> Self {
        Self::new(OperationKind::PaintEntireMesh {
            random: Some(random),
        })
    }

    pub fn set_directly(lods: Vec<Vec<VertexColor>>) -> Self {
        Self::new(OperationKind::SetDirectly { lods })
    }

    pub fn set_from_serialized(serialized: impl Into<String>) -> Self {
        Self::new(OperationKind::SetFromSerialized {
            serialized: serialized.into(),
        })
    }

    pub fn paint_color_snippet(snippet: ColorSnippet) -> Self {
        Self::new(OperationKind::PaintColorSnippet { snippet })
    }

    pub fn category(&self) -> TaskCategory {
        self.kind.category()
    }

    pub fn with_colors(mut self, colors: ColorApplication) -> Self {
        self.colors = colors;
        self
    }

    pub fn with_falloff(mut self, falloff: FalloffSettings) -> Self {
        self.falloff = Some(falloff);
        self
    }

    pub fn with_propagation(mut self, propagate: bool) -> Self {
        self.propagate_to_lods = propagate;
        self
    }

    pub fn with_propagation_settings(mut self, settings: PropagationSettings) -> Self {
        self.propagation = settings;
        self
    }

    pub fn with_lods_to_process(mut self, lods: usize) -> Self {
        self.lods_to_process = Some(lods.max(1));
        self
    }

    pub fn with_initial_colors(mut self, snippet: ColorSnippet) -> Self {
        self.initial_colors = Some(snippet);
        self
    }

    pub fn superseding(mut self, supersedes: bool) -> Self {
        self.supersedes_queued = supersedes;
        self
    }

    pub fn with_component_transform(mut self, transform: Transform) -> Self {
        self.fundamental.component_transform = transform;
        self
    }

    pub fn with_callback(mut self, callback: CallbackSettings) -> Self {
        self.fundamental.callback = callback;
        self
    }

    pub fn with_debug(mut self, debug: DebugSettings) -> Self {
        self.fundamental.debug = debug;
        self
    }

    pub fn with_line_of_sight(mut self, tracer: impl LineOfSightTracer + 'static) -> Self {
        self.fundamental.line_of_sight = Some(LineOfSightHook(Arc::new(tracer)));
        self
    }

    pub fn with_color_override(
        mut self,
        hook: impl Fn(&VertexRecord, VertexColor) -> Option<VertexColor> + Send + Sync + 'static,
    ) -> Self {
        self.color_override = Some(ColorOverrideHook(Arc::new(hook)));
        self
    }

    /// Outside-of-area application; ignored by every kind except `PaintWithinArea`.
    pub fn with_outside_area(mut self, colors: ColorApplication) -> Self {
        if let OperationKind::PaintWithinArea { outside_area, .. } = &mut self.kind {
            *outside_area = Some(colors);
        }
        self
    }

    /// Early exit radius; ignored by every kind except `DetectClosestVertex`.
    pub fn with_accept_within(mut self, distance: f32) -> Self {
        if let OperationKind::DetectClosestVertex { accept_within, .. } = &mut self.kind {
            *accept_within = Some(distance);
        }
        self
    }

    pub fn with_section(mut self, index: usize) -> Self {
        if let OperationKind::DetectClosestVertex { section, .. } = &mut self.kind {
            *section = Some(index);
        }
        self
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_and_default_supersede() {
        assert_eq!(OperationDescriptor::get_all().category(), TaskCategory::Detect);
        assert_eq!(
            OperationDescriptor::paint_entire_mesh().category(),
            TaskCategory::Paint
        );
        assert!(OperationDescriptor::set_directly(vec![]).supersedes_queued);
        assert!(!OperationDescriptor::paint_at_location(Vec3::ZERO, 1.0).supersedes_queued);
        assert!(
            !OperationDescriptor::set_from_serialized("")
                .superseding(false)
                .supersedes_queued
        );
    }

    #[test]
    fn kind_specific_builders_ignore_other_kinds() {
        let descriptor = OperationDescriptor::paint_entire_mesh().with_accept_within(1.0);
        assert_eq!(descriptor.kind, OperationKind::PaintEntireMesh { random: None });

        let descriptor = OperationDescriptor::detect_closest_vertex(Vec3::X)
            .with_accept_within(0.1)
            .with_section(2);
        assert_eq!(
            descriptor.kind,
            OperationKind::DetectClosestVertex {
                location: Vec3::X,
                section: Some(2),
                accept_within: Some(0.1),
            }
        );
    }

    #[test]
    fn lod_selection() {
        assert!(LodSelection::Lod0.includes(0));
        assert!(!LodSelection::Lod0.includes(1));
        assert!(LodSelection::All.includes(3));
        assert!(!LodSelection::None.includes(0));
    }
}
