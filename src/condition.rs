use bevy::prelude::*;

use crate::{
    color::channel_to_unit,
    registry::{MaterialId, SurfaceRegistry},
    settings::{ApplyMode, Condition, ConditionKind, ConditionSet, HeightComparison},
    vertex::VertexRecord,
};


/// Occlusion query between two world-space points.
pub trait LineOfSightTracer: Send + Sync {
    fn is_blocked(&self, from: Vec3, to: Vec3) -> bool;
}


/// Collaborators shared by every condition evaluation of a task.
#[derive(Clone, Copy)]
pub struct ConditionContext<'a> {
    pub registry: &'a dyn SurfaceRegistry,
    pub tracer: Option<&'a dyn LineOfSightTracer>,
    pub bone_names: &'a [String],
}


#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConditionOutcome {
    pub passed: bool,
    pub fallback_strength: f32,
    pub fallback_mode: ApplyMode,
}

impl ConditionOutcome {
    pub const PASSED: ConditionOutcome = ConditionOutcome {
        passed: true,
        fallback_strength: 0.0,
        fallback_mode: ApplyMode::Add,
    };
}


/// Evaluates in priority order and returns the fallback of the first failing condition.
pub fn evaluate(
    vertex: &VertexRecord,
    conditions: &ConditionSet,
    ctx: &ConditionContext,
) -> ConditionOutcome {
    conditions
        .iter()
        .find(|condition| !passes(vertex, condition, ctx))
        .map_or(ConditionOutcome::PASSED, |failed| ConditionOutcome {
            passed: false,
            fallback_strength: failed.fallback.strength,
            fallback_mode: failed.fallback.mode,
        })
}

fn passes(vertex: &VertexRecord, condition: &Condition, ctx: &ConditionContext) -> bool {
    match &condition.kind {
        ConditionKind::NormalDirection { direction, min_dot } => {
            vertex.normal.dot(direction.normalize_or_zero()) >= *min_dot
        }
        ConditionKind::DirectionToLocation { location, min_dot } => {
            let toward = (*location - vertex.position).normalize_or_zero();
            vertex.normal.dot(toward) >= *min_dot
        }
        ConditionKind::DirectionFromLocation { location, min_dot } => {
            let away = (vertex.position - *location).normalize_or_zero();
            vertex.normal.dot(away) >= *min_dot
        }
        ConditionKind::WorldHeight {
            threshold,
            comparison,
        } => match comparison {
            HeightComparison::Above => vertex.position.y >= *threshold,
            HeightComparison::Below => vertex.position.y <= *threshold,
        },
        ConditionKind::ColorInRange { channel, min, max } => {
            let value = channel_to_unit(vertex.color[channel.index()]);
            value >= *min && value <= *max
        }
        ConditionKind::Bone { bone, min_weight } => vertex.bone.is_some_and(|influence| {
            influence.weight >= *min_weight
                && ctx
                    .bone_names
                    .get(influence.bone)
                    .is_some_and(|name| name == bone)
        }),
        ConditionKind::Material {
            material,
            include_parents,
        } => vertex.material.is_some_and(|own| {
            own == *material || (*include_parents && has_ancestor(ctx.registry, own, *material))
        }),
        ConditionKind::LineOfSight { from } => ctx
            .tracer
            .is_none_or(|tracer| !tracer.is_blocked(*from, vertex.position)),
    }
}

fn has_ancestor(
    registry: &dyn SurfaceRegistry,
    material: MaterialId,
    ancestor: MaterialId,
) -> bool {
    let mut current = registry.material_parent(material);
    // bounded walk; registries are not required to reject cycles
    for _ in 0..64 {
        match current {
            Some(parent) if parent == ancestor => return true,
            Some(parent) => current = registry.material_parent(parent),
            None => return false,
        }
    }
    false
}
