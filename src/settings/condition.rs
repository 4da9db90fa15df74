use bevy::prelude::*;

use crate::{color::Channel, registry::MaterialId, settings::apply::ApplyMode};


#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum HeightComparison {
    #[default]
    Above,
    Below,
}


/// Rule applied to a channel in place of its own when a condition fails.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ConditionFallback {
    pub strength: f32,
    pub mode: ApplyMode,
}

impl ConditionFallback {
    pub fn add(strength: f32) -> Self {
        Self {
            strength,
            mode: ApplyMode::Add,
        }
    }

    pub fn set(strength: f32) -> Self {
        Self {
            strength,
            mode: ApplyMode::Set,
        }
    }
}


#[derive(Clone, Debug, PartialEq)]
pub enum ConditionKind {
    /// World normal aligned with `direction`.
    NormalDirection { direction: Vec3, min_dot: f32 },
    /// Vertex normal facing toward `location`.
    DirectionToLocation { location: Vec3, min_dot: f32 },
    /// Vertex normal facing away from `location`.
    DirectionFromLocation { location: Vec3, min_dot: f32 },
    /// World height compared against `threshold`.
    WorldHeight {
        threshold: f32,
        comparison: HeightComparison,
    },
    /// Current channel value inside `[min, max]`, normalized.
    ColorInRange { channel: Channel, min: f32, max: f32 },
    /// Dominant bone is `bone` with at least `min_weight`.
    Bone { bone: String, min_weight: f32 },
    Material {
        material: MaterialId,
        include_parents: bool,
    },
    /// Nothing blocks the segment from `from` to the vertex.
    LineOfSight { from: Vec3 },
}

impl ConditionKind {
    /// Evaluation order; cheaper checks run first and line of sight runs last.
    pub fn priority(&self) -> u8 {
        match self {
            ConditionKind::NormalDirection { .. } => 0,
            ConditionKind::DirectionToLocation { .. } => 1,
            ConditionKind::DirectionFromLocation { .. } => 2,
            ConditionKind::WorldHeight { .. } => 3,
            ConditionKind::ColorInRange { .. } => 4,
            ConditionKind::Bone { .. } => 5,
            ConditionKind::Material { .. } => 6,
            ConditionKind::LineOfSight { .. } => 7,
        }
    }
}


#[derive(Clone, Debug, PartialEq)]
pub struct Condition {
    pub kind: ConditionKind,
    pub fallback: ConditionFallback,
}

impl Condition {
    pub fn new(kind: ConditionKind) -> Self {
        Self {
            kind,
            fallback: ConditionFallback::default(),
        }
    }

    pub fn with_fallback(mut self, fallback: ConditionFallback) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn normal_direction(direction: Vec3, min_dot: f32) -> Self {
        Self::new(ConditionKind::NormalDirection { direction, min_dot })
    }

    pub fn above(threshold: f32) -> Self {
        Self::new(ConditionKind::WorldHeight {
            threshold,
            comparison: HeightComparison::Above,
        })
    }

    pub fn below(threshold: f32) -> Self {
        Self::new(ConditionKind::WorldHeight {
            threshold,
            comparison: HeightComparison::Below,
        })
    }

    pub fn color_in_range(channel: Channel, min: f32, max: f32) -> Self {
        Self::new(ConditionKind::ColorInRange { channel, min, max })
    }

    pub fn bone(bone: impl Into<String>, min_weight: f32) -> Self {
        Self::new(ConditionKind::Bone {
            bone: bone.into(),
            min_weight,
        })
    }

    pub fn material(material: MaterialId, include_parents: bool) -> Self {
        Self::new(ConditionKind::Material {
            material,
            include_parents,
        })
    }

    pub fn line_of_sight(from: Vec3) -> Self {
        Self::new(ConditionKind::LineOfSight { from })
    }
}


/// Conditions kept in evaluation order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConditionSet {
    conditions: Vec<Condition>,
}

impl ConditionSet {
    pub fn new(conditions: impl IntoIterator<Item = Condition>) -> Self {
        let mut set = Self::default();
        for condition in conditions {
            set.push(condition);
        }
        set
    }

    pub fn push(&mut self, condition: Condition) {
        let priority = condition.kind.priority();
        let at = self
            .conditions
            .partition_point(|existing| existing.kind.priority() <= priority);
        self.conditions.insert(at, condition);
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Condition> {
        self.conditions.iter()
    }

    /// Whether any fallback could still change a channel.
    pub fn has_active_fallback(&self) -> bool {
        self.conditions.iter().any(|condition| {
            condition.fallback.mode == ApplyMode::Set || condition.fallback.strength != 0.0
        })
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_orders_by_priority_and_keeps_insertion_order_within_ties() {
        let set = ConditionSet::new([
            Condition::line_of_sight(Vec3::ZERO),
            Condition::above(1.0),
            Condition::normal_direction(Vec3::Y, 0.5),
            Condition::below(3.0),
        ]);

        let priorities: Vec<u8> = set.iter().map(|c| c.kind.priority()).collect();
        assert_eq!(priorities, vec![0, 3, 3, 7]);
        assert!(matches!(
            set.iter().nth(1).map(|c| &c.kind),
            Some(ConditionKind::WorldHeight {
                comparison: HeightComparison::Above,
                ..
            })
        ));
    }

    #[test]
    fn default_fallback_is_inert() {
        let set = ConditionSet::new([Condition::above(0.0)]);
        assert!(!set.has_active_fallback());

        let set =
            ConditionSet::new([Condition::above(0.0).with_fallback(ConditionFallback::add(0.1))]);
        assert!(set.has_active_fallback());
    }
}
