use strum::IntoEnumIterator;

use crate::{
    color::{round_channel, Channel, PerChannel, VertexColor, CHANNEL_MAX},
    condition::{evaluate, ConditionContext},
    registry::{MaterialId, SurfaceRegistry},
    settings::{
        ApplyRule,
        ColorApplication,
        ColorOverrideHook,
        ConditionSet,
        FalloffSample,
        PaintLimit,
    },
    vertex::VertexRecord,
};


#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PlannedChannel<'a> {
    pub rule: ApplyRule,
    pub conditions: Option<&'a ConditionSet>,
    pub limit: PaintLimit,
}


/// Effective rule of every channel for one section, resolved once per section.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ChannelPlan<'a> {
    pub channels: PerChannel<PlannedChannel<'a>>,
}

impl<'a> ChannelPlan<'a> {
    pub fn for_section(
        application: &'a ColorApplication,
        material: Option<MaterialId>,
        registry: &dyn SurfaceRegistry,
    ) -> Self {
        let channels = match application {
            ColorApplication::Channels(channels) => PerChannel::from_fn(|channel| {
                let paint = &channels[channel];
                PlannedChannel {
                    rule: paint.rule,
                    conditions: Some(&paint.conditions),
                    limit: paint.limit,
                }
            }),
            ColorApplication::PhysicsSurface(surfaces) => {
                let registered = material
                    .map(|material| registry.registered_surfaces(material))
                    .unwrap_or_default();

                PerChannel::from_fn(|channel| {
                    let requested = registered[channel].as_ref().and_then(|surface| {
                        surfaces.surfaces.iter().find(|paint| {
                            registry.surfaces_match(
                                surface,
                                &paint.surface,
                                surfaces.include_surface_family,
                            )
                        })
                    });

                    match requested {
                        Some(paint) => PlannedChannel {
                            rule: paint.rule,
                            conditions: Some(&paint.conditions),
                            limit: surfaces.limits[channel],
                        },
                        None => PlannedChannel {
                            rule: surfaces.other_channels,
                            conditions: None,
                            limit: surfaces.limits[channel],
                        },
                    }
                })
            }
        };

        Self { channels }
    }

    /// Whether any vertex of the section could change under this plan.
    pub fn contributes(&self) -> bool {
        self.channels.iter().any(|(_, planned)| {
            !planned.rule.is_noop()
                || planned
                    .conditions
                    .is_some_and(ConditionSet::has_active_fallback)
        })
    }
}


#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Resolved {
    pub color: VertexColor,
    pub changed: bool,
}


pub fn resolve(
    vertex: &VertexRecord,
    plan: &ChannelPlan,
    falloff: FalloffSample,
    ctx: &ConditionContext,
    color_override: Option<&ColorOverrideHook>,
) -> Resolved {
    let mut color = vertex.color;

    for channel in Channel::iter() {
        let planned = &plan.channels[channel];
        let rule = match planned.conditions.filter(|conditions| !conditions.is_empty()) {
            Some(conditions) => {
                let outcome = evaluate(vertex, conditions, ctx);
                if outcome.passed {
                    planned.rule
                } else {
                    ApplyRule::from_mode(outcome.fallback_mode, outcome.fallback_strength)
                }
            }
            None => planned.rule,
        };

        let i = channel.index();
        color[i] = resolve_channel(vertex.color[i], rule, falloff, planned.limit);
    }

    if let Some(hook) = color_override {
        if let Some(overridden) = (hook.0)(vertex, color) {
            color = overridden;
        }
    }

    Resolved {
        color,
        changed: color != vertex.color,
    }
}


/// Applies one rule to one channel byte.
pub fn resolve_channel(
    current: u8,
    rule: ApplyRule,
    falloff: FalloffSample,
    limit: PaintLimit,
) -> u8 {
    if rule.is_noop() {
        return current;
    }

    let value = current as f32;
    let proposed = match rule {
        ApplyRule::Add(amount) => {
            add_with_edge_limit(value, amount * CHANNEL_MAX * falloff.factor, falloff.edge_limit)
        }
        ApplyRule::Set(amount) => amount.clamp(0.0, 1.0) * CHANNEL_MAX,
        ApplyRule::LerpToTarget { target, strength } => {
            let t = (strength * falloff.factor).clamp(0.0, 1.0);
            value + (target.clamp(0.0, 1.0) * CHANNEL_MAX - value) * t
        }
    };

    round_channel(apply_limit(value, proposed, limit))
}

fn add_with_edge_limit(value: f32, delta: f32, edge_limit: Option<f32>) -> f32 {
    let Some(factor) = edge_limit else {
        return value + delta;
    };

    if delta > 0.0 {
        let bound = CHANNEL_MAX * factor;
        if value >= bound {
            value
        } else {
            (value + delta).min(bound)
        }
    } else if delta < 0.0 {
        let floor = CHANNEL_MAX * (1.0 - factor);
        if value <= floor {
            value
        } else {
            (value + delta).max(floor)
        }
    } else {
        value
    }
}

fn apply_limit(value: f32, proposed: f32, limit: PaintLimit) -> f32 {
    if !limit.enabled {
        return proposed;
    }

    let ceiling = round_channel(limit.ceiling.clamp(0.0, 1.0) * CHANNEL_MAX) as f32;
    if value > ceiling && !limit.clamp_if_already_over {
        proposed.min(value)
    } else {
        proposed.min(ceiling)
    }
}
