use serde::{Deserialize, Serialize};

use crate::{
    color::PerChannel,
    registry::PhysicsSurface,
    settings::condition::{Condition, ConditionSet},
};


#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplyMode {
    #[default]
    Add,
    Set,
}


/// How a channel value changes. Amounts are normalized, `Add(1.0)` adds 255.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum ApplyRule {
    Add(f32),
    Set(f32),
    LerpToTarget { target: f32, strength: f32 },
}

impl Default for ApplyRule {
    fn default() -> Self {
        ApplyRule::Add(0.0)
    }
}

impl ApplyRule {
    pub fn from_mode(mode: ApplyMode, amount: f32) -> Self {
        match mode {
            ApplyMode::Add => ApplyRule::Add(amount),
            ApplyMode::Set => ApplyRule::Set(amount),
        }
    }

    /// Rules that can never alter a channel.
    pub fn is_noop(&self) -> bool {
        match *self {
            ApplyRule::Add(amount) => amount == 0.0,
            ApplyRule::Set(_) => false,
            ApplyRule::LerpToTarget { strength, .. } => strength <= 0.0,
        }
    }
}


/// Per-channel ceiling, normalized to [0, 1].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PaintLimit {
    pub enabled: bool,
    pub ceiling: f32,
    pub clamp_if_already_over: bool,
}

impl Default for PaintLimit {
    fn default() -> Self {
        Self {
            enabled: false,
            ceiling: 1.0,
            clamp_if_already_over: false,
        }
    }
}

impl PaintLimit {
    pub fn ceiling(ceiling: f32) -> Self {
        Self {
            enabled: true,
            ceiling: ceiling.clamp(0.0, 1.0),
            clamp_if_already_over: false,
        }
    }

    pub fn clamping(mut self) -> Self {
        self.clamp_if_already_over = true;
        self
    }
}


#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChannelPaint {
    pub rule: ApplyRule,
    pub conditions: ConditionSet,
    pub limit: PaintLimit,
}

impl ChannelPaint {
    pub fn add(amount: f32) -> Self {
        Self {
            rule: ApplyRule::Add(amount),
            ..Default::default()
        }
    }

    pub fn set(amount: f32) -> Self {
        Self {
            rule: ApplyRule::Set(amount),
            ..Default::default()
        }
    }

    pub fn lerp(target: f32, strength: f32) -> Self {
        Self {
            rule: ApplyRule::LerpToTarget { target, strength },
            ..Default::default()
        }
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn with_limit(mut self, limit: PaintLimit) -> Self {
        self.limit = limit;
        self
    }
}


#[derive(Clone, Debug, PartialEq)]
pub struct SurfacePaint {
    pub surface: PhysicsSurface,
    pub rule: ApplyRule,
    pub conditions: ConditionSet,
}

impl SurfacePaint {
    pub fn new(surface: impl Into<PhysicsSurface>, rule: ApplyRule) -> Self {
        Self {
            surface: surface.into(),
            rule,
            conditions: ConditionSet::default(),
        }
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }
}


/// Paints whichever channels carry the requested surfaces on each section's material.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PhysicsSurfacePaint {
    pub surfaces: Vec<SurfacePaint>,
    pub include_surface_family: bool,
    /// Rule for channels that carry none of the requested surfaces.
    pub other_channels: ApplyRule,
    pub limits: PerChannel<PaintLimit>,
}

impl PhysicsSurfacePaint {
    pub fn new(surfaces: Vec<SurfacePaint>) -> Self {
        Self {
            surfaces,
            ..Default::default()
        }
    }

    pub fn with_surface_family(mut self) -> Self {
        self.include_surface_family = true;
        self
    }

    pub fn with_other_channels(mut self, rule: ApplyRule) -> Self {
        self.other_channels = rule;
        self
    }

    pub fn with_limits(mut self, limits: PerChannel<PaintLimit>) -> Self {
        self.limits = limits;
        self
    }
}


#[derive(Clone, Debug, PartialEq)]
pub enum ColorApplication {
    Channels(PerChannel<ChannelPaint>),
    PhysicsSurface(PhysicsSurfacePaint),
}

impl Default for ColorApplication {
    fn default() -> Self {
        ColorApplication::Channels(PerChannel::default())
    }
}

impl ColorApplication {
    pub fn channels(channels: PerChannel<ChannelPaint>) -> Self {
        ColorApplication::Channels(channels)
    }

    /// Same rule on every channel.
    pub fn uniform(paint: ChannelPaint) -> Self {
        ColorApplication::Channels(PerChannel::splat(paint))
    }

    pub fn red(paint: ChannelPaint) -> Self {
        ColorApplication::Channels(PerChannel {
            red: paint,
            ..Default::default()
        })
    }

    pub fn green(paint: ChannelPaint) -> Self {
        ColorApplication::Channels(PerChannel {
            green: paint,
            ..Default::default()
        })
    }

    pub fn blue(paint: ChannelPaint) -> Self {
        ColorApplication::Channels(PerChannel {
            blue: paint,
            ..Default::default()
        })
    }

    pub fn alpha(paint: ChannelPaint) -> Self {
        ColorApplication::Channels(PerChannel {
            alpha: paint,
            ..Default::default()
        })
    }

    pub fn is_physics_surface(&self) -> bool {
        matches!(self, ColorApplication::PhysicsSurface(_))
    }
}
