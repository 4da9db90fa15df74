use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use strum_macros::EnumIter;


/// Distance measure feeding the falloff ramp. Vertical variants measure along world Y.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, EnumIter, Serialize, Deserialize)]
pub enum FalloffKind {
    /// Distance from the base, smoothed.
    #[default]
    Spherical,
    /// Strongest at the rim, weakest at the base.
    Inward,
    /// Distance from the base, linear.
    Outward,
    /// Weakens above the base.
    GradientUpward,
    /// Weakens below the base.
    GradientDownward,
    /// Weakest at the base height, strongest away from it.
    InverseGradient,
}


/// Attenuation applied to a single vertex.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FalloffSample {
    pub factor: f32,
    /// Edge bound factor, present when edge limiting is on.
    pub edge_limit: Option<f32>,
}

impl FalloffSample {
    pub const NONE: FalloffSample = FalloffSample {
        factor: 1.0,
        edge_limit: None,
    };
}

impl Default for FalloffSample {
    fn default() -> Self {
        Self::NONE
    }
}


#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FalloffSettings {
    pub kind: FalloffKind,
    /// Distance over which the falloff ramps; defaults to the operation's own extent.
    pub range: Option<f32>,
    /// Reduction at the end of the ramp, in [0, 1].
    pub strength: f32,
    /// Fraction of the range painted at full strength before the ramp begins.
    pub start_at: f32,
    /// Caps accumulated paint at the falloff factor so a receding source never overshoots.
    pub limit_to_falloff: bool,
}

impl Default for FalloffSettings {
    fn default() -> Self {
        Self {
            kind: FalloffKind::Spherical,
            range: None,
            strength: 1.0,
            start_at: 0.0,
            limit_to_falloff: false,
        }
    }
}

impl FalloffSettings {
    pub fn new(kind: FalloffKind, strength: f32) -> Self {
        Self {
            kind,
            strength: strength.clamp(0.0, 1.0),
            ..Default::default()
        }
    }

    pub fn with_range(mut self, range: f32) -> Self {
        self.range = Some(range);
        self
    }

    pub fn with_start_at(mut self, start_at: f32) -> Self {
        self.start_at = start_at.clamp(0.0, 1.0);
        self
    }

    pub fn with_edge_limit(mut self) -> Self {
        self.limit_to_falloff = true;
        self
    }

    /// Factor at normalized distance `t` (0 at the base, 1 at the range end).
    pub fn factor(&self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        let ramp = if t <= self.start_at {
            0.0
        } else if self.start_at >= 1.0 {
            1.0
        } else {
            (t - self.start_at) / (1.0 - self.start_at)
        };

        let ramp = match self.kind {
            FalloffKind::Spherical => ramp * ramp * (3.0 - 2.0 * ramp),
            _ => ramp,
        };

        (1.0 - self.strength.clamp(0.0, 1.0) * ramp).clamp(0.0, 1.0)
    }

    /// Normalized falloff distance of `position` from `base`.
    pub fn distance(&self, base: Vec3, position: Vec3, extent: f32) -> f32 {
        let range = self.range.unwrap_or(extent);
        if range <= f32::EPSILON {
            return 0.0;
        }

        let t = match self.kind {
            FalloffKind::Spherical | FalloffKind::Outward => base.distance(position) / range,
            FalloffKind::Inward => 1.0 - base.distance(position) / range,
            FalloffKind::GradientUpward => (position.y - base.y) / range,
            FalloffKind::GradientDownward => (base.y - position.y) / range,
            FalloffKind::InverseGradient => 1.0 - (position.y - base.y).abs() / range,
        };
        t.clamp(0.0, 1.0)
    }

    pub fn sample(&self, base: Vec3, position: Vec3, extent: f32) -> FalloffSample {
        let factor = self.factor(self.distance(base, position, extent));
        FalloffSample {
            factor,
            edge_limit: self.limit_to_falloff.then_some(factor),
        }
    }
}
