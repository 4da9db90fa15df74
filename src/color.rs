use std::ops::{Index, IndexMut};

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::EnumIter;


/// Four 8-bit channels, stored in RGBA order.
pub type VertexColor = [u8; 4];

pub const CHANNEL_MAX: f32 = 255.0;


#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    Reflect,
    Serialize,
    Deserialize,
)]
pub enum Channel {
    Red,
    Green,
    Blue,
    Alpha,
}

impl Channel {
    pub fn index(self) -> usize {
        match self {
            Channel::Red => 0,
            Channel::Green => 1,
            Channel::Blue => 2,
            Channel::Alpha => 3,
        }
    }
}


/// One value per color channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PerChannel<T> {
    pub red: T,
    pub green: T,
    pub blue: T,
    pub alpha: T,
}

impl<T> PerChannel<T> {
    pub fn from_fn(mut f: impl FnMut(Channel) -> T) -> Self {
        Self {
            red: f(Channel::Red),
            green: f(Channel::Green),
            blue: f(Channel::Blue),
            alpha: f(Channel::Alpha),
        }
    }

    pub fn splat(value: T) -> Self
    where
        T: Clone,
    {
        Self {
            red: value.clone(),
            green: value.clone(),
            blue: value.clone(),
            alpha: value,
        }
    }

    pub fn get(&self, channel: Channel) -> &T {
        match channel {
            Channel::Red => &self.red,
            Channel::Green => &self.green,
            Channel::Blue => &self.blue,
            Channel::Alpha => &self.alpha,
        }
    }

    pub fn get_mut(&mut self, channel: Channel) -> &mut T {
        match channel {
            Channel::Red => &mut self.red,
            Channel::Green => &mut self.green,
            Channel::Blue => &mut self.blue,
            Channel::Alpha => &mut self.alpha,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Channel, &T)> {
        Channel::iter().map(move |channel| (channel, self.get(channel)))
    }

    pub fn map<U>(self, mut f: impl FnMut(Channel, T) -> U) -> PerChannel<U> {
        PerChannel {
            red: f(Channel::Red, self.red),
            green: f(Channel::Green, self.green),
            blue: f(Channel::Blue, self.blue),
            alpha: f(Channel::Alpha, self.alpha),
        }
    }
}

impl<T> Index<Channel> for PerChannel<T> {
    type Output = T;

    fn index(&self, channel: Channel) -> &T {
        self.get(channel)
    }
}

impl<T> IndexMut<Channel> for PerChannel<T> {
    fn index_mut(&mut self, channel: Channel) -> &mut T {
        self.get_mut(channel)
    }
}


pub fn channel_to_unit(value: u8) -> f32 {
    value as f32 / CHANNEL_MAX
}

pub fn unit_to_channel(value: f32) -> u8 {
    round_channel(value * CHANNEL_MAX)
}

/// Rounds to the nearest integer channel value and clamps into [0, 255].
pub fn round_channel(value: f32) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.round().clamp(0.0, CHANNEL_MAX) as u8
}

pub fn to_linear(color: VertexColor) -> LinearRgba {
    LinearRgba::new(
        channel_to_unit(color[0]),
        channel_to_unit(color[1]),
        channel_to_unit(color[2]),
        channel_to_unit(color[3]),
    )
}

pub fn from_linear(color: LinearRgba) -> VertexColor {
    [
        unit_to_channel(color.red),
        unit_to_channel(color.green),
        unit_to_channel(color.blue),
        unit_to_channel(color.alpha),
    ]
}
