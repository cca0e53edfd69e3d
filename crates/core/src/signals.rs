// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};

/// Analog levels at or above this read as HIGH.
pub const LOGIC_THRESHOLD: f64 = 0.5;

/// Electrical state of a pin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PinState {
    Digital(bool),
    /// Normalized level in `[0, 1]`.
    Analog(f64),
}

impl Default for PinState {
    fn default() -> Self {
        PinState::Digital(false)
    }
}

impl From<bool> for PinState {
    fn from(b: bool) -> Self {
        PinState::Digital(b)
    }
}

impl PinState {
    pub fn is_high(&self) -> bool {
        match *self {
            PinState::Digital(b) => b,
            PinState::Analog(v) => v >= LOGIC_THRESHOLD,
        }
    }

    pub fn level(&self) -> f64 {
        match *self {
            PinState::Digital(true) => 1.0,
            PinState::Digital(false) => 0.0,
            PinState::Analog(v) => v,
        }
    }

    /// Fixed-point code for an ADC with the given full-scale value.
    pub fn quantize(&self, full_scale: u32) -> u32 {
        (self.level().clamp(0.0, 1.0) * full_scale as f64).round() as u32
    }
}

/// Which electrical level counts as "asserted" for a component line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    #[default]
    ActiveHigh,
    ActiveLow,
}

impl Polarity {
    pub fn from_active_low(active_low: bool) -> Self {
        if active_low {
            Polarity::ActiveLow
        } else {
            Polarity::ActiveHigh
        }
    }

    /// Electrical level that represents `asserted`.
    pub fn level(self, asserted: bool) -> bool {
        match self {
            Polarity::ActiveHigh => asserted,
            Polarity::ActiveLow => !asserted,
        }
    }

    pub fn is_asserted(self, high: bool) -> bool {
        self.level(high)
    }
}
