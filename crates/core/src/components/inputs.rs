// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! User-operated components. Their state is set by interaction and pushed out to
//! the bound pin; they never read pin state back.

use crate::signals::{PinState, Polarity};
use serde::{Deserialize, Serialize};

/// Momentary push button. Pulled up and active-low unless the profile says otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Button {
    pub polarity: Polarity,
    pub pressed: bool,
}

impl Button {
    pub fn new(active_low: bool) -> Self {
        Self {
            polarity: Polarity::from_active_low(active_low),
            pressed: false,
        }
    }

    pub fn set_pressed(&mut self, pressed: bool) -> bool {
        let changed = self.pressed != pressed;
        self.pressed = pressed;
        changed
    }

    pub fn output(&self) -> PinState {
        PinState::Digital(self.polarity.level(self.pressed))
    }
}

/// Persistent toggle switch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Switch {
    pub polarity: Polarity,
    pub on: bool,
}

impl Switch {
    pub fn new(active_low: bool) -> Self {
        Self {
            polarity: Polarity::from_active_low(active_low),
            on: false,
        }
    }

    pub fn toggle(&mut self) {
        self.on = !self.on;
    }

    pub fn output(&self) -> PinState {
        PinState::Digital(self.polarity.level(self.on))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Potentiometer {
    /// Wiper position, 0..=100.
    pub percent: u8,
}

impl Potentiometer {
    pub const MAX: u8 = 100;

    pub fn new(initial: f64) -> Self {
        Self {
            percent: initial.clamp(0.0, Self::MAX as f64).round() as u8,
        }
    }

    pub fn set(&mut self, percent: u8) -> bool {
        let percent = if percent > Self::MAX {
            tracing::warn!("potentiometer value {} clamped to {}", percent, Self::MAX);
            Self::MAX
        } else {
            percent
        };
        let changed = self.percent != percent;
        self.percent = percent;
        changed
    }

    pub fn output(&self) -> PinState {
        PinState::Analog(self.percent as f64 / Self::MAX as f64)
    }
}

/// Analog sensor mapping a physical reading in `[min, max]` onto its output pin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sensor {
    pub min: f64,
    pub max: f64,
    pub value: f64,
}

impl Sensor {
    pub fn new(min: f64, max: f64, initial: f64) -> Self {
        let (min, max) = if max > min { (min, max) } else { (0.0, 1.0) };
        Self {
            min,
            max,
            value: initial.clamp(min, max),
        }
    }

    pub fn set(&mut self, value: f64) -> bool {
        let value = value.clamp(self.min, self.max);
        let changed = self.value != value;
        self.value = value;
        changed
    }

    pub fn output(&self) -> PinState {
        PinState::Analog((self.value - self.min) / (self.max - self.min))
    }
}
