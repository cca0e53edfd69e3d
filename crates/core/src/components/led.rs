// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use super::PinView;
use crate::signals::{PinState, Polarity};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Led {
    pub polarity: Polarity,
    pub lit: bool,
}

impl Led {
    pub fn new(active_high: bool) -> Self {
        Self {
            polarity: Polarity::from_active_low(!active_high),
            lit: false,
        }
    }

    pub fn update(&mut self, pins: &PinView) -> bool {
        let lit = pins
            .state("anode")
            .is_some_and(|s| self.polarity.is_asserted(s.is_high()));
        let changed = lit != self.lit;
        self.lit = lit;
        changed
    }
}

/// Mirrors its driving pin: a digital level or a PWM duty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Buzzer {
    pub active: bool,
    pub duty: f64,
}

impl Buzzer {
    pub fn update(&mut self, pins: &PinView) -> bool {
        let (active, duty) = match pins.state("signal") {
            Some(PinState::Analog(duty)) => (duty > 0.0, duty),
            Some(PinState::Digital(true)) => (true, 1.0),
            _ => (false, 0.0),
        };
        let changed = active != self.active || duty != self.duty;
        self.active = active;
        self.duty = duty;
        changed
    }
}
