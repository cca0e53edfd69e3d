// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::components::ComponentState;
use crate::signals::PinState;
use pinsim_config::PinFunction;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PinDelta {
    pub pin: String,
    pub function: PinFunction,
    pub state: PinState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentDelta {
    pub component: String,
    pub state: ComponentState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterDelta {
    pub name: String,
    pub old: u32,
    pub new: u32,
}

/// Non-fatal conditions raised while settling. The cycle still completes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "warning", rename_all = "snake_case")]
pub enum SimWarning {
    /// Two driving pins share a net. The most recently written one wins.
    ConflictingDrivers { pins: [String; 2] },
    /// A MODER field selected a mode the pin does not offer.
    UnavailableMode { pin: String, mode: u8 },
}

impl std::fmt::Display for SimWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SimWarning::ConflictingDrivers { pins: [a, b] } => {
                write!(f, "conflicting drivers on {} and {}", a, b)
            }
            SimWarning::UnavailableMode { pin, mode } => {
                write!(f, "mode {:#04b} is not available on {}", mode, pin)
            }
        }
    }
}

/// Everything a settled cycle changed, relative to the state before the stimulus.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    pub pins: Vec<PinDelta>,
    pub components: Vec<ComponentDelta>,
    pub registers: Vec<RegisterDelta>,
    pub warnings: Vec<SimWarning>,
    /// Generations used to settle. Zero when nothing needed processing.
    pub generations: u8,
}

impl CycleReport {
    pub fn pin(&self, id: &str) -> Option<&PinDelta> {
        self.pins.iter().find(|d| d.pin == id)
    }

    pub fn component(&self, id: &str) -> Option<&ComponentDelta> {
        self.components.iter().find(|d| d.component == id)
    }

    pub fn register(&self, name: &str) -> Option<&RegisterDelta> {
        self.registers.iter().find(|d| d.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
            && self.components.is_empty()
            && self.registers.is_empty()
            && self.warnings.is_empty()
    }
}
