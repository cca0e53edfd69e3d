// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

pub mod components;
pub mod connections;
pub mod engine;
pub mod pins;
pub mod registers;
pub mod shared;
pub mod signals;
pub mod snapshot;

pub use components::{ComponentId, ComponentModel, ComponentState};
pub use connections::ConnectionGraph;
pub use engine::report::{ComponentDelta, CycleReport, PinDelta, RegisterDelta, SimWarning};
pub use engine::SimulationEngine;
pub use pinsim_config::{BoardProfile, ComponentKind, EngineConfig, PinFunction, Stimulus};
pub use pins::{Pin, PinCaps, PinId, PinTable};
pub use registers::{RegisterBank, RegisterChange, RegisterObserver};
pub use shared::SharedSimulation;
pub use signals::{PinState, Polarity};
pub use snapshot::BoardSnapshot;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SimulationError {
    #[error("unknown register '{0}'")]
    UnknownRegister(String),
    #[error("unknown pin '{0}'")]
    UnknownPin(String),
    #[error("unknown component '{0}'")]
    UnknownComponent(String),
    #[error("register '{0}' is read-only")]
    ReadOnlyViolation(String),
    #[error("pin '{pin}' is driven by its {function:?} function and cannot be driven externally")]
    PinDirectionConflict { pin: String, function: PinFunction },
    #[error("function {function:?} is not available on pin '{pin}'")]
    InvalidFunctionForPin { pin: String, function: PinFunction },
    #[error("component '{component}' has no pin bound to role '{role}'")]
    InvalidPinRoleBinding { component: String, role: String },
    #[error("pin '{0}' cannot be connected to itself")]
    SelfConnection(String),
    #[error("propagation did not settle within {generations} generation(s); pending pins: {pins:?}")]
    PropagationDivergence { pins: Vec<String>, generations: u8 },
    #[error("component '{component}' ({kind:?}) does not support '{interaction}'")]
    UnsupportedInteraction {
        component: String,
        kind: ComponentKind,
        interaction: &'static str,
    },
    #[error("key ({row}, {col}) is outside keypad '{component}'")]
    InvalidKey { component: String, row: u8, col: u8 },
    #[error("pin '{0}' is not analog-capable")]
    PinKindMismatch(String),
    #[error("analog level {0} is not a finite number")]
    InvalidAnalogLevel(f64),
    #[error("invalid board profile: {0}")]
    Profile(String),
}

pub type SimResult<T> = Result<T, SimulationError>;

/// Trait for observing settled propagation cycles in a modular way.
pub trait SimulationObserver: std::fmt::Debug + Send + Sync {
    fn on_cycle_settled(&self, _report: &CycleReport) {}
    fn on_warning(&self, _warning: &SimWarning) {}
    fn on_divergence(&self, _pins: &[String]) {}
    fn on_profile_loaded(&self, _profile_id: &str) {}
}
