// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::components::ComponentState;
use crate::engine::SimulationEngine;
use crate::pins::PinCaps;
use crate::signals::PinState;
use crate::{SimResult, SimulationError};
use anyhow::Context;
use pinsim_config::{PinFunction, RegisterKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PinSnapshot {
    pub function: PinFunction,
    pub state: PinState,
    /// Driver rank used to settle shorted outputs.
    #[serde(default)]
    pub write_seq: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BoardSnapshot {
    pub profile_id: String,
    pub registers: BTreeMap<String, u32>,
    pub pins: BTreeMap<String, PinSnapshot>,
    pub components: BTreeMap<String, ComponentState>,
    pub connections: Vec<(String, String)>,
}

impl BoardSnapshot {
    pub fn to_json(&self) -> anyhow::Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize board snapshot")
    }

    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        serde_json::from_str(json).context("Failed to parse board snapshot JSON")
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let path = path.as_ref();
        std::fs::write(path, self.to_json()?)
            .with_context(|| format!("Failed to write snapshot to {:?}", path))
    }

    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read snapshot at {:?}", path))?;
        Self::from_json(&json)
    }
}

impl SimulationEngine {
    pub fn snapshot(&self) -> BoardSnapshot {
        BoardSnapshot {
            profile_id: self.profile().id.clone(),
            registers: self
                .registers
                .iter()
                .map(|r| (r.name.clone(), r.value()))
                .collect(),
            pins: self
                .pins
                .iter()
                .map(|p| {
                    let pin = PinSnapshot {
                        function: p.function,
                        state: p.state,
                        write_seq: p.write_seq(),
                    };
                    (p.id.clone(), pin)
                })
                .collect(),
            components: self
                .components
                .iter()
                .map(|c| (c.id.clone(), c.state.clone()))
                .collect(),
            connections: self
                .connections
                .edges()
                .into_iter()
                .map(|(a, b)| (self.pins.pin(a).id.clone(), self.pins.pin(b).id.clone()))
                .collect(),
        }
    }

    /// Rebuilds the board from its profile and replays the snapshot through the
    /// regular entry points. On failure the current state is left untouched.
    pub fn restore(&mut self, snapshot: &BoardSnapshot) -> SimResult<()> {
        if !snapshot.profile_id.eq_ignore_ascii_case(&self.profile().id) {
            return Err(SimulationError::Profile(format!(
                "snapshot is for board '{}', engine runs '{}'",
                snapshot.profile_id,
                self.profile().id
            )));
        }

        let mut next = SimulationEngine::new(self.profile().clone(), self.config())?;

        let plan: Vec<(String, RegisterKind, u32)> = next
            .registers
            .iter()
            .map(|r| (r.name.clone(), r.kind.clone(), r.writable_mask))
            .collect();
        for (name, kind, mask) in plan {
            let Some(&value) = snapshot.registers.get(&name) else {
                continue;
            };
            match kind {
                RegisterKind::Plain if mask != 0 => {
                    if next.read_register(&name)? != value {
                        next.write_register(&name, value)?;
                    }
                }
                // The bytes already reached the bus; only the data register is restored.
                RegisterKind::Transmit { .. } => next.registers.restore_raw(&name, value)?,
                // Mirrors follow the pins; self-clearing registers read zero.
                _ => {}
            }
        }

        for (id, pin) in &snapshot.pins {
            if next.pin(id)?.function != pin.function {
                next.assign_function(id, pin.function)?;
            }
        }

        // Shorted drivers are ranked by the original write order, not the replay order.
        next.restore_write_seqs(snapshot)?;
        for (a, b) in &snapshot.connections {
            next.connect(a, b)?;
        }

        let (inputs, latches): (Vec<_>, Vec<_>) = snapshot
            .components
            .iter()
            .partition(|(_, state)| state.drives_pins());
        for (id, state) in inputs {
            let component = next.components.resolve(id)?;
            next.components.restore_state(component, state.clone())?;
        }

        for (id, pin) in &snapshot.pins {
            let current = next.pin(id)?;
            if !current.caps().contains(PinCaps::DRIVABLE) || current.state == pin.state {
                continue;
            }
            match pin.state {
                PinState::Digital(high) => next.drive_digital(id, high)?,
                PinState::Analog(level) => next.drive_analog(id, level)?,
            };
        }

        for (id, state) in latches {
            let component = next.components.resolve(id)?;
            next.components.restore_state(component, state.clone())?;
        }

        next.restore_write_seqs(snapshot)?;
        self.replace_with(next);
        tracing::debug!("restored snapshot of {}", snapshot.profile_id);
        Ok(())
    }

    fn restore_write_seqs(&mut self, snapshot: &BoardSnapshot) -> SimResult<()> {
        for (id, pin) in &snapshot.pins {
            let pid = self.pins.resolve(id)?;
            self.pins.restore_write_seq(pid, pin.write_seq);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_json_round_trip() {
        let mut engine = SimulationEngine::from_builtin("F446RE").unwrap();
        engine.write_register("GPIOA_BSRR", 1 << 5).unwrap();
        engine.connect("PA6", "PA9").unwrap();

        let snap = engine.snapshot();
        let json = snap.to_json().unwrap();
        assert_eq!(BoardSnapshot::from_json(&json).unwrap(), snap);
        assert_eq!(snap.connections, vec![("PA6".to_string(), "PA9".to_string())]);
        assert_eq!(snap.registers["GPIOA_ODR"], 1 << 5);
    }

    #[test]
    fn test_restore_rejects_other_board() {
        let engine = SimulationEngine::from_builtin("F446RE").unwrap();
        let snap = engine.snapshot();
        let mut other = SimulationEngine::from_builtin("L476RG").unwrap();
        assert!(matches!(
            other.restore(&snap),
            Err(SimulationError::Profile(_))
        ));
    }
}
