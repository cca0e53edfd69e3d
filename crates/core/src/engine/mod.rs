// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

mod propagation;
pub mod report;

use crate::components::{Component, ComponentModel};
use crate::connections::ConnectionGraph;
use crate::pins::{Pin, PinCaps, PinId, PinTable};
use crate::registers::{RegisterBank, RegisterObserver};
use crate::signals::PinState;
use crate::{SimResult, SimulationError, SimulationObserver};
use pinsim_config::{BoardProfile, EngineConfig, PinFunction, Stimulus};
use propagation::Cycle;
use report::{ComponentDelta, CycleReport, PinDelta, RegisterDelta, SimWarning};
use std::sync::Arc;

/// Copy of the owned stores taken before a stimulus.
#[derive(Debug, Clone)]
struct Checkpoint {
    registers: RegisterBank,
    pins: PinTable,
    components: ComponentModel,
    connections: ConnectionGraph,
}

/// Keeps registers, pins and components of one board mutually consistent.
///
/// Every mutating entry point runs one stimulus cycle: the change is applied,
/// propagation settles, and the resulting deltas are returned. A failing cycle
/// leaves the model exactly as it was before the stimulus.
#[derive(Debug)]
pub struct SimulationEngine {
    profile: BoardProfile,
    config: EngineConfig,
    pub(crate) registers: RegisterBank,
    pub(crate) pins: PinTable,
    pub(crate) components: ComponentModel,
    pub(crate) connections: ConnectionGraph,
    observers: Vec<Arc<dyn SimulationObserver>>,
}

impl SimulationEngine {
    pub fn new(profile: BoardProfile, config: EngineConfig) -> SimResult<Self> {
        profile
            .validate()
            .map_err(|e| SimulationError::Profile(e.to_string()))?;

        let mut registers = RegisterBank::from_profile(&profile)?;
        let pins = PinTable::from_profile(&profile, &mut registers)?;
        let components = ComponentModel::from_profile(&profile, &pins)?;

        let mut engine = Self {
            profile,
            config,
            registers,
            pins,
            components,
            connections: ConnectionGraph::new(),
            observers: Vec::new(),
        };
        engine.power_on()?;
        tracing::debug!(
            "{}: {} registers, {} pins, {} components",
            engine.profile.id,
            engine.registers.iter().count(),
            engine.pins.len(),
            engine.components.len()
        );
        Ok(engine)
    }

    /// Engine for one of the built-in board profiles.
    pub fn from_builtin(id: &str) -> SimResult<Self> {
        let profile =
            BoardProfile::builtin(id).map_err(|e| SimulationError::Profile(format!("{:#}", e)))?;
        Self::new(profile, EngineConfig::default())
    }

    /// Brings derived state in line with the reset configuration.
    fn power_on(&mut self) -> SimResult<()> {
        self.pins.sync_mode_registers(&mut self.registers)?;
        let ids: Vec<PinId> = self.pins.ids().collect();
        for &id in &ids {
            self.pins.derive_from_register(id, &self.registers)?;
        }
        for (pin, state) in self.components.initial_drives(&self.pins) {
            self.pins.drive(pin, state)?;
        }
        for [a, b] in self.profile.connections.clone() {
            let (a, b) = (self.pins.resolve(&a)?, self.pins.resolve(&b)?);
            self.connections.connect(a, b)?;
        }

        let mut cycle = Cycle::new(self.config.generation_limit);
        for id in ids {
            cycle.enqueue(id);
        }
        self.settle(&mut cycle)
    }

    /// Destructive reset onto another board profile. Observers are kept.
    pub fn load_profile(&mut self, profile: BoardProfile) -> SimResult<()> {
        let next = Self::new(profile, self.config)?;
        self.replace_with(next);

        tracing::info!("loaded board profile {}", self.profile.id);
        for observer in &self.observers {
            observer.on_profile_loaded(&self.profile.id);
        }
        Ok(())
    }

    /// Swaps in `next`, carrying over every observer.
    pub(crate) fn replace_with(&mut self, mut next: Self) {
        for observer in self.registers.observers() {
            next.registers.add_observer(observer.clone());
        }
        next.observers = std::mem::take(&mut self.observers);
        *self = next;
    }

    pub fn profile(&self) -> &BoardProfile {
        &self.profile
    }

    pub fn config(&self) -> EngineConfig {
        self.config
    }

    pub fn registers(&self) -> &RegisterBank {
        &self.registers
    }

    pub fn pins(&self) -> &PinTable {
        &self.pins
    }

    pub fn components(&self) -> &ComponentModel {
        &self.components
    }

    pub fn connections(&self) -> &ConnectionGraph {
        &self.connections
    }

    pub fn add_observer(&mut self, observer: Arc<dyn SimulationObserver>) {
        self.observers.push(observer);
    }

    pub fn add_register_observer(&mut self, observer: Arc<dyn RegisterObserver>) {
        self.registers.add_observer(observer);
    }

    pub fn read_register(&self, name: &str) -> SimResult<u32> {
        self.registers.read(name)
    }

    pub fn pin(&self, id: &str) -> SimResult<&Pin> {
        self.pins.get(id)
    }

    pub fn component(&self, id: &str) -> SimResult<&Component> {
        self.components.get(id)
    }

    /// Pin ids wired to `id`, in table order.
    pub fn neighbors(&self, id: &str) -> SimResult<Vec<String>> {
        let pin = self.pins.resolve(id)?;
        Ok(self
            .connections
            .neighbors(pin)
            .map(|n| self.pins.pin(n).id.clone())
            .collect())
    }

    pub fn write_register(&mut self, name: &str, value: u32) -> SimResult<CycleReport> {
        self.stimulate(|engine, cycle| {
            let write = engine.registers.write(name, value)?;
            engine.absorb_register_write(write, cycle)
        })
    }

    pub fn set_register_bits(&mut self, name: &str, mask: u32) -> SimResult<CycleReport> {
        self.stimulate(|engine, cycle| {
            let write = engine.registers.set_bits(name, mask)?;
            engine.absorb_register_write(write, cycle)
        })
    }

    pub fn clear_register_bits(&mut self, name: &str, mask: u32) -> SimResult<CycleReport> {
        self.stimulate(|engine, cycle| {
            let write = engine.registers.clear_bits(name, mask)?;
            engine.absorb_register_write(write, cycle)
        })
    }

    pub fn drive_digital(&mut self, pin: &str, high: bool) -> SimResult<CycleReport> {
        self.stimulate(|engine, cycle| {
            let id = engine.pins.resolve(pin)?;
            engine.apply_drive(id, PinState::Digital(high), cycle)
        })
    }

    pub fn drive_analog(&mut self, pin: &str, level: f64) -> SimResult<CycleReport> {
        self.stimulate(|engine, cycle| {
            let id = engine.pins.resolve(pin)?;
            engine.apply_drive(id, PinState::Analog(level), cycle)
        })
    }

    /// Reassigns a pin's function and keeps its MODER field in step.
    pub fn assign_function(&mut self, pin: &str, function: PinFunction) -> SimResult<CycleReport> {
        self.stimulate(|engine, cycle| {
            let id = engine.pins.resolve(pin)?;
            if !engine.pins.assign_function(id, function, &engine.registers)? {
                return Ok(());
            }
            let pin = engine.pins.pin(id);
            if let (Some(gpio), Some(bits)) = (pin.gpio.clone(), pin.mode_bits(function)) {
                let shift = gpio.line as u32 * 2;
                engine
                    .registers
                    .mirror_bits(&gpio.moder(), 0b11 << shift, bits << shift)?;
            }
            cycle.enqueue(id);
            Ok(())
        })
    }

    pub fn press(&mut self, component: &str) -> SimResult<CycleReport> {
        self.interact(component, |model, id, _| model.press(id))
    }

    pub fn release(&mut self, component: &str) -> SimResult<CycleReport> {
        self.interact(component, |model, id, _| model.release(id))
    }

    pub fn toggle(&mut self, component: &str) -> SimResult<CycleReport> {
        self.interact(component, |model, id, _| model.toggle(id))
    }

    pub fn set_potentiometer(&mut self, component: &str, percent: u8) -> SimResult<CycleReport> {
        self.interact(component, |model, id, _| model.set_potentiometer(id, percent))
    }

    pub fn set_sensor(&mut self, component: &str, value: f64) -> SimResult<CycleReport> {
        self.interact(component, |model, id, _| model.set_sensor(id, value))
    }

    pub fn press_key(&mut self, component: &str, row: u8, col: u8) -> SimResult<CycleReport> {
        self.interact(component, |model, id, pins| model.press_key(id, row, col, pins))
    }

    pub fn release_key(&mut self, component: &str) -> SimResult<CycleReport> {
        self.interact(component, |model, id, pins| model.release_key(id, pins))
    }

    /// Delivers bytes to the components listening on `bus`.
    pub fn bus_write(&mut self, bus: &str, bytes: &[u8]) -> SimResult<CycleReport> {
        self.stimulate(|engine, _| {
            engine.deliver(bus, bytes);
            Ok(())
        })
    }

    /// Wires two pins together. Two driving pins are accepted with a
    /// `ConflictingDrivers` warning; the most recently written one carries the net.
    pub fn connect(&mut self, a: &str, b: &str) -> SimResult<CycleReport> {
        self.stimulate(|engine, cycle| {
            let pa = engine.pins.resolve(a)?;
            let pb = engine.pins.resolve(b)?;
            if pa == pb {
                return Err(SimulationError::SelfConnection(a.to_string()));
            }
            if !engine.connections.connect(pa, pb)? {
                return Ok(());
            }

            let (pin_a, pin_b) = (engine.pins.pin(pa), engine.pins.pin(pb));
            let drivers = [pin_a, pin_b].map(|p| p.caps().contains(PinCaps::NET_DRIVER));
            if drivers == [true, true] {
                cycle.conflict(pa, pb);
                cycle.warn(SimWarning::ConflictingDrivers {
                    pins: [pin_a.id.clone(), pin_b.id.clone()],
                });
                let rank = |p: &Pin| (p.caps().contains(PinCaps::FIXED), p.write_seq());
                let winner = if rank(pin_b) > rank(pin_a) { pb } else { pa };
                cycle.enqueue(winner);
            } else {
                cycle.enqueue(pa);
                cycle.enqueue(pb);
            }
            Ok(())
        })
    }

    /// Removes a wire. Register-driven pins fall back to their register value;
    /// other pins keep their current level.
    pub fn disconnect(&mut self, a: &str, b: &str) -> SimResult<CycleReport> {
        self.stimulate(|engine, cycle| {
            let pa = engine.pins.resolve(a)?;
            let pb = engine.pins.resolve(b)?;
            if !engine.connections.disconnect(pa, pb) {
                return Ok(());
            }
            for pin in [pa, pb] {
                if engine.pins.resync(pin, &engine.registers)? {
                    cycle.enqueue(pin);
                }
            }
            Ok(())
        })
    }

    pub fn apply(&mut self, stimulus: &Stimulus) -> SimResult<CycleReport> {
        match stimulus {
            Stimulus::WriteRegister { name, value } => self.write_register(name, *value),
            Stimulus::SetBits { name, mask } => self.set_register_bits(name, *mask),
            Stimulus::ClearBits { name, mask } => self.clear_register_bits(name, *mask),
            Stimulus::DriveDigital { pin, high } => self.drive_digital(pin, *high),
            Stimulus::DriveAnalog { pin, value } => self.drive_analog(pin, *value),
            Stimulus::AssignFunction { pin, function } => self.assign_function(pin, *function),
            Stimulus::Press { component } => self.press(component),
            Stimulus::Release { component } => self.release(component),
            Stimulus::Toggle { component } => self.toggle(component),
            Stimulus::SetPotentiometer { component, percent } => {
                self.set_potentiometer(component, *percent)
            }
            Stimulus::SetSensor { component, value } => self.set_sensor(component, *value),
            Stimulus::PressKey {
                component,
                row,
                col,
            } => self.press_key(component, *row, *col),
            Stimulus::ReleaseKey { component } => self.release_key(component),
            Stimulus::BusWrite { bus, bytes } => self.bus_write(bus, bytes),
            Stimulus::Connect { a, b } => self.connect(a, b),
            Stimulus::Disconnect { a, b } => self.disconnect(a, b),
        }
    }

    fn interact<F>(&mut self, component: &str, op: F) -> SimResult<CycleReport>
    where
        F: FnOnce(
            &mut ComponentModel,
            crate::components::ComponentId,
            &PinTable,
        ) -> SimResult<crate::components::ComponentUpdate>,
    {
        self.stimulate(|engine, cycle| {
            let id = engine.components.resolve(component)?;
            let update = op(&mut engine.components, id, &engine.pins)?;
            for (pin, state) in update.drives {
                engine.apply_drive(pin, state, cycle)?;
            }
            for (pin, state) in update.next_pass {
                cycle.defer_drive(pin, state);
            }
            Ok(())
        })
    }

    fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            registers: self.registers.clone(),
            pins: self.pins.clone(),
            components: self.components.clone(),
            connections: self.connections.clone(),
        }
    }

    /// One stimulus cycle. On any failure the stores are rolled back to the
    /// checkpoint so no partial mutation is visible, register observers included:
    /// they only hear about changes of a cycle that settled.
    fn stimulate<F>(&mut self, apply: F) -> SimResult<CycleReport>
    where
        F: FnOnce(&mut Self, &mut Cycle) -> SimResult<()>,
    {
        let checkpoint = self.checkpoint();
        let mut cycle = Cycle::new(self.config.generation_limit);

        self.registers.hold_notifications();
        let outcome = apply(self, &mut cycle).and_then(|()| self.settle(&mut cycle));

        if let Err(err) = outcome {
            self.registers = checkpoint.registers;
            self.pins = checkpoint.pins;
            self.components = checkpoint.components;
            self.connections = checkpoint.connections;
            if let SimulationError::PropagationDivergence { pins, generations } = &err {
                tracing::warn!(
                    "propagation diverged after {} generation(s) at {:?}; rolled back",
                    generations,
                    pins
                );
                for observer in &self.observers {
                    observer.on_divergence(pins);
                }
            }
            return Err(err);
        }

        self.registers.release_notifications();
        let report = self.report(&checkpoint, &cycle);
        for warning in &report.warnings {
            tracing::warn!("{}", warning);
            for observer in &self.observers {
                observer.on_warning(warning);
            }
        }
        tracing::debug!(
            "settled in {} generation(s): {} pin(s), {} component(s), {} register(s) changed",
            report.generations,
            report.pins.len(),
            report.components.len(),
            report.registers.len()
        );
        for observer in &self.observers {
            observer.on_cycle_settled(&report);
        }
        Ok(report)
    }

    fn report(&self, before: &Checkpoint, cycle: &Cycle) -> CycleReport {
        let pins = before
            .pins
            .iter()
            .zip(self.pins.iter())
            .filter(|(old, new)| old.state != new.state || old.function != new.function)
            .map(|(_, new)| PinDelta {
                pin: new.id.clone(),
                function: new.function,
                state: new.state,
            })
            .collect();

        let components = before
            .components
            .iter()
            .zip(self.components.iter())
            .filter(|(old, new)| old.state != new.state)
            .map(|(_, new)| ComponentDelta {
                component: new.id.clone(),
                state: new.state.clone(),
            })
            .collect();

        let registers = before
            .registers
            .iter()
            .zip(self.registers.iter())
            .filter(|(old, new)| old.value() != new.value())
            .map(|(old, new)| RegisterDelta {
                name: new.name.clone(),
                old: old.value(),
                new: new.value(),
            })
            .collect();

        CycleReport {
            pins,
            components,
            registers,
            warnings: cycle.warnings.clone(),
            generations: cycle.generations(),
        }
    }
}
