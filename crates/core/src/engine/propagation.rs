// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Generation-capped work-queue propagation.
//!
//! A pin is processed at most once per generation. A pin that changes again after
//! it was processed, and every keypad row drive, is deferred to the next
//! generation. Running past the generation limit is a divergence.

use super::report::SimWarning;
use super::SimulationEngine;
use crate::pins::{PinCaps, PinId};
use crate::registers::{RegisterChange, RegisterWrite};
use crate::signals::PinState;
use crate::{SimResult, SimulationError};
use std::collections::{HashSet, VecDeque};

#[derive(Debug)]
pub(crate) struct Cycle {
    limit: u8,
    generation: u8,
    worked: bool,
    queue: VecDeque<PinId>,
    queued: HashSet<PinId>,
    processed: HashSet<PinId>,
    deferred: Vec<PinId>,
    deferred_drives: Vec<(PinId, PinState)>,
    warned: HashSet<(PinId, PinId)>,
    pub(crate) warnings: Vec<SimWarning>,
}

impl Cycle {
    pub(crate) fn new(limit: u8) -> Self {
        Self {
            limit: limit.max(1),
            generation: 1,
            worked: false,
            queue: VecDeque::new(),
            queued: HashSet::new(),
            processed: HashSet::new(),
            deferred: Vec::new(),
            deferred_drives: Vec::new(),
            warned: HashSet::new(),
            warnings: Vec::new(),
        }
    }

    pub(crate) fn enqueue(&mut self, pin: PinId) {
        if self.processed.contains(&pin) {
            if !self.deferred.contains(&pin) {
                self.deferred.push(pin);
            }
        } else if self.queued.insert(pin) {
            self.queue.push_back(pin);
        }
    }

    pub(crate) fn defer_drive(&mut self, pin: PinId, state: PinState) {
        self.deferred_drives.retain(|(p, _)| *p != pin);
        self.deferred_drives.push((pin, state));
    }

    pub(crate) fn warn(&mut self, warning: SimWarning) {
        if !self.warnings.contains(&warning) {
            self.warnings.push(warning);
        }
    }

    /// Records a conflicting pair once per cycle, whichever side reports it.
    pub(crate) fn conflict(&mut self, a: PinId, b: PinId) -> bool {
        self.warned.insert((a.min(b), a.max(b)))
    }

    pub(crate) fn generations(&self) -> u8 {
        if self.worked {
            self.generation
        } else {
            0
        }
    }

    fn pending(&self) -> impl Iterator<Item = PinId> + '_ {
        self.deferred
            .iter()
            .copied()
            .chain(self.deferred_drives.iter().map(|(p, _)| *p))
    }
}

impl SimulationEngine {
    /// Runs generations until the queue drains or the limit is exceeded.
    pub(crate) fn settle(&mut self, cycle: &mut Cycle) -> SimResult<()> {
        loop {
            while let Some(pin) = cycle.queue.pop_front() {
                cycle.queued.remove(&pin);
                cycle.processed.insert(pin);
                cycle.worked = true;
                self.process_pin(pin, cycle)?;
            }

            if cycle.deferred.is_empty() && cycle.deferred_drives.is_empty() {
                return Ok(());
            }

            if cycle.generation >= cycle.limit {
                let mut pins: Vec<String> = Vec::new();
                for pin in cycle.pending() {
                    let name = &self.pins.pin(pin).id;
                    if !pins.contains(name) {
                        pins.push(name.clone());
                    }
                }
                return Err(SimulationError::PropagationDivergence {
                    pins,
                    generations: cycle.limit,
                });
            }

            cycle.generation += 1;
            cycle.worked = true;
            cycle.processed.clear();
            tracing::trace!("propagation generation {}", cycle.generation);

            for (pin, state) in std::mem::take(&mut cycle.deferred_drives) {
                self.apply_drive(pin, state, cycle)?;
            }
            for pin in std::mem::take(&mut cycle.deferred) {
                cycle.enqueue(pin);
            }
        }
    }

    fn process_pin(&mut self, id: PinId, cycle: &mut Cycle) -> SimResult<()> {
        tracing::trace!("settle {} = {:?}", self.pins.pin(id).id, self.pins.pin(id).state);

        self.pins.reflect_to_register(id, &mut self.registers)?;

        for component in self.components.bound_to(id).to_vec() {
            let update = self.components.recompute(component, &self.pins);
            for (pin, state) in update.drives {
                self.apply_drive(pin, state, cycle)?;
            }
            for (pin, state) in update.next_pass {
                cycle.defer_drive(pin, state);
            }
        }

        let pin = self.pins.pin(id);
        if !pin.caps().contains(PinCaps::NET_DRIVER) {
            return Ok(());
        }
        let state = pin.state;
        let neighbors: Vec<PinId> = self.connections.neighbors(id).collect();
        for neighbor in neighbors {
            let caps = self.pins.pin(neighbor).caps();
            if caps.contains(PinCaps::NET_DRIVER) && cycle.conflict(id, neighbor) {
                let warning = SimWarning::ConflictingDrivers {
                    pins: [
                        self.pins.pin(id).id.clone(),
                        self.pins.pin(neighbor).id.clone(),
                    ],
                };
                cycle.warn(warning);
            }
            if self.pins.force(neighbor, state) {
                cycle.enqueue(neighbor);
            }
        }
        Ok(())
    }

    /// Component or host drive of a pin; the pin is processed if it changed.
    pub(crate) fn apply_drive(
        &mut self,
        pin: PinId,
        state: PinState,
        cycle: &mut Cycle,
    ) -> SimResult<()> {
        if self.pins.drive(pin, state)? {
            cycle.enqueue(pin);
        }
        Ok(())
    }

    /// Folds a register write into the cycle: pin effects of every change, then the
    /// bus byte of a transmit register.
    pub(crate) fn absorb_register_write(
        &mut self,
        write: RegisterWrite,
        cycle: &mut Cycle,
    ) -> SimResult<()> {
        for change in &write.changes {
            self.apply_register_change(change, cycle)?;
        }
        if let Some((bus, byte)) = write.transmit {
            self.deliver(&bus, &[byte]);
        }
        Ok(())
    }

    fn apply_register_change(&mut self, change: &RegisterChange, cycle: &mut Cycle) -> SimResult<()> {
        let affected = change.affected();
        for id in self.pins.governed_by(&change.name).to_vec() {
            let pin = self.pins.pin(id);

            if let Some(gpio) = pin.gpio.clone() {
                let shift = gpio.line as u32 * 2;
                if change.name == gpio.moder() {
                    if (affected >> shift) & 0b11 == 0 {
                        continue;
                    }
                    let mode = (change.new >> shift) & 0b11;
                    match pin.function_for_mode(mode) {
                        Some(function) => {
                            if self.pins.assign_function(id, function, &self.registers)? {
                                cycle.enqueue(id);
                            }
                        }
                        None => {
                            let warning = SimWarning::UnavailableMode {
                                pin: pin.id.clone(),
                                mode: mode as u8,
                            };
                            cycle.warn(warning);
                        }
                    }
                    continue;
                }
                if change.name == gpio.odr() {
                    if affected & gpio.bit() == 0 {
                        continue;
                    }
                    let changed = self.pins.derive_from_register(id, &self.registers)?;
                    // A set/reset write re-asserts its pins even when the level is unchanged.
                    if changed || change.touched & gpio.bit() != 0 {
                        cycle.enqueue(id);
                    }
                    continue;
                }
            }

            if self.pins.derive_from_register(id, &self.registers)? {
                cycle.enqueue(id);
            }
        }
        Ok(())
    }

    /// Hands bytes to the components listening on `bus`.
    pub(crate) fn deliver(&mut self, bus: &str, bytes: &[u8]) {
        let listeners = self.components.listeners(bus, &self.pins);
        if listeners.is_empty() {
            tracing::debug!("{}: no listener for {} byte(s)", bus, bytes.len());
        }
        for id in listeners {
            for &byte in bytes {
                self.components.feed(id, byte);
            }
        }
    }
}
