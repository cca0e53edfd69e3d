// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::{SimResult, SimulationError};
use pinsim_config::{BoardProfile, RegisterKind};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct Register {
    pub name: String,
    value: u32,
    pub writable_mask: u32,
    pub kind: RegisterKind,
}

impl Register {
    pub fn value(&self) -> u32 {
        self.value
    }
}

/// A register value transition produced by a write.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RegisterChange {
    pub name: String,
    pub old: u32,
    pub new: u32,
    /// Bits explicitly written through a set/reset register, changed or not.
    pub touched: u32,
}

impl RegisterChange {
    /// Bits that changed or were re-asserted.
    pub fn affected(&self) -> u32 {
        (self.old ^ self.new) | self.touched
    }
}

/// Outcome of a host register write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisterWrite {
    pub changes: Vec<RegisterChange>,
    /// Byte handed to a serial bus by a transmit register.
    pub transmit: Option<(String, u8)>,
}

/// Notified for every change to a register that feeds a GPIO function.
pub trait RegisterObserver: std::fmt::Debug + Send + Sync {
    fn on_register_change(&self, change: &RegisterChange);
}

/// Named 32-bit registers of one board profile.
#[derive(Debug, Clone, Default)]
pub struct RegisterBank {
    regs: Vec<Register>,
    index: HashMap<String, usize>,
    feeds: HashSet<usize>,
    observers: Vec<Arc<dyn RegisterObserver>>,
    /// While set, observer notifications queue up in `pending`.
    holding: bool,
    pending: Vec<RegisterChange>,
}

fn low_mask(bits: u8) -> u32 {
    if bits >= 32 {
        u32::MAX
    } else {
        (1u32 << bits) - 1
    }
}

impl RegisterBank {
    pub fn from_profile(profile: &BoardProfile) -> SimResult<Self> {
        let mut bank = Self::default();
        for desc in &profile.registers {
            bank.index.insert(desc.id.clone(), bank.regs.len());
            bank.regs.push(Register {
                name: desc.id.clone(),
                value: desc.reset_value,
                writable_mask: desc.writable_mask,
                kind: desc.kind.clone(),
            });
        }

        for reg in &bank.regs {
            if let Some(target) = reg.kind.paired_target() {
                if !bank.index.contains_key(target) {
                    return Err(SimulationError::Profile(format!(
                        "register '{}' pairs with unknown register '{}'",
                        reg.name, target
                    )));
                }
            }
        }

        Ok(bank)
    }

    fn index_of(&self, name: &str) -> SimResult<usize> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| SimulationError::UnknownRegister(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn get(&self, name: &str) -> SimResult<&Register> {
        Ok(&self.regs[self.index_of(name)?])
    }

    pub fn read(&self, name: &str) -> SimResult<u32> {
        Ok(self.regs[self.index_of(name)?].value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Register> {
        self.regs.iter()
    }

    pub fn add_observer(&mut self, observer: Arc<dyn RegisterObserver>) {
        self.observers.push(observer);
    }

    pub(crate) fn observers(&self) -> &[Arc<dyn RegisterObserver>] {
        &self.observers
    }

    /// Marks a register as governing a GPIO function so its changes reach observers.
    pub(crate) fn mark_feeding(&mut self, name: &str) -> SimResult<()> {
        let idx = self.index_of(name)?;
        self.feeds.insert(idx);
        Ok(())
    }

    pub fn feeds_gpio(&self, name: &str) -> bool {
        self.index.get(name).is_some_and(|idx| self.feeds.contains(idx))
    }

    /// Host write. Bits outside the writable mask are dropped; self-clearing registers
    /// apply their effect to the paired register and read back zero.
    pub fn write(&mut self, name: &str, value: u32) -> SimResult<RegisterWrite> {
        let idx = self.index_of(name)?;
        let reg = &self.regs[idx];
        if reg.writable_mask == 0 || reg.kind == RegisterKind::InputMirror {
            return Err(SimulationError::ReadOnlyViolation(name.to_string()));
        }

        let masked = value & reg.writable_mask;
        let mut outcome = RegisterWrite::default();

        match reg.kind.clone() {
            RegisterKind::Plain | RegisterKind::InputMirror => {
                outcome.changes.extend(self.store(idx, masked, 0));
            }
            RegisterKind::SetReset {
                target,
                reset_shift,
            } => {
                let set = masked & low_mask(reset_shift);
                let reset = if reset_shift >= 32 {
                    0
                } else {
                    masked >> reset_shift
                };
                let target_idx = self.index_of(&target)?;
                let old = self.regs[target_idx].value;
                // Set takes priority when both halves name the same bit.
                let new = (old & !reset) | set;
                self.regs[idx].value = 0;
                outcome
                    .changes
                    .extend(self.store_masked(target_idx, new, set | reset));
            }
            RegisterKind::Reset { target } => {
                let target_idx = self.index_of(&target)?;
                let old = self.regs[target_idx].value;
                self.regs[idx].value = 0;
                outcome
                    .changes
                    .extend(self.store_masked(target_idx, old & !masked, masked));
            }
            RegisterKind::Transmit { bus } => {
                outcome.changes.extend(self.store(idx, masked, 0));
                outcome.transmit = Some((bus, (masked & 0xFF) as u8));
            }
        }

        self.notify(&outcome.changes);
        Ok(outcome)
    }

    pub fn set_bits(&mut self, name: &str, mask: u32) -> SimResult<RegisterWrite> {
        let current = self.read(name)?;
        self.write(name, current | mask)
    }

    pub fn clear_bits(&mut self, name: &str, mask: u32) -> SimResult<RegisterWrite> {
        let current = self.read(name)?;
        self.write(name, current & !mask)
    }

    /// Engine-side update of selected bits, bypassing the writable mask and the
    /// read-only classification. Used for IDR/ADC mirroring and MODER upkeep.
    pub(crate) fn mirror_bits(
        &mut self,
        name: &str,
        mask: u32,
        bits: u32,
    ) -> SimResult<Option<RegisterChange>> {
        let idx = self.index_of(name)?;
        let old = self.regs[idx].value;
        let new = (old & !mask) | (bits & mask);
        let change = self.store(idx, new, 0);
        if let Some(change) = &change {
            self.notify(std::slice::from_ref(change));
        }
        Ok(change)
    }

    /// Restores a raw value without side effects.
    pub(crate) fn restore_raw(&mut self, name: &str, value: u32) -> SimResult<()> {
        let idx = self.index_of(name)?;
        self.regs[idx].value = value;
        Ok(())
    }

    fn store_masked(&mut self, idx: usize, value: u32, touched: u32) -> Option<RegisterChange> {
        let mask = self.regs[idx].writable_mask;
        let old = self.regs[idx].value;
        self.store(idx, (old & !mask) | (value & mask), touched & mask)
    }

    fn store(&mut self, idx: usize, value: u32, touched: u32) -> Option<RegisterChange> {
        let reg = &mut self.regs[idx];
        let old = reg.value;
        reg.value = value;
        if old == value && touched == 0 {
            return None;
        }
        tracing::debug!("{} {:#010x} -> {:#010x}", reg.name, old, value);
        Some(RegisterChange {
            name: reg.name.clone(),
            old,
            new: value,
            touched,
        })
    }

    /// Queues observer notifications until `release_notifications`.
    pub(crate) fn hold_notifications(&mut self) {
        self.holding = true;
    }

    /// Delivers every queued change and resumes immediate notification.
    pub(crate) fn release_notifications(&mut self) {
        self.holding = false;
        for change in std::mem::take(&mut self.pending) {
            for observer in &self.observers {
                observer.on_register_change(&change);
            }
        }
    }

    fn notify(&mut self, changes: &[RegisterChange]) {
        for change in changes {
            if !self.feeds_gpio(&change.name) {
                continue;
            }
            if self.holding {
                self.pending.push(change.clone());
            } else {
                for observer in &self.observers {
                    observer.on_register_change(change);
                }
            }
        }
    }
}
