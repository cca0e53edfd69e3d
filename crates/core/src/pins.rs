// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::registers::{RegisterBank, RegisterChange};
use crate::signals::PinState;
use crate::{SimResult, SimulationError};
use pinsim_config::{
    AnalogBinding, BoardProfile, Direction, GpioBinding, PinFunction, PinKind, PinPosition,
    PwmBinding, GPIO_LINES,
};
use std::collections::HashMap;

/// Stable handle into a [`PinTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PinId(pub(crate) usize);

impl PinId {
    pub fn index(self) -> usize {
        self.0
    }
}

bitflags::bitflags! {
    /// What a pin can currently do, derived from its kind and function.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PinCaps: u8 {
        /// May be driven by the host or a component.
        const DRIVABLE = 1 << 0;
        /// State is derived from a register (ODR bit, PWM duty).
        const REGISTER_DRIVEN = 1 << 1;
        /// Pushes its state into connected pins.
        const NET_DRIVER = 1 << 2;
        /// State is mirrored into a register (IDR bit, ADC data).
        const MIRRORED = 1 << 3;
        /// Power rail; never overwritten.
        const FIXED = 1 << 4;
    }
}

/// MODER field encodings.
pub const MODE_INPUT: u32 = 0b00;
pub const MODE_OUTPUT: u32 = 0b01;
pub const MODE_ALTERNATE: u32 = 0b10;
pub const MODE_ANALOG: u32 = 0b11;

#[derive(Debug, Clone)]
pub struct Pin {
    pub id: String,
    pub position: Option<PinPosition>,
    pub kind: PinKind,
    pub function: PinFunction,
    pub state: PinState,
    functions: Vec<PinFunction>,
    alternate: Option<PinFunction>,
    pub gpio: Option<GpioBinding>,
    pub analog: Option<AnalogBinding>,
    pub pwm: Option<PwmBinding>,
    pub bus: Option<String>,
    write_seq: u64,
}

impl Pin {
    pub fn caps(&self) -> PinCaps {
        match self.kind {
            PinKind::Power | PinKind::Ground => return PinCaps::NET_DRIVER | PinCaps::FIXED,
            PinKind::Digital | PinKind::Analog => {}
        }

        match self.function.direction() {
            Direction::Output => {
                let backed = match self.function {
                    PinFunction::GpioOutput => self.gpio.is_some(),
                    PinFunction::PwmOut => self.pwm.is_some(),
                    _ => false,
                };
                if backed {
                    PinCaps::NET_DRIVER | PinCaps::REGISTER_DRIVEN
                } else {
                    PinCaps::NET_DRIVER
                }
            }
            Direction::Input => {
                let mirrored = match self.function {
                    PinFunction::GpioInput => self.gpio.is_some(),
                    PinFunction::AdcIn => self.analog.is_some(),
                    _ => false,
                };
                if mirrored {
                    PinCaps::DRIVABLE | PinCaps::MIRRORED
                } else {
                    PinCaps::DRIVABLE
                }
            }
            Direction::Bidirectional | Direction::None => PinCaps::DRIVABLE,
        }
    }

    pub fn supports(&self, function: PinFunction) -> bool {
        function == PinFunction::Unassigned || self.functions.contains(&function)
    }

    pub fn functions(&self) -> &[PinFunction] {
        &self.functions
    }

    /// Sequence number of the last write that originated at this pin.
    pub fn write_seq(&self) -> u64 {
        self.write_seq
    }

    /// MODER field value selecting `function`, if the pin is GPIO-muxed.
    pub fn mode_bits(&self, function: PinFunction) -> Option<u32> {
        self.gpio.as_ref()?;
        match function {
            PinFunction::Unassigned => None,
            PinFunction::GpioInput => Some(MODE_INPUT),
            PinFunction::GpioOutput => Some(MODE_OUTPUT),
            PinFunction::AdcIn => Some(MODE_ANALOG),
            _ => Some(MODE_ALTERNATE),
        }
    }

    /// The function a MODER field value selects, when the pin offers it.
    pub fn function_for_mode(&self, mode: u32) -> Option<PinFunction> {
        let function = match mode & 0b11 {
            MODE_INPUT => PinFunction::GpioInput,
            MODE_OUTPUT => PinFunction::GpioOutput,
            MODE_ALTERNATE => self.alternate?,
            _ => PinFunction::AdcIn,
        };
        self.supports(function).then_some(function)
    }
}

/// Canonical pin set of a board profile.
#[derive(Debug, Clone, Default)]
pub struct PinTable {
    pins: Vec<Pin>,
    index: HashMap<String, PinId>,
    by_register: HashMap<String, Vec<PinId>>,
    adc_full_scale: u32,
    seq: u64,
}

impl PinTable {
    /// Builds the pin set and marks the registers that govern GPIO functions in `registers`.
    pub fn from_profile(profile: &BoardProfile, registers: &mut RegisterBank) -> SimResult<Self> {
        let mut table = PinTable {
            adc_full_scale: profile.adc_full_scale(),
            ..Default::default()
        };

        for desc in &profile.pins {
            let id = PinId(table.pins.len());
            let mut functions = desc.functions.clone();
            if !functions.contains(&desc.function) {
                functions.push(desc.function);
            }

            let state = match desc.kind {
                PinKind::Power => PinState::Digital(true),
                PinKind::Ground => PinState::Digital(false),
                _ if desc.function == PinFunction::AdcIn => PinState::Analog(0.0),
                _ => PinState::Digital(false),
            };

            let mut governing = Vec::new();
            if let Some(gpio) = &desc.gpio {
                if gpio.line >= GPIO_LINES {
                    return Err(SimulationError::Profile(format!(
                        "pin '{}' uses GPIO line {}",
                        desc.id, gpio.line
                    )));
                }
                governing.push(gpio.moder());
                governing.push(gpio.odr());
                for name in [gpio.moder(), gpio.odr(), gpio.idr()] {
                    if !registers.contains(&name) {
                        return Err(SimulationError::UnknownRegister(name));
                    }
                }
            }
            if let Some(pwm) = &desc.pwm {
                governing.push(pwm.compare.clone());
                governing.push(pwm.period.clone());
            }
            if let Some(analog) = &desc.analog {
                if !registers.contains(&analog.register) {
                    return Err(SimulationError::UnknownRegister(analog.register.clone()));
                }
            }
            for name in governing {
                registers.mark_feeding(&name)?;
                table.by_register.entry(name).or_default().push(id);
            }

            table.index.insert(desc.id.clone(), id);
            table.pins.push(Pin {
                id: desc.id.clone(),
                position: desc.position.clone(),
                kind: desc.kind,
                function: desc.function,
                state,
                alternate: desc.alternate(),
                functions,
                gpio: desc.gpio.clone(),
                analog: desc.analog.clone(),
                pwm: desc.pwm.clone(),
                bus: desc.bus.clone(),
                write_seq: 0,
            });
        }

        Ok(table)
    }

    pub fn resolve(&self, id: &str) -> SimResult<PinId> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| SimulationError::UnknownPin(id.to_string()))
    }

    pub fn get(&self, id: &str) -> SimResult<&Pin> {
        Ok(&self.pins[self.resolve(id)?.0])
    }

    pub fn pin(&self, id: PinId) -> &Pin {
        &self.pins[id.0]
    }

    pub fn ids(&self) -> impl Iterator<Item = PinId> {
        (0..self.pins.len()).map(PinId)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Pin> {
        self.pins.iter()
    }

    pub fn len(&self) -> usize {
        self.pins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }

    /// Pins whose function or state is governed by `register`.
    pub fn governed_by(&self, register: &str) -> &[PinId] {
        self.by_register
            .get(register)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn set_digital(&mut self, id: &str, high: bool) -> SimResult<bool> {
        let pin = self.resolve(id)?;
        self.drive(pin, PinState::Digital(high))
    }

    pub fn set_analog(&mut self, id: &str, level: f64) -> SimResult<bool> {
        let pin = self.resolve(id)?;
        self.drive(pin, PinState::Analog(level))
    }

    /// External drive, validated against the pin's kind and current function.
    /// Returns whether the state changed.
    pub fn drive(&mut self, id: PinId, state: PinState) -> SimResult<bool> {
        let pin = &self.pins[id.0];
        if !pin.caps().contains(PinCaps::DRIVABLE) {
            return Err(SimulationError::PinDirectionConflict {
                pin: pin.id.clone(),
                function: pin.function,
            });
        }

        let state = match state {
            PinState::Analog(level) => {
                if !level.is_finite() {
                    return Err(SimulationError::InvalidAnalogLevel(level));
                }
                if pin.kind != PinKind::Analog {
                    return Err(SimulationError::PinKindMismatch(pin.id.clone()));
                }
                PinState::Analog(level.clamp(0.0, 1.0))
            }
            digital => digital,
        };

        self.seq += 1;
        let pin = &mut self.pins[id.0];
        pin.write_seq = self.seq;
        let changed = pin.state != state;
        pin.state = state;
        Ok(changed)
    }

    /// State pushed in through a connection. Not counted as a write by this pin.
    pub(crate) fn force(&mut self, id: PinId, state: PinState) -> bool {
        let pin = &mut self.pins[id.0];
        if pin.caps().contains(PinCaps::FIXED) || pin.state == state {
            return false;
        }
        pin.state = state;
        true
    }

    /// State a register-driven pin takes from its bound register field.
    fn register_state(&self, id: PinId, registers: &RegisterBank) -> SimResult<Option<PinState>> {
        let pin = &self.pins[id.0];
        let state = match (pin.function, &pin.gpio, &pin.pwm) {
            (PinFunction::GpioOutput, Some(gpio), _) => {
                PinState::Digital(registers.read(&gpio.odr())? & gpio.bit() != 0)
            }
            (PinFunction::PwmOut, _, Some(pwm)) => {
                let compare = registers.read(&pwm.compare)?;
                let period = registers.read(&pwm.period)?;
                let duty = if period == 0 {
                    0.0
                } else {
                    (compare as f64 / period as f64).clamp(0.0, 1.0)
                };
                PinState::Analog(duty)
            }
            _ => return Ok(None),
        };
        Ok(Some(state))
    }

    /// Recomputes a register-driven pin from its bound register field. Counts as a
    /// write by the pin.
    pub fn derive_from_register(&mut self, id: PinId, registers: &RegisterBank) -> SimResult<bool> {
        let Some(state) = self.register_state(id, registers)? else {
            return Ok(false);
        };
        self.seq += 1;
        let pin = &mut self.pins[id.0];
        pin.write_seq = self.seq;
        let changed = pin.state != state;
        pin.state = state;
        Ok(changed)
    }

    /// Puts a register-driven pin back on its register value without counting a
    /// write. Used once a pin no longer shares a net with a stronger driver.
    pub(crate) fn resync(&mut self, id: PinId, registers: &RegisterBank) -> SimResult<bool> {
        let Some(state) = self.register_state(id, registers)? else {
            return Ok(false);
        };
        let pin = &mut self.pins[id.0];
        let changed = pin.state != state;
        pin.state = state;
        Ok(changed)
    }

    /// Reinstates saved driver ranks. Later writes still rank above all of them.
    pub(crate) fn restore_write_seq(&mut self, id: PinId, seq: u64) {
        self.pins[id.0].write_seq = seq;
        self.seq = self.seq.max(seq);
    }

    /// Pushes an input pin's state into its mirror register.
    pub fn reflect_to_register(
        &self,
        id: PinId,
        registers: &mut RegisterBank,
    ) -> SimResult<Option<RegisterChange>> {
        let pin = &self.pins[id.0];
        match (pin.function, &pin.gpio, &pin.analog) {
            (PinFunction::GpioInput, Some(gpio), _) => {
                let bits = if pin.state.is_high() { gpio.bit() } else { 0 };
                registers.mirror_bits(&gpio.idr(), gpio.bit(), bits)
            }
            (PinFunction::AdcIn, _, Some(analog)) => registers.mirror_bits(
                &analog.register,
                u32::MAX,
                pin.state.quantize(self.adc_full_scale),
            ),
            _ => Ok(None),
        }
    }

    /// Reassigns a pin's function. Register-driven functions take their state from the
    /// registers immediately. Returns whether the function changed.
    pub fn assign_function(
        &mut self,
        id: PinId,
        function: PinFunction,
        registers: &RegisterBank,
    ) -> SimResult<bool> {
        let pin = &self.pins[id.0];
        if !pin.supports(function) {
            return Err(SimulationError::InvalidFunctionForPin {
                pin: pin.id.clone(),
                function,
            });
        }
        if pin.function == function {
            return Ok(false);
        }

        tracing::debug!("{}: {:?} -> {:?}", pin.id, pin.function, function);
        let pin = &mut self.pins[id.0];
        pin.function = function;
        if function == PinFunction::AdcIn {
            pin.state = PinState::Analog(pin.state.level());
        } else if let PinState::Analog(level) = pin.state {
            if function != PinFunction::PwmOut {
                pin.state = PinState::Digital(level >= crate::signals::LOGIC_THRESHOLD);
            }
        }
        self.derive_from_register(id, registers)?;
        Ok(true)
    }

    /// Writes every GPIO pin's function into its MODER field.
    pub(crate) fn sync_mode_registers(
        &self,
        registers: &mut RegisterBank,
    ) -> SimResult<Vec<RegisterChange>> {
        let mut changes = Vec::new();
        for pin in &self.pins {
            if let (Some(gpio), Some(bits)) = (&pin.gpio, pin.mode_bits(pin.function)) {
                let shift = gpio.line as u32 * 2;
                if let Some(change) =
                    registers.mirror_bits(&gpio.moder(), 0b11 << shift, bits << shift)?
                {
                    changes.push(change);
                }
            }
        }
        Ok(changes)
    }
}
