// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Attached peripherals. Components refer to pins by [`PinId`] and never own them.

mod inputs;
mod keypad;
mod lcd;
mod led;
mod segment;

pub use inputs::{Button, Potentiometer, Sensor, Switch};
pub use keypad::Keypad;
pub use lcd::Lcd;
pub use led::{Buzzer, Led};
pub use segment::{decode_glyph, Segment, SegmentDigit};

use crate::pins::{PinId, PinTable};
use crate::signals::PinState;
use crate::{SimResult, SimulationError};
use pinsim_config::{BoardProfile, ComponentDescriptor, ComponentKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(pub(crate) usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinRef {
    pub role: String,
    pub pin: PinId,
}

/// Role-addressed read access to the pins a component is bound to.
pub struct PinView<'a> {
    table: &'a PinTable,
    refs: &'a [PinRef],
}

impl<'a> PinView<'a> {
    pub fn pin(&self, role: &str) -> Option<PinId> {
        self.refs.iter().find(|r| r.role == role).map(|r| r.pin)
    }

    pub fn state(&self, role: &str) -> Option<PinState> {
        self.pin(role).map(|pin| self.table.pin(pin).state)
    }
}

/// Kind-specific component state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ComponentState {
    Led(Led),
    Button(Button),
    Switch(Switch),
    Lcd(Lcd),
    Segment(Segment),
    Potentiometer(Potentiometer),
    Buzzer(Buzzer),
    Keypad(Keypad),
    Sensor(Sensor),
    Other,
}

impl ComponentState {
    pub fn kind(&self) -> ComponentKind {
        match self {
            ComponentState::Led(_) => ComponentKind::Led,
            ComponentState::Button(_) => ComponentKind::Button,
            ComponentState::Switch(_) => ComponentKind::Switch,
            ComponentState::Lcd(_) => ComponentKind::Lcd,
            ComponentState::Segment(_) => ComponentKind::Segment,
            ComponentState::Potentiometer(_) => ComponentKind::Potentiometer,
            ComponentState::Buzzer(_) => ComponentKind::Buzzer,
            ComponentState::Keypad(_) => ComponentKind::Keypad,
            ComponentState::Sensor(_) => ComponentKind::Sensor,
            ComponentState::Other => ComponentKind::Other,
        }
    }

    /// Kinds whose state determines the level of their pins.
    pub fn drives_pins(&self) -> bool {
        matches!(
            self,
            ComponentState::Button(_)
                | ComponentState::Switch(_)
                | ComponentState::Potentiometer(_)
                | ComponentState::Sensor(_)
                | ComponentState::Keypad(_)
        )
    }
}

#[derive(Debug, Clone)]
pub struct Component {
    pub id: String,
    pub kind: ComponentKind,
    pub pins: Vec<PinRef>,
    pub state: ComponentState,
}

impl Component {
    pub fn pin(&self, role: &str) -> Option<PinId> {
        self.pins.iter().find(|r| r.role == role).map(|r| r.pin)
    }

    fn view<'a>(&'a self, table: &'a PinTable) -> PinView<'a> {
        PinView {
            table,
            refs: &self.pins,
        }
    }

    /// Pin a user-operated component pushes its output onto.
    fn output(&self) -> Option<(PinId, PinState)> {
        let (role, state) = match &self.state {
            ComponentState::Button(b) => ("signal", b.output()),
            ComponentState::Switch(s) => ("signal", s.output()),
            ComponentState::Potentiometer(p) => ("wiper", p.output()),
            ComponentState::Sensor(s) => ("output", s.output()),
            _ => return None,
        };
        self.pin(role).map(|pin| (pin, state))
    }
}

/// Result of recomputing or operating a component.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComponentUpdate {
    pub changed: bool,
    /// Pin drives to apply in the current generation.
    pub drives: Vec<(PinId, PinState)>,
    /// Pin drives deferred to the next generation.
    pub next_pass: Vec<(PinId, PinState)>,
}

/// All components of a board profile.
#[derive(Debug, Clone, Default)]
pub struct ComponentModel {
    components: Vec<Component>,
    index: HashMap<String, ComponentId>,
    by_pin: HashMap<PinId, Vec<ComponentId>>,
}

fn indexed_roles(desc: &ComponentDescriptor, prefix: &str) -> SimResult<u8> {
    let count = (0..=u8::MAX)
        .take_while(|i| desc.pins.contains_key(&format!("{prefix}{i}")))
        .count() as u8;
    for role in desc.pins.keys() {
        let Some(index) = role.strip_prefix(prefix) else {
            continue;
        };
        if index.parse::<u8>().is_ok_and(|i| i >= count) {
            return Err(SimulationError::InvalidPinRoleBinding {
                component: desc.id.clone(),
                role: format!("{prefix}{count}"),
            });
        }
    }
    Ok(count)
}

fn initial_state(desc: &ComponentDescriptor, pins: &[PinRef]) -> SimResult<ComponentState> {
    let opts = &desc.options;
    let state = match desc.kind {
        ComponentKind::Led => ComponentState::Led(Led::new(opts.active_high.unwrap_or(true))),
        ComponentKind::Button => {
            ComponentState::Button(Button::new(opts.active_low.unwrap_or(true)))
        }
        ComponentKind::Switch => {
            ComponentState::Switch(Switch::new(opts.active_low.unwrap_or(true)))
        }
        ComponentKind::Lcd => ComponentState::Lcd(Lcd::new(
            opts.rows.unwrap_or(2),
            opts.cols.unwrap_or(16),
        )),
        ComponentKind::Segment => {
            ComponentState::Segment(Segment::new(
                Segment::digit_count(pins),
                opts.common_anode.unwrap_or(false),
            ))
        }
        ComponentKind::Potentiometer => {
            ComponentState::Potentiometer(Potentiometer::new(opts.initial.unwrap_or(0.0)))
        }
        ComponentKind::Buzzer => ComponentState::Buzzer(Buzzer::default()),
        ComponentKind::Keypad => ComponentState::Keypad(Keypad::new(
            indexed_roles(desc, "row")?,
            indexed_roles(desc, "col")?,
            opts.active_low.unwrap_or(true),
        )),
        ComponentKind::Sensor => {
            let min = opts.min.unwrap_or(0.0);
            ComponentState::Sensor(Sensor::new(
                min,
                opts.max.unwrap_or(1.0),
                opts.initial.unwrap_or(min),
            ))
        }
        ComponentKind::Other => ComponentState::Other,
    };
    Ok(state)
}

impl ComponentModel {
    pub fn from_profile(profile: &BoardProfile, pins: &PinTable) -> SimResult<Self> {
        let mut model = ComponentModel::default();
        for desc in &profile.components {
            if model.index.contains_key(&desc.id) {
                return Err(SimulationError::Profile(format!(
                    "duplicate component '{}'",
                    desc.id
                )));
            }
            for role in desc.kind.required_roles() {
                if !desc.pins.contains_key(*role) {
                    return Err(SimulationError::InvalidPinRoleBinding {
                        component: desc.id.clone(),
                        role: role.to_string(),
                    });
                }
            }

            let id = ComponentId(model.components.len());
            let mut refs = Vec::with_capacity(desc.pins.len());
            for (role, pin) in &desc.pins {
                let pin = pins.resolve(pin)?;
                refs.push(PinRef {
                    role: role.clone(),
                    pin,
                });
                let bound = model.by_pin.entry(pin).or_default();
                if !bound.contains(&id) {
                    bound.push(id);
                }
            }

            let state = initial_state(desc, &refs)?;
            model.index.insert(desc.id.clone(), id);
            model.components.push(Component {
                id: desc.id.clone(),
                kind: desc.kind,
                pins: refs,
                state,
            });
        }
        Ok(model)
    }

    pub fn resolve(&self, id: &str) -> SimResult<ComponentId> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| SimulationError::UnknownComponent(id.to_string()))
    }

    pub fn get(&self, id: &str) -> SimResult<&Component> {
        Ok(&self.components[self.resolve(id)?.0])
    }

    pub fn component(&self, id: ComponentId) -> &Component {
        &self.components[id.0]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Component> {
        self.components.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = ComponentId> {
        (0..self.components.len()).map(ComponentId)
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Components referencing `pin`.
    pub fn bound_to(&self, pin: PinId) -> &[ComponentId] {
        self.by_pin.get(&pin).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Re-reads the component's pins after one of them changed.
    pub fn recompute(&mut self, id: ComponentId, table: &PinTable) -> ComponentUpdate {
        let component = &mut self.components[id.0];
        let view = PinView {
            table,
            refs: &component.pins,
        };
        let mut update = ComponentUpdate::default();
        match &mut component.state {
            ComponentState::Led(led) => update.changed = led.update(&view),
            ComponentState::Buzzer(buzzer) => update.changed = buzzer.update(&view),
            ComponentState::Segment(display) => update.changed = display.update(&view),
            ComponentState::Keypad(pad) => {
                update.next_pass = pad
                    .row_levels(&view)
                    .into_iter()
                    .filter(|(pin, state)| table.pin(*pin).state != *state)
                    .collect();
            }
            // Inputs drive their pin and never read it back; the LCD is bus-fed.
            ComponentState::Button(_)
            | ComponentState::Switch(_)
            | ComponentState::Potentiometer(_)
            | ComponentState::Sensor(_)
            | ComponentState::Lcd(_)
            | ComponentState::Other => {}
        }
        update
    }

    /// Drives every user-operated component's resting level onto its pins.
    pub fn initial_drives(&self, table: &PinTable) -> Vec<(PinId, PinState)> {
        let mut drives = Vec::new();
        for component in &self.components {
            if let Some(drive) = component.output() {
                drives.push(drive);
            }
            if let ComponentState::Keypad(pad) = &component.state {
                drives.extend(pad.row_levels(&component.view(table)));
            }
        }
        drives
    }

    /// Components listening on `bus`. An LCD listens only while both of its lines
    /// carry an I2C function.
    pub fn listeners(&self, bus: &str, table: &PinTable) -> Vec<ComponentId> {
        self.ids()
            .filter(|id| {
                let component = &self.components[id.0];
                if !matches!(component.state, ComponentState::Lcd(_)) {
                    return false;
                }
                ["data", "clock"].iter().all(|role| {
                    component.pin(role).is_some_and(|pin| {
                        let pin = table.pin(pin);
                        pin.function.is_i2c() && pin.bus.as_deref() == Some(bus)
                    })
                })
            })
            .collect()
    }

    /// Delivers one bus byte. Returns whether the component changed.
    pub fn feed(&mut self, id: ComponentId, byte: u8) -> bool {
        match &mut self.components[id.0].state {
            ComponentState::Lcd(lcd) => lcd.feed(byte),
            _ => false,
        }
    }

    fn unsupported(&self, id: ComponentId, interaction: &'static str) -> SimulationError {
        let component = &self.components[id.0];
        SimulationError::UnsupportedInteraction {
            component: component.id.clone(),
            kind: component.kind,
            interaction,
        }
    }

    fn output_update(&self, id: ComponentId, changed: bool) -> ComponentUpdate {
        ComponentUpdate {
            changed,
            drives: self.components[id.0].output().into_iter().collect(),
            next_pass: Vec::new(),
        }
    }

    pub fn press(&mut self, id: ComponentId) -> SimResult<ComponentUpdate> {
        let changed = match &mut self.components[id.0].state {
            ComponentState::Button(b) => b.set_pressed(true),
            _ => return Err(self.unsupported(id, "press")),
        };
        Ok(self.output_update(id, changed))
    }

    pub fn release(&mut self, id: ComponentId) -> SimResult<ComponentUpdate> {
        let changed = match &mut self.components[id.0].state {
            ComponentState::Button(b) => b.set_pressed(false),
            _ => return Err(self.unsupported(id, "release")),
        };
        Ok(self.output_update(id, changed))
    }

    pub fn toggle(&mut self, id: ComponentId) -> SimResult<ComponentUpdate> {
        match &mut self.components[id.0].state {
            ComponentState::Switch(s) => s.toggle(),
            _ => return Err(self.unsupported(id, "toggle")),
        }
        Ok(self.output_update(id, true))
    }

    pub fn set_potentiometer(&mut self, id: ComponentId, percent: u8) -> SimResult<ComponentUpdate> {
        let changed = match &mut self.components[id.0].state {
            ComponentState::Potentiometer(p) => p.set(percent),
            _ => return Err(self.unsupported(id, "set_potentiometer")),
        };
        Ok(self.output_update(id, changed))
    }

    pub fn set_sensor(&mut self, id: ComponentId, value: f64) -> SimResult<ComponentUpdate> {
        if !value.is_finite() {
            return Err(SimulationError::InvalidAnalogLevel(value));
        }
        let changed = match &mut self.components[id.0].state {
            ComponentState::Sensor(s) => s.set(value),
            _ => return Err(self.unsupported(id, "set_sensor")),
        };
        Ok(self.output_update(id, changed))
    }

    /// Presses a keypad key. The row follows on the next propagation pass.
    pub fn press_key(
        &mut self,
        id: ComponentId,
        row: u8,
        col: u8,
        table: &PinTable,
    ) -> SimResult<ComponentUpdate> {
        let ComponentState::Keypad(pad) = &self.components[id.0].state else {
            return Err(self.unsupported(id, "press_key"));
        };
        if !pad.contains(row, col) {
            return Err(SimulationError::InvalidKey {
                component: self.components[id.0].id.clone(),
                row,
                col,
            });
        }
        self.set_key(id, Some((row, col)), table)
    }

    pub fn release_key(&mut self, id: ComponentId, table: &PinTable) -> SimResult<ComponentUpdate> {
        if !matches!(self.components[id.0].state, ComponentState::Keypad(_)) {
            return Err(self.unsupported(id, "release_key"));
        }
        self.set_key(id, None, table)
    }

    fn set_key(
        &mut self,
        id: ComponentId,
        key: Option<(u8, u8)>,
        table: &PinTable,
    ) -> SimResult<ComponentUpdate> {
        let changed = match &mut self.components[id.0].state {
            ComponentState::Keypad(pad) => pad.set_pressed(key),
            _ => return Err(self.unsupported(id, "press_key")),
        };
        let mut update = self.recompute(id, table);
        update.changed = changed;
        Ok(update)
    }

    /// Replaces a component's state verbatim. The kind must match.
    pub fn restore_state(&mut self, id: ComponentId, state: ComponentState) -> SimResult<()> {
        let component = &mut self.components[id.0];
        if component.kind != state.kind() {
            return Err(SimulationError::Profile(format!(
                "component '{}' is a {:?}, snapshot holds a {:?}",
                component.id,
                component.kind,
                state.kind()
            )));
        }
        let fits = match (&component.state, &state) {
            (ComponentState::Lcd(current), ComponentState::Lcd(restored)) => {
                restored.is_well_formed()
                    && (restored.rows, restored.cols) == (current.rows, current.cols)
            }
            (ComponentState::Keypad(current), ComponentState::Keypad(restored)) => {
                (restored.rows, restored.cols) == (current.rows, current.cols)
                    && restored.pressed.map_or(true, |(r, c)| restored.contains(r, c))
            }
            (ComponentState::Segment(current), ComponentState::Segment(restored)) => {
                restored.digits.len() == current.digits.len()
            }
            _ => true,
        };
        if !fits {
            return Err(SimulationError::Profile(format!(
                "snapshot state of '{}' does not fit its {:?} on this board",
                component.id, component.kind
            )));
        }
        component.state = state;
        Ok(())
    }
}
