// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

mod script;

pub use script::{
    ComponentStateAssertion, ComponentStateDetails, PinAnalogAssertion, PinAnalogDetails,
    PinDigitalAssertion, PinDigitalDetails, RegisterValueAssertion, RegisterValueDetails,
    ScriptAssertion, Stimulus, StimulusScript,
};

/// Default schema version for YAML descriptors
fn default_schema_version() -> String {
    "1.0".to_string()
}

fn default_adc_resolution_bits() -> u8 {
    12
}

fn default_writable_mask() -> u32 {
    0xFFFF_FFFF
}

fn default_reset_shift() -> u8 {
    16
}

fn default_generation_limit() -> u8 {
    2
}

const BUILTIN_PROFILES: &[(&str, &str)] = &[
    ("F446RE", include_str!("../profiles/f446re.yaml")),
    ("F031K6", include_str!("../profiles/f031k6.yaml")),
    ("L476RG", include_str!("../profiles/l476rg.yaml")),
];

/// Structural problems found while validating a board profile.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProfileError {
    #[error("unsupported schema_version '{0}'; supported: '1.0'")]
    SchemaVersion(String),
    #[error("duplicate {what} id '{id}'")]
    Duplicate { what: &'static str, id: String },
    #[error("{owner} references unknown register '{register}'")]
    MissingRegister { owner: String, register: String },
    #[error("pin '{pin}' starts as {function:?}, which is not in its function list")]
    UnlistedFunction { pin: String, function: PinFunction },
    #[error("pin '{pin}' uses GPIO line {line}; ports have lines 0..=15")]
    GpioLine { pin: String, line: u8 },
    #[error("adc_resolution_bits must be within 1..=16, got {0}")]
    AdcResolution(u8),
    #[error("unknown built-in profile '{0}'")]
    UnknownProfile(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PinKind {
    #[default]
    Digital,
    Analog,
    Power,
    Ground,
}

/// Signal direction implied by a pin function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
    Bidirectional,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PinFunction {
    #[default]
    Unassigned,
    GpioInput,
    GpioOutput,
    I2cScl,
    I2cSda,
    SpiSck,
    SpiMosi,
    SpiMiso,
    UartTx,
    UartRx,
    AdcIn,
    PwmOut,
}

impl PinFunction {
    pub fn direction(self) -> Direction {
        match self {
            PinFunction::GpioInput
            | PinFunction::UartRx
            | PinFunction::SpiMiso
            | PinFunction::AdcIn => Direction::Input,
            PinFunction::GpioOutput
            | PinFunction::UartTx
            | PinFunction::SpiSck
            | PinFunction::SpiMosi
            | PinFunction::PwmOut => Direction::Output,
            PinFunction::I2cScl | PinFunction::I2cSda => Direction::Bidirectional,
            PinFunction::Unassigned => Direction::None,
        }
    }

    /// Alternate functions are everything selected through MODER `0b10`.
    pub fn is_alternate(self) -> bool {
        !matches!(
            self,
            PinFunction::Unassigned
                | PinFunction::GpioInput
                | PinFunction::GpioOutput
                | PinFunction::AdcIn
        )
    }

    pub fn is_i2c(self) -> bool {
        matches!(self, PinFunction::I2cScl | PinFunction::I2cSda)
    }
}

/// Per-register field classification.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RegisterKind {
    #[default]
    Plain,
    /// Write-1-to-set / write-1-to-reset on `target`, reads back zero (BSRR).
    SetReset {
        target: String,
        #[serde(default = "default_reset_shift")]
        reset_shift: u8,
    },
    /// Write-1-to-reset on `target`, reads back zero (BRR).
    Reset { target: String },
    /// Mirrors external state; only the engine writes it (IDR, ADC data).
    InputMirror,
    /// Byte data register of a serial bus.
    Transmit { bus: String },
}

impl RegisterKind {
    pub fn paired_target(&self) -> Option<&str> {
        match self {
            RegisterKind::SetReset { target, .. } | RegisterKind::Reset { target } => {
                Some(target.as_str())
            }
            _ => None,
        }
    }

    pub fn is_self_clearing(&self) -> bool {
        self.paired_target().is_some()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RegisterDescriptor {
    pub id: String,
    #[serde(default)]
    pub reset_value: u32,
    #[serde(default = "default_writable_mask")]
    pub writable_mask: u32,
    #[serde(default)]
    pub kind: RegisterKind,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PinPosition {
    pub header: String,
    pub index: u16,
}

/// Lines per GPIO port; MODER packs two bits per line into 32.
pub const GPIO_LINES: u8 = 16;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct GpioBinding {
    pub port: String,
    pub line: u8,
}

impl GpioBinding {
    pub fn moder(&self) -> String {
        format!("{}_MODER", self.port)
    }

    pub fn odr(&self) -> String {
        format!("{}_ODR", self.port)
    }

    pub fn idr(&self) -> String {
        format!("{}_IDR", self.port)
    }

    pub fn bit(&self) -> u32 {
        1u32.checked_shl(u32::from(self.line)).unwrap_or(0)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct AnalogBinding {
    pub channel: u8,
    pub register: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PwmBinding {
    /// Capture/compare register holding the duty count.
    pub compare: String,
    /// Auto-reload register holding the period count.
    pub period: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PinDescriptor {
    pub id: String,
    #[serde(default)]
    pub position: Option<PinPosition>,
    #[serde(default)]
    pub kind: PinKind,
    #[serde(default)]
    pub function: PinFunction,
    #[serde(default)]
    pub functions: Vec<PinFunction>,
    #[serde(default)]
    pub gpio: Option<GpioBinding>,
    #[serde(default)]
    pub analog: Option<AnalogBinding>,
    #[serde(default)]
    pub pwm: Option<PwmBinding>,
    #[serde(default)]
    pub bus: Option<String>,
}

impl PinDescriptor {
    pub fn supports(&self, function: PinFunction) -> bool {
        function == PinFunction::Unassigned
            || function == self.function
            || self.functions.contains(&function)
    }

    /// The function selected by MODER `0b10`, if the pin has one.
    pub fn alternate(&self) -> Option<PinFunction> {
        std::iter::once(self.function)
            .chain(self.functions.iter().copied())
            .find(|f| f.is_alternate())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    Led,
    Button,
    Switch,
    Lcd,
    Segment,
    Potentiometer,
    Buzzer,
    Keypad,
    Sensor,
    Other,
}

impl ComponentKind {
    /// Roles that must be bound for the component to work.
    pub fn required_roles(self) -> &'static [&'static str] {
        match self {
            ComponentKind::Led => &["anode"],
            ComponentKind::Button | ComponentKind::Switch | ComponentKind::Buzzer => &["signal"],
            ComponentKind::Lcd => &["data", "clock"],
            ComponentKind::Segment => &[
                "seg_a", "seg_b", "seg_c", "seg_d", "seg_e", "seg_f", "seg_g", "digit0",
            ],
            ComponentKind::Potentiometer => &["wiper"],
            ComponentKind::Keypad => &["row0", "col0"],
            ComponentKind::Sensor => &["output"],
            ComponentKind::Other => &[],
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ComponentOptions {
    #[serde(default)]
    pub active_low: Option<bool>,
    #[serde(default)]
    pub active_high: Option<bool>,
    #[serde(default)]
    pub rows: Option<u8>,
    #[serde(default)]
    pub cols: Option<u8>,
    #[serde(default)]
    pub common_anode: Option<bool>,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub initial: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ComponentDescriptor {
    pub id: String,
    pub kind: ComponentKind,
    /// Role name to pin id.
    #[serde(default)]
    pub pins: BTreeMap<String, String>,
    #[serde(default)]
    pub options: ComponentOptions,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BoardProfile {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    pub id: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_adc_resolution_bits")]
    pub adc_resolution_bits: u8,
    pub registers: Vec<RegisterDescriptor>,
    pub pins: Vec<PinDescriptor>,
    #[serde(default)]
    pub components: Vec<ComponentDescriptor>,
    /// Default breadboard wiring.
    #[serde(default)]
    pub connections: Vec<[String; 2]>,
}

impl BoardProfile {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read board profile at {:?}", path))?;

        let profile: Self = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse board profile JSON from {:?}", path))?
        } else {
            serde_yaml::from_str(&content).context("Failed to parse board profile YAML")?
        };
        profile.validate()?;
        tracing::debug!(
            "loaded board profile '{}' from {:?}: {} registers, {} pins",
            profile.id,
            path,
            profile.registers.len(),
            profile.pins.len()
        );
        Ok(profile)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let profile: Self =
            serde_yaml::from_str(yaml).context("Failed to parse board profile YAML")?;
        profile.validate()?;
        Ok(profile)
    }

    /// Look up one of the profiles shipped with the crate (case-insensitive).
    pub fn builtin(id: &str) -> Result<Self> {
        let (_, yaml) = BUILTIN_PROFILES
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(id.trim()))
            .ok_or_else(|| ProfileError::UnknownProfile(id.to_string()))?;
        Self::from_yaml(yaml).with_context(|| format!("Built-in profile '{}' is invalid", id))
    }

    pub fn builtin_ids() -> Vec<&'static str> {
        BUILTIN_PROFILES.iter().map(|(name, _)| *name).collect()
    }

    pub fn register(&self, id: &str) -> Option<&RegisterDescriptor> {
        self.registers.iter().find(|r| r.id == id)
    }

    pub fn pin(&self, id: &str) -> Option<&PinDescriptor> {
        self.pins.iter().find(|p| p.id == id)
    }

    /// Largest code the ADC data registers can hold.
    pub fn adc_full_scale(&self) -> u32 {
        (1u32 << self.adc_resolution_bits) - 1
    }

    /// Structural checks. Component role and pin reference checks belong to the engine,
    /// which reports them with its own error taxonomy.
    pub fn validate(&self) -> Result<(), ProfileError> {
        if self.schema_version != "1.0" {
            return Err(ProfileError::SchemaVersion(self.schema_version.clone()));
        }
        if self.adc_resolution_bits == 0 || self.adc_resolution_bits > 16 {
            return Err(ProfileError::AdcResolution(self.adc_resolution_bits));
        }

        unique("register", self.registers.iter().map(|r| r.id.as_str()))?;
        unique("pin", self.pins.iter().map(|p| p.id.as_str()))?;
        unique("component", self.components.iter().map(|c| c.id.as_str()))?;

        let registers: HashSet<&str> = self.registers.iter().map(|r| r.id.as_str()).collect();
        let require = |owner: &str, register: &str| {
            if registers.contains(register) {
                Ok(())
            } else {
                Err(ProfileError::MissingRegister {
                    owner: owner.to_string(),
                    register: register.to_string(),
                })
            }
        };

        for reg in &self.registers {
            if let Some(target) = reg.kind.paired_target() {
                require(&reg.id, target)?;
            }
        }

        for pin in &self.pins {
            if !pin.functions.is_empty()
                && pin.function != PinFunction::Unassigned
                && !pin.functions.contains(&pin.function)
            {
                return Err(ProfileError::UnlistedFunction {
                    pin: pin.id.clone(),
                    function: pin.function,
                });
            }
            if let Some(gpio) = &pin.gpio {
                if gpio.line >= GPIO_LINES {
                    return Err(ProfileError::GpioLine {
                        pin: pin.id.clone(),
                        line: gpio.line,
                    });
                }
                require(&pin.id, &gpio.moder())?;
                require(&pin.id, &gpio.odr())?;
                require(&pin.id, &gpio.idr())?;
            }
            if let Some(analog) = &pin.analog {
                require(&pin.id, &analog.register)?;
            }
            if let Some(pwm) = &pin.pwm {
                require(&pin.id, &pwm.compare)?;
                require(&pin.id, &pwm.period)?;
            }
        }

        Ok(())
    }
}

fn unique<'a>(what: &'static str, ids: impl Iterator<Item = &'a str>) -> Result<(), ProfileError> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(ProfileError::Duplicate {
                what,
                id: id.to_string(),
            });
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Number of propagation generations a single stimulus may use.
    #[serde(default = "default_generation_limit")]
    pub generation_limit: u8,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            generation_limit: default_generation_limit(),
        }
    }
}
