// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::{BoardProfile, EngineConfig, PinFunction};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One external event applied to the board model.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Stimulus {
    WriteRegister { name: String, value: u32 },
    SetBits { name: String, mask: u32 },
    ClearBits { name: String, mask: u32 },
    DriveDigital { pin: String, high: bool },
    DriveAnalog { pin: String, value: f64 },
    AssignFunction { pin: String, function: PinFunction },
    Press { component: String },
    Release { component: String },
    Toggle { component: String },
    SetPotentiometer { component: String, percent: u8 },
    SetSensor { component: String, value: f64 },
    PressKey { component: String, row: u8, col: u8 },
    ReleaseKey { component: String },
    BusWrite { bus: String, bytes: Vec<u8> },
    Connect { a: String, b: String },
    Disconnect { a: String, b: String },
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct RegisterValueDetails {
    pub name: String,
    pub value: u32,
    #[serde(default)]
    pub mask: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct RegisterValueAssertion {
    pub register_value: RegisterValueDetails,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct PinDigitalDetails {
    pub pin: String,
    pub high: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct PinDigitalAssertion {
    pub pin_digital: PinDigitalDetails,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct PinAnalogDetails {
    pub pin: String,
    pub value: f64,
    #[serde(default)]
    pub tolerance: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct PinAnalogAssertion {
    pub pin_analog: PinAnalogDetails,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ComponentStateDetails {
    pub component: String,
    /// Compared field-by-field against the JSON form of the component state.
    pub state: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ComponentStateAssertion {
    pub component_state: ComponentStateDetails,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(untagged)]
pub enum ScriptAssertion {
    RegisterValue(RegisterValueAssertion),
    PinDigital(PinDigitalAssertion),
    PinAnalog(PinAnalogAssertion),
    ComponentState(ComponentStateAssertion),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct StimulusScript {
    pub schema_version: String,
    /// Built-in profile id.
    #[serde(default)]
    pub profile: Option<String>,
    /// Path to a profile file, relative to the script.
    #[serde(default)]
    pub profile_file: Option<String>,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub steps: Vec<Stimulus>,
    #[serde(default)]
    pub assertions: Vec<ScriptAssertion>,
}

impl StimulusScript {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let f = std::fs::File::open(&path)
            .with_context(|| format!("Failed to open stimulus script at {:?}", path.as_ref()))?;
        let script: Self =
            serde_yaml::from_reader(f).context("Failed to parse Stimulus Script YAML")?;
        script.validate()?;
        tracing::debug!(
            "loaded stimulus script {:?}: {} step(s), {} assertion(s)",
            path.as_ref(),
            script.steps.len(),
            script.assertions.len()
        );
        Ok(script)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let script: Self =
            serde_yaml::from_str(yaml).context("Failed to parse Stimulus Script YAML")?;
        script.validate()?;
        Ok(script)
    }

    /// The board the script targets: `profile_file` resolved against `base_dir`,
    /// else the built-in `profile`. `None` when the script names neither.
    pub fn resolve_profile(&self, base_dir: &Path) -> Result<Option<BoardProfile>> {
        if let Some(file) = &self.profile_file {
            let path = base_dir.join(file);
            return BoardProfile::from_file(&path).map(Some);
        }
        self.profile
            .as_deref()
            .map(BoardProfile::builtin)
            .transpose()
    }

    pub fn validate(&self) -> Result<()> {
        if self.schema_version != "1.0" {
            anyhow::bail!(
                "Unsupported schema_version '{}'. Supported versions: '1.0'",
                self.schema_version
            );
        }

        if self.profile.is_some() && self.profile_file.is_some() {
            anyhow::bail!("Specify either 'profile' or 'profile_file', not both");
        }

        if self.engine.generation_limit == 0 {
            anyhow::bail!("Engine 'generation_limit' must be greater than zero");
        }

        for assertion in &self.assertions {
            if let ScriptAssertion::PinAnalog(a) = assertion {
                if a.pin_analog.tolerance.is_some_and(|t| t < 0.0) {
                    anyhow::bail!("Tolerance for pin '{}' cannot be negative", a.pin_analog.pin);
                }
            }
        }

        Ok(())
    }
}
