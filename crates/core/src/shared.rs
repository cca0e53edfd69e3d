// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::engine::report::CycleReport;
use crate::engine::SimulationEngine;
use crate::snapshot::BoardSnapshot;
use crate::SimResult;
use pinsim_config::{BoardProfile, Stimulus};
use std::sync::{Arc, Mutex, MutexGuard};

/// Cloneable handle that serializes every entry point through one lock, so no
/// two stimulus cycles interleave and read-modify-write stays atomic.
#[derive(Debug, Clone)]
pub struct SharedSimulation {
    inner: Arc<Mutex<SimulationEngine>>,
}

impl SharedSimulation {
    pub fn new(engine: SimulationEngine) -> Self {
        Self {
            inner: Arc::new(Mutex::new(engine)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimulationEngine> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Runs `f` with exclusive access to the engine.
    pub fn with<R>(&self, f: impl FnOnce(&mut SimulationEngine) -> R) -> R {
        f(&mut self.lock())
    }

    pub fn apply(&self, stimulus: &Stimulus) -> SimResult<CycleReport> {
        self.lock().apply(stimulus)
    }

    pub fn read_register(&self, name: &str) -> SimResult<u32> {
        self.lock().read_register(name)
    }

    pub fn write_register(&self, name: &str, value: u32) -> SimResult<CycleReport> {
        self.lock().write_register(name, value)
    }

    pub fn set_bits(&self, name: &str, mask: u32) -> SimResult<CycleReport> {
        self.lock().set_register_bits(name, mask)
    }

    pub fn clear_bits(&self, name: &str, mask: u32) -> SimResult<CycleReport> {
        self.lock().clear_register_bits(name, mask)
    }

    pub fn snapshot(&self) -> BoardSnapshot {
        self.lock().snapshot()
    }

    pub fn load_profile(&self, profile: BoardProfile) -> SimResult<()> {
        self.lock().load_profile(profile)
    }
}
