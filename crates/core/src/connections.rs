// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::pins::PinId;
use crate::{SimResult, SimulationError};
use std::collections::{BTreeSet, HashMap};

/// Undirected wiring between pins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectionGraph {
    edges: HashMap<PinId, BTreeSet<PinId>>,
}

impl ConnectionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the edge `a - b`. Returns whether it was new.
    pub fn connect(&mut self, a: PinId, b: PinId) -> SimResult<bool> {
        if a == b {
            return Err(SimulationError::SelfConnection(format!("#{}", a.index())));
        }
        let added = self.edges.entry(a).or_default().insert(b);
        self.edges.entry(b).or_default().insert(a);
        Ok(added)
    }

    /// Removes the edge `a - b`. Returns whether it existed.
    pub fn disconnect(&mut self, a: PinId, b: PinId) -> bool {
        let removed = self.edges.get_mut(&a).is_some_and(|n| n.remove(&b));
        if let Some(n) = self.edges.get_mut(&b) {
            n.remove(&a);
        }
        self.edges.retain(|_, n| !n.is_empty());
        removed
    }

    pub fn neighbors(&self, id: PinId) -> impl Iterator<Item = PinId> + '_ {
        self.edges.get(&id).into_iter().flatten().copied()
    }

    pub fn is_connected(&self, a: PinId, b: PinId) -> bool {
        self.edges.get(&a).is_some_and(|n| n.contains(&b))
    }

    /// Every edge once, lower id first, in id order.
    pub fn edges(&self) -> Vec<(PinId, PinId)> {
        let mut edges: Vec<_> = self
            .edges
            .iter()
            .flat_map(|(&a, n)| n.iter().filter(move |&&b| a < b).map(move |&b| (a, b)))
            .collect();
        edges.sort();
        edges
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}
