// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use super::PinView;
use crate::pins::PinId;
use crate::signals::{PinState, Polarity};
use serde::{Deserialize, Serialize};

/// Row/column matrix keypad.
///
/// Firmware drives the columns and samples the rows. A pressed key connects
/// its column to its row, so the row follows the column's asserted level and
/// idles otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keypad {
    pub polarity: Polarity,
    pub rows: u8,
    pub cols: u8,
    pub pressed: Option<(u8, u8)>,
}

pub fn row_role(row: u8) -> String {
    format!("row{row}")
}

pub fn col_role(col: u8) -> String {
    format!("col{col}")
}

impl Keypad {
    pub fn new(rows: u8, cols: u8, active_low: bool) -> Self {
        Self {
            polarity: Polarity::from_active_low(active_low),
            rows,
            cols,
            pressed: None,
        }
    }

    pub fn contains(&self, row: u8, col: u8) -> bool {
        row < self.rows && col < self.cols
    }

    pub fn set_pressed(&mut self, key: Option<(u8, u8)>) -> bool {
        let changed = self.pressed != key;
        self.pressed = key;
        changed
    }

    /// Level every row line should carry given the current column outputs.
    pub fn row_levels(&self, pins: &PinView) -> Vec<(PinId, PinState)> {
        (0..self.rows)
            .filter_map(|row| {
                let pin = pins.pin(&row_role(row))?;
                let asserted = match self.pressed {
                    Some((r, c)) if r == row => pins
                        .state(&col_role(c))
                        .is_some_and(|s| self.polarity.is_asserted(s.is_high())),
                    _ => false,
                };
                Some((pin, PinState::Digital(self.polarity.level(asserted))))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_bounds() {
        let pad = Keypad::new(4, 3, true);
        assert!(pad.contains(3, 2));
        assert!(!pad.contains(4, 0));
        assert!(!pad.contains(0, 3));
    }

    #[test]
    fn test_press_tracks_changes() {
        let mut pad = Keypad::new(4, 3, true);
        assert!(pad.set_pressed(Some((1, 2))));
        assert!(!pad.set_pressed(Some((1, 2))));
        assert!(pad.set_pressed(None));
    }
}
