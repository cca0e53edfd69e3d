// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};

/// Control byte announcing a command payload.
pub const CONTROL_COMMAND: u8 = 0x00;
/// Control byte announcing a character payload.
pub const CONTROL_DATA: u8 = 0x40;

pub const CMD_CLEAR: u8 = 0x01;
pub const CMD_HOME: u8 = 0x02;
pub const CMD_SET_CURSOR: u8 = 0x80;

/// DDRAM start address of each display row.
const ROW_OFFSETS: [u8; 4] = [0x00, 0x40, 0x14, 0x54];

/// Character LCD on an I2C backpack.
///
/// The byte stream is a sequence of (control, payload) pairs. Malformed pairs,
/// unknown commands and non-printable characters are dropped silently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lcd {
    pub rows: u8,
    pub cols: u8,
    pub lines: Vec<String>,
    pub cursor: (u8, u8),
    #[serde(default)]
    pending_control: Option<u8>,
}

impl Lcd {
    pub fn new(rows: u8, cols: u8) -> Self {
        let rows = rows.clamp(1, ROW_OFFSETS.len() as u8);
        let cols = cols.max(1);
        Self {
            rows,
            cols,
            lines: vec![" ".repeat(cols as usize); rows as usize],
            cursor: (0, 0),
            pending_control: None,
        }
    }

    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    /// Buffer and cursor fit the `rows` x `cols` geometry.
    pub fn is_well_formed(&self) -> bool {
        (1..=ROW_OFFSETS.len()).contains(&(self.rows as usize))
            && self.cols >= 1
            && self.lines.len() == self.rows as usize
            && self
                .lines
                .iter()
                .all(|line| line.is_ascii() && line.len() == self.cols as usize)
            && self.cursor.0 < self.rows
            && self.cursor.1 < self.cols
    }

    /// Consumes one byte from the bus. Returns whether the visible state changed.
    pub fn feed(&mut self, byte: u8) -> bool {
        match self.pending_control.take() {
            None => {
                self.pending_control = Some(byte);
                false
            }
            Some(CONTROL_COMMAND) => self.command(byte),
            Some(CONTROL_DATA) => self.write_char(byte),
            Some(other) => {
                tracing::trace!("lcd: ignoring pair with control byte {:#04x}", other);
                false
            }
        }
    }

    fn command(&mut self, cmd: u8) -> bool {
        let before = (self.cursor, self.lines.clone());
        if cmd == CMD_CLEAR {
            for line in &mut self.lines {
                *line = " ".repeat(self.cols as usize);
            }
            self.cursor = (0, 0);
        } else if cmd == CMD_HOME {
            self.cursor = (0, 0);
        } else if cmd & CMD_SET_CURSOR != 0 {
            let addr = cmd & !CMD_SET_CURSOR;
            match self.locate(addr) {
                Some(pos) => self.cursor = pos,
                None => tracing::trace!("lcd: cursor address {:#04x} off screen", addr),
            }
        } else {
            tracing::trace!("lcd: ignoring command {:#04x}", cmd);
        }
        before != (self.cursor, self.lines.clone())
    }

    fn locate(&self, addr: u8) -> Option<(u8, u8)> {
        ROW_OFFSETS
            .iter()
            .take(self.rows as usize)
            .enumerate()
            .filter(|(_, &start)| {
                let (addr, start) = (u16::from(addr), u16::from(start));
                addr >= start && addr < start + u16::from(self.cols)
            })
            .map(|(row, &start)| (row as u8, addr - start))
            .next()
    }

    fn write_char(&mut self, ch: u8) -> bool {
        if !(0x20..=0x7E).contains(&ch) {
            return false;
        }
        let (row, col) = self.cursor;
        let line = &mut self.lines[row as usize];
        let at = col as usize;
        let changed = line.as_bytes()[at] != ch;
        line.replace_range(at..at + 1, &(ch as char).to_string());

        self.cursor = if col + 1 < self.cols {
            (row, col + 1)
        } else {
            ((row + 1) % self.rows, 0)
        };
        // Cursor movement counts as a visible change.
        changed || self.cursor != (row, col)
    }
}
