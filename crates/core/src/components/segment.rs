// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use super::{PinRef, PinView};
use serde::{Deserialize, Serialize};

pub const SEGMENT_ROLES: [&str; 7] = ["seg_a", "seg_b", "seg_c", "seg_d", "seg_e", "seg_f", "seg_g"];
pub const MAX_DIGITS: usize = 4;

/// Segment bit patterns, `a` in bit 0 through `g` in bit 6.
const GLYPHS: [(u8, char); 18] = [
    (0x3F, '0'),
    (0x06, '1'),
    (0x5B, '2'),
    (0x4F, '3'),
    (0x66, '4'),
    (0x6D, '5'),
    (0x7D, '6'),
    (0x07, '7'),
    (0x7F, '8'),
    (0x6F, '9'),
    (0x77, 'A'),
    (0x7C, 'b'),
    (0x39, 'C'),
    (0x5E, 'd'),
    (0x79, 'E'),
    (0x71, 'F'),
    (0x40, '-'),
    (0x00, ' '),
];

pub fn decode_glyph(pattern: u8) -> Option<char> {
    GLYPHS
        .iter()
        .find(|(bits, _)| *bits == pattern & 0x7F)
        .map(|(_, glyph)| *glyph)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentDigit {
    pub pattern: u8,
    pub dp: bool,
    pub glyph: Option<char>,
}

/// Multiplexed 7-segment display. A digit latches the segment lines only while
/// its select line is active.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub common_anode: bool,
    pub digits: Vec<SegmentDigit>,
}

impl Segment {
    pub fn new(digits: usize, common_anode: bool) -> Self {
        Self {
            common_anode,
            digits: vec![
                SegmentDigit {
                    glyph: Some(' '),
                    ..Default::default()
                };
                digits.clamp(1, MAX_DIGITS)
            ],
        }
    }

    /// Digit count implied by the bound `digitN` roles.
    pub fn digit_count(pins: &[PinRef]) -> usize {
        (0..MAX_DIGITS)
            .take_while(|i| pins.iter().any(|r| r.role == format!("digit{i}")))
            .count()
    }

    pub fn text(&self) -> String {
        self.digits.iter().map(|d| d.glyph.unwrap_or('?')).collect()
    }

    pub fn update(&mut self, pins: &PinView) -> bool {
        // Common cathode: segments light HIGH, digit selected LOW.
        let segment_on = |high: bool| high != self.common_anode;
        let selected = |high: bool| high == self.common_anode;

        let mut pattern = 0u8;
        for (bit, role) in SEGMENT_ROLES.iter().enumerate() {
            if pins.state(role).is_some_and(|s| segment_on(s.is_high())) {
                pattern |= 1 << bit;
            }
        }
        let dp = pins.state("seg_dp").is_some_and(|s| segment_on(s.is_high()));

        let mut changed = false;
        for (i, digit) in self.digits.iter_mut().enumerate() {
            let active = pins
                .state(&format!("digit{i}"))
                .is_some_and(|s| selected(s.is_high()));
            if !active {
                continue;
            }
            let next = SegmentDigit {
                pattern,
                dp,
                glyph: decode_glyph(pattern),
            };
            if *digit != next {
                *digit = next;
                changed = true;
            }
        }
        changed
    }
}
