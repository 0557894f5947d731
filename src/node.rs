// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use crate::geometry::{Coord, Dim};
use crate::switch::Switch;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// External node state, imported from the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum NodeState {
    #[default]
    Idle,
    Allocated,
    Down,
    Drained,
    Draining,
    Unknown,
}

impl NodeState {
    /// Down-family states take the node out of circulation at import.
    pub fn is_down(self) -> bool {
        matches!(self, NodeState::Down | NodeState::Drained | NodeState::Draining)
    }
}

/// Display letter alphabet, cycled per allocated block: A-Z, a-z, 0-9.
pub const LETTERS: &[u8; 62] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Color palette cycled per allocated block. 0 is reserved for down nodes,
/// 7 for idle.
pub const COLORS: [u8; 6] = [1, 2, 3, 4, 5, 6];
pub const COLOR_DOWN: u8 = 0;
pub const COLOR_IDLE: u8 = 7;
pub const LETTER_DOWN: char = '#';
pub const LETTER_IDLE: char = '.';

pub fn block_letter(count: usize) -> char {
    LETTERS[count % LETTERS.len()] as char
}

pub fn block_color(count: usize) -> u8 {
    COLORS[count % COLORS.len()]
}

/// One base-partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub coord: Coord,
    /// True iff committed to a live block (or down).
    pub used: bool,
    pub color: u8,
    pub letter: char,
    pub state: NodeState,
    /// Physical rack index; equals `coord.x` on emulated machines, imported
    /// from the bridge on real hardware. Drives passthrough ordering.
    pub phys_x: usize,
    axis_switch: [Switch; 3],
}

impl Node {
    pub fn new(coord: Coord) -> Self {
        Node {
            coord,
            used: false,
            color: COLOR_IDLE,
            letter: LETTER_IDLE,
            state: NodeState::Idle,
            phys_x: coord.x,
            axis_switch: std::array::from_fn(|_| Switch::new(coord)),
        }
    }

    pub fn switch(&self, dim: Dim) -> &Switch {
        &self.axis_switch[dim.index()]
    }

    pub fn switch_mut(&mut self, dim: Dim) -> &mut Switch {
        &mut self.axis_switch[dim.index()]
    }

    /// Reset display tags and used bit to the idle defaults.
    pub fn set_idle(&mut self) {
        self.used = false;
        self.color = COLOR_IDLE;
        self.letter = LETTER_IDLE;
    }

    /// Take the node out of circulation.
    pub fn set_down(&mut self) {
        self.used = true;
        self.color = COLOR_DOWN;
        self.letter = LETTER_DOWN;
        self.state = NodeState::Down;
    }
}
