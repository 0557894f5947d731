// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Grid axis. The machine is a 3-D torus; the X axis carries the split
/// cabling, Y and Z are plain successor rings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Dim {
    X,
    Y,
    Z,
}

impl Dim {
    pub const ALL: [Dim; 3] = [Dim::X, Dim::Y, Dim::Z];

    pub fn index(self) -> usize {
        match self {
            Dim::X => 0,
            Dim::Y => 1,
            Dim::Z => 2,
        }
    }
}

/// Position of a base-partition in the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Coord {
    pub x: usize,
    pub y: usize,
    pub z: usize,
}

impl Coord {
    pub fn new(x: usize, y: usize, z: usize) -> Self {
        Coord { x, y, z }
    }

    pub fn get(&self, dim: Dim) -> usize {
        match dim {
            Dim::X => self.x,
            Dim::Y => self.y,
            Dim::Z => self.z,
        }
    }

    pub fn set(&mut self, dim: Dim, v: usize) {
        match dim {
            Dim::X => self.x = v,
            Dim::Y => self.y = v,
            Dim::Z => self.z = v,
        }
    }

    /// Same coordinate with one axis replaced.
    pub fn with(mut self, dim: Dim, v: usize) -> Self {
        self.set(dim, v);
        self
    }

    pub fn within(&self, dims: &[usize; 3]) -> bool {
        self.x < dims[0] && self.y < dims[1] && self.z < dims[2]
    }
}

impl fmt::Display for Coord {
    /// The node-name digit convention: one decimal digit per axis.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.x, self.y, self.z)
    }
}

/// Block shape in nodes per axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Geometry(pub [usize; 3]);

impl Geometry {
    pub fn new(x: usize, y: usize, z: usize) -> Self {
        Geometry([x, y, z])
    }

    pub fn get(&self, dim: Dim) -> usize {
        self.0[dim.index()]
    }

    pub fn size(&self) -> usize {
        self.0[0] * self.0[1] * self.0[2]
    }

    pub fn fits(&self, dims: &[usize; 3]) -> bool {
        self.0[0] <= dims[0] && self.0[1] <= dims[1] && self.0[2] <= dims[2]
    }

    /// Axes sorted ascending; the de-dup key for the elongation list.
    pub fn canonical(&self) -> Geometry {
        let mut g = self.0;
        g.sort_unstable();
        Geometry(g)
    }

    /// Apply one step of the six-permutation rotation cycle
    /// ABC -> ACB -> CAB -> CBA -> BCA -> BAC -> ABC. Each step is a single
    /// pairwise swap selected by the step index modulo 6.
    pub fn rotate_step(&mut self, step: usize) {
        match step % 6 {
            0 | 2 | 4 => self.0.swap(1, 2),
            _ => self.0.swap(0, 1),
        }
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.0[0], self.0[1], self.0[2])
    }
}
