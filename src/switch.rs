// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use crate::geometry::Coord;

/// Ports per switch. 0/1 are the node's internal enter/exit into the axis;
/// 2..=5 are the external link endpoints (2,5 and 3,4 form the two cable
/// pairs).
pub const PORT_COUNT: usize = 6;

/// Exit ports to try given the port a search entered the switch through.
/// Even entries continue in the {3,5} pair order, odd entries in {4,2}.
pub const PORT_ORDER: [[usize; 2]; PORT_COUNT] =
    [[3, 5], [4, 2], [3, 5], [4, 2], [3, 5], [4, 2]];

/// One entry of the internal routing table. `used == false` keeps the
/// conventional self-loop (`port_tar` equal to the port's own index).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntWire {
    pub used: bool,
    pub port_tar: usize,
}

/// One entry of the fixed external topology table: the neighbor switch
/// reachable from this port. Set once at init, never mutated by allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtWire {
    pub node_tar: Coord,
    pub port_tar: usize,
}

/// Per-(node, axis) 6-port crossbar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Switch {
    pub int_wire: [IntWire; PORT_COUNT],
    pub ext_wire: [ExtWire; PORT_COUNT],
}

impl Switch {
    /// All internal wires self-looped, all external wires pointing back at
    /// this switch (self-loop convention for "not cabled").
    pub fn new(coord: Coord) -> Self {
        let int_wire = std::array::from_fn(|p| IntWire {
            used: false,
            port_tar: p,
        });
        let ext_wire = std::array::from_fn(|p| ExtWire {
            node_tar: coord,
            port_tar: p,
        });
        Switch { int_wire, ext_wire }
    }

    pub fn port_free(&self, port: usize) -> bool {
        !self.int_wire[port].used
    }

    /// Wire ports `a` and `b` together internally. Both table entries are
    /// co-mutated so the pairing invariant holds by construction.
    pub fn connect(&mut self, a: usize, b: usize) {
        debug_assert!(self.port_free(a) && self.port_free(b));
        self.int_wire[a] = IntWire { used: true, port_tar: b };
        self.int_wire[b] = IntWire { used: true, port_tar: a };
    }

    /// Clear the internal wire touching `port`, restoring both endpoints to
    /// their self-loops. Returns the former pair, if any.
    pub fn disconnect(&mut self, port: usize) -> Option<usize> {
        if !self.int_wire[port].used {
            return None;
        }
        let pair = self.int_wire[port].port_tar;
        self.int_wire[port] = IntWire { used: false, port_tar: port };
        self.int_wire[pair] = IntWire { used: false, port_tar: pair };
        Some(pair)
    }

    /// True when the external table has a real cable on `port` (not the
    /// self-loop placeholder).
    pub fn cabled(&self, port: usize, own: Coord) -> bool {
        let e = &self.ext_wire[port];
        e.node_tar != own || e.port_tar != port
    }
}
