// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::fmt::Write as _;

use crate::errors::InitError;
use crate::geometry::{Coord, Dim};
use crate::node::{Node, NodeState};
use crate::switch::{ExtWire, IntWire};

/// The in-memory 3-D array of base-partitions plus their switches.
///
/// The grid owns every node in a flat array indexed by `(x, y, z)`; the
/// external wire tables hold coordinates and port indices, never references,
/// so the cyclic neighbor graph stays a pure table structure.
#[derive(Debug, Clone)]
pub struct Grid {
    dims: [usize; 3],
    one_dim: bool,
    nodes: Vec<Node>,
}

impl Grid {
    /// Allocate and wire a grid. 3-D machines accept X sizes 1, 4 and 8
    /// only; no cable tables exist for anything else. 1-D machines accept
    /// any X length.
    pub fn new(dims: [usize; 3], one_dim: bool) -> Result<Grid, InitError> {
        if dims.iter().any(|&d| d == 0) {
            return Err(InitError::ZeroDim(dims));
        }
        if !one_dim && !matches!(dims[0], 1 | 4 | 8) {
            return Err(InitError::UnsupportedXDim(dims[0]));
        }
        let mut nodes = Vec::with_capacity(dims[0] * dims[1] * dims[2]);
        for x in 0..dims[0] {
            for y in 0..dims[1] {
                for z in 0..dims[2] {
                    nodes.push(Node::new(Coord::new(x, y, z)));
                }
            }
        }
        let mut grid = Grid { dims, one_dim, nodes };
        grid.wire();
        tracing::debug!(
            x = dims[0],
            y = dims[1],
            z = dims[2],
            one_dim,
            "grid wired"
        );
        Ok(grid)
    }

    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    pub fn one_dim(&self) -> bool {
        self.one_dim
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, coord: Coord) -> bool {
        coord.within(&self.dims)
    }

    fn idx(&self, coord: Coord) -> usize {
        (coord.x * self.dims[1] + coord.y) * self.dims[2] + coord.z
    }

    pub fn node(&self, coord: Coord) -> &Node {
        &self.nodes[self.idx(coord)]
    }

    pub fn node_mut(&mut self, coord: Coord) -> &mut Node {
        let i = self.idx(coord);
        &mut self.nodes[i]
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    /// Wrapping neighbor `steps` positions further along `dim`.
    pub fn successor(&self, coord: Coord, dim: Dim, steps: usize) -> Coord {
        let len = self.dims[dim.index()];
        coord.with(dim, (coord.get(dim) + steps) % len)
    }

    /// Placement scan order: Z outermost, then Y, then X.
    pub fn scan_order(&self) -> impl Iterator<Item = Coord> {
        let [dx, dy, dz] = self.dims;
        (0..dz).flat_map(move |z| {
            (0..dy).flat_map(move |y| (0..dx).map(move |x| Coord::new(x, y, z)))
        })
    }

    /// Establish the symmetric external wire `source.sport <-> target.tport`
    /// on axis `dim`. Both endpoint tables are written so the external
    /// symmetry invariant holds by construction.
    pub fn switch_config(
        &mut self,
        source: Coord,
        target: Coord,
        dim: Dim,
        sport: usize,
        tport: usize,
    ) {
        self.node_mut(source).switch_mut(dim).ext_wire[sport] = ExtWire {
            node_tar: target,
            port_tar: tport,
        };
        self.node_mut(target).switch_mut(dim).ext_wire[tport] = ExtWire {
            node_tar: source,
            port_tar: sport,
        };
    }

    fn wire(&mut self) {
        match self.dims[0] {
            8 => self.wire_x8(),
            4 => self.wire_x4(),
            _ => self.wire_x_ring(),
        }
        self.wire_ring_axis(Dim::Y);
        self.wire_ring_axis(Dim::Z);
    }

    /// X cabling for an 8-wide axis, written out position by position.
    /// Every node runs an "immediate" cable (port 3 to port 4 of the next
    /// node) and a "skip" cable (port 5 to port 2 of the next-over node);
    /// positions 6 and 7 fold both cables back onto the start of the axis.
    ///
    /// The alternative second-half wiring of split machines would slot in
    /// here; no deployed system uses it.
    fn wire_x8(&mut self) {
        for y in 0..self.dims[1] {
            for z in 0..self.dims[2] {
                let at = |x: usize| Coord::new(x, y, z);
                for x in 0..8 {
                    match x {
                        0 => {
                            self.switch_config(at(0), at(1), Dim::X, 3, 4);
                            self.switch_config(at(0), at(2), Dim::X, 5, 2);
                        }
                        1 => {
                            self.switch_config(at(1), at(2), Dim::X, 3, 4);
                            self.switch_config(at(1), at(3), Dim::X, 5, 2);
                        }
                        2 => {
                            self.switch_config(at(2), at(3), Dim::X, 3, 4);
                            self.switch_config(at(2), at(4), Dim::X, 5, 2);
                        }
                        3 => {
                            self.switch_config(at(3), at(4), Dim::X, 3, 4);
                            self.switch_config(at(3), at(5), Dim::X, 5, 2);
                        }
                        4 => {
                            self.switch_config(at(4), at(5), Dim::X, 3, 4);
                            self.switch_config(at(4), at(6), Dim::X, 5, 2);
                        }
                        5 => {
                            self.switch_config(at(5), at(6), Dim::X, 3, 4);
                            self.switch_config(at(5), at(7), Dim::X, 5, 2);
                        }
                        // skip cable folds back to the first node
                        6 => {
                            self.switch_config(at(6), at(7), Dim::X, 3, 4);
                            self.switch_config(at(6), at(0), Dim::X, 5, 2);
                        }
                        // both cables fold back
                        7 => {
                            self.switch_config(at(7), at(0), Dim::X, 3, 4);
                            self.switch_config(at(7), at(1), Dim::X, 5, 2);
                        }
                        _ => unreachable!(),
                    }
                }
            }
        }
    }

    /// X cabling for a 4-wide axis; same cable roles as the 8-wide table
    /// with the fold starting at position 2.
    fn wire_x4(&mut self) {
        for y in 0..self.dims[1] {
            for z in 0..self.dims[2] {
                let at = |x: usize| Coord::new(x, y, z);
                for x in 0..4 {
                    match x {
                        0 => {
                            self.switch_config(at(0), at(1), Dim::X, 3, 4);
                            self.switch_config(at(0), at(2), Dim::X, 5, 2);
                        }
                        1 => {
                            self.switch_config(at(1), at(2), Dim::X, 3, 4);
                            self.switch_config(at(1), at(3), Dim::X, 5, 2);
                        }
                        2 => {
                            self.switch_config(at(2), at(3), Dim::X, 3, 4);
                            self.switch_config(at(2), at(0), Dim::X, 5, 2);
                        }
                        3 => {
                            self.switch_config(at(3), at(0), Dim::X, 3, 4);
                            self.switch_config(at(3), at(1), Dim::X, 5, 2);
                        }
                        _ => unreachable!(),
                    }
                }
            }
        }
    }

    /// Generic X ring for 1-D machines of arbitrary length: immediate
    /// cables everywhere and, past two nodes, skip cables with the last two
    /// positions wrapping to the start.
    fn wire_x_ring(&mut self) {
        let len = self.dims[0];
        if len < 2 {
            return;
        }
        for y in 0..self.dims[1] {
            for z in 0..self.dims[2] {
                for x in 0..len {
                    let src = Coord::new(x, y, z);
                    self.switch_config(src, Coord::new((x + 1) % len, y, z), Dim::X, 3, 4);
                    if len > 2 {
                        self.switch_config(src, Coord::new((x + 2) % len, y, z), Dim::X, 5, 2);
                    }
                }
            }
        }
    }

    /// Y/Z wiring: port 2 of each node to port 5 of its successor, wrapping;
    /// ports 3 and 4 are self-looped and permanently marked used (not
    /// routable on these axes).
    fn wire_ring_axis(&mut self, dim: Dim) {
        let len = self.dims[dim.index()];
        let coords: Vec<Coord> = self.scan_order().collect();
        for c in coords {
            let sw = self.node_mut(c).switch_mut(dim);
            sw.int_wire[3] = IntWire { used: true, port_tar: 3 };
            sw.int_wire[4] = IntWire { used: true, port_tar: 4 };
            if len > 1 {
                let succ = self.successor(c, dim, 1);
                self.switch_config(c, succ, dim, 2, 5);
            }
        }
    }

    /// Drop the synthetic external tables back to self-loops, ahead of a
    /// hardware wire import.
    pub fn clear_ext_wires(&mut self) {
        for n in &mut self.nodes {
            let coord = n.coord;
            for dim in Dim::ALL {
                let sw = n.switch_mut(dim);
                for p in 0..crate::switch::PORT_COUNT {
                    sw.ext_wire[p] = ExtWire { node_tar: coord, port_tar: p };
                }
            }
        }
    }

    /// Rebuild every node entry, preserving grid sizing and wiring.
    pub fn reset_nodes(&mut self) {
        for n in &mut self.nodes {
            *n = Node::new(n.coord);
        }
        self.wire();
    }

    /// Import a node state. Down-family states mark the node used with the
    /// `#` letter. A node committed to a live block keeps its `used` bit and
    /// display tags (the scheduler reports members as allocated; that must
    /// not release their ports). Everything else resets to idle.
    pub fn import_state(&mut self, coord: Coord, state: NodeState) {
        let node = self.node_mut(coord);
        if state.is_down() {
            node.set_down();
        } else if !node.used {
            node.set_idle();
        }
        node.state = state;
    }

    /// The letter plane, one text row per (z, y) line. What `smap` renders.
    pub fn render_letters(&self) -> String {
        let mut out = String::new();
        for z in 0..self.dims[2] {
            for y in 0..self.dims[1] {
                for x in 0..self.dims[0] {
                    out.push(self.node(Coord::new(x, y, z)).letter);
                }
                let _ = writeln!(out);
            }
            let _ = writeln!(out);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> Grid {
        Grid::new([8, 4, 4], false).unwrap()
    }

    #[test]
    fn rejects_uncabled_x_sizes() {
        assert_eq!(
            Grid::new([6, 4, 4], false).unwrap_err(),
            InitError::UnsupportedXDim(6)
        );
        assert_eq!(
            Grid::new([8, 0, 4], false).unwrap_err(),
            InitError::ZeroDim([8, 0, 4])
        );
        assert!(Grid::new([6, 1, 1], true).is_ok());
    }

    #[test]
    fn external_wiring_is_symmetric() {
        let g = grid();
        for n in g.nodes() {
            for dim in Dim::ALL {
                let sw = n.switch(dim);
                for p in 0..6 {
                    let e = sw.ext_wire[p];
                    let mirror = g.node(e.node_tar).switch(dim).ext_wire[e.port_tar];
                    assert_eq!(mirror.node_tar, n.coord);
                    assert_eq!(mirror.port_tar, p);
                }
            }
        }
    }

    #[test]
    fn x_axis_has_immediate_and_skip_cables() {
        let g = grid();
        let sw = g.node(Coord::new(0, 1, 2)).switch(Dim::X);
        assert_eq!(sw.ext_wire[3].node_tar, Coord::new(1, 1, 2));
        assert_eq!(sw.ext_wire[3].port_tar, 4);
        assert_eq!(sw.ext_wire[5].node_tar, Coord::new(2, 1, 2));
        assert_eq!(sw.ext_wire[5].port_tar, 2);
        // last position wraps
        let last = g.node(Coord::new(7, 1, 2)).switch(Dim::X);
        assert_eq!(last.ext_wire[3].node_tar, Coord::new(0, 1, 2));
        assert_eq!(last.ext_wire[5].node_tar, Coord::new(1, 1, 2));
    }

    #[test]
    fn yz_rings_wrap_and_pin_ports() {
        let g = grid();
        let sw = g.node(Coord::new(3, 3, 0)).switch(Dim::Y);
        assert_eq!(sw.ext_wire[2].node_tar, Coord::new(3, 0, 0));
        assert_eq!(sw.ext_wire[2].port_tar, 5);
        assert!(sw.int_wire[3].used && sw.int_wire[4].used);
        assert!(!sw.int_wire[2].used);
    }

    #[test]
    fn four_wide_x_table_is_fully_cabled() {
        let g = Grid::new([4, 2, 2], false).unwrap();
        // (position, immediate target, skip target)
        for (i, imm, skip) in [(0, 1, 2), (1, 2, 3), (2, 3, 0), (3, 0, 1)] {
            let sw = g.node(Coord::new(i, 1, 0)).switch(Dim::X);
            assert_eq!(sw.ext_wire[3].node_tar, Coord::new(imm, 1, 0));
            assert_eq!(sw.ext_wire[3].port_tar, 4);
            assert_eq!(sw.ext_wire[5].node_tar, Coord::new(skip, 1, 0));
            assert_eq!(sw.ext_wire[5].port_tar, 2);
        }
    }

    #[test]
    fn allocated_state_keeps_live_members_used() {
        let mut g = grid();
        let c = Coord::new(2, 1, 0);
        let node = g.node_mut(c);
        node.used = true;
        node.letter = 'B';
        node.color = 2;

        g.import_state(c, NodeState::Allocated);
        let node = g.node(c);
        assert!(node.used);
        assert_eq!(node.letter, 'B');
        assert_eq!(node.color, 2);
        assert_eq!(node.state, NodeState::Allocated);

        // a free node still resets to idle on refresh
        let free = Coord::new(3, 1, 0);
        g.import_state(free, NodeState::Idle);
        assert!(!g.node(free).used);
    }

    #[test]
    fn reset_restores_pristine_state() {
        let mut g = grid();
        g.node_mut(Coord::new(1, 1, 1)).set_down();
        let pristine = grid();
        g.reset_nodes();
        for (a, b) in g.nodes().zip(pristine.nodes()) {
            assert_eq!(a, b);
        }
    }
}
