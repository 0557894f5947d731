// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use crate::errors::AllocError;
use crate::geometry::{Coord, Dim};
use crate::grid::Grid;

/// Sentinel hop count before any completed path has been seen.
pub const BEST_COUNT_INIT: usize = 1 << 16;

/// One tentative hop of a path under construction: the switch it runs
/// through, the port the search arrived on and the port it left through.
/// The origin has no `in_port` until a torus closes back into it; a chain
/// end has no `out_port`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathHop {
    pub coord: Coord,
    pub in_port: Option<usize>,
    pub out_port: Option<usize>,
    /// Member hops wire the node's fabric in through ports 0/1;
    /// passthrough hops wire entry straight to exit.
    pub member: bool,
}

/// Records every internal wire a placement sets so a failure can roll the
/// switch graph back to the exact state it found. All placement mutation
/// goes through here; the caller is never responsible for cleanup.
#[derive(Debug, Default)]
pub struct WireTxn {
    log: Vec<(Coord, Dim, usize)>,
}

impl WireTxn {
    pub fn new() -> Self {
        WireTxn::default()
    }

    /// Wire `a <-> b` on the `dim` switch at `coord`, or fail with the port
    /// that is already taken.
    pub fn connect(
        &mut self,
        grid: &mut Grid,
        coord: Coord,
        dim: Dim,
        a: usize,
        b: usize,
    ) -> Result<(), AllocError> {
        let sw = grid.node_mut(coord).switch_mut(dim);
        for port in [a, b] {
            if !sw.port_free(port) {
                return Err(AllocError::WireCollision { coord, dim, port });
            }
        }
        sw.connect(a, b);
        self.log.push((coord, dim, a));
        Ok(())
    }

    /// Undo every wire this transaction set, newest first.
    pub fn rollback(self, grid: &mut Grid) {
        for (coord, dim, port) in self.log.into_iter().rev() {
            grid.node_mut(coord).switch_mut(dim).disconnect(port);
        }
    }

    /// Keep everything; the wires now belong to the committed block.
    pub fn commit(mut self) {
        self.log.clear();
    }

    pub fn wire_count(&self) -> usize {
        self.log.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Grid;

    #[test]
    fn rollback_restores_touched_switches() {
        let mut grid = Grid::new([4, 2, 2], false).unwrap();
        let pristine = grid.clone();
        let c = Coord::new(1, 0, 0);

        let mut txn = WireTxn::new();
        txn.connect(&mut grid, c, Dim::X, 0, 3).unwrap();
        txn.connect(&mut grid, c, Dim::Y, 5, 1).unwrap();
        assert_eq!(txn.wire_count(), 2);
        txn.rollback(&mut grid);

        assert_eq!(grid.node(c), pristine.node(c));
    }

    #[test]
    fn collision_reports_the_taken_port() {
        let mut grid = Grid::new([4, 2, 2], false).unwrap();
        let c = Coord::new(0, 0, 0);
        let mut txn = WireTxn::new();
        txn.connect(&mut grid, c, Dim::X, 0, 3).unwrap();
        let err = txn.connect(&mut grid, c, Dim::X, 3, 5).unwrap_err();
        assert_eq!(
            err,
            AllocError::WireCollision { coord: c, dim: Dim::X, port: 3 }
        );
    }
}
