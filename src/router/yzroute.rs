// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use crate::errors::AllocError;
use crate::geometry::{Coord, Dim, Geometry};
use crate::grid::Grid;
use crate::request::ConnType;
use crate::router::path::WireTxn;

/// Thread the Y and Z axes of a block: every member's port 2 chains onto
/// its successor's port 5. Torus blocks close each column back onto its
/// start, wiring 2<->5 straight through any non-member nodes the wrap
/// crosses. Axes of length 1 are skipped (no wraparound exists on them, so
/// a torus request degrades to mesh semantics there).
pub fn stitch_yz(
    grid: &mut Grid,
    txn: &mut WireTxn,
    start: Coord,
    geometry: Geometry,
    conn: ConnType,
    members: &[Coord],
) -> Result<(), AllocError> {
    for dim in [Dim::Y, Dim::Z] {
        let len = geometry.get(dim);
        if len <= 1 {
            continue;
        }
        for &m in members {
            let rel = m.get(dim) - start.get(dim);
            if rel < len - 1 {
                // chain onto the member successor
                let ext = grid.node(m).switch(dim).ext_wire[2];
                txn.connect(grid, m, dim, 0, 2)?;
                txn.connect(grid, ext.node_tar, dim, ext.port_tar, 1)?;
            } else if conn == ConnType::Torus {
                close_column(grid, txn, m, dim, start.get(dim))?;
            }
        }
    }
    Ok(())
}

/// Close one torus column: exit the last member on port 2 and follow the
/// successor ring, passing through non-members, until the column start
/// takes the wire back in on port 5.
fn close_column(
    grid: &mut Grid,
    txn: &mut WireTxn,
    last: Coord,
    dim: Dim,
    start_pos: usize,
) -> Result<(), AllocError> {
    txn.connect(grid, last, dim, 0, 2)?;
    let mut ext = grid.node(last).switch(dim).ext_wire[2];
    loop {
        let (n, p) = (ext.node_tar, ext.port_tar);
        if n.get(dim) == start_pos {
            txn.connect(grid, n, dim, p, 1)?;
            return Ok(());
        }
        txn.connect(grid, n, dim, p, 2)?;
        ext = grid.node(n).switch(dim).ext_wire[2];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Grid;

    fn members(start: Coord, geo: Geometry) -> Vec<Coord> {
        let mut out = Vec::new();
        for z in 0..geo.0[2] {
            for y in 0..geo.0[1] {
                for x in 0..geo.0[0] {
                    out.push(Coord::new(start.x + x, start.y + y, start.z + z));
                }
            }
        }
        out
    }

    #[test]
    fn full_axis_torus_wires_every_member() {
        let mut g = Grid::new([8, 4, 4], false).unwrap();
        let geo = Geometry::new(1, 4, 1);
        let start = Coord::new(0, 0, 0);
        let mut txn = WireTxn::new();
        stitch_yz(&mut g, &mut txn, start, geo, ConnType::Torus, &members(start, geo)).unwrap();
        txn.commit();
        for y in 0..4 {
            let sw = g.node(Coord::new(0, y, 0)).switch(Dim::Y);
            assert!(sw.int_wire[0].used && sw.int_wire[1].used);
            assert_eq!(sw.int_wire[0].port_tar, 2);
            assert_eq!(sw.int_wire[1].port_tar, 5);
        }
    }

    #[test]
    fn short_torus_passes_through_the_rest_of_the_ring() {
        let mut g = Grid::new([8, 4, 4], false).unwrap();
        let geo = Geometry::new(1, 2, 1);
        let start = Coord::new(3, 0, 0);
        let mut txn = WireTxn::new();
        stitch_yz(&mut g, &mut txn, start, geo, ConnType::Torus, &members(start, geo)).unwrap();
        txn.commit();
        // members carry fabric wires, the rest of the ring is wired through
        for (y, pair) in [(0, (2, 5)), (1, (2, 5))] {
            let sw = g.node(Coord::new(3, y, 0)).switch(Dim::Y);
            assert_eq!(sw.int_wire[0].port_tar, pair.0);
            assert_eq!(sw.int_wire[1].port_tar, pair.1);
        }
        for y in [2, 3] {
            let sw = g.node(Coord::new(3, y, 0)).switch(Dim::Y);
            assert!(sw.int_wire[2].used);
            assert_eq!(sw.int_wire[2].port_tar, 5);
            assert!(!sw.int_wire[0].used && !sw.int_wire[1].used);
        }
    }

    #[test]
    fn mesh_leaves_the_ends_open() {
        let mut g = Grid::new([8, 4, 4], false).unwrap();
        let geo = Geometry::new(1, 3, 1);
        let start = Coord::new(0, 0, 0);
        let mut txn = WireTxn::new();
        stitch_yz(&mut g, &mut txn, start, geo, ConnType::Mesh, &members(start, geo)).unwrap();
        txn.commit();
        let first = g.node(Coord::new(0, 0, 0)).switch(Dim::Y);
        assert!(first.int_wire[0].used && !first.int_wire[1].used);
        let lastm = g.node(Coord::new(0, 2, 0)).switch(Dim::Y);
        assert!(!lastm.int_wire[0].used && lastm.int_wire[1].used);
        let outside = g.node(Coord::new(0, 3, 0)).switch(Dim::Y);
        assert!(!outside.int_wire[2].used && !outside.int_wire[5].used);
    }
}
