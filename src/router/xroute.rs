// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::collections::HashSet;

use crate::errors::AllocError;
use crate::geometry::{Coord, Dim};
use crate::grid::Grid;
use crate::request::ConnType;
use crate::router::path::{PathHop, WireTxn, BEST_COUNT_INIT};
use crate::switch::PORT_ORDER;

/// Primary router keeps the chain inside the block's rack span and prefers
/// member links over passthrough detours; the relaxed fallback drops both
/// guards and leans on torus closure alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterMode {
    Preferred,
    Relaxed,
}

/// A routed X row: the member/passthrough chain from the origin, plus the
/// closing loop back to the origin for torus blocks.
#[derive(Debug, Clone)]
pub struct XRoute {
    pub hops: Vec<PathHop>,
    pub closure: Option<XClosure>,
}

/// Best path found back to the origin: the final member's exit port, the
/// intermediate passthrough hops, and the port the loop re-enters the
/// origin on.
#[derive(Debug, Clone)]
pub struct XClosure {
    pub exit_port: usize,
    pub mids: Vec<PathHop>,
    pub origin_in: usize,
}

/// Thread `len` contiguous nodes along X starting at `origin`, routed
/// through their switches. Returns the hop sequence for the origin row, or
/// `None` when no free wiring realizes the chain (and, for torus, its
/// closure).
pub fn route_x_row(
    grid: &Grid,
    origin: Coord,
    len: usize,
    conn: ConnType,
    mode: RouterMode,
    force_contig: bool,
) -> Option<XRoute> {
    debug_assert!(len > 1);
    let max_phys = (origin.x..origin.x + len)
        .map(|x| grid.node(origin.with(Dim::X, x)).phys_x)
        .max()
        .unwrap_or(origin.x);

    let mut search = ChainSearch {
        grid,
        origin,
        len,
        mode,
        force_contig,
        max_phys,
        used_ports: HashSet::new(),
        placed: HashSet::new(),
        hops: vec![PathHop {
            coord: origin,
            in_port: None,
            out_port: None,
            member: true,
        }],
    };
    search.placed.insert(origin);
    if !search.chain() {
        tracing::debug!(%origin, len, ?mode, "no X chain");
        return None;
    }

    let closure = if conn == ConnType::Torus {
        let last = *search.hops.last().expect("chain is never empty");
        let mut close = ClosureSearch {
            grid,
            origin,
            force_contig,
            used_ports: search.used_ports,
            working: Vec::new(),
            exit_port: 0,
            best: None,
            best_count: BEST_COUNT_INIT,
        };
        close.close(last.coord, last.in_port.unwrap_or(0), 0);
        match close.best {
            Some(best) => Some(best),
            None => {
                tracing::debug!(%origin, len, "X chain found but torus will not close");
                return None;
            }
        }
    } else {
        None
    };

    Some(XRoute { hops: search.hops, closure })
}

struct ChainSearch<'a> {
    grid: &'a Grid,
    origin: Coord,
    len: usize,
    mode: RouterMode,
    force_contig: bool,
    max_phys: usize,
    used_ports: HashSet<(Coord, usize)>,
    placed: HashSet<Coord>,
    hops: Vec<PathHop>,
}

impl ChainSearch<'_> {
    fn wanted(&self, c: Coord) -> bool {
        c.y == self.origin.y
            && c.z == self.origin.z
            && c.x >= self.origin.x
            && c.x < self.origin.x + self.len
    }

    fn port_busy(&self, c: Coord, port: usize) -> bool {
        self.used_ports.contains(&(c, port))
            || !self.grid.node(c).switch(Dim::X).port_free(port)
    }

    fn chain(&mut self) -> bool {
        if self.placed.len() == self.len {
            return true;
        }
        let cur = *self.hops.last().expect("seeded with the origin");
        let c = cur.coord;
        let entry = cur.in_port.unwrap_or(0);
        let sw = self.grid.node(c).switch(Dim::X);

        let mut cands = PORT_ORDER[entry];
        if self.mode == RouterMode::Preferred {
            // member links beat detours at equal depth
            let leads_to_member = |p: usize| {
                let e = sw.ext_wire[p];
                self.wanted(e.node_tar) && !self.placed.contains(&e.node_tar)
            };
            if !leads_to_member(cands[0]) && leads_to_member(cands[1]) {
                cands.swap(0, 1);
            }
        }

        for out in cands {
            if self.port_busy(c, out) || !sw.cabled(out, c) {
                continue;
            }
            let ext = sw.ext_wire[out];
            let (nc, np) = (ext.node_tar, ext.port_tar);
            if nc == c || self.port_busy(nc, np) {
                continue;
            }
            let neighbor = self.grid.node(nc);
            let is_member = self.wanted(nc);
            if is_member {
                if neighbor.used || self.placed.contains(&nc) {
                    continue;
                }
            } else {
                if neighbor.used || self.force_contig {
                    continue;
                }
                if self.mode == RouterMode::Preferred && neighbor.phys_x > self.max_phys {
                    // do not leave the rack span; the relaxed pass may
                    continue;
                }
            }

            self.hops.last_mut().expect("non-empty").out_port = Some(out);
            self.used_ports.insert((c, out));
            self.used_ports.insert((nc, np));
            if is_member {
                self.placed.insert(nc);
            }
            self.hops.push(PathHop {
                coord: nc,
                in_port: Some(np),
                out_port: None,
                member: is_member,
            });

            if self.chain() {
                return true;
            }

            self.hops.pop();
            if is_member {
                self.placed.remove(&nc);
            }
            self.used_ports.remove(&(nc, np));
            self.used_ports.remove(&(c, out));
            self.hops.last_mut().expect("non-empty").out_port = None;
        }
        false
    }
}

/// Bounded DFS from the final chain member back to the origin over free
/// ports. Every completion is compared against the best hop count so far;
/// branches that reach the current best are pruned.
struct ClosureSearch<'a> {
    grid: &'a Grid,
    origin: Coord,
    force_contig: bool,
    used_ports: HashSet<(Coord, usize)>,
    working: Vec<PathHop>,
    exit_port: usize,
    best: Option<XClosure>,
    best_count: usize,
}

impl ClosureSearch<'_> {
    fn port_busy(&self, c: Coord, port: usize) -> bool {
        self.used_ports.contains(&(c, port))
            || !self.grid.node(c).switch(Dim::X).port_free(port)
    }

    fn close(&mut self, c: Coord, entry: usize, count: usize) {
        if count + 1 >= self.best_count {
            return;
        }
        let sw = self.grid.node(c).switch(Dim::X);
        for out in PORT_ORDER[entry] {
            if self.port_busy(c, out) || !sw.cabled(out, c) {
                continue;
            }
            let ext = sw.ext_wire[out];
            let (nc, np) = (ext.node_tar, ext.port_tar);
            if nc == c || self.port_busy(nc, np) {
                continue;
            }
            if count == 0 {
                self.exit_port = out;
            } else {
                self.working.last_mut().expect("mid hop present").out_port = Some(out);
            }
            if nc == self.origin {
                let total = count + 1;
                if total < self.best_count {
                    self.best_count = total;
                    self.best = Some(XClosure {
                        exit_port: self.exit_port,
                        mids: self.working.clone(),
                        origin_in: np,
                    });
                }
                continue;
            }
            // detouring through nc would make it a passthrough hop
            if self.grid.node(nc).used || self.force_contig {
                continue;
            }
            self.used_ports.insert((c, out));
            self.used_ports.insert((nc, np));
            self.working.push(PathHop {
                coord: nc,
                in_port: Some(np),
                out_port: None,
                member: false,
            });
            self.close(nc, np, count + 1);
            self.working.pop();
            self.used_ports.remove(&(nc, np));
            self.used_ports.remove(&(c, out));
        }
    }
}

/// Commit a routed X row onto the `(row_y, row_z)` plane of the block,
/// re-using the origin row's port sequence switch by switch. Members wire
/// fabric ports 0/1 to their exit/entry; passthrough hops wire entry
/// straight to exit.
pub fn commit_x_row(
    grid: &mut Grid,
    txn: &mut WireTxn,
    route: &XRoute,
    row_y: usize,
    row_z: usize,
) -> Result<(), AllocError> {
    let place = |c: Coord| Coord::new(c.x, row_y, row_z);
    for hop in &route.hops {
        let c = place(hop.coord);
        if hop.member {
            if let Some(in_port) = hop.in_port {
                txn.connect(grid, c, Dim::X, in_port, 1)?;
            }
            if let Some(out_port) = hop.out_port {
                txn.connect(grid, c, Dim::X, 0, out_port)?;
            }
        } else {
            let (in_port, out_port) = (
                hop.in_port.expect("passthrough has entry"),
                hop.out_port.expect("passthrough has exit"),
            );
            txn.connect(grid, c, Dim::X, in_port, out_port)?;
        }
    }
    if let Some(closure) = &route.closure {
        let last = route.hops.last().expect("chain is never empty");
        txn.connect(grid, place(last.coord), Dim::X, 0, closure.exit_port)?;
        for mid in &closure.mids {
            let (in_port, out_port) = (
                mid.in_port.expect("mid has entry"),
                mid.out_port.expect("mid has exit"),
            );
            txn.connect(grid, place(mid.coord), Dim::X, in_port, out_port)?;
        }
        let origin = route.hops.first().expect("chain is never empty");
        txn.connect(grid, place(origin.coord), Dim::X, closure.origin_in, 1)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> Grid {
        Grid::new([8, 4, 4], false).unwrap()
    }

    #[test]
    fn mesh_chain_follows_immediate_cables() {
        let g = grid();
        let route = route_x_row(
            &g,
            Coord::new(0, 0, 0),
            2,
            ConnType::Mesh,
            RouterMode::Preferred,
            false,
        )
        .unwrap();
        assert!(route.closure.is_none());
        assert_eq!(route.hops.len(), 2);
        assert_eq!(route.hops[0].out_port, Some(3));
        assert_eq!(route.hops[1].coord, Coord::new(1, 0, 0));
        assert_eq!(route.hops[1].in_port, Some(4));
    }

    #[test]
    fn full_axis_torus_closes_in_one_hop() {
        let g = grid();
        let route = route_x_row(
            &g,
            Coord::new(0, 1, 1),
            8,
            ConnType::Torus,
            RouterMode::Preferred,
            false,
        )
        .unwrap();
        assert_eq!(route.hops.iter().filter(|h| h.member).count(), 8);
        let closure = route.closure.unwrap();
        // 7.3 wraps straight onto 0.4
        assert!(closure.mids.is_empty());
        assert_eq!(closure.exit_port, 3);
        assert_eq!(closure.origin_in, 4);
    }

    #[test]
    fn short_torus_detours_over_the_skip_cables() {
        let g = grid();
        let route = route_x_row(
            &g,
            Coord::new(0, 0, 0),
            2,
            ConnType::Torus,
            RouterMode::Preferred,
            false,
        )
        .unwrap();
        let closure = route.closure.unwrap();
        // best loop back from node 1 rides the next-over cables: 1-3-5-7-0
        assert_eq!(closure.mids.len(), 3);
        assert_eq!(closure.origin_in, 2);
    }

    #[test]
    fn contiguous_torus_rejects_detoured_closure() {
        let g = grid();
        // a 2-long torus only closes through three passthrough hops, which
        // a contiguous block forbids
        assert!(route_x_row(
            &g,
            Coord::new(0, 0, 0),
            2,
            ConnType::Torus,
            RouterMode::Preferred,
            true,
        )
        .is_none());
    }

    #[test]
    fn contiguous_full_axis_torus_still_closes() {
        let g = grid();
        let route = route_x_row(
            &g,
            Coord::new(0, 0, 0),
            8,
            ConnType::Torus,
            RouterMode::Preferred,
            true,
        )
        .unwrap();
        let closure = route.closure.unwrap();
        assert!(closure.mids.is_empty());
    }

    #[test]
    fn blocked_ports_make_the_row_unroutable() {
        let mut g = grid();
        for x in [1usize] {
            let sw = g.node_mut(Coord::new(x, 0, 0)).switch_mut(Dim::X);
            sw.connect(3, 5);
            sw.connect(4, 2);
        }
        assert!(route_x_row(
            &g,
            Coord::new(0, 0, 0),
            2,
            ConnType::Mesh,
            RouterMode::Relaxed,
            false,
        )
        .is_none());
    }

    #[test]
    fn committed_row_respects_pairing() {
        let mut g = grid();
        let route = route_x_row(
            &g,
            Coord::new(0, 2, 3),
            2,
            ConnType::Torus,
            RouterMode::Preferred,
            false,
        )
        .unwrap();
        let mut txn = WireTxn::new();
        commit_x_row(&mut g, &mut txn, &route, 2, 3).unwrap();
        txn.commit();
        for x in 0..8 {
            let sw = g.node(Coord::new(x, 2, 3)).switch(Dim::X);
            for p in 0..6 {
                let w = sw.int_wire[p];
                assert_eq!(w.used, sw.int_wire[w.port_tar].used, "port {p} at x{x}");
                assert_eq!(sw.int_wire[w.port_tar].port_tar, p);
            }
        }
    }
}
