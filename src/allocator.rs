// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

//! The allocator aggregate: grid lifecycle, the placement loop, block
//! teardown and the scheduler-facing state imports.

use std::collections::HashSet;

use crate::bridge::{import_wires, BpMap, Bridge};
use crate::errors::{AllocError, InitError};
use crate::geometry::{Coord, Dim, Geometry};
use crate::grid::Grid;
use crate::naming::{block_name, parse_node_name};
use crate::node::{block_color, block_letter, NodeState};
use crate::request::{ConnType, Request, RequestSpec};
use crate::router::{commit_x_row, route_x_row, stitch_yz, RouterMode, WireTxn};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Fallback machine sizing when neither dims nor a node list is supplied.
pub const DEFAULT_DIMS: [usize; 3] = [8, 4, 4];
const DEFAULT_PREFIX: &str = "bgl";

/// One scheduler node record fed to `init` or `refresh_nodes`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NodeInfo {
    pub name: String,
    pub state: NodeState,
}

/// Machine description for `init`. Dimensions are taken from `dims` when
/// set, otherwise decoded from the node names, otherwise defaulted.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Setup {
    pub dims: Option<[usize; 3]>,
    pub nodes: Vec<NodeInfo>,
    pub one_dim: bool,
    /// Node name prefix; decoded from the node list when absent.
    pub prefix: Option<String>,
    /// Names to take out of circulation immediately.
    pub down_nodes: Vec<String>,
}

/// A committed block: its name, members, shape and display tags.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Placement {
    pub name: String,
    pub nodes: Vec<Coord>,
    pub geometry: Geometry,
    pub conn_type: ConnType,
    pub letter: char,
    pub color: u8,
}

/// Everything that constrains where a request can land. Two requests with
/// the same key exhaust exactly the same placements, so one's failure
/// short-circuits the other until the grid state changes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RequestKey {
    geos: Vec<Geometry>,
    conn_type: ConnType,
    force_contig: bool,
    start: Option<Coord>,
}

impl RequestKey {
    fn of(req: &Request) -> Self {
        RequestKey {
            geos: req.elongate_geos.clone(),
            conn_type: req.conn_type,
            force_contig: req.force_contig,
            start: req.start,
        }
    }
}

/// The partition allocator. Holds the grid, the block display counters, the
/// failed-request memo and the hardware bp map.
#[derive(Debug, Default)]
pub struct BlockAllocator {
    grid: Option<Grid>,
    prefix: String,
    color_count: usize,
    /// Requests that found no fit in the current grid state.
    failed_requests: HashSet<RequestKey>,
    bp_map: BpMap,
}

impl BlockAllocator {
    pub fn new() -> Self {
        BlockAllocator::default()
    }

    /// Size and wire the grid. Idempotent: a second call on a live
    /// allocator is a no-op.
    pub fn init(&mut self, setup: Setup) -> Result<(), InitError> {
        if self.grid.is_some() {
            tracing::debug!("init called on a live allocator; ignoring");
            return Ok(());
        }
        let one_dim = setup.one_dim;
        let mut prefix = setup.prefix.clone();
        let dims = match setup.dims {
            Some(dims) => dims,
            None if !setup.nodes.is_empty() => {
                let mut dims = [0usize; 3];
                for info in &setup.nodes {
                    let (p, coord) = parse_node_name(&info.name, one_dim)?;
                    if prefix.is_none() {
                        prefix = Some(p.to_string());
                    }
                    for d in Dim::ALL {
                        dims[d.index()] = dims[d.index()].max(coord.get(d) + 1);
                    }
                }
                dims
            }
            None => DEFAULT_DIMS,
        };
        let mut grid = Grid::new(dims, one_dim)?;
        for info in &setup.nodes {
            let (_, coord) = parse_node_name(&info.name, one_dim)?;
            if !grid.contains(coord) {
                tracing::warn!(node = %info.name, %coord, "node outside the grid; skipped");
                continue;
            }
            grid.import_state(coord, info.state);
        }
        for name in &setup.down_nodes {
            let (_, coord) = parse_node_name(name, one_dim)?;
            if grid.contains(coord) {
                grid.node_mut(coord).set_down();
            }
        }
        self.prefix = prefix.unwrap_or_else(|| DEFAULT_PREFIX.to_string());
        self.grid = Some(grid);
        tracing::info!(?dims, one_dim, prefix = %self.prefix, "allocator initialized");
        Ok(())
    }

    /// `init`, then replace the synthetic wiring with the live cabling the
    /// bridge reports.
    pub fn init_with_bridge(
        &mut self,
        setup: Setup,
        bridge: &dyn Bridge,
    ) -> Result<(), InitError> {
        self.init(setup)?;
        self.bp_map.set_bp_map(bridge);
        if let Some(grid) = self.grid.as_mut() {
            import_wires(grid, bridge, &self.bp_map);
        }
        Ok(())
    }

    /// Drop the grid; every subsequent operation reports `NotInitialized`
    /// until the next `init`.
    pub fn fini(&mut self) {
        if self.grid.take().is_some() {
            tracing::info!("allocator finalized");
        }
        self.failed_requests.clear();
        self.color_count = 0;
    }

    pub fn grid(&self) -> Option<&Grid> {
        self.grid.as_ref()
    }

    pub fn grid_mut(&mut self) -> Option<&mut Grid> {
        self.grid.as_mut()
    }

    fn grid_ok(&mut self) -> Result<&mut Grid, AllocError> {
        self.grid.as_mut().ok_or(AllocError::NotInitialized)
    }

    /// State changed: repeated failing requests must search again.
    fn touch(&mut self) {
        self.failed_requests.clear();
    }

    /// Take one node out of circulation.
    pub fn set_node_down(&mut self, coord: Coord) -> Result<(), AllocError> {
        let grid = self.grid_ok()?;
        if !grid.contains(coord) {
            return Err(AllocError::UnknownNode(coord));
        }
        grid.node_mut(coord).set_down();
        tracing::info!(%coord, "node marked down");
        self.touch();
        Ok(())
    }

    /// Normalize a request against the live grid sizing.
    pub fn new_request(&self, spec: RequestSpec) -> Result<Request, AllocError> {
        let grid = self.grid.as_ref().ok_or(AllocError::NotInitialized)?;
        Ok(Request::new(spec, grid.dims())?)
    }

    /// Walk the candidate geometries and grid origins until one placement
    /// commits. A failed request is memoized by its constraining inputs and
    /// short-circuits identical requests until the allocator state changes.
    pub fn allocate_block(&mut self, req: &mut Request) -> Result<Placement, AllocError> {
        if self.grid.is_none() {
            return Err(AllocError::NotInitialized);
        }
        let key = RequestKey::of(req);
        if self.failed_requests.contains(&key) {
            tracing::debug!(
                size = req.size,
                "identical request already failed in this grid state; short-circuit"
            );
            return Err(AllocError::NoFit);
        }
        loop {
            let geo = req.current_geometry();
            let origin = match req.start {
                Some(start) => self.try_origin(start, geo, req).map(|_| start),
                None => {
                    let origins: Vec<Coord> = self
                        .grid
                        .as_ref()
                        .expect("checked above")
                        .scan_order()
                        .collect();
                    origins
                        .into_iter()
                        .find(|&o| self.try_origin(o, geo, req).is_some())
                }
            };
            if let Some(origin) = origin {
                let placement = self.commit_placement(origin, geo, req.conn_type)?;
                req.save_name = Some(placement.name.clone());
                return Ok(placement);
            }
            if !req.advance() {
                break;
            }
        }
        self.failed_requests.insert(key);
        tracing::debug!(size = req.size, "no fit for any candidate geometry");
        Err(AllocError::NoFit)
    }

    /// Attempt the block at one origin, leaving the wires committed on
    /// success. Returns the member list, or `None` with the grid untouched.
    fn try_origin(&mut self, origin: Coord, geo: Geometry, req: &Request) -> Option<Vec<Coord>> {
        let grid = self.grid.as_mut().expect("caller checked");
        if !origin_fits(grid, origin, geo) {
            return None;
        }
        match place_wires(grid, origin, geo, req.conn_type, req.force_contig) {
            Ok(members) => Some(members),
            Err(_) => None,
        }
    }

    /// Mark the freshly wired members used and build the placement record.
    fn commit_placement(
        &mut self,
        origin: Coord,
        geo: Geometry,
        conn: ConnType,
    ) -> Result<Placement, AllocError> {
        let letter = block_letter(self.color_count);
        let color = block_color(self.color_count);
        let one_dim;
        let members = {
            let grid = self.grid_ok()?;
            one_dim = grid.one_dim();
            let members = block_members(origin, geo);
            for &m in &members {
                let node = grid.node_mut(m);
                node.used = true;
                node.letter = letter;
                node.color = color;
            }
            members
        };
        self.color_count += 1;
        self.touch();
        let name = block_name(&self.prefix, &members, one_dim);
        tracing::info!(%name, %origin, %geo, ?conn, "block allocated");
        Ok(Placement {
            name,
            nodes: members,
            geometry: geo,
            conn_type: conn,
            letter,
            color,
        })
    }

    /// Place a block at a fixed origin; used both directly by
    /// `allocate_block` internals and when reinstating a block from
    /// persistent configuration. Unlike the search loop, failures surface.
    pub fn place_block(
        &mut self,
        start: Coord,
        geometry: Geometry,
        conn: ConnType,
    ) -> Result<Placement, AllocError> {
        let grid = self.grid_ok()?;
        if !grid.contains(start) {
            return Err(AllocError::UnknownNode(start));
        }
        if !origin_fits(grid, start, geometry) {
            return Err(AllocError::NoFit);
        }
        place_wires(grid, start, geometry, conn, false)?;
        self.commit_placement(start, geometry, conn)
    }

    /// Tear a block down: unwind every path its members anchor, then reset
    /// the members to idle.
    pub fn remove_block(&mut self, nodes: &[Coord]) -> Result<(), AllocError> {
        let grid = self.grid_ok()?;
        for &c in nodes {
            if !grid.contains(c) {
                return Err(AllocError::UnknownNode(c));
            }
        }
        for &c in nodes {
            for dim in Dim::ALL {
                reset_path(grid, c, dim);
            }
            grid.node_mut(c).set_idle();
        }
        tracing::info!(members = nodes.len(), "block removed");
        self.touch();
        Ok(())
    }

    /// Rebuild a block in place: tear it down and re-place the same shape
    /// at its minimum corner.
    pub fn redo_block(
        &mut self,
        nodes: &[Coord],
        geometry: Geometry,
        conn: ConnType,
    ) -> Result<Placement, AllocError> {
        let start = nodes
            .iter()
            .copied()
            .min()
            .ok_or(AllocError::NoFit)?;
        self.remove_block(nodes)?;
        self.place_block(start, geometry, conn)
    }

    /// Re-routing a live block to a new connection type is not implemented;
    /// the intended semantics are recorded in DESIGN.md.
    pub fn alter_block(
        &mut self,
        _nodes: &[Coord],
        _conn: ConnType,
    ) -> Result<Placement, AllocError> {
        Err(AllocError::Unsupported("alter_block"))
    }

    /// Drop every block and node flag, preserving grid sizing and wiring.
    pub fn reset_system(&mut self) -> Result<(), AllocError> {
        self.grid_ok()?.reset_nodes();
        self.color_count = 0;
        self.touch();
        tracing::info!("system reset");
        Ok(())
    }

    /// Re-import node states from the scheduler. Undecodable names are
    /// logged and skipped.
    pub fn refresh_nodes(&mut self, infos: &[NodeInfo]) -> Result<(), AllocError> {
        let grid = self.grid_ok()?;
        let one_dim = grid.one_dim();
        for info in infos {
            let coord = match parse_node_name(&info.name, one_dim) {
                Ok((_, coord)) => coord,
                Err(err) => {
                    tracing::warn!(node = %info.name, %err, "skipping node refresh");
                    continue;
                }
            };
            if !grid.contains(coord) {
                tracing::warn!(node = %info.name, %coord, "node outside the grid; skipped");
                continue;
            }
            grid.import_state(coord, info.state);
        }
        self.touch();
        Ok(())
    }

    pub fn set_bp_map(&mut self, bridge: &dyn Bridge) {
        self.bp_map.set_bp_map(bridge);
    }

    pub fn find_bp_loc(&self, bp_id: &str) -> Option<Coord> {
        self.bp_map.find_bp_loc(bp_id)
    }

    pub fn find_bp_rack_mid(&self, coord: Coord) -> Option<&str> {
        self.bp_map.find_bp_rack_mid(coord)
    }
}

/// The members of a block in deterministic order.
fn block_members(origin: Coord, geo: Geometry) -> Vec<Coord> {
    let mut out = Vec::with_capacity(geo.size());
    for z in 0..geo.0[2] {
        for y in 0..geo.0[1] {
            for x in 0..geo.0[0] {
                out.push(Coord::new(origin.x + x, origin.y + y, origin.z + z));
            }
        }
    }
    out
}

/// Cheap origin screen: the box stays inside the grid, every member is
/// free, and on a multi-node X axis every member switch still has a usable
/// outbound and inbound external port.
fn origin_fits(grid: &Grid, origin: Coord, geo: Geometry) -> bool {
    let dims = grid.dims();
    for d in Dim::ALL {
        if origin.get(d) + geo.get(d) > dims[d.index()] {
            return false;
        }
    }
    for m in block_members(origin, geo) {
        let node = grid.node(m);
        if node.used {
            return false;
        }
        if geo.get(Dim::X) > 1 {
            let sw = node.switch(Dim::X);
            let out_free = sw.port_free(3) || sw.port_free(5);
            let in_free = sw.port_free(4) || sw.port_free(2);
            if !out_free || !in_free {
                return false;
            }
        }
    }
    true
}

/// Wire one block under a transaction: X rows first (origin row routed,
/// then replicated to every (y, z) plane of the block), then the Y/Z
/// stitch. Any collision rolls the whole attempt back.
fn place_wires(
    grid: &mut Grid,
    origin: Coord,
    geo: Geometry,
    conn: ConnType,
    force_contig: bool,
) -> Result<Vec<Coord>, AllocError> {
    let members = block_members(origin, geo);
    let gx = geo.get(Dim::X);
    let mut last_err = AllocError::NoFit;
    for mode in [RouterMode::Preferred, RouterMode::Relaxed] {
        let route = if gx > 1 {
            match route_x_row(grid, origin, gx, conn, mode, force_contig) {
                Some(route) => Some(route),
                None => continue,
            }
        } else {
            None
        };
        let mut txn = WireTxn::new();
        let attempt = (|| {
            if let Some(route) = &route {
                for z in 0..geo.0[2] {
                    for y in 0..geo.0[1] {
                        commit_x_row(grid, &mut txn, route, origin.y + y, origin.z + z)?;
                    }
                }
            }
            stitch_yz(grid, &mut txn, origin, geo, conn, &members)
        })();
        match attempt {
            Ok(()) => {
                tracing::debug!(%origin, %geo, ?mode, wires = txn.wire_count(), "block wired");
                txn.commit();
                return Ok(members);
            }
            Err(err) => {
                txn.rollback(grid);
                last_err = err;
            }
        }
        if gx <= 1 {
            // nothing mode-dependent to retry
            break;
        }
    }
    Err(last_err)
}

/// Unwind the paths anchored at a member's fabric ports: free the fabric
/// pair, then follow the external cables through passthrough switches,
/// freeing each straight-through pair, until another member's fabric or an
/// already-free port ends the walk.
fn reset_path(grid: &mut Grid, coord: Coord, dim: Dim) {
    for fabric in [0usize, 1] {
        let pair = grid.node(coord).switch(dim).int_wire[fabric];
        if !pair.used || pair.port_tar == fabric {
            continue;
        }
        let mut port = pair.port_tar;
        grid.node_mut(coord).switch_mut(dim).disconnect(fabric);
        let mut cur = coord;
        loop {
            let ext = grid.node(cur).switch(dim).ext_wire[port];
            let (nc, np) = (ext.node_tar, ext.port_tar);
            if nc == cur && np == port {
                break;
            }
            let wire = grid.node(nc).switch(dim).int_wire[np];
            if !wire.used || wire.port_tar <= 1 {
                // open end, or another member's fabric pair (freed by its
                // own reset)
                break;
            }
            grid.node_mut(nc).switch_mut(dim).disconnect(np);
            cur = nc;
            port = wire.port_tar;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alloc() -> BlockAllocator {
        let mut a = BlockAllocator::new();
        a.init(Setup { dims: Some([8, 4, 4]), ..Default::default() }).unwrap();
        a
    }

    #[test]
    fn operations_before_init_report_it() {
        let mut a = BlockAllocator::new();
        assert_eq!(
            a.set_node_down(Coord::new(0, 0, 0)),
            Err(AllocError::NotInitialized)
        );
        assert!(matches!(
            a.new_request(RequestSpec { size: 4, ..Default::default() }),
            Err(AllocError::NotInitialized)
        ));
    }

    #[test]
    fn init_sizes_from_node_names() {
        let mut a = BlockAllocator::new();
        let nodes = (0..8)
            .flat_map(|x| {
                (0..4).flat_map(move |y| {
                    (0..4).map(move |z| NodeInfo {
                        name: format!("bgl{x}{y}{z}"),
                        state: NodeState::Idle,
                    })
                })
            })
            .collect();
        a.init(Setup { nodes, ..Default::default() }).unwrap();
        assert_eq!(a.grid().unwrap().dims(), [8, 4, 4]);
    }

    #[test]
    fn init_is_idempotent() {
        let mut a = alloc();
        a.init(Setup { dims: Some([4, 2, 2]), ..Default::default() }).unwrap();
        assert_eq!(a.grid().unwrap().dims(), [8, 4, 4]);
    }

    #[test]
    fn down_nodes_are_skipped_by_placement() {
        let mut a = alloc();
        a.set_node_down(Coord::new(0, 0, 0)).unwrap();
        let mut req = a
            .new_request(RequestSpec {
                geometry: Some(Geometry::new(2, 4, 4)),
                conn_type: ConnType::Mesh,
                ..Default::default()
            })
            .unwrap();
        let p = a.allocate_block(&mut req).unwrap();
        assert!(!p.nodes.contains(&Coord::new(0, 0, 0)));
    }

    #[test]
    fn failed_requests_short_circuit_until_state_changes() {
        let mut a = alloc();
        // fill the whole machine
        let mut req = a
            .new_request(RequestSpec { size: 128, elongate: true, ..Default::default() })
            .unwrap();
        a.allocate_block(&mut req).unwrap();

        let mut small = a
            .new_request(RequestSpec { size: 4, elongate: true, ..Default::default() })
            .unwrap();
        assert_eq!(a.allocate_block(&mut small), Err(AllocError::NoFit));
        // memoized now; the identical request fails fast
        let mut again = a
            .new_request(RequestSpec { size: 4, elongate: true, ..Default::default() })
            .unwrap();
        assert_eq!(a.allocate_block(&mut again), Err(AllocError::NoFit));

        let all: Vec<Coord> = (0..8)
            .flat_map(|x| (0..4).flat_map(move |y| (0..4).map(move |z| Coord::new(x, y, z))))
            .collect();
        a.remove_block(&all).unwrap();
        let mut after = a
            .new_request(RequestSpec { size: 4, elongate: true, ..Default::default() })
            .unwrap();
        assert!(a.allocate_block(&mut after).is_ok());
    }

    #[test]
    fn pinned_failure_does_not_poison_other_requests() {
        let mut a = alloc();
        // a 4-long X line pinned at x=5 runs off the grid and can never fit
        let mut pinned = a
            .new_request(RequestSpec {
                geometry: Some(Geometry::new(4, 1, 1)),
                start: Some(Coord::new(5, 0, 0)),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(a.allocate_block(&mut pinned), Err(AllocError::NoFit));

        // the same shape unpinned places trivially on the empty machine
        let mut free = a
            .new_request(RequestSpec {
                geometry: Some(Geometry::new(4, 1, 1)),
                ..Default::default()
            })
            .unwrap();
        let p = a.allocate_block(&mut free).unwrap();
        assert_eq!(p.nodes.len(), 4);

        // mesh and torus are distinct requests too
        let mut mesh = a
            .new_request(RequestSpec {
                geometry: Some(Geometry::new(4, 1, 1)),
                conn_type: ConnType::Mesh,
                start: Some(Coord::new(5, 0, 0)),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(a.allocate_block(&mut mesh), Err(AllocError::NoFit));
    }

    #[test]
    fn refresh_keeps_live_members_used() {
        let mut a = alloc();
        let mut req = a
            .new_request(RequestSpec {
                geometry: Some(Geometry::new(2, 2, 2)),
                conn_type: ConnType::Torus,
                ..Default::default()
            })
            .unwrap();
        let block = a.allocate_block(&mut req).unwrap();
        assert!(block.nodes.contains(&Coord::new(0, 0, 0)));

        // the scheduler reports live members as allocated; that must not
        // release their ports
        a.refresh_nodes(&[NodeInfo {
            name: "bgl000".into(),
            state: NodeState::Allocated,
        }])
        .unwrap();
        let node = a.grid().unwrap().node(Coord::new(0, 0, 0));
        assert!(node.used);
        assert_eq!(node.letter, block.letter);

        assert_eq!(
            a.place_block(Coord::new(0, 0, 0), Geometry::new(1, 1, 1), ConnType::Mesh),
            Err(AllocError::NoFit)
        );
    }

    #[test]
    fn remove_block_restores_pristine_wiring() {
        let mut a = alloc();
        let pristine = a.grid().unwrap().clone();
        let mut req = a
            .new_request(RequestSpec {
                geometry: Some(Geometry::new(2, 2, 2)),
                conn_type: ConnType::Torus,
                ..Default::default()
            })
            .unwrap();
        let p = a.allocate_block(&mut req).unwrap();
        a.remove_block(&p.nodes).unwrap();
        let grid = a.grid().unwrap();
        for (n, pn) in grid.nodes().zip(pristine.nodes()) {
            assert_eq!(n, pn, "node {} not restored", pn.coord);
        }
    }

    #[test]
    fn alter_is_unsupported() {
        let mut a = alloc();
        assert_eq!(
            a.alter_block(&[Coord::new(0, 0, 0)], ConnType::Mesh),
            Err(AllocError::Unsupported("alter_block"))
        );
    }
}
