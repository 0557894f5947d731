// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::collections::HashMap;

use crate::errors::InitError;
use crate::geometry::{Coord, Dim};
use crate::grid::Grid;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A midplane as reported by the vendor bridge: its base-partition id
/// (e.g. `"R010"`) and where hardware discovery placed it in the grid.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BridgeMidplane {
    pub bp_id: String,
    pub coord: Coord,
    /// Physical rack index, for passthrough ordering.
    pub phys_x: usize,
}

/// A live wire as reported by the bridge. The id encodes the axis and both
/// endpoint base-partitions: `X<bp>_<bp>`, `Y…`, `Z…`. Ports come in the
/// hardware 6..=11 numbering.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BridgeWire {
    pub id: String,
    pub from_port: usize,
    pub to_port: usize,
}

/// Opaque interface to the vendor bridge library. The allocator only reads
/// midplane placement and live wire endpoints through it; booting blocks is
/// someone else's job.
pub trait Bridge {
    fn midplanes(&self) -> Vec<BridgeMidplane>;
    fn wires(&self) -> Vec<BridgeWire>;
}

/// Map hardware port numbering (6..=11) to the internal 0..=5 indices.
pub fn hw_port(port: usize) -> Option<usize> {
    if (6..=11).contains(&port) {
        Some(port - 6)
    } else {
        None
    }
}

/// Split a wire id into its axis and the two endpoint bp ids.
pub fn parse_wire_id(id: &str) -> Result<(Dim, &str, &str), InitError> {
    let bad = || InitError::BadWireId(id.to_string());
    let mut chars = id.chars();
    let dim = match chars.next() {
        Some('X') => Dim::X,
        Some('Y') => Dim::Y,
        Some('Z') => Dim::Z,
        _ => return Err(bad()),
    };
    let rest = chars.as_str();
    let (from, to) = rest.split_once('_').ok_or_else(bad)?;
    if from.is_empty() || to.is_empty() {
        return Err(bad());
    }
    Ok((dim, from, to))
}

/// Bidirectional base-partition-id <-> coordinate map, populated from the
/// bridge. `smap` uses the inverse direction.
#[derive(Debug, Clone, Default)]
pub struct BpMap {
    by_id: HashMap<String, Coord>,
    by_coord: HashMap<Coord, String>,
}

impl BpMap {
    pub fn set_bp_map(&mut self, bridge: &dyn Bridge) {
        self.by_id.clear();
        self.by_coord.clear();
        for mp in bridge.midplanes() {
            self.by_id.insert(mp.bp_id.clone(), mp.coord);
            self.by_coord.insert(mp.coord, mp.bp_id);
        }
        tracing::debug!(midplanes = self.by_id.len(), "bp map populated");
    }

    pub fn find_bp_loc(&self, bp_id: &str) -> Option<Coord> {
        self.by_id.get(bp_id).copied()
    }

    pub fn find_bp_rack_mid(&self, coord: Coord) -> Option<&str> {
        self.by_coord.get(&coord).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

/// Import the live wiring from the bridge, replacing the synthetic external
/// tables. Wires with endpoints outside the grid are logged and skipped, as
/// are wires whose two endpoint reports disagree; the surrounding scheduler
/// must come up even on a partially cabled machine.
pub fn import_wires(grid: &mut Grid, bridge: &dyn Bridge, map: &BpMap) {
    grid.clear_ext_wires();
    for mp in bridge.midplanes() {
        if grid.contains(mp.coord) {
            grid.node_mut(mp.coord).phys_x = mp.phys_x;
        }
    }
    for wire in bridge.wires() {
        let (dim, from_id, to_id) = match parse_wire_id(&wire.id) {
            Ok(parts) => parts,
            Err(err) => {
                tracing::warn!(wire = %wire.id, %err, "skipping unparsable wire");
                continue;
            }
        };
        let (Some(from), Some(to)) = (map.find_bp_loc(from_id), map.find_bp_loc(to_id))
        else {
            tracing::warn!(wire = %wire.id, "skipping wire with unknown endpoint");
            continue;
        };
        if !grid.contains(from) || !grid.contains(to) {
            let coord = if grid.contains(from) { to } else { from };
            tracing::warn!(
                wire = %wire.id,
                %coord,
                "skipping wire outside the grid"
            );
            continue;
        }
        let (Some(sport), Some(tport)) = (hw_port(wire.from_port), hw_port(wire.to_port))
        else {
            tracing::warn!(
                wire = %wire.id,
                from_port = wire.from_port,
                to_port = wire.to_port,
                "skipping wire with out-of-range ports"
            );
            continue;
        };
        if conflicting(grid, from, dim, sport, to, tport)
            || conflicting(grid, to, dim, tport, from, sport)
        {
            let err = InitError::TopologyViolation(wire.id.clone());
            tracing::warn!(wire = %wire.id, %err, "skipping wire");
            continue;
        }
        grid.switch_config(from, to, dim, sport, tport);
    }
}

/// True when `port` on `coord` is already cabled to somewhere other than the
/// endpoint this wire reports.
fn conflicting(
    grid: &Grid,
    coord: Coord,
    dim: Dim,
    port: usize,
    peer: Coord,
    peer_port: usize,
) -> bool {
    let e = grid.node(coord).switch(dim).ext_wire[port];
    let self_loop = e.node_tar == coord && e.port_tar == port;
    let matches_peer = e.node_tar == peer && e.port_tar == peer_port;
    !self_loop && !matches_peer
}
