// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

//! Hostlist-style node and block names. A 3-D node name ends in three
//! decimal digits encoding its coordinate (`bgl103` is (1, 0, 3)); the 1-D
//! variant carries a bare integer suffix.

use crate::errors::InitError;
use crate::geometry::Coord;

/// Split a node name into its prefix and decoded coordinate. 1-D names put
/// the whole numeric suffix on the X axis.
pub fn parse_node_name(name: &str, one_dim: bool) -> Result<(&str, Coord), InitError> {
    let digits = name.len() - name.chars().rev().take_while(|c| c.is_ascii_digit()).count();
    let (prefix, suffix) = name.split_at(digits);
    if suffix.is_empty() {
        return Err(InitError::BadNodeName(name.to_string()));
    }
    if one_dim {
        let x: usize = suffix
            .parse()
            .map_err(|_| InitError::BadNodeName(name.to_string()))?;
        return Ok((prefix, Coord::new(x, 0, 0)));
    }
    if suffix.len() != 3 {
        return Err(InitError::BadNodeName(name.to_string()));
    }
    let n: usize = suffix
        .parse()
        .map_err(|_| InitError::BadNodeName(name.to_string()))?;
    Ok((prefix, Coord::new(n / 100, (n / 10) % 10, n % 10)))
}

/// Deterministic block name from the member coordinates: the bounding box
/// corners in hostlist form (`bgl[000x233]`), a single bracketed coordinate
/// for one node, or a plain range in 1-D mode.
pub fn block_name(prefix: &str, nodes: &[Coord], one_dim: bool) -> String {
    debug_assert!(!nodes.is_empty());
    if one_dim {
        let lo = nodes.iter().map(|c| c.x).min().unwrap_or(0);
        let hi = nodes.iter().map(|c| c.x).max().unwrap_or(0);
        return if lo == hi {
            format!("{prefix}[{lo}]")
        } else {
            format!("{prefix}[{lo}-{hi}]")
        };
    }
    let mut lo = nodes[0];
    let mut hi = nodes[0];
    for c in nodes {
        lo.x = lo.x.min(c.x);
        lo.y = lo.y.min(c.y);
        lo.z = lo.z.min(c.z);
        hi.x = hi.x.max(c.x);
        hi.y = hi.y.max(c.y);
        hi.z = hi.z.max(c.z);
    }
    if lo == hi {
        format!("{prefix}[{lo}]")
    } else {
        format!("{prefix}[{lo}x{hi}]")
    }
}
