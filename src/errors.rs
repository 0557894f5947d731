// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use crate::geometry::{Coord, Dim, Geometry};

/// Failures while sizing or wiring the grid.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InitError {
    #[error("dimension sizes {0:?} contain a zero axis")]
    ZeroDim([usize; 3]),
    #[error("unsupported X dimension {0}; only 4- and 8-wide X axes are cabled")]
    UnsupportedXDim(usize),
    #[error("node name {0:?} does not end in a grid coordinate")]
    BadNodeName(String),
    #[error("coordinate {coord} outside the {dims:?} grid")]
    BadCoord { coord: Coord, dims: [usize; 3] },
    #[error("malformed wire id {0:?}")]
    BadWireId(String),
    #[error("wire {0:?} endpoints disagree with their mirror")]
    TopologyViolation(String),
}

/// Failures while validating a block request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    #[error("geometry {geometry} does not fit the {dims:?} grid")]
    InvalidGeometry { geometry: Geometry, dims: [usize; 3] },
    #[error("size {size} impossible on a {total}-node machine")]
    ImpossibleSize { size: usize, total: usize },
}

/// Failures surfaced by the placement operations.
///
/// `WireCollision` is recovered internally by transaction rollback while the
/// search continues; it only reaches the caller from operations that target a
/// fixed origin (`place_block`, `redo_block`).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AllocError {
    #[error("allocator used before init")]
    NotInitialized,
    #[error("no fit: all candidate geometries exhausted")]
    NoFit,
    #[error("port {port} of the {dim:?} switch at {coord} is already wired")]
    WireCollision { coord: Coord, dim: Dim, port: usize },
    #[error("node {0} is not inside the grid")]
    UnknownNode(Coord),
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),
    #[error(transparent)]
    Request(#[from] RequestError),
}
