// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

//! Partition allocator for 3-D torus/mesh machines.
//!
//! The machine is a grid of base-partitions, each with one six-port
//! crossbar switch per axis. A block request (a node count or an explicit
//! shape, torus or mesh) is normalized into a deterministic candidate list,
//! then placed by searching grid origins and threading wire paths through
//! the switches: the X axis by DFS over the split cabling (with torus
//! closure and passthrough detours), Y and Z by stitching successor rings.
//! Committed blocks hold their wiring until explicit teardown.
//!
//! [`BlockAllocator`] is the entry point:
//!
//! ```
//! use blockalloc::{BlockAllocator, ConnType, RequestSpec, Setup};
//!
//! let mut alloc = BlockAllocator::new();
//! alloc.init(Setup { dims: Some([8, 4, 4]), ..Default::default() })?;
//! let mut req = alloc.new_request(RequestSpec {
//!     size: 32,
//!     rotate: true,
//!     elongate: true,
//!     conn_type: ConnType::Torus,
//!     ..Default::default()
//! })?;
//! let block = alloc.allocate_block(&mut req)?;
//! alloc.remove_block(&block.nodes)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod allocator;
pub mod bridge;
pub mod errors;
pub mod geometry;
pub mod grid;
pub mod naming;
pub mod node;
pub mod request;
pub mod router;
pub mod switch;

pub use allocator::{BlockAllocator, NodeInfo, Placement, Setup, DEFAULT_DIMS};
pub use bridge::{Bridge, BridgeMidplane, BridgeWire};
pub use errors::{AllocError, InitError, RequestError};
pub use geometry::{Coord, Dim, Geometry};
pub use grid::Grid;
pub use node::{Node, NodeState};
pub use request::{ConnType, Request, RequestSpec};
