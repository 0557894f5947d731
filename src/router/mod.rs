// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

//! Wire-path search over the switch graph: X-axis threading with torus
//! closure and passthrough detours, Y/Z stitching, and the transaction that
//! keeps the graph consistent when a search dead-ends.

pub mod path;
pub mod xroute;
pub mod yzroute;

pub use path::{PathHop, WireTxn, BEST_COUNT_INIT};
pub use xroute::{commit_x_row, route_x_row, RouterMode, XRoute};
pub use yzroute::stitch_yz;
