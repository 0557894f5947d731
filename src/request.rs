// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use crate::errors::RequestError;
use crate::geometry::{Coord, Geometry};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Connection type of a block: torus closes a ring along every axis of
/// length > 1, mesh leaves the ends open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ConnType {
    #[default]
    Torus,
    Mesh,
}

/// Caller's description of the block to carve out.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RequestSpec {
    /// Exact shape; `None` derives a shape from `size`.
    pub geometry: Option<Geometry>,
    /// Node count; ignored when `geometry` is explicit.
    pub size: usize,
    /// Try the six axis permutations of each candidate.
    pub rotate: bool,
    /// Try alternative shapes of the same size.
    pub elongate: bool,
    pub conn_type: ConnType,
    /// Must occupy a contiguous region (no passthrough detours).
    pub force_contig: bool,
    /// Fixed origin, if the caller pins one.
    pub start: Option<Coord>,
}

/// A normalized request: the deterministic candidate list plus the cursors
/// the placement loop advances through it.
#[derive(Debug, Clone)]
pub struct Request {
    pub conn_type: ConnType,
    pub rotate: bool,
    pub elongate: bool,
    pub force_contig: bool,
    pub start: Option<Coord>,
    pub size: usize,
    /// Candidate shapes in try-order.
    pub elongate_geos: Vec<Geometry>,
    pub rotate_count: usize,
    pub elongate_count: usize,
    /// Block name, filled in on successful allocation.
    pub save_name: Option<String>,
    geo: Geometry,
}

impl Request {
    /// Normalize a request against the grid dimensions, producing the
    /// candidate geometry list: degenerate line, square, full slab, greedy
    /// decomposition plus its squeeze variants, pad-up, cube.
    pub fn new(spec: RequestSpec, dims: [usize; 3]) -> Result<Request, RequestError> {
        let total = dims[0] * dims[1] * dims[2];
        let (size, explicit) = match spec.geometry {
            Some(g) => {
                if g.0.iter().any(|&v| v == 0) || !g.fits(&dims) {
                    return Err(RequestError::InvalidGeometry { geometry: g, dims });
                }
                (g.size(), Some(g))
            }
            None => (spec.size, None),
        };
        if size < 1 || size > total {
            return Err(RequestError::ImpossibleSize { size, total });
        }

        let mut geos = Vec::new();
        if let Some(g) = explicit {
            geos.push(g);
        }
        if spec.elongate || explicit.is_none() {
            elongate_candidates(&mut geos, size, dims, spec.rotate);
        }
        if geos.is_empty() {
            return Err(RequestError::ImpossibleSize { size, total });
        }

        let geo = geos[0];
        Ok(Request {
            conn_type: spec.conn_type,
            rotate: spec.rotate,
            elongate: spec.elongate,
            force_contig: spec.force_contig,
            start: spec.start,
            size,
            elongate_geos: geos,
            rotate_count: 0,
            elongate_count: 0,
            save_name: None,
            geo,
        })
    }

    /// The orientation the placement loop should try next.
    pub fn current_geometry(&self) -> Geometry {
        self.geo
    }

    /// Advance to the next rotation of the current candidate, or to the next
    /// candidate once rotations are exhausted. Returns false when the whole
    /// sequence is spent.
    pub fn advance(&mut self) -> bool {
        if self.rotate && self.rotate_count < 5 {
            self.geo.rotate_step(self.rotate_count);
            self.rotate_count += 1;
            return true;
        }
        if self.elongate_count + 1 < self.elongate_geos.len() {
            self.elongate_count += 1;
            self.rotate_count = 0;
            self.geo = self.elongate_geos[self.elongate_count];
            return true;
        }
        false
    }
}

/// Append `geo` unless an equivalent shape is already listed or it cannot
/// fit. Derived candidates are stored in canonical (axes-ascending) form
/// when rotation will enumerate orientations anyway.
fn push_candidate(geos: &mut Vec<Geometry>, geo: Geometry, dims: [usize; 3], rotate: bool) {
    if geo.0.iter().any(|&v| v == 0) {
        return;
    }
    let fits = if rotate { fits_rotated(geo, dims) } else { geo.fits(&dims) };
    if !fits {
        return;
    }
    let stored = if rotate { geo.canonical() } else { geo };
    if geos.iter().any(|g| g.canonical() == stored.canonical()) {
        return;
    }
    geos.push(stored);
}

/// Some axis permutation of `geo` fits `dims`.
fn fits_rotated(geo: Geometry, dims: [usize; 3]) -> bool {
    let g = geo.canonical().0;
    let mut d = dims;
    d.sort_unstable();
    g[0] <= d[0] && g[1] <= d[1] && g[2] <= d[2]
}

fn elongate_candidates(geos: &mut Vec<Geometry>, size: usize, dims: [usize; 3], rotate: bool) {
    // degenerate line on Y
    if size <= dims[1] {
        push_candidate(geos, Geometry::new(1, size, 1), dims, rotate);
    }
    // square slab
    let r = isqrt(size);
    if r * r == size && size % 4 == 0 {
        push_candidate(geos, Geometry::new(1, r, r), dims, rotate);
    }
    // full Y*Z slab
    let yz = dims[1] * dims[2];
    if yz > 0 && size % yz == 0 {
        push_candidate(geos, Geometry::new(size / yz, dims[1], dims[2]), dims, rotate);
    }
    // greedy decomposition, then its squeeze variants
    if let Some(dec) = greedy_decompose(size, dims) {
        push_candidate(geos, dec, dims, rotate);
        let [gx, gy, gz] = dec.0;
        push_candidate(geos, Geometry::new(1, gx * gy, gz), dims, rotate);
        push_candidate(geos, Geometry::new(1, gy, gx * gz), dims, rotate);
        if gx % 2 == 0 {
            push_candidate(geos, Geometry::new(gx / 2, gy * 2, gz), dims, rotate);
            push_candidate(geos, Geometry::new(gx / 2, gy, gz * 2), dims, rotate);
        }
        // pad-up: full X but short on Y/Z; pad to the full cross-section
        // with the larger machine span on Y, shrinking X while the product
        // still covers the request
        if gx == dims[0] && (gy < dims[1] || gz < dims[2]) {
            let (py, pz) = if dims[1] < dims[2] {
                (dims[2], dims[1])
            } else {
                (dims[1], dims[2])
            };
            let mut x = dims[0];
            while x > 1 && (x - 1) * yz >= size {
                x -= 1;
            }
            push_candidate(geos, Geometry::new(x, py, pz), dims, rotate);
        }
    }
    // cube
    let c = icbrt(size);
    if c * c * c == size {
        push_candidate(geos, Geometry::new(c, c, c), dims, rotate);
    }
}

/// Find a geometry of at least `size` nodes that fits by construction:
/// grab whole axes while they divide evenly, otherwise the largest divisor
/// that fits; failing that, bump the size by one and restart.
fn greedy_decompose(size: usize, dims: [usize; 3]) -> Option<Geometry> {
    let total = dims[0] * dims[1] * dims[2];
    let mut sz = size;
    while sz <= total {
        if let Some(geo) = try_decompose(sz, dims) {
            return Some(geo);
        }
        sz += 1;
    }
    None
}

fn try_decompose(size: usize, dims: [usize; 3]) -> Option<Geometry> {
    let mut rem = size;
    let mut geo = [1usize; 3];
    for d in 0..3 {
        if rem == 1 {
            break;
        }
        if rem <= dims[d] {
            geo[d] = rem;
            rem = 1;
            break;
        }
        if rem % dims[d] == 0 {
            geo[d] = dims[d];
            rem /= dims[d];
            continue;
        }
        let mut q = dims[d].saturating_sub(1);
        loop {
            if q < 2 {
                return None;
            }
            if rem % q == 0 {
                geo[d] = q;
                rem /= q;
                break;
            }
            q -= 1;
        }
    }
    let geo = Geometry(geo);
    if rem == 1 && geo.fits(&dims) {
        Some(geo)
    } else {
        None
    }
}

fn isqrt(n: usize) -> usize {
    let mut r = 0;
    while (r + 1) * (r + 1) <= n {
        r += 1;
    }
    r
}

fn icbrt(n: usize) -> usize {
    let mut r = 0;
    while (r + 1) * (r + 1) * (r + 1) <= n {
        r += 1;
    }
    r
}
