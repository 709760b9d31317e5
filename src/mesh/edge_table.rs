//! Cube corner/edge tables shared by every extraction.
//!
//! Corner `c` sits at offset `(c & 1, (c >> 1) & 1, (c >> 2) & 1)` from the
//! cube's minimum voxel. A corner-sign mask has bit `c` set when corner `c`
//! is inside the surface.

use std::sync::OnceLock;

use glam::UVec3;

use crate::voxel::chunk::{X_SHIFT, Y_SHIFT};

/// Corner offsets in voxels
pub const CORNER_OFFSETS: [UVec3; 8] = [
    UVec3::new(0, 0, 0),
    UVec3::new(1, 0, 0),
    UVec3::new(0, 1, 0),
    UVec3::new(1, 1, 0),
    UVec3::new(0, 0, 1),
    UVec3::new(1, 0, 1),
    UVec3::new(0, 1, 1),
    UVec3::new(1, 1, 1),
];

/// Corner offsets as linear volume index deltas
pub const CORNER_INDEX_OFFSETS: [usize; 8] = [
    0,
    1 << X_SHIFT,
    1 << Y_SHIFT,
    (1 << X_SHIFT) | (1 << Y_SHIFT),
    1,
    (1 << X_SHIFT) | 1,
    (1 << Y_SHIFT) | 1,
    (1 << X_SHIFT) | (1 << Y_SHIFT) | 1,
];

/// The 12 cube edges as corner pairs: 4 along X, then 4 along Y, then 4 along Z
pub const EDGE_CORNERS: [(usize, usize); 12] = [
    (0, 1), (2, 3), (4, 5), (6, 7),
    (0, 2), (1, 3), (4, 6), (5, 7),
    (0, 4), (1, 5), (2, 6), (3, 7),
];

/// Edge leaving corner 0 along each axis (X, Y, Z)
pub const AXIS_EDGE_FROM_ORIGIN: [usize; 3] = [0, 4, 8];

/// 256-entry table mapping a corner-sign mask to a 12-bit mask of crossing edges
pub struct EdgeTable {
    crossings: [u16; 256],
}

impl EdgeTable {
    fn build() -> Self {
        let mut crossings = [0u16; 256];
        for (mask, entry) in crossings.iter_mut().enumerate() {
            for (edge, &(a, b)) in EDGE_CORNERS.iter().enumerate() {
                let inside_a = mask & (1 << a) != 0;
                let inside_b = mask & (1 << b) != 0;
                if inside_a != inside_b {
                    *entry |= 1 << edge;
                }
            }
        }
        Self { crossings }
    }

    /// Crossing-edge bits for a corner-sign mask
    #[inline]
    pub fn crossings(&self, mask: u8) -> u16 {
        self.crossings[mask as usize]
    }

    /// True when `edge` crosses the surface for this mask
    #[inline]
    pub fn crosses(&self, mask: u8, edge: usize) -> bool {
        self.crossings(mask) & (1 << edge) != 0
    }
}

/// Shared table, built on first use
pub fn edge_table() -> &'static EdgeTable {
    static TABLE: OnceLock<EdgeTable> = OnceLock::new();
    TABLE.get_or_init(EdgeTable::build)
}
