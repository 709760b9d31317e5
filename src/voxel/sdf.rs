//! Shared SDF (Signed Distance Field) utilities.
//!
//! This module provides:
//! - Quantisation of distances into the `i8` voxel storage
//! - SDF primitives (sphere, box, plane) used by generators and stamps
//!
//! Every SDF in the crate uses the same convention: negative inside solid,
//! positive in air.

use glam::Vec3;

/// Quantisation steps per voxel of distance
pub const SDF_UNITS_PER_VOXEL: f32 = 16.0;

/// Maximally-outside sentinel written on allocation
pub const SDF_OUTSIDE: i8 = 127;

/// Maximally-inside value
pub const SDF_INSIDE: i8 = -127;

/// Encode a distance measured in voxels into i8 storage.
/// Values saturate at roughly ±8 voxels.
#[inline]
pub fn encode_sdf(distance_voxels: f32) -> i8 {
    if distance_voxels.is_nan() {
        return SDF_OUTSIDE;
    }
    (distance_voxels * SDF_UNITS_PER_VOXEL)
        .round()
        .clamp(SDF_INSIDE as f32, SDF_OUTSIDE as f32) as i8
}

// =============================================================================
// SDF Primitives
// =============================================================================

/// Distance to a sphere surface
#[inline]
pub fn sdf_sphere(p: Vec3, center: Vec3, radius: f32) -> f32 {
    (p - center).length() - radius
}

/// Distance to an axis-aligned box
#[inline]
pub fn sdf_box(p: Vec3, center: Vec3, half_extents: Vec3) -> f32 {
    let q = (p - center).abs() - half_extents;
    q.max(Vec3::ZERO).length() + q.x.max(q.y.max(q.z)).min(0.0)
}

/// Distance to a horizontal ground plane at `height` (solid below)
#[inline]
pub fn sdf_plane(p: Vec3, height: f32) -> f32 {
    p.y - height
}
