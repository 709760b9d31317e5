//! Normal estimation: SDF gradients and geometry-based recomputation.
//!
//! With negative-inside SDFs the gradient already points outward.

use glam::{IVec3, Vec3};

use crate::mesh::edge_table::CORNER_OFFSETS;
use crate::mesh::mesh::Mesh;
use crate::voxel::volume::VoxelVolume;

/// Central-difference gradient at one voxel (one-sided at the volume border)
#[inline]
fn voxel_gradient(volume: &VoxelVolume, v: IVec3) -> Vec3 {
    let d = |o: IVec3| volume.sdf_at(v + o) as f32;
    Vec3::new(
        d(IVec3::X) - d(IVec3::NEG_X),
        d(IVec3::Y) - d(IVec3::NEG_Y),
        d(IVec3::Z) - d(IVec3::NEG_Z),
    )
}

/// Gradient normal at a point inside cube `cube_min`, trilinearly blending
/// the central differences at the cube's 8 corner voxels.
///
/// `frac` is the point's offset inside the cube, in `[0, 1]³`. Falls back to
/// [`estimate_normal_from_eight_corners`] when the volume gradient vanishes.
pub fn estimate_normal_from_volume(volume: &VoxelVolume, cube_min: IVec3, frac: Vec3, corners: &[f32; 8]) -> Vec3 {
    let mut gradient = Vec3::ZERO;
    for offset in CORNER_OFFSETS.iter() {
        let o = offset.as_vec3();
        let w = (if o.x > 0.0 { frac.x } else { 1.0 - frac.x })
            * (if o.y > 0.0 { frac.y } else { 1.0 - frac.y })
            * (if o.z > 0.0 { frac.z } else { 1.0 - frac.z });
        gradient += voxel_gradient(volume, cube_min + offset.as_ivec3()) * w;
    }

    match gradient.try_normalize() {
        Some(n) => n,
        None => estimate_normal_from_eight_corners(corners),
    }
}

/// Gradient normal from the 8 corner values of a single cube.
///
/// Returns +Y when the corners carry no gradient at all.
pub fn estimate_normal_from_eight_corners(corners: &[f32; 8]) -> Vec3 {
    let mut gradient = Vec3::ZERO;
    for (c, offset) in CORNER_OFFSETS.iter().enumerate() {
        let sign = offset.as_vec3() * 2.0 - Vec3::ONE;
        gradient += sign * corners[c];
    }
    gradient.try_normalize().unwrap_or(Vec3::Y)
}

/// Replace every vertex normal with the area-weighted average of its
/// adjacent face normals.
pub fn recompute_normals(mesh: &mut Mesh) {
    let mut accum = vec![Vec3::ZERO; mesh.vertices.len()];

    for tri in mesh.indices.chunks_exact(3) {
        let (a, b, c) = (tri[0] as usize, tri[1] as usize, tri[2] as usize);
        let pa = mesh.vertices[a].position();
        let pb = mesh.vertices[b].position();
        let pc = mesh.vertices[c].position();
        let face = (pb - pa).cross(pc - pa);
        accum[a] += face;
        accum[b] += face;
        accum[c] += face;
    }

    for (vertex, n) in mesh.vertices.iter_mut().zip(accum) {
        vertex.normal = n.normalize_or_zero().to_array();
    }
}
