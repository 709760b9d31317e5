//! Overlap synchronization between axis-adjacent chunks.
//!
//! Adjacent chunk origins are `EFFECTIVE_SIZE` voxels apart, so the last
//! `OVERLAP` layers of the lower chunk and the first `OVERLAP` layers of the
//! higher chunk sample the same world positions. Keeping those layers
//! byte-identical is what makes both meshes meet exactly at the boundary.
//!
//! Data always flows from the lower-coordinate chunk (source) to the
//! higher-coordinate chunk (destination).

use crate::voxel::chunk::{Axis, CHUNK_VOXELS, OVERLAP};
use crate::voxel::volume::{index, VoxelVolume};

/// Linear index of voxel `(layer, u, v)` where `layer` runs along `axis`
#[inline]
fn layer_index(axis: Axis, layer: usize, u: usize, v: usize) -> usize {
    match axis {
        Axis::X => index(layer, u, v),
        Axis::Y => index(u, layer, v),
        Axis::Z => index(u, v, layer),
    }
}

/// Copy the source's last `OVERLAP` layers along `axis` into the
/// destination's first `OVERLAP` layers, for both SDF and material.
///
/// The destination's interior is left untouched.
pub fn sync_overlap(source: &VoxelVolume, dest: &mut VoxelVolume, axis: Axis) {
    let src_sdf = source.sdf();
    let src_mat = source.material();
    let (dst_sdf, dst_mat) = dest.split_mut();

    for o in 0..OVERLAP {
        let src_layer = CHUNK_VOXELS - OVERLAP + o;
        for u in 0..CHUNK_VOXELS {
            for v in 0..CHUNK_VOXELS {
                let s = layer_index(axis, src_layer, u, v);
                let d = layer_index(axis, o, u, v);
                dst_sdf[d] = src_sdf[s];
                dst_mat[d] = src_mat[s];
            }
        }
    }
}

/// True when the shared overlap of `low` and `high` (adjacent along `axis`)
/// is byte-identical.
pub fn overlap_matches(low: &VoxelVolume, high: &VoxelVolume, axis: Axis) -> bool {
    (0..OVERLAP).all(|o| {
        let low_layer = CHUNK_VOXELS - OVERLAP + o;
        (0..CHUNK_VOXELS).all(|u| {
            (0..CHUNK_VOXELS).all(|v| {
                let l = layer_index(axis, low_layer, u, v);
                let h = layer_index(axis, o, u, v);
                low.sdf()[l] == high.sdf()[h] && low.material()[l] == high.material()[h]
            })
        })
    })
}
