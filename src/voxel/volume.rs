//! Fixed-size SDF + material storage for one chunk.
//!
//! Layout is X-major, Z-minor: `index = x << 10 | y << 5 | z`. The shifts are
//! only valid because the side length is a power of two.

use std::ops::Deref;
use std::sync::RwLockReadGuard;

use glam::{IVec3, UVec3};

use crate::voxel::chunk::{CHUNK_VOLUME, CHUNK_VOXELS, INDEX_MASK, X_SHIFT, Y_SHIFT};
use crate::voxel::sdf::SDF_OUTSIDE;

/// Convert 3D voxel coordinates to a linear index.
#[inline(always)]
pub const fn index(x: usize, y: usize, z: usize) -> usize {
    (x << X_SHIFT) | (y << Y_SHIFT) | z
}

/// Convert a linear index back to voxel coordinates.
#[inline(always)]
pub const fn coord_of(idx: usize) -> (usize, usize, usize) {
    (idx >> X_SHIFT, (idx >> Y_SHIFT) & INDEX_MASK, idx & INDEX_MASK)
}

/// Clamp a signed voxel coordinate into `[0, N-1]` per axis.
#[inline]
pub fn clamp_coord(c: IVec3) -> UVec3 {
    c.clamp(IVec3::ZERO, IVec3::splat(CHUNK_VOXELS as i32 - 1)).as_uvec3()
}

/// Dense 32³ signed-distance and material volume.
///
/// SDF values are negative inside solid and positive in air.
#[derive(Clone, Debug)]
pub struct VoxelVolume {
    sdf: Vec<i8>,
    material: Vec<u8>,
    voxel_size: f32,
}

impl VoxelVolume {
    /// Allocate a volume filled with the maximally-outside sentinel and material 0
    pub fn allocate(voxel_size: f32) -> Self {
        Self {
            sdf: vec![SDF_OUTSIDE; CHUNK_VOLUME],
            material: vec![0; CHUNK_VOLUME],
            voxel_size,
        }
    }

    /// Release backing storage
    pub fn dispose(&mut self) {
        self.sdf = Vec::new();
        self.material = Vec::new();
    }

    pub fn is_disposed(&self) -> bool {
        self.sdf.is_empty()
    }

    pub fn voxel_size(&self) -> f32 {
        self.voxel_size
    }

    pub fn sdf(&self) -> &[i8] {
        &self.sdf
    }

    pub fn material(&self) -> &[u8] {
        &self.material
    }

    pub fn sdf_mut(&mut self) -> &mut [i8] {
        &mut self.sdf
    }

    pub fn material_mut(&mut self) -> &mut [u8] {
        &mut self.material
    }

    /// Both arrays mutably at once
    pub fn split_mut(&mut self) -> (&mut [i8], &mut [u8]) {
        (&mut self.sdf, &mut self.material)
    }

    /// SDF at a coordinate, clamped into the volume
    #[inline]
    pub fn sdf_at(&self, c: IVec3) -> i8 {
        let c = clamp_coord(c);
        self.sdf[index(c.x as usize, c.y as usize, c.z as usize)]
    }

    /// Material at a coordinate, clamped into the volume
    #[inline]
    pub fn material_at(&self, c: IVec3) -> u8 {
        let c = clamp_coord(c);
        self.material[index(c.x as usize, c.y as usize, c.z as usize)]
    }

    /// Write one voxel; coordinates are clamped into the volume
    #[inline]
    pub fn set(&mut self, c: IVec3, sdf: i8, material: u8) {
        let c = clamp_coord(c);
        let i = index(c.x as usize, c.y as usize, c.z as usize);
        self.sdf[i] = sdf;
        self.material[i] = material;
    }

    /// Overwrite every voxel
    pub fn fill(&mut self, sdf: i8, material: u8) {
        self.sdf.fill(sdf);
        self.material.fill(material);
    }

    /// True when every voxel has the same sign (no surface can be extracted)
    pub fn is_homogeneous(&self) -> bool {
        match self.sdf.first() {
            Some(&first) => {
                let inside = first < 0;
                self.sdf.iter().all(|&d| (d < 0) == inside)
            }
            None => true,
        }
    }
}

/// Read-only view of a chunk's volume.
///
/// Only handed out after the chunk's fence has completed, and it borrows the
/// buffers, so it cannot outlive them.
pub struct VolumeView<'a> {
    guard: RwLockReadGuard<'a, VoxelVolume>,
}

impl<'a> VolumeView<'a> {
    pub(crate) fn new(guard: RwLockReadGuard<'a, VoxelVolume>) -> Self {
        Self { guard }
    }
}

impl Deref for VolumeView<'_> {
    type Target = VoxelVolume;

    fn deref(&self) -> &VoxelVolume {
        &self.guard
    }
}
