//! Bounded world-space SDF edits ("stamps").

use glam::{IVec3, Vec3};

use crate::math::Aabb;
use crate::voxel::chunk::CHUNK_VOXELS;
use crate::voxel::sdf::{sdf_box, sdf_sphere, SDF_INSIDE, SDF_OUTSIDE};
use crate::voxel::volume::{index, VoxelVolume};

/// Stamp primitive, centered on [`Stamp::center`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum StampShape {
    Sphere { radius: f32 },
    Box { half_extents: Vec3 },
}

impl StampShape {
    /// Signed distance in world units (negative inside).
    pub fn sdf(&self, p: Vec3, center: Vec3) -> f32 {
        match *self {
            StampShape::Sphere { radius } => sdf_sphere(p, center, radius),
            StampShape::Box { half_extents } => sdf_box(p, center, half_extents),
        }
    }

    pub fn half_extent(&self) -> Vec3 {
        match *self {
            StampShape::Sphere { radius } => Vec3::splat(radius),
            StampShape::Box { half_extents } => half_extents,
        }
    }
}

/// How a stamp combines with existing voxels
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StampMode {
    /// Push toward solid and paint the stamp material
    #[default]
    Add,
    /// Push toward empty, keeping existing materials
    Subtract,
}

/// A bounded edit applied to every chunk its influence touches.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Stamp {
    pub shape: StampShape,
    /// World-space center
    pub center: Vec3,
    /// Blend strength (0.0 - 1.0)
    pub strength: f32,
    pub material: u8,
    pub mode: StampMode,
    /// Half-width of the blend band around the surface, in world units
    pub falloff: f32,
}

impl Stamp {
    pub fn sphere(center: Vec3, radius: f32, material: u8) -> Self {
        Self {
            shape: StampShape::Sphere { radius },
            center,
            strength: 1.0,
            material,
            mode: StampMode::Add,
            falloff: 1.0,
        }
    }

    pub fn cuboid(center: Vec3, half_extents: Vec3, material: u8) -> Self {
        Self {
            shape: StampShape::Box { half_extents },
            ..Self::sphere(center, 0.0, material)
        }
    }

    pub fn with_mode(mut self, mode: StampMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_strength(mut self, strength: f32) -> Self {
        self.strength = strength;
        self
    }

    pub fn with_falloff(mut self, falloff: f32) -> Self {
        self.falloff = falloff;
        self
    }

    /// Region the stamp can modify: the shape bounds grown by the falloff.
    pub fn world_bounds(&self) -> Aabb {
        Aabb::from_center_half_extent(self.center, self.shape.half_extent()).grown(self.falloff.max(0.0))
    }

    /// Blend weight for a point at signed distance `d` from the shape
    /// surface. Full strength at `-falloff`, half at the surface, zero at
    /// `+falloff`.
    pub fn weight(&self, d: f32) -> f32 {
        let strength = self.strength.clamp(0.0, 1.0);
        if self.falloff <= f32::EPSILON {
            return if d <= 0.0 { strength } else { 0.0 };
        }
        strength * ((self.falloff - d) / (2.0 * self.falloff)).clamp(0.0, 1.0)
    }
}

/// Apply `stamp` to a chunk whose voxel (0, 0, 0) sits at `chunk_origin`.
///
/// Returns whether any voxel changed.
pub fn apply_stamp(volume: &mut VoxelVolume, chunk_origin: Vec3, stamp: &Stamp) -> bool {
    if volume.is_disposed() {
        return false;
    }

    let voxel_size = volume.voxel_size();
    let bounds = stamp.world_bounds();
    let max = CHUNK_VOXELS as i32 - 1;
    let lo = ((bounds.min - chunk_origin) / voxel_size).floor().as_ivec3().clamp(IVec3::ZERO, IVec3::splat(max));
    let hi = ((bounds.max - chunk_origin) / voxel_size).ceil().as_ivec3().clamp(IVec3::ZERO, IVec3::splat(max));
    if !bounds.intersects(&Aabb::new(chunk_origin, chunk_origin + Vec3::splat(max as f32 * voxel_size))) {
        return false;
    }

    let target = match stamp.mode {
        StampMode::Add => SDF_INSIDE,
        StampMode::Subtract => SDF_OUTSIDE,
    } as f32;

    let (sdf, material) = volume.split_mut();
    let mut changed = false;

    for x in lo.x..=hi.x {
        for y in lo.y..=hi.y {
            for z in lo.z..=hi.z {
                let world = chunk_origin + IVec3::new(x, y, z).as_vec3() * voxel_size;
                let w = stamp.weight(stamp.shape.sdf(world, stamp.center));
                if w <= 0.0 {
                    continue;
                }

                let i = index(x as usize, y as usize, z as usize);
                let old = sdf[i] as f32;
                let new = (old + (target - old) * w).round().clamp(SDF_INSIDE as f32, SDF_OUTSIDE as f32) as i8;
                if new != sdf[i] {
                    sdf[i] = new;
                    changed = true;
                }
                if stamp.mode == StampMode::Add && new < 0 && material[i] != stamp.material {
                    material[i] = stamp.material;
                    changed = true;
                }
            }
        }
    }

    changed
}
