//! Volume generators: fill a chunk's SDF and materials from world-space
//! evaluation.
//!
//! Generators only write inside the volume they are given and make no
//! assumption about its prior contents beyond the allocation sentinel.

pub mod terrain;

pub use terrain::{TerrainGenerator, TerrainParams};

use glam::{Mat4, Vec3};

use crate::math::Aabb;
use crate::voxel::chunk::CHUNK_VOXELS;
use crate::voxel::sdf::{encode_sdf, sdf_plane, sdf_sphere, SDF_INSIDE, SDF_OUTSIDE};
use crate::voxel::volume::{index, VoxelVolume};

/// Closed set of generators, dispatched once per chunk.
#[derive(Clone, Debug, Default)]
pub enum Generator {
    /// Everything outside
    #[default]
    Empty,
    /// Everything inside
    Solid { material: u8 },
    /// Solid below `height` (world y)
    Plane { height: f32, material: u8 },
    Sphere { center: Vec3, radius: f32, material: u8 },
    Terrain(TerrainGenerator),
}

impl Generator {
    pub fn terrain(params: TerrainParams) -> Self {
        Generator::Terrain(TerrainGenerator::new(params))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Generator::Empty => "empty",
            Generator::Solid { .. } => "solid",
            Generator::Plane { .. } => "plane",
            Generator::Sphere { .. } => "sphere",
            Generator::Terrain(_) => "terrain",
        }
    }

    /// Write every voxel of `volume`. Voxel `(x, y, z)` sits at
    /// `local_bounds.min + (x, y, z) * voxel_size` in chunk-local space.
    pub fn fill(&self, local_bounds: &Aabb, local_to_world: &Mat4, voxel_size: f32, volume: &mut VoxelVolume) {
        if volume.is_disposed() {
            return;
        }

        match self {
            Generator::Empty => volume.fill(SDF_OUTSIDE, 0),
            Generator::Solid { material } => volume.fill(SDF_INSIDE, *material),
            Generator::Plane { height, material } => {
                fill_with(local_bounds, local_to_world, voxel_size, volume, |p| {
                    (sdf_plane(p, *height), *material)
                });
            }
            Generator::Sphere { center, radius, material } => {
                fill_with(local_bounds, local_to_world, voxel_size, volume, |p| {
                    (sdf_sphere(p, *center, *radius), *material)
                });
            }
            Generator::Terrain(terrain) => fill_terrain(terrain, local_bounds, local_to_world, voxel_size, volume),
        }
    }
}

#[inline]
fn voxel_world_pos(local_bounds: &Aabb, local_to_world: &Mat4, voxel_size: f32, x: usize, y: usize, z: usize) -> Vec3 {
    let local = local_bounds.min + Vec3::new(x as f32, y as f32, z as f32) * voxel_size;
    local_to_world.transform_point3(local)
}

/// Evaluate `sample` (world position -> distance in world units, material)
/// at every voxel.
fn fill_with<F>(local_bounds: &Aabb, local_to_world: &Mat4, voxel_size: f32, volume: &mut VoxelVolume, sample: F)
where
    F: Fn(Vec3) -> (f32, u8),
{
    let (sdf, materials) = volume.split_mut();
    for x in 0..CHUNK_VOXELS {
        for y in 0..CHUNK_VOXELS {
            for z in 0..CHUNK_VOXELS {
                let p = voxel_world_pos(local_bounds, local_to_world, voxel_size, x, y, z);
                let (d, material) = sample(p);
                let i = index(x, y, z);
                sdf[i] = encode_sdf(d / voxel_size);
                materials[i] = if d <= 0.0 { material } else { 0 };
            }
        }
    }
}

fn fill_terrain(
    terrain: &TerrainGenerator,
    local_bounds: &Aabb,
    local_to_world: &Mat4,
    voxel_size: f32,
    volume: &mut VoxelVolume,
) {
    let (sdf, materials) = volume.split_mut();
    for x in 0..CHUNK_VOXELS {
        for z in 0..CHUNK_VOXELS {
            // One height sample per column
            let column = voxel_world_pos(local_bounds, local_to_world, voxel_size, x, 0, z);
            let height = terrain.height_at(column.x, column.z);

            for y in 0..CHUNK_VOXELS {
                let p = voxel_world_pos(local_bounds, local_to_world, voxel_size, x, y, z);
                let d = p.y - height;
                let i = index(x, y, z);
                sdf[i] = encode_sdf(d / voxel_size);
                materials[i] = if d <= 0.0 { terrain.material_at(height, -d, voxel_size) } else { 0 };
            }
        }
    }
}
