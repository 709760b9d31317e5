//! Noise-based heightfield terrain

use noise::{Fbm, MultiFractal, NoiseFn, Perlin};
use serde::{Deserialize, Serialize};

/// Material ids written by the terrain generator
pub const MATERIAL_GRASS: u8 = 1;
pub const MATERIAL_DIRT: u8 = 2;
pub const MATERIAL_STONE: u8 = 3;
pub const MATERIAL_SAND: u8 = 4;

/// Parameters controlling terrain generation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainParams {
    pub seed: u32,
    pub scale: f32,        // Horizontal scale (larger = smoother)
    pub height_scale: f32, // Vertical scale (max height)
    pub base_height: f32,  // Height of the noise minimum
    pub octaves: u32,      // FBM octaves (detail levels)
    pub persistence: f32,  // FBM persistence (0.5 typical)
    pub lacunarity: f32,   // FBM lacunarity (2.0 typical)
    pub sea_level: f32,    // Surface below this is sand
    pub dirt_depth: f32,   // World units of dirt under the surface layer
}

impl Default for TerrainParams {
    fn default() -> Self {
        Self {
            seed: 12345,
            scale: 100.0,
            height_scale: 24.0,
            base_height: 4.0,
            octaves: 4,
            persistence: 0.5,
            lacunarity: 2.0,
            sea_level: 8.0,
            dirt_depth: 3.0,
        }
    }
}

/// Procedural heightfield using fractal Brownian motion (FBM)
#[derive(Clone, Debug)]
pub struct TerrainGenerator {
    params: TerrainParams,
    noise: Fbm<Perlin>,
}

impl TerrainGenerator {
    pub fn new(params: TerrainParams) -> Self {
        let noise = Fbm::<Perlin>::new(params.seed)
            .set_octaves(params.octaves as usize)
            .set_persistence(params.persistence as f64)
            .set_lacunarity(params.lacunarity as f64);

        Self { params, noise }
    }

    pub fn params(&self) -> &TerrainParams {
        &self.params
    }

    /// Terrain height at world position (x, z)
    pub fn height_at(&self, x: f32, z: f32) -> f32 {
        let nx = (x / self.params.scale) as f64;
        let nz = (z / self.params.scale) as f64;

        // Noise is roughly [-1, 1]
        let normalized = ((self.noise.get([nx, nz]) + 1.0) / 2.0).clamp(0.0, 1.0);
        self.params.base_height + (normalized * self.params.height_scale as f64) as f32
    }

    /// Strata material for a solid point `depth` below a surface at `height`
    pub fn material_at(&self, height: f32, depth: f32, voxel_size: f32) -> u8 {
        if depth <= voxel_size {
            if height < self.params.sea_level {
                MATERIAL_SAND
            } else {
                MATERIAL_GRASS
            }
        } else if depth <= voxel_size + self.params.dirt_depth {
            MATERIAL_DIRT
        } else {
            MATERIAL_STONE
        }
    }
}
