//! Isosurface extraction from chunk volumes.

pub mod mesh;
pub mod edge_table;
pub mod normals;
pub mod surface_nets;
pub mod fairing;

pub use mesh::{Mesh, Vertex};
pub use edge_table::{edge_table, EdgeTable};
pub use surface_nets::{encode_materials, SurfaceNets};
pub use fairing::{cell_of, SurfaceFairer, VertexAdjacency};

use crate::core::config::{FairingConfig, MaterialEncoding, MeshingAlgorithm, MeshingConfig, NormalMode};
use crate::core::error::Error;
use crate::core::types::Result;
use crate::voxel::volume::VoxelVolume;

/// Extraction pipeline selected from configuration.
#[derive(Clone, Debug, PartialEq)]
pub enum MeshingMode {
    SurfaceNets,
    /// Surface Nets followed by the fairing post-pass
    SurfaceNetsFaired(FairingConfig),
}

/// Configured mesher. Cheap to clone; each meshing job builds its own
/// scratch state.
#[derive(Clone, Debug, PartialEq)]
pub struct Mesher {
    mode: MeshingMode,
    normals: NormalMode,
    materials: MaterialEncoding,
}

impl Mesher {
    /// Resolve a meshing configuration, rejecting algorithms that have no
    /// extractor.
    pub fn from_config(config: &MeshingConfig) -> Result<Self> {
        let mode = match (config.algorithm, &config.fairing) {
            (MeshingAlgorithm::MarchingCubes, _) => {
                return Err(Error::NotImplemented("marching cubes extraction"));
            }
            (MeshingAlgorithm::SurfaceNets, None) => MeshingMode::SurfaceNets,
            (MeshingAlgorithm::SurfaceNets, Some(fairing)) => MeshingMode::SurfaceNetsFaired(fairing.clone()),
        };
        Ok(Self {
            mode,
            normals: config.normals,
            materials: config.materials,
        })
    }

    pub fn mode(&self) -> &MeshingMode {
        &self.mode
    }

    /// Extract a mesh in chunk-local coordinates.
    pub fn build(&self, volume: &VoxelVolume) -> Mesh {
        let mut mesh = SurfaceNets::new(self.normals, self.materials).extract(volume);
        if let MeshingMode::SurfaceNetsFaired(fairing) = &self.mode {
            SurfaceFairer::new(fairing.clone()).fair(&mut mesh, volume.voxel_size());
        }
        mesh
    }
}

impl Default for Mesher {
    fn default() -> Self {
        Self {
            mode: MeshingMode::SurfaceNets,
            normals: NormalMode::default(),
            materials: MaterialEncoding::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voxel::sdf::{encode_sdf, sdf_sphere};
    use glam::{IVec3, Vec3};

    fn sphere_volume() -> VoxelVolume {
        let mut volume = VoxelVolume::allocate(1.0);
        for x in 0..32 {
            for y in 0..32 {
                for z in 0..32 {
                    let p = IVec3::new(x, y, z);
                    volume.set(p, encode_sdf(sdf_sphere(p.as_vec3(), Vec3::splat(15.5), 9.0)), 1);
                }
            }
        }
        volume
    }

    #[test]
    fn test_marching_cubes_not_implemented() {
        let config = MeshingConfig {
            algorithm: MeshingAlgorithm::MarchingCubes,
            ..Default::default()
        };
        assert!(matches!(Mesher::from_config(&config), Err(Error::NotImplemented(_))));
    }

    #[test]
    fn test_mode_from_config() {
        let plain = Mesher::from_config(&MeshingConfig::default()).unwrap();
        assert_eq!(plain.mode(), &MeshingMode::SurfaceNets);
        assert_eq!(plain, Mesher::default());

        let faired = Mesher::from_config(&MeshingConfig {
            fairing: Some(FairingConfig::default()),
            ..Default::default()
        })
        .unwrap();
        assert!(matches!(faired.mode(), MeshingMode::SurfaceNetsFaired(_)));
    }

    #[test]
    fn test_faired_keeps_topology() {
        let volume = sphere_volume();
        let plain = Mesher::default().build(&volume);
        let faired = Mesher::from_config(&MeshingConfig {
            fairing: Some(FairingConfig::default()),
            ..Default::default()
        })
        .unwrap()
        .build(&volume);

        assert!(!plain.is_empty());
        assert_eq!(plain.indices, faired.indices);
        assert_eq!(plain.vertex_count(), faired.vertex_count());
    }
}
