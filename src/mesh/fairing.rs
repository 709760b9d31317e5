//! Feature- and seam-preserving vertex smoothing.
//!
//! A discrete Laplacian step moves each vertex toward the average of its
//! face neighbours. The step is attenuated across material creases and
//! suppressed near chunk faces, and every result is clamped back into the
//! vertex's originating cell so the cell-based neighbour graph stays valid.

use glam::{IVec3, UVec3, Vec3};

use crate::core::config::{FairingConfig, SeamPolicy};
use crate::mesh::mesh::Mesh;
use crate::mesh::normals::recompute_normals;
use crate::voxel::chunk::{CHUNK_VOLUME, CHUNK_VOXELS};
use crate::voxel::volume::{clamp_coord, index};

/// Cell containing `position`: `floor(position / voxel_size)` clamped into
/// the volume.
pub fn cell_of(position: Vec3, voxel_size: f32) -> UVec3 {
    clamp_coord((position / voxel_size).floor().as_ivec3())
}

const FACE_DIRECTIONS: [IVec3; 6] = [
    IVec3::X, IVec3::NEG_X,
    IVec3::Y, IVec3::NEG_Y,
    IVec3::Z, IVec3::NEG_Z,
];

/// Face adjacency between vertices whose cells touch across a face,
/// stored in compressed rows.
#[derive(Debug, Default)]
pub struct VertexAdjacency {
    offsets: Vec<u32>,
    neighbors: Vec<u32>,
}

impl VertexAdjacency {
    /// Build from per-vertex cell coordinates. When two vertices share a
    /// cell, the first one represents it.
    pub fn build(cells: &[UVec3]) -> Self {
        let mut cell_vertex = vec![u32::MAX; CHUNK_VOLUME];
        for (v, cell) in cells.iter().enumerate() {
            let slot = &mut cell_vertex[index(cell.x as usize, cell.y as usize, cell.z as usize)];
            if *slot == u32::MAX {
                *slot = v as u32;
            }
        }

        let max = CHUNK_VOXELS as i32 - 1;
        let mut offsets = Vec::with_capacity(cells.len() + 1);
        let mut neighbors = Vec::with_capacity(cells.len() * 4);
        offsets.push(0);

        for (v, cell) in cells.iter().enumerate() {
            let c = cell.as_ivec3();
            for dir in FACE_DIRECTIONS {
                let n = c + dir;
                if n.min_element() < 0 || n.max_element() > max {
                    continue;
                }
                let other = cell_vertex[index(n.x as usize, n.y as usize, n.z as usize)];
                if other != u32::MAX && other as usize != v {
                    neighbors.push(other);
                }
            }
            offsets.push(neighbors.len() as u32);
        }

        Self { offsets, neighbors }
    }

    pub fn neighbors(&self, vertex: usize) -> &[u32] {
        let start = self.offsets[vertex] as usize;
        let end = self.offsets[vertex + 1] as usize;
        &self.neighbors[start..end]
    }

    pub fn vertex_count(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }
}

/// Smooths extracted meshes in place.
pub struct SurfaceFairer {
    config: FairingConfig,
}

impl SurfaceFairer {
    pub fn new(config: FairingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FairingConfig {
        &self.config
    }

    /// Run all configured iterations over `mesh`.
    pub fn fair(&self, mesh: &mut Mesh, voxel_size: f32) {
        if mesh.vertices.is_empty() {
            return;
        }

        let cells: Vec<UVec3> = mesh
            .vertices
            .iter()
            .map(|v| cell_of(v.position(), voxel_size))
            .collect();
        let adjacency = VertexAdjacency::build(&cells);
        let weights: Vec<[f32; 4]> = mesh.vertices.iter().map(|v| v.material_weights()).collect();

        let margin = self.config.cell_margin * voxel_size;
        let face_max = (CHUNK_VOXELS - 1) as f32;
        let mut positions: Vec<Vec3> = mesh.vertices.iter().map(|v| v.position()).collect();
        let mut next = positions.clone();

        for _ in 0..self.config.iterations {
            for v in 0..positions.len() {
                let p = positions[v];
                let neighbors = adjacency.neighbors(v);
                if neighbors.is_empty() {
                    next[v] = p;
                    continue;
                }

                let sum: Vec3 = neighbors.iter().map(|&n| positions[n as usize]).sum();
                let average = sum / neighbors.len() as f32;

                let mut step = self.config.step;
                let crease = neighbors
                    .iter()
                    .any(|&n| l1_distance(&weights[v], &weights[n as usize]) >= self.config.material_threshold);
                if crease {
                    step *= self.config.material_min_step;
                }

                let delta = (average - p) * step;

                let q = p / voxel_size;
                let band = self.config.seam_band;
                let near_face = [0, 1, 2].map(|a| q[a] < band || q[a] > face_max - band);
                if self.config.seam_policy == SeamPolicy::Freeze && near_face.iter().any(|&near| near) {
                    next[v] = p;
                    continue;
                }

                let cell_min = cells[v].as_vec3() * voxel_size + Vec3::splat(margin);
                let cell_max = (cells[v].as_vec3() + Vec3::ONE) * voxel_size - Vec3::splat(margin);
                let mut moved = (p + delta).clamp(cell_min, cell_max);
                // SoftBand: the boundary-normal axis is neither stepped nor clamped
                for axis in 0..3 {
                    if near_face[axis] {
                        moved[axis] = p[axis];
                    }
                }
                next[v] = moved;
            }
            std::mem::swap(&mut positions, &mut next);
        }

        for (vertex, p) in mesh.vertices.iter_mut().zip(&positions) {
            vertex.position = p.to_array();
        }
        if self.config.recompute_normals {
            recompute_normals(mesh);
        }
        mesh.update_bounds();
    }
}

#[inline]
fn l1_distance(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{MaterialEncoding, NormalMode};
    use crate::mesh::mesh::Vertex;
    use crate::mesh::surface_nets::SurfaceNets;
    use crate::voxel::sdf::encode_sdf;
    use crate::voxel::volume::VoxelVolume;

    fn bumpy_sphere() -> VoxelVolume {
        let mut volume = VoxelVolume::allocate(1.0);
        let center = Vec3::splat(15.5);
        for x in 0..32 {
            for y in 0..32 {
                for z in 0..32 {
                    let p = IVec3::new(x, y, z);
                    let d = p.as_vec3() - center;
                    let bump = ((x * 7 + y * 13 + z * 5) % 3) as f32 * 0.3;
                    let material = if d.y > 0.0 { 1 } else { 2 };
                    volume.set(p, encode_sdf(d.length() - 11.0 + bump), material);
                }
            }
        }
        volume
    }

    fn no_seam_config() -> FairingConfig {
        FairingConfig {
            iterations: 1,
            step: 0.5,
            seam_band: 0.0,
            recompute_normals: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_cell_of() {
        assert_eq!(cell_of(Vec3::new(1.5, 2.5, 3.5), 1.0), UVec3::new(1, 2, 3));
        assert_eq!(cell_of(Vec3::splat(31.9), 1.0), UVec3::new(31, 31, 31));
        assert_eq!(cell_of(Vec3::splat(-0.2), 1.0), UVec3::ZERO);
        assert_eq!(cell_of(Vec3::new(1.5, 2.5, 3.5), 0.5), UVec3::new(3, 5, 7));
    }

    #[test]
    fn test_adjacency_is_face_only() {
        let cells = [
            UVec3::new(5, 5, 5),
            UVec3::new(6, 5, 5),
            UVec3::new(6, 6, 5), // diagonal to the first
            UVec3::new(5, 5, 4),
        ];
        let adjacency = VertexAdjacency::build(&cells);
        assert_eq!(adjacency.vertex_count(), 4);

        let mut first: Vec<u32> = adjacency.neighbors(0).to_vec();
        first.sort();
        assert_eq!(first, vec![1, 3]);
        assert_eq!(adjacency.neighbors(2), &[1]);
    }

    #[test]
    fn test_fairing_stays_within_cells() {
        let volume = bumpy_sphere();
        let mut mesh = SurfaceNets::new(NormalMode::Gradient, MaterialEncoding::BlendWeights).extract(&volume);
        let cells: Vec<UVec3> = mesh.vertices.iter().map(|v| cell_of(v.position(), 1.0)).collect();

        let config = FairingConfig {
            iterations: 25,
            step: 1.0,
            cell_margin: 0.1,
            ..Default::default()
        };
        let original = mesh.clone();
        SurfaceFairer::new(config).fair(&mut mesh, 1.0);

        for ((v, before), cell) in mesh.vertices.iter().zip(&original.vertices).zip(&cells) {
            let p = v.position();
            let start = before.position();
            if [start.x, start.y, start.z].iter().any(|&c| c < 2.0 || c > 29.0) {
                // Frozen seam-band vertices keep their extracted position
                assert_eq!(v.position, before.position);
                continue;
            }
            let min = cell.as_vec3() + Vec3::splat(0.1);
            let max = cell.as_vec3() + Vec3::splat(0.9);
            assert!(p.cmpge(min - Vec3::splat(1e-5)).all() && p.cmple(max + Vec3::splat(1e-5)).all(),
                "vertex {p:?} escaped cell {cell:?}");
        }
    }

    #[test]
    fn test_fairing_moves_interior_vertices() {
        let volume = bumpy_sphere();
        let original = SurfaceNets::new(NormalMode::None, MaterialEncoding::BlendWeights).extract(&volume);
        let mut mesh = original.clone();
        SurfaceFairer::new(FairingConfig::default()).fair(&mut mesh, 1.0);

        let moved = original
            .vertices
            .iter()
            .zip(&mesh.vertices)
            .filter(|(a, b)| a.position != b.position)
            .count();
        assert!(moved > original.vertex_count() / 4);
        assert_eq!(mesh.indices, original.indices);
    }

    #[test]
    fn test_freeze_keeps_seam_band_fixed() {
        // Plane crosses every chunk face, so many vertices sit in the band
        let mut volume = VoxelVolume::allocate(1.0);
        for x in 0..32 {
            for y in 0..32 {
                for z in 0..32 {
                    let bump = ((x * 3 + z * 5) % 4) as f32 * 0.2;
                    volume.set(IVec3::new(x, y, z), encode_sdf(y as f32 - 14.5 + bump), 1);
                }
            }
        }
        let original = SurfaceNets::new(NormalMode::None, MaterialEncoding::BlendWeights).extract(&volume);
        let mut mesh = original.clone();
        let config = FairingConfig { seam_band: 2.0, seam_policy: SeamPolicy::Freeze, ..no_seam_config() };
        SurfaceFairer::new(config).fair(&mut mesh, 1.0);

        let mut checked = 0;
        for (before, after) in original.vertices.iter().zip(&mesh.vertices) {
            let p = before.position();
            let in_band = [p.x, p.y, p.z].iter().any(|&c| c < 2.0 || c > 29.0);
            if in_band {
                assert_eq!(before.position, after.position);
                checked += 1;
            }
        }
        assert!(checked > 0);
    }

    #[test]
    fn test_soft_band_keeps_boundary_axis() {
        let mut volume = VoxelVolume::allocate(1.0);
        for x in 0..32 {
            for y in 0..32 {
                for z in 0..32 {
                    let bump = ((x * 3 + z * 5) % 4) as f32 * 0.2;
                    volume.set(IVec3::new(x, y, z), encode_sdf(y as f32 - 14.5 + bump), 1);
                }
            }
        }
        let original = SurfaceNets::new(NormalMode::None, MaterialEncoding::BlendWeights).extract(&volume);
        let mut mesh = original.clone();
        let config = FairingConfig { seam_band: 2.0, seam_policy: SeamPolicy::SoftBand, ..no_seam_config() };
        SurfaceFairer::new(config).fair(&mut mesh, 1.0);

        for (before, after) in original.vertices.iter().zip(&mesh.vertices) {
            let p = before.position();
            if p.x < 2.0 || p.x > 29.0 {
                assert_eq!(before.position[0], after.position[0]);
            }
            if p.z < 2.0 || p.z > 29.0 {
                assert_eq!(before.position[2], after.position[2]);
            }
        }
    }

    #[test]
    fn test_seam_band_vertex_is_not_clamped() {
        let vertex = |p: [f32; 3]| Vertex { position: p, normal: [0.0; 3], color: [255, 0, 0, 0] };
        let mesh = Mesh {
            vertices: vec![vertex([0.98, 5.98, 5.5]), vertex([0.5, 6.5, 5.5])],
            indices: vec![0, 1, 0],
            ..Default::default()
        };
        let config = FairingConfig { seam_band: 2.0, cell_margin: 0.05, ..no_seam_config() };

        let mut frozen = mesh.clone();
        SurfaceFairer::new(FairingConfig { seam_policy: SeamPolicy::Freeze, ..config.clone() }).fair(&mut frozen, 1.0);
        assert_eq!(frozen.vertices[0].position, [0.98, 5.98, 5.5]);
        assert_eq!(frozen.vertices[1].position, [0.5, 6.5, 5.5]);

        let mut soft = mesh.clone();
        SurfaceFairer::new(FairingConfig { seam_policy: SeamPolicy::SoftBand, ..config }).fair(&mut soft, 1.0);
        let p = soft.vertices[0].position;
        // x sits in the band: untouched even though it is inside the margin
        assert_eq!(p[0], 0.98);
        // y steps toward the neighbour and is clamped to the shrunk cell
        assert!((p[1] - 5.95).abs() < 1e-5);
        assert_eq!(p[2], 5.5);
    }

    fn three_in_a_row(center_color: [u8; 4]) -> Mesh {
        let vertex = |p: [f32; 3], color: [u8; 4]| Vertex { position: p, normal: [0.0; 3], color };
        Mesh {
            vertices: vec![
                vertex([5.5, 5.9, 5.5], center_color),
                vertex([6.5, 5.5, 5.5], [0, 255, 0, 0]),
                vertex([4.5, 5.5, 5.5], [0, 255, 0, 0]),
            ],
            indices: vec![0, 1, 2],
            ..Default::default()
        }
    }

    #[test]
    fn test_material_crease_attenuates_step() {
        let fairer = SurfaceFairer::new(no_seam_config());

        let mut same = three_in_a_row([0, 255, 0, 0]);
        fairer.fair(&mut same, 1.0);
        assert!((same.vertices[0].position[1] - 5.7).abs() < 1e-5);

        let mut crease = three_in_a_row([0, 0, 255, 0]);
        fairer.fair(&mut crease, 1.0);
        // 30% of the base step
        assert!((crease.vertices[0].position[1] - 5.84).abs() < 1e-5);
    }
}
