//! Surface Nets isosurface extraction over one 32³ chunk volume.
//!
//! Each cube of 8 neighbouring voxels whose corners disagree in sign gets
//! exactly one vertex, placed at the centroid of its edge zero crossings.
//! Every sign-changing grid edge is shared by 4 cubes; their vertices are
//! joined by a quad (two triangles) wound counter-clockwise as seen from
//! outside the surface.
//!
//! Quads on the positive boundary of each axis are not emitted. The next
//! chunk along that axis starts `EFFECTIVE_SIZE` voxels later and emits them
//! instead, so overlapping chunks never produce duplicate seam geometry.

use glam::{IVec3, UVec3, Vec3};

use crate::core::config::{MaterialEncoding, NormalMode};
use crate::mesh::edge_table::{
    edge_table, AXIS_EDGE_FROM_ORIGIN, CORNER_INDEX_OFFSETS, CORNER_OFFSETS, EDGE_CORNERS,
};
use crate::mesh::mesh::{Mesh, Vertex};
use crate::mesh::normals::{estimate_normal_from_volume, recompute_normals};
use crate::voxel::chunk::{Axis, CHUNK_VOLUME, CHUNK_VOXELS};
use crate::voxel::volume::{index, VoxelVolume};

/// Marker for cubes without a vertex
const NO_VERTEX: u32 = u32::MAX;

/// Last valid cube minimum on each axis
const LAST_CUBE: u32 = CHUNK_VOXELS as u32 - 2;

/// Pack the 8 corner materials into a 4-channel vertex color.
///
/// `BlendWeights` buckets corners by `material % 4` and normalises the
/// occurrence counts so the channels sum to exactly 255, with the rounding
/// remainder on the most frequent channel; `Dominant` gives that channel
/// full weight. The lowest channel wins ties.
pub fn encode_materials(materials: &[u8; 8], encoding: MaterialEncoding) -> [u8; 4] {
    let mut counts = [0u32; 4];
    for &m in materials {
        counts[(m % 4) as usize] += 1;
    }
    let mut best = 0;
    for channel in 1..4 {
        if counts[channel] > counts[best] {
            best = channel;
        }
    }

    match encoding {
        MaterialEncoding::BlendWeights => {
            let total = materials.len() as f32;
            let mut weights = counts.map(|c| ((c as f32 / total) * 255.0).round() as i32);
            weights[best] += 255 - weights.iter().sum::<i32>();
            weights.map(|w| w as u8)
        }
        MaterialEncoding::Dominant => {
            let mut color = [0u8; 4];
            color[best] = 255;
            color
        }
    }
}

/// Surface Nets extractor.
///
/// Stateless apart from its mode flags; the per-cube vertex map is reused
/// between calls on the same instance.
pub struct SurfaceNets {
    normals: NormalMode,
    materials: MaterialEncoding,
    cube_vertex: Vec<u32>,
}

impl SurfaceNets {
    pub fn new(normals: NormalMode, materials: MaterialEncoding) -> Self {
        Self {
            normals,
            materials,
            cube_vertex: vec![NO_VERTEX; CHUNK_VOLUME],
        }
    }

    /// Extract a mesh from `volume`. Positions are chunk-local, in world units.
    ///
    /// An all-inside or all-outside volume yields an empty mesh.
    pub fn extract(&mut self, volume: &VoxelVolume) -> Mesh {
        let mut mesh = Mesh::default();
        if volume.is_disposed() || volume.is_homogeneous() {
            return mesh;
        }

        self.cube_vertex.fill(NO_VERTEX);
        let cubes = self.place_vertices(volume, &mut mesh);
        self.connect_quads(&cubes, &mut mesh);

        if self.normals == NormalMode::Geometry {
            recompute_normals(&mut mesh);
        }
        mesh.update_bounds();
        mesh
    }

    /// Pass 1: one vertex per mixed cube. Returns `(cube_min, corner_mask)`
    /// for every cube that received a vertex, in vertex order.
    fn place_vertices(&mut self, volume: &VoxelVolume, mesh: &mut Mesh) -> Vec<(UVec3, u8)> {
        let table = edge_table();
        let sdf = volume.sdf();
        let material = volume.material();
        let voxel_size = volume.voxel_size();
        let mut cubes = Vec::new();

        for x in 0..=LAST_CUBE {
            for y in 0..=LAST_CUBE {
                for z in 0..=LAST_CUBE {
                    let base = index(x as usize, y as usize, z as usize);

                    let mut corners = [0f32; 8];
                    let mut mask = 0u8;
                    for c in 0..8 {
                        let d = sdf[base + CORNER_INDEX_OFFSETS[c]];
                        corners[c] = d as f32;
                        if d < 0 {
                            mask |= 1 << c;
                        }
                    }
                    if mask == 0 || mask == 0xFF {
                        continue;
                    }

                    let crossings = table.crossings(mask);
                    let mut sum = Vec3::ZERO;
                    let mut count = 0u32;
                    for (edge, &(a, b)) in EDGE_CORNERS.iter().enumerate() {
                        if crossings & (1 << edge) == 0 {
                            continue;
                        }
                        let (da, db) = (corners[a], corners[b]);
                        let t = da / (da - db);
                        let pa = CORNER_OFFSETS[a].as_vec3();
                        let pb = CORNER_OFFSETS[b].as_vec3();
                        sum += pa + (pb - pa) * t;
                        count += 1;
                    }
                    let frac = sum / count as f32;
                    let cube = UVec3::new(x, y, z);

                    let normal = match self.normals {
                        NormalMode::Gradient => {
                            estimate_normal_from_volume(volume, cube.as_ivec3(), frac, &corners)
                        }
                        NormalMode::None | NormalMode::Geometry => Vec3::ZERO,
                    };

                    let mut corner_materials = [0u8; 8];
                    for c in 0..8 {
                        corner_materials[c] = material[base + CORNER_INDEX_OFFSETS[c]];
                    }

                    self.cube_vertex[base] = mesh.vertices.len() as u32;
                    mesh.vertices.push(Vertex {
                        position: ((cube.as_vec3() + frac) * voxel_size).to_array(),
                        normal: normal.to_array(),
                        color: encode_materials(&corner_materials, self.materials),
                    });
                    cubes.push((cube, mask));
                }
            }
        }

        cubes
    }

    /// Pass 2: a quad for every sign-changing edge leaving a cube's corner 0.
    fn connect_quads(&self, cubes: &[(UVec3, u8)], mesh: &mut Mesh) {
        let table = edge_table();

        for &(cube, mask) in cubes {
            for axis in Axis::ALL {
                let (b, c) = axis.others();
                let p = cube.to_array();
                if p[b.index()] == 0 || p[c.index()] == 0 || p[axis.index()] == LAST_CUBE {
                    continue;
                }
                if !table.crosses(mask, AXIS_EDGE_FROM_ORIGIN[axis.index()]) {
                    continue;
                }

                let origin = cube.as_ivec3();
                let v1 = self.vertex_at(origin);
                let v2 = self.vertex_at(origin - b.unit());
                let v3 = self.vertex_at(origin - c.unit());
                let v4 = self.vertex_at(origin - b.unit() - c.unit());
                if [v1, v2, v3, v4].contains(&NO_VERTEX) {
                    // All four cubes share the crossing edge, so this should not happen
                    log::warn!("Surface Nets: incomplete quad at {:?} axis {:?}", origin, axis);
                    continue;
                }

                // Corner 0 inside means outside lies toward +axis
                let outward_positive = mask & 1 != 0;
                if outward_positive {
                    mesh.indices.extend_from_slice(&[v1, v2, v4, v1, v4, v3]);
                } else {
                    mesh.indices.extend_from_slice(&[v1, v4, v2, v1, v3, v4]);
                }
            }
        }
    }

    #[inline]
    fn vertex_at(&self, cube: IVec3) -> u32 {
        self.cube_vertex[index(cube.x as usize, cube.y as usize, cube.z as usize)]
    }
}
