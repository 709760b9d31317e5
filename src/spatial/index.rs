//! SpatialIndex - uniform grid lookup for chunks by world bounds.

use std::collections::HashMap;

use glam::{IVec3, Mat4, Vec3};

use crate::math::Aabb;
use crate::voxel::chunk::{ChunkCoord, ChunkId, ChunkInfo, GridId, EFFECTIVE_SIZE};

/// Everything a world-space operation needs to know about a chunk.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IndexedChunk {
    pub id: ChunkId,
    pub coord: ChunkCoord,
    pub local_bounds: Aabb,
    pub world_bounds: Aabb,
    pub voxel_size: f32,
    pub local_to_world: Mat4,
    pub world_to_local: Mat4,
}

impl From<&ChunkInfo> for IndexedChunk {
    fn from(info: &ChunkInfo) -> Self {
        Self {
            id: info.id,
            coord: info.coord,
            local_bounds: info.local_bounds(),
            world_bounds: info.world_bounds(),
            voxel_size: info.voxel_size,
            local_to_world: info.local_to_world(),
            world_to_local: info.world_to_local(),
        }
    }
}

/// Multi-map from grid cells to the chunks overlapping them.
///
/// Rebuilt wholesale once per scheduling pass; queries issued after a
/// rebuild see exactly the chunks added since.
#[derive(Debug)]
pub struct SpatialIndex {
    cell_size: f32,
    entries: Vec<IndexedChunk>,
    cells: HashMap<IVec3, Vec<u32>>,
    by_coord: HashMap<(GridId, ChunkCoord), u32>,
}

impl SpatialIndex {
    /// Create an index with cells `cell_size` world units wide.
    pub fn new(cell_size: f32) -> Self {
        Self {
            cell_size: cell_size.max(f32::EPSILON),
            entries: Vec::new(),
            cells: HashMap::new(),
            by_coord: HashMap::new(),
        }
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    #[inline]
    fn cell_of(&self, p: Vec3) -> IVec3 {
        (p / self.cell_size).floor().as_ivec3()
    }

    /// Register a chunk in every cell its world bounds overlap.
    pub fn add(&mut self, chunk: IndexedChunk) {
        let slot = self.entries.len() as u32;
        let min = self.cell_of(chunk.world_bounds.min);
        let max = self.cell_of(chunk.world_bounds.max);

        for x in min.x..=max.x {
            for y in min.y..=max.y {
                for z in min.z..=max.z {
                    self.cells.entry(IVec3::new(x, y, z)).or_default().push(slot);
                }
            }
        }

        self.by_coord.insert((chunk.id.grid, chunk.coord), slot);
        self.entries.push(chunk);
    }

    /// Distinct chunks whose world bounds overlap `bounds`, in insertion order.
    pub fn query(&self, bounds: &Aabb) -> Vec<&IndexedChunk> {
        if bounds.is_empty() {
            return Vec::new();
        }

        let min = self.cell_of(bounds.min);
        let max = self.cell_of(bounds.max);
        let mut hits: Vec<u32> = Vec::new();

        for x in min.x..=max.x {
            for y in min.y..=max.y {
                for z in min.z..=max.z {
                    if let Some(slots) = self.cells.get(&IVec3::new(x, y, z)) {
                        hits.extend_from_slice(slots);
                    }
                }
            }
        }

        hits.sort_unstable();
        hits.dedup();
        hits.into_iter()
            .map(|slot| &self.entries[slot as usize])
            .filter(|chunk| chunk.world_bounds.intersects(bounds))
            .collect()
    }

    /// Exact lookup of the chunk placed at `coord` in `grid`.
    pub fn find(&self, grid: GridId, coord: ChunkCoord) -> Option<&IndexedChunk> {
        self.by_coord.get(&(grid, coord)).map(|&slot| &self.entries[slot as usize])
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.cells.clear();
        self.by_coord.clear();
    }

    /// Clear, then add every chunk from `chunks`.
    pub fn rebuild(&mut self, chunks: impl IntoIterator<Item = IndexedChunk>) {
        self.clear();
        for chunk in chunks {
            self.add(chunk);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &IndexedChunk> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of occupied cells.
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }
}

impl Default for SpatialIndex {
    fn default() -> Self {
        Self::new(EFFECTIVE_SIZE as f32)
    }
}
