//! Chunk grids: a fixed block of chunk slots mapped onto a window of world
//! chunk coordinates.
//!
//! Slots are assigned with `slot = coord.rem_euclid(dims)`, so when a
//! rolling window shifts by one chunk the entering slab reuses exactly the
//! slots of the leaving slab and chunk identities stay stable.

use std::sync::Arc;

use glam::{IVec3, UVec3, Vec3};
use log::warn;

use crate::generation::Generator;
use crate::streaming::pipeline::ChunkTarget;
use crate::voxel::chunk::{ChunkBuffers, ChunkCoord, ChunkId, ChunkInfo, GridId, MAX_GRID_DIM};

/// Parameters for a new grid
#[derive(Clone, Debug)]
pub struct GridConfig {
    /// Chunks per axis, clamped to `1..=MAX_GRID_DIM`
    pub dims: UVec3,
    /// World size of one voxel
    pub voxel_size: f32,
    /// World position of chunk coordinate (0, 0, 0)
    pub origin: Vec3,
    /// Whether the window may be moved after creation
    pub rolling: bool,
    pub generator: Generator,
    /// Chunk coordinate of the window's minimum corner
    pub anchor: IVec3,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            dims: UVec3::new(4, 2, 4),
            voxel_size: 1.0,
            origin: Vec3::ZERO,
            rolling: false,
            generator: Generator::Empty,
            anchor: IVec3::ZERO,
        }
    }
}

impl GridConfig {
    /// Clamp out-of-range values, logging what was changed.
    pub fn clamped(mut self) -> Self {
        let max = UVec3::splat(MAX_GRID_DIM);
        let clamped = self.dims.clamp(UVec3::ONE, max);
        if clamped != self.dims {
            warn!("Grid dims {:?} clamped to {:?}", self.dims, clamped);
            self.dims = clamped;
        }
        if !self.voxel_size.is_finite() || self.voxel_size <= 0.0 {
            warn!("Grid voxel size {} is invalid, using 1.0", self.voxel_size);
            self.voxel_size = 1.0;
        }
        self
    }
}

#[derive(Debug)]
pub struct Grid {
    id: GridId,
    dims: UVec3,
    voxel_size: f32,
    origin: Vec3,
    rolling: bool,
    generator: Arc<Generator>,
    anchor: IVec3,
    chunks: Vec<Arc<ChunkBuffers>>,
    allocated: bool,
    fully_meshed_once: bool,
}

impl Grid {
    /// Allocate buffers for every slot. Contents stay at the outside
    /// sentinel until generation runs.
    pub fn allocate(id: GridId, config: GridConfig) -> Self {
        let config = config.clamped();
        let count = (config.dims.x * config.dims.y * config.dims.z) as usize;
        let chunks = (0..count)
            .map(|_| Arc::new(ChunkBuffers::allocate(config.voxel_size)))
            .collect();

        Self {
            id,
            dims: config.dims,
            voxel_size: config.voxel_size,
            origin: config.origin,
            rolling: config.rolling,
            generator: Arc::new(config.generator),
            anchor: config.anchor,
            chunks,
            allocated: true,
            fully_meshed_once: false,
        }
    }

    pub fn id(&self) -> GridId {
        self.id
    }

    pub fn dims(&self) -> UVec3 {
        self.dims
    }

    pub fn voxel_size(&self) -> f32 {
        self.voxel_size
    }

    pub fn origin(&self) -> Vec3 {
        self.origin
    }

    pub fn is_rolling(&self) -> bool {
        self.rolling
    }

    pub fn generator(&self) -> &Arc<Generator> {
        &self.generator
    }

    pub fn anchor(&self) -> IVec3 {
        self.anchor
    }

    pub(crate) fn set_anchor(&mut self, anchor: IVec3) {
        self.anchor = anchor;
    }

    /// World position of the window's minimum corner
    pub fn window_origin(&self) -> Vec3 {
        self.origin + ChunkCoord::from_ivec3(self.anchor).world_origin(self.voxel_size)
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn allocated(&self) -> bool {
        self.allocated
    }

    pub fn fully_meshed_once(&self) -> bool {
        self.fully_meshed_once
    }

    pub(crate) fn mark_fully_meshed(&mut self) {
        self.fully_meshed_once = true;
    }

    /// True when `coord` lies inside the current window.
    pub fn contains(&self, coord: ChunkCoord) -> bool {
        let rel = coord.as_ivec3() - self.anchor;
        rel.cmpge(IVec3::ZERO).all() && rel.cmplt(self.dims.as_ivec3()).all()
    }

    /// Slot holding `coord` (whether or not it is in the window).
    pub fn slot_of(&self, coord: ChunkCoord) -> UVec3 {
        coord.as_ivec3().rem_euclid(self.dims.as_ivec3()).as_uvec3()
    }

    /// Window coordinate currently mapped onto `slot`.
    pub fn coord_of_slot(&self, slot: UVec3) -> ChunkCoord {
        let d = self.dims.as_ivec3();
        let rel = (slot.as_ivec3() - self.anchor).rem_euclid(d);
        ChunkCoord::from_ivec3(self.anchor + rel)
    }

    fn slot_index(&self, slot: UVec3) -> usize {
        ((slot.x * self.dims.y + slot.y) * self.dims.z + slot.z) as usize
    }

    pub fn chunk_id(&self, coord: ChunkCoord) -> ChunkId {
        ChunkId::new(self.id, self.slot_of(coord))
    }

    /// Placement of `coord` in world space.
    pub fn chunk_info(&self, coord: ChunkCoord) -> ChunkInfo {
        ChunkInfo {
            id: self.chunk_id(coord),
            coord,
            voxel_size: self.voxel_size,
            world_origin: self.origin + coord.world_origin(self.voxel_size),
        }
    }

    /// Placement of whatever the window maps onto `slot`.
    pub fn slot_info(&self, slot: UVec3) -> ChunkInfo {
        self.chunk_info(self.coord_of_slot(slot))
    }

    pub fn buffers(&self, coord: ChunkCoord) -> &Arc<ChunkBuffers> {
        &self.chunks[self.slot_index(self.slot_of(coord))]
    }

    /// Placement and buffers of `coord`, ready for scheduling.
    pub fn target(&self, coord: ChunkCoord) -> ChunkTarget {
        ChunkTarget::new(self.chunk_info(coord), Arc::clone(self.buffers(coord)))
    }

    /// Buffers for a chunk id of this grid.
    pub fn buffers_by_id(&self, id: ChunkId) -> Option<&Arc<ChunkBuffers>> {
        let slot = id.slot();
        (id.grid == self.id && slot.cmplt(self.dims).all()).then(|| &self.chunks[self.slot_index(slot)])
    }

    /// All coordinates of the current window, x-major.
    pub fn chunk_coords(&self) -> impl Iterator<Item = ChunkCoord> + '_ {
        let d = self.dims.as_ivec3();
        (0..d.x).flat_map(move |x| {
            (0..d.y).flat_map(move |y| {
                (0..d.z).map(move |z| ChunkCoord::from_ivec3(self.anchor + IVec3::new(x, y, z)))
            })
        })
    }

    pub fn chunk_infos(&self) -> impl Iterator<Item = ChunkInfo> + '_ {
        self.chunk_coords().map(|c| self.chunk_info(c))
    }

    pub fn chunk_ids(&self) -> impl Iterator<Item = ChunkId> + '_ {
        self.chunk_coords().map(|c| self.chunk_id(c))
    }
}
