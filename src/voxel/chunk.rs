//! Chunk identity, placement and per-chunk buffers

use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use glam::{IVec3, Mat4, UVec3, Vec3};

use crate::math::Aabb;
use crate::mesh::Mesh;
use crate::voxel::volume::VoxelVolume;

/// Number of voxels per chunk side (N)
pub const CHUNK_VOXELS: usize = 32;

/// Voxels in one Y/Z layer (N²)
pub const CHUNK_VOXELS_SQ: usize = CHUNK_VOXELS * CHUNK_VOXELS;

/// Total voxels in a chunk (N³)
pub const CHUNK_VOLUME: usize = CHUNK_VOXELS * CHUNK_VOXELS * CHUNK_VOXELS;

/// Bit shift for X in the linear index (log2(N²))
pub const X_SHIFT: u32 = 10;

/// Bit shift for Y in the linear index (log2(N))
pub const Y_SHIFT: u32 = 5;

/// Mask extracting one axis from a linear index
pub const INDEX_MASK: usize = CHUNK_VOXELS - 1;

/// Voxel layers shared between axis-adjacent chunks
pub const OVERLAP: usize = 2;

/// Spacing between adjacent chunk origins, in voxels
pub const EFFECTIVE_SIZE: usize = CHUNK_VOXELS - OVERLAP;

/// Hard cap on chunk-grid dimensions per axis
pub const MAX_GRID_DIM: u32 = 64;

/// One of the three grid axes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    /// Component index (0, 1, 2)
    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }

    /// Unit integer step along this axis
    pub fn unit(self) -> IVec3 {
        match self {
            Axis::X => IVec3::X,
            Axis::Y => IVec3::Y,
            Axis::Z => IVec3::Z,
        }
    }

    /// The two remaining axes in right-handed cyclic order (a -> b -> c)
    pub fn others(self) -> (Axis, Axis) {
        match self {
            Axis::X => (Axis::Y, Axis::Z),
            Axis::Y => (Axis::Z, Axis::X),
            Axis::Z => (Axis::X, Axis::Y),
        }
    }
}

/// Identifier of a chunk grid
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GridId(pub u32);

/// Stable identity of a chunk: its owning grid and its slot in that grid.
///
/// In a rolling grid a slot is reused for a new world coordinate when the
/// window scrolls, so the id outlives any single placement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkId {
    pub grid: GridId,
    pub slot: [u32; 3],
}

impl ChunkId {
    pub fn new(grid: GridId, slot: UVec3) -> Self {
        Self { grid, slot: slot.to_array() }
    }

    pub fn slot(&self) -> UVec3 {
        UVec3::from_array(self.slot)
    }
}

/// Integer coordinate identifying a chunk in its grid's world lattice
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkCoord {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl ChunkCoord {
    /// Create a new chunk coordinate
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub fn from_ivec3(v: IVec3) -> Self {
        Self { x: v.x, y: v.y, z: v.z }
    }

    pub fn as_ivec3(&self) -> IVec3 {
        IVec3::new(self.x, self.y, self.z)
    }

    /// Chunk size in world units for a given voxel size
    pub fn spacing(voxel_size: f32) -> f32 {
        EFFECTIVE_SIZE as f32 * voxel_size
    }

    /// Convert a position (relative to the grid origin) to the chunk whose
    /// effective region contains it
    pub fn from_world_pos(pos: Vec3, voxel_size: f32) -> Self {
        let spacing = Self::spacing(voxel_size);
        Self {
            x: (pos.x / spacing).floor() as i32,
            y: (pos.y / spacing).floor() as i32,
            z: (pos.z / spacing).floor() as i32,
        }
    }

    /// Origin (minimum corner) of this chunk relative to the grid origin
    pub fn world_origin(&self, voxel_size: f32) -> Vec3 {
        self.as_ivec3().as_vec3() * Self::spacing(voxel_size)
    }

    /// Neighbour one step along `axis`, in the direction of `sign`
    pub fn neighbor(&self, axis: Axis, sign: i32) -> Self {
        Self::from_ivec3(self.as_ivec3() + axis.unit() * sign.signum())
    }

    /// Axis along which `other` is adjacent (differs by exactly one on
    /// exactly one axis), if any
    pub fn adjacency_axis(&self, other: &ChunkCoord) -> Option<Axis> {
        let d = other.as_ivec3() - self.as_ivec3();
        match (d.x.abs(), d.y.abs(), d.z.abs()) {
            (1, 0, 0) => Some(Axis::X),
            (0, 1, 0) => Some(Axis::Y),
            (0, 0, 1) => Some(Axis::Z),
            _ => None,
        }
    }

    pub fn is_axis_adjacent(&self, other: &ChunkCoord) -> bool {
        self.adjacency_axis(other).is_some()
    }
}

/// Placement of a chunk: identity, world coordinate and world-space bounds
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChunkInfo {
    pub id: ChunkId,
    pub coord: ChunkCoord,
    pub voxel_size: f32,
    /// World position of voxel (0, 0, 0)
    pub world_origin: Vec3,
}

impl ChunkInfo {
    /// Bounds in chunk-local space, spanning voxel 0 to voxel N-1
    pub fn local_bounds(&self) -> Aabb {
        Aabb::new(Vec3::ZERO, Vec3::splat((CHUNK_VOXELS - 1) as f32 * self.voxel_size))
    }

    /// Bounds in world space
    pub fn world_bounds(&self) -> Aabb {
        self.local_bounds().translated(self.world_origin)
    }

    pub fn local_to_world(&self) -> Mat4 {
        Mat4::from_translation(self.world_origin)
    }

    pub fn world_to_local(&self) -> Mat4 {
        Mat4::from_translation(-self.world_origin)
    }
}

/// Mesh produced by the last meshing job, awaiting application
#[derive(Debug, Default)]
pub struct StagedMesh {
    pub mesh: Mesh,
    /// World coordinate the mesh was built for
    pub coord: Option<ChunkCoord>,
    /// Set by the meshing job, cleared once a consumer applies it
    pub pending: bool,
}

/// Buffers exclusively owned by one chunk.
///
/// Jobs hold an `Arc` to these; the fence registry orders access, so the
/// locks are uncontended in correct use.
#[derive(Debug)]
pub struct ChunkBuffers {
    volume: RwLock<VoxelVolume>,
    staged: Mutex<StagedMesh>,
}

impl ChunkBuffers {
    /// Allocate a volume initialised to the outside sentinel
    pub fn allocate(voxel_size: f32) -> Self {
        Self {
            volume: RwLock::new(VoxelVolume::allocate(voxel_size)),
            staged: Mutex::new(StagedMesh::default()),
        }
    }

    pub fn volume(&self) -> RwLockReadGuard<'_, VoxelVolume> {
        self.volume.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn volume_mut(&self) -> RwLockWriteGuard<'_, VoxelVolume> {
        self.volume.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn staged(&self) -> MutexGuard<'_, StagedMesh> {
        self.staged.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Release backing storage. Caller must have completed the chunk's fence.
    pub fn dispose(&self) {
        self.volume_mut().dispose();
        let mut staged = self.staged();
        staged.mesh = Mesh::default();
        staged.pending = false;
        staged.coord = None;
    }
}
