//! Voxel data structures and operations

pub mod chunk;
pub mod volume;
pub mod sdf;
pub mod seam;

pub use chunk::{
    Axis, ChunkBuffers, ChunkCoord, ChunkId, ChunkInfo, GridId, StagedMesh,
    CHUNK_VOLUME, CHUNK_VOXELS, EFFECTIVE_SIZE, MAX_GRID_DIM, OVERLAP,
};
pub use volume::{VolumeView, VoxelVolume};
pub use seam::{overlap_matches, sync_overlap};
