//! Voxmesh - chunked SDF voxel meshing and streaming engine

pub mod core;
pub mod math;
pub mod voxel;
pub mod mesh;
pub mod jobs;
pub mod spatial;
pub mod edit;
pub mod generation;
pub mod streaming;
pub mod world;

pub use crate::core::{EngineConfig, Error, Result};
pub use world::{MeshSink, MeshStore, StoredMesh, UpdateReport, VoxelWorld};
