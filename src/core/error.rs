//! Error types for the voxmesh engine

use thiserror::Error;

use crate::voxel::chunk::{ChunkId, GridId};

/// Main error type for the engine
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not implemented: {0}")]
    NotImplemented(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Unknown chunk: {0:?}")]
    UnknownChunk(ChunkId),

    #[error("Unknown grid: {0:?}")]
    UnknownGrid(GridId),
}
