//! Spatial lookup of chunks by world-space bounds.

pub mod index;

pub use index::{IndexedChunk, SpatialIndex};
