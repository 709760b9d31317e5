//! Chunk grids, scheduled chunk pipelines and the rolling-grid orchestrator.

pub mod grid;
pub mod pipeline;
pub mod orchestrator;

pub use grid::{Grid, GridConfig};
pub use pipeline::{schedule_generate, schedule_mesh, schedule_seam_sync, schedule_stamp, ChunkTarget};
pub use orchestrator::{
    dominant_step, entering_slab, BatchStep, CommitPayload, MoveOutcome, OrchestratorState,
    RollingGridOrchestrator,
};
