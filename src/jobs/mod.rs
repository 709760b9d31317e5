//! Background job scheduling and per-chunk concurrency fences.

pub mod scheduler;
pub mod fence;

pub use scheduler::{JobHandle, JobScheduler, SchedulerStats};
pub use fence::FenceRegistry;
