//! World-space edits applied to chunk volumes.

pub mod stamp;

pub use stamp::{apply_stamp, Stamp, StampMode, StampShape};
