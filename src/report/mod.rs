//! Human-readable output for comparison runs.

pub mod format;

pub use format::*;
