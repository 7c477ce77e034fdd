//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - run inputs (`Dataset`, `ModelSpec`, `PriorSpec`, `SamplingConfig`)
//! - the formula grammar (`Formula`)
//! - run outputs (`FitResult`, `LooScore`, `SpecOutcome`, `RunReport`)

pub mod formula;
pub mod types;

pub use formula::*;
pub use types::*;
