//! Core domain models
//!
//! Datasets, the per-run execution context, steps, pipelines and the run
//! lifecycle.

pub mod config;
pub mod context;
pub mod dataset;
pub mod pipeline;
pub mod state;
pub mod step;

pub use context::*;
pub use dataset::*;
pub use pipeline::*;
pub use state::*;
pub use step::*;
