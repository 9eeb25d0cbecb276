//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - dictionary fields and the logical-to-physical column projection
//! - streamed records and their shared schema
//! - run configuration and per-year outcomes
//! - pipeline stage status (diagnostic artifact)

pub mod types;

pub use types::*;
