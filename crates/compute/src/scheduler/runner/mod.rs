//! Sampling runner -- prepares workers, drains the queue, aggregates.
//!
//! Split into focused submodules:
//! - `core`: Sampler struct, constructor, and per-worker preparation
//! - `execution`: the run itself (pool, join, aggregation, report)

mod core;
mod execution;

pub use self::core::Sampler;
