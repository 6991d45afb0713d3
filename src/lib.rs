//! stagehand: staged HTTP load generation.
//!
//! Ramps a pool of concurrent virtual users through a sequence of stages
//! against one endpoint and reports latency percentiles, error counts and
//! throughput. See [`loadtest`] for the engine.

pub mod loadtest;
