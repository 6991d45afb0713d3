//! Staged load generation engine.
//!
//! A JSON [`scenario`] drives the [`coordinator`], which ramps [`vu`] workers
//! up and down over time. Workers send requests through a [`transport`] and
//! record outcomes into the [`metrics`] collector; [`aggregate`] reduces them
//! into latency and error statistics for the [`summary`] and [`report`].

pub mod aggregate;
pub mod coordinator;
pub mod display;
pub mod error;
pub mod metrics;
pub mod report;
pub mod scenario;
pub mod summary;
pub mod transport;
pub mod vu;
