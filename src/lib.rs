//! Episode/group/name addressed time-series collections with range
//! selection, region-of-interest restricted curve fitting and measurements.

pub mod analysis;
pub mod config;
pub mod data;
pub mod error;
pub mod state;
