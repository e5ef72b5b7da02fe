//! Burrow benchmarking suite
//!
//! Benchmarks for version ordering, metadata merging, config parsing and
//! the storage transaction path.

pub mod common;

pub use common::*;
