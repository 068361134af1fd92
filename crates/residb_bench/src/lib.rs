//! Benchmark helpers for ResiDB.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod utils;
