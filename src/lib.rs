//! localtx - A local transaction resource coordinator
//!
//! This crate drives transactions over a single pluggable resource through a
//! begin → prepare → commit/rollback protocol, poisons itself after fatal
//! resource failures, and shuts down gracefully within a bounded timeout.

pub mod config;
pub mod storage;
pub mod transaction;
pub mod utils;
