//! Test utilities for the contacts benchmark.
//!
//! This crate provides an in-process stub of a contacts service and logging setup for tests. See
//! the modules for all available utilities.

pub mod server;
pub mod tracing;
