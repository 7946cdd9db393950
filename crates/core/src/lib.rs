//! qemu-exec-core
//!
//! Core library for checking whether binaries extracted from firmware images
//! actually run under user-mode CPU emulation.
//!
//! This crate defines the result model, the architecture catalog, the
//! sandboxed execution harness, the classification and aggregation of run
//! outcomes, and the orchestrator that drives all of it for one firmware
//! object. A small SQLite store persists the produced results.
//!
//! The goal is to keep all substantive logic here so it is fully testable and
//! reusable from multiple frontends.

pub mod arch;
pub mod config;
pub mod model;
pub mod services;
pub mod store;
pub mod uid;

/// Returns the library version as encoded at compile time.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
