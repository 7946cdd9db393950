//! Sandboxes that run a binary under an emulated architecture.

use std::path::Path;
use std::process::Command;

use crate::services::harness::InvocationOption;

pub mod docker;

pub use docker::DockerSandbox;

/// Everything a sandbox needs to build one emulated invocation.
#[derive(Debug, Clone)]
pub struct Invocation<'a> {
    /// Unpacked root; the binary resolves its shared libraries below it.
    pub root: &'a Path,
    /// Target path relative to `root`, with a leading `/`.
    pub file: &'a str,
    /// QEMU user-mode target suffix (e.g. `mips`, `arm`).
    pub arch: &'a str,
    pub option: &'a InvocationOption,
    /// Unique per invocation.
    pub label: String,
}

/// Trait implemented by execution sandboxes (e.g. Docker + QEMU user mode).
pub trait Sandbox: Send + Sync {
    fn name(&self) -> &'static str;

    /// Liveness probe for the backing service. Must not hang.
    fn is_available(&self) -> bool;

    /// Build the driver process for one invocation. The harness owns stdio,
    /// spawning, and the timeout.
    fn command(&self, invocation: &Invocation<'_>) -> Command;

    /// Whether an exit code belongs to the driver rather than the target.
    fn is_driver_failure(&self, _code: i32) -> bool {
        false
    }

    /// Called after a timed-out driver process was killed.
    fn on_timeout(&self, _invocation: &Invocation<'_>) {}
}
