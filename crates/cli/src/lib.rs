use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use qemu_exec_core::config::{load_config, ExecConfig};
use tracing_subscriber::EnvFilter;

pub mod commands;

/// Canonicalize a path if possible, falling back to the given string
/// relative to the current working directory.
pub fn canonicalize_or_current(root: &str) -> Result<PathBuf> {
    let path = Path::new(root);
    if path == Path::new(".") {
        Ok(env::current_dir().context("Failed to get current directory")?)
    } else {
        // Try to canonicalize; if it fails (e.g., path does not yet exist),
        // join it with the current dir to get an absolute path.
        match path.canonicalize() {
            Ok(p) => Ok(p),
            Err(_) => {
                let cwd = env::current_dir().context("Failed to get current directory")?;
                Ok(cwd.join(path))
            }
        }
    }
}

/// Load the engine config from `path`, or use the production defaults.
pub fn load_config_or_default(path: Option<&str>) -> Result<ExecConfig> {
    match path {
        Some(path) => {
            let path = canonicalize_or_current(path)?;
            load_config(&path)
                .with_context(|| format!("Failed to load config from {}", path.display()))
        }
        None => Ok(ExecConfig::default()),
    }
}

/// Install the stderr log subscriber. `verbose` forces debug output for the
/// engine; otherwise `RUST_LOG` applies, defaulting to warnings only.
pub fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("qemu_exec_core=debug,qemu_exec=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    // A subscriber may already be installed (e.g. by a test harness).
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
