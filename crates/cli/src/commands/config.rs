use anyhow::{anyhow, Context, Result};
use qemu_exec_core::config::{write_config, ExecConfig};

use crate::canonicalize_or_current;

/// Write the default engine configuration to `path` (JSON or YAML by extension).
pub fn init_config_command(path: &str, force: bool) -> Result<()> {
    let path = canonicalize_or_current(path)?;
    if path.exists() && !force {
        return Err(anyhow!(
            "Config already exists at {} (use --force to overwrite)",
            path.display()
        ));
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config dir {}", parent.display()))?;
    }
    write_config(&path, &ExecConfig::default())
        .with_context(|| format!("Failed to write config to {}", path.display()))?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}
