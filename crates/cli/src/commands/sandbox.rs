use anyhow::Result;
use qemu_exec_core::services::sandboxes::{DockerSandbox, Sandbox};

use crate::load_config_or_default;

/// Run the sandbox liveness probe and report the result. Returns whether the
/// sandbox is available.
pub fn sandbox_status_command(config: Option<&str>) -> Result<bool> {
    let config = load_config_or_default(config)?;
    let sandbox = DockerSandbox::new(&config.docker);
    let available = sandbox.is_available();
    println!("Sandbox:   {}", sandbox.name());
    println!("Image:     {}", config.docker.image);
    println!("Probe:     {}", config.docker.probe_command.join(" "));
    println!("Available: {}", if available { "yes" } else { "no" });
    Ok(available)
}
