use std::process::{Command, Stdio};

use tracing::{debug, warn};

use crate::config::DockerConfig;
use crate::services::harness::InvocationOption;
use crate::services::sandboxes::{Invocation, Sandbox};

/// Mount point of the unpacked root inside the container.
pub const MOUNT_POINT: &str = "/opt/firmware_root";

/// Exit codes `docker run` reserves for its own failures.
const DRIVER_EXIT_CODES: [i32; 3] = [125, 126, 127];

/// Shell snippet for the trace run: the emulator's trace log goes to stdout,
/// the program's own stdout is discarded.
const TRACE_SCRIPT: &str = "exec qemu-\"$0\" -strace -L \"$1\" \"$2\" 2>&1 >/dev/null";

/// Runs QEMU user-mode emulators inside a throwaway Docker container.
#[derive(Debug, Clone)]
pub struct DockerSandbox {
    binary: String,
    image: String,
    probe_command: Vec<String>,
}

impl DockerSandbox {
    pub fn new(config: &DockerConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            image: config.image.clone(),
            probe_command: config.probe_command.clone(),
        }
    }

    /// Arguments passed to the docker client for one invocation.
    pub fn args(&self, invocation: &Invocation<'_>) -> Vec<String> {
        let target = format!("{MOUNT_POINT}{}", invocation.file);
        let mut args: Vec<String> = vec![
            "run".into(),
            "--rm".into(),
            "--name".into(),
            invocation.label.clone(),
            "--network".into(),
            "none".into(),
            "-v".into(),
            format!("{}:{MOUNT_POINT}:ro", invocation.root.display()),
            "-w".into(),
            MOUNT_POINT.into(),
        ];
        match invocation.option {
            InvocationOption::Trace => {
                args.extend([
                    "--entrypoint".into(),
                    "sh".into(),
                    self.image.clone(),
                    "-c".into(),
                    TRACE_SCRIPT.into(),
                    invocation.arch.to_string(),
                    MOUNT_POINT.into(),
                    target,
                ]);
            }
            InvocationOption::Argument(_) => {
                args.extend([
                    "--entrypoint".into(),
                    format!("qemu-{}", invocation.arch),
                    self.image.clone(),
                    "-L".into(),
                    MOUNT_POINT.into(),
                    target,
                ]);
                if let Some(arg) = invocation.option.argument() {
                    args.push(arg.to_string());
                }
            }
        }
        args
    }
}

impl Sandbox for DockerSandbox {
    fn name(&self) -> &'static str {
        "docker"
    }

    fn is_available(&self) -> bool {
        let Some((program, rest)) = self.probe_command.split_first() else {
            warn!("empty sandbox probe command");
            return false;
        };
        match Command::new(program)
            .args(rest)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
        {
            Ok(status) => status.success(),
            Err(e) => {
                debug!("failed to run sandbox probe {program}: {e}");
                false
            }
        }
    }

    fn command(&self, invocation: &Invocation<'_>) -> Command {
        let mut command = Command::new(&self.binary);
        command.args(self.args(invocation));
        command
    }

    fn is_driver_failure(&self, code: i32) -> bool {
        DRIVER_EXIT_CODES.contains(&code)
    }

    fn on_timeout(&self, invocation: &Invocation<'_>) {
        // The container outlives a killed client; remove it explicitly.
        let _ = Command::new(&self.binary)
            .args(["kill", invocation.label.as_str()])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
    }
}
