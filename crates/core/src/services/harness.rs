use std::io::Read;
use std::path::Path;
use std::process::{Child, ExitStatus, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::model::{RunError, STRACE_KEY};
use crate::services::sandboxes::{Invocation, Sandbox};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

static INVOCATION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// One way of invoking the target binary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InvocationOption {
    /// Pass this string as the binary's sole argument.
    Argument(String),
    /// Run without arguments under syscall tracing.
    Trace,
}

impl InvocationOption {
    /// Key under which the result of this option is stored.
    pub fn key(&self) -> &str {
        match self {
            InvocationOption::Argument(arg) => arg,
            InvocationOption::Trace => STRACE_KEY,
        }
    }

    /// Argument to hand to the binary; whitespace-only options mean "no argument".
    pub fn argument(&self) -> Option<&str> {
        match self {
            InvocationOption::Argument(arg) if !arg.trim().is_empty() => Some(arg),
            _ => None,
        }
    }

    pub fn is_trace(&self) -> bool {
        matches!(self, InvocationOption::Trace)
    }
}

/// Captured output of an invocation that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub return_code: i32,
}

/// Either captured output or the terminal failure of the invocation.
pub type RawOutcome = Result<RawOutput, RunError>;

/// Unique name for one sandbox invocation (used e.g. as a container name).
pub fn next_invocation_label() -> String {
    let n = INVOCATION_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("qemu_exec_{}_{}", std::process::id(), n)
}

/// Run `file` (relative to `root`) under `arch` with `option`, bounded by `timeout`.
///
/// Every failure is converted into a [`RunError`] here, so nothing escapes
/// the job boundary.
pub fn run_invocation(
    sandbox: &dyn Sandbox,
    root: &Path,
    file: &str,
    arch: &str,
    option: &InvocationOption,
    timeout: Duration,
) -> RawOutcome {
    let invocation = Invocation { root, file, arch, option, label: next_invocation_label() };
    let outcome = execute(sandbox, &invocation, timeout);
    match &outcome {
        Ok(output) => debug!(
            file,
            arch,
            option = option.key(),
            return_code = output.return_code,
            "invocation completed"
        ),
        Err(error) => warn!(file, arch, option = option.key(), %error, "invocation failed"),
    }
    outcome
}

/// Run every option sequentially for one (file, architecture) pair.
pub fn run_options(
    sandbox: &dyn Sandbox,
    root: &Path,
    file: &str,
    arch: &str,
    options: &[InvocationOption],
    timeout: Duration,
) -> Vec<(InvocationOption, RawOutcome)> {
    options
        .iter()
        .map(|option| {
            (option.clone(), run_invocation(sandbox, root, file, arch, option, timeout))
        })
        .collect()
}

fn execute(sandbox: &dyn Sandbox, invocation: &Invocation<'_>, timeout: Duration) -> RawOutcome {
    let mut command = sandbox.command(invocation);
    command.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());

    let deadline = Instant::now() + timeout;
    let mut child = command.spawn().map_err(|e| {
        debug!(sandbox = sandbox.name(), "failed to spawn sandbox driver: {e}");
        RunError::ProcessError
    })?;
    let stdout = spawn_reader(child.stdout.take());
    let stderr = spawn_reader(child.stderr.take());

    let status = match wait_until(&mut child, deadline) {
        Ok(Some(status)) => status,
        Ok(None) => {
            kill_child(&mut child);
            sandbox.on_timeout(invocation);
            // Readers are left to finish on their own; a lingering grandchild
            // may still hold the pipes open.
            return Err(RunError::Timeout);
        }
        Err(e) => {
            debug!("failed to wait for sandbox driver: {e}");
            kill_child(&mut child);
            return Err(RunError::ProcessError);
        }
    };

    // The driver exited, but a descendant may keep the pipes open past the deadline.
    let (Some(stdout), Some(stderr)) =
        (collect_output(&stdout, deadline), collect_output(&stderr, deadline))
    else {
        debug!(sandbox = sandbox.name(), "output pipes still open at deadline");
        sandbox.on_timeout(invocation);
        return Err(RunError::Timeout);
    };

    match status.code() {
        Some(code) if sandbox.is_driver_failure(code) => Err(RunError::ProcessError),
        Some(return_code) => Ok(RawOutput { stdout, stderr, return_code }),
        None => Err(RunError::ProcessError),
    }
}

fn spawn_reader<R: Read + Send + 'static>(pipe: Option<R>) -> Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        let _ = tx.send(buf);
    });
    rx
}

/// Everything read from one pipe, or `None` if it was not closed by `deadline`.
fn collect_output(rx: &Receiver<Vec<u8>>, deadline: Instant) -> Option<Vec<u8>> {
    match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
        Ok(buf) => Some(buf),
        Err(RecvTimeoutError::Disconnected) => Some(Vec::new()),
        Err(RecvTimeoutError::Timeout) => None,
    }
}

fn wait_until(child: &mut Child, deadline: Instant) -> std::io::Result<Option<ExitStatus>> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL.min(deadline - now));
    }
}

fn kill_child(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}
