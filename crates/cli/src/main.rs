use anyhow::Result;
use clap::{Parser, Subcommand};
use qemu_exec::commands::{
    analyze_command, init_config_command, list_results_command, resolve_command,
    sandbox_status_command, show_result_command, trace_command,
};
use qemu_exec::init_tracing;

/// Checks whether binaries extracted from firmware run under QEMU user-mode
/// emulation.
///
/// This CLI is a thin wrapper around `qemu-exec-core` (exposed in code as
/// `qemu_exec_core`). All substantive logic lives in the library.
#[derive(Parser, Debug)]
#[command(
    name = "qemu-exec",
    version,
    about = "Sandboxed executability checks for firmware binaries",
    long_about = None
)]
struct Cli {
    /// Enable debug logging on stderr.
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze a file or a pre-extracted firmware directory.
    ///
    /// Every regular file below a directory is a child of the firmware object;
    /// executable children are run under each candidate architecture inside
    /// the Docker sandbox.
    Analyze {
        /// File or directory to analyze.
        #[arg(long)]
        path: String,

        /// Engine config (.json, .yaml or .yml). Defaults are used when omitted.
        #[arg(long)]
        config: Option<String>,

        /// SQLite result store to persist the result into.
        #[arg(long)]
        store: Option<String>,

        /// Pretty-print the result JSON.
        #[arg(long, default_value_t = false)]
        pretty: bool,
    },

    /// Show the architecture candidates for a file type descriptor.
    Resolve {
        /// Full type descriptor, e.g. the output of `file -b`.
        #[arg(long = "type")]
        descriptor: String,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Probe the sandbox daemon. Exits with status 1 when it is unavailable.
    SandboxStatus {
        #[arg(long)]
        config: Option<String>,
    },

    /// Write the default engine configuration.
    InitConfig {
        /// Target file (.json, .yaml or .yml).
        #[arg(long)]
        path: String,

        /// Overwrite an existing file.
        #[arg(long, default_value_t = false)]
        force: bool,
    },

    /// List results in a result store.
    ListResults {
        #[arg(long)]
        store: String,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Print the stored result of one firmware object.
    ShowResult {
        #[arg(long)]
        store: String,

        /// Firmware object uid.
        #[arg(long)]
        uid: String,
    },

    /// Print the decompressed syscall trace of one file under one architecture.
    Trace {
        #[arg(long)]
        store: String,

        /// Firmware object uid.
        #[arg(long)]
        uid: String,

        /// File uid or path inside the firmware object (e.g. `/bin/busybox`).
        #[arg(long)]
        file: String,

        /// Architecture suffix (e.g. `mipsel`).
        #[arg(long)]
        arch: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Analyze { path, config, store, pretty } => {
            analyze_command(&path, config.as_deref(), store.as_deref(), pretty)?
        }
        Command::Resolve { descriptor, json } => resolve_command(&descriptor, json)?,
        Command::SandboxStatus { config } => {
            if !sandbox_status_command(config.as_deref())? {
                std::process::exit(1);
            }
        }
        Command::InitConfig { path, force } => init_config_command(&path, force)?,
        Command::ListResults { store, json } => list_results_command(&store, json)?,
        Command::ShowResult { store, uid } => show_result_command(&store, &uid)?,
        Command::Trace { store, uid, file, arch } => trace_command(&store, &uid, &file, &arch)?,
    }

    Ok(())
}
