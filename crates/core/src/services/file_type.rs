use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::debug;

use crate::model::FileType;

/// Supplies the type descriptor of a file on disk.
pub trait TypeIdentifier: Send + Sync {
    fn identify(&self, path: &Path) -> Option<FileType>;
}

/// Identifies files with the `file(1)` utility.
#[derive(Debug, Clone)]
pub struct FileCommandIdentifier {
    program: PathBuf,
}

impl Default for FileCommandIdentifier {
    fn default() -> Self {
        Self { program: PathBuf::from("file") }
    }
}

impl FileCommandIdentifier {
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self { program: program.into() }
    }

    fn run(&self, args: &[&str], path: &Path) -> Option<String> {
        let output =
            match Command::new(&self.program).args(args).arg(path).stdin(Stdio::null()).output() {
                Ok(output) => output,
                Err(e) => {
                    debug!("failed to spawn {}: {e}", self.program.display());
                    return None;
                }
            };
        if !output.status.success() {
            debug!("{} exited with {} for {}", self.program.display(), output.status, path.display());
            return None;
        }
        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        (!text.is_empty()).then_some(text)
    }
}

impl TypeIdentifier for FileCommandIdentifier {
    fn identify(&self, path: &Path) -> Option<FileType> {
        let mime = self.run(&["-b", "--mime-type"], path)?;
        let full = self.run(&["-b"], path)?;
        Some(FileType { mime, full })
    }
}
