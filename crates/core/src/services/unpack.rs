use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::model::FirmwareObject;

#[derive(Debug, Error)]
pub enum UnpackError {
    #[error("I/O error at {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("Failed to walk source tree: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Filesystem view of an unpacked firmware object.
///
/// A temporary extraction is removed when this value is dropped.
#[derive(Debug)]
pub struct UnpackedDir {
    path: PathBuf,
    _temp: Option<TempDir>,
}

impl UnpackedDir {
    pub fn temporary(dir: TempDir) -> Self {
        Self { path: dir.path().to_path_buf(), _temp: Some(dir) }
    }

    /// Wrap an existing directory that the caller keeps ownership of.
    pub fn borrowed(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), _temp: None }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Produces a filesystem extraction of a firmware object's content.
pub trait Unpacker: Send + Sync {
    /// `None` means nothing could be unpacked; callers treat it as "no files".
    fn unpack(&self, object: &FirmwareObject) -> Option<UnpackedDir>;
}

/// Stages a pre-extracted directory tree into a scoped temporary directory.
#[derive(Debug, Clone, Default)]
pub struct StagingUnpacker;

pub const STAGING_PREFIX: &str = "qemu_exec_";

impl Unpacker for StagingUnpacker {
    fn unpack(&self, object: &FirmwareObject) -> Option<UnpackedDir> {
        let source = object.file_path.as_ref()?;
        if !source.is_dir() {
            debug!(uid = %object.uid, "no extracted tree at {}", source.display());
            return None;
        }
        match stage_tree(source) {
            Ok(dir) => Some(UnpackedDir::temporary(dir)),
            Err(e) => {
                warn!(uid = %object.uid, "failed to stage {}: {e}", source.display());
                None
            }
        }
    }
}

/// Copy regular files, directories and symlinks below `source` into a new
/// temporary directory.
pub fn stage_tree(source: &Path) -> Result<TempDir, UnpackError> {
    let dir =
        tempfile::Builder::new().prefix(STAGING_PREFIX).tempdir().map_err(io_error(source))?;
    for entry in WalkDir::new(source).follow_links(false).min_depth(1) {
        let entry = entry?;
        let rel = match entry.path().strip_prefix(source) {
            Ok(rel) => rel,
            Err(_) => continue,
        };
        let dest = dir.path().join(rel);
        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&dest).map_err(io_error(&dest))?;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &dest)?;
        } else if file_type.is_file() {
            fs::copy(entry.path(), &dest).map_err(io_error(&dest))?;
        }
    }
    Ok(dir)
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> UnpackError {
    let path = path.to_path_buf();
    move |source| UnpackError::Io { path, source }
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dest: &Path) -> Result<(), UnpackError> {
    let target = fs::read_link(src).map_err(io_error(src))?;
    std::os::unix::fs::symlink(target, dest).map_err(io_error(dest))
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, _dest: &Path) -> Result<(), UnpackError> {
    debug!("skipping symlink {}", src.display());
    Ok(())
}

/// Relative paths (leading `/`, name order) of the regular files below `root`.
pub fn list_included_files(root: &Path) -> Result<Vec<String>, UnpackError> {
    let mut out = Vec::new();
    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        if let Ok(rel) = entry.path().strip_prefix(root) {
            out.push(format!("/{}", rel.to_string_lossy()));
        }
    }
    Ok(out)
}

/// Analysis root inside an unpacked tree: `<dir>/<extraction_folder>` when
/// present, else `dir` itself.
pub fn find_root_path(dir: &Path, extraction_folder: &str) -> PathBuf {
    let nested = dir.join(extraction_folder);
    if !extraction_folder.is_empty() && nested.is_dir() {
        nested
    } else {
        dir.to_path_buf()
    }
}
