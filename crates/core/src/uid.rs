//! Content-addressed identifiers: `<sha256 hex>_<size in bytes>`.

use std::fs;
use std::io::{BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

pub fn create_uid(data: &[u8]) -> String {
    format!("{:x}_{}", Sha256::digest(data), data.len())
}

/// Identifier of a file, hashed in chunks.
pub fn file_uid(path: &Path) -> Result<String> {
    let file = fs::File::open(path)
        .with_context(|| format!("Failed to open file for hashing: {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    let mut size: u64 = 0;

    loop {
        let n = reader
            .read(&mut buf)
            .with_context(|| format!("Failed to read file for hashing: {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
    }

    Ok(format!("{:x}_{}", hasher.finalize(), size))
}

/// Identifier of a directory tree: hashes relative paths and contents of all
/// regular files in name order. Size is the total content size.
pub fn tree_uid(root: &Path) -> Result<String> {
    let mut hasher = Sha256::new();
    let mut size: u64 = 0;
    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
        let data = fs::read(entry.path())
            .with_context(|| format!("Failed to read {}", entry.path().display()))?;
        hasher.update(rel.to_string_lossy().as_bytes());
        hasher.update([0u8]);
        hasher.update(&data);
        size += data.len() as u64;
    }
    Ok(format!("{:x}_{}", hasher.finalize(), size))
}
