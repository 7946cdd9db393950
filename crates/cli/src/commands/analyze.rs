use std::path::Path;

use anyhow::{anyhow, Context, Result};
use qemu_exec_core::config::ExecConfig;
use qemu_exec_core::model::FirmwareObject;
use qemu_exec_core::services::file_type::{FileCommandIdentifier, TypeIdentifier};
use qemu_exec_core::services::orchestrator::{QemuExecAnalysis, PLUGIN_NAME};
use qemu_exec_core::services::sandboxes::DockerSandbox;
use qemu_exec_core::services::unpack::{list_included_files, StagingUnpacker};
use qemu_exec_core::store::ResultStore;
use qemu_exec_core::uid::{file_uid, tree_uid};
use tracing::info;

use crate::{canonicalize_or_current, load_config_or_default};

/// Build a firmware object for a file or a pre-extracted directory.
///
/// A directory is treated as an unpacked container whose regular files are
/// its included children; a single file has no children.
pub fn firmware_object_from_path(
    path: &Path,
    identifier: &dyn TypeIdentifier,
) -> Result<FirmwareObject> {
    if path.is_dir() {
        let mut object = FirmwareObject::new(tree_uid(path)?);
        object.files_included = list_included_files(path)
            .with_context(|| format!("Failed to list files below {}", path.display()))?;
        object.file_path = Some(path.to_path_buf());
        Ok(object)
    } else if path.is_file() {
        let mut object = FirmwareObject::new(file_uid(path)?);
        object.file_type = identifier.identify(path);
        object.file_path = Some(path.to_path_buf());
        Ok(object)
    } else {
        Err(anyhow!("No such file or directory: {}", path.display()))
    }
}

/// Run the engine against `path` with the Docker sandbox and the staging
/// unpacker.
pub fn analyze_path(path: &Path, config: &ExecConfig) -> Result<FirmwareObject> {
    let identifier = FileCommandIdentifier::default();
    let mut object = firmware_object_from_path(path, &identifier)?;
    info!(uid = %object.uid, children = object.files_included.len(), "analyzing");

    let sandbox = DockerSandbox::new(&config.docker);
    let analysis = QemuExecAnalysis {
        config,
        sandbox: &sandbox,
        unpacker: &StagingUnpacker,
        identifier: &identifier,
    };
    analysis.process_object(&mut object);
    Ok(object)
}

pub fn analyze_command(
    path: &str,
    config: Option<&str>,
    store: Option<&str>,
    pretty: bool,
) -> Result<()> {
    let config = load_config_or_default(config)?;
    let path = canonicalize_or_current(path)?;
    let object = analyze_path(&path, &config)?;

    let Some(result) = object.processed_analysis.get(PLUGIN_NAME) else {
        println!("Sandbox unavailable; no {PLUGIN_NAME} result recorded for {}", object.uid);
        return Ok(());
    };

    if let Some(store) = store {
        let store_path = canonicalize_or_current(store)?;
        let db = ResultStore::open(&store_path)
            .with_context(|| format!("Failed to open result store at {}", store_path.display()))?;
        db.save_object(&object).context("Failed to save analysis result")?;
        info!(uid = %object.uid, store = %store_path.display(), "result stored");
    }

    let json = if pretty {
        serde_json::to_string_pretty(result)?
    } else {
        serde_json::to_string(result)?
    };
    println!("{json}");
    Ok(())
}
