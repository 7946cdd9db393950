use std::io::{self, Write};

use anyhow::{anyhow, Context, Result};
use qemu_exec_core::model::{FileAnalysis, PluginResult};
use qemu_exec_core::services::aggregate::decompress_trace;
use qemu_exec_core::services::orchestrator::PLUGIN_NAME;
use qemu_exec_core::store::ResultStore;
use serde::Serialize;

use crate::canonicalize_or_current;

#[derive(Debug, Serialize)]
pub struct StoredResultInfo {
    pub object_uid: String,
    pub plugin: String,
    pub executable: bool,
    pub stored_at: String,
}

fn open_store(store: &str) -> Result<ResultStore> {
    let path = canonicalize_or_current(store)?;
    ResultStore::open(&path)
        .with_context(|| format!("Failed to open result store at {}", path.display()))
}

fn load_result(db: &ResultStore, uid: &str) -> Result<PluginResult> {
    db.load(uid, PLUGIN_NAME)
        .context("Failed to load stored result")?
        .ok_or_else(|| anyhow!("No {PLUGIN_NAME} result stored for {uid}"))
}

/// List stored results.
pub fn list_results_command(store: &str, json: bool) -> Result<()> {
    let db = open_store(store)?;
    let rows = db.list().context("Failed to list stored results")?;

    if json {
        let infos: Vec<StoredResultInfo> = rows
            .into_iter()
            .map(|r| StoredResultInfo {
                object_uid: r.object_uid,
                plugin: r.plugin,
                executable: r.executable,
                stored_at: r.stored_at,
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&infos)?);
        return Ok(());
    }

    if rows.is_empty() {
        println!("No results stored.");
        return Ok(());
    }
    println!("Stored results ({}):", rows.len());
    for row in rows {
        let verdict = if row.executable { "executable" } else { "-" };
        println!("  - {} [{}] {} ({})", row.object_uid, row.plugin, verdict, row.stored_at);
    }
    Ok(())
}

/// Print a stored result as pretty JSON.
pub fn show_result_command(store: &str, uid: &str) -> Result<()> {
    let db = open_store(store)?;
    let result = load_result(&db, uid)?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

/// Find a file analysis by file identifier or by its path inside the object.
pub fn find_file<'a>(result: &'a PluginResult, file: &str) -> Option<&'a FileAnalysis> {
    let files = result.files.as_ref()?;
    files.get(file).or_else(|| files.values().find(|f| f.path == file))
}

/// Print the decompressed syscall trace of one file under one architecture.
pub fn trace_command(store: &str, uid: &str, file: &str, arch: &str) -> Result<()> {
    let db = open_store(store)?;
    let result = load_result(&db, uid)?;
    let analysis =
        find_file(&result, file).ok_or_else(|| anyhow!("No file '{file}' in result for {uid}"))?;
    let set = analysis
        .results
        .get(arch)
        .ok_or_else(|| anyhow!("Architecture '{arch}' was not tested for {file}"))?;
    let runs = match set.runs() {
        Some(runs) => runs,
        None => {
            let error = set.error().map(|e| e.as_str()).unwrap_or("unknown");
            return Err(anyhow!("All runs for {arch} failed ({error}); no trace recorded"));
        }
    };
    match runs.strace.compressed() {
        Some(blob) => {
            let trace = decompress_trace(blob).context("Failed to decompress stored trace")?;
            io::stdout().write_all(&trace).context("Failed to write trace")?;
        }
        None => println!("No trace recorded for {file} under {arch}."),
    }
    Ok(())
}
