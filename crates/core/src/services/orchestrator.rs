use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;

use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::arch::find_arch_suffixes;
use crate::config::ExecConfig;
use crate::model::{
    AnalysisTag, FileAnalysis, FileCandidate, FileType, FirmwareObject, PluginResult, EXECUTABLE,
};
use crate::services::aggregate::aggregate_arch_outcomes;
use crate::services::file_type::TypeIdentifier;
use crate::services::harness::{run_invocation, InvocationOption, RawOutcome};
use crate::services::heuristics::valid_execution_in_results;
use crate::services::sandboxes::Sandbox;
use crate::services::unpack::{find_root_path, Unpacker};
use crate::uid::file_uid;

/// Name under which results are stored on a firmware object.
pub const PLUGIN_NAME: &str = "qemu_exec";

pub const TAG_VALUE: &str = "QEMU executable";
pub const TAG_COLOR: &str = "blue";

/// A file selected for execution: its identifier, path and candidate architectures.
#[derive(Debug, Clone)]
struct Target {
    uid: String,
    path: String,
    archs: Vec<&'static str>,
}

/// Coordinator that ties configuration, sandbox and collaborators together.
pub struct QemuExecAnalysis<'a> {
    pub config: &'a ExecConfig,
    pub sandbox: &'a dyn Sandbox,
    pub unpacker: &'a dyn Unpacker,
    pub identifier: &'a dyn TypeIdentifier,
}

impl<'a> QemuExecAnalysis<'a> {
    /// Analyze `object` and record the result under [`PLUGIN_NAME`].
    ///
    /// When the sandbox is unavailable nothing is recorded (unless the
    /// object itself is an executable candidate).
    pub fn process_object(&self, object: &mut FirmwareObject) {
        let parent_flag = self.has_relevant_type(object.file_type.as_ref());
        let mut result = PluginResult::empty();
        if parent_flag {
            // The object is analyzed as a child of its own container.
            result.parent_flag = Some(true);
        }

        if object.files_included.is_empty() {
            object.processed_analysis.insert(PLUGIN_NAME.to_string(), result);
            return;
        }

        if !self.sandbox.is_available() {
            warn!(uid = %object.uid, sandbox = self.sandbox.name(), "sandbox unavailable; skipping");
            if parent_flag {
                object.processed_analysis.insert(PLUGIN_NAME.to_string(), result);
            }
            return;
        }

        match self.unpacker.unpack(object) {
            Some(dir) => {
                let root = find_root_path(dir.path(), &self.config.extraction_folder);
                let candidates = self.find_relevant_files(&root);
                info!(uid = %object.uid, count = candidates.len(), "relevant files found");
                if !candidates.is_empty() {
                    let files = self.process_included_files(&root, &candidates);
                    result.summary = get_summary(&files);
                    result.files = Some(files);
                }
            }
            None => info!(uid = %object.uid, "nothing unpacked"),
        }

        if result.is_executable() {
            object.analysis_tags.insert(
                PLUGIN_NAME.to_string(),
                AnalysisTag {
                    value: TAG_VALUE.to_string(),
                    color: TAG_COLOR.to_string(),
                    propagate: true,
                },
            );
        }
        object.processed_analysis.insert(PLUGIN_NAME.to_string(), result);
    }

    pub fn has_relevant_type(&self, file_type: Option<&FileType>) -> bool {
        file_type.is_some_and(|t| self.config.is_relevant_mime(&t.mime))
    }

    /// Regular files (not symlinks) below `root` with an executable MIME type,
    /// in path order.
    pub fn find_relevant_files(&self, root: &Path) -> Vec<FileCandidate> {
        let mut out = Vec::new();
        for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!("skipping unreadable entry: {e}");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(file_type) = self.identifier.identify(entry.path()) else {
                continue;
            };
            if !self.has_relevant_type(Some(&file_type)) {
                continue;
            }
            let Ok(rel) = entry.path().strip_prefix(root) else {
                continue;
            };
            out.push(FileCandidate {
                path: format!("/{}", rel.to_string_lossy()),
                full_type: file_type.full,
            });
        }
        out
    }

    /// Run every (file, architecture, option) job and build per-file analyses
    /// keyed by file identifier.
    pub fn process_included_files(
        &self,
        root: &Path,
        candidates: &[FileCandidate],
    ) -> BTreeMap<String, FileAnalysis> {
        let targets = select_targets(root, candidates);
        let all_options = self.config.invocation_options();
        let options: &[InvocationOption] = &all_options;

        let jobs: Vec<(usize, &'static str, &InvocationOption)> = targets
            .iter()
            .enumerate()
            .flat_map(|(idx, target)| {
                target
                    .archs
                    .iter()
                    .flat_map(move |arch| options.iter().map(move |option| (idx, *arch, option)))
            })
            .collect();
        debug!(targets = targets.len(), jobs = jobs.len(), "dispatching sandbox jobs");

        let outcomes = self.run_jobs(root, &targets, &jobs);

        let mut grouped: BTreeMap<(usize, &'static str), Vec<(InvocationOption, RawOutcome)>> =
            BTreeMap::new();
        for ((idx, arch, option), outcome) in jobs.into_iter().zip(outcomes) {
            grouped.entry((idx, arch)).or_default().push((option.clone(), outcome));
        }

        let mut files = BTreeMap::new();
        for (idx, target) in targets.into_iter().enumerate() {
            let mut results = BTreeMap::new();
            let mut emulation_errors = BTreeSet::new();
            for arch in &target.archs {
                let outcomes = grouped.remove(&(idx, *arch)).unwrap_or_default();
                let aggregate = aggregate_arch_outcomes(outcomes);
                if aggregate.emulation_error {
                    emulation_errors.insert(arch.to_string());
                }
                results.insert(arch.to_string(), aggregate.results);
            }
            let executable = valid_execution_in_results(&results);
            debug!(uid = %target.uid, path = %target.path, executable, "file analyzed");
            files.insert(
                target.uid,
                FileAnalysis { path: target.path, executable, results, emulation_errors },
            );
        }
        files
    }

    fn run_jobs(
        &self,
        root: &Path,
        targets: &[Target],
        jobs: &[(usize, &'static str, &InvocationOption)],
    ) -> Vec<RawOutcome> {
        let timeout = self.config.timeout();
        let run = |&(idx, arch, option): &(usize, &'static str, &InvocationOption)| {
            run_invocation(self.sandbox, root, &targets[idx].path, arch, option, timeout)
        };

        match ThreadPoolBuilder::new().num_threads(self.config.workers.max(1)).build() {
            Ok(pool) => pool.install(|| jobs.par_iter().map(run).collect()),
            Err(e) => {
                warn!("failed to build worker pool, running jobs sequentially: {e}");
                jobs.iter().map(run).collect()
            }
        }
    }
}

/// Resolve architectures and identifiers; files without a known architecture
/// are dropped and duplicates (same content) are tested once.
fn select_targets(root: &Path, candidates: &[FileCandidate]) -> Vec<Target> {
    let mut seen = HashSet::new();
    let mut targets = Vec::new();
    for candidate in candidates {
        let archs = find_arch_suffixes(&candidate.full_type);
        if archs.is_empty() {
            debug!(path = %candidate.path, "no matching architecture");
            continue;
        }
        let abs = root.join(candidate.path.trim_start_matches('/'));
        let uid = match file_uid(&abs) {
            Ok(uid) => uid,
            Err(e) => {
                warn!(path = %candidate.path, "failed to hash file: {e:#}");
                continue;
            }
        };
        if !seen.insert(uid.clone()) {
            continue;
        }
        targets.push(Target { uid, path: candidate.path.clone(), archs });
    }
    targets
}

/// `["executable"]` if any file executed, else `[]`.
pub fn get_summary(files: &BTreeMap<String, FileAnalysis>) -> Vec<String> {
    if files.values().any(|f| f.executable) {
        vec![EXECUTABLE.to_string()]
    } else {
        Vec::new()
    }
}
