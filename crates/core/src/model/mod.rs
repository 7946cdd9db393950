//! Result model for executability checks.
//!
//! The shapes here are what gets persisted against a firmware object, so the
//! serde layout is part of the contract:
//! - `RunResult` is either `{stdout, stderr, return_code}` or `{error}`.
//! - `ArchResultSet` is either `{error}` or a map of option key -> `RunResult`
//!   (in configured option order) with one extra `strace` key holding the
//!   compressed trace (or `{}`).
//! - `PluginResult` is `{summary, files?, parent_flag?}`.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::Index;
use std::path::PathBuf;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Summary label attached when at least one file ran under emulation.
pub const EXECUTABLE: &str = "executable";

/// Result key of the syscall trace run.
pub const STRACE_KEY: &str = "strace";

/// Terminal failure of a single sandbox invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RunError {
    /// The invocation exceeded its wall-clock limit and was killed.
    #[serde(rename = "timeout")]
    Timeout,
    /// The sandbox driver could not be started or failed on its own.
    #[serde(rename = "process error")]
    ProcessError,
}

impl RunError {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunError::Timeout => "timeout",
            RunError::ProcessError => "process error",
        }
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized outcome of one (file, architecture, option) run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RunResult {
    Completed { stdout: String, stderr: String, return_code: String },
    Failed { error: RunError },
}

impl RunResult {
    pub fn completed(
        stdout: impl Into<String>,
        stderr: impl Into<String>,
        return_code: impl Into<String>,
    ) -> Self {
        RunResult::Completed {
            stdout: stdout.into(),
            stderr: stderr.into(),
            return_code: return_code.into(),
        }
    }
}

/// Empty JSON object marker (`{}`) used for a missing or failed trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NoTrace {}

/// Stored form of the syscall trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TraceEntry {
    /// zlib-compressed trace text.
    Compressed(Vec<u8>),
    Empty(NoTrace),
}

impl Default for TraceEntry {
    fn default() -> Self {
        TraceEntry::Empty(NoTrace {})
    }
}

impl TraceEntry {
    pub fn compressed(&self) -> Option<&[u8]> {
        match self {
            TraceEntry::Compressed(blob) => Some(blob),
            TraceEntry::Empty(_) => None,
        }
    }
}

/// Per-option results of one (file, architecture) pair that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ArchRuns {
    #[serde(default)]
    pub strace: TraceEntry,
    /// Option key (possibly a merged key such as `-h, --help`) -> result.
    #[serde(flatten)]
    pub options: OptionResults,
}

/// Option key -> result, kept in the order the options were configured.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OptionResults(Vec<(String, RunResult)>);

impl OptionResults {
    /// Insert `result` under `key`, replacing an existing entry in place.
    pub fn insert(&mut self, key: String, result: RunResult) {
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = result,
            None => self.0.push((key, result)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&RunResult> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(k, _)| k.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &RunResult> {
        self.0.iter().map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RunResult)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, RunResult)> for OptionResults {
    fn from_iter<I: IntoIterator<Item = (String, RunResult)>>(iter: I) -> Self {
        let mut out = OptionResults::default();
        for (key, result) in iter {
            out.insert(key, result);
        }
        out
    }
}

impl Index<&str> for OptionResults {
    type Output = RunResult;

    fn index(&self, key: &str) -> &RunResult {
        match self.get(key) {
            Some(result) => result,
            None => panic!("no result for option key {key:?}"),
        }
    }
}

impl Serialize for OptionResults {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(k, v)| (k, v)))
    }
}

impl<'de> Deserialize<'de> for OptionResults {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OptionResultsVisitor;

        impl<'de> Visitor<'de> for OptionResultsVisitor {
            type Value = OptionResults;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of option keys to run results")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<OptionResults, A::Error> {
                let mut out = OptionResults::default();
                while let Some((key, result)) = map.next_entry::<String, RunResult>()? {
                    out.insert(key, result);
                }
                Ok(out)
            }
        }

        deserializer.deserialize_map(OptionResultsVisitor)
    }
}

/// Results of one (file, architecture) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArchResultSet {
    /// Every run for this architecture ended in the same failure.
    Failed { error: RunError },
    Completed(ArchRuns),
}

impl ArchResultSet {
    pub fn error(&self) -> Option<RunError> {
        match self {
            ArchResultSet::Failed { error } => Some(*error),
            ArchResultSet::Completed(_) => None,
        }
    }

    pub fn runs(&self) -> Option<&ArchRuns> {
        match self {
            ArchResultSet::Completed(runs) => Some(runs),
            ArchResultSet::Failed { .. } => None,
        }
    }
}

/// Analysis of a single file found inside a firmware object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAnalysis {
    /// Path relative to the unpacked root, with a leading `/`.
    pub path: String,
    pub executable: bool,
    /// Architecture (QEMU target suffix) -> results.
    pub results: BTreeMap<String, ArchResultSet>,
    /// Architectures whose output carried emulator-level error markers.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub emulation_errors: BTreeSet<String>,
}

/// Result written for a whole firmware object.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PluginResult {
    pub summary: Vec<String>,
    /// Content-addressed file identifier -> analysis.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<BTreeMap<String, FileAnalysis>>,
    /// Set when the object itself (not a child) is an executable candidate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_flag: Option<bool>,
}

impl PluginResult {
    /// `{summary: []}`
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_executable(&self) -> bool {
        self.summary.iter().any(|label| label == EXECUTABLE)
    }
}

/// Type descriptor supplied by file-type identification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileType {
    /// MIME type, e.g. `application/x-executable`.
    pub mime: String,
    /// Free-form description, e.g. `ELF 32-bit MSB executable, MIPS, MIPS32 ...`.
    pub full: String,
}

impl FileType {
    pub fn new(mime: impl Into<String>, full: impl Into<String>) -> Self {
        Self { mime: mime.into(), full: full.into() }
    }
}

/// A relevant file found inside an unpacked tree.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct FileCandidate {
    /// Path relative to the analysis root, with a leading `/`.
    pub path: String,
    /// Full type descriptor used for architecture resolution.
    pub full_type: String,
}

/// Tag attached to a firmware object by an analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisTag {
    pub value: String,
    pub color: String,
    pub propagate: bool,
}

/// Minimal view of a firmware object as handed over by the surrounding framework.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FirmwareObject {
    pub uid: String,
    /// Backing file or pre-extracted directory, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<FileType>,
    /// Identifiers of the files included in this object.
    #[serde(default)]
    pub files_included: Vec<String>,
    /// Analysis name -> result.
    #[serde(default)]
    pub processed_analysis: BTreeMap<String, PluginResult>,
    /// Analysis name -> tag.
    #[serde(default)]
    pub analysis_tags: BTreeMap<String, AnalysisTag>,
}

impl FirmwareObject {
    pub fn new(uid: impl Into<String>) -> Self {
        Self { uid: uid.into(), ..Self::default() }
    }
}
