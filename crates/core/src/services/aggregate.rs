//! Normalization, deduplication and trace compression of raw run outcomes.

use std::collections::HashMap;
use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde::Serialize;
use tracing::warn;

use crate::model::{ArchResultSet, ArchRuns, RunError, RunResult, TraceEntry};
use crate::services::harness::{InvocationOption, RawOutcome, RawOutput};
use crate::services::heuristics::outcomes_contain_emulation_errors;

/// Key used in place of an option consisting only of whitespace.
pub const EMPTY_OPTION: &str = "(no parameter)";

/// Separator between option keys of merged entries.
pub const MERGED_KEY_SEPARATOR: &str = ", ";

/// Convert captured bytes and the numeric return code to text.
pub fn convert_output_to_strings(output: &RawOutput) -> RunResult {
    RunResult::Completed {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        return_code: output.return_code.to_string(),
    }
}

pub fn normalize_option_key(key: &str) -> String {
    if key.trim().is_empty() {
        EMPTY_OPTION.to_string()
    } else {
        key.to_string()
    }
}

/// Replace whitespace-only keys with [`EMPTY_OPTION`], keeping entry order.
/// If several entries end up with the same key, the first one wins.
pub fn replace_empty_keys<V>(entries: Vec<(String, V)>) -> Vec<(String, V)> {
    let mut out: Vec<(String, V)> = Vec::with_capacity(entries.len());
    for (key, value) in entries {
        let key = normalize_option_key(&key);
        if !out.iter().any(|(existing, _)| *existing == key) {
            out.push((key, value));
        }
    }
    out
}

/// Group entries whose values are structurally identical and replace every
/// group of two or more with a single entry keyed by the joined keys.
///
/// Groups appear where their first member did, and members are joined in
/// entry order. Values are compared through their canonical JSON
/// serialization; an entry that cannot be serialized is never merged.
pub fn merge_similar_entries<V>(entries: Vec<(String, V)>) -> Vec<(String, V)>
where
    V: Serialize,
{
    let mut groups: Vec<(Vec<String>, V)> = Vec::new();
    let mut by_value: HashMap<String, usize> = HashMap::new();

    for (key, value) in entries {
        let canonical = serde_json::to_string(&value).ok();
        let existing = canonical.as_ref().and_then(|c| by_value.get(c).copied());
        match existing {
            Some(idx) => groups[idx].0.push(key),
            None => {
                if let Some(c) = canonical {
                    by_value.insert(c, groups.len());
                }
                groups.push((vec![key], value));
            }
        }
    }

    groups.into_iter().map(|(keys, value)| (keys.join(MERGED_KEY_SEPARATOR), value)).collect()
}

pub fn compress_trace(trace: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(trace)?;
    encoder.finish()
}

/// Raw trace bytes; the trace may carry non-UTF-8 output of the target.
pub fn decompress_trace(blob: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut trace = Vec::new();
    ZlibDecoder::new(blob).read_to_end(&mut trace)?;
    Ok(trace)
}

/// Turn the trace run outcome into its stored form. Missing, empty or failed
/// traces become an empty entry; this never fails.
pub fn process_trace(outcome: Option<&RawOutcome>) -> TraceEntry {
    let Some(Ok(output)) = outcome else {
        return TraceEntry::default();
    };
    if output.stdout.is_empty() {
        return TraceEntry::default();
    }
    match compress_trace(&output.stdout) {
        Ok(blob) => TraceEntry::Compressed(blob),
        Err(e) => {
            warn!("failed to compress trace: {e}");
            TraceEntry::default()
        }
    }
}

/// Aggregated results of one (file, architecture) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchAggregate {
    pub results: ArchResultSet,
    /// Output carried an emulator-level error marker.
    pub emulation_error: bool,
}

/// Build the stored result set from the raw outcomes of every option
/// (including the trace run) for one (file, architecture) pair.
///
/// Only option runs are scanned for emulator error markers: the trace log
/// names unsupported syscalls without the run having failed.
pub fn aggregate_arch_outcomes(outcomes: Vec<(InvocationOption, RawOutcome)>) -> ArchAggregate {
    let emulation_error = outcomes_contain_emulation_errors(
        outcomes.iter().filter(|(option, _)| !option.is_trace()).map(|(_, outcome)| outcome),
    );

    if let Some(error) = common_error(&outcomes) {
        return ArchAggregate { results: ArchResultSet::Failed { error }, emulation_error };
    }

    let mut trace = None;
    let mut options = Vec::new();
    for (option, outcome) in outcomes {
        if option.is_trace() {
            trace = Some(outcome);
            continue;
        }
        let result = match &outcome {
            Ok(output) => convert_output_to_strings(output),
            Err(error) => RunResult::Failed { error: *error },
        };
        options.push((option.key().to_string(), result));
    }

    let runs = ArchRuns {
        strace: process_trace(trace.as_ref()),
        options: merge_similar_entries(replace_empty_keys(options)).into_iter().collect(),
    };
    ArchAggregate { results: ArchResultSet::Completed(runs), emulation_error }
}

/// The shared error if every outcome failed the same way.
fn common_error(outcomes: &[(InvocationOption, RawOutcome)]) -> Option<RunError> {
    let mut errors = outcomes.iter().map(|(_, outcome)| outcome.as_ref().err().copied());
    let first = errors.next()??;
    errors.all(|e| e == Some(first)).then_some(first)
}
