use std::collections::BTreeMap;

use memchr::memmem;

use crate::model::{ArchResultSet, RunResult};
use crate::services::harness::RawOutcome;

/// Emulator messages that mean the emulation itself went wrong.
pub const QEMU_ERRORS: &[&str] = &["Unsupported syscall", "Invalid ELF", "uncaught target signal"];

/// Whether a completed run counts as evidence that the binary executed.
///
/// Some output is required. Output on stderr only counts together with a
/// zero return code: emulators print a warning and exit non-zero when the
/// binary cannot run at all.
pub fn is_valid_execution(result: &RunResult) -> bool {
    match result {
        RunResult::Completed { stdout, stderr, return_code } => {
            let has_output = !stdout.is_empty() || !stderr.is_empty();
            has_output && (return_code == "0" || stderr.is_empty())
        }
        RunResult::Failed { .. } => false,
    }
}

/// True iff any architecture that ran to completion has a valid option run.
/// The trace run never counts.
pub fn valid_execution_in_results(results: &BTreeMap<String, ArchResultSet>) -> bool {
    results
        .values()
        .filter_map(ArchResultSet::runs)
        .flat_map(|runs| runs.options.values())
        .any(is_valid_execution)
}

pub fn contains_emulation_error(output: &[u8]) -> bool {
    QEMU_ERRORS.iter().any(|marker| memmem::find(output, marker.as_bytes()).is_some())
}

/// Whether any captured stdout/stderr carries an emulator error marker.
pub fn outcomes_contain_emulation_errors<'a, I>(outcomes: I) -> bool
where
    I: IntoIterator<Item = &'a RawOutcome>,
{
    outcomes.into_iter().filter_map(|outcome| outcome.as_ref().ok()).any(|output| {
        contains_emulation_error(&output.stdout) || contains_emulation_error(&output.stderr)
    })
}
