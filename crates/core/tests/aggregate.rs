use qemu_exec_core::model::{ArchResultSet, RunError, RunResult, TraceEntry};
use qemu_exec_core::services::aggregate::{
    aggregate_arch_outcomes, compress_trace, convert_output_to_strings, decompress_trace,
    merge_similar_entries, process_trace, replace_empty_keys, EMPTY_OPTION,
};
use qemu_exec_core::services::harness::{InvocationOption, RawOutcome, RawOutput};

fn output(stdout: &str, stderr: &str, return_code: i32) -> RawOutput {
    RawOutput {
        stdout: stdout.as_bytes().to_vec(),
        stderr: stderr.as_bytes().to_vec(),
        return_code,
    }
}

fn sample_entries() -> Vec<(String, RunResult)> {
    vec![
        ("option_1".to_string(), RunResult::completed("foo", "", "0")),
        ("option_3".to_string(), RunResult::completed("", "usage", "1")),
        ("option_2".to_string(), RunResult::completed("foo", "", "0")),
        ("option_4".to_string(), RunResult::completed("", "usage", "1")),
        ("option_5".to_string(), RunResult::Failed { error: RunError::Timeout }),
    ]
}

fn split_keys(entries: &[(String, RunResult)]) -> Vec<String> {
    let mut keys: Vec<String> =
        entries.iter().flat_map(|(k, _)| k.split(", ").map(str::to_string)).collect();
    keys.sort();
    keys
}

fn default_options() -> Vec<InvocationOption> {
    [" ", "-h", "--help", "-help", "--version"]
        .into_iter()
        .map(|o| InvocationOption::Argument(o.to_string()))
        .collect()
}

#[test]
fn merge_groups_identical_values() {
    let merged = merge_similar_entries(sample_entries());
    assert_eq!(
        merged,
        vec![
            ("option_1, option_2".to_string(), RunResult::completed("foo", "", "0")),
            ("option_3, option_4".to_string(), RunResult::completed("", "usage", "1")),
            ("option_5".to_string(), RunResult::Failed { error: RunError::Timeout }),
        ]
    );
}

#[test]
fn merge_is_idempotent_and_preserves_keys() {
    let original = sample_entries();
    let once = merge_similar_entries(original.clone());
    let twice = merge_similar_entries(once.clone());
    assert_eq!(once, twice);
    assert_eq!(split_keys(&once), split_keys(&original));
}

#[test]
fn merge_never_combines_entries_differing_in_one_field() {
    let entries = vec![
        ("-h".to_string(), RunResult::completed("usage", "", "0")),
        ("--help".to_string(), RunResult::completed("usage", "", "1")),
    ];
    let merged = merge_similar_entries(entries.clone());
    assert_eq!(merged, entries);
}

#[test]
fn whitespace_keys_are_replaced_with_sentinel() {
    let entries = vec![("-h".to_string(), 1), (" ".to_string(), 2), ("\t".to_string(), 3)];
    let replaced = replace_empty_keys(entries);
    assert_eq!(replaced, vec![("-h".to_string(), 1), (EMPTY_OPTION.to_string(), 2)]);
}

#[test]
fn outputs_are_converted_to_strings() {
    let converted = convert_output_to_strings(&output("Hello World\n", "", 0));
    assert_eq!(converted, RunResult::completed("Hello World\n", "", "0"));

    let converted = convert_output_to_strings(&output("", "boom", -1));
    assert_eq!(converted, RunResult::completed("", "boom", "-1"));
}

#[test]
fn missing_or_failed_traces_become_empty() {
    assert_eq!(process_trace(None), TraceEntry::default());
    assert_eq!(process_trace(Some(&Err(RunError::Timeout))), TraceEntry::default());
    assert_eq!(process_trace(Some(&Ok(output("", "", 0)))), TraceEntry::default());
}

#[test]
fn non_empty_trace_is_stored_as_zlib_blob() {
    let text = "1234 execve(\"/bin/busybox\",{\"busybox\",NULL}) = 0\n".repeat(200);
    let entry = process_trace(Some(&Ok(output(&text, "", 0))));
    let blob = entry.compressed().expect("compressed trace");
    assert_eq!(&blob[..2], &[0x78, 0x9c]);
    assert!(blob.len() < text.len());
    assert_eq!(decompress_trace(blob).expect("decompress"), text.as_bytes());
}

#[test]
fn trace_bytes_survive_storage_unchanged() {
    let trace = b"42 write(2,0x1000,3) = 3\n\xff\xfe\x80garbage\n".to_vec();
    let raw = RawOutput { stdout: trace.clone(), stderr: Vec::new(), return_code: 0 };
    let entry = process_trace(Some(&Ok(raw)));
    let blob = entry.compressed().expect("compressed trace");
    assert_eq!(decompress_trace(blob).expect("decompress"), trace);
}

#[test]
fn compress_trace_round_trips_unicode() {
    let text = "write(1,\"grüße\\n\",7) = 7\n";
    let blob = compress_trace(text.as_bytes()).expect("compress");
    assert_eq!(decompress_trace(&blob).expect("decompress"), text.as_bytes());
}

#[test]
fn arch_set_collapses_when_every_run_failed_the_same_way() {
    let outcomes: Vec<(InvocationOption, RawOutcome)> = vec![
        (InvocationOption::Argument(" ".into()), Err(RunError::Timeout)),
        (InvocationOption::Argument("-h".into()), Err(RunError::Timeout)),
        (InvocationOption::Trace, Err(RunError::Timeout)),
    ];
    let aggregate = aggregate_arch_outcomes(outcomes);
    assert_eq!(aggregate.results, ArchResultSet::Failed { error: RunError::Timeout });
    assert!(!aggregate.emulation_error);
}

#[test]
fn mixed_failures_stay_inline() {
    let outcomes: Vec<(InvocationOption, RawOutcome)> = vec![
        (InvocationOption::Argument(" ".into()), Err(RunError::Timeout)),
        (InvocationOption::Argument("-h".into()), Err(RunError::ProcessError)),
        (InvocationOption::Trace, Err(RunError::Timeout)),
    ];
    let aggregate = aggregate_arch_outcomes(outcomes);
    let runs = aggregate.results.runs().expect("inline results");
    assert_eq!(runs.options[EMPTY_OPTION], RunResult::Failed { error: RunError::Timeout });
    assert_eq!(runs.options["-h"], RunResult::Failed { error: RunError::ProcessError });
    assert_eq!(runs.strace, TraceEntry::default());
}

#[test]
fn aggregate_normalizes_merges_and_flags_emulation_errors() {
    let outcomes: Vec<(InvocationOption, RawOutcome)> = vec![
        (InvocationOption::Argument(" ".into()), Ok(output("Hello World\n", "", 0))),
        (InvocationOption::Argument("-h".into()), Ok(output("Hello World\n", "", 0))),
        (
            InvocationOption::Argument("--version".into()),
            Ok(output("", "qemu: Unsupported syscall: 4001\n", 1)),
        ),
        (InvocationOption::Trace, Ok(output("execve(...) = 0\n", "", 0))),
    ];
    let aggregate = aggregate_arch_outcomes(outcomes);
    assert!(aggregate.emulation_error);

    let runs = aggregate.results.runs().expect("inline results");
    let keys: Vec<&str> = runs.options.keys().collect();
    assert_eq!(keys, vec!["(no parameter), -h", "--version"]);
    let trace = runs.strace.compressed().expect("trace stored");
    assert_eq!(decompress_trace(trace).expect("decompress"), b"execve(...) = 0\n");
}

#[test]
fn merged_key_follows_configured_option_order() {
    let mut outcomes: Vec<(InvocationOption, RawOutcome)> = default_options()
        .into_iter()
        .map(|option| (option, Ok(output("Hello World\n", "", 0))))
        .collect();
    outcomes.push((InvocationOption::Trace, Ok(output("", "", 0))));

    let aggregate = aggregate_arch_outcomes(outcomes);
    let runs = aggregate.results.runs().expect("inline results");
    let keys: Vec<&str> = runs.options.keys().collect();
    assert_eq!(keys, vec!["(no parameter), -h, --help, -help, --version"]);
}

#[test]
fn unmerged_results_keep_configured_option_order() {
    let outcomes: Vec<(InvocationOption, RawOutcome)> = default_options()
        .into_iter()
        .enumerate()
        .map(|(i, option)| (option, Ok(output(&format!("out {i}\n"), "", 0))))
        .collect();

    let aggregate = aggregate_arch_outcomes(outcomes);
    let value = serde_json::to_string(&aggregate.results).expect("serialize");
    let positions: Vec<usize> = ["(no parameter)", "-h", "--help", "-help", "--version"]
        .iter()
        .map(|key| value.find(&format!("\"{key}\":")).expect("key serialized"))
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]), "keys out of order: {value}");

    let back: ArchResultSet = serde_json::from_str(&value).expect("deserialize");
    let keys: Vec<&str> = back.runs().expect("inline results").options.keys().collect();
    assert_eq!(keys, vec!["(no parameter)", "-h", "--help", "-help", "--version"]);
}

#[test]
fn markers_in_the_trace_log_are_not_emulation_errors() {
    let outcomes: Vec<(InvocationOption, RawOutcome)> = vec![
        (InvocationOption::Argument("-h".into()), Ok(output("Hello\n", "", 0))),
        (
            InvocationOption::Trace,
            Ok(output("42 syscall(4001)\nqemu: Unsupported syscall: 4001\n", "", 0)),
        ),
    ];
    let aggregate = aggregate_arch_outcomes(outcomes);
    assert!(!aggregate.emulation_error);
    assert!(aggregate.results.runs().expect("inline results").strace.compressed().is_some());
}

#[test]
fn serialized_arch_set_keeps_strace_next_to_options() {
    let outcomes: Vec<(InvocationOption, RawOutcome)> = vec![
        (InvocationOption::Argument("-h".into()), Ok(output("", "", 0))),
        (InvocationOption::Trace, Ok(output("", "", 0))),
    ];
    let aggregate = aggregate_arch_outcomes(outcomes);
    let value = serde_json::to_value(&aggregate.results).expect("serialize");
    assert_eq!(
        value,
        serde_json::json!({
            "strace": {},
            "-h": {"stdout": "", "stderr": "", "return_code": "0"}
        })
    );
    let back: ArchResultSet = serde_json::from_value(value).expect("deserialize");
    assert_eq!(back, aggregate.results);
}
