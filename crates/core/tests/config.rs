use std::fs;

use qemu_exec_core::config::{load_config, write_config, ConfigError, ExecConfig};
use qemu_exec_core::services::harness::InvocationOption;
use tempfile::tempdir;

#[test]
fn defaults_match_production_settings() {
    let config = ExecConfig::default();
    assert_eq!(config.timeout_secs, 15);
    assert_eq!(config.workers, 8);
    assert_eq!(config.options, vec![" ", "-h", "--help", "-help", "--version"]);
    assert_eq!(config.extraction_folder, "fact_extracted");
    assert!(config.is_relevant_mime("application/x-executable"));
    assert!(!config.is_relevant_mime("text/plain"));
    assert_eq!(config.docker.image, "fact/qemu-exec:alpine-3.14");
    assert_eq!(config.docker.probe_command, vec!["pgrep", "dockerd"]);
    config.validate().expect("defaults are valid");
}

#[test]
fn invocation_options_end_with_trace_run() {
    let options = ExecConfig::default().invocation_options();
    assert_eq!(options.len(), 6);
    assert_eq!(options.first(), Some(&InvocationOption::Argument(" ".into())));
    assert_eq!(options.last(), Some(&InvocationOption::Trace));
}

#[test]
fn partial_json_config_takes_defaults_for_missing_fields() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("qemu_exec.json");
    fs::write(&path, r#"{"timeout_secs": 3, "docker": {"image": "local/qemu:dev"}}"#)
        .expect("write config");

    let config = load_config(&path).expect("load json");
    assert_eq!(config.timeout_secs, 3);
    assert_eq!(config.workers, 8);
    assert_eq!(config.docker.image, "local/qemu:dev");
    assert_eq!(config.docker.binary, "docker");
}

#[test]
fn yaml_config_is_supported() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("qemu_exec.yaml");
    fs::write(&path, "workers: 2\noptions:\n  - \"-h\"\nfile_types:\n  - application/x-sharedlib\n")
        .expect("write config");

    let config = load_config(&path).expect("load yaml");
    assert_eq!(config.workers, 2);
    assert_eq!(config.options, vec!["-h"]);
    assert_eq!(config.file_types, vec!["application/x-sharedlib"]);
}

#[test]
fn written_config_loads_back_in_both_formats() {
    let dir = tempdir().expect("tempdir");
    let mut config = ExecConfig::default();
    config.timeout_secs = 30;
    config.docker.probe_command = vec!["true".into()];

    for name in ["cfg.json", "cfg.yml"] {
        let path = dir.path().join(name);
        write_config(&path, &config).expect("write config");
        assert_eq!(load_config(&path).expect("load config"), config);
    }
}

#[test]
fn invalid_values_are_rejected() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("bad.json");
    fs::write(&path, r#"{"workers": 0}"#).expect("write config");
    assert!(matches!(load_config(&path), Err(ConfigError::Invalid(_))));

    fs::write(&path, "{not json").expect("write config");
    assert!(matches!(load_config(&path), Err(ConfigError::Json(_))));
}

#[test]
fn unknown_extension_and_missing_file_are_errors() {
    let dir = tempdir().expect("tempdir");
    let toml = dir.path().join("cfg.toml");
    fs::write(&toml, "workers = 1").expect("write config");
    assert!(matches!(load_config(&toml), Err(ConfigError::UnsupportedFormat(_))));

    let missing = dir.path().join("missing.json");
    assert!(matches!(load_config(&missing), Err(ConfigError::Read { .. })));
}
