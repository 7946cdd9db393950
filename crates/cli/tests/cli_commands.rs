use std::fs;

use predicates::prelude::*;
use qemu_exec_core::config::{write_config, ExecConfig};
use tempfile::tempdir;

fn config_with_probe(dir: &std::path::Path, probe: &str) -> std::path::PathBuf {
    let mut config = ExecConfig::default();
    config.docker.probe_command = vec![probe.to_string()];
    let path = dir.join("qemu_exec.json");
    write_config(&path, &config).expect("write config");
    path
}

#[test]
fn running_without_a_subcommand_fails_with_usage() {
    assert_cmd::cargo::cargo_bin_cmd!("qemu-exec")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn resolve_prints_specific_candidates() {
    assert_cmd::cargo::cargo_bin_cmd!("qemu-exec")
        .arg("resolve")
        .arg("--type")
        .arg("ELF 32-bit MSB executable, MIPS, MIPS32 rel2 version 1 (SYSV)")
        .assert()
        .success()
        .stdout(predicate::str::contains("Architecture candidates (4):"))
        .stdout(predicate::str::contains("  - mipsn32el"))
        .stdout(predicate::str::contains("mips64").not());
}

#[test]
fn resolve_json_emits_array() {
    let output = assert_cmd::cargo::cargo_bin_cmd!("qemu-exec")
        .args(["resolve", "--type", "ELF 64-bit LSB executable, ARM aarch64", "--json"])
        .output()
        .expect("run resolve");
    assert!(output.status.success());
    let parsed: Vec<String> = serde_json::from_slice(&output.stdout).expect("json array");
    assert_eq!(parsed, vec!["aarch64"]);
}

#[test]
fn resolve_reports_unknown_descriptor() {
    assert_cmd::cargo::cargo_bin_cmd!("qemu-exec")
        .args(["resolve", "--type", "ASCII text"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No architecture candidates"));
}

#[test]
fn init_config_writes_defaults_and_refuses_to_overwrite() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("conf/qemu_exec.yaml");

    assert_cmd::cargo::cargo_bin_cmd!("qemu-exec")
        .arg("init-config")
        .arg("--path")
        .arg(&path)
        .assert()
        .success();
    let written = fs::read_to_string(&path).expect("read config");
    assert!(written.contains("fact/qemu-exec:alpine-3.14"));

    assert_cmd::cargo::cargo_bin_cmd!("qemu-exec")
        .arg("init-config")
        .arg("--path")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));

    assert_cmd::cargo::cargo_bin_cmd!("qemu-exec")
        .arg("init-config")
        .arg("--path")
        .arg(&path)
        .arg("--force")
        .assert()
        .success();
}

#[cfg(unix)]
#[test]
fn sandbox_status_reflects_probe() {
    let dir = tempdir().expect("tempdir");

    let down = config_with_probe(dir.path(), "false");
    assert_cmd::cargo::cargo_bin_cmd!("qemu-exec")
        .arg("sandbox-status")
        .arg("--config")
        .arg(&down)
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Available: no"));

    let up = config_with_probe(dir.path(), "true");
    assert_cmd::cargo::cargo_bin_cmd!("qemu-exec")
        .arg("sandbox-status")
        .arg("--config")
        .arg(&up)
        .assert()
        .success()
        .stdout(predicate::str::contains("Available: yes"));
}

#[test]
fn analyze_empty_directory_yields_empty_summary() {
    let dir = tempdir().expect("tempdir");
    let firmware = dir.path().join("firmware");
    fs::create_dir_all(&firmware).expect("mkdir firmware");

    assert_cmd::cargo::cargo_bin_cmd!("qemu-exec")
        .arg("analyze")
        .arg("--path")
        .arg(&firmware)
        .assert()
        .success()
        .stdout(predicate::str::diff("{\"summary\":[]}\n"));
}

#[cfg(unix)]
#[test]
fn analyze_skips_when_sandbox_is_down() {
    let dir = tempdir().expect("tempdir");
    let firmware = dir.path().join("firmware");
    fs::create_dir_all(firmware.join("bin")).expect("mkdir firmware");
    fs::write(firmware.join("bin/app"), b"\x7fELF").expect("write app");
    let config = config_with_probe(dir.path(), "false");
    let store = dir.path().join("results.db");

    assert_cmd::cargo::cargo_bin_cmd!("qemu-exec")
        .arg("analyze")
        .arg("--path")
        .arg(&firmware)
        .arg("--config")
        .arg(&config)
        .arg("--store")
        .arg(&store)
        .assert()
        .success()
        .stdout(predicate::str::contains("Sandbox unavailable"));

    assert_cmd::cargo::cargo_bin_cmd!("qemu-exec")
        .arg("list-results")
        .arg("--store")
        .arg(&store)
        .assert()
        .success()
        .stdout(predicate::str::contains("No results stored."));
}

#[test]
fn analyze_missing_path_fails() {
    let dir = tempdir().expect("tempdir");
    assert_cmd::cargo::cargo_bin_cmd!("qemu-exec")
        .arg("analyze")
        .arg("--path")
        .arg(dir.path().join("nope"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("No such file or directory"));
}

#[test]
fn analyzed_results_can_be_stored_listed_and_shown() {
    let dir = tempdir().expect("tempdir");
    let firmware = dir.path().join("firmware");
    fs::create_dir_all(&firmware).expect("mkdir firmware");
    let store = dir.path().join("results.db");

    assert_cmd::cargo::cargo_bin_cmd!("qemu-exec")
        .arg("analyze")
        .arg("--path")
        .arg(&firmware)
        .arg("--store")
        .arg(&store)
        .arg("--pretty")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"summary\": []"));

    let output = assert_cmd::cargo::cargo_bin_cmd!("qemu-exec")
        .arg("list-results")
        .arg("--store")
        .arg(&store)
        .arg("--json")
        .output()
        .expect("list results");
    assert!(output.status.success());
    let rows: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    let rows = rows.as_array().expect("array");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["plugin"], "qemu_exec");
    assert_eq!(rows[0]["executable"], false);
    let uid = rows[0]["object_uid"].as_str().expect("uid").to_string();

    assert_cmd::cargo::cargo_bin_cmd!("qemu-exec")
        .arg("show-result")
        .arg("--store")
        .arg(&store)
        .arg("--uid")
        .arg(&uid)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"summary\": []"));

    assert_cmd::cargo::cargo_bin_cmd!("qemu-exec")
        .arg("show-result")
        .arg("--store")
        .arg(&store)
        .arg("--uid")
        .arg("unknown_uid")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No qemu_exec result stored"));
}
