//! End-to-end tests of the chaos-stack binary.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn chaos_stack(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("chaos-stack").unwrap();
    cmd.current_dir(dir.path()).env_remove("RUST_LOG");
    cmd
}

#[test]
fn synth_prints_template() {
    let dir = TempDir::new().unwrap();
    chaos_stack(&dir)
        .arg("synth")
        .assert()
        .success()
        .stdout(predicate::str::contains("AWSTemplateFormatVersion"))
        .stdout(predicate::str::contains("AWS::FIS::ExperimentTemplate"))
        .stdout(predicate::str::contains("albDNS"));
}

#[test]
fn synth_writes_output_file() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("template.json");
    chaos_stack(&dir)
        .args(["synth", "--output"])
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote 6 resources"));

    let content = std::fs::read_to_string(&out).unwrap();
    let template: serde_json::Value = serde_json::from_str(&content).unwrap();
    assert!(template["Resources"]["chaosExperiment"].is_object());
}

#[test]
fn validate_default_stack() {
    let dir = TempDir::new().unwrap();
    chaos_stack(&dir)
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("6 resources valid"))
        .stdout(predicate::str::contains("ec2:TerminateInstances"));
}

#[test]
fn validate_rejects_inverted_pool_bounds() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("chaos-stack.toml"),
        "[pool]\nmin_size = 6\nmax_size = 2\n",
    )
    .unwrap();
    chaos_stack(&dir)
        .arg("validate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Stack validation failed"));
}

#[test]
fn bad_region_override_fails() {
    let dir = TempDir::new().unwrap();
    chaos_stack(&dir)
        .args(["validate", "--region", "Not A Region"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid environment"));
}

#[test]
fn explicit_missing_config_is_an_error() {
    let dir = TempDir::new().unwrap();
    chaos_stack(&dir)
        .args(["order", "--config", "missing.toml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read config file"));
}

#[test]
fn order_lists_waves_and_teardown() {
    let dir = TempDir::new().unwrap();
    chaos_stack(&dir)
        .arg("order")
        .assert()
        .success()
        .stdout(predicate::str::contains("0: chaosVPC, chaosFisRole"))
        .stdout(predicate::str::contains("ASG (after chaosVPC)"))
        .stdout(predicate::str::contains("Teardown order:\n  chaosExperiment"));
}

#[test]
fn simulate_runs_experiment_and_tears_down() {
    let dir = TempDir::new().unwrap();
    let state = dir.path().join("state.json");
    chaos_stack(&dir)
        .args(["simulate", "--state-out"])
        .arg(&state)
        .assert()
        .success()
        .stdout(predicate::str::contains("PENDING -> RUNNING"))
        .stdout(predicate::str::contains("healed: true"))
        .stdout(predicate::str::contains("=== destroy ==="));
    assert!(state.exists());
}

#[test]
fn simulate_breach_stops_experiment() {
    let dir = TempDir::new().unwrap();
    chaos_stack(&dir)
        .args(["simulate", "--breach", "--keep"])
        .assert()
        .success()
        .stdout(predicate::str::contains("alarm in ALARM: true"))
        .stdout(predicate::str::contains("STOPPED"))
        .stdout(predicate::str::contains("steps:    0"))
        .stdout(predicate::str::contains("=== destroy ===").not());
}

#[test]
fn simulate_json_report() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("chaos-stack.toml"), "[runner]\nseed = 7\n").unwrap();
    chaos_stack(&dir)
        .args(["simulate", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"experiment\": \"chaosExperiment\""));
}
