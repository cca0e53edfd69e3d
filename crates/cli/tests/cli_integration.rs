// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use std::path::PathBuf;
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

fn temp_path(prefix: &str, ext: &str) -> PathBuf {
    let mut dir = std::env::temp_dir();
    dir.push("pinsim-tests");
    let _ = std::fs::create_dir_all(&dir);

    let nonce = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    dir.join(format!("{}-{}.{}", prefix, nonce, ext))
}

fn write_temp_file(prefix: &str, contents: &str) -> PathBuf {
    let path = temp_path(prefix, "yaml");
    std::fs::write(&path, contents).expect("Failed to write temp file");
    path
}

fn pinsim(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_pinsim"))
        .args(args)
        .output()
        .expect("Failed to execute command")
}

#[test]
fn test_cli_help() {
    let output = pinsim(&["--help"]);
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("run"));
    assert!(stdout.contains("profiles"));
}

#[test]
fn test_run_passing_script_exits_0() {
    let script = fixture("blink.yaml");
    let output = pinsim(&["run", "--script", script.to_str().unwrap()]);
    assert_eq!(
        output.status.code(),
        Some(0),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

#[test]
fn test_run_json_reports_assertions() {
    let script = fixture("blink.yaml");
    let output = pinsim(&["run", "--script", script.to_str().unwrap(), "--json"]);
    assert_eq!(output.status.code(), Some(0));

    let result: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(result["status"], "pass");
    assert_eq!(result["profile"], "F446RE");
    assert_eq!(result["steps_executed"], 3);
    let assertions = result["assertions"].as_array().unwrap();
    assert_eq!(assertions.len(), 6);
    assert!(assertions.iter().all(|a| a["passed"] == true));
}

#[test]
fn test_run_assertion_failure_exits_1() {
    let script = write_temp_file(
        "assert-fail",
        r#"
schema_version: "1.0"
profile: F446RE
steps:
  - action: write_register
    name: GPIOA_BSRR
    value: 32
assertions:
  - pin_digital: { pin: PA5, high: false }
  - component_state: { component: led1, state: { lit: true } }
"#,
    );
    let output = pinsim(&["run", "--script", script.to_str().unwrap(), "--json"]);
    assert_eq!(output.status.code(), Some(1));

    let result: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(result["status"], "fail");
    assert_eq!(result["assertions"][0]["passed"], false);
    assert_eq!(result["assertions"][1]["passed"], true);
}

#[test]
fn test_run_invalid_script_exits_2() {
    let script = write_temp_file(
        "bad-schema",
        "schema_version: \"1.0\"\nprofile: F446RE\nsteps:\n  - action: reflash\n",
    );
    let output = pinsim(&["run", "--script", script.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(2));

    let output = pinsim(&["run", "--script", "does-not-exist.yaml"]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_run_unknown_profile_exits_2() {
    let script = fixture("blink.yaml");
    let output = pinsim(&[
        "run",
        "--script",
        script.to_str().unwrap(),
        "--profile",
        "ATMEGA328",
    ]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_run_without_board_exits_2() {
    let script = write_temp_file("no-board", "schema_version: \"1.0\"\n");
    let output = pinsim(&["run", "--script", script.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_assertion_on_unknown_pin_exits_2() {
    let script = write_temp_file(
        "unknown-pin",
        r#"
schema_version: "1.0"
profile: F446RE
assertions:
  - pin_digital: { pin: PZ9, high: true }
"#,
    );
    let output = pinsim(&["run", "--script", script.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_run_rejected_stimulus_exits_3() {
    let script = write_temp_file(
        "runtime-error",
        r#"
schema_version: "1.0"
profile: F446RE
steps:
  - action: write_register
    name: GPIOA_BSRR
    value: 32
  - action: write_register
    name: GPIOA_IDR
    value: 1
  - action: press
    component: button1
"#,
    );
    let output = pinsim(&["run", "--script", script.to_str().unwrap(), "--json"]);
    assert_eq!(output.status.code(), Some(3));

    let result: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(result["status"], "error");
    assert_eq!(result["steps_executed"], 1);
    assert!(result["message"].as_str().unwrap().contains("GPIOA_IDR"));
}

#[test]
fn test_divergence_exits_3() {
    let script = write_temp_file(
        "divergence",
        r#"
schema_version: "1.0"
profile: F446RE
engine: { generation_limit: 1 }
steps:
  - action: press_key
    component: keypad1
    row: 0
    col: 0
"#,
    );
    let output = pinsim(&["run", "--script", script.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn test_profile_override_selects_other_board() {
    let script = write_temp_file(
        "override",
        r#"
schema_version: "1.0"
profile: F446RE
assertions:
  - register_value: { name: GPIOA_BRR, value: 0 }
"#,
    );
    let output = pinsim(&["run", "--script", script.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(2));

    let output = pinsim(&[
        "run",
        "--script",
        script.to_str().unwrap(),
        "--profile",
        "L476RG",
    ]);
    assert_eq!(output.status.code(), Some(0));
}

#[test]
fn test_profile_file_resolves_next_to_script() {
    let script = fixture("custom_board.yaml");
    let output = pinsim(&["run", "--script", script.to_str().unwrap(), "--json"]);
    assert_eq!(
        output.status.code(),
        Some(0),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let result: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(result["profile"], "MINI");
}

#[test]
fn test_run_writes_snapshot() {
    let script = fixture("blink.yaml");
    let snapshot = temp_path("snapshot", "json");
    let output = pinsim(&[
        "run",
        "--script",
        script.to_str().unwrap(),
        "--snapshot",
        snapshot.to_str().unwrap(),
    ]);
    assert_eq!(output.status.code(), Some(0));

    let contents = std::fs::read_to_string(&snapshot).expect("snapshot not written");
    let _ = std::fs::remove_file(&snapshot);
    let snap: serde_json::Value = serde_json::from_str(&contents).unwrap();
    assert_eq!(snap["profile_id"], "F446RE");
    assert_eq!(snap["registers"]["ADC1_DR"], 3071);
    assert_eq!(snap["components"]["led1"]["lit"], true);
}

#[test]
fn test_profiles_lists_builtin_boards() {
    let output = pinsim(&["profiles"]);
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    for id in ["F446RE", "F031K6", "L476RG"] {
        assert!(stdout.contains(id), "missing {} in {}", id, stdout);
    }
}

#[test]
fn test_show_prints_power_on_state() {
    let output = pinsim(&["show", "--profile", "f031k6"]);
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("Board F031K6"));
    assert!(stdout.contains("ADC_DR"));

    let output = pinsim(&["show", "--profile", "F446RE", "--json"]);
    assert!(output.status.success());
    let snap: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(snap["pins"]["PC13"]["function"], "gpio_input");

    let output = pinsim(&["show", "--profile", "NOPE"]);
    assert_eq!(output.status.code(), Some(2));
}
