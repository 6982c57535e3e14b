//! Integration tests for the `ecoflow` CLI binary.
//!
//! These tests validate argument parsing, help output, shell completions,
//! config handling and the simulated device backend, all without network
//! access.
#![allow(clippy::unwrap_used)]

use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `ecoflow` binary with env isolation.
///
/// Clears all `ECOFLOW_*` env vars and points config directories at a
/// nonexistent path so tests never touch the user's real configuration.
fn ecoflow_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("ecoflow");
    cmd.env("HOME", "/tmp/ecoflow-cli-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/ecoflow-cli-test-nonexistent")
        .env_remove("ECOFLOW_CONFIG")
        .env_remove("ECOFLOW_API_URL")
        .env_remove("ECOFLOW_ACCESS_KEY")
        .env_remove("ECOFLOW_SECRET_KEY")
        .env_remove("ECOFLOW_REPLY_TIMEOUT")
        .env_remove("ECOFLOW_SIMULATE")
        .env_remove("ECOFLOW_OUTPUT")
        .env_remove("RUST_LOG");
    cmd
}

/// Concatenate stdout + stderr from a command output for flexible matching.
fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

const CONFIG: &str = r#"
[[devices]]
name = "garage"
serial_number = "R331ZEB4ZEAL0528"
model = "delta2"
access_key = "AK-TEST"
secret_key = "very-secret"

[[devices]]
name = "balcony"
serial_number = "HW51ZOH4SF000001"
model = "PowerStream"
access_key = "AK-TEST"
secret_key_env = "ECOFLOW_CLI_TEST_BALCONY_SECRET"
"#;

fn write_config(dir: &Path) -> PathBuf {
    let path = dir.join("config.toml");
    std::fs::write(&path, CONFIG).unwrap();
    path
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = ecoflow_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_flag() {
    ecoflow_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("EcoFlow")
            .and(predicate::str::contains("devices"))
            .and(predicate::str::contains("set"))
            .and(predicate::str::contains("run")),
    );
}

#[test]
fn test_version_flag() {
    ecoflow_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("ecoflow"));
}

// ── Shell completions ───────────────────────────────────────────────

#[test]
fn test_completions_bash() {
    ecoflow_cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

#[test]
fn test_completions_zsh() {
    ecoflow_cmd()
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#compdef"));
}

// ── Error cases ─────────────────────────────────────────────────────

#[test]
fn test_invalid_subcommand() {
    let output = ecoflow_cmd().arg("foobar").output().unwrap();
    assert!(!output.status.success());
    let text = combined_output(&output);
    assert!(
        text.contains("unrecognized") || text.contains("foobar"),
        "Expected error mentioning invalid subcommand:\n{text}"
    );
}

#[test]
fn test_invalid_output_format() {
    let output = ecoflow_cmd()
        .args(["--output", "invalid", "devices", "list"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    let text = combined_output(&output);
    assert!(
        text.contains("invalid") || text.contains("possible values"),
        "Expected error about output format:\n{text}"
    );
}

#[test]
fn test_unknown_device_without_model() {
    ecoflow_cmd()
        .args(["status", "NOPE0000"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_ad_hoc_device_needs_credentials() {
    ecoflow_cmd()
        .args(["status", "R331ZEB4ZEAL0528", "--model", "delta2"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("secret key"));
}

#[test]
fn test_bad_setting_value_is_usage_error() {
    ecoflow_cmd()
        .args([
            "--simulate",
            "set",
            "HW52ZDH4SF123456",
            "--model",
            "smartplug",
            "brightness",
            "bright",
        ])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("brightness"));
}

// ── Config ──────────────────────────────────────────────────────────

#[test]
fn test_devices_list_without_config() {
    ecoflow_cmd().args(["devices", "list"]).assert().success();
}

#[test]
fn test_devices_models_plain() {
    ecoflow_cmd()
        .args(["devices", "models", "-o", "plain"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("Smart Plug")
                .and(predicate::str::contains("PowerOcean"))
                .and(predicate::str::contains("River 2 Pro")),
        );
}

#[test]
fn test_devices_list_from_config_hides_secrets() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path());

    ecoflow_cmd()
        .arg("--config")
        .arg(&path)
        .args(["devices", "list", "-o", "plain"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("R331ZEB4ZEAL0528")
                .and(predicate::str::contains("HW51ZOH4SF000001")),
        );

    ecoflow_cmd()
        .arg("--config")
        .arg(&path)
        .args(["devices", "list", "-o", "json"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("\"product_line\": \"PowerStream\"")
                .and(predicate::str::contains("very-secret").not()),
        );
}

#[test]
fn test_config_path_follows_flag() {
    ecoflow_cmd()
        .args(["--config", "/tmp/ecoflow-elsewhere/bridge.toml", "config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("/tmp/ecoflow-elsewhere/bridge.toml"));
}

#[test]
fn test_config_show_redacts_secret() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path());

    ecoflow_cmd()
        .arg("--config")
        .arg(&path)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("R331ZEB4ZEAL0528")
                .and(predicate::str::contains("***"))
                .and(predicate::str::contains("very-secret").not()),
        );
}

#[test]
fn test_config_add_and_remove_device() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    ecoflow_cmd()
        .arg("--config")
        .arg(&path)
        .args([
            "config",
            "add-device",
            "plug",
            "HW52ZDH4SF123456",
            "Smart Plug",
            "AK-TEST",
            "--secret-env",
            "PLUG_SECRET",
        ])
        .assert()
        .success();
    assert!(path.exists());

    ecoflow_cmd()
        .arg("--config")
        .arg(&path)
        .args(["devices", "list", "-o", "plain"])
        .assert()
        .success()
        .stdout(predicate::str::contains("HW52ZDH4SF123456"));

    // Same serial number again
    ecoflow_cmd()
        .arg("--config")
        .arg(&path)
        .args([
            "config",
            "add-device",
            "plug2",
            "HW52ZDH4SF123456",
            "smartplug",
            "AK-TEST",
        ])
        .assert()
        .code(2);

    ecoflow_cmd()
        .arg("--config")
        .arg(&path)
        .args(["config", "remove-device", "plug"])
        .assert()
        .success();

    ecoflow_cmd()
        .arg("--config")
        .arg(&path)
        .args(["devices", "list", "-o", "plain"])
        .assert()
        .success()
        .stdout(predicate::str::contains("HW52ZDH4SF123456").not());
}

// ── Simulated devices ───────────────────────────────────────────────

#[test]
fn test_simulated_status_json() {
    ecoflow_cmd()
        .args([
            "--simulate",
            "status",
            "R331ZEB4ZEAL0528",
            "--model",
            "delta2",
            "-o",
            "json",
        ])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("\"battery_level\": 87.0")
                .and(predicate::str::contains("\"ac_enabled\": \"Off\"")),
        );
}

#[test]
fn test_simulated_status_of_configured_device() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path());

    ecoflow_cmd()
        .env("ECOFLOW_CLI_TEST_BALCONY_SECRET", "balcony-secret")
        .arg("--config")
        .arg(&path)
        .args(["--simulate", "status", "balcony", "-o", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"battery_level\": 58.0"));
}

#[test]
fn test_simulated_quotas_plain() {
    ecoflow_cmd()
        .args([
            "--simulate",
            "quotas",
            "HW52ZDH4SF123456",
            "--model",
            "smartplug",
            "-o",
            "plain",
        ])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("2_1.switchSta=1")
                .and(predicate::str::contains("2_1.brightness=1023")),
        );
}

#[test]
fn test_simulated_set_without_waiting() {
    ecoflow_cmd()
        .args([
            "--simulate",
            "set",
            "HW52ZDH4SF123456",
            "--model",
            "smartplug",
            "switch",
            "off",
        ])
        .assert()
        .success()
        .stderr(predicate::str::contains("PlugSwitch sent to HW52ZDH4SF123456"));
}

#[test]
fn test_simulated_set_waits_for_reply() {
    ecoflow_cmd()
        .args([
            "--simulate",
            "--reply-timeout",
            "2s",
            "set",
            "HW52ZDH4SF123456",
            "--model",
            "smartplug",
            "switch",
            "off",
        ])
        .assert()
        .success()
        .stderr(predicate::str::contains(
            "PlugSwitch acknowledged by HW52ZDH4SF123456",
        ));
}

#[test]
fn test_simulated_read_only_device_rejects_set() {
    ecoflow_cmd()
        .args([
            "--simulate",
            "set",
            "HJ31ZEB4ZEAL0001",
            "--model",
            "powerocean",
            "ac",
            "on",
        ])
        .assert()
        .code(5)
        .stderr(predicate::str::contains("read-only"));
}

#[test]
fn test_simulated_run_prints_status_events() {
    ecoflow_cmd()
        .args([
            "--simulate",
            "run",
            "R331ZEB4ZEAL0528",
            "--model",
            "delta2",
            "--duration",
            "300ms",
            "-o",
            "json-compact",
        ])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("\"event\":\"status\"")
                .and(predicate::str::contains("\"battery_level\":87.0")),
        );
}
