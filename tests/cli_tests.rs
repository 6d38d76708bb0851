//! Integration tests for the command-line surface.
//!
//! These run the built binary and check exit codes and output.

use std::io::Write;
use std::process::{Command, Output};

use tempfile::{tempdir, Builder};

fn exporter(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_herakles-libvirt-exporter"))
        .args(args)
        .output()
        .expect("run exporter binary")
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn test_no_arguments_prints_usage() {
    let output = exporter(&["--no-config"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("usage: herakles-libvirt-exporter"));
}

#[test]
fn test_missing_uri_prints_usage() {
    let output = exporter(&["--no-config", "9177"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("<port> <virtualization-uri>"));
}

#[test]
fn test_extra_argument_prints_usage() {
    let output = exporter(&["--no-config", "9177", "qemu:///system", "extra"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("usage:"));
}

#[test]
fn test_invalid_port_prints_usage() {
    let output = exporter(&["--no-config", "not-a-port", "qemu:///system"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("usage:"));
}

#[test]
fn test_check_config_defaults() {
    let output = exporter(&["--no-config", "--check-config"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("Configuration is valid"));
}

#[test]
fn test_check_config_rejects_invalid_file() {
    let mut file = Builder::new().suffix(".yaml").tempfile().unwrap();
    file.write_all(b"backlog: 0\n").unwrap();

    let output = exporter(&["--config", file.path().to_str().unwrap(), "--check-config"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("backlog"));
}

#[test]
fn test_show_config_json() {
    let output = exporter(&["--no-config", "--show-config", "--config-format", "json"]);
    assert!(output.status.success());

    let shown: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(shown["backlog"], 10);
    assert_eq!(shown["bind"], "0.0.0.0");
}

#[test]
fn test_generate_fixture_then_test_command() {
    let dir = tempdir().unwrap();
    let fixture = dir.path().join("fixture.json");
    let fixture_str = fixture.to_str().unwrap();

    let output = exporter(&[
        "--no-config",
        "generate-fixture",
        "-o",
        fixture_str,
        "--domains",
        "2",
    ]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(fixture.exists());

    let uri = format!("fixture://{}", fixture_str);
    let output = exporter(&["--no-config", "--log-level", "off", "test", "--uri", &uri, "-n", "2"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let out = stdout(&output);
    assert!(out.contains("# prometheus data"));
    assert!(out.contains("# TYPE vcpu_time counter"));
    assert!(out.contains("Consecutive bodies identical: yes"));
}
