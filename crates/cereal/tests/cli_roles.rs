#![cfg(all(unix, feature = "cli"))]

use std::process::{Command, Output};

fn cereal(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_cereal"))
        .args(args)
        .env_remove("CEREAL_PORT")
        .env_remove("CEREAL_RX_PORT")
        .env_remove("CEREAL_PEER_PORT")
        .env_remove("CEREAL_BAUD")
        .output()
        .expect("cereal should run")
}

#[test]
fn unknown_role_is_usage_error() {
    let output = cereal(&["relay"]);
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unrecognized subcommand"), "stderr: {stderr}");
}

#[test]
fn help_lists_both_roles() {
    let output = cereal(&["--help"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("server"));
    assert!(stdout.contains("client"));
}

#[test]
fn server_reports_missing_device() {
    let output = cereal(&[
        "--log-level",
        "off",
        "server",
        "--port",
        "/dev/cereal-missing-device",
    ]);
    assert_eq!(output.status.code(), Some(3));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.starts_with("error: connect failed:"), "stderr: {stderr}");
    assert!(stderr.contains("/dev/cereal-missing-device"), "stderr: {stderr}");
}

#[test]
fn client_reports_first_missing_device() {
    let output = cereal(&[
        "--log-level",
        "off",
        "client",
        "--port",
        "/dev/cereal-missing-tx",
        "--rx-port",
        "/dev/cereal-missing-rx",
    ]);
    assert_eq!(output.status.code(), Some(3));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("/dev/cereal-missing-tx"), "stderr: {stderr}");
}
