// Test module - relaxed lint rules
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(missing_docs)]
#![cfg(unix)]

use demo_studio_fixtures::{ActionBuilder, ScreenplayBuilder};
use std::process::Command;

fn run_interactive(yaml: &str) -> (std::process::Output, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("demo.yaml");
    std::fs::write(&path, yaml).unwrap();
    let output = Command::new(env!("CARGO_BIN_EXE_tds"))
        .args([
            "run",
            path.to_str().unwrap(),
            "--output-dir",
            dir.path().to_str().unwrap(),
        ])
        .output()
        .unwrap();
    (output, dir)
}

fn stdout_value<'a>(stdout: &'a str, key: &str) -> Option<&'a str> {
    stdout
        .lines()
        .find_map(|line| line.strip_prefix(&format!("{key}=")))
}

#[test]
fn run_emits_the_stdout_contract() {
    let yaml = ScreenplayBuilder::new("demo")
        .scenario("hello", "interactive", |scene| {
            scene
                .action(ActionBuilder::command("echo contract-check"))
                .action(
                    ActionBuilder::wait_for("contract-check")
                        .wait_mode("screen")
                        .wait_timeout("5s"),
                )
        })
        .build();
    let (output, _dir) = run_interactive(&yaml);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "stdout: {stdout}");
    assert_eq!(stdout_value(&stdout, "STATUS"), Some("success"));
    let run_dir = stdout_value(&stdout, "RUN_DIR").expect("RUN_DIR line");
    assert!(run_dir.contains(".terminal_demo_studio_runs"));
    let summary = stdout_value(&stdout, "SUMMARY").expect("SUMMARY line");
    assert!(std::path::Path::new(summary).exists());
    let events = stdout_value(&stdout, "EVENTS").expect("EVENTS line");
    assert!(std::path::Path::new(events).exists());
    // No media keys in the pty lane.
    assert!(stdout_value(&stdout, "MEDIA_MP4").is_none());
    assert!(stdout_value(&stdout, "MEDIA_GIF").is_none());
}

#[test]
fn failed_run_exits_one_with_failed_status_line() {
    let yaml = ScreenplayBuilder::new("demo")
        .scenario("gate", "interactive", |scene| {
            scene
                .action(ActionBuilder::command("true"))
                .action(ActionBuilder::expect_exit_code(3))
        })
        .build();
    let (output, _dir) = run_interactive(&yaml);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert_eq!(output.status.code(), Some(1));
    assert_eq!(stdout_value(&stdout, "STATUS"), Some("failed"));
}

#[test]
fn render_is_a_synonym_of_run() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = ScreenplayBuilder::new("demo")
        .scenario("hello", "interactive", |scene| {
            scene
                .action(ActionBuilder::command("true"))
                .action(ActionBuilder::expect_exit_code(0))
        })
        .build();
    let path = dir.path().join("demo.yaml");
    std::fs::write(&path, &yaml).unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_tds"))
        .args([
            "render",
            path.to_str().unwrap(),
            "--output-dir",
            dir.path().to_str().unwrap(),
        ])
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout_value(&stdout, "STATUS"), Some("success"));
}
