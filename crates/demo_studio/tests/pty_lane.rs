// Test module - relaxed lint rules
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::indexing_slicing)]
#![allow(missing_docs)]
#![cfg(unix)]

//! Interactive lane end-to-end tests against a real shell.

use demo_studio::dispatcher::{run, RunRequest};
use demo_studio::model::run::{EventKind, RunEvent, RunStatus};
use demo_studio_fixtures::{ActionBuilder, ScreenplayBuilder};
use std::path::{Path, PathBuf};

struct RunSetup {
    _dir: tempfile::TempDir,
    request: RunRequest,
}

fn setup(yaml: &str) -> RunSetup {
    let dir = tempfile::tempdir().unwrap();
    let screenplay_path = dir.path().join("demo.yaml");
    std::fs::write(&screenplay_path, yaml).unwrap();
    let mut request = RunRequest::new(screenplay_path);
    request.output_dir = Some(dir.path().to_path_buf());
    RunSetup { _dir: dir, request }
}

fn read_events(events_path: &Path) -> Vec<RunEvent> {
    std::fs::read_to_string(events_path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

fn failure_dir(run_dir: &Path) -> PathBuf {
    run_dir.join("failure")
}

#[test]
fn command_and_screen_wait_pass() {
    let yaml = ScreenplayBuilder::new("demo")
        .scenario("hello", "interactive", |scene| {
            scene
                .action(ActionBuilder::command("echo hello-from-pty"))
                .action(
                    ActionBuilder::wait_for("hello-from-pty")
                        .wait_mode("screen")
                        .wait_timeout("5s"),
                )
        })
        .build();
    let setup = setup(&yaml);
    let report = run(&setup.request).expect("run completes");

    assert_eq!(report.status, RunStatus::Success);
    assert_eq!(report.exit_code, 0);
    assert!(report.mp4.is_none(), "pty lane produces no media");
    assert!(!failure_dir(report.run_dir.as_ref().unwrap()).exists());

    let events = read_events(report.events_path.as_ref().unwrap());
    assert!(events
        .iter()
        .any(|event| event.kind == EventKind::Passed && event.step == 1));
}

#[test]
fn exit_code_gate_passes_on_expected_failure_status() {
    let yaml = ScreenplayBuilder::new("demo")
        .scenario("gate", "interactive", |scene| {
            scene
                .action(ActionBuilder::command("false"))
                .action(ActionBuilder::expect_exit_code(1))
        })
        .build();
    let setup = setup(&yaml);
    let report = run(&setup.request).expect("run completes");
    assert_eq!(report.status, RunStatus::Success);
}

#[test]
fn exit_code_mismatch_fails_with_step_payload() {
    let yaml = ScreenplayBuilder::new("demo")
        .scenario("gate", "interactive", |scene| {
            scene
                .action(ActionBuilder::command("false"))
                .action(ActionBuilder::expect_exit_code(0))
        })
        .build();
    let setup = setup(&yaml);
    let report = run(&setup.request).expect("run completes");

    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.exit_code, 1);

    let run_dir = report.run_dir.as_ref().unwrap();
    let step: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(failure_dir(run_dir).join("step.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(step["action"].as_str().unwrap(), "expect_exit_code");
    assert_eq!(step["step_index"].as_i64().unwrap(), 1);

    // Failure bundle present implies status failed in the summary.
    let summary: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(run_dir.join("summary.json")).unwrap())
            .unwrap();
    assert_eq!(summary["status"].as_str().unwrap(), "failed");
}

#[test]
fn interactive_primitive_is_rejected_before_execution() {
    let yaml = ScreenplayBuilder::new("demo")
        .scenario("guard", "interactive", |scene| {
            scene.action(ActionBuilder::key("enter"))
        })
        .build();
    let setup = setup(&yaml);
    let err = run(&setup.request).expect_err("validation rejects the screenplay");
    assert_eq!(err.exit_code(), 2);
    assert!(err
        .message
        .contains("interactive primitive unsupported in pty lane"));
}

#[test]
fn wait_timeout_produces_timed_out_bundle() {
    let yaml = ScreenplayBuilder::new("demo")
        .scenario("timeout", "interactive", |scene| {
            scene
                .action(ActionBuilder::command("echo something-else"))
                .action(
                    ActionBuilder::wait_for("never-appears")
                        .wait_mode("screen")
                        .wait_timeout("500ms"),
                )
        })
        .build();
    let setup = setup(&yaml);
    let report = run(&setup.request).expect("run completes");

    assert_eq!(report.status, RunStatus::Failed);
    let run_dir = report.run_dir.as_ref().unwrap();
    let reason =
        std::fs::read_to_string(failure_dir(run_dir).join("reason.txt")).unwrap();
    assert!(reason.contains("timed_out"), "reason: {reason}");
    assert!(reason.contains("never-appears"), "reason: {reason}");

    let events = read_events(report.events_path.as_ref().unwrap());
    let dispatched = events
        .iter()
        .find(|event| event.step == 1 && event.kind == EventKind::Dispatched)
        .expect("dispatch event");
    let timed_out = events
        .iter()
        .find(|event| event.kind == EventKind::TimedOut)
        .expect("timeout event");
    assert!(
        timed_out.ts_ms >= dispatched.ts_ms + 500,
        "timeout fired at {}ms, dispatched at {}ms",
        timed_out.ts_ms,
        dispatched.ts_ms
    );

    let summary: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(run_dir.join("summary.json")).unwrap())
            .unwrap();
    assert!(summary["reason"].as_str().unwrap().contains("never-appears"));
}

#[test]
fn setup_commands_run_before_actions() {
    let yaml = ScreenplayBuilder::new("demo")
        .scenario("setup", "interactive", |scene| {
            scene
                .setup("touch marker-file")
                .action(ActionBuilder::command("ls marker-file"))
                .action(ActionBuilder::expect_exit_code(0))
        })
        .build();
    let setup = setup(&yaml);
    let report = run(&setup.request).expect("run completes");
    assert_eq!(report.status, RunStatus::Success);
}

#[test]
fn failing_setup_aborts_the_scenario() {
    let yaml = ScreenplayBuilder::new("demo")
        .scenario("setup", "interactive", |scene| {
            scene
                .setup("exit 7")
                .action(ActionBuilder::command("echo unreachable"))
        })
        .build();
    let setup = setup(&yaml);
    let report = run(&setup.request).expect("run completes");

    assert_eq!(report.status, RunStatus::Failed);
    let reason = std::fs::read_to_string(
        failure_dir(report.run_dir.as_ref().unwrap()).join("reason.txt"),
    )
    .unwrap();
    assert!(reason.contains("setup command failed"));
}

#[test]
fn events_ts_are_monotonic_within_a_run() {
    let yaml = ScreenplayBuilder::new("demo")
        .scenario("order", "interactive", |scene| {
            scene
                .action(ActionBuilder::command("echo one"))
                .action(ActionBuilder::command("echo two"))
                .action(ActionBuilder::expect_exit_code(0))
        })
        .build();
    let setup = setup(&yaml);
    let report = run(&setup.request).expect("run completes");
    let events = read_events(report.events_path.as_ref().unwrap());
    for window in events.windows(2) {
        assert!(window[0].seq < window[1].seq);
        assert!(window[0].ts_ms <= window[1].ts_ms);
    }
    assert_eq!(report.status, RunStatus::Success);
}
