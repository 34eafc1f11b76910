// Test module - relaxed lint rules
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::indexing_slicing)]
#![allow(missing_docs)]

//! Artifact writer tests: layout, events, failure bundle, summary.

use demo_studio::artifacts::{
    create_run_layout, input_digest, write_failure_bundle, write_json_atomic, write_manifest,
    write_summary, EventWriter, RUNS_DIR_NAME,
};
use demo_studio::model::run::{
    Counters, EventKind, FailedStep, Lane, MediaPaths, RunEvent, RunStatus, Summary,
};
use demo_studio::model::Settings;
use demo_studio::redaction::Redactor;
use std::collections::BTreeMap;

fn test_summary(run_id: &str, status: RunStatus) -> Summary {
    Summary {
        run_id: run_id.to_string(),
        lane: Lane::Interactive,
        status,
        screenplay: "demo.yaml".to_string(),
        playback_mode: None,
        media_redaction: None,
        media: MediaPaths::default(),
        scenes: Vec::new(),
        events: None,
        counters: Counters::default(),
        duration_ms: 0,
        failed_scenario: None,
        failed_step_index: None,
        failed_action: None,
        reason: String::new(),
        failure_dir: None,
    }
}

#[test]
fn run_layout_creates_canonical_directories() {
    let root = tempfile::tempdir().unwrap();
    let layout = create_run_layout(root.path(), Lane::Scripted).unwrap();

    assert!(layout.run_dir.starts_with(root.path().join(RUNS_DIR_NAME)));
    assert!(layout.run_dir.is_dir());
    assert!(layout.media_dir.is_dir());
    // Lane-specific directories appear lazily; failure only on failure.
    assert!(!layout.runtime_dir.exists());
    assert!(!layout.failure_dir.exists());
}

#[test]
fn run_id_is_a_long_url_safe_token() {
    let root = tempfile::tempdir().unwrap();
    let layout = create_run_layout(root.path(), Lane::Scripted).unwrap();
    let token = layout.run_id.strip_prefix("run-").unwrap();
    assert!(token.len() >= 12);
    assert!(token.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-'));
}

#[test]
fn event_sequence_is_strictly_monotonic() {
    let root = tempfile::tempdir().unwrap();
    let layout = create_run_layout(root.path(), Lane::Interactive).unwrap();
    let mut writer = EventWriter::new(&layout).unwrap();

    for step in 0..5 {
        writer
            .append(0, step, EventKind::Dispatched, None)
            .unwrap();
    }
    let raw = std::fs::read_to_string(layout.events_path()).unwrap();
    let events: Vec<RunEvent> = raw
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(events.len(), 5);
    for window in events.windows(2) {
        assert!(window[1].seq > window[0].seq, "seq must strictly increase");
        assert!(window[1].ts_ms >= window[0].ts_ms, "ts must be monotonic");
    }
}

#[test]
fn events_are_self_contained_json_lines() {
    let root = tempfile::tempdir().unwrap();
    let layout = create_run_layout(root.path(), Lane::Interactive).unwrap();
    let mut writer = EventWriter::new(&layout).unwrap();
    writer
        .append(
            1,
            2,
            EventKind::Passed,
            Some(serde_json::json!({"matched": "hello"})),
        )
        .unwrap();

    let raw = std::fs::read_to_string(layout.events_path()).unwrap();
    let event: RunEvent = serde_json::from_str(raw.lines().next().unwrap()).unwrap();
    assert_eq!(event.scenario, 1);
    assert_eq!(event.step, 2);
    assert_eq!(event.kind, EventKind::Passed);
}

#[test]
fn manifest_records_digest_and_settings() {
    let root = tempfile::tempdir().unwrap();
    let layout = create_run_layout(root.path(), Lane::Scripted).unwrap();
    let digest = input_digest(b"title: demo\n");
    write_manifest(
        &layout,
        std::path::Path::new("demo.yaml"),
        &digest,
        &Settings::default(),
        &BTreeMap::new(),
    )
    .unwrap();

    let raw = std::fs::read_to_string(&layout.manifest_path).unwrap();
    let manifest: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(manifest["input_digest"].as_str().unwrap(), digest);
    assert_eq!(manifest["lane"].as_str().unwrap(), "scripted");
    assert_eq!(manifest["settings"]["width"].as_u64().unwrap(), 1440);
}

#[test]
fn input_digest_is_stable() {
    assert_eq!(input_digest(b"abc"), input_digest(b"abc"));
    assert_ne!(input_digest(b"abc"), input_digest(b"abd"));
    assert_eq!(input_digest(b"abc").len(), 64);
}

#[test]
fn summary_write_is_atomic_and_replayable() {
    let root = tempfile::tempdir().unwrap();
    let layout = create_run_layout(root.path(), Lane::Interactive).unwrap();
    write_summary(&layout, &test_summary(&layout.run_id, RunStatus::Success)).unwrap();
    write_summary(&layout, &test_summary(&layout.run_id, RunStatus::Failed)).unwrap();

    let raw = std::fs::read_to_string(&layout.summary_path).unwrap();
    let summary: Summary = serde_json::from_str(&raw).unwrap();
    assert_eq!(summary.status, RunStatus::Failed);
    // No temp file left behind after the rename.
    assert!(!layout.summary_path.with_extension("json.tmp").exists());
}

#[test]
fn atomic_write_replaces_whole_file() {
    let root = tempfile::tempdir().unwrap();
    let path = root.path().join("value.json");
    write_json_atomic(&path, &serde_json::json!({"long": "a longer payload here"})).unwrap();
    write_json_atomic(&path, &serde_json::json!({"v": 2})).unwrap();
    let value: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(value, serde_json::json!({"v": 2}));
}

#[test]
fn failure_bundle_is_redacted_and_complete() {
    let root = tempfile::tempdir().unwrap();
    let layout = create_run_layout(root.path(), Lane::Interactive).unwrap();
    let variables: BTreeMap<String, serde_json::Value> =
        [("DEMO_TOKEN".to_string(), serde_json::json!("hunter2secret"))]
            .into_iter()
            .collect();
    let redactor = Redactor::from_sources(&variables, &["_TOKEN".to_string()]);

    let failed = FailedStep {
        scenario: Some("login".to_string()),
        step_index: Some(3),
        action: Some("wait_for".to_string()),
        reason: "timed_out waiting after sending hunter2secret".to_string(),
    };
    let failure_dir = write_failure_bundle(
        &layout,
        &redactor,
        "screen shows hunter2secret here",
        &failed,
        None,
    )
    .unwrap();

    let reason = std::fs::read_to_string(failure_dir.join("reason.txt")).unwrap();
    let screen = std::fs::read_to_string(failure_dir.join("screen.txt")).unwrap();
    let step: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(failure_dir.join("step.json")).unwrap())
            .unwrap();

    assert!(!reason.contains("hunter2secret"));
    assert!(!screen.contains("hunter2secret"));
    assert!(reason.contains("timed_out"));
    assert_eq!(step["scenario"].as_str().unwrap(), "login");
    assert_eq!(step["step_index"].as_i64().unwrap(), 3);
    assert!(!step["reason"].as_str().unwrap().contains("hunter2secret"));
}

#[test]
fn first_failure_bundle_wins() {
    let root = tempfile::tempdir().unwrap();
    let layout = create_run_layout(root.path(), Lane::Interactive).unwrap();
    let redactor = Redactor::from_sources(&BTreeMap::new(), &[]);

    let first = FailedStep {
        scenario: Some("a".to_string()),
        step_index: Some(0),
        action: None,
        reason: "first failure".to_string(),
    };
    let second = FailedStep {
        scenario: Some("b".to_string()),
        step_index: Some(1),
        action: None,
        reason: "second failure".to_string(),
    };
    write_failure_bundle(&layout, &redactor, "", &first, None).unwrap();
    write_failure_bundle(&layout, &redactor, "", &second, None).unwrap();

    let reason = std::fs::read_to_string(layout.failure_dir.join("reason.txt")).unwrap();
    assert_eq!(reason, "first failure");
}
