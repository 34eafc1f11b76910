// Test module - relaxed lint rules
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::indexing_slicing)]
#![allow(clippy::panic)]
#![allow(missing_docs)]

//! Screenplay loading and validation tests.

use demo_studio::model::{load_screenplay_str, Action, ExecutionMode, WaitMode};
use demo_studio_fixtures::{ActionBuilder, ScreenplayBuilder};

fn load(yaml: &str) -> Result<demo_studio::Screenplay, Vec<demo_studio::ValidationIssue>> {
    load_screenplay_str(yaml, "/tmp/tds-test")
}

fn reasons(result: Result<demo_studio::Screenplay, Vec<demo_studio::ValidationIssue>>) -> String {
    match result {
        Ok(_) => String::new(),
        Err(issues) => issues
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

#[test]
fn bare_string_action_becomes_command() {
    let yaml = "title: t\noutput: demo\nscenarios:\n  - label: one\n    actions:\n      - \"echo hi\"\n";
    let screenplay = load(yaml).expect("valid screenplay");
    assert_eq!(screenplay.scenarios.len(), 1);
    assert_eq!(
        screenplay.scenarios[0].steps[0].action,
        Action::Command {
            text: "echo hi".to_string()
        }
    );
}

#[test]
fn combined_mapping_expands_in_execution_order() {
    let yaml = ScreenplayBuilder::new("demo")
        .scenario("one", "scripted", |scene| {
            scene.action(
                ActionBuilder::command("echo hello")
                    .field("wait_for", "\"hello\"")
                    .wait_mode("screen")
                    .field("assert_screen_regex", "\"hel+o\""),
            )
        })
        .build();
    let screenplay = load(&yaml).expect("valid screenplay");
    let labels: Vec<&str> = screenplay.scenarios[0]
        .steps
        .iter()
        .map(|step| step.action.label())
        .collect();
    assert_eq!(labels, vec!["command", "wait_for", "assert_screen_regex"]);

    match &screenplay.scenarios[0].steps[1].action {
        Action::WaitFor { target, mode, .. } => {
            assert_eq!(target, "hello");
            assert_eq!(*mode, WaitMode::Screen);
        }
        other => panic!("expected wait_for, got {other:?}"),
    }
}

#[test]
fn missing_required_keys_are_reported_with_paths() {
    let yaml = "output: demo\nscenarios:\n  - label: one\n    actions: [\"echo\"]\n";
    let message = reasons(load(yaml));
    assert!(message.contains("title"), "missing title: {message}");

    let yaml = "title: t\noutput: demo\nscenarios:\n  - actions: [\"echo\"]\n";
    let message = reasons(load(yaml));
    assert!(
        message.contains("scenarios[0].label"),
        "missing label path: {message}"
    );
}

#[test]
fn empty_scenarios_and_actions_are_rejected() {
    let yaml = "title: t\noutput: demo\nscenarios: []\n";
    assert!(reasons(load(yaml)).contains("at least one scenario"));

    let yaml = "title: t\noutput: demo\nscenarios:\n  - label: one\n    actions: []\n";
    assert!(reasons(load(yaml)).contains("at least one action"));
}

#[test]
fn duration_grammar_is_exact() {
    for bad in ["5", "5m", "ms", "-5ms", "5.5s", " 5s"] {
        let yaml = ScreenplayBuilder::new("demo")
            .scenario("one", "scripted", |scene| {
                scene.action(ActionBuilder::sleep(bad))
            })
            .build();
        assert!(
            !reasons(load(&yaml)).is_empty(),
            "duration '{bad}' should be rejected"
        );
    }
    for good in ["5ms", "500ms", "2s", "0ms"] {
        let yaml = ScreenplayBuilder::new("demo")
            .scenario("one", "scripted", |scene| {
                scene.action(ActionBuilder::sleep(good))
            })
            .build();
        assert!(load(&yaml).is_ok(), "duration '{good}' should parse");
    }
}

#[test]
fn wait_mode_requires_wait_for() {
    let yaml = ScreenplayBuilder::new("demo")
        .scenario("one", "scripted", |scene| {
            scene.action(ActionBuilder::command("echo").wait_mode("screen"))
        })
        .build();
    assert!(reasons(load(&yaml)).contains("wait_mode/wait_timeout require wait_for"));
}

#[test]
fn wait_timeout_requires_wait_for() {
    let yaml = ScreenplayBuilder::new("demo")
        .scenario("one", "scripted", |scene| {
            scene.action(ActionBuilder::command("echo").wait_timeout("1s"))
        })
        .build();
    assert!(reasons(load(&yaml)).contains("wait_mode/wait_timeout require wait_for"));
}

#[test]
fn retries_require_explicit_timeout() {
    let yaml = ScreenplayBuilder::new("demo")
        .scenario("one", "scripted", |scene| {
            scene.action(ActionBuilder::wait_for("done").retries(2))
        })
        .build();
    assert!(reasons(load(&yaml)).contains("retries > 0 requires an explicit timeout"));

    let yaml = ScreenplayBuilder::new("demo")
        .scenario("one", "scripted", |scene| {
            scene.action(ActionBuilder::wait_for("done").retries(2).timeout("2s"))
        })
        .build();
    assert!(load(&yaml).is_ok());
}

#[test]
fn multiple_input_primitives_are_rejected() {
    let yaml = ScreenplayBuilder::new("demo")
        .scenario("one", "scripted", |scene| {
            scene.action(ActionBuilder::command("echo").field("key", "\"enter\""))
        })
        .build();
    assert!(reasons(load(&yaml)).contains("multiple input primitives"));
}

#[test]
fn conflicting_wait_fields_are_rejected() {
    let yaml = ScreenplayBuilder::new("demo")
        .scenario("one", "scripted", |scene| {
            scene.action(
                ActionBuilder::wait_for("done").field("wait_screen_regex", "\"done\""),
            )
        })
        .build();
    assert!(reasons(load(&yaml)).contains("conflicts"));
}

#[test]
fn unknown_action_fields_are_rejected_with_path() {
    let yaml = ScreenplayBuilder::new("demo")
        .scenario("one", "scripted", |scene| {
            scene.action(ActionBuilder::command("echo").field("wiat_for", "\"oops\""))
        })
        .build();
    let message = reasons(load(&yaml));
    assert!(
        message.contains("actions[0].wiat_for") && message.contains("unknown action field"),
        "unknown field path: {message}"
    );
}

#[test]
fn interactive_primitives_rejected_in_interactive_mode() {
    let yaml = ScreenplayBuilder::new("demo")
        .scenario("one", "interactive", |scene| {
            scene.action(ActionBuilder::key("enter"))
        })
        .build();
    assert!(reasons(load(&yaml)).contains("interactive primitive unsupported in pty lane"));
}

#[test]
fn expect_exit_code_only_in_interactive_mode() {
    for mode in ["scripted", "visual"] {
        let yaml = ScreenplayBuilder::new("demo")
            .scenario("one", mode, |scene| {
                scene.action(ActionBuilder::expect_exit_code(0))
            })
            .build();
        assert!(
            reasons(load(&yaml)).contains("expect_exit_code"),
            "expect_exit_code should be rejected in {mode}"
        );
    }

    let yaml = ScreenplayBuilder::new("demo")
        .scenario("one", "interactive", |scene| {
            scene
                .action(ActionBuilder::command("true"))
                .action(ActionBuilder::expect_exit_code(0))
        })
        .build();
    assert!(load(&yaml).is_ok());
}

#[test]
fn output_slug_must_be_filesystem_safe() {
    for bad in ["has space", "slash/inside", ""] {
        let yaml = format!(
            "title: t\noutput: \"{bad}\"\nscenarios:\n  - label: one\n    actions: [\"echo\"]\n"
        );
        assert!(
            !reasons(load(&yaml)).is_empty(),
            "slug '{bad}' should be rejected"
        );
    }
}

#[test]
fn invalid_regex_is_rejected_at_validation() {
    let yaml = ScreenplayBuilder::new("demo")
        .scenario("one", "scripted", |scene| {
            scene.action(ActionBuilder::assert_screen_regex("(unclosed"))
        })
        .build();
    assert!(reasons(load(&yaml)).contains("invalid regex"));
}

#[test]
fn variables_interpolate_before_validation() {
    let yaml = ScreenplayBuilder::new("demo")
        .variable("greeting", "\"hello\"")
        .scenario("one", "scripted", |scene| {
            scene.action(ActionBuilder::command("echo {{greeting}} > {{tmp_dir}}/out"))
        })
        .build();
    let screenplay = load(&yaml).expect("valid screenplay");
    match &screenplay.scenarios[0].steps[0].action {
        Action::Command { text } => {
            assert_eq!(text, "echo hello > /tmp/tds-test/out");
        }
        other => panic!("expected command, got {other:?}"),
    }
}

#[test]
fn default_execution_mode_is_scripted() {
    let yaml = "title: t\noutput: demo\nscenarios:\n  - label: one\n    actions: [\"echo\"]\n";
    let screenplay = load(yaml).expect("valid screenplay");
    assert_eq!(
        screenplay.scenarios[0].execution_mode,
        ExecutionMode::Scripted
    );
}

#[test]
fn surface_must_be_terminal() {
    let yaml =
        "title: t\noutput: demo\nscenarios:\n  - label: one\n    surface: browser\n    actions: [\"echo\"]\n";
    assert!(reasons(load(yaml)).contains("surface"));
}

#[test]
fn max_rounds_bounds_are_enforced() {
    for bad in [0, 7] {
        let yaml = format!(
            "title: t\noutput: demo\nagent_prompts:\n  max_rounds: {bad}\nscenarios:\n  - label: one\n    actions: [\"echo\"]\n"
        );
        assert!(
            reasons(load(&yaml)).contains("max_rounds"),
            "max_rounds {bad} should be rejected"
        );
    }
}

#[test]
fn validated_model_round_trips_through_serde() {
    let yaml = ScreenplayBuilder::new("demo")
        .scenario("one", "interactive", |scene| {
            scene
                .action(ActionBuilder::command("true"))
                .action(ActionBuilder::expect_exit_code(0))
        })
        .build();
    let screenplay = load(&yaml).expect("valid screenplay");
    let encoded = serde_json::to_string(&screenplay).expect("serialize");
    let decoded: demo_studio::Screenplay = serde_json::from_str(&encoded).expect("deserialize");
    assert_eq!(screenplay, decoded);
}
