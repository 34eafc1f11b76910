// Test module - relaxed lint rules
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(missing_docs)]

//! Lint pass tests.

use demo_studio::lint::{lint_prompt_policy, lint_screenplay, looks_unbounded_allow_regex, Severity};
use demo_studio::model::{load_screenplay_str, PromptMode, PromptPolicy};
use demo_studio_fixtures::{ActionBuilder, ScreenplayBuilder};

fn approve_policy(allow_regex: Option<&str>) -> PromptPolicy {
    PromptPolicy {
        mode: PromptMode::Approve,
        allow_regex: allow_regex.map(ToString::to_string),
        ..PromptPolicy::default()
    }
}

#[test]
fn approve_without_allow_regex_is_an_error() {
    let report = lint_prompt_policy(&approve_policy(None), false);
    assert!(report
        .errors()
        .iter()
        .any(|finding| finding.message.contains("requires a non-empty allow_regex")));
}

#[test]
fn unbounded_allow_regex_is_an_error_unless_acknowledged() {
    let report = lint_prompt_policy(&approve_policy(Some(".*")), false);
    assert!(!report.errors().is_empty());

    let report = lint_prompt_policy(&approve_policy(Some(".*")), true);
    assert!(report.errors().is_empty());

    let report = lint_prompt_policy(&approve_policy(Some("safe demo")), false);
    assert!(report.errors().is_empty());
}

#[test]
fn unbounded_patterns_are_recognized() {
    for pattern in [".*", "^.*$", ".+", "^.+$", "(?s).*", "[\\s\\S]*"] {
        assert!(
            looks_unbounded_allow_regex(pattern),
            "'{pattern}' should look unbounded"
        );
    }
    assert!(!looks_unbounded_allow_regex("safe demo"));
    assert!(!looks_unbounded_allow_regex("deploy .* to staging"));
}

#[test]
fn approve_without_prefixes_warns() {
    let report = lint_prompt_policy(&approve_policy(Some("safe demo")), false);
    assert!(report
        .warnings()
        .iter()
        .any(|finding| finding.message.contains("allowed_command_prefixes")));
}

#[test]
fn allow_regex_outside_approve_warns() {
    let policy = PromptPolicy {
        mode: PromptMode::Deny,
        allow_regex: Some("safe".to_string()),
        ..PromptPolicy::default()
    };
    let report = lint_prompt_policy(&policy, false);
    assert!(report
        .warnings()
        .iter()
        .any(|finding| finding.message.contains("ignored unless mode=approve")));
}

#[test]
fn agent_prompts_on_non_visual_scenario_warns() {
    let yaml = ScreenplayBuilder::new("demo")
        .scenario("one", "scripted", |scene| {
            scene
                .agent_prompt_field("mode", "deny")
                .action(ActionBuilder::command("echo hi"))
        })
        .build();
    let screenplay = load_screenplay_str(&yaml, "/tmp/tds-test").expect("valid");
    let report = lint_screenplay(&screenplay, false);
    assert!(report
        .findings
        .iter()
        .any(|finding| finding.code == "agent-prompts-ignored"));
}

#[test]
fn stream_tail_default_wait_mode_warns() {
    let yaml = ScreenplayBuilder::new("demo")
        .scenario("one", "scripted", |scene| {
            scene.action(ActionBuilder::wait_for("ready"))
        })
        .build();
    let screenplay = load_screenplay_str(&yaml, "/tmp/tds-test").expect("valid");
    let report = lint_screenplay(&screenplay, false);
    let finding = report
        .findings
        .iter()
        .find(|finding| finding.code == "wait-mode-default")
        .expect("warning present");
    assert_eq!(finding.severity, Severity::Warning);
    assert_eq!(finding.step_index, Some(0));
}

#[test]
fn strict_mode_promotes_warnings() {
    let yaml = ScreenplayBuilder::new("demo")
        .scenario("one", "scripted", |scene| {
            scene.action(ActionBuilder::wait_for("ready"))
        })
        .build();
    let screenplay = load_screenplay_str(&yaml, "/tmp/tds-test").expect("valid");
    let report = lint_screenplay(&screenplay, false);
    assert!(report.passes(false));
    assert!(!report.passes(true));
}

#[test]
fn visual_approve_without_allow_regex_fails_lint() {
    let yaml = ScreenplayBuilder::new("demo")
        .scenario("one", "visual", |scene| {
            scene
                .agent_prompt_field("mode", "approve")
                .agent_prompt_field("prompt_regex", "\"Proceed\\\\?\"")
                .action(ActionBuilder::command("echo hi"))
        })
        .build();
    let screenplay = load_screenplay_str(&yaml, "/tmp/tds-test").expect("valid");
    let report = lint_screenplay(&screenplay, false);
    assert!(!report.passes(false));
    assert!(report
        .errors()
        .iter()
        .any(|finding| finding.code.starts_with("agent-policy/")));
}

#[test]
fn clean_screenplay_passes_strict() {
    let yaml = ScreenplayBuilder::new("demo")
        .scenario("one", "scripted", |scene| {
            scene.action(ActionBuilder::wait_for("ready").wait_mode("screen"))
        })
        .build();
    let screenplay = load_screenplay_str(&yaml, "/tmp/tds-test").expect("valid");
    let report = lint_screenplay(&screenplay, false);
    assert!(report.passes(true), "findings: {:?}", report.findings);
}
