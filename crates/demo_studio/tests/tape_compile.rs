// Test module - relaxed lint rules
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::indexing_slicing)]
#![allow(missing_docs)]

//! Directive program compiler tests.

use demo_studio::model::{load_screenplay_str, Scenario, Settings};
use demo_studio::tape::compile_tape;
use demo_studio_fixtures::{ActionBuilder, ScreenplayBuilder};

fn scenario_from(yaml: &str) -> (Scenario, Settings) {
    let screenplay = load_screenplay_str(yaml, "/tmp/tds-test").expect("valid screenplay");
    (
        screenplay.scenarios[0].clone(),
        screenplay.settings.clone(),
    )
}

fn outputs() -> Vec<String> {
    vec!["scene_0.mp4".to_string(), "scene_0.txt".to_string()]
}

#[test]
fn header_carries_settings_and_outputs() {
    let yaml = ScreenplayBuilder::new("demo")
        .scenario("one", "scripted", |scene| {
            scene.action(ActionBuilder::command("echo hi"))
        })
        .build();
    let (scenario, settings) = scenario_from(&yaml);
    let (tape, _) = compile_tape(&scenario, &settings, &outputs(), false);

    assert!(tape.starts_with("Output \"scene_0.mp4\"\nOutput \"scene_0.txt\"\n"));
    assert!(tape.contains("Set FontSize 22"));
    assert!(tape.contains("Set Width 1440"));
    assert!(tape.contains("Set Height 900"));
    assert!(tape.contains("Set Theme \"Catppuccin Mocha\""));
    assert!(tape.contains("Set CursorBlink false"));
}

#[test]
fn compilation_is_deterministic() {
    let yaml = ScreenplayBuilder::new("demo")
        .scenario("one", "scripted", |scene| {
            scene
                .action(ActionBuilder::command("echo hi"))
                .action(ActionBuilder::wait_for("hi").wait_mode("screen"))
        })
        .build();
    let (scenario, settings) = scenario_from(&yaml);
    let (first, first_predicates) = compile_tape(&scenario, &settings, &outputs(), false);
    let (second, second_predicates) = compile_tape(&scenario, &settings, &outputs(), false);
    assert_eq!(first, second);
    assert_eq!(first_predicates, second_predicates);
}

#[test]
fn commands_type_and_submit() {
    let yaml = ScreenplayBuilder::new("demo")
        .scenario("one", "scripted", |scene| {
            scene
                .action(ActionBuilder::command("echo hi"))
                .action(ActionBuilder::input("partial"))
        })
        .build();
    let (scenario, settings) = scenario_from(&yaml);
    let (tape, _) = compile_tape(&scenario, &settings, &outputs(), false);

    assert!(tape.contains("Type \"echo hi\"\nEnter"));
    assert!(tape.contains("Type \"partial\""));
    assert!(!tape.contains("Type \"partial\"\nEnter"));
}

#[test]
fn dollar_with_quotes_uses_single_quoted_form() {
    let yaml = ScreenplayBuilder::new("demo")
        .scenario("one", "scripted", |scene| {
            scene.action(ActionBuilder::command(r#"echo "$HOME""#))
        })
        .build();
    let (scenario, settings) = scenario_from(&yaml);
    let (tape, _) = compile_tape(&scenario, &settings, &outputs(), false);
    assert!(tape.contains(r#"Type 'echo "$HOME"'"#));
}

#[test]
fn wait_directive_encodes_mode_and_timeout() {
    let yaml = ScreenplayBuilder::new("demo")
        .scenario("one", "scripted", |scene| {
            scene
                .action(ActionBuilder::wait_for("hello").wait_mode("screen"))
                .action(
                    ActionBuilder::wait_for("done")
                        .wait_mode("line")
                        .wait_timeout("5s"),
                )
                .action(ActionBuilder::wait_for("plain"))
        })
        .build();
    let (scenario, settings) = scenario_from(&yaml);
    let (tape, _) = compile_tape(&scenario, &settings, &outputs(), false);

    assert!(tape.contains("Wait+Screen /hello/"));
    assert!(tape.contains("Wait+Line@5s /done/"));
    assert!(tape.contains("\nWait /plain/"));
}

#[test]
fn wait_target_text_is_regex_escaped() {
    let yaml = ScreenplayBuilder::new("demo")
        .scenario("one", "scripted", |scene| {
            scene.action(ActionBuilder::wait_for("1+1 (done) a/b").wait_mode("screen"))
        })
        .build();
    let (scenario, settings) = scenario_from(&yaml);
    let (tape, _) = compile_tape(&scenario, &settings, &outputs(), false);
    // Metacharacters escaped; slashes become wildcards to survive /regex/.
    assert!(tape.contains(r"Wait+Screen /1\+1 \(done\) a.*b/"));
}

#[test]
fn key_tokens_map_to_recorder_directives() {
    let yaml = ScreenplayBuilder::new("demo")
        .scenario("one", "scripted", |scene| {
            scene
                .action(ActionBuilder::key("enter"))
                .action(ActionBuilder::key("escape"))
                .action(ActionBuilder::hotkey("ctrl+c"))
        })
        .build();
    let (scenario, settings) = scenario_from(&yaml);
    let (tape, _) = compile_tape(&scenario, &settings, &outputs(), false);
    assert!(tape.contains("\nEnter\n"));
    assert!(tape.contains("\nEscape\n"));
    assert!(tape.contains("\nCtrl+C\n"));
}

#[test]
fn setup_is_hidden_and_cleared() {
    let yaml = ScreenplayBuilder::new("demo")
        .scenario("one", "scripted", |scene| {
            scene
                .setup("export FOO=bar")
                .action(ActionBuilder::command("echo $FOO"))
        })
        .build();
    let (scenario, settings) = scenario_from(&yaml);
    let (tape, _) = compile_tape(&scenario, &settings, &outputs(), false);

    let hide = tape.find("Hide").expect("hide present");
    let setup = tape.find("export FOO=bar").expect("setup present");
    let clear = tape.find("Type \"clear\"").expect("clear present");
    let show = tape.find("Show").expect("show present");
    assert!(hide < setup && setup < clear && clear < show);
}

#[test]
fn regex_waits_and_asserts_become_post_predicates() {
    let yaml = ScreenplayBuilder::new("demo")
        .scenario("one", "scripted", |scene| {
            scene
                .action(ActionBuilder::command("echo hi"))
                .action(ActionBuilder::wait_screen_regex("h+i"))
                .action(ActionBuilder::assert_screen_regex("done"))
                .action(ActionBuilder::assert_not_screen_regex("error"))
        })
        .build();
    let (scenario, settings) = scenario_from(&yaml);
    let (tape, predicates) = compile_tape(&scenario, &settings, &outputs(), false);

    // Deferred predicates do not appear in the directive program.
    assert!(!tape.contains("h+i"));
    assert_eq!(predicates.len(), 3);
    assert_eq!(predicates[0].label, "wait_screen_regex");
    assert!(!predicates[0].negated);
    assert_eq!(predicates[1].label, "assert_screen_regex");
    assert_eq!(predicates[2].label, "assert_not_screen_regex");
    assert!(predicates[2].negated);
    assert_eq!(predicates[1].step_index, 2);
}

#[test]
fn sensitive_input_is_hidden_when_redacting() {
    let yaml = ScreenplayBuilder::new("demo")
        .scenario("one", "scripted", |scene| {
            scene
                .action(ActionBuilder::command("export API_TOKEN=abc123"))
                .action(ActionBuilder::command("echo visible"))
        })
        .build();
    let (scenario, settings) = scenario_from(&yaml);

    let (plain, _) = compile_tape(&scenario, &settings, &outputs(), false);
    let hide_count = plain.matches("Hide").count();
    assert_eq!(hide_count, 0);

    let (redacted, _) = compile_tape(&scenario, &settings, &outputs(), true);
    let hide = redacted.find("Hide").expect("sensitive typing hidden");
    let secret = redacted.find("API_TOKEN").expect("command still typed");
    let show = redacted.find("Show").expect("recording resumes");
    assert!(hide < secret && secret < show);
    // The non-sensitive command stays visible.
    let visible = redacted.find("echo visible").expect("second command");
    assert!(visible > show);
}
