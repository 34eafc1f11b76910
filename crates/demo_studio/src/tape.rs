//! Directive program compiler for the scripted lane.
//!
//! Each scenario becomes one directive file for the external headless
//! recorder (vhs). Regex waits and assertions cannot run inside the
//! recorder, so they are returned as post-recording predicates evaluated
//! against the recorder's text capture after the scene renders.

use crate::model::{
    Action, PromptPath, PromptSettings, PromptStyle, Scenario, Settings, WaitMode,
};

/// A regex predicate deferred until after the scene has rendered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PostPredicate {
    pub step_index: usize,
    pub pattern: String,
    pub line_mode: bool,
    pub negated: bool,
    pub label: &'static str,
}

fn escape_type_text(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

fn format_type_command(text: &str) -> String {
    // The recorder's parser has edge cases with $ inside escaped
    // double-quoted strings.
    if text.contains('"') && text.contains('$') && !text.contains('\'') {
        format!("Type '{text}'")
    } else {
        format!("Type \"{}\"", escape_type_text(text))
    }
}

/// Escape literal text into the recorder's /regex/ wait syntax. Slashes
/// would terminate the pattern, so they become wildcards.
fn escape_wait_regex(text: &str) -> String {
    text.split('/')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*")
}

fn wait_directive(target: &str, mode: WaitMode, timeout: Option<&str>) -> String {
    let mut prefix = match mode {
        WaitMode::Default => "Wait".to_string(),
        WaitMode::Screen => "Wait+Screen".to_string(),
        WaitMode::Line => "Wait+Line".to_string(),
    };
    if let Some(timeout) = timeout {
        prefix = format!("{prefix}@{timeout}");
    }
    format!("{prefix} /{}/", escape_wait_regex(target))
}

/// Translate a normalized key token into the recorder's key directive.
fn key_directive(token: &str) -> String {
    token
        .split('+')
        .map(|part| {
            let part = part.trim();
            match part.to_ascii_lowercase().as_str() {
                "enter" | "return" => "Enter".to_string(),
                "escape" | "esc" => "Escape".to_string(),
                "tab" => "Tab".to_string(),
                "space" => "Space".to_string(),
                "backspace" => "Backspace".to_string(),
                "up" => "Up".to_string(),
                "down" => "Down".to_string(),
                "left" => "Left".to_string(),
                "right" => "Right".to_string(),
                "pageup" => "PageUp".to_string(),
                "pagedown" => "PageDown".to_string(),
                "ctrl" => "Ctrl".to_string(),
                "alt" => "Alt".to_string(),
                "shift" => "Shift".to_string(),
                lower if lower.len() == 1 => lower.to_ascii_uppercase(),
                _ => part.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join("+")
}

fn escape_single_quotes(text: &str) -> String {
    text.replace('\'', "'\"'\"'")
}

fn prompt_setup_command(prompt: &PromptSettings) -> String {
    let path_token = match prompt.path {
        PromptPath::Basename => "${PWD##*/}",
        PromptPath::Full => "${PWD}",
    };
    let ps1 = match prompt.style {
        PromptStyle::Venv => {
            let env_name = prompt.env.as_deref().unwrap_or(".venv");
            format!(
                "\\n({env_name}) {}@{} {path_token} {} ",
                prompt.user, prompt.host, prompt.symbol
            )
        }
        PromptStyle::Macos => format!(
            "\\n{}@{} {path_token} {} ",
            prompt.user, prompt.host, prompt.symbol
        ),
    };
    format!("export PS1='{}'", escape_single_quotes(&ps1))
}

fn append_typed_lines(lines: &mut Vec<String>, command: &str, press_enter: bool) {
    let chunks: Vec<&str> = if command.contains('\n') {
        command.lines().collect()
    } else {
        vec![command]
    };
    for chunk in chunks {
        lines.push(format_type_command(chunk));
        if press_enter {
            lines.push("Enter".to_string());
        }
    }
}

/// Compile one scenario into a directive program.
///
/// Deterministic: same scenario + settings + outputs yield an identical
/// directive string and predicate list. With `redact_input` set, typed
/// text that looks sensitive is entered while recording is hidden and the
/// screen is cleared before recording resumes, so the value never appears
/// in media.
#[must_use]
pub fn compile_tape(
    scenario: &Scenario,
    settings: &Settings,
    outputs: &[String],
    redact_input: bool,
) -> (String, Vec<PostPredicate>) {
    let mut lines: Vec<String> = Vec::new();
    let mut predicates: Vec<PostPredicate> = Vec::new();

    for output in outputs {
        lines.push(format!("Output \"{}\"", escape_type_text(output)));
    }
    lines.push(format!("Set FontSize {}", settings.font_size));
    lines.push(format!("Set Framerate {}", settings.framerate));
    lines.push(format!("Set LineHeight {}", settings.line_height));
    lines.push(format!("Set LetterSpacing {}", settings.letter_spacing));
    lines.push(format!("Set Width {}", settings.width));
    lines.push(format!("Set Height {}", settings.height));
    lines.push(format!("Set Theme \"{}\"", escape_type_text(&settings.theme)));
    lines.push(format!("Set Padding {}", settings.padding));
    lines.push(format!("Set Margin {}", settings.margin));
    lines.push(format!(
        "Set MarginFill \"{}\"",
        escape_type_text(&settings.margin_fill)
    ));
    lines.push(format!("Set BorderRadius {}", settings.border_radius));
    lines.push(format!("Set CursorBlink {}", settings.cursor_blink));
    lines.push(format!("Set WindowBar {}", settings.window_bar));
    if let Some(font_family) = &settings.font_family {
        lines.push(format!(
            "Set FontFamily \"{}\"",
            escape_type_text(font_family)
        ));
    }

    let mut setup_commands: Vec<String> = Vec::new();
    if let Some(prompt) = &scenario.prompt {
        setup_commands.push(prompt_setup_command(prompt));
    }
    setup_commands.extend(scenario.setup.iter().cloned());

    if !setup_commands.is_empty() {
        lines.push("Hide".to_string());
        for command in &setup_commands {
            append_typed_lines(&mut lines, command, true);
        }
        append_typed_lines(&mut lines, "clear", true);
        lines.push("Show".to_string());
    }

    for (step_index, step) in scenario.steps.iter().enumerate() {
        match &step.action {
            Action::Command { text } => {
                if redact_input && crate::redaction::text_contains_sensitive(text) {
                    lines.push("Hide".to_string());
                    append_typed_lines(&mut lines, text, true);
                    append_typed_lines(&mut lines, "clear", true);
                    lines.push("Show".to_string());
                } else {
                    append_typed_lines(&mut lines, text, true);
                }
            }
            Action::Input { text } => append_typed_lines(&mut lines, text, false),
            Action::Key { token } | Action::Hotkey { token } => {
                lines.push(key_directive(token));
            }
            Action::Sleep { duration } | Action::WaitStable { duration } => {
                lines.push(format!("Sleep {}", duration.literal()));
            }
            Action::WaitFor {
                target,
                mode,
                timeout,
            } => {
                lines.push(wait_directive(
                    target,
                    *mode,
                    timeout.as_ref().map(crate::model::DurationSpec::literal),
                ));
            }
            Action::WaitScreenRegex { pattern, .. } => predicates.push(PostPredicate {
                step_index,
                pattern: pattern.clone(),
                line_mode: false,
                negated: false,
                label: "wait_screen_regex",
            }),
            Action::WaitLineRegex { pattern, .. } => predicates.push(PostPredicate {
                step_index,
                pattern: pattern.clone(),
                line_mode: true,
                negated: false,
                label: "wait_line_regex",
            }),
            Action::AssertScreenRegex { pattern } => predicates.push(PostPredicate {
                step_index,
                pattern: pattern.clone(),
                line_mode: false,
                negated: false,
                label: "assert_screen_regex",
            }),
            Action::AssertNotScreenRegex { pattern } => predicates.push(PostPredicate {
                step_index,
                pattern: pattern.clone(),
                line_mode: false,
                negated: true,
                label: "assert_not_screen_regex",
            }),
            // Rejected at validation for the scripted lane.
            Action::ExpectExitCode { .. } => {}
        }
    }

    (lines.join("\n") + "\n", predicates)
}
