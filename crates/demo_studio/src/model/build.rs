//! Screenplay construction: raw document -> typed, validated model.
//!
//! Validation is total: a screenplay either builds completely or is
//! rejected with field-path issues. Variable interpolation runs first,
//! so the typed model never contains `{{name}}` tokens.

use crate::error::ValidationIssue;
use crate::interpolate::{interpolate, resolve_variables};
use crate::model::policy::{PromptPolicyOverlay, MAX_ROUNDS_LIMIT};
use crate::model::{
    Action, DurationSpec, ExecutionMode, PromptSettings, Scenario, Screenplay, Settings,
    ShellKind, Step, WaitMode,
};
use serde_json::Value;
use std::collections::BTreeMap;

const RECOGNIZED_ACTION_KEYS: &[&str] = &[
    "type",
    "command",
    "input",
    "key",
    "hotkey",
    "sleep",
    "wait_for",
    "wait_screen_regex",
    "wait_line_regex",
    "wait_stable",
    "assert_screen_regex",
    "assert_not_screen_regex",
    "expect_exit_code",
    "wait_mode",
    "wait_timeout",
    "id",
    "timeout",
    "retries",
];

const RECOGNIZED_SCENARIO_KEYS: &[&str] = &[
    "label",
    "surface",
    "execution_mode",
    "shell",
    "prompt",
    "setup",
    "actions",
    "agent_prompts",
];

const RECOGNIZED_SCREENPLAY_KEYS: &[&str] = &[
    "title",
    "output",
    "settings",
    "scenarios",
    "variables",
    "preinstall",
    "agent_prompts",
];

/// Parse a YAML screenplay document and build the validated model.
///
/// `tmp_dir` is the system-provided interpolation target; the dispatcher
/// binds it to a unique writable directory scoped to the run.
pub fn load_screenplay_str(
    text: &str,
    tmp_dir: &str,
) -> Result<Screenplay, Vec<ValidationIssue>> {
    let raw: Value = serde_yaml::from_str(text)
        .map_err(|err| vec![ValidationIssue::new("$", format!("invalid YAML: {err}"))])?;
    build(&raw, tmp_dir)
}

/// Build a validated screenplay from a parsed document.
pub fn build(raw: &Value, tmp_dir: &str) -> Result<Screenplay, Vec<ValidationIssue>> {
    let Value::Object(map) = raw else {
        return Err(vec![ValidationIssue::new(
            "$",
            "screenplay must be a mapping",
        )]);
    };

    let mut variables: BTreeMap<String, Value> = match map.get("variables") {
        None => BTreeMap::new(),
        Some(Value::Object(vars)) => vars
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect(),
        Some(_) => {
            return Err(vec![ValidationIssue::new(
                "variables",
                "variables must be a mapping",
            )]);
        }
    };
    variables
        .entry("tmp_dir".to_string())
        .or_insert_with(|| Value::String(tmp_dir.to_string()));
    let variables = resolve_variables(&variables).map_err(|issue| vec![issue])?;

    let mut normalized = map.clone();
    normalized.insert(
        "variables".to_string(),
        Value::Object(variables.clone().into_iter().collect()),
    );
    let interpolated =
        interpolate(&Value::Object(normalized), &variables, "$").map_err(|issue| vec![issue])?;
    let Value::Object(doc) = interpolated else {
        return Err(vec![ValidationIssue::new("$", "internal: not a mapping")]);
    };

    let mut issues = Vec::new();

    for key in doc.keys() {
        if !RECOGNIZED_SCREENPLAY_KEYS.contains(&key.as_str()) {
            issues.push(ValidationIssue::new(key.clone(), "unknown screenplay field"));
        }
    }

    let title = require_string(&doc, "title", "title", &mut issues);
    let output = require_string(&doc, "output", "output", &mut issues);
    if let Some(slug) = &output {
        if !is_filesystem_safe(slug) {
            issues.push(ValidationIssue::new(
                "output",
                "output must be a non-empty filesystem-safe token",
            ));
        }
    }

    let settings = match doc.get("settings") {
        None => Settings::default(),
        Some(value) => match serde_json::from_value::<Settings>(value.clone()) {
            Ok(settings) => settings,
            Err(err) => {
                issues.push(ValidationIssue::new("settings", err.to_string()));
                Settings::default()
            }
        },
    };

    let preinstall = string_list(&doc, "preinstall", &mut issues);
    let agent_prompts = prompt_overlay(doc.get("agent_prompts"), "agent_prompts", &mut issues);

    let mut scenarios = Vec::new();
    match doc.get("scenarios") {
        None => issues.push(ValidationIssue::new("scenarios", "missing required key")),
        Some(Value::Array(items)) => {
            if items.is_empty() {
                issues.push(ValidationIssue::new(
                    "scenarios",
                    "at least one scenario is required",
                ));
            }
            for (index, item) in items.iter().enumerate() {
                let path = format!("scenarios[{index}]");
                if let Some(scenario) = build_scenario(item, &path, &mut issues) {
                    scenarios.push(scenario);
                }
            }
        }
        Some(_) => issues.push(ValidationIssue::new("scenarios", "scenarios must be a list")),
    }

    if issues.is_empty() {
        Ok(Screenplay {
            title: title.unwrap_or_default(),
            output: output.unwrap_or_default(),
            settings,
            scenarios,
            variables,
            preinstall,
            agent_prompts,
        })
    } else {
        Err(issues)
    }
}

fn build_scenario(
    value: &Value,
    path: &str,
    issues: &mut Vec<ValidationIssue>,
) -> Option<Scenario> {
    let Value::Object(map) = value else {
        issues.push(ValidationIssue::new(path, "scenario must be a mapping"));
        return None;
    };

    for key in map.keys() {
        if !RECOGNIZED_SCENARIO_KEYS.contains(&key.as_str()) {
            issues.push(ValidationIssue::new(
                format!("{path}.{key}"),
                "unknown scenario field",
            ));
        }
    }

    let label = require_string(map, "label", &format!("{path}.label"), issues);

    if let Some(surface) = map.get("surface") {
        if surface.as_str() != Some("terminal") {
            issues.push(ValidationIssue::new(
                format!("{path}.surface"),
                "unsupported surface; only 'terminal' is available",
            ));
        }
    }

    let execution_mode = match map.get("execution_mode") {
        None => ExecutionMode::default(),
        Some(value) => match serde_json::from_value::<ExecutionMode>(value.clone()) {
            Ok(mode) => mode,
            Err(_) => {
                issues.push(ValidationIssue::new(
                    format!("{path}.execution_mode"),
                    "expected one of scripted, interactive, visual",
                ));
                ExecutionMode::default()
            }
        },
    };

    let shell = match map.get("shell") {
        None => ShellKind::default(),
        Some(value) => match serde_json::from_value::<ShellKind>(value.clone()) {
            Ok(shell) => shell,
            Err(_) => {
                issues.push(ValidationIssue::new(
                    format!("{path}.shell"),
                    "unsupported shell selector",
                ));
                ShellKind::default()
            }
        },
    };

    let prompt = match map.get("prompt") {
        None => None,
        Some(value) => match serde_json::from_value::<PromptSettings>(value.clone()) {
            Ok(prompt) => Some(prompt),
            Err(err) => {
                issues.push(ValidationIssue::new(format!("{path}.prompt"), err.to_string()));
                None
            }
        },
    };

    let setup = string_list(map, "setup", issues);
    let agent_prompts = prompt_overlay(
        map.get("agent_prompts"),
        &format!("{path}.agent_prompts"),
        issues,
    );

    let mut steps = Vec::new();
    match map.get("actions") {
        None => issues.push(ValidationIssue::new(
            format!("{path}.actions"),
            "missing required key",
        )),
        Some(Value::Array(items)) => {
            if items.is_empty() {
                issues.push(ValidationIssue::new(
                    format!("{path}.actions"),
                    "at least one action is required",
                ));
            }
            for (index, item) in items.iter().enumerate() {
                let action_path = format!("{path}.actions[{index}]");
                steps.extend(build_action(item, &action_path, execution_mode, issues));
            }
        }
        Some(_) => issues.push(ValidationIssue::new(
            format!("{path}.actions"),
            "actions must be a list",
        )),
    }

    Some(Scenario {
        label: label.unwrap_or_default(),
        execution_mode,
        shell,
        prompt,
        setup,
        agent_prompts,
        steps,
    })
}

/// Normalize one raw action into its ordered variant sequence.
///
/// A raw mapping may combine one input primitive with waits and asserts;
/// the expansion order below is the execution order: primitive, sleep,
/// wait_stable, waits, asserts, exit-code expectation.
fn build_action(
    value: &Value,
    path: &str,
    mode: ExecutionMode,
    issues: &mut Vec<ValidationIssue>,
) -> Vec<Step> {
    if let Value::String(text) = value {
        return finish_steps(
            vec![Action::Command { text: text.clone() }],
            None,
            None,
            0,
            mode,
            path,
            issues,
        );
    }

    let Value::Object(map) = value else {
        issues.push(ValidationIssue::new(
            path,
            "action must be a string or a mapping",
        ));
        return Vec::new();
    };

    for key in map.keys() {
        if !RECOGNIZED_ACTION_KEYS.contains(&key.as_str()) {
            issues.push(ValidationIssue::new(
                format!("{path}.{key}"),
                "unknown action field",
            ));
        }
    }

    let mut primitives: Vec<(&str, Action)> = Vec::new();
    for key in ["command", "type"] {
        if let Some(text) = opt_string(map, key, path, issues) {
            primitives.push((key, Action::Command { text }));
        }
    }
    if let Some(text) = opt_string(map, "input", path, issues) {
        primitives.push(("input", Action::Input { text }));
    }
    if let Some(token) = opt_string(map, "key", path, issues) {
        primitives.push(("key", Action::Key { token }));
    }
    if let Some(token) = opt_string(map, "hotkey", path, issues) {
        primitives.push(("hotkey", Action::Hotkey { token }));
    }
    if primitives.len() > 1 {
        issues.push(ValidationIssue::new(
            path,
            "action must not define multiple input primitives",
        ));
        return Vec::new();
    }

    let mut actions = Vec::new();
    if let Some((_, primitive)) = primitives.into_iter().next() {
        actions.push(primitive);
    }

    if let Some(duration) = opt_duration(map, "sleep", path, issues) {
        actions.push(Action::Sleep { duration });
    }
    if let Some(duration) = opt_duration(map, "wait_stable", path, issues) {
        actions.push(Action::WaitStable { duration });
    }

    let wait_mode = match map.get("wait_mode") {
        None => None,
        Some(value) => match serde_json::from_value::<WaitMode>(value.clone()) {
            Ok(mode) => Some(mode),
            Err(_) => {
                issues.push(ValidationIssue::new(
                    format!("{path}.wait_mode"),
                    "expected one of default, screen, line",
                ));
                None
            }
        },
    };
    let wait_timeout = opt_duration(map, "wait_timeout", path, issues);

    let wait_for = opt_string(map, "wait_for", path, issues);
    let wait_screen_regex = opt_regex(map, "wait_screen_regex", path, issues);
    let wait_line_regex = opt_regex(map, "wait_line_regex", path, issues);

    if wait_for.is_some() && (wait_screen_regex.is_some() || wait_line_regex.is_some()) {
        issues.push(ValidationIssue::new(
            path,
            "wait_for conflicts with wait_screen_regex/wait_line_regex",
        ));
    }
    if (wait_mode.is_some() || wait_timeout.is_some()) && wait_for.is_none() {
        issues.push(ValidationIssue::new(
            path,
            "wait_mode/wait_timeout require wait_for",
        ));
    }

    if let Some(target) = wait_for {
        actions.push(Action::WaitFor {
            target,
            mode: wait_mode.unwrap_or_default(),
            timeout: wait_timeout.clone(),
        });
    }
    if let Some(pattern) = wait_screen_regex {
        actions.push(Action::WaitScreenRegex {
            pattern,
            timeout: wait_timeout.clone(),
        });
    }
    if let Some(pattern) = wait_line_regex {
        actions.push(Action::WaitLineRegex {
            pattern,
            timeout: wait_timeout,
        });
    }
    if let Some(pattern) = opt_regex(map, "assert_screen_regex", path, issues) {
        actions.push(Action::AssertScreenRegex { pattern });
    }
    if let Some(pattern) = opt_regex(map, "assert_not_screen_regex", path, issues) {
        actions.push(Action::AssertNotScreenRegex { pattern });
    }
    if let Some(value) = map.get("expect_exit_code") {
        match value.as_i64() {
            Some(code) if i32::try_from(code).is_ok() => {
                #[allow(clippy::cast_possible_truncation)]
                actions.push(Action::ExpectExitCode { code: code as i32 });
            }
            _ => issues.push(ValidationIssue::new(
                format!("{path}.expect_exit_code"),
                "expected an integer exit code",
            )),
        }
    }

    if actions.is_empty() {
        issues.push(ValidationIssue::new(
            path,
            "action must contain at least one command, key, wait, assert, or sleep field",
        ));
        return Vec::new();
    }

    let id = opt_string(map, "id", path, issues);
    let timeout = opt_duration(map, "timeout", path, issues);
    let retries = match map.get("retries") {
        None => 0,
        Some(value) => match value.as_u64() {
            Some(retries) if u32::try_from(retries).is_ok() => {
                #[allow(clippy::cast_possible_truncation)]
                let retries = retries as u32;
                retries
            }
            _ => {
                issues.push(ValidationIssue::new(
                    format!("{path}.retries"),
                    "expected a non-negative integer",
                ));
                0
            }
        },
    };
    if retries > 0 && timeout.is_none() {
        issues.push(ValidationIssue::new(
            path,
            "retries > 0 requires an explicit timeout",
        ));
    }

    finish_steps(actions, id, timeout, retries, mode, path, issues)
}

fn finish_steps(
    actions: Vec<Action>,
    id: Option<String>,
    timeout: Option<DurationSpec>,
    retries: u32,
    mode: ExecutionMode,
    path: &str,
    issues: &mut Vec<ValidationIssue>,
) -> Vec<Step> {
    for action in &actions {
        match mode {
            ExecutionMode::Interactive if action.is_interactive_primitive() => {
                issues.push(ValidationIssue::new(
                    path,
                    "interactive primitive unsupported in pty lane",
                ));
            }
            ExecutionMode::Visual | ExecutionMode::Scripted
                if matches!(action, Action::ExpectExitCode { .. }) =>
            {
                issues.push(ValidationIssue::new(
                    format!("{path}.expect_exit_code"),
                    "expect_exit_code is only supported in the interactive lane",
                ));
            }
            _ => {}
        }
    }

    actions
        .into_iter()
        .map(|action| Step {
            id: id.clone(),
            timeout: timeout.clone(),
            retries,
            action,
        })
        .collect()
}

fn prompt_overlay(
    value: Option<&Value>,
    path: &str,
    issues: &mut Vec<ValidationIssue>,
) -> Option<PromptPolicyOverlay> {
    let value = value?;
    match serde_json::from_value::<PromptPolicyOverlay>(value.clone()) {
        Ok(overlay) => {
            if let Some(rounds) = overlay.max_rounds {
                if rounds == 0 || rounds > MAX_ROUNDS_LIMIT {
                    issues.push(ValidationIssue::new(
                        format!("{path}.max_rounds"),
                        format!("max_rounds must be between 1 and {MAX_ROUNDS_LIMIT}"),
                    ));
                }
            }
            Some(overlay)
        }
        Err(err) => {
            issues.push(ValidationIssue::new(path, err.to_string()));
            None
        }
    }
}

fn require_string(
    map: &serde_json::Map<String, Value>,
    key: &str,
    path: &str,
    issues: &mut Vec<ValidationIssue>,
) -> Option<String> {
    match map.get(key) {
        Some(Value::String(text)) if !text.is_empty() => Some(text.clone()),
        Some(Value::String(_)) => {
            issues.push(ValidationIssue::new(path, "must not be empty"));
            None
        }
        Some(_) => {
            issues.push(ValidationIssue::new(path, "expected a string"));
            None
        }
        None => {
            issues.push(ValidationIssue::new(path, "missing required key"));
            None
        }
    }
}

fn opt_string(
    map: &serde_json::Map<String, Value>,
    key: &str,
    path: &str,
    issues: &mut Vec<ValidationIssue>,
) -> Option<String> {
    match map.get(key) {
        None | Some(Value::Null) => None,
        Some(Value::String(text)) => Some(text.clone()),
        Some(other) => {
            // YAML scalars like `command: 42` are accepted as their string form.
            if other.is_number() || other.is_boolean() {
                Some(other.to_string())
            } else {
                issues.push(ValidationIssue::new(
                    format!("{path}.{key}"),
                    "expected a string",
                ));
                None
            }
        }
    }
}

fn opt_duration(
    map: &serde_json::Map<String, Value>,
    key: &str,
    path: &str,
    issues: &mut Vec<ValidationIssue>,
) -> Option<DurationSpec> {
    let text = opt_string(map, key, path, issues)?;
    match DurationSpec::parse(&text) {
        Ok(duration) => Some(duration),
        Err(reason) => {
            issues.push(ValidationIssue::new(format!("{path}.{key}"), reason));
            None
        }
    }
}

fn opt_regex(
    map: &serde_json::Map<String, Value>,
    key: &str,
    path: &str,
    issues: &mut Vec<ValidationIssue>,
) -> Option<String> {
    let pattern = opt_string(map, key, path, issues)?;
    if let Err(err) = regex::Regex::new(&pattern) {
        issues.push(ValidationIssue::new(
            format!("{path}.{key}"),
            format!("invalid regex: {err}"),
        ));
        return None;
    }
    Some(pattern)
}

fn string_list(
    map: &serde_json::Map<String, Value>,
    key: &str,
    issues: &mut Vec<ValidationIssue>,
) -> Vec<String> {
    match map.get(key) {
        None => Vec::new(),
        Some(Value::Array(items)) => {
            let mut out = Vec::with_capacity(items.len());
            for (index, item) in items.iter().enumerate() {
                match item.as_str() {
                    Some(text) => out.push(text.to_string()),
                    None => issues.push(ValidationIssue::new(
                        format!("{key}[{index}]"),
                        "expected a string",
                    )),
                }
            }
            out
        }
        Some(_) => {
            issues.push(ValidationIssue::new(key, "expected a list of strings"));
            Vec::new()
        }
    }
}

fn is_filesystem_safe(slug: &str) -> bool {
    !slug.is_empty()
        && slug
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
}
