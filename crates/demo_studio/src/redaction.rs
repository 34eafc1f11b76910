//! Redaction: keep sensitive values out of media and failure artifacts.
//!
//! Failure-artifact redaction is always on regardless of the media mode.
//! Replacement uses a fixed placeholder and is idempotent; spans are never
//! partially masked.

use crate::model::{Action, Screenplay};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Fixed replacement token.
pub const REDACTED_TOKEN: &str = "[REDACTED]";

/// Media redaction mode as requested by screenplay or CLI.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaRedactionMode {
    #[default]
    Auto,
    Off,
    InputLine,
}

/// Media redaction mode after `auto` resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolvedRedaction {
    Off,
    InputLine,
}

impl ResolvedRedaction {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::InputLine => "input_line",
        }
    }
}

/// Default token-like variable name suffixes; override via
/// `TDS_SENSITIVE_NAME_SUFFIXES` (comma-separated).
pub const DEFAULT_SENSITIVE_NAME_SUFFIXES: &[&str] = &["_API_KEY", "_TOKEN", "_SECRET"];

const SENSITIVE_VALUE_ENV_NAMES: &[&str] = &[
    "OPENAI_API_KEY",
    "OPENAI_ORGANIZATION",
    "ANTHROPIC_API_KEY",
    "GOOGLE_API_KEY",
    "GITHUB_TOKEN",
    "AWS_SECRET_ACCESS_KEY",
    "AWS_SESSION_TOKEN",
];

const SENSITIVE_HINT_TERMS: &[&str] = &["api_key", "apikey", "token", "secret", "password", "passwd"];

fn key_shaped_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"\bsk-[A-Za-z0-9_-]{16,}\b",
            r"\bgh[pousr]_[A-Za-z0-9]{20,}\b",
        ]
        .iter()
        .filter_map(|pattern| Regex::new(pattern).ok())
        .collect()
    })
}

/// Value redactor built once per run from declared variables plus the
/// process environment.
#[derive(Debug, Default)]
pub struct Redactor {
    values: Vec<String>,
}

impl Redactor {
    /// Collect sensitive values: well-known env vars and any declared
    /// variable whose name carries a token-like suffix.
    #[must_use]
    pub fn from_sources(
        variables: &BTreeMap<String, Value>,
        name_suffixes: &[String],
    ) -> Self {
        let mut values = Vec::new();
        for name in SENSITIVE_VALUE_ENV_NAMES {
            if let Ok(value) = std::env::var(name) {
                if value.len() >= 6 {
                    values.push(value);
                }
            }
        }
        for (name, value) in variables {
            if variable_name_is_sensitive(name, name_suffixes) {
                if let Some(text) = value.as_str() {
                    if !text.is_empty() {
                        values.push(text.to_string());
                    }
                }
            }
        }
        // Longest first so overlapping values never leave partial spans.
        values.sort_by(|a, b| b.len().cmp(&a.len()));
        values.dedup();
        Self { values }
    }

    /// Replace every sensitive span with the fixed placeholder.
    #[must_use]
    pub fn redact(&self, text: &str) -> String {
        let mut redacted = text.to_string();
        for value in &self.values {
            redacted = redacted.replace(value, REDACTED_TOKEN);
        }
        for pattern in key_shaped_patterns() {
            redacted = pattern.replace_all(&redacted, REDACTED_TOKEN).into_owned();
        }
        redacted
    }
}

/// True when a variable name matches a configured token-like suffix.
#[must_use]
pub fn variable_name_is_sensitive(name: &str, suffixes: &[String]) -> bool {
    let upper = name.to_ascii_uppercase();
    suffixes
        .iter()
        .any(|suffix| upper.ends_with(&suffix.to_ascii_uppercase()))
}

/// True when a command/input string looks like it handles a secret.
#[must_use]
pub fn text_contains_sensitive(value: &str) -> bool {
    let lowered = value.to_ascii_lowercase();
    if SENSITIVE_HINT_TERMS.iter().any(|term| lowered.contains(term)) {
        return true;
    }
    for name in SENSITIVE_VALUE_ENV_NAMES {
        if let Ok(secret) = std::env::var(name) {
            if secret.len() >= 6 && value.contains(&secret) {
                return true;
            }
        }
    }
    key_shaped_patterns()
        .iter()
        .any(|pattern| pattern.is_match(value))
}

/// Heuristic behind `auto` media mode: does any typed text look sensitive?
#[must_use]
pub fn screenplay_has_sensitive_actions(screenplay: &Screenplay) -> bool {
    screenplay.scenarios.iter().any(|scenario| {
        scenario.steps.iter().any(|step| match &step.action {
            Action::Command { text } | Action::Input { text } => text_contains_sensitive(text),
            _ => false,
        })
    })
}

/// Resolve the effective media redaction mode for a run.
#[must_use]
pub fn resolve_media_redaction_mode(
    screenplay: &Screenplay,
    override_mode: MediaRedactionMode,
) -> ResolvedRedaction {
    match override_mode {
        MediaRedactionMode::Off => ResolvedRedaction::Off,
        MediaRedactionMode::InputLine => ResolvedRedaction::InputLine,
        MediaRedactionMode::Auto => {
            if screenplay_has_sensitive_actions(screenplay) {
                ResolvedRedaction::InputLine
            } else {
                ResolvedRedaction::Off
            }
        }
    }
}
