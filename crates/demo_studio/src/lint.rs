//! Lint pass over a validated screenplay.
//!
//! Catches policy configurations that are legal but unsafe to run
//! unattended. `strict` mode promotes warnings to errors.

use crate::model::policy::resolve_prompt_policy;
use crate::model::{Action, ExecutionMode, PromptMode, PromptPolicy, Screenplay, WaitMode};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LintFinding {
    pub severity: Severity,
    pub code: String,
    pub message: String,
    pub scenario: Option<String>,
    pub step_index: Option<usize>,
}

impl LintFinding {
    fn scenario_finding(
        severity: Severity,
        code: &str,
        scenario: &str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            code: code.to_string(),
            message: message.into(),
            scenario: Some(scenario.to_string()),
            step_index: None,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LintReport {
    pub findings: Vec<LintFinding>,
}

impl LintReport {
    #[must_use]
    pub fn errors(&self) -> Vec<&LintFinding> {
        self.findings
            .iter()
            .filter(|finding| finding.severity == Severity::Error)
            .collect()
    }

    #[must_use]
    pub fn warnings(&self) -> Vec<&LintFinding> {
        self.findings
            .iter()
            .filter(|finding| finding.severity == Severity::Warning)
            .collect()
    }

    /// Pass/fail status; `strict` counts warnings as failures.
    #[must_use]
    pub fn passes(&self, strict: bool) -> bool {
        if strict {
            self.findings.is_empty()
        } else {
            self.errors().is_empty()
        }
    }

    #[must_use]
    pub fn to_json(&self, strict: bool) -> serde_json::Value {
        serde_json::json!({
            "status": if self.passes(strict) { "pass" } else { "fail" },
            "errors": self.errors().len(),
            "warnings": self.warnings().len(),
            "findings": self.findings,
        })
    }
}

/// Patterns that match effectively anything; an `approve` policy scoped
/// this loosely is an unattended rubber stamp.
#[must_use]
pub fn looks_unbounded_allow_regex(pattern: &str) -> bool {
    matches!(
        pattern.trim().to_ascii_lowercase().as_str(),
        ".*" | "^.*$" | "(?s).*" | ".+" | "^.+$" | "[\\s\\s]*" | "[\\s\\s]+"
    )
}

/// Lint one merged prompt policy.
#[must_use]
pub fn lint_prompt_policy(policy: &PromptPolicy, allow_unbounded_approve: bool) -> LintReport {
    let mut findings = Vec::new();
    let mut push = |severity, code: &str, message: String| {
        findings.push(LintFinding {
            severity,
            code: code.to_string(),
            message,
            scenario: None,
            step_index: None,
        });
    };

    match policy.mode {
        PromptMode::Approve => {
            match policy.allow_regex.as_deref().map(str::trim) {
                None | Some("") => push(
                    Severity::Error,
                    "approve-allow-regex",
                    "approve mode requires a non-empty allow_regex".to_string(),
                ),
                Some(pattern) if looks_unbounded_allow_regex(pattern) => {
                    if !allow_unbounded_approve {
                        push(
                            Severity::Error,
                            "approve-allow-regex",
                            "approve mode allow_regex is too broad; use a scoped pattern or set \
                             TDS_ALLOW_UNSAFE_APPROVE=1 to bypass"
                                .to_string(),
                        );
                    }
                }
                Some(_) => {}
            }
            if policy.allowed_command_prefixes.is_empty() {
                push(
                    Severity::Warning,
                    "approve-command-prefixes",
                    "approve mode has no allowed_command_prefixes; approvals rely only on regex \
                     matching"
                        .to_string(),
                );
            }
        }
        PromptMode::Manual | PromptMode::Deny => {
            if policy.allow_regex.is_some() {
                push(
                    Severity::Warning,
                    "allow-regex-ignored",
                    "allow_regex is ignored unless mode=approve".to_string(),
                );
            }
            if !policy.allowed_command_prefixes.is_empty() {
                push(
                    Severity::Warning,
                    "command-prefixes-ignored",
                    "allowed_command_prefixes is ignored unless mode=approve".to_string(),
                );
            }
        }
    }

    if policy.prompt_regex.is_none() && policy.mode != PromptMode::Manual {
        push(
            Severity::Warning,
            "prompt-regex-missing",
            "approve/deny mode without a prompt_regex never fires".to_string(),
        );
    }

    LintReport { findings }
}

/// Lint a whole validated screenplay.
#[must_use]
pub fn lint_screenplay(screenplay: &Screenplay, allow_unbounded_approve: bool) -> LintReport {
    let mut findings = Vec::new();
    let mut has_visual = false;

    for scenario in &screenplay.scenarios {
        if scenario.execution_mode != ExecutionMode::Visual {
            if scenario.agent_prompts.is_some() {
                findings.push(LintFinding::scenario_finding(
                    Severity::Warning,
                    "agent-prompts-ignored",
                    &scenario.label,
                    "agent_prompts is set but this scenario is not visual; the policy is ignored",
                ));
            }
        } else {
            has_visual = true;
            let merged = resolve_prompt_policy(
                screenplay.agent_prompts.as_ref(),
                scenario.agent_prompts.as_ref(),
                None,
                None,
            );
            for finding in lint_prompt_policy(&merged, allow_unbounded_approve).findings {
                findings.push(LintFinding {
                    scenario: Some(scenario.label.clone()),
                    code: format!("agent-policy/{}", finding.code),
                    ..finding
                });
            }
        }

        for (step_index, step) in scenario.steps.iter().enumerate() {
            if let Action::WaitFor {
                mode: WaitMode::Default,
                target,
                ..
            } = &step.action
            {
                findings.push(LintFinding {
                    severity: Severity::Warning,
                    code: "wait-mode-default".to_string(),
                    message: format!(
                        "wait_for '{target}' uses the stream-tail default; wait_mode: screen is \
                         the more robust choice"
                    ),
                    scenario: Some(scenario.label.clone()),
                    step_index: Some(step_index),
                });
            }
        }
    }

    if screenplay.agent_prompts.is_some() && !has_visual {
        findings.push(LintFinding {
            severity: Severity::Warning,
            code: "screenplay-agent-prompts-ignored".to_string(),
            message: "screenplay-level agent_prompts is ignored without visual scenarios"
                .to_string(),
            scenario: None,
            step_index: None,
        });
    }

    LintReport { findings }
}
