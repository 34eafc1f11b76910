use serde::{Deserialize, Serialize};

/// Default prompt-detection pattern used when a screenplay does not set one.
pub const DEFAULT_PROMPT_REGEX: &str = "Press enter to confirm or esc to cancel";

/// Default bound on automated approval rounds.
pub const DEFAULT_MAX_ROUNDS: u32 = 3;

/// Hard ceiling for `max_rounds`; values above this are rejected at validation.
pub const MAX_ROUNDS_LIMIT: u32 = 6;

/// How the policy engine answers an interactive approval prompt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptMode {
    /// Fail fast: a prompt observed during autonomous capture aborts the run.
    Manual,
    /// Send `approve_key` when the prompt and allow conditions match.
    Approve,
    /// Send `deny_key` on every matching prompt.
    Deny,
}

impl PromptMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Approve => "approve",
            Self::Deny => "deny",
        }
    }
}

/// Fully merged prompt policy consumed by the runtime.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PromptPolicy {
    pub mode: PromptMode,
    pub prompt_regex: Option<String>,
    pub allow_regex: Option<String>,
    #[serde(default)]
    pub allowed_command_prefixes: Vec<String>,
    pub max_rounds: u32,
    pub approve_key: String,
    pub deny_key: String,
}

impl Default for PromptPolicy {
    fn default() -> Self {
        Self {
            mode: PromptMode::Manual,
            prompt_regex: Some(DEFAULT_PROMPT_REGEX.to_string()),
            allow_regex: None,
            allowed_command_prefixes: Vec::new(),
            max_rounds: DEFAULT_MAX_ROUNDS,
            approve_key: "enter".to_string(),
            deny_key: "escape".to_string(),
        }
    }
}

/// Partial policy as written in a screenplay or scenario.
///
/// Every field is optional; merging overlays set fields over the layer
/// below (defaults <- screenplay <- scenario <- environment <- CLI).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PromptPolicyOverlay {
    pub mode: Option<PromptMode>,
    pub prompt_regex: Option<String>,
    pub allow_regex: Option<String>,
    pub allowed_command_prefixes: Option<Vec<String>>,
    pub max_rounds: Option<u32>,
    pub approve_key: Option<String>,
    pub deny_key: Option<String>,
}

impl PromptPolicy {
    fn apply(&mut self, overlay: &PromptPolicyOverlay) {
        if let Some(mode) = overlay.mode {
            self.mode = mode;
        }
        if let Some(pattern) = &overlay.prompt_regex {
            self.prompt_regex = if pattern.trim().is_empty() {
                None
            } else {
                Some(pattern.clone())
            };
        }
        if let Some(pattern) = &overlay.allow_regex {
            self.allow_regex = Some(pattern.clone());
        }
        if let Some(prefixes) = &overlay.allowed_command_prefixes {
            self.allowed_command_prefixes = prefixes.clone();
        }
        if let Some(rounds) = overlay.max_rounds {
            self.max_rounds = rounds;
        }
        if let Some(key) = &overlay.approve_key {
            self.approve_key = key.clone();
        }
        if let Some(key) = &overlay.deny_key {
            self.deny_key = key.clone();
        }
    }
}

/// Merge policy layers into the effective runtime policy.
///
/// `env_mode` comes from `TDS_AGENT_PROMPTS`; `override_mode` from the CLI.
/// A `None` override means "inherit" (the documented `auto` mode).
#[must_use]
pub fn resolve_prompt_policy(
    screenplay: Option<&PromptPolicyOverlay>,
    scenario: Option<&PromptPolicyOverlay>,
    env_mode: Option<PromptMode>,
    override_mode: Option<PromptMode>,
) -> PromptPolicy {
    let mut merged = PromptPolicy::default();
    if let Some(overlay) = screenplay {
        merged.apply(overlay);
    }
    if let Some(overlay) = scenario {
        merged.apply(overlay);
    }
    if let Some(mode) = env_mode {
        merged.mode = mode;
    }
    if let Some(mode) = override_mode {
        merged.mode = mode;
    }
    merged
}
