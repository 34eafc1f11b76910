//! Policy engine for autonomous approval prompts.
//!
//! `decide` is a pure function of (screen, policy, round counter, last
//! command); it owns no timers and sends no keys. The lane runtime calls
//! it once per sampling tick through `PromptLoop`, which tracks rounds
//! and re-fire suppression.

use crate::model::{PromptMode, PromptPolicy};
use regex::Regex;

/// One decision per sampling tick.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PromptDecision {
    /// Send the policy's approve key.
    Approve,
    /// Send the policy's deny key.
    Deny,
    /// Do nothing this tick.
    Skip,
    /// Fail the run with a diagnosable reason.
    Abort(String),
}

fn matches_multiline(pattern: &str, screen: &str) -> bool {
    Regex::new(&format!("(?m){pattern}"))
        .map(|regex| regex.is_match(screen))
        .unwrap_or(false)
}

/// Evaluate the prompt policy against one screen snapshot.
#[must_use]
pub fn decide(
    screen: &str,
    policy: &PromptPolicy,
    rounds: u32,
    last_command: Option<&str>,
) -> PromptDecision {
    let Some(prompt_regex) = policy.prompt_regex.as_deref() else {
        return PromptDecision::Skip;
    };
    if !matches_multiline(prompt_regex, screen) {
        return PromptDecision::Skip;
    }
    if rounds >= policy.max_rounds {
        return PromptDecision::Abort("prompt loop exceeded max_rounds".to_string());
    }
    match policy.mode {
        PromptMode::Manual => {
            PromptDecision::Abort("manual mode cannot auto-confirm prompt".to_string())
        }
        PromptMode::Deny => PromptDecision::Deny,
        PromptMode::Approve => {
            let allow_matched = policy
                .allow_regex
                .as_deref()
                .is_some_and(|pattern| matches_multiline(pattern, screen));
            if !allow_matched {
                return PromptDecision::Abort(
                    "approve policy did not match allow_regex".to_string(),
                );
            }
            if !policy.allowed_command_prefixes.is_empty() {
                let prefix_matched = last_command.is_some_and(|command| {
                    policy
                        .allowed_command_prefixes
                        .iter()
                        .any(|prefix| command.starts_with(prefix))
                });
                if !prefix_matched {
                    return PromptDecision::Abort(
                        "last command did not match allowed_command_prefixes".to_string(),
                    );
                }
            }
            PromptDecision::Approve
        }
    }
}

/// Per-scenario prompt bookkeeping owned by the lane runtime.
///
/// After an approve/deny the engine is silent until the screen stops
/// matching the prompt pattern or a fresh sampling tick observes it again;
/// each `observe` call is one tick, so the next matching tick is fresh.
#[derive(Debug, Default)]
pub struct PromptLoop {
    rounds: u32,
}

impl PromptLoop {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rounds dispatched so far (approve or deny key sends).
    #[must_use]
    pub fn rounds(&self) -> u32 {
        self.rounds
    }

    /// Consult the policy for the current tick, advancing the round
    /// counter when a key dispatch is decided.
    pub fn observe(
        &mut self,
        screen: &str,
        policy: &PromptPolicy,
        last_command: Option<&str>,
    ) -> PromptDecision {
        let decision = decide(screen, policy, self.rounds, last_command);
        if matches!(decision, PromptDecision::Approve | PromptDecision::Deny) {
            self.rounds += 1;
        }
        decision
    }
}
