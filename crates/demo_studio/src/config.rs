//! Run configuration resolved once at dispatcher entry.
//!
//! Lanes receive this record immutably; nothing below the dispatcher reads
//! the process environment.

use crate::model::PromptMode;
use crate::redaction::DEFAULT_SENSITIVE_NAME_SUFFIXES;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_SETUP_TIMEOUT_SECONDS: u64 = 120;
const DEFAULT_DOCKER_PIDS_LIMIT: &str = "512";
const DEFAULT_DOCKER_IMAGE_RETENTION: usize = 3;

/// Cooperative cancellation flag shared between the CLI signal handler and
/// the lanes' sampling loops.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Immutable snapshot of the `TDS_*` environment.
#[derive(Clone, Debug)]
pub struct EnvConfig {
    /// Deadline for preinstall and scenario setup commands.
    pub setup_timeout: Duration,
    pub docker_hardening: bool,
    pub docker_pids_limit: String,
    pub docker_network: Option<String>,
    pub docker_read_only: bool,
    pub docker_image_retention: usize,
    /// `TDS_AGENT_PROMPTS` override; `auto`/unset means inherit.
    pub agent_prompt_mode: Option<PromptMode>,
    /// `TDS_ALLOW_UNSAFE_APPROVE` escape hatch for unbounded allow_regex.
    pub allow_unbounded_approve: bool,
    /// Token-like variable name suffixes feeding the redaction set.
    pub sensitive_name_suffixes: Vec<String>,
    /// Set inside our own container so the dispatcher never recurses.
    pub in_container: bool,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            setup_timeout: Duration::from_secs(DEFAULT_SETUP_TIMEOUT_SECONDS),
            docker_hardening: true,
            docker_pids_limit: DEFAULT_DOCKER_PIDS_LIMIT.to_string(),
            docker_network: None,
            docker_read_only: false,
            docker_image_retention: DEFAULT_DOCKER_IMAGE_RETENTION,
            agent_prompt_mode: None,
            allow_unbounded_approve: false,
            sensitive_name_suffixes: DEFAULT_SENSITIVE_NAME_SUFFIXES
                .iter()
                .map(ToString::to_string)
                .collect(),
            in_container: false,
        }
    }
}

fn env_enabled(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Err(_) => default,
        Ok(raw) => !matches!(
            raw.trim().to_ascii_lowercase().as_str(),
            "0" | "false" | "no" | "off"
        ),
    }
}

impl EnvConfig {
    /// Resolve the full configuration from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(raw) = std::env::var("TDS_SETUP_TIMEOUT_SECONDS") {
            if let Ok(seconds) = raw.trim().parse::<u64>() {
                if seconds > 0 {
                    config.setup_timeout = Duration::from_secs(seconds);
                }
            }
        }
        config.docker_hardening = env_enabled("TDS_DOCKER_HARDENING", true);
        if let Ok(raw) = std::env::var("TDS_DOCKER_PIDS_LIMIT") {
            let trimmed = raw.trim();
            if !trimmed.is_empty() {
                config.docker_pids_limit = trimmed.to_string();
            }
        }
        config.docker_network = std::env::var("TDS_DOCKER_NETWORK")
            .ok()
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty());
        config.docker_read_only = env_enabled("TDS_DOCKER_READ_ONLY", false);
        if let Ok(raw) = std::env::var("TDS_DOCKER_IMAGE_RETENTION") {
            if let Ok(retention) = raw.trim().parse::<usize>() {
                config.docker_image_retention = retention;
            }
        }
        config.agent_prompt_mode = std::env::var("TDS_AGENT_PROMPTS")
            .ok()
            .and_then(|raw| match raw.trim().to_ascii_lowercase().as_str() {
                "manual" => Some(PromptMode::Manual),
                "approve" => Some(PromptMode::Approve),
                "deny" => Some(PromptMode::Deny),
                _ => None,
            });
        config.allow_unbounded_approve = env_enabled("TDS_ALLOW_UNSAFE_APPROVE", false);
        if let Ok(raw) = std::env::var("TDS_SENSITIVE_NAME_SUFFIXES") {
            let suffixes: Vec<String> = raw
                .split(',')
                .map(|part| part.trim().to_string())
                .filter(|part| !part.is_empty())
                .collect();
            if !suffixes.is_empty() {
                config.sensitive_name_suffixes = suffixes;
            }
        }
        config.in_container = std::env::var("TERMINAL_DEMO_STUDIO_IN_CONTAINER")
            .map(|raw| raw == "1")
            .unwrap_or(false);

        config
    }
}
