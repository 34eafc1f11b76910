//! Triage summary built from an existing run directory.
//!
//! Everything in the failure bundle was redacted when written, so this
//! module only reads and arranges.

use crate::error::{StudioError, StudioResult};
use crate::model::RunEvent;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Write as _;
use std::path::Path;

const EVENT_TAIL: usize = 10;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TriageReport {
    pub run_dir: String,
    pub status: Option<String>,
    pub lane: Option<String>,
    pub reason: Option<String>,
    pub failed_scenario: Option<String>,
    pub failed_step_index: Option<i64>,
    pub failed_action: Option<String>,
    pub media: Vec<String>,
    pub last_events: Vec<RunEvent>,
    pub failure_screen: Option<String>,
}

/// Build a triage report from run artifacts.
pub fn triage_run_dir(run_dir: &Path) -> StudioResult<TriageReport> {
    if !run_dir.is_dir() {
        return Err(StudioError::io(
            "run directory not found",
            run_dir.display(),
        ));
    }

    let summary: Option<Value> = std::fs::read_to_string(run_dir.join("summary.json"))
        .ok()
        .and_then(|raw| serde_json::from_str(&raw).ok());
    let summary_str = |key: &str| -> Option<String> {
        summary
            .as_ref()
            .and_then(|value| value.get(key))
            .and_then(Value::as_str)
            .map(ToString::to_string)
    };

    let mut media = Vec::new();
    if let Ok(entries) = std::fs::read_dir(run_dir.join("media")) {
        for entry in entries.flatten() {
            media.push(entry.path().display().to_string());
        }
    }
    media.sort();

    let mut last_events = Vec::new();
    if let Ok(raw) = std::fs::read_to_string(run_dir.join("runtime").join("events.jsonl")) {
        let events: Vec<RunEvent> = raw
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect();
        let start = events.len().saturating_sub(EVENT_TAIL);
        last_events = events[start..].to_vec();
    }

    let failure_screen = std::fs::read_to_string(run_dir.join("failure").join("screen.txt")).ok();
    let reason = std::fs::read_to_string(run_dir.join("failure").join("reason.txt"))
        .ok()
        .map(|text| text.trim().to_string())
        .or_else(|| summary_str("reason").filter(|text| !text.is_empty()));

    Ok(TriageReport {
        run_dir: run_dir.display().to_string(),
        status: summary_str("status"),
        lane: summary_str("lane"),
        reason,
        failed_scenario: summary_str("failed_scenario"),
        failed_step_index: summary
            .as_ref()
            .and_then(|value| value.get("failed_step_index"))
            .and_then(Value::as_i64),
        failed_action: summary_str("failed_action"),
        media,
        last_events,
        failure_screen,
    })
}

impl TriageReport {
    /// Human-readable rendering for the `debug` command.
    #[must_use]
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "run: {}", self.run_dir);
        let _ = writeln!(out, "status: {}", self.status.as_deref().unwrap_or("unknown"));
        let _ = writeln!(out, "lane: {}", self.lane.as_deref().unwrap_or("unknown"));
        if let Some(reason) = &self.reason {
            let _ = writeln!(out, "reason: {reason}");
        }
        if let Some(scenario) = &self.failed_scenario {
            let step = self
                .failed_step_index
                .map_or_else(|| "?".to_string(), |index| index.to_string());
            let action = self.failed_action.as_deref().unwrap_or("?");
            let _ = writeln!(out, "failed: scenario={scenario} step={step} action={action}");
        }
        if !self.media.is_empty() {
            let _ = writeln!(out, "media:");
            for path in &self.media {
                let _ = writeln!(out, "  {path}");
            }
        }
        if !self.last_events.is_empty() {
            let _ = writeln!(out, "last events:");
            for event in &self.last_events {
                let _ = writeln!(
                    out,
                    "  #{} [{}ms] scenario={} step={} {:?}",
                    event.seq, event.ts_ms, event.scenario, event.step, event.kind
                );
            }
        }
        if let Some(screen) = &self.failure_screen {
            let _ = writeln!(out, "final screen:");
            for line in screen.lines().take(20) {
                let _ = writeln!(out, "  {line}");
            }
        }
        out
    }
}
