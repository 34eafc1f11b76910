use crate::model::ExecutionMode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Effective execution lane for a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lane {
    Scripted,
    Interactive,
    Visual,
}

impl Lane {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scripted => "scripted",
            Self::Interactive => "interactive",
            Self::Visual => "visual",
        }
    }
}

impl From<ExecutionMode> for Lane {
    fn from(mode: ExecutionMode) -> Self {
        match mode {
            ExecutionMode::Scripted => Self::Scripted,
            ExecutionMode::Interactive => Self::Interactive,
            ExecutionMode::Visual => Self::Visual,
        }
    }
}

/// Final run status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Failed,
}

impl RunStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

/// Per-step lifecycle events recorded to `events.jsonl`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Dispatched,
    Waiting,
    Asserting,
    Passed,
    Failed,
    TimedOut,
    Approved,
    Denied,
}

/// One event line. Self-contained JSON; `seq` is strictly monotonic within
/// a run and `ts_ms` is measured from run start on a monotonic clock.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunEvent {
    pub seq: u64,
    /// Scenario index; -1 for preinstall.
    pub scenario: i64,
    /// Step index; -1 for setup commands.
    pub step: i64,
    pub kind: EventKind,
    pub ts_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

/// Media outputs recorded in the summary.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MediaPaths {
    pub gif: Option<String>,
    pub mp4: Option<String>,
}

/// Step counters for the summary.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Counters {
    pub scenarios_total: usize,
    pub steps_total: usize,
    pub steps_passed: usize,
}

/// The terminal `summary.json` payload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Summary {
    pub run_id: String,
    pub lane: Lane,
    pub status: RunStatus,
    pub screenplay: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playback_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_redaction: Option<String>,
    pub media: MediaPaths,
    #[serde(default)]
    pub scenes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub events: Option<String>,
    pub counters: Counters,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_scenario: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_step_index: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_action: Option<String>,
    #[serde(default)]
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_dir: Option<String>,
}

/// Identity of the step that caused a failure, captured in `step.json`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FailedStep {
    pub scenario: Option<String>,
    pub step_index: Option<i64>,
    pub action: Option<String>,
    pub reason: String,
}
