//! Wait/assert evaluator: pure predicates over a rolling snapshot.
//!
//! The lane runtime owns the sampling loop and the snapshot; everything
//! here is a synchronous function of the snapshot so ordering guarantees
//! stay with the single caller.

use crate::error::{StudioError, StudioResult};
use crate::model::WaitMode;
use regex::Regex;
use std::collections::hash_map::DefaultHasher;
use std::collections::VecDeque;
use std::hash::{Hash, Hasher};
use std::time::Duration;

/// Sampling cadence for wait predicates.
pub const SAMPLE_INTERVAL: Duration = Duration::from_millis(50);

/// System default deadline when neither the action nor the scenario sets one.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(15);

/// Bound on the raw-output tail retained for `default` wait mode.
pub const STREAM_TAIL_LIMIT: usize = 64 * 1024;

/// Rolling view of terminal content at one sampling tick.
#[derive(Clone, Debug, Default)]
pub struct Snapshot {
    /// Visible grid text, cursor positioning stripped, line boundaries kept.
    pub screen: String,
    /// Last `STREAM_TAIL_LIMIT` bytes of raw output, lossily decoded.
    pub stream_tail: String,
}

/// Bounded buffer of recent raw output.
#[derive(Debug, Default)]
pub struct StreamTail {
    bytes: VecDeque<u8>,
}

impl StreamTail {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.bytes.extend(chunk.iter().copied());
        while self.bytes.len() > STREAM_TAIL_LIMIT {
            self.bytes.pop_front();
        }
    }

    #[must_use]
    pub fn contents(&self) -> String {
        let bytes: Vec<u8> = self.bytes.iter().copied().collect();
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

/// Outcome of sampling one wait predicate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Predicate satisfied; payload is the matched text.
    Satisfied(String),
    /// Not yet; payload is a diagnosable reason for the eventual timeout.
    Pending(String),
}

impl WaitOutcome {
    #[must_use]
    pub fn is_satisfied(&self) -> bool {
        matches!(self, Self::Satisfied(_))
    }
}

/// Compile a screen predicate with multiline semantics.
///
/// The `regex` crate is linear-time by construction, which is what rules
/// out catastrophic backtracking across lanes.
pub fn compile_screen_regex(pattern: &str) -> StudioResult<Regex> {
    Regex::new(&format!("(?m){pattern}"))
        .map_err(|err| StudioError::validation(format!("invalid regex '{pattern}': {err}")))
}

/// Evaluate a `wait_for` target against the selected surface.
#[must_use]
pub fn eval_wait_for(snapshot: &Snapshot, target: &str, mode: WaitMode) -> WaitOutcome {
    match mode {
        WaitMode::Default => {
            if snapshot.stream_tail.contains(target) {
                WaitOutcome::Satisfied(target.to_string())
            } else {
                WaitOutcome::Pending(format!("text not found in stream tail: {target}"))
            }
        }
        WaitMode::Screen => {
            if snapshot.screen.contains(target) {
                WaitOutcome::Satisfied(target.to_string())
            } else {
                WaitOutcome::Pending(format!("text not found on screen: {target}"))
            }
        }
        WaitMode::Line => {
            let line = final_non_empty_line(&snapshot.screen);
            if line.contains(target) {
                WaitOutcome::Satisfied(line.to_string())
            } else {
                WaitOutcome::Pending(format!("text not found on final line: {target}"))
            }
        }
    }
}

/// Evaluate a screen-wide regex wait.
pub fn eval_wait_screen_regex(snapshot: &Snapshot, pattern: &str) -> StudioResult<WaitOutcome> {
    let regex = compile_screen_regex(pattern)?;
    Ok(match regex.find(&snapshot.screen) {
        Some(found) => WaitOutcome::Satisfied(found.as_str().to_string()),
        None => WaitOutcome::Pending(format!("screen regex not found: {pattern}")),
    })
}

/// Evaluate a per-line regex wait (any line may match).
pub fn eval_wait_line_regex(snapshot: &Snapshot, pattern: &str) -> StudioResult<WaitOutcome> {
    let regex = Regex::new(pattern)
        .map_err(|err| StudioError::validation(format!("invalid regex '{pattern}': {err}")))?;
    for line in snapshot.screen.lines() {
        if let Some(found) = regex.find(line) {
            return Ok(WaitOutcome::Satisfied(found.as_str().to_string()));
        }
    }
    Ok(WaitOutcome::Pending(format!(
        "line regex not found: {pattern}"
    )))
}

/// Evaluate a screen assertion; `negated` flips the expectation.
pub fn eval_assert_screen(
    screen: &str,
    pattern: &str,
    negated: bool,
) -> StudioResult<Result<(), String>> {
    let regex = compile_screen_regex(pattern)?;
    let matched = regex.is_match(screen);
    Ok(match (matched, negated) {
        (true, false) | (false, true) => Ok(()),
        (false, false) => Err(format!("assert_screen_regex failed: {pattern}")),
        (true, true) => Err(format!("assert_not_screen_regex failed: {pattern}")),
    })
}

/// Stable hash of the screen for `wait_stable` change detection.
#[must_use]
pub fn screen_hash(screen: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    screen.hash(&mut hasher);
    hasher.finish()
}

fn final_non_empty_line(screen: &str) -> &str {
    screen
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .unwrap_or("")
}
