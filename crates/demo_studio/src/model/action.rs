use crate::model::DurationSpec;
use serde::{Deserialize, Serialize};

/// Surface a wait predicate is evaluated against.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitMode {
    /// Stream tail (last K kilobytes of raw output).
    #[default]
    Default,
    /// Current visible screen grid.
    Screen,
    /// Final non-empty line of the screen.
    Line,
}

impl WaitMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Screen => "screen",
            Self::Line => "line",
        }
    }
}

/// A normalized screenplay action.
///
/// The input document allows a mapping to combine one input primitive with
/// waits and assertions; validation expands such mappings into an ordered
/// sequence of these closed variants, so by the time a lane sees an action
/// it is exactly one thing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    /// Send text and submit (newline appended).
    Command { text: String },
    /// Send text without submitting.
    Input { text: String },
    /// Send a named key (`enter`, `escape`, `tab`, arrows, ...).
    Key { token: String },
    /// Send a chorded key (`ctrl+c`, `alt+f4`).
    Hotkey { token: String },
    /// Unconditional pause.
    Sleep { duration: DurationSpec },
    /// Require no screen change for the given duration.
    WaitStable { duration: DurationSpec },
    /// Wait for target text on the selected surface.
    WaitFor {
        target: String,
        mode: WaitMode,
        timeout: Option<DurationSpec>,
    },
    /// Wait for a regex match against the screen.
    WaitScreenRegex {
        pattern: String,
        timeout: Option<DurationSpec>,
    },
    /// Wait for a regex match on any screen line.
    WaitLineRegex {
        pattern: String,
        timeout: Option<DurationSpec>,
    },
    /// Assert a regex matches the screen right now.
    AssertScreenRegex { pattern: String },
    /// Assert a regex does not match the screen right now.
    AssertNotScreenRegex { pattern: String },
    /// Assert the last command's exit status (interactive lane only).
    ExpectExitCode { code: i32 },
}

impl Action {
    /// Short discriminant name used in events and failure payloads.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Command { .. } => "command",
            Self::Input { .. } => "input",
            Self::Key { .. } => "key",
            Self::Hotkey { .. } => "hotkey",
            Self::Sleep { .. } => "sleep",
            Self::WaitStable { .. } => "wait_stable",
            Self::WaitFor { .. } => "wait_for",
            Self::WaitScreenRegex { .. } => "wait_screen_regex",
            Self::WaitLineRegex { .. } => "wait_line_regex",
            Self::AssertScreenRegex { .. } => "assert_screen_regex",
            Self::AssertNotScreenRegex { .. } => "assert_not_screen_regex",
            Self::ExpectExitCode { .. } => "expect_exit_code",
        }
    }

    /// True for the interactive primitives the PTY lane rejects.
    #[must_use]
    pub fn is_interactive_primitive(&self) -> bool {
        matches!(
            self,
            Self::Input { .. } | Self::Key { .. } | Self::Hotkey { .. }
        )
    }

    /// True for waits and assertions (the predicates the evaluator samples).
    #[must_use]
    pub fn is_predicate(&self) -> bool {
        matches!(
            self,
            Self::WaitFor { .. }
                | Self::WaitScreenRegex { .. }
                | Self::WaitLineRegex { .. }
                | Self::AssertScreenRegex { .. }
                | Self::AssertNotScreenRegex { .. }
        )
    }
}

/// One executable step: a normalized action plus its step-level knobs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Optional author-provided identifier.
    pub id: Option<String>,
    /// Per-step deadline override.
    pub timeout: Option<DurationSpec>,
    /// Extra evaluation attempts for predicates (requires `timeout`).
    pub retries: u32,
    pub action: Action,
}

impl Step {
    #[must_use]
    pub fn new(action: Action) -> Self {
        Self {
            id: None,
            timeout: None,
            retries: 0,
            action,
        }
    }
}
