use miette::Diagnostic;
use serde_json::Value;
use std::fmt;

/// Result type alias for studio operations.
pub type StudioResult<T> = Result<T, StudioError>;

/// Error type for studio operations with stable error codes.
///
/// Error codes are stable and map to process exit codes:
/// - `E_VALIDATION` / `E_LINT` (exit 2): screenplay rejected before execution
/// - `E_TOOL_UNAVAILABLE` (exit 3): required external tool missing in strict mode
/// - everything else (exit 1): execution failure with a failure bundle
#[derive(Debug)]
pub struct StudioError {
    /// Stable error code (e.g., `E_TIMEOUT`).
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Structured context for debugging.
    pub context: Option<Value>,
}

impl StudioError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self {
            code: "E_VALIDATION".to_string(),
            message: message.into(),
            context: None,
        }
    }

    pub fn lint(message: impl Into<String>) -> Self {
        Self {
            code: "E_LINT".to_string(),
            message: message.into(),
            context: None,
        }
    }

    pub fn tool_unavailable(message: impl Into<String>) -> Self {
        Self {
            code: "E_TOOL_UNAVAILABLE".to_string(),
            message: message.into(),
            context: None,
        }
    }

    pub fn setup(message: impl Into<String>, context: impl Into<Option<Value>>) -> Self {
        Self {
            code: "E_SETUP".to_string(),
            message: message.into(),
            context: context.into(),
        }
    }

    pub fn step(message: impl Into<String>, context: impl Into<Option<Value>>) -> Self {
        Self {
            code: "E_STEP".to_string(),
            message: message.into(),
            context: context.into(),
        }
    }

    pub fn timeout(message: impl Into<String>, context: impl Into<Option<Value>>) -> Self {
        Self {
            code: "E_TIMEOUT".to_string(),
            message: message.into(),
            context: context.into(),
        }
    }

    pub fn policy_abort(message: impl Into<String>) -> Self {
        Self {
            code: "E_POLICY_ABORT".to_string(),
            message: message.into(),
            context: None,
        }
    }

    pub fn cancelled() -> Self {
        Self {
            code: "E_CANCELLED".to_string(),
            message: "cancelled".to_string(),
            context: None,
        }
    }

    pub fn io(message: impl Into<String>, err: impl fmt::Display) -> Self {
        Self {
            code: "E_IO".to_string(),
            message: message.into(),
            context: Some(serde_json::json!({ "source": err.to_string() })),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            code: "E_INTERNAL".to_string(),
            message: message.into(),
            context: None,
        }
    }

    /// Process exit code for this error per the command contract.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self.code.as_str() {
            "E_VALIDATION" | "E_LINT" => 2,
            "E_TOOL_UNAVAILABLE" => 3,
            _ => 1,
        }
    }

    /// True when the error only reports missing external tooling, which is
    /// the sole condition under which the dispatcher may fall back to the
    /// container location.
    #[must_use]
    pub fn is_tool_unavailable(&self) -> bool {
        self.code == "E_TOOL_UNAVAILABLE"
    }

    pub fn to_error_info(&self) -> ErrorInfo {
        ErrorInfo {
            code: self.code.clone(),
            message: self.message.clone(),
            context: self.context.clone(),
        }
    }
}

impl fmt::Display for StudioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for StudioError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

impl Diagnostic for StudioError {}

/// Serializable error payload for summaries and failure bundles.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
    pub context: Option<Value>,
}

/// A single schema/validation finding with a precise field path.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ValidationIssue {
    /// Dotted path into the input document (e.g. `scenarios[0].actions[2].sleep`).
    pub field_path: String,
    /// What was wrong at that path.
    pub reason: String,
}

impl ValidationIssue {
    pub fn new(field_path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field_path: field_path.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field_path, self.reason)
    }
}

/// Fold a list of validation issues into a single `E_VALIDATION` error.
#[must_use]
pub fn validation_error(issues: &[ValidationIssue]) -> StudioError {
    let message = issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n");
    StudioError {
        code: "E_VALIDATION".to_string(),
        message,
        context: Some(serde_json::json!({ "issues": issues.len() })),
    }
}
