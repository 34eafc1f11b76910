use crate::model::policy::PromptPolicyOverlay;
use crate::model::Step;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Visual settings shared by every scenario of a screenplay.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub width: u32,
    pub height: u32,
    pub font_size: u32,
    pub theme: String,
    pub padding: u32,
    pub margin: u32,
    pub margin_fill: String,
    pub border_radius: u32,
    pub window_bar: String,
    pub font_family: Option<String>,
    pub framerate: u32,
    pub line_height: f64,
    pub letter_spacing: i32,
    pub cursor_blink: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            width: 1440,
            height: 900,
            font_size: 22,
            theme: "Catppuccin Mocha".to_string(),
            padding: 24,
            margin: 12,
            margin_fill: "#0F172A".to_string(),
            border_radius: 10,
            window_bar: "Colorful".to_string(),
            font_family: None,
            framerate: 60,
            line_height: 1.15,
            letter_spacing: 0,
            cursor_blink: false,
        }
    }
}

/// Shell prompt styling applied by the scripted lane before a scene starts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PromptSettings {
    pub style: PromptStyle,
    pub env: Option<String>,
    pub user: String,
    pub host: String,
    pub path: PromptPath,
    pub symbol: String,
}

impl Default for PromptSettings {
    fn default() -> Self {
        Self {
            style: PromptStyle::Macos,
            env: None,
            user: "dev".to_string(),
            host: "workstation".to_string(),
            path: PromptPath::Basename,
            symbol: "%".to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptStyle {
    Macos,
    Venv,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptPath {
    Basename,
    Full,
}

/// Scenario execution lane as declared in the document.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    #[default]
    Scripted,
    Interactive,
    Visual,
}

impl ExecutionMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scripted => "scripted",
            Self::Interactive => "interactive",
            Self::Visual => "visual",
        }
    }
}

/// Shell selector for setup and command execution.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShellKind {
    #[default]
    Auto,
    Bash,
    Zsh,
    Fish,
    Sh,
    Pwsh,
    Cmd,
}

/// One scene: an ordered sequence of steps rendered in one lane.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub label: String,
    pub execution_mode: ExecutionMode,
    pub shell: ShellKind,
    pub prompt: Option<PromptSettings>,
    #[serde(default)]
    pub setup: Vec<String>,
    pub agent_prompts: Option<PromptPolicyOverlay>,
    /// Non-empty by construction; validation rejects empty action lists.
    pub steps: Vec<Step>,
}

/// The validated screenplay model. Built once, never mutated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Screenplay {
    pub title: String,
    /// Filesystem-safe output slug naming the final media files.
    pub output: String,
    pub settings: Settings,
    /// Non-empty by construction.
    pub scenarios: Vec<Scenario>,
    /// Fully resolved variable bindings (post interpolation).
    #[serde(default)]
    pub variables: BTreeMap<String, Value>,
    #[serde(default)]
    pub preinstall: Vec<String>,
    pub agent_prompts: Option<PromptPolicyOverlay>,
}

impl Screenplay {
    /// The stem used for final media file names.
    #[must_use]
    pub fn output_stem(&self) -> &str {
        let trimmed = self.output.as_str();
        trimmed
            .rsplit_once('.')
            .map_or(trimmed, |(stem, _ext)| stem)
    }
}
