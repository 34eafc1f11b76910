pub mod action;
pub mod build;
pub mod duration;
pub mod ids;
pub mod policy;
pub mod run;
pub mod screenplay;

pub use action::{Action, Step, WaitMode};
pub use build::{build, load_screenplay_str};
pub use duration::DurationSpec;
pub use ids::RunId;
pub use policy::{PromptMode, PromptPolicy, PromptPolicyOverlay};
pub use run::{Counters, EventKind, FailedStep, Lane, MediaPaths, RunEvent, RunStatus, Summary};
pub use screenplay::{
    ExecutionMode, PromptPath, PromptSettings, PromptStyle, Scenario, Screenplay, Settings,
    ShellKind,
};
