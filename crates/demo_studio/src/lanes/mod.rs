//! Lane runtimes: scripted, interactive (PTY), visual.
//!
//! Lanes share preinstall/setup execution, the evaluator, the artifact
//! writer, and the redaction pipeline, but nothing at the I/O level.

pub mod pty;
pub mod scripted;
pub mod video;

use crate::artifacts::{emit_stdout_contract, write_failure_bundle, write_summary, RunLayout};
use crate::compose::PlaybackMode;
use crate::config::{CancelToken, EnvConfig};
use crate::error::{StudioError, StudioResult};
use crate::model::run::{Counters, FailedStep, MediaPaths, RunStatus, Summary};
use crate::model::{EventKind, PromptMode, Scenario, Screenplay};
use crate::redaction::{Redactor, ResolvedRedaction};
use crate::shells::{build_shell_command, run_command_with_timeout};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Options shared by every lane, resolved by the dispatcher.
#[derive(Clone, Debug)]
pub struct LaneOptions {
    pub playback: PlaybackMode,
    pub produce_mp4: bool,
    pub produce_gif: bool,
    pub agent_prompts: Option<PromptMode>,
    pub redaction: ResolvedRedaction,
    pub keep_temp: bool,
    pub cancel: CancelToken,
    /// Directory commands run in (the screenplay's parent).
    pub working_dir: PathBuf,
    /// Run-scoped scratch root, removed on teardown.
    pub tmp_root: PathBuf,
}

/// Everything a lane needs, immutably.
pub struct LaneContext<'a> {
    pub screenplay: &'a Screenplay,
    pub screenplay_path: &'a Path,
    pub layout: &'a RunLayout,
    pub env: &'a EnvConfig,
    pub redactor: &'a Redactor,
    pub options: &'a LaneOptions,
}

/// Failure captured at the point it happened.
#[derive(Clone, Debug)]
pub struct LaneFailure {
    pub step: FailedStep,
    pub screen: String,
}

impl LaneFailure {
    #[must_use]
    pub fn new(step: FailedStep, screen: String) -> Self {
        Self { step, screen }
    }
}

/// What a lane hands back to the dispatcher.
#[derive(Debug, Default)]
pub struct LaneOutcome {
    pub mp4: Option<PathBuf>,
    pub gif: Option<PathBuf>,
    pub scenes: Vec<PathBuf>,
    pub events_path: Option<PathBuf>,
    pub failure: Option<LaneFailure>,
    pub counters: Counters,
    /// Extra log captured for the failure bundle (visual lane).
    pub log_path: Option<PathBuf>,
}

impl LaneOutcome {
    #[must_use]
    pub fn success(&self) -> bool {
        self.failure.is_none()
    }
}

/// Bail out with a `cancelled` failure when the caller interrupted.
pub fn check_cancel(options: &LaneOptions) -> StudioResult<()> {
    if options.cancel.is_cancelled() {
        Err(StudioError::cancelled())
    } else {
        Ok(())
    }
}

/// Events emitted for setup-style commands (preinstall uses scenario -1).
pub type SetupEventSink<'a> = Option<&'a mut crate::artifacts::EventWriter>;

/// Run the screenplay's preinstall commands. A failure here aborts before
/// any scenario executes.
pub fn run_preinstall(ctx: &LaneContext<'_>, mut events: SetupEventSink<'_>) -> Option<LaneFailure> {
    for command in &ctx.screenplay.preinstall {
        if let Err(failure) = run_setup_command(
            ctx,
            command,
            crate::model::ShellKind::Auto,
            -1,
            -1,
            &mut events,
            "preinstall",
        ) {
            return Some(failure);
        }
    }
    None
}

/// Run one scenario's setup commands.
pub fn run_scenario_setup(
    ctx: &LaneContext<'_>,
    scenario: &Scenario,
    scenario_index: i64,
    mut events: SetupEventSink<'_>,
) -> Option<LaneFailure> {
    for command in &scenario.setup {
        if let Err(failure) = run_setup_command(
            ctx,
            command,
            scenario.shell,
            scenario_index,
            -1,
            &mut events,
            &scenario.label,
        ) {
            return Some(failure);
        }
    }
    None
}

#[allow(clippy::too_many_arguments)]
fn run_setup_command(
    ctx: &LaneContext<'_>,
    command: &str,
    shell: crate::model::ShellKind,
    scenario_index: i64,
    step_index: i64,
    events: &mut SetupEventSink<'_>,
    scenario_label: &str,
) -> Result<(), LaneFailure> {
    let result = build_shell_command(command, shell).and_then(|argv| {
        run_command_with_timeout(&argv, &ctx.options.working_dir, ctx.env.setup_timeout, &[])
    });
    let (output, exit_code) = match result {
        Ok(pair) => pair,
        Err(err) => (err.to_string(), -1),
    };

    if let Some(writer) = events.as_deref_mut() {
        let kind = if exit_code == 0 {
            EventKind::Passed
        } else {
            EventKind::Failed
        };
        let _ = writer.append(
            scenario_index,
            step_index,
            kind,
            Some(serde_json::json!({
                "action": "setup",
                "command": ctx.redactor.redact(command),
                "exit_code": exit_code,
            })),
        );
    }

    if exit_code == 0 {
        Ok(())
    } else {
        let reason = format!("setup command failed: {command}\n{output}")
            .trim()
            .to_string();
        Err(LaneFailure::new(
            FailedStep {
                scenario: Some(scenario_label.to_string()),
                step_index: Some(step_index),
                action: Some("setup".to_string()),
                reason,
            },
            output,
        ))
    }
}

/// Write the failure bundle (if any), the summary, and the stdout contract.
/// Returns the final run status.
pub fn complete_run(
    ctx: &LaneContext<'_>,
    outcome: &LaneOutcome,
    started: Instant,
) -> StudioResult<RunStatus> {
    let status = if outcome.success() {
        RunStatus::Success
    } else {
        RunStatus::Failed
    };

    let failure_dir = match &outcome.failure {
        None => None,
        Some(failure) => Some(write_failure_bundle(
            ctx.layout,
            ctx.redactor,
            &failure.screen,
            &failure.step,
            outcome.log_path.as_deref(),
        )?),
    };

    #[allow(clippy::cast_possible_truncation)]
    let duration_ms = started.elapsed().as_millis() as u64;
    let summary = Summary {
        run_id: ctx.layout.run_id.clone(),
        lane: ctx.layout.lane,
        status,
        screenplay: ctx.screenplay_path.display().to_string(),
        playback_mode: Some(ctx.options.playback.as_str().to_string()),
        media_redaction: Some(ctx.options.redaction.as_str().to_string()),
        media: MediaPaths {
            gif: outcome.gif.as_ref().map(|path| path.display().to_string()),
            mp4: outcome.mp4.as_ref().map(|path| path.display().to_string()),
        },
        scenes: outcome
            .scenes
            .iter()
            .map(|path| path.display().to_string())
            .collect(),
        events: outcome
            .events_path
            .as_ref()
            .map(|path| path.display().to_string()),
        counters: outcome.counters.clone(),
        duration_ms,
        failed_scenario: outcome
            .failure
            .as_ref()
            .and_then(|failure| failure.step.scenario.clone()),
        failed_step_index: outcome
            .failure
            .as_ref()
            .and_then(|failure| failure.step.step_index),
        failed_action: outcome
            .failure
            .as_ref()
            .and_then(|failure| failure.step.action.clone()),
        reason: outcome
            .failure
            .as_ref()
            .map(|failure| ctx.redactor.redact(&failure.step.reason))
            .unwrap_or_default(),
        failure_dir: failure_dir.map(|path| path.display().to_string()),
    };

    write_summary(ctx.layout, &summary)?;
    emit_stdout_contract(ctx.layout, &summary);
    Ok(status)
}
