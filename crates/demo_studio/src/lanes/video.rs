//! Visual lane: a real terminal emulator on a virtual display, driven over
//! a private remote-control socket while a screen encoder records.
//!
//! The policy engine is consulted on every sampling tick. Teardown runs on
//! every exit path and each release step is independent: stop the encoder
//! (flushing the container), close the control socket, terminate the
//! emulator, tear down the display, delete the socket directory.

use crate::artifacts::EventWriter;
use crate::compose::{Compositor, HeaderMode, SceneInput};
use crate::error::{StudioError, StudioResult};
use crate::evaluator::{self, Snapshot, WaitOutcome, DEFAULT_WAIT_TIMEOUT};
use crate::lanes::{
    check_cancel, run_preinstall, run_scenario_setup, LaneContext, LaneFailure, LaneOutcome,
};
use crate::model::run::FailedStep;
use crate::model::{Action, DurationSpec, EventKind, PromptPolicy, Scenario, Step};
use crate::model::policy::resolve_prompt_policy;
use crate::policy::{PromptDecision, PromptLoop};
use crate::redaction::{text_contains_sensitive, ResolvedRedaction};
use crate::shells::run_command_with_timeout;
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

const POLICY_TICK: Duration = Duration::from_millis(120);
const PROMPT_SETTLE: Duration = Duration::from_millis(200);
const KITTY_READY_TIMEOUT: Duration = Duration::from_secs(10);
const KITTEN_CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Binaries the lane needs locally.
#[must_use]
pub fn missing_local_video_dependencies() -> Vec<String> {
    [
        ("kitty", "kitty"),
        ("kitten", "kitten"),
        ("Xvfb", "xvfb"),
        ("ffmpeg", "ffmpeg"),
        ("ffprobe", "ffprobe"),
    ]
    .iter()
    .filter(|(binary, _)| !crate::shells::binary_exists(binary))
    .map(|(_, label)| (*label).to_string())
    .collect()
}

#[must_use]
pub fn format_video_dependency_help(missing: &[String]) -> String {
    let mut sorted = missing.to_vec();
    sorted.sort();
    format!(
        "missing local visual-lane dependencies: {}. Install kitty, xvfb and ffmpeg, or run \
         with --docker",
        sorted.join(", ")
    )
}

fn xvfb_display_id(index: usize) -> String {
    format!(":{}", 140 + (std::process::id() as usize % 400) + index)
}

fn open_log(path: &Path) -> StudioResult<fs::File> {
    fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|err| StudioError::io("failed to open video log", err))
}

fn spawn_logged(mut command: Command, log_path: &Path) -> StudioResult<Child> {
    let stdout = open_log(log_path)?;
    let stderr = open_log(log_path)?;
    command
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::from(stderr))
        .spawn()
        .map_err(|err| StudioError::io("failed to spawn process", err))
}

fn start_xvfb(display: &str, width: u32, height: u32, log_path: &Path) -> StudioResult<Child> {
    let mut command = Command::new("Xvfb");
    command.args([
        display,
        "-screen",
        "0",
        &format!("{width}x{height}x24"),
        "-nolisten",
        "tcp",
    ]);
    spawn_logged(command, log_path)
}

fn start_kitty(
    socket_target: &str,
    display: &str,
    cwd: &Path,
    log_path: &Path,
) -> StudioResult<Child> {
    let mut command = Command::new("kitty");
    command
        .args([
            "--listen-on",
            socket_target,
            "-o",
            "allow_remote_control=socket-only",
        ])
        .env("DISPLAY", display)
        .current_dir(cwd);
    spawn_logged(command, log_path)
}

fn start_ffmpeg(
    display: &str,
    width: u32,
    height: u32,
    framerate: u32,
    output: &Path,
    log_path: &Path,
) -> StudioResult<Child> {
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)
            .map_err(|err| StudioError::io("failed to create scenes dir", err))?;
    }
    let stdout = open_log(log_path)?;
    let stderr = open_log(log_path)?;
    Command::new("ffmpeg")
        .args([
            "-y",
            "-hide_banner",
            "-loglevel",
            "error",
            "-f",
            "x11grab",
            "-framerate",
            &framerate.to_string(),
            "-video_size",
            &format!("{width}x{height}"),
            "-i",
            &format!("{display}.0"),
            "-pix_fmt",
            "yuv420p",
            "-movflags",
            "+faststart",
            &output.display().to_string(),
        ])
        .stdin(Stdio::piped())
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::from(stderr))
        .spawn()
        .map_err(|err| StudioError::io("failed to spawn encoder", err))
}

fn run_kitten(socket_target: &str, display: &str, args: &[&str]) -> StudioResult<String> {
    let mut argv: Vec<String> = vec!["kitten".into(), "@".into(), "--to".into(), socket_target.into()];
    argv.extend(args.iter().map(ToString::to_string));
    let cwd = std::env::temp_dir();
    let (output, code) = run_command_with_timeout(
        &argv,
        &cwd,
        KITTEN_CALL_TIMEOUT,
        &[("DISPLAY".to_string(), display.to_string())],
    )?;
    if code == 0 {
        Ok(output)
    } else {
        Err(StudioError::step(
            format!("remote-control call failed: {}", output.trim()),
            None,
        ))
    }
}

fn wait_for_kitty_ready(socket_target: &str, display: &str) -> StudioResult<()> {
    let deadline = Instant::now() + KITTY_READY_TIMEOUT;
    let mut last_error = "kitty remote control not ready".to_string();
    while Instant::now() < deadline {
        match run_kitten(socket_target, display, &["ls"]) {
            Ok(_) => return Ok(()),
            Err(err) => last_error = err.message,
        }
        std::thread::sleep(Duration::from_millis(150));
    }
    Err(StudioError::setup(last_error, None))
}

fn send_text(socket_target: &str, display: &str, value: &str) -> StudioResult<()> {
    run_kitten(socket_target, display, &["send-text", value]).map(|_| ())
}

fn normalize_key_token(value: &str) -> String {
    let token = value.trim();
    if token.contains('+') {
        return token
            .split('+')
            .map(|part| part.trim().to_ascii_lowercase())
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("+");
    }
    match token.to_ascii_lowercase().as_str() {
        "enter" | "return" => "enter".to_string(),
        "escape" | "esc" => "esc".to_string(),
        "tab" => "tab".to_string(),
        "up" => "up".to_string(),
        "down" => "down".to_string(),
        "left" => "left".to_string(),
        "right" => "right".to_string(),
        "backspace" => "backspace".to_string(),
        "space" => "space".to_string(),
        _ => token.to_string(),
    }
}

fn send_key(socket_target: &str, display: &str, token: &str) -> StudioResult<()> {
    run_kitten(
        socket_target,
        display,
        &["send-key", &normalize_key_token(token)],
    )
    .map(|_| ())
}

fn get_screen_text(socket_target: &str, display: &str) -> StudioResult<String> {
    run_kitten(socket_target, display, &["get-text"])
}

fn stop_process(child: &mut Option<Child>) {
    if let Some(mut process) = child.take() {
        if matches!(process.try_wait(), Ok(Some(_))) {
            return;
        }
        let _ = process.kill();
        let _ = process.wait();
    }
}

/// Ask the encoder to finish cleanly so the container index is flushed,
/// then fall back to killing it.
fn stop_ffmpeg(child: &mut Option<Child>) {
    if let Some(process) = child.as_mut() {
        if let Some(stdin) = process.stdin.as_mut() {
            let _ = stdin.write_all(b"q\n");
            let _ = stdin.flush();
        }
        let deadline = Instant::now() + Duration::from_secs(6);
        while Instant::now() < deadline {
            if matches!(process.try_wait(), Ok(Some(_))) {
                *child = None;
                return;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
    }
    stop_process(child);
}

struct SceneResources {
    xvfb: Option<Child>,
    kitty: Option<Child>,
    ffmpeg: Option<Child>,
    socket_dir: Option<PathBuf>,
}

impl SceneResources {
    fn teardown(&mut self) {
        stop_ffmpeg(&mut self.ffmpeg);
        stop_process(&mut self.kitty);
        stop_process(&mut self.xvfb);
        if let Some(dir) = self.socket_dir.take() {
            let _ = fs::remove_dir_all(dir);
        }
    }
}

impl Drop for SceneResources {
    fn drop(&mut self) {
        self.teardown();
    }
}

struct SceneDriver<'a, 'b> {
    ctx: &'a LaneContext<'b>,
    events: &'a mut EventWriter,
    scenario: &'a Scenario,
    scenario_index: i64,
    socket_target: String,
    display: String,
    policy: PromptPolicy,
    prompt_loop: PromptLoop,
    last_command: Option<String>,
    recording_started: Instant,
    mask_intervals: Vec<(f64, f64)>,
}

enum StepVerdict {
    Passed,
    Failed { reason: String },
}

enum PolicyTick {
    Idle,
    Dispatched,
    Aborted(String),
}

impl SceneDriver<'_, '_> {
    fn screen(&self) -> StudioResult<String> {
        get_screen_text(&self.socket_target, &self.display)
    }

    fn emit(
        &mut self,
        step_index: i64,
        kind: EventKind,
        payload: Option<serde_json::Value>,
    ) -> StudioResult<()> {
        self.events
            .append(self.scenario_index, step_index, kind, payload)?;
        Ok(())
    }

    /// One policy tick: send the decided key and record the event.
    fn policy_tick(&mut self, step_index: i64, screen: &str) -> StudioResult<PolicyTick> {
        let decision =
            self.prompt_loop
                .observe(screen, &self.policy, self.last_command.as_deref());
        match decision {
            PromptDecision::Skip => Ok(PolicyTick::Idle),
            PromptDecision::Approve => {
                let key = self.policy.approve_key.clone();
                send_key(&self.socket_target, &self.display, &key)?;
                let rounds = self.prompt_loop.rounds();
                self.emit(
                    step_index,
                    EventKind::Approved,
                    Some(serde_json::json!({ "round": rounds, "key": key })),
                )?;
                Ok(PolicyTick::Dispatched)
            }
            PromptDecision::Deny => {
                let key = self.policy.deny_key.clone();
                send_key(&self.socket_target, &self.display, &key)?;
                let rounds = self.prompt_loop.rounds();
                self.emit(
                    step_index,
                    EventKind::Denied,
                    Some(serde_json::json!({ "round": rounds, "key": key })),
                )?;
                Ok(PolicyTick::Dispatched)
            }
            PromptDecision::Abort(reason) => {
                self.emit(
                    step_index,
                    EventKind::Failed,
                    Some(serde_json::json!({ "policy_abort": reason })),
                )?;
                Ok(PolicyTick::Aborted(reason))
            }
        }
    }

    /// Drain prompts after an interaction until the screen stops matching.
    fn drain_prompts(&mut self, step_index: i64) -> StudioResult<Result<(), String>> {
        loop {
            let screen = self.screen()?;
            match self.policy_tick(step_index, &screen)? {
                PolicyTick::Idle => return Ok(Ok(())),
                PolicyTick::Dispatched => std::thread::sleep(PROMPT_SETTLE),
                PolicyTick::Aborted(reason) => return Ok(Err(reason)),
            }
        }
    }

    fn eval_wait(&self, action: &Action, screen: &str) -> StudioResult<WaitOutcome> {
        let snapshot = Snapshot {
            screen: screen.to_string(),
            // The emulator's text buffer is the only surface here; the
            // stream tail aliases it so `default` waits stay meaningful.
            stream_tail: screen.to_string(),
        };
        match action {
            Action::WaitFor { target, mode, .. } => {
                Ok(evaluator::eval_wait_for(&snapshot, target, *mode))
            }
            Action::WaitScreenRegex { pattern, .. } => {
                evaluator::eval_wait_screen_regex(&snapshot, pattern)
            }
            Action::WaitLineRegex { pattern, .. } => {
                evaluator::eval_wait_line_regex(&snapshot, pattern)
            }
            _ => Err(StudioError::internal("not a wait action")),
        }
    }

    fn run_wait(&mut self, step_index: i64, step: &Step) -> StudioResult<StepVerdict> {
        let timeout = match &step.action {
            Action::WaitFor { timeout, .. }
            | Action::WaitScreenRegex { timeout, .. }
            | Action::WaitLineRegex { timeout, .. } => timeout
                .as_ref()
                .map(DurationSpec::as_duration)
                .or_else(|| step.timeout.as_ref().map(DurationSpec::as_duration))
                .unwrap_or(DEFAULT_WAIT_TIMEOUT),
            _ => DEFAULT_WAIT_TIMEOUT,
        };

        self.emit(step_index, EventKind::Waiting, None)?;
        let mut last_reason = "wait condition did not match".to_string();
        for _attempt in 0..=step.retries {
            let deadline = Instant::now() + timeout;
            loop {
                check_cancel(self.ctx.options)?;
                let screen = self.screen()?;
                match self.policy_tick(step_index, &screen)? {
                    PolicyTick::Dispatched => {
                        std::thread::sleep(PROMPT_SETTLE);
                        continue;
                    }
                    PolicyTick::Idle => {}
                    PolicyTick::Aborted(reason) => {
                        return Ok(StepVerdict::Failed {
                            reason,
                        })
                    }
                }
                match self.eval_wait(&step.action, &screen)? {
                    WaitOutcome::Satisfied(matched) => {
                        self.emit(
                            step_index,
                            EventKind::Passed,
                            Some(serde_json::json!({ "matched": matched })),
                        )?;
                        return Ok(StepVerdict::Passed);
                    }
                    WaitOutcome::Pending(reason) => last_reason = reason,
                }
                if Instant::now() >= deadline {
                    break;
                }
                std::thread::sleep(POLICY_TICK);
            }
        }
        self.emit(
            step_index,
            EventKind::TimedOut,
            Some(serde_json::json!({ "reason": last_reason })),
        )?;
        Ok(StepVerdict::Failed {
            reason: format!("timed_out: {last_reason}"),
        })
    }

    fn run_wait_stable(
        &mut self,
        step_index: i64,
        step: &Step,
        duration: Duration,
    ) -> StudioResult<StepVerdict> {
        self.emit(step_index, EventKind::Waiting, None)?;
        let deadline = Instant::now()
            + step
                .timeout
                .as_ref()
                .map_or(duration + DEFAULT_WAIT_TIMEOUT, DurationSpec::as_duration);
        let mut last_hash = evaluator::screen_hash(&self.screen()?);
        let mut stable_since = Instant::now();
        loop {
            check_cancel(self.ctx.options)?;
            std::thread::sleep(evaluator::SAMPLE_INTERVAL);
            let screen = self.screen()?;
            let hash = evaluator::screen_hash(&screen);
            if hash == last_hash {
                if stable_since.elapsed() >= duration {
                    self.emit(step_index, EventKind::Passed, None)?;
                    return Ok(StepVerdict::Passed);
                }
            } else {
                last_hash = hash;
                stable_since = Instant::now();
            }
            if Instant::now() >= deadline {
                self.emit(step_index, EventKind::TimedOut, None)?;
                return Ok(StepVerdict::Failed {
                    reason: "timed_out: screen did not become stable before deadline".to_string(),
                });
            }
        }
    }

    #[allow(clippy::too_many_lines)]
    fn run_step(&mut self, step_index: i64, step: &Step) -> StudioResult<StepVerdict> {
        let detail = match &step.action {
            Action::Command { text } | Action::Input { text } => {
                Some(self.ctx.redactor.redact(text))
            }
            Action::Key { token } | Action::Hotkey { token } => Some(token.clone()),
            _ => None,
        };
        self.emit(
            step_index,
            EventKind::Dispatched,
            Some(serde_json::json!({
                "action": step.action.label(),
                "detail": detail,
                "id": step.id,
            })),
        )?;

        let mask_sensitive = self.ctx.options.redaction == ResolvedRedaction::InputLine;
        let mask_start = self.recording_started.elapsed().as_secs_f64();
        let mut interacted = false;

        match &step.action {
            Action::ExpectExitCode { .. } => {
                self.emit(step_index, EventKind::Failed, None)?;
                return Ok(StepVerdict::Failed {
                    reason: "expect_exit_code is not supported in the visual lane; use screen \
                             assertions instead"
                        .to_string(),
                });
            }
            Action::Command { text } => {
                send_text(&self.socket_target, &self.display, text)?;
                send_key(&self.socket_target, &self.display, "enter")?;
                self.last_command = Some(text.clone());
                interacted = true;
                if mask_sensitive && text_contains_sensitive(text) {
                    self.mask_intervals.push((
                        mask_start,
                        self.recording_started.elapsed().as_secs_f64() + 0.5,
                    ));
                }
            }
            Action::Input { text } => {
                send_text(&self.socket_target, &self.display, text)?;
                interacted = true;
                if mask_sensitive && text_contains_sensitive(text) {
                    self.mask_intervals.push((
                        mask_start,
                        self.recording_started.elapsed().as_secs_f64() + 0.5,
                    ));
                }
            }
            Action::Key { token } | Action::Hotkey { token } => {
                send_key(&self.socket_target, &self.display, token)?;
                interacted = true;
            }
            Action::Sleep { duration } => {
                std::thread::sleep(duration.as_duration());
            }
            Action::WaitStable { duration } => {
                return self.run_wait_stable(step_index, step, duration.as_duration());
            }
            Action::WaitFor { .. }
            | Action::WaitScreenRegex { .. }
            | Action::WaitLineRegex { .. } => {
                return self.run_wait(step_index, step);
            }
            Action::AssertScreenRegex { pattern } => {
                self.emit(
                    step_index,
                    EventKind::Asserting,
                    Some(serde_json::json!({ "pattern": pattern })),
                )?;
                let screen = self.screen()?;
                return match evaluator::eval_assert_screen(&screen, pattern, false)? {
                    Ok(()) => {
                        self.emit(step_index, EventKind::Passed, None)?;
                        Ok(StepVerdict::Passed)
                    }
                    Err(reason) => {
                        self.emit(step_index, EventKind::Failed, None)?;
                        Ok(StepVerdict::Failed {
                            reason,
                        })
                    }
                };
            }
            Action::AssertNotScreenRegex { pattern } => {
                self.emit(
                    step_index,
                    EventKind::Asserting,
                    Some(serde_json::json!({ "pattern": pattern })),
                )?;
                let screen = self.screen()?;
                return match evaluator::eval_assert_screen(&screen, pattern, true)? {
                    Ok(()) => {
                        self.emit(step_index, EventKind::Passed, None)?;
                        Ok(StepVerdict::Passed)
                    }
                    Err(reason) => {
                        self.emit(step_index, EventKind::Failed, None)?;
                        Ok(StepVerdict::Failed {
                            reason,
                        })
                    }
                };
            }
        }

        if interacted {
            if let Err(reason) = self.drain_prompts(step_index)? {
                return Ok(StepVerdict::Failed {
                    reason,
                });
            }
        }

        self.emit(step_index, EventKind::Passed, None)?;
        Ok(StepVerdict::Passed)
    }
}

pub fn run(ctx: &LaneContext<'_>) -> StudioResult<LaneOutcome> {
    let mut outcome = LaneOutcome::default();
    outcome.counters.scenarios_total = ctx.screenplay.scenarios.len();
    outcome.counters.steps_total = ctx
        .screenplay
        .scenarios
        .iter()
        .map(|scenario| scenario.steps.len())
        .sum();

    let missing = missing_local_video_dependencies();
    if !missing.is_empty() {
        return Err(StudioError::tool_unavailable(format_video_dependency_help(
            &missing,
        )));
    }

    let mut events = EventWriter::new(ctx.layout)?;
    outcome.events_path = Some(events.path().to_path_buf());
    let log_path = ctx.layout.video_log_path();
    fs::write(&log_path, b"").map_err(|err| StudioError::io("failed to create video log", err))?;
    outcome.log_path = Some(log_path.clone());

    if let Some(failure) = run_preinstall(ctx, Some(&mut events)) {
        outcome.failure = Some(failure);
        return Ok(outcome);
    }

    let settings = &ctx.screenplay.settings;
    let mut scene_inputs: Vec<SceneInput> = Vec::new();

    'scenarios: for (scenario_index, scenario) in ctx.screenplay.scenarios.iter().enumerate() {
        check_cancel(ctx.options)?;
        let scenario_index_i64 = i64::try_from(scenario_index).unwrap_or(-1);

        if let Some(failure) =
            run_scenario_setup(ctx, scenario, scenario_index_i64, Some(&mut events))
        {
            outcome.failure = Some(failure);
            break 'scenarios;
        }

        let policy = resolve_prompt_policy(
            ctx.screenplay.agent_prompts.as_ref(),
            scenario.agent_prompts.as_ref(),
            ctx.env.agent_prompt_mode,
            ctx.options.agent_prompts,
        );
        // Lint findings are logged but do not gate the run; the decision
        // function itself refuses unscoped approvals at the first prompt.
        let lint = crate::lint::lint_prompt_policy(&policy, ctx.env.allow_unbounded_approve);
        for finding in &lint.findings {
            tracing::warn!(
                scenario = %scenario.label,
                code = %finding.code,
                "{}",
                finding.message
            );
        }

        let display = xvfb_display_id(scenario_index);
        let socket_dir = ctx
            .options
            .tmp_root
            .join(format!("kitty-socket-{scenario_index}"));
        fs::create_dir_all(&socket_dir)
            .map_err(|err| StudioError::io("failed to create socket dir", err))?;
        let socket_target = format!("unix:{}", socket_dir.join("kitty.sock").display());
        let scene_video = ctx
            .layout
            .scenes_dir
            .join(format!("scene_{scenario_index}.mp4"));

        let mut resources = SceneResources {
            xvfb: None,
            kitty: None,
            ffmpeg: None,
            socket_dir: Some(socket_dir),
        };

        let scene_result: StudioResult<Vec<(f64, f64)>> = (|| {
            resources.xvfb = Some(start_xvfb(
                &display,
                settings.width,
                settings.height,
                &log_path,
            )?);
            std::thread::sleep(Duration::from_millis(300));
            resources.kitty = Some(start_kitty(
                &socket_target,
                &display,
                &ctx.options.working_dir,
                &log_path,
            )?);
            wait_for_kitty_ready(&socket_target, &display)?;
            resources.ffmpeg = Some(start_ffmpeg(
                &display,
                settings.width,
                settings.height,
                settings.framerate,
                &scene_video,
                &log_path,
            )?);
            std::thread::sleep(Duration::from_millis(250));

            let mut driver = SceneDriver {
                ctx,
                events: &mut events,
                scenario,
                scenario_index: scenario_index_i64,
                socket_target: socket_target.clone(),
                display: display.clone(),
                policy,
                prompt_loop: PromptLoop::new(),
                last_command: None,
                recording_started: Instant::now(),
                mask_intervals: Vec::new(),
            };

            for (step_index, step) in scenario.steps.iter().enumerate() {
                let step_index_i64 = i64::try_from(step_index).unwrap_or(-1);
                match driver.run_step(step_index_i64, step)? {
                    StepVerdict::Passed => outcome.counters.steps_passed += 1,
                    StepVerdict::Failed { reason } => {
                        let screen = driver.screen().unwrap_or_default();
                        return Err(step_error(scenario, step_index_i64, step, reason, screen));
                    }
                }
            }

            std::thread::sleep(Duration::from_millis(200));
            Ok(driver.mask_intervals)
        })();

        // Teardown runs on both success and failure, each step independent.
        resources.teardown();

        match scene_result {
            Ok(mask_intervals) => {
                outcome.scenes.push(scene_video.clone());
                scene_inputs.push(SceneInput {
                    path: scene_video,
                    label: scenario.label.clone(),
                    mask_intervals,
                });
            }
            Err(err) => {
                outcome.failure = Some(failure_from_error(scenario, err));
                break 'scenarios;
            }
        }
    }

    if outcome.failure.is_some() {
        return Ok(outcome);
    }

    check_cancel(ctx.options)?;
    let stem = ctx.screenplay.output_stem();
    let final_mp4 = ctx.layout.media_dir.join(format!("{stem}.mp4"));
    let final_gif = ctx.layout.media_dir.join(format!("{stem}.gif"));
    let target_mp4 = if ctx.options.produce_mp4 {
        final_mp4.clone()
    } else {
        ctx.options.tmp_root.join(format!("{stem}.discard.mp4"))
    };
    let target_gif = ctx.options.produce_gif.then(|| final_gif.clone());
    let label_dir = ctx.options.tmp_root.join("labels");
    fs::create_dir_all(&label_dir)
        .map_err(|err| StudioError::io("failed to create label dir", err))?;

    if let Err(err) = Compositor::detect().compose(
        &scene_inputs,
        &target_mp4,
        target_gif.as_deref(),
        ctx.options.playback,
        HeaderMode::Auto,
        &label_dir,
    ) {
        outcome.failure = Some(LaneFailure::new(
            FailedStep {
                scenario: Some("compose".to_string()),
                step_index: Some(-1),
                action: Some("compose".to_string()),
                reason: err.to_string(),
            },
            String::new(),
        ));
        return Ok(outcome);
    }

    outcome.mp4 = ctx.options.produce_mp4.then_some(final_mp4);
    outcome.gif = ctx.options.produce_gif.then_some(final_gif);
    Ok(outcome)
}

/// Pack step-failure details into an error so the scene closure can use
/// one exit path; unpacked again by `failure_from_error`.
fn step_error(
    scenario: &Scenario,
    step_index: i64,
    step: &Step,
    reason: String,
    screen: String,
) -> StudioError {
    StudioError::step(
        reason,
        Some(serde_json::json!({
            "scenario": scenario.label,
            "step_index": step_index,
            "action": step.action.label(),
            "screen": screen,
        })),
    )
}

fn failure_from_error(scenario: &Scenario, err: StudioError) -> LaneFailure {
    let context = err.context.as_ref();
    let get_str = |key: &str| {
        context
            .and_then(|value| value.get(key))
            .and_then(serde_json::Value::as_str)
            .map(ToString::to_string)
    };
    let step_index = context
        .and_then(|value| value.get("step_index"))
        .and_then(serde_json::Value::as_i64);
    LaneFailure::new(
        FailedStep {
            scenario: get_str("scenario").or_else(|| Some(scenario.label.clone())),
            step_index: step_index.or(Some(-1)),
            action: get_str("action").or_else(|| Some("scenario_bootstrap".to_string())),
            reason: err.message,
        },
        get_str("screen").unwrap_or_default(),
    )
}
