//! Interactive lane: one persistent child shell per scenario on a
//! pseudoterminal, commands gated by explicit exit-code assertions.
//!
//! Output drains through a nonblocking reader into the stream tail and an
//! in-memory screen model. No media is produced; `events.jsonl` and
//! `summary.json` are the lane's outputs besides the failure bundle.

use crate::artifacts::EventWriter;
use crate::error::{StudioError, StudioResult};
use crate::evaluator::{
    self, Snapshot, StreamTail, WaitOutcome, DEFAULT_WAIT_TIMEOUT, SAMPLE_INTERVAL,
};
use crate::lanes::{
    check_cancel, run_preinstall, run_scenario_setup, LaneContext, LaneFailure, LaneOutcome,
};
use crate::model::run::FailedStep;
use crate::model::{Action, DurationSpec, Scenario, ShellKind, Step};
use crate::shells::interactive_shell_argv;
use crate::terminal::{Terminal, TerminalSize};
#[cfg(unix)]
use nix::fcntl::{fcntl, FcntlArg, OFlag};
#[cfg(unix)]
use nix::sys::signal::{killpg, Signal};
#[cfg(unix)]
use nix::unistd::Pid;
use portable_pty::{native_pty_system, CommandBuilder, PtySize};
use regex::Regex;
use std::io::{Read, Write};
use std::path::Path;
use std::time::{Duration, Instant};

const INTERACTIVE_UNSUPPORTED: &str = "interactive primitive unsupported in pty lane";
const RC_MARKER_PREFIX: &str = "__TDS_RC_";

/// Exit-status probe sent after each command; the shell runs it once the
/// command completes, so the marker carries that command's status.
fn exit_probe_command(shell: ShellKind, seq: u64) -> String {
    match shell {
        ShellKind::Fish => format!("printf '{RC_MARKER_PREFIX}{seq}__=%d\\n' $status"),
        ShellKind::Pwsh => {
            format!("Write-Output (\"{RC_MARKER_PREFIX}{seq}__=\" + $LASTEXITCODE)")
        }
        ShellKind::Cmd => format!("echo {RC_MARKER_PREFIX}{seq}__=%ERRORLEVEL%"),
        _ => format!("printf '{RC_MARKER_PREFIX}{seq}__=%d\\n' $?"),
    }
}

/// Drop probe markers (and their echoes) from evaluator-visible text.
fn strip_markers(text: &str) -> String {
    text.lines()
        .filter(|line| !line.contains(RC_MARKER_PREFIX))
        .collect::<Vec<_>>()
        .join("\n")
}

struct ShellSession {
    writer: Box<dyn Write + Send>,
    reader: Box<dyn Read + Send>,
    child: Box<dyn portable_pty::Child + Send + Sync>,
    _master: Box<dyn portable_pty::MasterPty + Send>,
    terminal: Terminal,
    tail: StreamTail,
    eof: bool,
}

impl ShellSession {
    fn spawn(shell: ShellKind, cwd: &Path, size: TerminalSize) -> StudioResult<Self> {
        let (program, args) = interactive_shell_argv(shell)?;
        let system = native_pty_system();
        let pair = system
            .openpty(PtySize {
                rows: size.rows,
                cols: size.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|err| StudioError::io("failed to open pty", err))?;

        let mut cmd = CommandBuilder::new(&program);
        cmd.args(&args);
        cmd.cwd(cwd);
        cmd.env("PS1", "$ ");
        cmd.env("TERM", "xterm-256color");

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|err| StudioError::io("failed to spawn shell", err))?;
        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|err| StudioError::io("failed to clone pty reader", err))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|err| StudioError::io("failed to take pty writer", err))?;

        #[cfg(unix)]
        {
            if let Some(fd) = pair.master.as_raw_fd() {
                let flags = OFlag::from_bits_truncate(
                    fcntl(fd, FcntlArg::F_GETFL)
                        .map_err(|err| StudioError::io("failed to get fd flags", err))?,
                );
                fcntl(fd, FcntlArg::F_SETFL(flags | OFlag::O_NONBLOCK))
                    .map_err(|err| StudioError::io("failed to set nonblocking", err))?;
            }
        }

        Ok(Self {
            writer,
            reader,
            child,
            _master: pair.master,
            terminal: Terminal::new(size),
            tail: StreamTail::new(),
            eof: false,
        })
    }

    /// Drain whatever the shell has produced since the last call.
    fn pump(&mut self) -> StudioResult<()> {
        let mut buffer = [0u8; 4096];
        loop {
            match self.reader.read(&mut buffer) {
                Ok(0) => {
                    self.eof = true;
                    return Ok(());
                }
                Ok(count) => {
                    self.terminal.process_bytes(&buffer[..count]);
                    self.tail.push(&buffer[..count]);
                }
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => return Ok(()),
                // The pty reader reports EIO once the child side closes.
                Err(err) if self.child_exited() => {
                    let _ = err;
                    self.eof = true;
                    return Ok(());
                }
                Err(err) => return Err(StudioError::io("failed to read pty", err)),
            }
        }
    }

    fn child_exited(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(Some(_)))
    }

    fn send_line(&mut self, text: &str) -> StudioResult<()> {
        self.writer
            .write_all(text.as_bytes())
            .and_then(|()| self.writer.write_all(b"\n"))
            .and_then(|()| self.writer.flush())
            .map_err(|err| StudioError::io("failed to write to shell", err))
    }

    /// Evaluator-visible snapshot (probe markers stripped).
    fn snapshot(&self) -> Snapshot {
        Snapshot {
            screen: strip_markers(&self.terminal.screen_text()),
            stream_tail: strip_markers(&self.tail.contents()),
        }
    }

    fn raw_tail(&self) -> String {
        self.tail.contents()
    }

    fn terminate(&mut self, grace: Duration) {
        #[cfg(unix)]
        if let Some(pid) = self.child.process_id() {
            #[allow(clippy::cast_possible_wrap)]
            let pgid = Pid::from_raw(pid as i32);
            let _ = killpg(pgid, Signal::SIGTERM);
            let deadline = Instant::now() + grace;
            while Instant::now() < deadline {
                if self.child_exited() {
                    return;
                }
                std::thread::sleep(Duration::from_millis(10));
            }
            let _ = killpg(pgid, Signal::SIGKILL);
            let _ = self.child.try_wait();
            return;
        }
        #[cfg(not(unix))]
        {
            let _ = grace;
        }
        let _ = self.child.kill();
    }
}

impl Drop for ShellSession {
    fn drop(&mut self) {
        self.terminate(Duration::from_millis(100));
    }
}

struct StepRunner<'a, 'b> {
    ctx: &'a LaneContext<'b>,
    session: ShellSession,
    events: &'a mut EventWriter,
    scenario: &'a Scenario,
    scenario_index: i64,
    last_exit_code: Option<i32>,
    probe_seq: u64,
}

enum StepVerdict {
    Passed,
    Failed { reason: String },
}

impl StepRunner<'_, '_> {
    fn step_deadline(&self, step: &Step, fallback: Duration) -> Duration {
        step.timeout
            .as_ref()
            .map_or(fallback, DurationSpec::as_duration)
    }

    fn emit(
        &mut self,
        step_index: i64,
        kind: crate::model::EventKind,
        payload: Option<serde_json::Value>,
    ) -> StudioResult<()> {
        self.events
            .append(self.scenario_index, step_index, kind, payload)?;
        Ok(())
    }

    fn run_step(&mut self, step_index: i64, step: &Step) -> StudioResult<StepVerdict> {
        use crate::model::EventKind as K;

        let detail = match &step.action {
            Action::Command { text } | Action::Input { text } => {
                Some(self.ctx.redactor.redact(text))
            }
            Action::Key { token } | Action::Hotkey { token } => Some(token.clone()),
            _ => None,
        };
        self.emit(
            step_index,
            K::Dispatched,
            Some(serde_json::json!({
                "action": step.action.label(),
                "detail": detail,
                "id": step.id,
            })),
        )?;

        match &step.action {
            Action::Input { .. } | Action::Key { .. } | Action::Hotkey { .. } => {
                self.emit(step_index, K::Failed, None)?;
                Ok(StepVerdict::Failed {
                    reason: INTERACTIVE_UNSUPPORTED.to_string(),
                })
            }
            Action::Command { text } => self.run_command(step_index, step, text),
            Action::ExpectExitCode { code } => {
                self.emit(step_index, K::Asserting, None)?;
                if self.last_exit_code == Some(*code) {
                    self.emit(
                        step_index,
                        K::Passed,
                        Some(serde_json::json!({ "exit_code": code })),
                    )?;
                    Ok(StepVerdict::Passed)
                } else {
                    self.emit(
                        step_index,
                        K::Failed,
                        Some(serde_json::json!({
                            "expected": code,
                            "actual": self.last_exit_code,
                        })),
                    )?;
                    Ok(StepVerdict::Failed {
                        reason: format!(
                            "expected exit_code={code}, got {}",
                            self.last_exit_code
                                .map_or_else(|| "none".to_string(), |c| c.to_string())
                        ),
                    })
                }
            }
            Action::Sleep { duration } => {
                std::thread::sleep(duration.as_duration());
                self.session.pump()?;
                self.emit(step_index, K::Passed, None)?;
                Ok(StepVerdict::Passed)
            }
            Action::WaitStable { duration } => {
                self.run_wait_stable(step_index, step, duration.as_duration())
            }
            Action::WaitFor { .. }
            | Action::WaitScreenRegex { .. }
            | Action::WaitLineRegex { .. } => self.run_wait(step_index, step),
            Action::AssertScreenRegex { pattern } => {
                self.run_assert(step_index, step, pattern, false)
            }
            Action::AssertNotScreenRegex { pattern } => {
                self.run_assert(step_index, step, pattern, true)
            }
        }
    }

    fn run_command(
        &mut self,
        step_index: i64,
        step: &Step,
        text: &str,
    ) -> StudioResult<StepVerdict> {
        use crate::model::EventKind as K;

        self.probe_seq += 1;
        let seq = self.probe_seq;
        self.session.send_line(text)?;
        self.session
            .send_line(&exit_probe_command(self.scenario.shell, seq))?;

        let marker = Regex::new(&format!("{RC_MARKER_PREFIX}{seq}__=(-?\\d+)"))
            .map_err(|err| StudioError::internal(format!("marker regex: {err}")))?;
        let deadline =
            Instant::now() + self.step_deadline(step, self.ctx.env.setup_timeout);
        loop {
            check_cancel(self.ctx.options)?;
            self.session.pump()?;
            if let Some(capture) = marker.captures(&self.session.raw_tail()) {
                self.last_exit_code = capture[1].parse::<i32>().ok();
                self.emit(
                    step_index,
                    K::Passed,
                    Some(serde_json::json!({ "exit_code": self.last_exit_code })),
                )?;
                return Ok(StepVerdict::Passed);
            }
            if self.session.eof {
                // Final evaluation already happened above; the stream is gone.
                self.emit(step_index, K::Failed, None)?;
                return Ok(StepVerdict::Failed {
                    reason: format!("shell exited while running command: {text}"),
                });
            }
            if Instant::now() >= deadline {
                self.emit(step_index, K::TimedOut, None)?;
                return Ok(StepVerdict::Failed {
                    reason: format!("timed_out: command did not complete before deadline: {text}"),
                });
            }
            std::thread::sleep(SAMPLE_INTERVAL);
        }
    }

    fn run_wait_stable(
        &mut self,
        step_index: i64,
        step: &Step,
        duration: Duration,
    ) -> StudioResult<StepVerdict> {
        use crate::model::EventKind as K;

        self.emit(step_index, K::Waiting, None)?;
        let deadline = Instant::now() + self.step_deadline(step, duration + DEFAULT_WAIT_TIMEOUT);
        self.session.pump()?;
        let mut last_hash = evaluator::screen_hash(&self.session.snapshot().screen);
        let mut stable_since = Instant::now();
        loop {
            check_cancel(self.ctx.options)?;
            std::thread::sleep(SAMPLE_INTERVAL);
            self.session.pump()?;
            let hash = evaluator::screen_hash(&self.session.snapshot().screen);
            if hash == last_hash {
                if stable_since.elapsed() >= duration {
                    self.emit(step_index, K::Passed, None)?;
                    return Ok(StepVerdict::Passed);
                }
            } else {
                last_hash = hash;
                stable_since = Instant::now();
            }
            if Instant::now() >= deadline {
                self.emit(step_index, K::TimedOut, None)?;
                return Ok(StepVerdict::Failed {
                    reason: "timed_out: screen did not become stable before deadline".to_string(),
                });
            }
        }
    }

    fn eval_wait(&self, action: &Action, snapshot: &Snapshot) -> StudioResult<WaitOutcome> {
        match action {
            Action::WaitFor { target, mode, .. } => {
                Ok(evaluator::eval_wait_for(snapshot, target, *mode))
            }
            Action::WaitScreenRegex { pattern, .. } => {
                evaluator::eval_wait_screen_regex(snapshot, pattern)
            }
            Action::WaitLineRegex { pattern, .. } => {
                evaluator::eval_wait_line_regex(snapshot, pattern)
            }
            _ => Err(StudioError::internal("not a wait action")),
        }
    }

    fn run_wait(&mut self, step_index: i64, step: &Step) -> StudioResult<StepVerdict> {
        use crate::model::EventKind as K;

        let timeout = match &step.action {
            Action::WaitFor { timeout, .. }
            | Action::WaitScreenRegex { timeout, .. }
            | Action::WaitLineRegex { timeout, .. } => timeout
                .as_ref()
                .map(DurationSpec::as_duration)
                .unwrap_or_else(|| self.step_deadline(step, DEFAULT_WAIT_TIMEOUT)),
            _ => DEFAULT_WAIT_TIMEOUT,
        };

        self.emit(step_index, K::Waiting, None)?;
        let mut last_reason = String::new();
        for _attempt in 0..=step.retries {
            let deadline = Instant::now() + timeout;
            loop {
                check_cancel(self.ctx.options)?;
                self.session.pump()?;
                let snapshot = self.session.snapshot();
                match self.eval_wait(&step.action, &snapshot)? {
                    WaitOutcome::Satisfied(matched) => {
                        self.emit(
                            step_index,
                            K::Passed,
                            Some(serde_json::json!({ "matched": matched })),
                        )?;
                        return Ok(StepVerdict::Passed);
                    }
                    WaitOutcome::Pending(reason) => last_reason = reason,
                }
                if self.session.eof {
                    // Stream closed: one final evaluation before timeout.
                    break;
                }
                if Instant::now() >= deadline {
                    break;
                }
                std::thread::sleep(SAMPLE_INTERVAL);
            }
            if self.session.eof {
                break;
            }
        }
        self.emit(
            step_index,
            K::TimedOut,
            Some(serde_json::json!({ "reason": last_reason })),
        )?;
        Ok(StepVerdict::Failed {
            reason: format!("timed_out: {last_reason}"),
        })
    }

    fn run_assert(
        &mut self,
        step_index: i64,
        step: &Step,
        pattern: &str,
        negated: bool,
    ) -> StudioResult<StepVerdict> {
        use crate::model::EventKind as K;

        self.emit(
            step_index,
            K::Asserting,
            Some(serde_json::json!({ "pattern": pattern })),
        )?;
        let mut last_failure = String::new();
        for attempt in 0..=step.retries {
            check_cancel(self.ctx.options)?;
            self.session.pump()?;
            let snapshot = self.session.snapshot();
            match evaluator::eval_assert_screen(&snapshot.screen, pattern, negated)? {
                Ok(()) => {
                    self.emit(step_index, K::Passed, None)?;
                    return Ok(StepVerdict::Passed);
                }
                Err(reason) => last_failure = reason,
            }
            if attempt < step.retries {
                std::thread::sleep(SAMPLE_INTERVAL);
            }
        }
        self.emit(step_index, K::Failed, None)?;
        Ok(StepVerdict::Failed {
            reason: last_failure,
        })
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

    let mut events = EventWriter::new(ctx.layout)?;
    outcome.events_path = Some(events.path().to_path_buf());

    if let Some(failure) = run_preinstall(ctx, Some(&mut events)) {
        outcome.failure = Some(failure);
        return Ok(outcome);
    }

    let size = TerminalSize::from_pixels(
        ctx.screenplay.settings.width,
        ctx.screenplay.settings.height,
        ctx.screenplay.settings.font_size,
        ctx.screenplay.settings.line_height,
    );

    'scenarios: for (scenario_index, scenario) in ctx.screenplay.scenarios.iter().enumerate() {
        let scenario_index_i64 = i64::try_from(scenario_index).unwrap_or(-1);
        if let Some(failure) =
            run_scenario_setup(ctx, scenario, scenario_index_i64, Some(&mut events))
        {
            outcome.failure = Some(failure);
            break 'scenarios;
        }

        let session = ShellSession::spawn(scenario.shell, &ctx.options.working_dir, size)?;
        let mut runner = StepRunner {
            ctx,
            session,
            events: &mut events,
            scenario,
            scenario_index: scenario_index_i64,
            last_exit_code: None,
            probe_seq: 0,
        };

        for (step_index, step) in scenario.steps.iter().enumerate() {
            let step_index_i64 = i64::try_from(step_index).unwrap_or(-1);
            match runner.run_step(step_index_i64, step)? {
                StepVerdict::Passed => outcome.counters.steps_passed += 1,
                StepVerdict::Failed { reason } => {
                    let screen = runner.session.snapshot().screen;
                    runner.session.terminate(Duration::from_millis(200));
                    outcome.failure = Some(LaneFailure::new(
                        FailedStep {
                            scenario: Some(scenario.label.clone()),
                            step_index: Some(step_index_i64),
                            action: Some(step.action.label().to_string()),
                            reason,
                        },
                        screen,
                    ));
                    break 'scenarios;
                }
            }
        }

        runner.session.terminate(Duration::from_millis(200));
    }

    Ok(outcome)
}
