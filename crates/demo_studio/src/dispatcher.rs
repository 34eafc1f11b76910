//! Dispatcher: resolves the effective lane and execution location, then
//! drives one run end to end.
//!
//! All environment configuration is resolved here, once, into an immutable
//! record. Fallback from local to container happens only on
//! tool-availability failures, never after a run has started.

use crate::artifacts::{create_run_layout, input_digest, write_manifest};
use crate::compose::PlaybackMode;
use crate::config::{CancelToken, EnvConfig};
use crate::docker::{run_in_docker, DockerRunRequest};
use crate::error::{validation_error, StudioError, StudioResult};
use crate::lanes::{self, complete_run, LaneContext, LaneFailure, LaneOptions, LaneOutcome};
use crate::model::run::FailedStep;
use crate::model::{
    load_screenplay_str, ExecutionMode, Lane, PromptMode, RunStatus, Screenplay,
};
use crate::redaction::{resolve_media_redaction_mode, MediaRedactionMode, Redactor};
use crate::shells::{binary_exists, run_command};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

/// Caller's lane preference.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LaneSelect {
    #[default]
    Auto,
    Lane(Lane),
}

/// Caller's location preference.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LocationSelect {
    #[default]
    Auto,
    Local,
    Docker,
}

/// One `run`/`render` invocation.
#[derive(Clone, Debug)]
pub struct RunRequest {
    pub screenplay_path: PathBuf,
    pub output_dir: Option<PathBuf>,
    pub mode: LaneSelect,
    pub location: LocationSelect,
    pub produce_mp4: bool,
    pub produce_gif: bool,
    pub playback: PlaybackMode,
    pub agent_prompts: Option<PromptMode>,
    pub redact: MediaRedactionMode,
    pub keep_temp: bool,
    pub rebuild: bool,
    pub cancel: CancelToken,
}

impl RunRequest {
    #[must_use]
    pub fn new(screenplay_path: PathBuf) -> Self {
        Self {
            screenplay_path,
            output_dir: None,
            mode: LaneSelect::Auto,
            location: LocationSelect::Auto,
            produce_mp4: true,
            produce_gif: true,
            playback: PlaybackMode::Sequential,
            agent_prompts: None,
            redact: MediaRedactionMode::Auto,
            keep_temp: false,
            rebuild: false,
            cancel: CancelToken::new(),
        }
    }
}

/// Result of a run, translated for the process boundary.
#[derive(Clone, Debug)]
pub struct RunReport {
    pub status: RunStatus,
    pub exit_code: i32,
    pub lane: Lane,
    pub run_dir: Option<PathBuf>,
    pub summary_path: Option<PathBuf>,
    pub events_path: Option<PathBuf>,
    pub mp4: Option<PathBuf>,
    pub gif: Option<PathBuf>,
}

/// Resolve the effective lane from the screenplay and caller preference.
pub fn resolve_lane(screenplay: &Screenplay, requested: LaneSelect) -> StudioResult<Lane> {
    match requested {
        LaneSelect::Lane(lane) => {
            for scenario in &screenplay.scenarios {
                let declared = Lane::from(scenario.execution_mode);
                // A scripted scenario runs in any lane; a scenario that
                // declared another mode must get that lane.
                if declared != lane && scenario.execution_mode != ExecutionMode::Scripted {
                    return Err(validation_error(&[crate::error::ValidationIssue::new(
                        "scenarios",
                        format!(
                            "scenario '{}' declares execution_mode {} which is incompatible \
                             with the requested {} lane",
                            scenario.label,
                            scenario.execution_mode.as_str(),
                            lane.as_str(),
                        ),
                    )]));
                }
            }
            Ok(lane)
        }
        LaneSelect::Auto => {
            let modes: Vec<ExecutionMode> = screenplay
                .scenarios
                .iter()
                .map(|scenario| scenario.execution_mode)
                .collect();
            if modes.contains(&ExecutionMode::Visual) {
                Ok(Lane::Visual)
            } else if modes.contains(&ExecutionMode::Interactive) {
                Ok(Lane::Interactive)
            } else {
                Ok(Lane::Scripted)
            }
        }
    }
}

fn local_tools_missing(lane: Lane) -> Vec<&'static str> {
    let required: &[&str] = match lane {
        Lane::Scripted => &["vhs", "ffmpeg", "ffprobe"],
        Lane::Visual => &["kitty", "kitten", "Xvfb", "ffmpeg", "ffprobe"],
        Lane::Interactive => &[],
    };
    required
        .iter()
        .copied()
        .filter(|binary| !binary_exists(binary))
        .collect()
}

fn collect_tool_versions(lane: Lane) -> BTreeMap<String, String> {
    let mut versions = BTreeMap::new();
    let probes: &[(&str, &[&str])] = match lane {
        Lane::Scripted => &[("vhs", &["--version"]), ("ffmpeg", &["-version"])],
        Lane::Visual => &[("kitty", &["--version"]), ("ffmpeg", &["-version"])],
        Lane::Interactive => &[],
    };
    for (tool, args) in probes {
        let mut argv = vec![(*tool).to_string()];
        argv.extend(args.iter().map(ToString::to_string));
        if let Ok((output, 0)) = run_command(&argv, None) {
            if let Some(line) = output.lines().next() {
                versions.insert((*tool).to_string(), line.trim().to_string());
            }
        }
    }
    versions
}

/// Find the project root for container execution (nearest ancestor of the
/// screenplay carrying a Dockerfile).
fn docker_project_root(screenplay_path: &Path) -> Option<PathBuf> {
    let start = screenplay_path.canonicalize().ok()?;
    let mut dir = start.parent()?;
    loop {
        if dir.join("Dockerfile").exists() {
            return Some(dir.to_path_buf());
        }
        dir = dir.parent()?;
    }
}

/// Execute a run request. Validation failures surface as `Err` before any
/// run directory exists; execution failures produce a failed report with
/// the failure bundle in place.
pub fn run(request: &RunRequest) -> StudioResult<RunReport> {
    let env = EnvConfig::from_env();

    let raw = std::fs::read_to_string(&request.screenplay_path)
        .map_err(|err| StudioError::io("failed to read screenplay", err))?;
    let digest = input_digest(raw.as_bytes());

    let tmp_dir = tempfile::Builder::new()
        .prefix("terminal-demo-studio-")
        .tempdir()
        .map_err(|err| StudioError::io("failed to create temp dir", err))?;

    let screenplay = load_screenplay_str(&raw, &tmp_dir.path().display().to_string())
        .map_err(|issues| validation_error(&issues))?;
    let lane = resolve_lane(&screenplay, request.mode)?;
    info!(lane = lane.as_str(), "resolved execution lane");

    let location = resolve_location(&request.location, lane, &env, &request.screenplay_path)?;
    if let Location::Docker(project_root) = location {
        return run_docker(request, &env, lane, &project_root);
    }

    let run_root = request
        .output_dir
        .clone()
        .or_else(|| {
            request
                .screenplay_path
                .canonicalize()
                .ok()
                .and_then(|path| path.parent().map(Path::to_path_buf))
        })
        .unwrap_or_else(|| PathBuf::from("."));
    let layout = create_run_layout(&run_root, lane)?;
    write_manifest(
        &layout,
        &request.screenplay_path,
        &digest,
        &screenplay.settings,
        &collect_tool_versions(lane),
    )?;

    let redactor = Redactor::from_sources(&screenplay.variables, &env.sensitive_name_suffixes);
    let working_dir = request
        .screenplay_path
        .canonicalize()
        .ok()
        .and_then(|path| path.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."));

    let tmp_root = if request.keep_temp {
        // Promote the scratch root into the run directory so it survives.
        let kept = layout.run_dir.join("tmp");
        std::fs::create_dir_all(&kept)
            .map_err(|err| StudioError::io("failed to create tmp dir", err))?;
        drop(tmp_dir);
        kept
    } else {
        tmp_dir.path().to_path_buf()
    };

    let options = LaneOptions {
        playback: request.playback,
        produce_mp4: request.produce_mp4,
        produce_gif: request.produce_gif,
        agent_prompts: request.agent_prompts,
        redaction: resolve_media_redaction_mode(&screenplay, request.redact),
        keep_temp: request.keep_temp,
        cancel: request.cancel.clone(),
        working_dir,
        tmp_root,
    };
    let ctx = LaneContext {
        screenplay: &screenplay,
        screenplay_path: &request.screenplay_path,
        layout: &layout,
        env: &env,
        redactor: &redactor,
        options: &options,
    };

    let started = Instant::now();
    let lane_result = match lane {
        Lane::Scripted => lanes::scripted::run(&ctx),
        Lane::Interactive => lanes::pty::run(&ctx),
        Lane::Visual => lanes::video::run(&ctx),
    };

    let (outcome, exit_override) = match lane_result {
        Ok(outcome) => (outcome, None),
        Err(err) => {
            debug!(code = %err.code, "lane aborted");
            let reason = if err.code == "E_CANCELLED" {
                "cancelled".to_string()
            } else {
                err.to_string()
            };
            let mut outcome = LaneOutcome::default();
            outcome.failure = Some(LaneFailure::new(
                FailedStep {
                    scenario: None,
                    step_index: Some(-1),
                    action: None,
                    reason,
                },
                String::new(),
            ));
            (outcome, Some(err.exit_code()))
        }
    };

    let status = complete_run(&ctx, &outcome, started)?;
    let exit_code = match status {
        RunStatus::Success => 0,
        RunStatus::Failed => exit_override.unwrap_or(1),
    };

    Ok(RunReport {
        status,
        exit_code,
        lane,
        run_dir: Some(layout.run_dir.clone()),
        summary_path: Some(layout.summary_path.clone()),
        events_path: outcome.events_path.clone(),
        mp4: outcome.mp4.clone(),
        gif: outcome.gif.clone(),
    })
}

enum Location {
    Local,
    Docker(PathBuf),
}

fn resolve_location(
    requested: &LocationSelect,
    lane: Lane,
    env: &EnvConfig,
    screenplay_path: &Path,
) -> StudioResult<Location> {
    if lane == Lane::Interactive {
        // The PTY lane always runs where the caller is.
        return match requested {
            LocationSelect::Docker => Err(StudioError::validation(
                "the interactive lane runs locally only",
            )),
            _ => Ok(Location::Local),
        };
    }

    match requested {
        LocationSelect::Local => {
            let missing = local_tools_missing(lane);
            if missing.is_empty() {
                Ok(Location::Local)
            } else {
                Err(StudioError::tool_unavailable(format!(
                    "missing local tools for the {} lane: {}",
                    lane.as_str(),
                    missing.join(", ")
                )))
            }
        }
        LocationSelect::Docker => {
            crate::docker::ensure_docker_reachable()?;
            let project_root = docker_project_root(screenplay_path).ok_or_else(|| {
                StudioError::tool_unavailable(
                    "no Dockerfile found above the screenplay; container mode needs a project \
                     root with a Dockerfile",
                )
            })?;
            Ok(Location::Docker(project_root))
        }
        LocationSelect::Auto => {
            if env.in_container {
                return Ok(Location::Local);
            }
            let missing = local_tools_missing(lane);
            if missing.is_empty() {
                return Ok(Location::Local);
            }
            // Fallback is tool-availability only.
            if crate::docker::ensure_docker_reachable().is_ok() {
                if let Some(project_root) = docker_project_root(screenplay_path) {
                    info!("local tools missing; falling back to container execution");
                    return Ok(Location::Docker(project_root));
                }
            }
            Err(StudioError::tool_unavailable(format!(
                "missing local tools for the {} lane: {} (and Docker is not available as a \
                 fallback)",
                lane.as_str(),
                missing.join(", ")
            )))
        }
    }
}

fn run_docker(
    request: &RunRequest,
    env: &EnvConfig,
    lane: Lane,
    project_root: &Path,
) -> StudioResult<RunReport> {
    let docker_request = DockerRunRequest {
        screenplay_path: request.screenplay_path.clone(),
        project_root: project_root.to_path_buf(),
        output_dir: request.output_dir.clone(),
        lane,
        playback: request.playback,
        agent_prompts: request.agent_prompts,
        redact: request.redact,
        produce_mp4: request.produce_mp4,
        produce_gif: request.produce_gif,
        keep_temp: request.keep_temp,
        rebuild: request.rebuild,
    };
    let output = run_in_docker(&docker_request, env)?;

    // Re-emit the stdout contract with host-mapped paths.
    let status = match output.status.as_deref() {
        Some("failed") => RunStatus::Failed,
        _ => RunStatus::Success,
    };
    println!("STATUS={}", status.as_str());
    if let Some(run_dir) = &output.run_dir {
        println!("RUN_DIR={}", run_dir.display());
    }
    if let Some(gif) = &output.media_gif {
        println!("MEDIA_GIF={}", gif.display());
    }
    if let Some(mp4) = &output.media_mp4 {
        println!("MEDIA_MP4={}", mp4.display());
    }
    if let Some(summary) = &output.summary {
        println!("SUMMARY={}", summary.display());
    }
    if let Some(events) = &output.events {
        println!("EVENTS={}", events.display());
    }

    Ok(RunReport {
        status,
        exit_code: i32::from(status == RunStatus::Failed),
        lane,
        run_dir: output.run_dir,
        summary_path: output.summary,
        events_path: output.events,
        mp4: output.media_mp4,
        gif: output.media_gif,
    })
}

/// Load and validate a screenplay for `validate`/`lint`, using a throwaway
/// interpolation target.
pub fn load_for_inspection(path: &Path) -> StudioResult<Screenplay> {
    let raw = std::fs::read_to_string(path)
        .map_err(|err| StudioError::io("failed to read screenplay", err))?;
    let tmp = std::env::temp_dir();
    load_screenplay_str(&raw, &tmp.display().to_string())
        .map_err(|issues| validation_error(&issues))
}

/// The validation issues themselves, for `validate --explain` output.
pub fn validate_file(path: &Path) -> StudioResult<Result<Screenplay, Vec<crate::error::ValidationIssue>>> {
    let raw = std::fs::read_to_string(path)
        .map_err(|err| StudioError::io("failed to read screenplay", err))?;
    let tmp = std::env::temp_dir();
    Ok(load_screenplay_str(&raw, &tmp.display().to_string()))
}
