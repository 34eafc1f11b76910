//! Canonical run directory: layout, manifest, summary, events, failure bundle.
//!
//! The run directory is the unit of isolation; only this module mutates it.
//! Manifest and summary are written atomically (write-then-rename); events
//! are appended line-by-line as self-contained JSON.

use crate::error::{StudioError, StudioResult};
use crate::model::run::{EventKind, FailedStep, Lane, RunEvent, Summary};
use crate::model::{RunId, Settings};
use crate::redaction::Redactor;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Directory under the run root that holds all runs.
pub const RUNS_DIR_NAME: &str = ".terminal_demo_studio_runs";

/// Paths of one run directory. Lane-specific subdirectories are created by
/// the lane that needs them; `failure/` is created only on failure.
#[derive(Clone, Debug)]
pub struct RunLayout {
    pub run_id: String,
    pub lane: Lane,
    pub run_dir: PathBuf,
    pub manifest_path: PathBuf,
    pub summary_path: PathBuf,
    pub media_dir: PathBuf,
    pub scenes_dir: PathBuf,
    pub tapes_dir: PathBuf,
    pub runtime_dir: PathBuf,
    pub failure_dir: PathBuf,
}

impl RunLayout {
    #[must_use]
    pub fn events_path(&self) -> PathBuf {
        self.runtime_dir.join("events.jsonl")
    }

    #[must_use]
    pub fn video_log_path(&self) -> PathBuf {
        self.runtime_dir.join("video_runner.log")
    }
}

/// Create the run directory under `<run_root>/.terminal_demo_studio_runs/`.
pub fn create_run_layout(run_root: &Path, lane: Lane) -> StudioResult<RunLayout> {
    let run_id = format!("run-{}", RunId::new());
    let run_dir = run_root.join(RUNS_DIR_NAME).join(&run_id);
    let media_dir = run_dir.join("media");
    fs::create_dir_all(&media_dir)
        .map_err(|err| StudioError::io("failed to create run directory", err))?;

    Ok(RunLayout {
        manifest_path: run_dir.join("manifest.json"),
        summary_path: run_dir.join("summary.json"),
        scenes_dir: run_dir.join("scenes"),
        tapes_dir: run_dir.join("tapes"),
        runtime_dir: run_dir.join("runtime"),
        failure_dir: run_dir.join("failure"),
        run_id,
        lane,
        run_dir,
        media_dir,
    })
}

/// SHA-256 digest of the screenplay input, recorded in the manifest.
#[must_use]
pub fn input_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Serialize)]
struct Manifest<'a> {
    run_id: &'a str,
    lane: Lane,
    screenplay: String,
    input_digest: &'a str,
    settings: &'a Settings,
    tool_versions: &'a BTreeMap<String, String>,
}

pub fn write_manifest(
    layout: &RunLayout,
    screenplay_path: &Path,
    digest: &str,
    settings: &Settings,
    tool_versions: &BTreeMap<String, String>,
) -> StudioResult<()> {
    let manifest = Manifest {
        run_id: &layout.run_id,
        lane: layout.lane,
        screenplay: screenplay_path.display().to_string(),
        input_digest: digest,
        settings,
        tool_versions,
    };
    write_json_atomic(&layout.manifest_path, &manifest)
}

pub fn write_summary(layout: &RunLayout, summary: &Summary) -> StudioResult<()> {
    write_json_atomic(&layout.summary_path, summary)
}

/// Atomic JSON write: temp file in the same directory, then rename.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> StudioResult<()> {
    let data = serde_json::to_vec_pretty(value)
        .map_err(|err| StudioError::io("failed to serialize artifact", err))?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, data).map_err(|err| StudioError::io("failed to write artifact", err))?;
    fs::rename(&tmp_path, path).map_err(|err| StudioError::io("failed to publish artifact", err))
}

/// Append-only writer for `runtime/events.jsonl`.
///
/// Sequence numbers are strictly monotonic and timestamps never move
/// backward (both derive from a single `Instant`).
pub struct EventWriter {
    file: fs::File,
    path: PathBuf,
    seq: u64,
    started: Instant,
}

impl EventWriter {
    pub fn new(layout: &RunLayout) -> StudioResult<Self> {
        fs::create_dir_all(&layout.runtime_dir)
            .map_err(|err| StudioError::io("failed to create runtime directory", err))?;
        let path = layout.events_path();
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|err| StudioError::io("failed to open events log", err))?;
        Ok(Self {
            file,
            path,
            seq: 0,
            started: Instant::now(),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(
        &mut self,
        scenario: i64,
        step: i64,
        kind: EventKind,
        payload: Option<Value>,
    ) -> StudioResult<RunEvent> {
        self.seq += 1;
        #[allow(clippy::cast_possible_truncation)]
        let ts_ms = self.started.elapsed().as_millis() as u64;
        let event = RunEvent {
            seq: self.seq,
            scenario,
            step,
            kind,
            ts_ms,
            payload,
        };
        let line = serde_json::to_string(&event)
            .map_err(|err| StudioError::io("failed to encode event", err))?;
        self.file
            .write_all(line.as_bytes())
            .and_then(|()| self.file.write_all(b"\n"))
            .and_then(|()| self.file.flush())
            .map_err(|err| StudioError::io("failed to append event", err))?;
        Ok(event)
    }
}

/// Write the failure bundle. Everything that lands here passes through the
/// redactor first; calling this twice keeps the first bundle.
pub fn write_failure_bundle(
    layout: &RunLayout,
    redactor: &Redactor,
    screen_text: &str,
    failed: &FailedStep,
    log_path: Option<&Path>,
) -> StudioResult<PathBuf> {
    let failure_dir = &layout.failure_dir;
    if failure_dir.join("reason.txt").exists() {
        return Ok(failure_dir.clone());
    }
    fs::create_dir_all(failure_dir)
        .map_err(|err| StudioError::io("failed to create failure directory", err))?;

    let reason = redactor.redact(&failed.reason);
    fs::write(failure_dir.join("reason.txt"), &reason)
        .map_err(|err| StudioError::io("failed to write reason.txt", err))?;
    fs::write(failure_dir.join("screen.txt"), redactor.redact(screen_text))
        .map_err(|err| StudioError::io("failed to write screen.txt", err))?;

    if failed.step_index.is_some() {
        let payload = serde_json::json!({
            "scenario": failed.scenario,
            "step_index": failed.step_index,
            "action": failed.action,
            "reason": reason,
        });
        let data = serde_json::to_vec_pretty(&payload)
            .map_err(|err| StudioError::io("failed to encode step.json", err))?;
        fs::write(failure_dir.join("step.json"), data)
            .map_err(|err| StudioError::io("failed to write step.json", err))?;
    }

    if let Some(log_path) = log_path {
        if let Ok(contents) = fs::read_to_string(log_path) {
            fs::write(
                failure_dir.join("video_runner.log"),
                redactor.redact(&contents),
            )
            .map_err(|err| StudioError::io("failed to write video_runner.log", err))?;
        }
    }

    Ok(failure_dir.clone())
}

/// Emit the `KEY=VALUE` stdout contract for external tools.
pub fn emit_stdout_contract(layout: &RunLayout, summary: &Summary) {
    println!("STATUS={}", summary.status.as_str());
    println!("RUN_DIR={}", layout.run_dir.display());
    if let Some(gif) = &summary.media.gif {
        println!("MEDIA_GIF={gif}");
    }
    if let Some(mp4) = &summary.media.mp4 {
        println!("MEDIA_MP4={mp4}");
    }
    println!("SUMMARY={}", layout.summary_path.display());
    if let Some(events) = &summary.events {
        println!("EVENTS={events}");
    }
}
