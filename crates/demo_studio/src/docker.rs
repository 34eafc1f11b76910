//! Container execution for the scripted and visual lanes.
//!
//! The image is content-addressed: a tag derived from the Dockerfile,
//! assets, and sources, so rebuilds happen only when inputs change. Old
//! images are pruned to a configurable retention count.

use crate::compose::PlaybackMode;
use crate::config::EnvConfig;
use crate::error::{StudioError, StudioResult};
use crate::model::{Lane, PromptMode};
use crate::redaction::MediaRedactionMode;
use crate::shells::run_command;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const IMAGE_NAME: &str = "terminal-demo-studio";
const WORKSPACE_MOUNT: &str = "/workspace";

/// Outcome of a containerized run, mapped back to host paths.
#[derive(Clone, Debug, Default)]
pub struct DockerRunOutput {
    pub status: Option<String>,
    pub run_dir: Option<PathBuf>,
    pub events: Option<PathBuf>,
    pub summary: Option<PathBuf>,
    pub media_mp4: Option<PathBuf>,
    pub media_gif: Option<PathBuf>,
}

/// Request for one containerized run.
#[derive(Clone, Debug)]
pub struct DockerRunRequest {
    pub screenplay_path: PathBuf,
    pub project_root: PathBuf,
    pub output_dir: Option<PathBuf>,
    pub lane: Lane,
    pub playback: PlaybackMode,
    pub agent_prompts: Option<PromptMode>,
    pub redact: MediaRedactionMode,
    pub produce_mp4: bool,
    pub produce_gif: bool,
    pub keep_temp: bool,
    pub rebuild: bool,
}

/// Fail fast when the docker daemon is unreachable.
pub fn ensure_docker_reachable() -> StudioResult<()> {
    let argv: Vec<String> = ["docker", "info"].map(String::from).to_vec();
    match run_command(&argv, None) {
        Ok((_, 0)) => Ok(()),
        Ok((output, _)) => Err(StudioError::tool_unavailable(clean_docker_message(&output))),
        Err(_) => Err(StudioError::tool_unavailable(
            "Docker CLI not found. Install Docker or run with --local.",
        )),
    }
}

fn clean_docker_message(raw: &str) -> String {
    let filtered: Vec<&str> = raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.to_ascii_lowercase().contains("pretty printing info"))
        .collect();
    if filtered.is_empty() {
        raw.trim().to_string()
    } else {
        filtered.join("\n")
    }
}

fn hash_files(base: &Path, paths: &mut Vec<PathBuf>) -> StudioResult<String> {
    paths.sort();
    let mut digest = Sha256::new();
    for path in paths.iter() {
        let relative = path
            .strip_prefix(base)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");
        digest.update(relative.as_bytes());
        let bytes =
            std::fs::read(path).map_err(|err| StudioError::io("failed to hash input", err))?;
        digest.update(&bytes);
    }
    Ok(format!("{:x}", digest.finalize()))
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            if path.file_name().is_some_and(|name| name == "target") {
                continue;
            }
            collect_files(&path, out);
        } else if path.is_file() {
            out.push(path);
        }
    }
}

/// Content-addressed image tag for the project root.
pub fn compute_image_tag(project_root: &Path) -> StudioResult<String> {
    let mut files = Vec::new();
    for name in ["Dockerfile", "Cargo.toml", "Cargo.lock"] {
        let candidate = project_root.join(name);
        if candidate.exists() {
            files.push(candidate);
        }
    }
    for dir in ["assets", "crates"] {
        let candidate = project_root.join(dir);
        if candidate.exists() {
            collect_files(&candidate, &mut files);
        }
    }
    if files.is_empty() {
        return Err(StudioError::tool_unavailable(format!(
            "no Docker inputs found under {}",
            project_root.display()
        )));
    }
    let digest = hash_files(project_root, &mut files)?;
    Ok(format!("{IMAGE_NAME}:v1-{}", &digest[..12]))
}

fn image_exists(tag: &str) -> bool {
    let argv: Vec<String> = ["docker", "image", "inspect", tag].map(String::from).to_vec();
    matches!(run_command(&argv, None), Ok((_, 0)))
}

/// Build the image if its content tag is not present yet.
pub fn ensure_image(project_root: &Path, rebuild: bool) -> StudioResult<String> {
    ensure_docker_reachable()?;
    let dockerfile = project_root.join("Dockerfile");
    if !dockerfile.exists() {
        return Err(StudioError::tool_unavailable(format!(
            "missing Dockerfile at {}",
            dockerfile.display()
        )));
    }
    let tag = compute_image_tag(project_root)?;
    if !rebuild && image_exists(&tag) {
        return Ok(tag);
    }
    let argv: Vec<String> = [
        "docker",
        "build",
        "-f",
        &dockerfile.display().to_string(),
        "-t",
        &tag,
        &project_root.display().to_string(),
    ]
    .map(String::from)
    .to_vec();
    let (output, code) = run_command(&argv, None)?;
    if code != 0 {
        return Err(StudioError::tool_unavailable(format!(
            "docker build failed: {}",
            output.trim()
        )));
    }
    Ok(tag)
}

/// Remove stale content-addressed images beyond the retention count.
pub fn prune_old_images(retention: usize, keep_tag: &str) {
    let argv: Vec<String> = [
        "docker",
        "image",
        "ls",
        IMAGE_NAME,
        "--format",
        "{{.Repository}}:{{.Tag}}",
    ]
    .map(String::from)
    .to_vec();
    let Ok((output, 0)) = run_command(&argv, None) else {
        return;
    };
    // `docker image ls` lists newest first.
    let stale: Vec<&str> = output
        .lines()
        .map(str::trim)
        .filter(|tag| !tag.is_empty() && *tag != keep_tag)
        .skip(retention.saturating_sub(1))
        .collect();
    for tag in stale {
        let argv: Vec<String> = ["docker", "image", "rm", tag].map(String::from).to_vec();
        let _ = run_command(&argv, None);
    }
}

fn container_path_to_host(value: &str, project_root: &Path) -> PathBuf {
    let normalized = value.replace('\\', "/");
    if normalized == WORKSPACE_MOUNT {
        return project_root.to_path_buf();
    }
    if let Some(relative) = normalized.strip_prefix("/workspace/") {
        let mut mapped = project_root.to_path_buf();
        for part in relative.split('/').filter(|part| !part.is_empty()) {
            mapped.push(part);
        }
        return mapped;
    }
    PathBuf::from(value)
}

/// Parse the container's `KEY=VALUE` stdout lines back to host paths.
#[must_use]
pub fn parse_result_output(stdout: &str, project_root: &Path) -> DockerRunOutput {
    let mut parsed = DockerRunOutput::default();
    for line in stdout.lines() {
        if let Some(value) = line.strip_prefix("STATUS=") {
            parsed.status = Some(value.to_string());
        } else if let Some(value) = line.strip_prefix("RUN_DIR=") {
            parsed.run_dir = Some(container_path_to_host(value, project_root));
        } else if let Some(value) = line.strip_prefix("EVENTS=") {
            parsed.events = Some(container_path_to_host(value, project_root));
        } else if let Some(value) = line.strip_prefix("SUMMARY=") {
            parsed.summary = Some(container_path_to_host(value, project_root));
        } else if let Some(value) = line.strip_prefix("MEDIA_MP4=") {
            parsed.media_mp4 = Some(container_path_to_host(value, project_root));
        } else if let Some(value) = line.strip_prefix("MEDIA_GIF=") {
            parsed.media_gif = Some(container_path_to_host(value, project_root));
        }
    }
    parsed
}

fn map_workspace_strings(value: &serde_json::Value, project_root: &Path) -> serde_json::Value {
    match value {
        serde_json::Value::String(text) => {
            let normalized = text.replace('\\', "/");
            if normalized == WORKSPACE_MOUNT || normalized.starts_with("/workspace/") {
                serde_json::Value::String(
                    container_path_to_host(text, project_root)
                        .display()
                        .to_string(),
                )
            } else {
                value.clone()
            }
        }
        serde_json::Value::Array(items) => serde_json::Value::Array(
            items
                .iter()
                .map(|item| map_workspace_strings(item, project_root))
                .collect(),
        ),
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.iter()
                .map(|(key, item)| (key.clone(), map_workspace_strings(item, project_root)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn rewrite_summary_paths(summary_path: &Path, project_root: &Path) {
    let Ok(raw) = std::fs::read_to_string(summary_path) else {
        return;
    };
    let Ok(payload) = serde_json::from_str::<serde_json::Value>(&raw) else {
        return;
    };
    let mapped = map_workspace_strings(&payload, project_root);
    if mapped != payload {
        if let Ok(data) = serde_json::to_vec_pretty(&mapped) {
            let _ = std::fs::write(summary_path, data);
        }
    }
}

fn hardening_flags(env: &EnvConfig) -> Vec<String> {
    if !env.docker_hardening {
        return Vec::new();
    }
    let mut flags: Vec<String> = [
        "--security-opt",
        "no-new-privileges=true",
        "--cap-drop",
        "ALL",
    ]
    .map(String::from)
    .to_vec();
    if !env.docker_pids_limit.is_empty() {
        flags.push("--pids-limit".to_string());
        flags.push(env.docker_pids_limit.clone());
    }
    flags
}

/// Run the screenplay inside the container and map results back.
pub fn run_in_docker(
    request: &DockerRunRequest,
    env: &EnvConfig,
) -> StudioResult<DockerRunOutput> {
    let project_root = &request.project_root;
    let tag = ensure_image(project_root, request.rebuild)?;
    prune_old_images(env.docker_image_retention, &tag);

    let screenplay_abs = request
        .screenplay_path
        .canonicalize()
        .map_err(|err| StudioError::io("failed to resolve screenplay path", err))?;
    let screenplay_rel = screenplay_abs.strip_prefix(project_root).map_err(|_| {
        StudioError::tool_unavailable(format!(
            "screenplay must be inside the project root: {}",
            project_root.display()
        ))
    })?;

    let mut argv: Vec<String> = [
        "docker",
        "run",
        "--rm",
        "-v",
        &format!("{}:{WORKSPACE_MOUNT}", project_root.display()),
        "-w",
        WORKSPACE_MOUNT,
    ]
    .map(String::from)
    .to_vec();
    argv.extend(hardening_flags(env));
    if let Some(network) = &env.docker_network {
        argv.push("--network".to_string());
        argv.push(network.clone());
    }
    if env.docker_read_only {
        argv.extend(
            [
                "--read-only",
                "--tmpfs",
                "/tmp:rw,nosuid,nodev,size=256m",
                "-e",
                "HOME=/tmp",
            ]
            .map(String::from),
        );
    }
    argv.push("-e".to_string());
    argv.push("TERMINAL_DEMO_STUDIO_IN_CONTAINER=1".to_string());

    let container_screenplay = format!(
        "{WORKSPACE_MOUNT}/{}",
        screenplay_rel.to_string_lossy().replace('\\', "/")
    );
    argv.push(tag.clone());
    argv.extend(
        [
            "tds",
            "run",
            &container_screenplay,
            "--local",
            "--mode",
            request.lane.as_str(),
            "--playback",
            request.playback.as_str(),
        ]
        .map(String::from),
    );
    if let Some(mode) = request.agent_prompts {
        argv.push("--agent-prompts".to_string());
        argv.push(mode.as_str().to_string());
    }
    argv.push("--redact".to_string());
    argv.push(
        match request.redact {
            MediaRedactionMode::Auto => "auto",
            MediaRedactionMode::Off => "off",
            MediaRedactionMode::InputLine => "input_line",
        }
        .to_string(),
    );
    if let Some(output_dir) = &request.output_dir {
        let output_abs = output_dir
            .canonicalize()
            .unwrap_or_else(|_| output_dir.clone());
        let output_rel = output_abs.strip_prefix(project_root).map_err(|_| {
            StudioError::tool_unavailable(format!(
                "output directory must be inside the project root: {}",
                project_root.display()
            ))
        })?;
        argv.push("--output-dir".to_string());
        argv.push(format!(
            "{WORKSPACE_MOUNT}/{}",
            output_rel.to_string_lossy().replace('\\', "/")
        ));
    }
    if request.keep_temp {
        argv.push("--keep-temp".to_string());
    }
    if request.produce_mp4 && !request.produce_gif {
        argv.push("--output".to_string());
        argv.push("mp4".to_string());
    } else if request.produce_gif && !request.produce_mp4 {
        argv.push("--output".to_string());
        argv.push("gif".to_string());
    }

    let (output, code) = run_command(&argv, None)?;
    let parsed = parse_result_output(&output, project_root);
    if let Some(summary) = &parsed.summary {
        rewrite_summary_paths(summary, project_root);
    }

    if code != 0 {
        let mut message = output.trim().to_string();
        if message.is_empty() {
            message = "docker run failed".to_string();
        }
        let mut tool_versions = BTreeMap::new();
        tool_versions.insert("image".to_string(), tag);
        return Err(StudioError::step(
            message,
            Some(serde_json::json!({
                "run_dir": parsed.run_dir.as_ref().map(|p| p.display().to_string()),
                "summary": parsed.summary.as_ref().map(|p| p.display().to_string()),
                "tools": tool_versions,
            })),
        ));
    }
    Ok(parsed)
}
