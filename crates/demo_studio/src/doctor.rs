//! Tool availability probes with remediation hints.

use crate::docker::ensure_image;
use crate::model::Lane;
use crate::shells::{binary_exists, run_command};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

impl CheckStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Warn => "WARN",
            Self::Fail => "FAIL",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DoctorCheck {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
}

/// Doctor scope: a specific lane or everything relevant for `auto`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DoctorMode {
    #[default]
    Auto,
    Lane(Lane),
}

fn platform_family() -> &'static str {
    if cfg!(target_os = "macos") {
        "macos"
    } else if cfg!(windows) {
        "windows"
    } else {
        "linux"
    }
}

fn next_action(tool: &str) -> &'static str {
    match (tool, platform_family()) {
        ("vhs", "macos") => "brew install vhs",
        ("vhs", _) => "go install github.com/charmbracelet/vhs@v0.10.0",
        ("ffmpeg" | "ffprobe", "macos") => "brew install ffmpeg",
        ("ffmpeg" | "ffprobe", "windows") => "choco install ffmpeg --yes --no-progress",
        ("ffmpeg" | "ffprobe", _) => "sudo apt-get update && sudo apt-get install -y ffmpeg",
        ("kitty", "macos") => "brew install --cask kitty",
        ("kitty", "windows") => "use Docker mode for the visual lane on Windows",
        ("kitty", _) => "sudo apt-get update && sudo apt-get install -y kitty",
        ("xvfb", "macos") => "brew install --cask xquartz",
        ("xvfb", "windows") => "use Docker mode for the visual lane on Windows",
        ("xvfb", _) => "sudo apt-get update && sudo apt-get install -y xvfb",
        ("docker", "macos") => "open -a Docker",
        ("docker", "windows") => "start Docker Desktop",
        ("docker", _) => "sudo systemctl start docker",
        ("drawtext", "macos") => "brew reinstall ffmpeg",
        ("drawtext", _) => "sudo apt-get install --reinstall -y ffmpeg",
        ("magick", "macos") => "brew install imagemagick",
        ("magick", _) => "sudo apt-get update && sudo apt-get install -y imagemagick",
        _ => "no platform-specific remediation available",
    }
}

fn with_next(message: &str, tool: &str) -> String {
    format!("{message} NEXT: {}", next_action(tool))
}

fn binary_check(name: &str, binary: &str, tool: &str, required: bool) -> DoctorCheck {
    if binary_exists(binary) {
        DoctorCheck {
            name: name.to_string(),
            status: CheckStatus::Pass,
            message: format!("{binary} found in PATH"),
        }
    } else {
        DoctorCheck {
            name: name.to_string(),
            status: if required {
                CheckStatus::Fail
            } else {
                CheckStatus::Warn
            },
            message: with_next(&format!("{binary} not found in PATH."), tool),
        }
    }
}

fn ffmpeg_drawtext_check() -> DoctorCheck {
    let supported = crate::compose::detect_drawtext_support();
    DoctorCheck {
        name: "local-ffmpeg-drawtext".to_string(),
        status: if supported {
            CheckStatus::Pass
        } else {
            CheckStatus::Warn
        },
        message: if supported {
            "ffmpeg drawtext filter is available".to_string()
        } else {
            with_next(
                "ffmpeg drawtext filter not detected. Labels fall back to image-overlay badges.",
                "drawtext",
            )
        },
    }
}

fn docker_daemon_check() -> DoctorCheck {
    let argv: Vec<String> = ["docker", "info"].map(String::from).to_vec();
    match run_command(&argv, None) {
        Ok((_, 0)) => DoctorCheck {
            name: "docker-daemon".to_string(),
            status: CheckStatus::Pass,
            message: "Docker daemon is reachable".to_string(),
        },
        Ok((output, _)) => DoctorCheck {
            name: "docker-daemon".to_string(),
            status: CheckStatus::Warn,
            message: with_next(output.trim(), "docker"),
        },
        Err(_) => DoctorCheck {
            name: "docker-daemon".to_string(),
            status: CheckStatus::Warn,
            message: with_next(
                "Docker CLI not found. Install Docker for container mode, or use local mode.",
                "docker",
            ),
        },
    }
}

fn container_binary_check(project_root: &Path, docker_ok: bool, mode: DoctorMode) -> DoctorCheck {
    let name = "container-binaries".to_string();
    if !docker_ok {
        return DoctorCheck {
            name,
            status: CheckStatus::Warn,
            message: with_next("skipped because docker daemon is unavailable", "docker"),
        };
    }
    let image = match ensure_image(project_root, false) {
        Ok(tag) => tag,
        Err(err) => {
            return DoctorCheck {
                name,
                status: CheckStatus::Warn,
                message: err.message,
            };
        }
    };
    let (probe, ok_message) = if matches!(mode, DoctorMode::Lane(Lane::Visual)) {
        (
            "command -v kitty >/dev/null && command -v kitten >/dev/null \
             && command -v Xvfb >/dev/null && command -v ffmpeg >/dev/null",
            "kitty/kitten/Xvfb/ffmpeg present in image",
        )
    } else {
        (
            "command -v vhs >/dev/null && command -v ffmpeg >/dev/null \
             && ffmpeg -hide_banner -filters | grep -q drawtext",
            "vhs/ffmpeg present in image with drawtext support",
        )
    };
    let argv: Vec<String> = [
        "docker",
        "run",
        "--rm",
        "--entrypoint",
        "sh",
        &image,
        "-lc",
        probe,
    ]
    .map(String::from)
    .to_vec();
    match run_command(&argv, None) {
        Ok((_, 0)) => DoctorCheck {
            name,
            status: CheckStatus::Pass,
            message: ok_message.to_string(),
        },
        Ok((output, _)) => DoctorCheck {
            name,
            status: CheckStatus::Warn,
            message: if output.trim().is_empty() {
                "required binaries missing in container image".to_string()
            } else {
                output.trim().to_string()
            },
        },
        Err(err) => DoctorCheck {
            name,
            status: CheckStatus::Warn,
            message: err.message,
        },
    }
}

fn scripted_local_checks(required: bool) -> Vec<DoctorCheck> {
    vec![
        binary_check("local-vhs", "vhs", "vhs", required),
        binary_check("local-ffmpeg", "ffmpeg", "ffmpeg", required),
        binary_check("local-ffprobe", "ffprobe", "ffprobe", required),
        ffmpeg_drawtext_check(),
        binary_check("local-imagemagick", "convert", "magick", false),
    ]
}

fn visual_local_checks() -> Vec<DoctorCheck> {
    vec![
        binary_check("local-kitty", "kitty", "kitty", false),
        binary_check("local-kitten", "kitten", "kitty", false),
        binary_check("local-xvfb", "Xvfb", "xvfb", false),
        binary_check("local-ffmpeg", "ffmpeg", "ffmpeg", false),
        binary_check("local-ffprobe", "ffprobe", "ffprobe", false),
    ]
}

/// Run all checks relevant to the requested mode.
#[must_use]
pub fn run_doctor_checks(mode: DoctorMode, project_root: &Path) -> Vec<DoctorCheck> {
    let mut checks = Vec::new();

    match mode {
        DoctorMode::Lane(Lane::Visual) => {
            checks.extend(visual_local_checks());
        }
        DoctorMode::Lane(Lane::Interactive) => {
            // The PTY lane needs only a POSIX shell; media tools are optional.
            checks.extend(scripted_local_checks(false));
        }
        DoctorMode::Auto | DoctorMode::Lane(Lane::Scripted) => {
            checks.extend(scripted_local_checks(true));
        }
    }

    if !matches!(mode, DoctorMode::Lane(Lane::Interactive)) {
        let docker = docker_daemon_check();
        let docker_ok = docker.status == CheckStatus::Pass;
        checks.push(docker);
        checks.push(container_binary_check(project_root, docker_ok, mode));

        if matches!(mode, DoctorMode::Lane(Lane::Visual)) {
            let local_ready = ["kitty", "kitten", "Xvfb", "ffmpeg", "ffprobe"]
                .iter()
                .all(|binary| binary_exists(binary));
            let docker_ready = checks
                .iter()
                .filter(|check| check.name == "docker-daemon" || check.name == "container-binaries")
                .all(|check| check.status == CheckStatus::Pass);
            let ready = local_ready || docker_ready;
            checks.push(DoctorCheck {
                name: "visual-runtime".to_string(),
                status: if ready {
                    CheckStatus::Pass
                } else {
                    CheckStatus::Fail
                },
                message: if local_ready {
                    "visual lane runtime ready locally".to_string()
                } else if docker_ready {
                    "visual lane runtime ready via Docker fallback".to_string()
                } else {
                    "visual lane runtime unavailable: local dependencies missing and Docker is \
                     not ready"
                        .to_string()
                },
            });
        }
    }

    checks
}
