//! Shell command construction and bounded external command execution.

use crate::error::{StudioError, StudioResult};
use crate::model::ShellKind;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

/// Exit code reported when a setup command exceeds its timeout.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Look up a binary on `PATH`.
#[must_use]
pub fn find_in_path(name: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path) {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

#[must_use]
pub fn binary_exists(name: &str) -> bool {
    find_in_path(name).is_some()
}

/// Build the argv for running one command string under the selected shell.
pub fn build_shell_command(command: &str, shell: ShellKind) -> StudioResult<Vec<String>> {
    let argv = |program: &str, flag: &str| {
        vec![program.to_string(), flag.to_string(), command.to_string()]
    };
    match shell {
        ShellKind::Pwsh => Ok(vec![
            "pwsh".to_string(),
            "-NoProfile".to_string(),
            "-Command".to_string(),
            command.to_string(),
        ]),
        ShellKind::Cmd => Ok(vec![
            "cmd".to_string(),
            "/C".to_string(),
            command.to_string(),
        ]),
        ShellKind::Bash => Ok(argv("bash", "-lc")),
        ShellKind::Zsh => Ok(argv("zsh", "-lc")),
        ShellKind::Fish => Ok(argv("fish", "-lc")),
        ShellKind::Sh => Ok(argv("sh", "-lc")),
        ShellKind::Auto => {
            if binary_exists("bash") {
                Ok(argv("bash", "-lc"))
            } else if binary_exists("sh") {
                Ok(argv("sh", "-lc"))
            } else {
                Err(StudioError::tool_unavailable(
                    "no supported shell found (expected bash/sh)",
                ))
            }
        }
    }
}

/// The interactive shell program + args the PTY lane keeps alive per
/// scenario. Config files are suppressed so output stays deterministic.
pub fn interactive_shell_argv(shell: ShellKind) -> StudioResult<(String, Vec<String>)> {
    match shell {
        ShellKind::Bash => Ok((
            "bash".to_string(),
            vec!["--noprofile".to_string(), "--norc".to_string()],
        )),
        ShellKind::Zsh => Ok(("zsh".to_string(), vec!["-f".to_string()])),
        ShellKind::Fish => Ok((
            "fish".to_string(),
            vec!["--no-config".to_string(), "-i".to_string()],
        )),
        ShellKind::Sh => Ok(("sh".to_string(), Vec::new())),
        ShellKind::Pwsh => Ok((
            "pwsh".to_string(),
            vec!["-NoProfile".to_string(), "-NoLogo".to_string()],
        )),
        ShellKind::Cmd => Ok(("cmd".to_string(), Vec::new())),
        ShellKind::Auto => {
            if binary_exists("bash") {
                Ok((
                    "bash".to_string(),
                    vec!["--noprofile".to_string(), "--norc".to_string()],
                ))
            } else if binary_exists("sh") {
                Ok(("sh".to_string(), Vec::new()))
            } else {
                Err(StudioError::tool_unavailable(
                    "no supported shell found (expected bash/sh)",
                ))
            }
        }
    }
}

/// Run an argv to completion with a deadline, capturing combined output.
///
/// On timeout the child is killed and the partial output is returned with
/// exit code 124, matching the coreutils `timeout` convention.
pub fn run_command_with_timeout(
    argv: &[String],
    cwd: &Path,
    timeout: Duration,
    envs: &[(String, String)],
) -> StudioResult<(String, i32)> {
    let Some((program, args)) = argv.split_first() else {
        return Err(StudioError::internal("empty command line"));
    };
    let mut command = Command::new(program);
    command
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    for (key, value) in envs {
        command.env(key, value);
    }
    let mut child = command
        .spawn()
        .map_err(|err| StudioError::io(format!("failed to spawn '{program}'"), err))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| StudioError::internal("missing child stdout"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| StudioError::internal("missing child stderr"))?;
    let stdout_handle = std::thread::spawn(move || drain(stdout));
    let stderr_handle = std::thread::spawn(move || drain(stderr));

    let deadline = Instant::now() + timeout;
    let exit_code = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status.code().unwrap_or(-1),
            Ok(None) => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    let mut output = join_output(stdout_handle, stderr_handle);
                    output = format!(
                        "command timed out after {:.1}s\n{output}",
                        timeout.as_secs_f64()
                    );
                    return Ok((output.trim_end().to_string(), TIMEOUT_EXIT_CODE));
                }
                std::thread::sleep(Duration::from_millis(20));
            }
            Err(err) => return Err(StudioError::io("failed to wait for command", err)),
        }
    };

    Ok((join_output(stdout_handle, stderr_handle), exit_code))
}

fn drain(mut reader: impl Read) -> String {
    let mut buffer = Vec::new();
    let _ = reader.read_to_end(&mut buffer);
    String::from_utf8_lossy(&buffer).into_owned()
}

fn join_output(
    stdout: std::thread::JoinHandle<String>,
    stderr: std::thread::JoinHandle<String>,
) -> String {
    let stdout = stdout.join().unwrap_or_default();
    let stderr = stderr.join().unwrap_or_default();
    format!("{stdout}{stderr}")
}

/// Run an argv to completion without a deadline, capturing output.
pub fn run_command(argv: &[String], cwd: Option<&Path>) -> StudioResult<(String, i32)> {
    let Some((program, args)) = argv.split_first() else {
        return Err(StudioError::internal("empty command line"));
    };
    let mut command = Command::new(program);
    command.args(args);
    if let Some(cwd) = cwd {
        command.current_dir(cwd);
    }
    let output = command
        .output()
        .map_err(|err| StudioError::io(format!("failed to run '{program}'"), err))?;
    let text = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    Ok((text, output.status.code().unwrap_or(-1)))
}
