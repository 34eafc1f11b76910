//! Scene compositor for the scripted and visual lanes.
//!
//! Takes per-scene videos and produces the final MP4/GIF: sequential
//! playback pads each pane so scenes play one after another on a shared
//! canvas; simultaneous playback stacks panes side by side aligned to the
//! longest scene. Label overlays prefer ffmpeg drawtext, fall back to
//! ImageMagick-rendered badges, and omit the header band when neither is
//! available.
//!
//! The external command runner and duration probe are injectable so the
//! filter-graph construction stays testable without ffmpeg installed.

use crate::error::{StudioError, StudioResult};
use crate::shells::{binary_exists, run_command};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const TARGET_HEIGHT: u32 = 840;
const FRAME_RATE: u32 = 30;
const CANVAS_MARGIN: u32 = 36;
const HEADER_HEIGHT: u32 = 92;
const PANE_GAP: u32 = 56;
const BACKGROUND_COLOR: &str = "0x11111B";
const HEADER_COLOR: &str = "0x181825@0.96";
const HEADER_RULE_COLOR: &str = "0x313244@0.9";
const LABEL_TEXT_COLOR: &str = "0xCDD6F4";
const LABEL_BOX_COLOR: &str = "0x0F172A@0.88";
const LABEL_BORDER_COLOR: &str = "0x6C7086@0.95";
const MASK_COLOR: &str = "0x0F172A";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackMode {
    #[default]
    Sequential,
    Simultaneous,
}

impl PlaybackMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sequential => "sequential",
            Self::Simultaneous => "simultaneous",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum HeaderMode {
    #[default]
    Auto,
    Always,
    Never,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LabelRenderer {
    Drawtext,
    ImageOverlay,
    None,
}

/// One scene video plus its overlay label and redaction mask intervals
/// (seconds from scene start during which the input region is masked).
#[derive(Clone, Debug)]
pub struct SceneInput {
    pub path: PathBuf,
    pub label: String,
    pub mask_intervals: Vec<(f64, f64)>,
}

type CommandRunner = Box<dyn Fn(&[String]) -> StudioResult<()>>;
type DurationProbe = Box<dyn Fn(&Path) -> StudioResult<f64>>;

pub struct Compositor {
    run: CommandRunner,
    probe: DurationProbe,
    supports_drawtext: bool,
    supports_image_labels: bool,
}

impl Compositor {
    /// Production compositor probing the local toolchain.
    #[must_use]
    pub fn detect() -> Self {
        Self {
            run: Box::new(run_checked),
            probe: Box::new(probe_duration),
            supports_drawtext: detect_drawtext_support(),
            supports_image_labels: detect_image_label_support(),
        }
    }

    /// Test compositor with injected command runner and duration probe.
    #[must_use]
    pub fn with_seams(
        run: CommandRunner,
        probe: DurationProbe,
        supports_drawtext: bool,
        supports_image_labels: bool,
    ) -> Self {
        Self {
            run,
            probe,
            supports_drawtext,
            supports_image_labels,
        }
    }

    /// Compose scenes into the final media files.
    pub fn compose(
        &self,
        scenes: &[SceneInput],
        output_mp4: &Path,
        output_gif: Option<&Path>,
        playback: PlaybackMode,
        header: HeaderMode,
        label_dir: &Path,
    ) -> StudioResult<()> {
        if scenes.is_empty() {
            return Err(StudioError::internal(
                "at least one scene video is required",
            ));
        }
        for scene in scenes {
            if !scene.path.exists() {
                return Err(StudioError::step(
                    format!("missing scene artifact: {}", scene.path.display()),
                    None,
                ));
            }
        }

        let labels = normalize_labels(scenes);
        let has_labels = labels.iter().any(|label| !label.trim().is_empty());
        let renderer = resolve_label_renderer(
            has_labels,
            self.supports_drawtext,
            self.supports_image_labels,
        );
        let header = resolve_header_mode(header, renderer != LabelRenderer::None);

        let mut durations = Vec::with_capacity(scenes.len());
        for scene in scenes {
            durations.push((self.probe)(&scene.path)?);
        }
        let offsets = timeline_offsets(&durations, playback);
        let total_duration = durations
            .iter()
            .zip(&offsets)
            .map(|(duration, offset)| duration + offset)
            .fold(0.0_f64, f64::max);

        let mut label_paths = Vec::new();
        if header == HeaderMode::Always {
            match renderer {
                LabelRenderer::Drawtext => {
                    for (index, label) in labels.iter().enumerate() {
                        let label_file = label_dir.join(format!("label_{index}.txt"));
                        std::fs::write(&label_file, label)
                            .map_err(|err| StudioError::io("failed to write label file", err))?;
                        label_paths.push(label_file);
                    }
                }
                LabelRenderer::ImageOverlay => {
                    for (index, label) in labels.iter().enumerate() {
                        let label_file = label_dir.join(format!("label_{index}.png"));
                        render_label_badge(&self.run, label, &label_file)?;
                        label_paths.push(label_file);
                    }
                }
                LabelRenderer::None => {}
            }
        }

        let filter_complex = build_filter_complex(&FilterPlan {
            scenes,
            label_paths: &label_paths,
            durations: &durations,
            offsets: &offsets,
            total_duration,
            header,
            renderer,
        });

        let mut mp4_cmd: Vec<String> = vec!["ffmpeg".into(), "-y".into()];
        for scene in scenes {
            mp4_cmd.push("-i".into());
            mp4_cmd.push(scene.path.display().to_string());
        }
        if header == HeaderMode::Always && renderer == LabelRenderer::ImageOverlay {
            for label_path in &label_paths {
                mp4_cmd.push("-i".into());
                mp4_cmd.push(label_path.display().to_string());
            }
        }
        mp4_cmd.extend(
            [
                "-filter_complex",
                &filter_complex,
                "-map",
                "[outv]",
                "-c:v",
                "libx264",
                "-pix_fmt",
                "yuv420p",
                "-movflags",
                "+faststart",
                "-an",
                &output_mp4.display().to_string(),
            ]
            .map(String::from),
        );
        (self.run)(&mp4_cmd)?;

        if let Some(output_gif) = output_gif {
            let gif_cmd: Vec<String> = [
                "ffmpeg",
                "-y",
                "-i",
                &output_mp4.display().to_string(),
                "-filter_complex",
                "fps=18,split[s0][s1];[s0]palettegen=stats_mode=diff[p];\
                 [s1][p]paletteuse=dither=sierra2_4a",
                "-loop",
                "0",
                &output_gif.display().to_string(),
            ]
            .map(String::from)
            .to_vec();
            (self.run)(&gif_cmd)?;
        }

        Ok(())
    }
}

fn run_checked(argv: &[String]) -> StudioResult<()> {
    let (output, code) = run_command(argv, None)?;
    if code == 0 {
        Ok(())
    } else {
        Err(StudioError::step(
            format!(
                "compositor command failed (exit {code}): {}",
                argv.first().map(String::as_str).unwrap_or("?")
            ),
            Some(serde_json::json!({ "output": output })),
        ))
    }
}

/// Probe a video's duration in seconds via ffprobe.
pub fn probe_duration(video: &Path) -> StudioResult<f64> {
    let argv: Vec<String> = [
        "ffprobe",
        "-v",
        "error",
        "-show_entries",
        "format=duration",
        "-of",
        "default=noprint_wrappers=1:nokey=1",
        &video.display().to_string(),
    ]
    .map(String::from)
    .to_vec();
    let (output, code) = run_command(&argv, None)?;
    if code != 0 {
        return Err(StudioError::step(
            format!("unable to probe duration for {}", video.display()),
            Some(serde_json::json!({ "output": output })),
        ));
    }
    output
        .trim()
        .parse::<f64>()
        .map(|duration| duration.max(0.0))
        .map_err(|_| {
            StudioError::step(
                format!("unable to parse duration for {}", video.display()),
                Some(serde_json::json!({ "output": output })),
            )
        })
}

/// Does the local ffmpeg carry the drawtext filter?
#[must_use]
pub fn detect_drawtext_support() -> bool {
    if !binary_exists("ffmpeg") {
        return false;
    }
    let argv: Vec<String> = ["ffmpeg", "-hide_banner", "-filters"]
        .map(String::from)
        .to_vec();
    match run_command(&argv, None) {
        Ok((output, 0)) => output.contains("drawtext"),
        _ => false,
    }
}

/// Badge rendering needs ImageMagick.
#[must_use]
pub fn detect_image_label_support() -> bool {
    binary_exists("magick") || binary_exists("convert")
}

fn render_label_badge(run: &CommandRunner, label: &str, output: &Path) -> StudioResult<()> {
    let program = if binary_exists("magick") {
        "magick"
    } else {
        "convert"
    };
    let argv: Vec<String> = [
        program,
        "-background",
        "#0F172AE1",
        "-fill",
        "#CDD6F4",
        "-pointsize",
        "34",
        "-bordercolor",
        "#6C7086",
        "-border",
        "14x10",
        &format!("label:{label}"),
        &output.display().to_string(),
    ]
    .map(String::from)
    .to_vec();
    run(&argv)
}

fn normalize_labels(scenes: &[SceneInput]) -> Vec<String> {
    scenes
        .iter()
        .enumerate()
        .map(|(index, scene)| {
            if scene.label.trim().is_empty() {
                format!("Scenario {}", index + 1)
            } else {
                scene.label.clone()
            }
        })
        .collect()
}

#[must_use]
pub fn resolve_label_renderer(
    has_labels: bool,
    supports_drawtext: bool,
    supports_image_labels: bool,
) -> LabelRenderer {
    if !has_labels {
        return LabelRenderer::None;
    }
    if supports_drawtext {
        LabelRenderer::Drawtext
    } else if supports_image_labels {
        LabelRenderer::ImageOverlay
    } else {
        LabelRenderer::None
    }
}

fn resolve_header_mode(requested: HeaderMode, labels_renderable: bool) -> HeaderMode {
    match requested {
        HeaderMode::Never => HeaderMode::Never,
        HeaderMode::Auto | HeaderMode::Always => {
            if labels_renderable {
                HeaderMode::Always
            } else {
                HeaderMode::Never
            }
        }
    }
}

/// Pane start offsets on the shared timeline.
#[must_use]
pub fn timeline_offsets(durations: &[f64], playback: PlaybackMode) -> Vec<f64> {
    match playback {
        PlaybackMode::Simultaneous => vec![0.0; durations.len()],
        PlaybackMode::Sequential => {
            let mut offsets = Vec::with_capacity(durations.len());
            let mut elapsed = 0.0;
            for duration in durations {
                offsets.push(elapsed);
                elapsed += duration;
            }
            offsets
        }
    }
}

/// X-position expression for pane `index` in the xstack layout.
#[must_use]
pub fn pane_x_expr(index: usize, margin: u32, gap: u32) -> String {
    if index == 0 {
        return margin.to_string();
    }
    let mut terms = vec![margin.to_string()];
    for prior in 0..index {
        terms.push(format!("w{prior}"));
        terms.push(gap.to_string());
    }
    terms.join("+")
}

fn escape_filter_path(path: &Path) -> String {
    path.display()
        .to_string()
        .replace('\\', "/")
        .replace(':', "\\:")
        .replace('\'', "\\'")
}

struct FilterPlan<'a> {
    scenes: &'a [SceneInput],
    label_paths: &'a [PathBuf],
    durations: &'a [f64],
    offsets: &'a [f64],
    total_duration: f64,
    header: HeaderMode,
    renderer: LabelRenderer,
}

/// Build the full `-filter_complex` graph.
#[allow(clippy::too_many_lines)]
fn build_filter_complex(plan: &FilterPlan<'_>) -> String {
    let input_count = plan.scenes.len();
    let draw_header = plan.header == HeaderMode::Always;
    let header_inset = if draw_header { HEADER_HEIGHT } else { 0 };
    let pane_top = CANVAS_MARGIN + header_inset;

    let mut parts: Vec<String> = Vec::new();

    for (index, scene) in plan.scenes.iter().enumerate() {
        let start = plan.offsets[index];
        let stop = (plan.total_duration - (start + plan.durations[index])).max(0.0);
        let mut chain = format!(
            "[{index}:v]fps={FRAME_RATE},scale=-2:{TARGET_HEIGHT}:flags=lanczos,format=yuv420p"
        );
        for (mask_start, mask_end) in &scene.mask_intervals {
            chain.push_str(&format!(
                ",drawbox=enable='between(t,{mask_start:.3},{mask_end:.3})':\
                 x=0:y=0:w=iw:h=ih:color={MASK_COLOR}:t=fill"
            ));
        }
        chain.push_str(&format!(
            ",tpad=start_mode=clone:start_duration={start:.3}:\
             stop_mode=clone:stop_duration={stop:.3}[v{index}]"
        ));
        parts.push(chain);
    }

    if input_count == 1 {
        parts.push(format!(
            "[v0]pad=w=iw+{}:h=ih+{}:x={CANVAS_MARGIN}:y={pane_top}:color={BACKGROUND_COLOR}[stacked]",
            2 * CANVAS_MARGIN,
            2 * CANVAS_MARGIN + header_inset,
        ));
    } else {
        let stack_inputs: String = (0..input_count).map(|index| format!("[v{index}]")).collect();
        let layout = (0..input_count)
            .map(|index| format!("{}_{pane_top}", pane_x_expr(index, CANVAS_MARGIN, PANE_GAP)))
            .collect::<Vec<_>>()
            .join("|");
        parts.push(format!(
            "{stack_inputs}xstack=inputs={input_count}:layout={layout}:fill={BACKGROUND_COLOR}[stacked]"
        ));
    }

    let draw_labels = draw_header
        && !plan.label_paths.is_empty()
        && plan.renderer != LabelRenderer::None;

    if draw_header {
        parts.push(format!(
            "[stacked]drawbox=x=0:y=0:w=iw:h={pane_top}:color={HEADER_COLOR}:t=fill,\
             drawbox=x=0:y={}:w=iw:h=2:color={HEADER_RULE_COLOR}:t=fill[styled]",
            pane_top - 2,
        ));
        if draw_labels && plan.renderer == LabelRenderer::Drawtext {
            let pane_width_expr = format!(
                "(w-{}-{})/{input_count}",
                2 * CANVAS_MARGIN,
                (input_count - 1) * PANE_GAP as usize,
            );
            let draw_parts: Vec<String> = plan
                .label_paths
                .iter()
                .enumerate()
                .map(|(index, label_path)| {
                    let x_expr = format!(
                        "{CANVAS_MARGIN}+{index}*({pane_width_expr}+{PANE_GAP})\
                         +({pane_width_expr})/2-text_w/2"
                    );
                    format!(
                        "drawtext=textfile='{}':fontcolor={LABEL_TEXT_COLOR}:fontsize=34:\
                         x={x_expr}:y={}:box=1:boxcolor={LABEL_BOX_COLOR}:boxborderw=14:\
                         borderw=1:bordercolor={LABEL_BORDER_COLOR}:\
                         shadowcolor=0x000000@0.6:shadowx=0:shadowy=2",
                        escape_filter_path(label_path),
                        CANVAS_MARGIN + 20,
                    )
                })
                .collect();
            parts.push(format!("[styled]{}[outv]", draw_parts.join(",")));
        } else if draw_labels && plan.renderer == LabelRenderer::ImageOverlay {
            let pane_width_expr = format!(
                "(main_w-{}-{})/{input_count}",
                2 * CANVAS_MARGIN,
                (input_count - 1) * PANE_GAP as usize,
            );
            let mut current = "[styled]".to_string();
            for index in 0..input_count {
                let x_expr = format!(
                    "{CANVAS_MARGIN}+{index}*({pane_width_expr}+{PANE_GAP})\
                     +({pane_width_expr})/2-overlay_w/2"
                );
                let output_tag = if index == input_count - 1 {
                    "[outv]".to_string()
                } else {
                    format!("[ol{index}]")
                };
                parts.push(format!(
                    "{current}[{}:v]overlay=x={x_expr}:y={}:eof_action=repeat:format=auto{output_tag}",
                    input_count + index,
                    CANVAS_MARGIN + 18,
                ));
                current = output_tag;
            }
        } else {
            parts.push("[styled]copy[outv]".to_string());
        }
    } else {
        parts.push("[stacked]copy[outv]".to_string());
    }

    parts.join(";")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_offsets_accumulate() {
        let offsets = timeline_offsets(&[2.0, 3.0, 1.0], PlaybackMode::Sequential);
        assert_eq!(offsets, vec![0.0, 2.0, 5.0]);
    }

    #[test]
    fn simultaneous_offsets_are_zero() {
        let offsets = timeline_offsets(&[2.0, 3.0], PlaybackMode::Simultaneous);
        assert_eq!(offsets, vec![0.0, 0.0]);
    }

    #[test]
    fn pane_x_expr_chains_prior_widths() {
        assert_eq!(pane_x_expr(0, 36, 56), "36");
        assert_eq!(pane_x_expr(2, 36, 56), "36+w0+56+w1+56");
    }

    #[test]
    fn renderer_prefers_drawtext_then_overlay() {
        assert_eq!(
            resolve_label_renderer(true, true, true),
            LabelRenderer::Drawtext
        );
        assert_eq!(
            resolve_label_renderer(true, false, true),
            LabelRenderer::ImageOverlay
        );
        assert_eq!(
            resolve_label_renderer(true, false, false),
            LabelRenderer::None
        );
        assert_eq!(
            resolve_label_renderer(false, true, true),
            LabelRenderer::None
        );
    }
}
