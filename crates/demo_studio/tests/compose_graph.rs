// Test module - relaxed lint rules
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::indexing_slicing)]
#![allow(missing_docs)]

//! Compositor tests with injected command runner and duration probe.

use demo_studio::compose::{Compositor, HeaderMode, PlaybackMode, SceneInput};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

type Recorded = Arc<Mutex<Vec<Vec<String>>>>;

fn seamed_compositor(recorded: &Recorded, drawtext: bool) -> Compositor {
    let sink = Arc::clone(recorded);
    Compositor::with_seams(
        Box::new(move |argv: &[String]| {
            sink.lock().unwrap().push(argv.to_vec());
            Ok(())
        }),
        Box::new(|_path| Ok(2.0)),
        drawtext,
        false,
    )
}

fn scene_files(dir: &std::path::Path, count: usize) -> Vec<SceneInput> {
    (0..count)
        .map(|index| {
            let path = dir.join(format!("scene_{index}.mp4"));
            std::fs::write(&path, b"fake video").unwrap();
            SceneInput {
                path,
                label: format!("Scene {index}"),
                mask_intervals: Vec::new(),
            }
        })
        .collect()
}

fn filter_arg(argv: &[String]) -> &str {
    let position = argv
        .iter()
        .position(|arg| arg == "-filter_complex")
        .expect("filter_complex present");
    &argv[position + 1]
}

#[test]
fn sequential_playback_pads_scenes_onto_one_timeline() {
    let dir = tempfile::tempdir().unwrap();
    let recorded: Recorded = Arc::default();
    let scenes = scene_files(dir.path(), 2);

    seamed_compositor(&recorded, true)
        .compose(
            &scenes,
            &dir.path().join("out.mp4"),
            None,
            PlaybackMode::Sequential,
            HeaderMode::Never,
            dir.path(),
        )
        .unwrap();

    let commands = recorded.lock().unwrap();
    assert_eq!(commands.len(), 1, "mp4 only without a gif target");
    let filter = filter_arg(&commands[0]);
    // Second pane starts after the first 2s scene finishes.
    assert!(filter.contains("start_duration=0.000"));
    assert!(filter.contains("start_duration=2.000"));
    assert!(filter.contains("xstack=inputs=2"));
}

#[test]
fn simultaneous_playback_aligns_scene_starts() {
    let dir = tempfile::tempdir().unwrap();
    let recorded: Recorded = Arc::default();
    let scenes = scene_files(dir.path(), 2);

    seamed_compositor(&recorded, true)
        .compose(
            &scenes,
            &dir.path().join("out.mp4"),
            None,
            PlaybackMode::Simultaneous,
            HeaderMode::Never,
            dir.path(),
        )
        .unwrap();

    let commands = recorded.lock().unwrap();
    let filter = filter_arg(&commands[0]);
    assert!(!filter.contains("start_duration=2.000"));
}

#[test]
fn single_scene_uses_pad_instead_of_stack() {
    let dir = tempfile::tempdir().unwrap();
    let recorded: Recorded = Arc::default();
    let scenes = scene_files(dir.path(), 1);

    seamed_compositor(&recorded, true)
        .compose(
            &scenes,
            &dir.path().join("out.mp4"),
            None,
            PlaybackMode::Sequential,
            HeaderMode::Never,
            dir.path(),
        )
        .unwrap();

    let commands = recorded.lock().unwrap();
    let filter = filter_arg(&commands[0]);
    assert!(filter.contains("pad=w=iw+"));
    assert!(!filter.contains("xstack"));
}

#[test]
fn gif_derives_from_the_composed_mp4() {
    let dir = tempfile::tempdir().unwrap();
    let recorded: Recorded = Arc::default();
    let scenes = scene_files(dir.path(), 1);

    seamed_compositor(&recorded, true)
        .compose(
            &scenes,
            &dir.path().join("out.mp4"),
            Some(&dir.path().join("out.gif")),
            PlaybackMode::Sequential,
            HeaderMode::Never,
            dir.path(),
        )
        .unwrap();

    let commands = recorded.lock().unwrap();
    assert_eq!(commands.len(), 2);
    let gif_cmd = &commands[1];
    assert!(gif_cmd.iter().any(|arg| arg.contains("palettegen")));
    assert!(gif_cmd.iter().any(|arg| arg.ends_with("out.gif")));
}

#[test]
fn labels_draw_in_the_header_band_with_drawtext() {
    let dir = tempfile::tempdir().unwrap();
    let recorded: Recorded = Arc::default();
    let scenes = scene_files(dir.path(), 2);

    seamed_compositor(&recorded, true)
        .compose(
            &scenes,
            &dir.path().join("out.mp4"),
            None,
            PlaybackMode::Sequential,
            HeaderMode::Auto,
            dir.path(),
        )
        .unwrap();

    let commands = recorded.lock().unwrap();
    let filter = filter_arg(&commands[0]);
    assert!(filter.contains("drawtext=textfile="));
    assert!(filter.contains("drawbox="));
}

#[test]
fn header_band_is_omitted_when_no_renderer_is_available() {
    let dir = tempfile::tempdir().unwrap();
    let recorded: Recorded = Arc::default();
    let scenes = scene_files(dir.path(), 2);

    seamed_compositor(&recorded, false)
        .compose(
            &scenes,
            &dir.path().join("out.mp4"),
            None,
            PlaybackMode::Sequential,
            HeaderMode::Auto,
            dir.path(),
        )
        .unwrap();

    let commands = recorded.lock().unwrap();
    let filter = filter_arg(&commands[0]);
    assert!(!filter.contains("drawtext"));
    assert!(!filter.contains("overlay="));
}

#[test]
fn missing_scene_artifact_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let recorded: Recorded = Arc::default();
    let scenes = vec![SceneInput {
        path: PathBuf::from("/nonexistent/scene_0.mp4"),
        label: "gone".to_string(),
        mask_intervals: Vec::new(),
    }];

    let err = seamed_compositor(&recorded, true)
        .compose(
            &scenes,
            &dir.path().join("out.mp4"),
            None,
            PlaybackMode::Sequential,
            HeaderMode::Never,
            dir.path(),
        )
        .unwrap_err();
    assert!(err.message.contains("missing scene artifact"));
}

#[test]
fn mask_intervals_become_timed_drawbox_filters() {
    let dir = tempfile::tempdir().unwrap();
    let recorded: Recorded = Arc::default();
    let mut scenes = scene_files(dir.path(), 1);
    scenes[0].mask_intervals = vec![(1.0, 2.5)];

    seamed_compositor(&recorded, true)
        .compose(
            &scenes,
            &dir.path().join("out.mp4"),
            None,
            PlaybackMode::Sequential,
            HeaderMode::Never,
            dir.path(),
        )
        .unwrap();

    let commands = recorded.lock().unwrap();
    let filter = filter_arg(&commands[0]);
    assert!(filter.contains("between(t,1.000,2.500)"));
}
