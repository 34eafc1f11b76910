//! Scripted lane: compile directive programs, render scenes with the
//! external headless recorder, compose final media.

use crate::compose::{Compositor, HeaderMode, SceneInput};
use crate::error::StudioResult;
use crate::evaluator;
use crate::lanes::{check_cancel, run_preinstall, LaneContext, LaneFailure, LaneOutcome};
use crate::model::run::FailedStep;
use crate::redaction::ResolvedRedaction;
use crate::shells::run_command;
use crate::tape::{compile_tape, PostPredicate};
use std::fs;
use std::path::PathBuf;

pub fn run(ctx: &LaneContext<'_>) -> StudioResult<LaneOutcome> {
    let mut outcome = LaneOutcome::default();
    outcome.counters.scenarios_total = ctx.screenplay.scenarios.len();
    outcome.counters.steps_total = ctx
        .screenplay
        .scenarios
        .iter()
        .map(|scenario| scenario.steps.len())
        .sum();

    if let Some(failure) = run_preinstall(ctx, None) {
        outcome.failure = Some(failure);
        return Ok(outcome);
    }

    fs::create_dir_all(&ctx.layout.tapes_dir)
        .map_err(|err| crate::error::StudioError::io("failed to create tapes dir", err))?;
    fs::create_dir_all(&ctx.layout.scenes_dir)
        .map_err(|err| crate::error::StudioError::io("failed to create scenes dir", err))?;

    let mut scene_inputs: Vec<SceneInput> = Vec::new();
    let redact_input = ctx.options.redaction == ResolvedRedaction::InputLine;

    for (index, scenario) in ctx.screenplay.scenarios.iter().enumerate() {
        check_cancel(ctx.options)?;

        let scene_video = ctx.layout.scenes_dir.join(format!("scene_{index}.mp4"));
        let scene_text = ctx.layout.scenes_dir.join(format!("scene_{index}.txt"));
        let tape_path = ctx.layout.tapes_dir.join(format!("scene_{index}.tape"));

        let (tape, predicates) = compile_tape(
            scenario,
            &ctx.screenplay.settings,
            &[
                scene_video.display().to_string(),
                scene_text.display().to_string(),
            ],
            redact_input,
        );
        fs::write(&tape_path, &tape)
            .map_err(|err| crate::error::StudioError::io("failed to write tape", err))?;

        let argv: Vec<String> = vec!["vhs".to_string(), tape_path.display().to_string()];
        let (output, exit_code) = run_command(&argv, Some(&ctx.options.working_dir))?;
        if exit_code != 0 {
            outcome.failure = Some(LaneFailure::new(
                FailedStep {
                    scenario: Some(scenario.label.clone()),
                    step_index: Some(-1),
                    action: Some("record".to_string()),
                    reason: format!("recorder failed (exit {exit_code}) for {}", scenario.label),
                },
                output,
            ));
            return Ok(outcome);
        }
        if !scene_video.exists() {
            outcome.failure = Some(LaneFailure::new(
                FailedStep {
                    scenario: Some(scenario.label.clone()),
                    step_index: Some(-1),
                    action: Some("record".to_string()),
                    reason: format!("missing scene artifact: {}", scene_video.display()),
                },
                output,
            ));
            return Ok(outcome);
        }

        let capture = fs::read_to_string(&scene_text).unwrap_or_default();
        if let Some(failure) = evaluate_post_predicates(scenario, &predicates, &capture)? {
            outcome.failure = Some(failure);
            return Ok(outcome);
        }

        outcome.scenes.push(scene_video.clone());
        scene_inputs.push(SceneInput {
            path: scene_video,
            label: scenario.label.clone(),
            mask_intervals: Vec::new(),
        });
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
    let target_gif: Option<PathBuf> = ctx.options.produce_gif.then(|| final_gif.clone());

    let label_dir = ctx.options.tmp_root.join("labels");
    fs::create_dir_all(&label_dir)
        .map_err(|err| crate::error::StudioError::io("failed to create label dir", err))?;

    let compose_result = Compositor::detect().compose(
        &scene_inputs,
        &target_mp4,
        target_gif.as_deref(),
        ctx.options.playback,
        HeaderMode::Auto,
        &label_dir,
    );
    if let Err(err) = compose_result {
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

    outcome.counters.steps_passed = outcome.counters.steps_total;
    outcome.mp4 = ctx.options.produce_mp4.then_some(final_mp4);
    outcome.gif = ctx.options.produce_gif.then_some(final_gif);
    Ok(outcome)
}

/// Check the deferred regex predicates against the recorder's text capture.
fn evaluate_post_predicates(
    scenario: &crate::model::Scenario,
    predicates: &[PostPredicate],
    capture: &str,
) -> StudioResult<Option<LaneFailure>> {
    for predicate in predicates {
        let failed_reason = if predicate.line_mode {
            let snapshot = evaluator::Snapshot {
                screen: capture.to_string(),
                stream_tail: String::new(),
            };
            match evaluator::eval_wait_line_regex(&snapshot, &predicate.pattern)? {
                evaluator::WaitOutcome::Satisfied(_) => None,
                evaluator::WaitOutcome::Pending(reason) => Some(reason),
            }
        } else {
            match evaluator::eval_assert_screen(capture, &predicate.pattern, predicate.negated)? {
                Ok(()) => None,
                Err(reason) => Some(reason),
            }
        };

        if let Some(reason) = failed_reason {
            return Ok(Some(LaneFailure::new(
                FailedStep {
                    scenario: Some(scenario.label.clone()),
                    step_index: Some(i64::try_from(predicate.step_index).unwrap_or(-1)),
                    action: Some(predicate.label.to_string()),
                    reason: format!("{}: {reason}", predicate.label),
                },
                capture.to_string(),
            )));
        }
    }
    Ok(None)
}
