// Test module - relaxed lint rules
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(missing_docs)]

//! Dispatcher lane-resolution tests.

use demo_studio::dispatcher::{resolve_lane, LaneSelect};
use demo_studio::model::{load_screenplay_str, Lane};
use demo_studio_fixtures::{ActionBuilder, ScreenplayBuilder};

fn screenplay(modes: &[&str]) -> demo_studio::Screenplay {
    let mut builder = ScreenplayBuilder::new("demo");
    for (index, mode) in modes.iter().enumerate() {
        builder = builder.scenario(&format!("scene-{index}"), mode, |scene| {
            scene.action(ActionBuilder::command("echo hi"))
        });
    }
    load_screenplay_str(&builder.build(), "/tmp/tds-test").expect("valid screenplay")
}

#[test]
fn auto_mode_prefers_visual_then_interactive() {
    let resolved = resolve_lane(&screenplay(&["scripted", "visual", "interactive"]), LaneSelect::Auto);
    assert_eq!(resolved.unwrap(), Lane::Visual);

    let resolved = resolve_lane(&screenplay(&["scripted", "interactive"]), LaneSelect::Auto);
    assert_eq!(resolved.unwrap(), Lane::Interactive);

    let resolved = resolve_lane(&screenplay(&["scripted", "scripted"]), LaneSelect::Auto);
    assert_eq!(resolved.unwrap(), Lane::Scripted);
}

#[test]
fn explicit_lane_wins_when_compatible() {
    let resolved = resolve_lane(
        &screenplay(&["scripted"]),
        LaneSelect::Lane(Lane::Interactive),
    );
    assert_eq!(resolved.unwrap(), Lane::Interactive);
}

#[test]
fn explicit_lane_conflicting_with_declared_mode_errors() {
    let result = resolve_lane(
        &screenplay(&["visual"]),
        LaneSelect::Lane(Lane::Interactive),
    );
    let err = result.unwrap_err();
    assert_eq!(err.exit_code(), 2);
    assert!(err.message.contains("incompatible"));

    let result = resolve_lane(&screenplay(&["interactive"]), LaneSelect::Lane(Lane::Scripted));
    assert!(result.is_err());
}
