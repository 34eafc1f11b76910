//! Stderr spinner shown while a run executes.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

pub fn start_spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

pub fn finish_spinner(spinner: ProgressBar) {
    spinner.finish_and_clear();
}
