//! Fixture: a mock approval-prompt TUI.
//!
//! Prints a context line and a confirmation prompt, then waits for a line
//! of input before continuing; repeats for the requested round count.
//!
//! Usage: `prompt_tui <rounds>`

#![allow(clippy::print_stdout)]

use std::env;
use std::io::{self, BufRead};

fn main() {
    let rounds: u32 = env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(1);

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    for round in 1..=rounds {
        println!("safe demo step {round}");
        println!("Proceed? Press enter to confirm or esc to cancel");
        if lines.next().is_none() {
            return;
        }
    }
    println!("all steps confirmed");
}
