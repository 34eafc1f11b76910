//! Fixture: prints a marker line after a delay.
//!
//! Usage: `delay_output <millis> <text>`

#![allow(clippy::print_stdout)]

use std::env;
use std::thread;
use std::time::Duration;

fn main() {
    let args: Vec<String> = env::args().collect();
    let millis: u64 = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(100);
    let text = args.get(2).map_or("ready", String::as_str);

    thread::sleep(Duration::from_millis(millis));
    println!("{text}");
}
