//! Test fixtures: screenplay document builders and tiny terminal programs.

#![forbid(unsafe_code)]

pub mod builders;

pub use builders::{ActionBuilder, ScreenplayBuilder};
