//! In-memory screen model for the interactive lane.
//!
//! Control sequences from the child shell are replayed through a vt100
//! parser so the evaluator sees the visible grid rather than raw bytes.

use vt100::Parser;

/// Terminal grid dimensions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TerminalSize {
    pub rows: u16,
    pub cols: u16,
}

impl Default for TerminalSize {
    fn default() -> Self {
        Self { rows: 24, cols: 80 }
    }
}

impl TerminalSize {
    /// Approximate a grid from pixel settings. Cell metrics follow the
    /// usual monospace ratio (glyph width ~0.6em, row height = line_height em).
    #[must_use]
    pub fn from_pixels(width: u32, height: u32, font_size: u32, line_height: f64) -> Self {
        let font_size = font_size.max(1);
        let cell_width = (f64::from(font_size) * 0.6).max(1.0);
        let cell_height = (f64::from(font_size) * line_height.max(0.5)).max(1.0);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let cols = ((f64::from(width) / cell_width) as u16).clamp(20, 500);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let rows = ((f64::from(height) / cell_height) as u16).clamp(10, 200);
        Self { rows, cols }
    }
}

pub struct Terminal {
    parser: Parser,
}

impl Terminal {
    #[must_use]
    pub fn new(size: TerminalSize) -> Self {
        Self {
            parser: Parser::new(size.rows, size.cols, 0),
        }
    }

    pub fn process_bytes(&mut self, bytes: &[u8]) {
        self.parser.process(bytes);
    }

    /// Visible grid text with line boundaries, trailing blank rows dropped.
    #[must_use]
    pub fn screen_text(&self) -> String {
        let screen = self.parser.screen();
        let (_rows, cols) = screen.size();
        let mut lines: Vec<String> = screen.rows(0, cols).collect();
        while lines.last().is_some_and(|line| line.trim().is_empty()) {
            lines.pop();
        }
        lines.join("\n")
    }
}
