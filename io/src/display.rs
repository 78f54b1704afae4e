use crate::IoResult;
use std::fmt::Debug;

/// Default text size used by the display queue.
pub const DEFAULT_TEXT_SIZE: u8 = 2;

/// Widest line the panel fits at text size 1.
pub const MAX_LINE_CHARS: usize = 21;

/// Lines up to this long are drawn at text size 2.
pub const LARGE_LINE_CHARS: usize = 10;

/// The physical single-line OLED.
///
/// Every draw replaces the whole screen.
pub trait DisplayDriver: Debug {
    /// Draws `text` at the default position with the given text size.
    fn draw_text(&mut self, text: &str, size: u8) -> IoResult<()>;

    /// Draws a number at the default position.
    fn draw_number(&mut self, value: u32, size: u8) -> IoResult<()>;

    /// Draws an already masked password.
    fn draw_password(&mut self, masked: &str) -> IoResult<()>;

    /// Blanks the screen.
    fn clear(&mut self) -> IoResult<()>;

    /// Draws two lines, each with its own text size.
    ///
    /// Panels without a line API can keep the default, which joins the lines.
    fn draw_lines(&mut self, line1: &str, size1: u8, line2: &str, size2: u8) -> IoResult<()> {
        let size = size1.min(size2);
        self.draw_text(&format!("{line1}\n{line2}"), size)
    }
}

/// Picks the text size for a line and cuts it to what the panel fits.
pub fn fit_line(line: &str) -> (String, u8) {
    let count = line.chars().count();
    let size = if count <= LARGE_LINE_CHARS { 2 } else { 1 };
    (line.chars().take(MAX_LINE_CHARS).collect(), size)
}
