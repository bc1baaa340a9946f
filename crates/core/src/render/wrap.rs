//! Character-granularity line wrapping.
//!
//! CJK text has no spaces to break on, so lines are filled greedily one
//! character at a time against pixel widths from a [`TextMeasure`].

/// Pixel widths of text in one font at one size.
pub trait TextMeasure {
    /// Horizontal advance of a single character.
    fn char_width(&self, c: char) -> u32;

    fn text_width(&self, text: &str) -> u32 {
        text.chars().map(|c| self.char_width(c)).sum()
    }
}

/// Splits `text` into lines no wider than `max_width`.
///
/// Each `\n` starts a new line. A character wider than `max_width` still
/// gets a line of its own, so no line is produced empty except for blank
/// input lines.
pub fn wrap_text(text: &str, max_width: u32, measure: &impl TextMeasure) -> Vec<String> {
    let mut lines = Vec::new();

    for paragraph in text.split('\n') {
        let mut current = String::new();
        let mut width = 0u32;

        for c in paragraph.chars() {
            let w = measure.char_width(c);
            if !current.is_empty() && width + w > max_width {
                lines.push(std::mem::take(&mut current));
                width = 0;
            }
            current.push(c);
            width += w;
        }

        lines.push(current);
    }

    lines
}
