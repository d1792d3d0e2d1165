// Fits translated text into the geometry of the region it replaces:
// picks a font size and word-wraps the text to the region's width.

use tracing::trace;

use crate::core::config::RenderConfig;
use crate::core::types::Rect;

// Width of an average glyph and height of a line, as fractions of the
// font size. Tuned for the Latin-script output the renderer draws.
const CHAR_WIDTH_FACTOR: f32 = 0.6;
const LINE_HEIGHT_FACTOR: f32 = 1.2;
const SIZE_STEP: u32 = 2;

/// A solved layout: the font size to draw at and the wrapped lines.
#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    pub font_size: f32,
    pub lines: Vec<String>,
}

impl Layout {
    pub fn line_height(&self) -> f32 {
        self.font_size * LINE_HEIGHT_FACTOR
    }

    pub fn block_height(&self) -> f32 {
        self.lines.len() as f32 * self.line_height()
    }
}

/// Solve a layout for `text` inside `rect`.
///
/// Starts from the region height scaled by `size_multiplier` (clamped to
/// the configured range) and steps the size down until the wrapped block
/// fits both dimensions. Never fails: if even the minimum size overflows,
/// the minimum-size wrap is returned and the renderer draws it anyway,
/// preferring legible overflow over dropped dialogue.
pub fn solve(text: &str, rect: &Rect, cfg: &RenderConfig) -> Layout {
    let start = ((rect.h as f32 * cfg.size_multiplier) as u32)
        .clamp(cfg.min_font_size, cfg.max_font_size);

    let mut size = start;
    loop {
        let layout = wrap_at(text, rect, size as f32);
        if fits(&layout, rect) || size <= cfg.min_font_size {
            trace!(size, lines = layout.lines.len(), "layout solved");
            return layout;
        }
        size = size.saturating_sub(SIZE_STEP).max(cfg.min_font_size);
    }
}

fn fits(layout: &Layout, rect: &Rect) -> bool {
    let char_w = layout.font_size * CHAR_WIDTH_FACTOR;
    let widest = layout
        .lines
        .iter()
        .map(|l| l.chars().count())
        .max()
        .unwrap_or(0) as f32
        * char_w;
    widest <= rect.w as f32 && layout.block_height() <= rect.h as f32
}

/// Greedy word wrap at the estimated glyph width for `font_size`. A single
/// word wider than the region gets its own line rather than being broken.
fn wrap_at(text: &str, rect: &Rect, font_size: f32) -> Layout {
    let char_w = font_size * CHAR_WIDTH_FACTOR;
    let max_chars = ((rect.w as f32 / char_w).floor() as usize).max(1);

    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let candidate_len = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if candidate_len <= max_chars || current.is_empty() {
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
        } else {
            lines.push(std::mem::take(&mut current));
            current.push_str(word);
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }

    Layout { font_size, lines }
}
