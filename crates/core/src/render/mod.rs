//! Summary card rendering.
//!
//! A card is a PNG laid out top to bottom: platform label, title, author,
//! publication time, body excerpt, an optional reposted-post block and the
//! source URL. Rendering never fails from the caller's point of view; a card
//! that cannot be produced is logged and skipped.

pub mod fonts;
pub mod wrap;

use std::io::Cursor;
use std::path::PathBuf;

use image::{ImageFormat, Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;
use sha2::{Digest, Sha256};
use time::{OffsetDateTime, UtcOffset};
use tracing::{debug, warn};

use crate::config::{Config, RenderConfig};
use crate::model::ParseResult;
use crate::{Result, ThreadcardError};

use fonts::FontBook;
use wrap::wrap_text;

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const BORDER: Rgb<u8> = Rgb([200, 200, 200]);
const MUTED: Rgb<u8> = Rgb([100, 100, 100]);
const TITLE: Rgb<u8> = Rgb([0, 0, 0]);
const BODY: Rgb<u8> = Rgb([50, 50, 50]);
const LINK: Rgb<u8> = Rgb([0, 0, 255]);

/// Lines of a reposted body shown on the card.
const REPOST_LINES: usize = 4;

/// One line of text placed on the card.
#[derive(Debug, Clone, PartialEq)]
struct Placed {
    text: String,
    y: i32,
    px: u32,
    color: Rgb<u8>,
    indent: i32,
}

/// Computed card layout: text lines, separator rules and final height.
#[derive(Debug, Default)]
struct Layout {
    lines: Vec<Placed>,
    rules: Vec<i32>,
    height: u32,
}

impl Layout {
    fn push(&mut self, text: String, y: i32, px: u32, color: Rgb<u8>, indent: i32) {
        self.lines.push(Placed { text, y, px, color, indent });
    }
}

/// Draws [`ParseResult`]s into PNG cards in the cache directory.
pub struct Renderer {
    cache_dir: PathBuf,
    layout: RenderConfig,
    fonts: FontBook,
}

impl Renderer {
    /// Creates a renderer, loading the card font from the configured candidates.
    pub fn new(config: &Config) -> Self {
        Self::with_fonts(config, FontBook::load(&config.render.font_candidates))
    }

    pub fn with_fonts(config: &Config, fonts: FontBook) -> Self {
        Self { cache_dir: config.cache_dir.clone(), layout: config.render.clone(), fonts }
    }

    pub fn fonts(&self) -> &FontBook {
        &self.fonts
    }

    /// Cache path of the card for `result`.
    pub fn card_path(&self, result: &ParseResult) -> PathBuf {
        let digest = format!("{:x}", Sha256::digest(result.resource_id().as_bytes()));
        self.cache_dir.join(format!("card_{}.png", &digest[..16]))
    }

    /// Renders and writes the card, returning its path.
    ///
    /// Failures are logged and reported as `None`.
    pub async fn render(&self, result: &ParseResult) -> Option<PathBuf> {
        match self.try_render(result).await {
            Ok(path) => {
                debug!(path = %path.display(), "card rendered");
                Some(path)
            }
            Err(e) => {
                warn!(platform = %result.platform.name, error = %e, "card render failed");
                None
            }
        }
    }

    async fn try_render(&self, result: &ParseResult) -> Result<PathBuf> {
        let png = self.draw(result)?;
        let path = self.card_path(result);
        tokio::fs::create_dir_all(&self.cache_dir).await?;
        tokio::fs::write(&path, png).await?;
        Ok(path)
    }

    /// Draws the card and encodes it as PNG bytes.
    pub fn draw(&self, result: &ParseResult) -> Result<Vec<u8>> {
        let layout = self.layout(result);
        let width = self.layout.width;
        if layout.height == 0 || width == 0 {
            return Err(ThreadcardError::Render("empty card".into()));
        }

        let mut canvas = RgbImage::from_pixel(width, layout.height, BACKGROUND);
        draw_hollow_rect_mut(&mut canvas, Rect::at(0, 0).of_size(width, layout.height), BORDER);
        if width > 2 && layout.height > 2 {
            draw_hollow_rect_mut(&mut canvas, Rect::at(1, 1).of_size(width - 2, layout.height - 2), BORDER);
        }

        let padding = self.layout.padding as f32;
        for y in &layout.rules {
            draw_line_segment_mut(&mut canvas, (padding, *y as f32), (width as f32 - padding, *y as f32), BORDER);
        }

        let x = self.layout.padding as i32;
        for line in &layout.lines {
            self.fonts.sized(line.px).draw(&mut canvas, x + line.indent, line.y, line.color, &line.text);
        }

        let mut png = Vec::new();
        canvas.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
        Ok(png)
    }

    fn layout(&self, result: &ParseResult) -> Layout {
        let mut layout = Layout::default();
        let max_width = self.layout.width.saturating_sub(self.layout.padding.saturating_mul(2));

        layout.push(format!("平台: {}", result.platform), 10, 16, MUTED, 0);

        let mut y = 40;
        if let Some(title) = result.title.as_deref().filter(|t| !t.is_empty()) {
            for line in self.wrap(title, 24, max_width) {
                layout.push(line, y, 24, TITLE, 0);
                y += 30;
            }
        }

        if let Some(author) = result.author_name() {
            layout.push(format!("作者: {}", author), y, 14, MUTED, 0);
            y += 20;
        }

        if let Some(time) = result.timestamp.and_then(|ts| self.format_time(ts)) {
            layout.push(format!("时间: {}", time), y, 14, MUTED, 0);
            y += 20;
        }

        match result.summary_text() {
            Some(text) => {
                let mut lines = self.wrap(text, 16, max_width);
                if lines.len() > self.layout.max_text_lines {
                    lines.truncate(self.layout.max_text_lines);
                    lines.push("...".to_string());
                }
                for line in lines {
                    layout.push(line, y, 16, BODY, 0);
                    y += 20;
                }
            }
            None => y += 10,
        }

        if let Some(repost) = result.repost.as_deref() {
            y += 5;
            layout.rules.push(y);
            y += 10;

            let indent = 10;
            let inner_width = max_width.saturating_sub(indent as u32);
            let heading = match (repost.author_name(), repost.title.as_deref()) {
                (Some(author), Some(title)) => format!("// {}: {}", author, title),
                (Some(author), None) => format!("// {}", author),
                (None, Some(title)) => format!("// {}", title),
                (None, None) => "//".to_string(),
            };
            for line in self.wrap(&heading, 14, inner_width) {
                layout.push(line, y, 14, MUTED, indent);
                y += 20;
            }
            if let Some(text) = repost.summary_text() {
                let mut lines = self.wrap(text, 14, inner_width);
                if lines.len() > REPOST_LINES {
                    lines.truncate(REPOST_LINES);
                    lines.push("...".to_string());
                }
                for line in lines {
                    layout.push(line, y, 14, BODY, indent);
                    y += 20;
                }
            }
            y += 5;
        }

        if let Some(url) = result.url.as_deref().filter(|u| !u.is_empty()) {
            for line in self.wrap(url, 12, max_width) {
                layout.push(line, y, 12, LINK, 0);
                y += 15;
            }
        }

        layout.height = (y + 20).max(0) as u32;
        layout
    }

    fn wrap(&self, text: &str, px: u32, max_width: u32) -> Vec<String> {
        let font = self.fonts.sized(px);
        wrap_text(text, max_width, &*font)
    }

    /// `YYYY-MM-DD HH:MM:SS` at the configured offset.
    fn format_time(&self, timestamp: i64) -> Option<String> {
        let offset = UtcOffset::from_hms(self.layout.utc_offset_hours, 0, 0).ok()?;
        let time = OffsetDateTime::from_unix_timestamp(timestamp).ok()?.to_offset(offset);
        Some(format!(
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            time.year(),
            u8::from(time.month()),
            time.day(),
            time.hour(),
            time.minute(),
            time.second()
        ))
    }
}
