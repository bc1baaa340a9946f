//! Font loading and glyph drawing for cards.
//!
//! A [`FontBook`] settles on one face when it is created: the first
//! candidate file that exists and parses, or the built-in 8x8 bitmap font
//! when none does. Sized fonts are cached per face and pixel size.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use ab_glyph::{Font, FontArc, PxScale, ScaleFont};
use font8x8::{BASIC_FONTS, LATIN_FONTS, UnicodeFonts};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use tracing::{debug, info, warn};

use super::wrap::TextMeasure;

/// Cell size of the bitmap fallback font.
const BITMAP_CELL: u32 = 8;

#[derive(Clone)]
enum Face {
    Outline { path: PathBuf, font: FontArc },
    Bitmap,
}

/// The face chosen at startup plus its sized instances.
pub struct FontBook {
    face: Face,
    sized: Mutex<HashMap<(Option<PathBuf>, u32), Arc<SizedFont>>>,
}

impl FontBook {
    /// Loads the first usable font among `candidates`.
    pub fn load(candidates: &[PathBuf]) -> Self {
        for path in candidates {
            if !path.is_file() {
                continue;
            }
            let bytes = match std::fs::read(path) {
                Ok(bytes) => bytes,
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "font not readable");
                    continue;
                }
            };
            match FontArc::try_from_vec(bytes) {
                Ok(font) => {
                    info!(path = %path.display(), "card font loaded");
                    return Self::with_face(Face::Outline { path: path.clone(), font });
                }
                Err(e) => debug!(path = %path.display(), error = %e, "font not parseable"),
            }
        }

        warn!("no card font found, using built-in bitmap font");
        Self::bitmap()
    }

    /// A book that only has the built-in bitmap font.
    pub fn bitmap() -> Self {
        Self::with_face(Face::Bitmap)
    }

    fn with_face(face: Face) -> Self {
        Self { face, sized: Mutex::new(HashMap::new()) }
    }

    /// Path of the loaded font file, `None` for the bitmap fallback.
    pub fn path(&self) -> Option<&Path> {
        match &self.face {
            Face::Outline { path, .. } => Some(path),
            Face::Bitmap => None,
        }
    }

    /// The face at `px` pixels, created on first request.
    pub fn sized(&self, px: u32) -> Arc<SizedFont> {
        let key = (self.path().map(Path::to_path_buf), px);
        let mut cache = self.sized.lock().unwrap_or_else(PoisonError::into_inner);
        cache
            .entry(key)
            .or_insert_with(|| {
                let kind = match &self.face {
                    Face::Outline { font, .. } => SizedKind::Outline { font: font.clone(), scale: PxScale::from(px as f32) },
                    Face::Bitmap => SizedKind::Bitmap { unit: (px / BITMAP_CELL).max(1) },
                };
                Arc::new(SizedFont { kind, px })
            })
            .clone()
    }

    /// Number of sized fonts created so far.
    pub fn cached(&self) -> usize {
        self.sized.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

enum SizedKind {
    Outline { font: FontArc, scale: PxScale },
    /// Each bitmap pixel is drawn as a `unit`x`unit` square.
    Bitmap { unit: u32 },
}

/// A face at a fixed pixel size.
pub struct SizedFont {
    kind: SizedKind,
    px: u32,
}

impl SizedFont {
    pub fn px(&self) -> u32 {
        self.px
    }

    /// Draws one line of text with its top-left corner at `(x, y)`.
    pub fn draw(&self, canvas: &mut RgbImage, x: i32, y: i32, color: Rgb<u8>, text: &str) {
        match &self.kind {
            SizedKind::Outline { font, scale } => draw_text_mut(canvas, color, x, y, *scale, font, text),
            SizedKind::Bitmap { unit } => {
                let advance = (BITMAP_CELL * unit) as i32;
                for (i, c) in text.chars().enumerate() {
                    draw_bitmap_glyph(canvas, x + advance * i as i32, y, *unit, color, c);
                }
            }
        }
    }
}

impl TextMeasure for SizedFont {
    fn char_width(&self, c: char) -> u32 {
        match &self.kind {
            SizedKind::Outline { font, scale } => {
                let scaled = font.as_scaled(*scale);
                scaled.h_advance(font.glyph_id(c)).ceil() as u32
            }
            SizedKind::Bitmap { unit } => BITMAP_CELL * unit,
        }
    }
}

fn glyph_rows(c: char) -> Option<[u8; 8]> {
    BASIC_FONTS.get(c).or_else(|| LATIN_FONTS.get(c))
}

fn draw_bitmap_glyph(canvas: &mut RgbImage, x: i32, y: i32, unit: u32, color: Rgb<u8>, c: char) {
    if c.is_whitespace() {
        return;
    }

    let Some(rows) = glyph_rows(c) else {
        let side = BITMAP_CELL * unit;
        let inset = unit as i32;
        if side > 2 * unit {
            let rect = Rect::at(x + inset, y + inset).of_size(side - 2 * unit, side - 2 * unit);
            draw_hollow_rect_mut(canvas, rect, color);
        }
        return;
    };

    for (row, bits) in rows.iter().enumerate() {
        for col in 0..BITMAP_CELL {
            if bits & (1 << col) == 0 {
                continue;
            }
            let px = x + (col * unit) as i32;
            let py = y + (row as u32 * unit) as i32;
            draw_filled_rect_mut(canvas, Rect::at(px, py).of_size(unit, unit), color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_candidates_fall_back_to_bitmap() {
        let book = FontBook::load(&[PathBuf::from("/nonexistent/font.ttf")]);
        assert!(book.path().is_none());
        assert_eq!(book.sized(16).char_width('A'), 16);
        assert_eq!(book.sized(4).char_width('A'), 8);
    }

    #[test]
    fn test_unparseable_font_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("bogus.ttf");
        std::fs::write(&bogus, b"not a font").unwrap();
        let book = FontBook::load(&[bogus]);
        assert!(book.path().is_none());
    }

    #[test]
    fn test_sized_fonts_cached() {
        let book = FontBook::bitmap();
        let a = book.sized(16);
        let b = book.sized(16);
        assert!(Arc::ptr_eq(&a, &b));
        book.sized(24);
        assert_eq!(book.cached(), 2);
    }

    #[test]
    fn test_bitmap_draws_pixels() {
        let book = FontBook::bitmap();
        let mut canvas = RgbImage::from_pixel(32, 16, Rgb([255, 255, 255]));
        book.sized(16).draw(&mut canvas, 0, 0, Rgb([0, 0, 0]), "A");
        assert!(canvas.pixels().any(|p| *p == Rgb([0, 0, 0])));
    }

    #[test]
    fn test_unknown_glyph_draws_box() {
        let book = FontBook::bitmap();
        let mut canvas = RgbImage::from_pixel(16, 16, Rgb([255, 255, 255]));
        book.sized(16).draw(&mut canvas, 0, 0, Rgb([0, 0, 0]), "中");
        assert_eq!(*canvas.get_pixel(2, 2), Rgb([0, 0, 0]));
        assert_eq!(*canvas.get_pixel(8, 8), Rgb([255, 255, 255]));
    }
}
