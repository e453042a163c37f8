//! Caption overlay rasterization
//!
//! Renders the caption onto a transparent RGBA canvas the size of the video
//! frame. The result is a pure function of its inputs: the same text, font,
//! size, color, canvas and layout always produce the same bytes.
//!
//! # Example
//!
//! ```rust,no_run
//! use cheerclip::overlay::{CanvasSize, CaptionLayout, CaptionSpec, FontResource, Rgb, TextOverlayRenderer};
//!
//! # fn main() -> cheerclip::Result<()> {
//! let font = FontResource::load("Pretendard-Bold.otf".as_ref())?;
//! let renderer = TextOverlayRenderer::new(CaptionLayout::default());
//! let spec = CaptionSpec::new("응원단! 민수가 응원해!", &font, 90.0, Rgb(0x00, 0x24, 0x70), CanvasSize::new(1920, 1080)?);
//! let overlay = renderer.render(&spec)?;
//! overlay.save_png("caption.png".as_ref())?;
//! # Ok(())
//! # }
//! ```

pub mod layout;

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use fontdue::layout::{CoordinateSystem, Layout, LayoutSettings, TextStyle};
use fontdue::{Font, FontSettings};
use image::{ImageFormat, RgbaImage};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::debug;

use crate::error::{CheerError, Result};

pub use layout::{split_caption, BottomLayout, CaptionLayout, LineExtent, PlacedLine, SplitLayout};

/// Validated frame dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanvasSize {
    pub width: u32,
    pub height: u32,
}

impl CanvasSize {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(CheerError::InvalidGeometry(format!(
                "canvas must be at least 1x1, got {width}x{height}"
            )));
        }
        Ok(Self { width, height })
    }

    /// Validate dimensions coming from untrusted frame metadata
    pub fn from_metadata(width: Option<f64>, height: Option<f64>) -> Result<Self> {
        let (Some(w), Some(h)) = (width, height) else {
            return Err(CheerError::InvalidGeometry(format!(
                "missing frame dimensions ({width:?}x{height:?})"
            )));
        };

        let valid = |v: f64| v.is_finite() && v >= 1.0 && v.fract() == 0.0 && v <= f64::from(u32::MAX);
        if !valid(w) || !valid(h) {
            return Err(CheerError::InvalidGeometry(format!(
                "frame dimensions must be positive integers, got {w}x{h}"
            )));
        }

        Self::new(w as u32, h as u32)
    }
}

/// Opaque fill color
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl FromStr for Rgb {
    type Err = CheerError;

    fn from_str(s: &str) -> Result<Self> {
        let hex = s.trim().trim_start_matches('#');
        if hex.len() != 6 || !hex.is_ascii() {
            return Err(CheerError::InvalidRequest(format!("color must be #RRGGBB, got {s:?}")));
        }
        let channel = |i: usize| {
            u8::from_str_radix(&hex[i..i + 2], 16)
                .map_err(|_| CheerError::InvalidRequest(format!("color must be #RRGGBB, got {s:?}")))
        };
        Ok(Self(channel(0)?, channel(2)?, channel(4)?))
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.0, self.1, self.2)
    }
}

impl Serialize for Rgb {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Rgb {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A parsed font face
pub struct FontResource {
    font: Font,
}

impl fmt::Debug for FontResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FontResource")
            .field("name", &self.font.name())
            .finish()
    }
}

impl FontResource {
    /// Load a TrueType/OpenType font from disk
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .map_err(|e| CheerError::FontLoad(format!("cannot read {}: {e}", path.display())))?;
        Self::from_bytes(bytes)
            .map_err(|e| CheerError::FontLoad(format!("{}: {e}", path.display())))
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let font = Font::from_bytes(bytes, FontSettings::default())
            .map_err(|e| CheerError::FontLoad(format!("unparseable font data: {e}")))?;
        Ok(Self { font })
    }

    /// Distance between consecutive baselines at `px`
    #[must_use]
    pub fn line_pitch(&self, px: f32) -> u32 {
        self.font
            .horizontal_line_metrics(px)
            .map_or(px * 1.2, |m| m.new_line_size)
            .ceil()
            .max(1.0) as u32
    }

    fn layout_line(&self, text: &str, px: f32) -> Layout {
        let mut layout = Layout::new(CoordinateSystem::PositiveYDown);
        layout.reset(&LayoutSettings::default());
        layout.append(&[&self.font], &TextStyle::new(text, px, 0));
        layout
    }

    /// Right and bottom edge of the inked area of `text` drawn at the origin
    #[must_use]
    pub fn measure(&self, text: &str, px: f32) -> LineExtent {
        if text.is_empty() {
            return LineExtent::default();
        }

        let layout = self.layout_line(text, px);
        layout
            .glyphs()
            .iter()
            .filter(|g| g.width > 0 && g.height > 0)
            .fold(LineExtent::default(), |acc, g| LineExtent {
                width: acc.width.max((g.x.round() as i64 + g.width as i64).max(0) as u32),
                height: acc.height.max((g.y.round() as i64 + g.height as i64).max(0) as u32),
            })
    }
}

/// Everything a caption render depends on
#[derive(Debug, Clone, Copy)]
pub struct CaptionSpec<'a> {
    pub text: &'a str,
    pub font: &'a FontResource,
    pub font_size: f32,
    pub color: Rgb,
    pub canvas: CanvasSize,
}

impl<'a> CaptionSpec<'a> {
    pub fn new(text: &'a str, font: &'a FontResource, font_size: f32, color: Rgb, canvas: CanvasSize) -> Self {
        Self {
            text,
            font,
            font_size,
            color,
            canvas,
        }
    }
}

/// RGBA caption image sized to a video frame
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedOverlay {
    image: RgbaImage,
    lines: Vec<PlacedLine>,
}

impl RenderedOverlay {
    #[must_use]
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Raw RGBA bytes, row-major
    #[must_use]
    pub fn as_raw(&self) -> &[u8] {
        self.image.as_raw()
    }

    /// Lines and the positions they were drawn at
    #[must_use]
    pub fn lines(&self) -> &[PlacedLine] {
        &self.lines
    }

    /// Alpha of the pixel at (x, y)
    #[must_use]
    pub fn alpha_at(&self, x: u32, y: u32) -> u8 {
        self.image.get_pixel(x, y).0[3]
    }

    /// True when no pixel is visible
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.image.pixels().all(|p| p.0[3] == 0)
    }

    pub fn save_png(&self, path: &Path) -> Result<()> {
        self.image
            .save_with_format(path, ImageFormat::Png)
            .map_err(|e| CheerError::Encode(format!("cannot write overlay {}: {e}", path.display())))
    }
}

/// Caption renderer for one layout
#[derive(Debug, Clone, Default)]
pub struct TextOverlayRenderer {
    layout: CaptionLayout,
}

impl TextOverlayRenderer {
    #[must_use]
    pub fn new(layout: CaptionLayout) -> Self {
        Self { layout }
    }

    #[must_use]
    pub fn layout(&self) -> &CaptionLayout {
        &self.layout
    }

    /// Rasterize a caption onto a transparent canvas
    pub fn render(&self, spec: &CaptionSpec<'_>) -> Result<RenderedOverlay> {
        let canvas = CanvasSize::new(spec.canvas.width, spec.canvas.height)?;
        if !spec.font_size.is_finite() || spec.font_size <= 0.0 {
            return Err(CheerError::InvalidGeometry(format!(
                "font size must be positive, got {}",
                spec.font_size
            )));
        }

        let px = spec.font_size;
        let lines = self.layout.place(spec.text, canvas, spec.font.line_pitch(px), |line| {
            spec.font.measure(line, px)
        });

        let mut image = RgbaImage::new(canvas.width, canvas.height);
        for line in &lines {
            draw_line(&mut image, spec.font, px, line, spec.color);
        }

        debug!(
            "Rendered {} caption line(s) on {}x{} canvas",
            lines.iter().filter(|l| !l.text.is_empty()).count(),
            canvas.width,
            canvas.height
        );

        Ok(RenderedOverlay { image, lines })
    }
}

fn draw_line(image: &mut RgbaImage, font: &FontResource, px: f32, line: &PlacedLine, color: Rgb) {
    if line.text.is_empty() {
        return;
    }

    let layout = font.layout_line(&line.text, px);
    for glyph in layout.glyphs() {
        if glyph.width == 0 || glyph.height == 0 {
            continue;
        }
        let (_, bitmap) = font.font.rasterize_config(glyph.key);
        let origin_x = line.x + glyph.x.round() as i64;
        let origin_y = line.y + glyph.y.round() as i64;
        blend_glyph(image, origin_x, origin_y, glyph.width, &bitmap, color);
    }
}

/// Composite glyph coverage over the canvas ("source over", single color)
fn blend_glyph(image: &mut RgbaImage, origin_x: i64, origin_y: i64, glyph_width: usize, coverage: &[u8], color: Rgb) {
    let (width, height) = (i64::from(image.width()), i64::from(image.height()));

    for (i, &alpha) in coverage.iter().enumerate() {
        if alpha == 0 {
            continue;
        }
        let x = origin_x + (i % glyph_width) as i64;
        let y = origin_y + (i / glyph_width) as i64;
        if x < 0 || y < 0 || x >= width || y >= height {
            continue;
        }

        let pixel = image.get_pixel_mut(x as u32, y as u32);
        let below = u32::from(pixel.0[3]);
        let above = u32::from(alpha);
        let combined = above + below * (255 - above) / 255;
        pixel.0 = [color.0, color.1, color.2, combined.min(255) as u8];
    }
}
