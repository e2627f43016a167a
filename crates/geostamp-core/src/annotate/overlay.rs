//! Caption layout and drawing.
//!
//! Captions sit in rows above the bottom edge of the photo. Row 0 holds the
//! coordinates on the left and the time on the right; the address stacks
//! above the coordinates. Each caption gets a semi-transparent box sized to
//! its text.

use ab_glyph::FontVec;
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut, text_size, Blend};
use imageproc::rect::Rect;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::AnnotationConfig;
use crate::error::PipelineError;
use crate::types::Address;

/// Fonts tried, in order, when no font is configured.
const SYSTEM_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/System/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// Smallest scale applied to the reference sizes, so captions stay legible
/// on thumbnails.
const MIN_SCALE: f32 = 0.25;

/// Caption sizes in pixels for one photo size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayStyle {
    pub font_size: f32,
    pub box_height: u32,
    pub padding: u32,
    pub margin: u32,
}

impl OverlayStyle {
    /// Scale the configured sizes to a photo of the given height.
    pub fn for_height(config: &AnnotationConfig, image_height: u32) -> Self {
        let scale = (image_height as f32 / config.reference_height as f32).max(MIN_SCALE);
        let px = |v: u32| (v as f32 * scale).round() as u32;
        Self {
            font_size: config.font_size * scale,
            box_height: px(config.box_height).max(1),
            padding: px(config.box_padding),
            margin: px(config.box_margin),
        }
    }
}

/// Overlay sizing is derived from the first photo a stage draws on, then
/// reused until the stage is initialized again.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum OverlayState {
    #[default]
    Unconfigured,
    Configured(OverlayStyle),
}

impl OverlayState {
    pub fn style(&self) -> Option<OverlayStyle> {
        match self {
            OverlayState::Unconfigured => None,
            OverlayState::Configured(style) => Some(*style),
        }
    }
}

/// Which image edge a caption box hugs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    Left,
    Right,
}

/// A caption before layout. Row 0 is the bottom row.
#[derive(Debug, Clone, PartialEq)]
pub struct Caption {
    pub text: String,
    pub anchor: Anchor,
    pub row: u32,
}

impl Caption {
    pub fn new(text: impl Into<String>, anchor: Anchor, row: u32) -> Self {
        Self {
            text: text.into(),
            anchor,
            row,
        }
    }
}

/// The captions for one photo, in drawing order.
///
/// A two-line address puts the street on row 2 and the locality on row 1.
/// With one line it goes on row 1. Without an address, `unknown_text` takes
/// row 1.
pub fn captions(
    coordinates: String,
    time: String,
    address: Option<&Address>,
    unknown_text: &str,
) -> Vec<Caption> {
    let mut out = vec![
        Caption::new(coordinates, Anchor::Left, 0),
        Caption::new(time, Anchor::Right, 0),
    ];

    match address.and_then(|a| a.line(0).map(|first| (first, a.line(1)))) {
        Some((street, Some(locality))) => {
            out.push(Caption::new(street, Anchor::Left, 2));
            out.push(Caption::new(locality, Anchor::Left, 1));
        }
        Some((only, None)) => out.push(Caption::new(only, Anchor::Left, 1)),
        None => out.push(Caption::new(unknown_text, Anchor::Left, 1)),
    }
    out
}

/// A caption placed on the image.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionBox {
    pub text: String,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Place captions on an image of the given size. `measure` returns the
/// rendered width of a text in pixels.
pub fn layout(
    captions: &[Caption],
    style: &OverlayStyle,
    image_width: u32,
    image_height: u32,
    measure: impl Fn(&str) -> u32,
) -> Vec<CaptionBox> {
    let margin = style.margin as i32;
    let box_height = style.box_height as i32;

    captions
        .iter()
        .map(|caption| {
            let width = measure(&caption.text) + 2 * style.padding;
            let x = match caption.anchor {
                Anchor::Left => margin,
                Anchor::Right => image_width as i32 - margin - width as i32,
            };
            let y = image_height as i32 - margin - box_height * (caption.row as i32 + 1);
            CaptionBox {
                text: caption.text.clone(),
                x,
                y,
                width,
                height: style.box_height,
            }
        })
        .collect()
}

/// Draws caption boxes onto RGBA images.
pub struct Painter {
    font: Option<Arc<FontVec>>,
    background: Rgba<u8>,
    foreground: Rgba<u8>,
}

impl Painter {
    pub fn new(font: Option<Arc<FontVec>>, config: &AnnotationConfig) -> Self {
        Self {
            font,
            background: Rgba(config.background_rgba),
            foreground: Rgba(config.text_rgba),
        }
    }

    /// Rendered width of `text`. Without a font the width is estimated so the
    /// boxes keep a sensible shape.
    pub fn measure(&self, text: &str, font_size: f32) -> u32 {
        match &self.font {
            Some(font) => text_size(font_size, font.as_ref(), text).0,
            None => (text.chars().count() as f32 * font_size * 0.55).ceil() as u32,
        }
    }

    /// Draw every box, then its text if a font is loaded.
    pub fn paint(&self, image: RgbaImage, boxes: &[CaptionBox], style: &OverlayStyle) -> RgbaImage {
        let mut canvas = Blend(image);
        for caption in boxes {
            if caption.width == 0 || caption.height == 0 {
                continue;
            }
            let rect = Rect::at(caption.x, caption.y).of_size(caption.width, caption.height);
            draw_filled_rect_mut(&mut canvas, rect, self.background);

            if let Some(font) = &self.font {
                draw_text_mut(
                    &mut canvas,
                    self.foreground,
                    caption.x + style.padding as i32,
                    caption.y + style.padding as i32,
                    style.font_size,
                    font.as_ref(),
                    &caption.text,
                );
            }
        }
        canvas.0
    }
}

/// Load a TrueType/OpenType font from disk.
pub fn load_font(path: &Path) -> Result<FontVec, PipelineError> {
    let data = std::fs::read(path).map_err(|_| PipelineError::FileNotFound(path.to_path_buf()))?;
    FontVec::try_from_vec(data).map_err(|_| PipelineError::Decode {
        path: path.to_path_buf(),
        message: "Failed to parse font file".to_string(),
    })
}

/// Try common system font locations.
pub fn system_font() -> Option<FontVec> {
    for path in SYSTEM_FONTS {
        if let Ok(font) = load_font(Path::new(path)) {
            info!("Loaded system font: {}", path);
            return Some(font);
        }
    }
    debug!("No system font found, caption text will be skipped");
    None
}
