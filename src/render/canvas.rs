//! The composition pipeline: gradient, photo blend, vignette, overlays,
//! noise, filter pass, encode.

use std::io::Cursor;

use ab_glyph::{FontArc, PxScale};
use image::imageops::FilterType;
use image::{DynamicImage, Rgba, RgbaImage};
use imageproc::drawing::{Blend, draw_text_mut, text_size};
use rand::RngExt;
use tracing::warn;

use super::EncodedThumbnail;
use super::config::{BackgroundStyle, OverlayConfig, ThumbnailConfig};
use crate::constants::JPEG_QUALITY;
use crate::error::ThumbsmithError;
use crate::instruction::OutputFormat;

/// Draws thumbnails from resolved configurations.
#[derive(Clone, Debug)]
pub struct Renderer {
    font: Option<FontArc>,
}

impl Renderer {
    /// Builds a renderer; without a font, overlays are skipped with a
    /// warning instead of failing the request.
    pub fn new(font: Option<FontArc>) -> Self {
        Self { font }
    }

    /// True when overlay text can actually be drawn.
    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Composites one thumbnail and encodes it in the configured format.
    pub fn render(
        &self,
        config: &ThumbnailConfig,
        source: &DynamicImage,
    ) -> Result<EncodedThumbnail, ThumbsmithError> {
        let mut canvas = RgbaImage::new(config.width, config.height);

        draw_gradient(&mut canvas, config.background);
        blend_source(&mut canvas, source, 1.0 - config.background.opacity);
        apply_vignette(&mut canvas, config.effects.vignette_strength);

        let mut canvas = match &self.font {
            Some(font) => {
                let mut blended = Blend(canvas);
                for overlay in &config.overlays {
                    draw_overlay(&mut blended, overlay, font);
                }
                blended.0
            }
            None => {
                if !config.overlays.is_empty() {
                    warn!(
                        "No overlay font is loaded, skipping {} overlay(s)",
                        config.overlays.len()
                    );
                }
                canvas
            }
        };

        apply_noise(&mut canvas, config.effects.noise_opacity);
        super::filters::apply_filters(&mut canvas, &config.filters);

        encode(canvas, config.format)
    }
}

fn lerp_channel(from: u8, to: u8, t: f32) -> u8 {
    (from as f32 + (to as f32 - from as f32) * t)
        .round()
        .clamp(0.0, 255.0) as u8
}

/// 45-degree linear gradient across the whole canvas.
fn draw_gradient(canvas: &mut RgbaImage, background: BackgroundStyle) {
    let (width, height) = canvas.dimensions();
    let span = (width + height).saturating_sub(2).max(1) as f32;
    for (x, y, pixel) in canvas.enumerate_pixels_mut() {
        let t = (x + y) as f32 / span;
        *pixel = Rgba([
            lerp_channel(background.start.0[0], background.end.0[0], t),
            lerp_channel(background.start.0[1], background.end.0[1], t),
            lerp_channel(background.start.0[2], background.end.0[2], t),
            0xFF,
        ]);
    }
}

/// Cover-resizes the source photo onto the canvas at the given opacity so
/// the gradient keeps showing through.
fn blend_source(canvas: &mut RgbaImage, source: &DynamicImage, opacity: f32) {
    let (width, height) = canvas.dimensions();
    let resized = source
        .resize_to_fill(width, height, FilterType::Lanczos3)
        .into_rgba8();
    for (x, y, src) in resized.enumerate_pixels() {
        let alpha = opacity * (src.0[3] as f32 / 255.0);
        let dst = canvas.get_pixel_mut(x, y);
        for channel in 0..3 {
            dst.0[channel] = lerp_channel(dst.0[channel], src.0[channel], alpha);
        }
    }
}

/// Radial darkening toward the edges; full strength at one canvas-width
/// from the centre.
fn apply_vignette(canvas: &mut RgbaImage, strength: f32) {
    let (width, height) = canvas.dimensions();
    let centre_x = width as f32 / 2.0;
    let centre_y = height as f32 / 2.0;
    let radius = width as f32;
    for (x, y, pixel) in canvas.enumerate_pixels_mut() {
        let dx = x as f32 - centre_x;
        let dy = y as f32 - centre_y;
        let falloff = ((dx * dx + dy * dy).sqrt() / radius).min(1.0);
        let factor = 1.0 - strength * falloff;
        for channel in 0..3 {
            pixel.0[channel] = (pixel.0[channel] as f32 * factor).round() as u8;
        }
    }
}

/// Shadow pass, outline pass, fill pass. The anchor is the centre of the
/// rendered text.
fn draw_overlay(canvas: &mut Blend<RgbaImage>, overlay: &OverlayConfig, font: &FontArc) {
    let scale = PxScale::from(overlay.font_size);
    let (text_width, text_height) = text_size(scale, font, &overlay.content);
    let x = overlay.x - (text_width / 2) as i32;
    let y = overlay.y - (text_height / 2) as i32;

    let shadow = overlay.shadow;
    draw_text_mut(
        canvas,
        shadow.color,
        x + shadow.offset_x,
        y + shadow.offset_y,
        scale,
        font,
        &overlay.content,
    );

    if let Some(outline) = overlay.outline {
        let width = overlay.outline_width;
        for (dx, dy) in [
            (-width, 0),
            (width, 0),
            (0, -width),
            (0, width),
            (-width, -width),
            (-width, width),
            (width, -width),
            (width, width),
        ] {
            draw_text_mut(canvas, outline, x + dx, y + dy, scale, font, &overlay.content);
        }
    }

    draw_text_mut(canvas, overlay.color, x, y, scale, font, &overlay.content);
}

/// One random offset per pixel, shared across the color channels.
fn apply_noise(canvas: &mut RgbaImage, opacity: f32) {
    if opacity <= 0.0 {
        return;
    }
    let mut rng = rand::rng();
    for pixel in canvas.pixels_mut() {
        let delta = rng.random_range(-0.5..0.5) * opacity * 255.0;
        for channel in 0..3 {
            pixel.0[channel] =
                (pixel.0[channel] as f32 + delta).round().clamp(0.0, 255.0) as u8;
        }
    }
}

fn encode(canvas: RgbaImage, format: OutputFormat) -> Result<EncodedThumbnail, ThumbsmithError> {
    let (width, height) = canvas.dimensions();
    let mut cursor = Cursor::new(Vec::new());
    match format {
        OutputFormat::Jpg => {
            let rgb = DynamicImage::ImageRgba8(canvas).into_rgb8();
            let encoder =
                image::codecs::jpeg::JpegEncoder::new_with_quality(&mut cursor, JPEG_QUALITY);
            rgb.write_with_encoder(encoder)?;
        }
        OutputFormat::Png => {
            DynamicImage::ImageRgba8(canvas).write_to(&mut cursor, image::ImageFormat::Png)?;
        }
    }
    Ok(EncodedThumbnail {
        bytes: cursor.into_inner(),
        width,
        height,
        format,
    })
}
