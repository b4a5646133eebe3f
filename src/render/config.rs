//! Mapping from the model's instruction to a fully resolved rendering
//! configuration, with every untrusted value clamped or replaced.

use image::Rgba;

use crate::constants::{
    BACKGROUND_OPACITY, CANVAS_HEIGHT, CANVAS_WIDTH, FILTER_MAX, FILTER_MIN, FONT_SIZE_DEFAULT,
    FONT_SIZE_MAX, FONT_SIZE_MIN, GRADIENT_END, GRADIENT_START, MAX_OVERLAYS, NOISE_OPACITY,
    OVERLAY_PADDING, VIGNETTE_STRENGTH,
};
use crate::instruction::{
    FilterInstruction, FilterToggles, ImageProcessingInstruction, OutputFormat, OverlayKind,
};

const DEFAULT_TEXT_COLOR: Rgba<u8> = Rgba([0xFF, 0xFF, 0xFF, 0xFF]);

/// The house drop shadow: half-transparent black, offset down-right.
const HOUSE_SHADOW: Shadow = Shadow {
    color: Rgba([0x00, 0x00, 0x00, 0x80]),
    offset_x: 5,
    offset_y: 5,
};

/// Gradient endpoints and how strongly the gradient shows through the photo.
#[derive(Clone, Copy, Debug)]
pub struct BackgroundStyle {
    /// Gradient color at the top-left corner.
    pub start: Rgba<u8>,
    /// Gradient color at the bottom-right corner.
    pub end: Rgba<u8>,
    /// Share of the background kept when the photo is blended over it.
    pub opacity: f32,
}

/// Edge-effect parameters.
#[derive(Clone, Copy, Debug)]
pub struct EffectSettings {
    /// Radial darkening toward the canvas edge.
    pub vignette_strength: f32,
    /// Per-pixel noise amplitude.
    pub noise_opacity: f32,
}

/// A drop shadow drawn underneath an overlay.
#[derive(Clone, Copy, Debug)]
pub struct Shadow {
    /// Shadow color, including its translucency.
    pub color: Rgba<u8>,
    /// Horizontal offset in pixels.
    pub offset_x: i32,
    /// Vertical offset in pixels.
    pub offset_y: i32,
}

/// One overlay with every value resolved and clamped.
#[derive(Clone, Debug)]
pub struct OverlayConfig {
    /// Text or emoji.
    pub kind: OverlayKind,
    /// What to draw.
    pub content: String,
    /// Horizontal anchor, clamped into the padded interior.
    pub x: i32,
    /// Vertical anchor, clamped into the padded interior.
    pub y: i32,
    /// Font size in pixels, clamped into the allowed band.
    pub font_size: f32,
    /// Fill color.
    pub color: Rgba<u8>,
    /// Outline color, when the model asked for one.
    pub outline: Option<Rgba<u8>>,
    /// Outline width in pixels.
    pub outline_width: i32,
    /// Drop shadow; always the house shadow.
    pub shadow: Shadow,
}

/// Everything the renderer needs for one thumbnail.
#[derive(Clone, Debug)]
pub struct ThumbnailConfig {
    /// Canvas width in pixels.
    pub width: u32,
    /// Canvas height in pixels.
    pub height: u32,
    /// Output encoding.
    pub format: OutputFormat,
    /// Background gradient settings.
    pub background: BackgroundStyle,
    /// Clamped filter multipliers, in application order.
    pub filters: Vec<FilterInstruction>,
    /// Clamped overlays, in draw order.
    pub overlays: Vec<OverlayConfig>,
    /// Vignette and noise settings.
    pub effects: EffectSettings,
}

impl ThumbnailConfig {
    /// Derives the rendering configuration from a model instruction. The
    /// canvas is always 1280x720; filter values and overlay positions are
    /// clamped, the overlay list is truncated, and cosmetic defaults the
    /// model is not trusted with are injected.
    pub fn from_instruction(
        instruction: &ImageProcessingInstruction,
        toggles: FilterToggles,
    ) -> Self {
        let width = CANVAS_WIDTH;
        let height = CANVAS_HEIGHT;

        let filters = instruction
            .enhancements
            .filters
            .iter()
            .filter(|filter| toggles.allows(filter.kind))
            .map(|filter| FilterInstruction {
                kind: filter.kind,
                value: filter.value.clamp(FILTER_MIN, FILTER_MAX),
            })
            .collect();

        let overlays = instruction
            .enhancements
            .overlays
            .iter()
            .take(MAX_OVERLAYS)
            .map(|overlay| OverlayConfig {
                kind: overlay.kind,
                content: overlay.content.clone(),
                x: clamp_position(overlay.position.x, width),
                y: clamp_position(overlay.position.y, height),
                font_size: overlay
                    .style
                    .size
                    .unwrap_or(FONT_SIZE_DEFAULT)
                    .clamp(FONT_SIZE_MIN, FONT_SIZE_MAX),
                color: overlay
                    .style
                    .color
                    .as_deref()
                    .and_then(parse_hex_color)
                    .unwrap_or(DEFAULT_TEXT_COLOR),
                outline: overlay.style.outline.as_deref().and_then(parse_hex_color),
                outline_width: overlay
                    .style
                    .outline_width
                    .map(|value| value.round().max(1.0) as i32)
                    .unwrap_or(2),
                shadow: HOUSE_SHADOW,
            })
            .collect();

        Self {
            width,
            height,
            format: instruction.base.format,
            background: BackgroundStyle {
                start: GRADIENT_START,
                end: GRADIENT_END,
                opacity: BACKGROUND_OPACITY,
            },
            filters,
            overlays,
            effects: EffectSettings {
                vignette_strength: VIGNETTE_STRENGTH,
                noise_opacity: NOISE_OPACITY,
            },
        }
    }
}

fn clamp_position(value: f32, extent: u32) -> i32 {
    let min = OVERLAY_PADDING as f32;
    let max = extent.saturating_sub(OVERLAY_PADDING) as f32;
    value.clamp(min, max).round() as i32
}

/// Parses `#RGB` / `#RRGGBB` hex colors; the leading `#` is optional.
fn parse_hex_color(value: &str) -> Option<Rgba<u8>> {
    let digits = value.trim().trim_start_matches('#');
    match digits.len() {
        3 => {
            let mut channels = [0u8; 3];
            for (index, digit) in digits.chars().enumerate() {
                let nibble = digit.to_digit(16)? as u8;
                channels[index] = nibble << 4 | nibble;
            }
            Some(Rgba([channels[0], channels[1], channels[2], 0xFF]))
        }
        6 => {
            let red = u8::from_str_radix(digits.get(0..2)?, 16).ok()?;
            let green = u8::from_str_radix(digits.get(2..4)?, 16).ok()?;
            let blue = u8::from_str_radix(digits.get(4..6)?, 16).ok()?;
            Some(Rgba([red, green, blue, 0xFF]))
        }
        _ => None,
    }
}
