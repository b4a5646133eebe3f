//! Shared constants/setters for things
//!

use std::sync::LazyLock;
use std::time::Duration;

/// Width of every generated thumbnail canvas, in pixels.
pub const CANVAS_WIDTH: u32 = 1280;

/// Height of every generated thumbnail canvas, in pixels.
pub const CANVAS_HEIGHT: u32 = 720;

/// Lower clamp bound for filter multipliers.
pub const FILTER_MIN: f32 = 0.9;

/// Upper clamp bound for filter multipliers.
pub const FILTER_MAX: f32 = 1.1;

/// Overlay positions are kept this many pixels away from every canvas edge.
pub const OVERLAY_PADDING: u32 = 100;

/// Maximum number of overlays drawn on one thumbnail.
pub const MAX_OVERLAYS: usize = 3;

/// Smallest allowed overlay font size, in pixels.
pub const FONT_SIZE_MIN: f32 = 24.0;

/// Largest allowed overlay font size, in pixels.
pub const FONT_SIZE_MAX: f32 = 72.0;

/// Overlay font size used when the instruction does not provide one.
pub const FONT_SIZE_DEFAULT: f32 = 48.0;

/// Background gradient start color (`#FF6B6B`).
pub const GRADIENT_START: image::Rgba<u8> = image::Rgba([0xFF, 0x6B, 0x6B, 0xFF]);

/// Background gradient end color (`#4ECDC4`).
pub const GRADIENT_END: image::Rgba<u8> = image::Rgba([0x4E, 0xCD, 0xC4, 0xFF]);

/// How strongly the gradient shows through the source photo.
pub const BACKGROUND_OPACITY: f32 = 0.7;

/// Radial vignette darkening at the canvas edge.
pub const VIGNETTE_STRENGTH: f32 = 0.3;

/// Per-pixel noise amplitude relative to full brightness.
pub const NOISE_OPACITY: f32 = 0.02;

/// JPEG quality used when encoding finished thumbnails.
pub const JPEG_QUALITY: u8 = 95;

/// Maximum attempts against the instruction service before surfacing the error.
pub const INSTRUCTION_MAX_RETRIES: u32 = 3;

/// Delay before the first instruction retry; doubles on each attempt.
pub const INSTRUCTION_INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Base URL of the hosted instruction service.
pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com";

/// Cloudinary folder that receives uploads.
pub const UPLOAD_FOLDER: &str = "thumbnails";

/// Largest accepted multipart upload body.
pub const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// Max age (in seconds) for stored thumbnail cache entries; the filenames
/// are unique per render so clients can cache them forever.
pub const THUMBNAIL_CACHE_MAX_AGE_SECONDS: u64 = 60 * 60 * 24 * 365;

/// Cache-Control value for stored thumbnail responses.
pub static THUMBNAIL_CACHE_CONTROL: LazyLock<String> = LazyLock::new(|| {
    format!(
        "public, max-age={}, immutable",
        THUMBNAIL_CACHE_MAX_AGE_SECONDS
    )
});

/// Font locations scanned when `--font-path` is not given.
pub const FONT_CANDIDATE_PATHS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Bold.ttf",
    "/usr/share/fonts/TTF/DejaVuSans-Bold.ttf",
    "/System/Library/Fonts/Supplemental/Arial Bold.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
];
