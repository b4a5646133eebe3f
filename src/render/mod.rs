//! Thumbnail composition: mapping model instructions onto a canvas
//! configuration and drawing the result.

mod canvas;
mod config;
mod filters;

pub use canvas::Renderer;
pub use config::{BackgroundStyle, EffectSettings, OverlayConfig, Shadow, ThumbnailConfig};

use std::path::Path;

use ab_glyph::FontArc;
use tracing::{info, warn};

use crate::constants::FONT_CANDIDATE_PATHS;
use crate::instruction::OutputFormat;

/// A finished, encoded thumbnail ready for storage.
#[derive(Clone, Debug)]
pub struct EncodedThumbnail {
    /// Encoded image bytes.
    pub bytes: Vec<u8>,
    /// Pixel width.
    pub width: u32,
    /// Pixel height.
    pub height: u32,
    /// Encoding the bytes are in.
    pub format: OutputFormat,
}

/// Loads the overlay font from the explicit path when given, falling back
/// to a scan of well-known system locations. Returns `None` when no
/// usable font exists; overlays are skipped in that case.
pub fn load_font(explicit: Option<&Path>) -> Option<FontArc> {
    if let Some(path) = explicit {
        match std::fs::read(path) {
            Ok(bytes) => match FontArc::try_from_vec(bytes) {
                Ok(font) => {
                    info!("Loaded overlay font from {}", path.display());
                    return Some(font);
                }
                Err(err) => warn!("Could not parse font {}: {}", path.display(), err),
            },
            Err(err) => warn!("Could not read font {}: {}", path.display(), err),
        }
    }

    for candidate in FONT_CANDIDATE_PATHS {
        if let Ok(bytes) = std::fs::read(candidate)
            && let Ok(font) = FontArc::try_from_vec(bytes)
        {
            info!("Loaded overlay font from {}", candidate);
            return Some(font);
        }
    }

    warn!("No overlay font found; text overlays will be skipped");
    None
}
