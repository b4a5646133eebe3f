//! The instruction contract: what the hosted model is asked for and the
//! shape its reply must take.

mod gemini;

pub use gemini::{GeminiClient, retry_with_backoff};

use serde::{Deserialize, Serialize};

use crate::error::ThumbsmithError;

/// Structured enhancement directives returned by the instruction service.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ImageProcessingInstruction {
    /// Canvas size and output format.
    pub base: BaseSettings,
    /// Filters and overlays to apply.
    pub enhancements: Enhancements,
}

/// Base canvas settings.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct BaseSettings {
    /// Requested canvas size in pixels.
    pub size: CanvasSize,
    /// Requested output format.
    pub format: OutputFormat,
}

/// A width/height pair in pixels.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct CanvasSize {
    /// Canvas width in pixels.
    pub width: u32,
    /// Canvas height in pixels.
    pub height: u32,
}

/// Encodings a finished thumbnail can be written in.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// JPEG output.
    Jpg,
    /// PNG output.
    Png,
}

impl OutputFormat {
    /// File extension for the format.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpg => "jpg",
            Self::Png => "png",
        }
    }

    /// MIME type for the format.
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Jpg => "image/jpeg",
            Self::Png => "image/png",
        }
    }
}

/// The model's suggested filters and overlays; both lists may be empty.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Enhancements {
    /// Raster filter multipliers.
    #[serde(default)]
    pub filters: Vec<FilterInstruction>,
    /// Text/emoji elements to draw.
    #[serde(default)]
    pub overlays: Vec<OverlayInstruction>,
}

/// One raster filter adjustment.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct FilterInstruction {
    /// Which channel the multiplier applies to.
    #[serde(rename = "type")]
    pub kind: FilterKind,
    /// Multiplier; clamped before rendering.
    pub value: f32,
}

/// Filter channels the pipeline understands.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterKind {
    /// Spread around the mid-point.
    Contrast,
    /// Uniform brightness multiplier.
    Brightness,
    /// Grey-distance multiplier.
    Saturation,
}

/// Caller-controlled switches sent alongside the upload as the
/// `filterSettings` form field.
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterToggles {
    /// Keep contrast filters suggested by the model.
    pub contrast: bool,
    /// Keep brightness filters suggested by the model.
    pub brightness: bool,
    /// Keep saturation filters suggested by the model.
    pub saturation: bool,
    /// Ask the model for one contextual emoji overlay.
    pub add_emoji: bool,
}

impl Default for FilterToggles {
    fn default() -> Self {
        Self {
            contrast: true,
            brightness: true,
            saturation: true,
            add_emoji: false,
        }
    }
}

impl FilterToggles {
    /// True when filters of the given kind should survive mapping.
    pub fn allows(self, kind: FilterKind) -> bool {
        match kind {
            FilterKind::Contrast => self.contrast,
            FilterKind::Brightness => self.brightness,
            FilterKind::Saturation => self.saturation,
        }
    }
}

/// One element drawn onto the composited canvas.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct OverlayInstruction {
    /// Text or emoji.
    #[serde(rename = "type")]
    pub kind: OverlayKind,
    /// What to draw.
    pub content: String,
    /// Where to anchor it on the canvas.
    pub position: Position,
    /// How to draw it.
    #[serde(default)]
    pub style: OverlayStyle,
}

/// Kinds of overlay the model may suggest.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlayKind {
    /// A text caption.
    Text,
    /// A single emoji.
    Emoji,
}

/// A canvas position in pixels; clamped into the padded interior before use.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct Position {
    /// Horizontal anchor.
    pub x: f32,
    /// Vertical anchor.
    pub y: f32,
}

/// Styling the model may attach to an overlay. Everything is optional;
/// the configuration mapper fills in what is missing and overrides what
/// the model is not trusted to set.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OverlayStyle {
    /// Requested font family; advisory only.
    pub font: Option<String>,
    /// Font size in pixels.
    pub size: Option<f32>,
    /// Fill color as a hex code.
    pub color: Option<String>,
    /// Outline color as a hex code.
    pub outline: Option<String>,
    /// Outline width in pixels.
    pub outline_width: Option<f32>,
    /// Requested font weight; advisory only.
    pub weight: Option<String>,
    /// Requested alignment; always overridden to centre.
    pub alignment: Option<String>,
    /// Requested shadow; always overridden with the house shadow.
    pub shadow: Option<ShadowStyle>,
}

/// A drop shadow description.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShadowStyle {
    /// Shadow color.
    pub color: String,
    /// Blur radius in pixels.
    pub blur: f32,
    /// Horizontal offset in pixels.
    pub offset_x: f32,
    /// Vertical offset in pixels.
    pub offset_y: f32,
}

const PROMPT_TEMPLATE: &str = r#"You are a professional thumbnail design assistant. Analyze the user's request and generate processing instructions in this exact JSON format:

{
  "base": {
    "size": {
      "width": number,
      "height": number
    },
    "format": "jpg" or "png"
  },
  "enhancements": {
    "filters": [
      {
        "type": "contrast" | "brightness" | "saturation",
        "value": number between 0.9 and 1.1
      }
    ],
    "overlays": [
      {
        "type": "text",
        "content": "string",
        "position": {
          "x": number (must be between 100 and width-100 for padding),
          "y": number (must be between 100 and height-100 for padding)
        },
        "style": {
          "font": "string",
          "size": number between 24 and 72 or user request,
          "color": "hex_code",
          "outline": "hex_code (optional)"
        }
      }
    ]
  }
}

Rules:
1. All measurements should be in pixels
2. Maximum 3 text overlays
3. Font sizes between 24 and 72 but User can request any font size
4. Strict filter limits:
   - Saturation: max 1.1 (10% increase)
   - Brightness: between 0.9 and 1.1 (plus/minus 10%)
   - Contrast: between 0.9 and 1.1 (plus/minus 10%)
5. Text positioning must include padding:
   - Keep x positions between 100 and width-100 pixels
   - Keep y positions between 100 and height-100 pixels
6. Only output valid JSON, no additional text
7. User can specify the font family, font color, font outline color, font content
"#;

const EMOJI_RULE: &str = "8. Include exactly one overlay of type \"emoji\" whose content is a single emoji that matches the mood of the request";

/// Metadata about the uploaded source photo, substituted into the prompt.
#[derive(Clone, Copy, Debug)]
pub struct SourceMetadata {
    /// Source width in pixels.
    pub width: u32,
    /// Source height in pixels.
    pub height: u32,
    /// Source format label, eg `jpeg`.
    pub format: &'static str,
}

/// Builds the full prompt for one request by substituting the user's text
/// and the source image metadata into the fixed template.
pub fn build_prompt(user_input: &str, metadata: &SourceMetadata, add_emoji: bool) -> String {
    let mut prompt = PROMPT_TEMPLATE.to_string();
    if add_emoji {
        prompt.push_str(EMOJI_RULE);
        prompt.push('\n');
    }
    prompt.push_str(&format!(
        "\nUser Request: {}\nImage Metadata: {}x{} {}\n",
        user_input, metadata.width, metadata.height, metadata.format
    ));
    prompt
}

/// Strips an optional Markdown code fence that models like to wrap JSON in.
fn strip_code_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed)
}

/// Parses a model reply into an instruction, rejecting replies that lack
/// the two required top-level keys.
pub fn parse_instruction(reply: &str) -> Result<ImageProcessingInstruction, ThumbsmithError> {
    let body = strip_code_fence(reply);
    let value: serde_json::Value = serde_json::from_str(body).map_err(|err| {
        ThumbsmithError::InvalidInstruction(format!("reply is not valid JSON: {err}"))
    })?;
    if value.get("base").is_none() || value.get("enhancements").is_none() {
        return Err(ThumbsmithError::InvalidInstruction(
            "reply is missing the base/enhancements keys".to_string(),
        ));
    }
    serde_json::from_value(value).map_err(|err| {
        ThumbsmithError::InvalidInstruction(format!("reply does not match the contract: {err}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPLY: &str = r##"{
        "base": {"size": {"width": 1280, "height": 720}, "format": "jpg"},
        "enhancements": {
            "filters": [{"type": "saturation", "value": 1.05}],
            "overlays": [{
                "type": "text",
                "content": "JAPAN TRAVEL VLOG",
                "position": {"x": 640, "y": 200},
                "style": {"font": "Impact", "size": 72, "color": "#FFFFFF", "outline": "#000000"}
            }]
        }
    }"##;

    #[test]
    fn prompt_substitutes_request_and_metadata() {
        let metadata = SourceMetadata {
            width: 1920,
            height: 1080,
            format: "jpeg",
        };
        let prompt = build_prompt("make a YouTube thumbnail about my Japan trip", &metadata, false);
        assert!(prompt.contains("User Request: make a YouTube thumbnail about my Japan trip"));
        assert!(prompt.contains("Image Metadata: 1920x1080 jpeg"));
        assert!(!prompt.contains("emoji"));
    }

    #[test]
    fn prompt_gains_emoji_rule_when_requested() {
        let metadata = SourceMetadata {
            width: 640,
            height: 480,
            format: "png",
        };
        let prompt = build_prompt("celebrate", &metadata, true);
        assert!(prompt.contains("exactly one overlay of type \"emoji\""));
    }

    #[test]
    fn parses_a_plain_reply() {
        let instruction = parse_instruction(REPLY).expect("parse reply");
        assert_eq!(instruction.base.size.width, 1280);
        assert_eq!(instruction.base.format, OutputFormat::Jpg);
        assert_eq!(instruction.enhancements.overlays.len(), 1);
        assert_eq!(
            instruction.enhancements.overlays[0].style.size,
            Some(72.0)
        );
    }

    #[test]
    fn parses_a_fenced_reply() {
        let fenced = format!("```json\n{REPLY}\n```");
        let instruction = parse_instruction(&fenced).expect("parse fenced reply");
        assert_eq!(instruction.enhancements.filters.len(), 1);
    }

    #[test]
    fn rejects_a_reply_missing_required_keys() {
        let err = parse_instruction(r#"{"base": {"size": {"width": 1, "height": 1}, "format": "jpg"}}"#)
            .expect_err("must reject");
        assert!(matches!(err, ThumbsmithError::InvalidInstruction(_)));
    }

    #[test]
    fn rejects_non_json() {
        let err = parse_instruction("sorry, I cannot help with that").expect_err("must reject");
        assert!(matches!(err, ThumbsmithError::InvalidInstruction(_)));
    }
}
