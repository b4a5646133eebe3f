use anyhow::{Context, Result, anyhow};
use clap::Parser;
use std::path::PathBuf;

use thumbsmith::instruction::{FilterToggles, GeminiClient, SourceMetadata, build_prompt};
use thumbsmith::render::{Renderer, ThumbnailConfig, load_font};
use thumbsmith::store::{format_label, read_metadata};

/// Run the instruction + composite pipeline once against a local photo.
///
/// Minimal UX:
///   make_thumbnail japan.jpg "make a YouTube thumbnail about my Japan trip"
#[derive(Parser, Debug)]
#[command(name = "make_thumbnail")]
#[command(about = "Create one thumbnail from a local photo without running the server")]
struct Args {
    /// Source photo (JPEG or PNG)
    image: PathBuf,

    /// Free-text instruction for the thumbnail
    instruction: Vec<String>,

    /// Gemini API key
    #[arg(required = true, long, env = "GEMINI_API_KEY", hide_env_values = true)]
    gemini_api_key: String,

    /// Model used to generate processing instructions
    #[arg(long, default_value = "gemini-2.5-flash")]
    gemini_model: String,

    /// Ask for one contextual emoji overlay
    #[arg(long, default_value_t = false)]
    add_emoji: bool,

    /// Output directory (final image goes in <dir>/thumbnail-<timestamp>.<ext>)
    #[arg(long, default_value = "./processed", env = "THUMBSMITH_OUTPUT_DIR")]
    out_dir: PathBuf,

    /// Font used for overlay text; system locations are scanned when unset
    #[arg(long, env = "THUMBSMITH_FONT_PATH")]
    font_path: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let instruction_text = args.instruction.join(" ");
    if instruction_text.trim().is_empty() {
        return Err(anyhow!("Please provide an instruction for the thumbnail"));
    }

    let bytes = std::fs::read(&args.image)
        .with_context(|| format!("Failed to read {}", args.image.display()))?;
    let source = image::load_from_memory(&bytes).context("Failed to decode the source photo")?;
    let source_format = image::guess_format(&bytes).ok();
    let metadata = SourceMetadata {
        width: source.width(),
        height: source.height(),
        format: source_format.map(format_label).unwrap_or("jpeg"),
    };
    eprintln!(
        "Source: {}x{} {}",
        metadata.width, metadata.height, metadata.format
    );

    let client = GeminiClient::new(
        reqwest::Client::new(),
        args.gemini_api_key.clone(),
        args.gemini_model.clone(),
    );
    let prompt = build_prompt(&instruction_text, &metadata, args.add_emoji);
    let mime_type = source_format
        .map(|format| format.to_mime_type())
        .unwrap_or("image/jpeg");

    eprintln!("Requesting processing instructions...");
    let instruction = client
        .generate_instructions(&prompt, &bytes, mime_type)
        .await?;
    eprintln!(
        "Suggested settings: {}",
        serde_json::to_string_pretty(&instruction).unwrap_or_default()
    );

    let config = ThumbnailConfig::from_instruction(&instruction, FilterToggles::default());
    let renderer = Renderer::new(load_font(args.font_path.as_deref()));
    let encoded = renderer.render(&config, &source)?;

    std::fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("Failed to create {}", args.out_dir.display()))?;
    let output = args.out_dir.join(format!(
        "thumbnail-{}.{}",
        chrono::Utc::now().timestamp_millis(),
        encoded.format.extension()
    ));
    std::fs::write(&output, &encoded.bytes)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    let final_metadata = read_metadata(&encoded.bytes)?;
    eprintln!(
        "Saved: {} ({}x{} {}, {} bytes)",
        output.display(),
        final_metadata.width,
        final_metadata.height,
        final_metadata.format,
        final_metadata.size
    );
    Ok(())
}
