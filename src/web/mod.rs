//! The HTTP surface: one upload endpoint, the form page, and serving of
//! locally stored thumbnails.

use std::num::NonZeroU16;
use std::path::PathBuf;
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use tracing::{debug, error, info};

use crate::cli::{CliOptions, StorageBackend};
use crate::constants::MAX_UPLOAD_BYTES;
use crate::error::ThumbsmithError;
use crate::instruction::{FilterToggles, GeminiClient, SourceMetadata, build_prompt};
use crate::render::{Renderer, ThumbnailConfig, load_font};
use crate::store::{
    CloudinaryStore, LocalStore, ProcessedImage, ThumbnailStore, format_label, read_metadata,
};

mod images;
mod views;

use images::processed_image_handler;
use views::IndexTemplate;

const MISSING_FIELDS: &str = "Image and instruction are required";

/// Read-only process-wide state shared by every request.
#[derive(Clone)]
pub struct AppState {
    gemini: GeminiClient,
    store: ThumbnailStore,
    renderer: Arc<Renderer>,
    output_dir: PathBuf,
}

impl AppState {
    /// Builds the process-wide clients from the CLI options. Missing
    /// credentials for the instruction service or the selected storage
    /// backend are a startup error.
    pub fn from_cli(cli: &CliOptions) -> Result<Self, anyhow::Error> {
        let Some(api_key) = cli.gemini_api_key.clone() else {
            anyhow::bail!("GEMINI_API_KEY must be set");
        };

        let http = reqwest::Client::new();
        let gemini = GeminiClient::new(http.clone(), api_key, cli.gemini_model.clone());

        let public_base = cli
            .public_url
            .clone()
            .unwrap_or_else(|| format!("http://{}:{}", cli.listen_address, cli.port));

        let store = match cli.storage {
            StorageBackend::Cloudinary => {
                let Some(credential_url) = cli.cloudinary_url.as_deref() else {
                    anyhow::bail!("CLOUDINARY_URL must be set when --storage cloudinary");
                };
                ThumbnailStore::Cloudinary(CloudinaryStore::from_url(http, credential_url)?)
            }
            StorageBackend::Local => {
                ThumbnailStore::Local(LocalStore::new(cli.output_dir.clone(), &public_base))
            }
        };

        let renderer = Renderer::new(load_font(cli.font_path.as_deref()));

        Ok(Self {
            gemini,
            store,
            renderer: Arc::new(renderer),
            output_dir: cli.output_dir.clone(),
        })
    }
}

struct UploadForm {
    image: Vec<u8>,
    instruction: String,
    toggles: FilterToggles,
}

async fn parse_upload(mut multipart: Multipart) -> Result<UploadForm, ThumbsmithError> {
    let mut image = None;
    let mut instruction = None;
    let mut toggles = FilterToggles::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ThumbsmithError::BadRequest(err.to_string()))?
    {
        match field.name() {
            Some("image") => {
                let data = field
                    .bytes()
                    .await
                    .map_err(|err| ThumbsmithError::BadRequest(err.to_string()))?;
                if !data.is_empty() {
                    image = Some(data.to_vec());
                }
            }
            Some("instruction") => {
                let text = field
                    .text()
                    .await
                    .map_err(|err| ThumbsmithError::BadRequest(err.to_string()))?;
                if !text.trim().is_empty() {
                    instruction = Some(text);
                }
            }
            Some("filterSettings") => {
                let text = field
                    .text()
                    .await
                    .map_err(|err| ThumbsmithError::BadRequest(err.to_string()))?;
                toggles = serde_json::from_str(&text).map_err(|err| {
                    ThumbsmithError::BadRequest(format!("invalid filterSettings: {err}"))
                })?;
            }
            _ => {}
        }
    }

    let (Some(image), Some(instruction)) = (image, instruction) else {
        return Err(ThumbsmithError::BadRequest(MISSING_FIELDS.to_string()));
    };

    Ok(UploadForm {
        image,
        instruction,
        toggles,
    })
}

/// handles the POST /api/process-image upload
async fn process_image_handler(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<ProcessedImage>, ThumbsmithError> {
    let form = parse_upload(multipart).await?;

    let source = image::load_from_memory(&form.image).map_err(|err| {
        ThumbsmithError::BadRequest(format!("could not decode the uploaded image: {err}"))
    })?;
    let source_format = image::guess_format(&form.image).ok();
    let metadata = SourceMetadata {
        width: source.width(),
        height: source.height(),
        format: source_format.map(format_label).unwrap_or("jpeg"),
    };
    debug!(
        "Requesting instructions for a {}x{} {} source",
        metadata.width, metadata.height, metadata.format
    );

    let prompt = build_prompt(&form.instruction, &metadata, form.toggles.add_emoji);
    let mime_type = source_format
        .map(|format| format.to_mime_type())
        .unwrap_or("image/jpeg");
    let instruction = state
        .gemini
        .generate_instructions(&prompt, &form.image, mime_type)
        .await?;

    let config = ThumbnailConfig::from_instruction(&instruction, form.toggles);
    let renderer = state.renderer.clone();
    let encoded = tokio::task::spawn_blocking(move || renderer.render(&config, &source))
        .await
        .map_err(|err| {
            ThumbsmithError::InternalServerError(format!("render task failed: {err}"))
        })??;

    let stored = state.store.put(&encoded).await?;
    let metadata = read_metadata(&encoded.bytes)?;
    info!("Processed thumbnail stored at {}", stored.url);

    Ok(Json(ProcessedImage {
        thumbnail_url: stored.url,
        metadata,
    }))
}

async fn index_handler() -> IndexTemplate {
    IndexTemplate
}

async fn styles_handler() -> impl IntoResponse {
    const STYLES: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/static/styles.css"));
    ([(CONTENT_TYPE, "text/css")], STYLES)
}

fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", axum::routing::get(index_handler))
        .route("/static/styles.css", axum::routing::get(styles_handler))
        .route(
            "/api/process-image",
            axum::routing::post(process_image_handler),
        )
        .route(
            "/processed/{filename}",
            axum::routing::get(processed_image_handler),
        )
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
}

/// Binds the listener and serves requests until the process ends.
pub async fn setup_server(
    listen_addr: &str,
    port: NonZeroU16,
    state: AppState,
) -> Result<(), anyhow::Error> {
    let app = create_router().with_state(state);

    let addr = format!("{}:{}", listen_addr, port);
    info!("Starting server on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    if let Err(err) = axum::serve(listener, app).await {
        error!("Server error: {}", err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::body::Body;
    use axum::http::{Request, StatusCode, header::IF_NONE_MATCH};
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    const BOUNDARY: &str = "thumbsmith-test-boundary";

    const INSTRUCTION_REPLY: &str = r##"{
        "base": {"size": {"width": 1280, "height": 720}, "format": "jpg"},
        "enhancements": {
            "filters": [{"type": "saturation", "value": 5.0}],
            "overlays": [{
                "type": "text",
                "content": "HELLO",
                "position": {"x": 640, "y": 9000},
                "style": {"size": 72, "color": "#FFFFFF", "outline": "#000000"}
            }]
        }
    }"##;

    async fn stub_gemini() -> String {
        async fn stub_generate() -> Json<Value> {
            Json(json!({
                "candidates": [{
                    "content": {"parts": [{"text": INSTRUCTION_REPLY}]}
                }]
            }))
        }

        let app = Router::new().route(
            "/v1beta/models/{*rest}",
            axum::routing::post(stub_generate),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind stub listener");
        let addr = listener.local_addr().expect("stub listener address");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{addr}")
    }

    fn test_state(gemini_base: &str, output_dir: &std::path::Path) -> AppState {
        let http = reqwest::Client::new();
        let gemini = GeminiClient::new(http, "test-key".to_string(), "gemini-test".to_string())
            .with_base_url(gemini_base.to_string());
        AppState {
            gemini,
            store: ThumbnailStore::Local(LocalStore::new(
                output_dir.to_path_buf(),
                "http://thumbs.test",
            )),
            renderer: Arc::new(Renderer::new(load_font(None))),
            output_dir: output_dir.to_path_buf(),
        }
    }

    fn sample_jpeg(width: u32, height: u32) -> Vec<u8> {
        let canvas =
            image::RgbImage::from_pixel(width, height, image::Rgb([120, 90, 60]));
        let mut cursor = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(canvas)
            .write_to(&mut cursor, image::ImageFormat::Jpeg)
            .expect("encode sample jpeg");
        cursor.into_inner()
    }

    fn upload_request(
        image: Option<&[u8]>,
        instruction: Option<&str>,
        filter_settings: Option<&str>,
    ) -> Request<Body> {
        let mut body: Vec<u8> = Vec::new();
        if let Some(image) = image {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; \
                     filename=\"source.jpg\"\r\nContent-Type: image/jpeg\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(image);
            body.extend_from_slice(b"\r\n");
        }
        if let Some(instruction) = instruction {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; \
                     name=\"instruction\"\r\n\r\n{instruction}\r\n"
                )
                .as_bytes(),
            );
        }
        if let Some(settings) = filter_settings {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; \
                     name=\"filterSettings\"\r\n\r\n{settings}\r\n"
                )
                .as_bytes(),
            );
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri("/api/process-image")
            .header(
                CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .expect("build upload request")
    }

    async fn read_json(response: axum::response::Response) -> Value {
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes();
        serde_json::from_slice(&bytes).expect("body is JSON")
    }

    #[tokio::test]
    async fn missing_instruction_is_a_bad_request() {
        let dir = tempfile::tempdir().expect("tempdir");
        let app = create_router().with_state(test_state("http://127.0.0.1:9", dir.path()));

        let response = app
            .oneshot(upload_request(Some(&sample_jpeg(4, 4)), None, None))
            .await
            .expect("send request");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = read_json(response).await;
        assert_eq!(body["error"], MISSING_FIELDS);
    }

    #[tokio::test]
    async fn missing_image_is_a_bad_request() {
        let dir = tempfile::tempdir().expect("tempdir");
        let app = create_router().with_state(test_state("http://127.0.0.1:9", dir.path()));

        let response = app
            .oneshot(upload_request(None, Some("make it pop"), None))
            .await
            .expect("send request");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = read_json(response).await;
        assert!(body["error"].as_str().expect("error string").contains("required"));
    }

    #[tokio::test]
    async fn undecodable_image_is_a_bad_request() {
        let dir = tempfile::tempdir().expect("tempdir");
        let app = create_router().with_state(test_state("http://127.0.0.1:9", dir.path()));

        let response = app
            .oneshot(upload_request(
                Some(b"not an image at all"),
                Some("make it pop"),
                None,
            ))
            .await
            .expect("send request");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn invalid_filter_settings_are_a_bad_request() {
        let dir = tempfile::tempdir().expect("tempdir");
        let app = create_router().with_state(test_state("http://127.0.0.1:9", dir.path()));

        let response = app
            .oneshot(upload_request(
                Some(&sample_jpeg(4, 4)),
                Some("make it pop"),
                Some("definitely not json"),
            ))
            .await
            .expect("send request");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn end_to_end_upload_renders_stores_and_serves() {
        let gemini_base = stub_gemini().await;
        let dir = tempfile::tempdir().expect("tempdir");
        let state = test_state(&gemini_base, dir.path());
        let app = create_router().with_state(state);

        let response = app
            .clone()
            .oneshot(upload_request(
                Some(&sample_jpeg(1280, 720)),
                Some("add title HELLO"),
                Some(r#"{"contrast": true, "brightness": true, "saturation": true, "addEmoji": false}"#),
            ))
            .await
            .expect("send request");

        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        assert_eq!(body["metadata"]["width"], 1280);
        assert_eq!(body["metadata"]["height"], 720);
        assert_eq!(body["metadata"]["format"], "jpeg");
        assert!(body["metadata"]["size"].as_u64().expect("size") > 0);

        let url = body["thumbnailUrl"].as_str().expect("thumbnail url");
        assert!(url.starts_with("http://thumbs.test/processed/thumbnail-"));

        let filename = url.rsplit('/').next().expect("url filename");
        let request = Request::builder()
            .method("GET")
            .uri(format!("/processed/{filename}"))
            .body(Body::empty())
            .expect("build request");
        let response = app.clone().oneshot(request).await.expect("serve thumbnail");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get(CONTENT_TYPE)
                .expect("content type header"),
            "image/jpeg"
        );
        let etag = response
            .headers()
            .get(axum::http::header::ETAG)
            .expect("etag header")
            .clone();

        let request = Request::builder()
            .method("GET")
            .uri(format!("/processed/{filename}"))
            .header(IF_NONE_MATCH, etag)
            .body(Body::empty())
            .expect("build conditional request");
        let response = app
            .oneshot(request)
            .await
            .expect("conditional request");
        assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
    }

    #[tokio::test]
    async fn repeated_uploads_report_identical_metadata() {
        let gemini_base = stub_gemini().await;
        let dir = tempfile::tempdir().expect("tempdir");
        let app = create_router().with_state(test_state(&gemini_base, dir.path()));

        let image = sample_jpeg(1280, 720);
        let mut seen = Vec::new();
        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(upload_request(Some(&image), Some("add title HELLO"), None))
                .await
                .expect("send request");
            assert_eq!(response.status(), StatusCode::OK);
            let body = read_json(response).await;
            seen.push((
                body["metadata"]["width"].clone(),
                body["metadata"]["height"].clone(),
                body["metadata"]["format"].clone(),
            ));
        }
        assert_eq!(seen[0], seen[1]);
    }

    #[tokio::test]
    async fn unknown_processed_files_are_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let app = create_router().with_state(test_state("http://127.0.0.1:9", dir.path()));

        let request = Request::builder()
            .method("GET")
            .uri("/processed/thumbnail-nope.jpg")
            .body(Body::empty())
            .expect("build request");
        let response = app.oneshot(request).await.expect("send request");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn traversal_processed_names_are_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let app = create_router().with_state(test_state("http://127.0.0.1:9", dir.path()));

        let request = Request::builder()
            .method("GET")
            .uri("/processed/..%2Fsecrets.txt")
            .body(Body::empty())
            .expect("build request");
        let response = app.oneshot(request).await.expect("send request");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn index_page_renders_the_upload_form() {
        let dir = tempfile::tempdir().expect("tempdir");
        let app = create_router().with_state(test_state("http://127.0.0.1:9", dir.path()));

        let request = Request::builder()
            .method("GET")
            .uri("/")
            .body(Body::empty())
            .expect("build request");
        let response = app.oneshot(request).await.expect("send request");

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes();
        let body = String::from_utf8_lossy(&bytes);
        assert!(body.contains("Smart Thumbnail Maker"));
        assert!(body.contains("/api/process-image"));
    }
}
