//! Serving locally stored thumbnails. Filenames carry a timestamp and a
//! UUID, so a response can be cached forever and the name doubles as a
//! strong ETag.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE, ETAG, IF_NONE_MATCH, LAST_MODIFIED};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::Response;
use httpdate::fmt_http_date;

use super::AppState;
use crate::constants::THUMBNAIL_CACHE_CONTROL;
use crate::error::ThumbsmithError;

pub(crate) async fn processed_image_handler(
    State(state): State<AppState>,
    Path(filename): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ThumbsmithError> {
    if !is_safe_filename(&filename) {
        return Err(ThumbsmithError::BadRequest(
            "invalid thumbnail name".to_string(),
        ));
    }

    let path = state.output_dir.join(&filename);
    let metadata = match tokio::fs::metadata(&path).await {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(ThumbsmithError::NotFound(filename));
        }
        Err(err) => return Err(err.into()),
    };

    let etag = etag_for(&filename);
    if is_not_modified(&headers, &etag) {
        let builder = Response::builder()
            .status(StatusCode::NOT_MODIFIED)
            .header(CACHE_CONTROL, THUMBNAIL_CACHE_CONTROL.as_str())
            .header(ETAG, etag);
        return builder.body(Body::empty()).map_err(ThumbsmithError::from);
    }

    let bytes = tokio::fs::read(&path).await?;

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, content_type_for(&filename))
        .header(CACHE_CONTROL, THUMBNAIL_CACHE_CONTROL.as_str())
        .header(ETAG, etag);
    if let Ok(modified) = metadata.modified()
        && let Ok(value) = HeaderValue::from_str(&fmt_http_date(modified))
    {
        builder = builder.header(LAST_MODIFIED, value);
    }
    builder.body(Body::from(bytes)).map_err(ThumbsmithError::from)
}

/// Rejects anything that could escape the output directory.
fn is_safe_filename(filename: &str) -> bool {
    !filename.is_empty()
        && !filename.contains("..")
        && filename
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

fn etag_for(filename: &str) -> String {
    format!("\"{filename}\"")
}

/// Returns true when the request's `If-None-Match` covers our ETag.
fn is_not_modified(headers: &HeaderMap, etag: &str) -> bool {
    let Some(if_none_match) = headers.get(IF_NONE_MATCH) else {
        return false;
    };
    let Ok(value) = if_none_match.to_str() else {
        return false;
    };
    let value = value.trim();
    value == "*"
        || value
            .split(',')
            .any(|candidate| candidate.trim() == etag)
}

fn content_type_for(filename: &str) -> &'static str {
    if filename.ends_with(".png") {
        "image/png"
    } else if filename.ends_with(".jpg") || filename.ends_with(".jpeg") {
        "image/jpeg"
    } else {
        "application/octet-stream"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn traversal_names_are_rejected() {
        assert!(!is_safe_filename("../etc/passwd"));
        assert!(!is_safe_filename("a/b.jpg"));
        assert!(!is_safe_filename(""));
        assert!(is_safe_filename("thumbnail-1700000000000-abc-def.jpg"));
    }

    #[test]
    fn if_none_match_comparison_handles_lists_and_wildcards() {
        let etag = etag_for("thumb.jpg");

        let mut headers = HeaderMap::new();
        assert!(!is_not_modified(&headers, &etag));

        headers.insert(IF_NONE_MATCH, HeaderValue::from_static("*"));
        assert!(is_not_modified(&headers, &etag));

        headers.insert(
            IF_NONE_MATCH,
            HeaderValue::from_str(&format!("\"other.jpg\", {etag}")).expect("header value"),
        );
        assert!(is_not_modified(&headers, &etag));

        headers.insert(IF_NONE_MATCH, HeaderValue::from_static("\"other.jpg\""));
        assert!(!is_not_modified(&headers, &etag));
    }

    #[test]
    fn content_types_follow_the_extension() {
        assert_eq!(content_type_for("a.jpg"), "image/jpeg");
        assert_eq!(content_type_for("a.jpeg"), "image/jpeg");
        assert_eq!(content_type_for("a.png"), "image/png");
        assert_eq!(content_type_for("a.bin"), "application/octet-stream");
    }
}
