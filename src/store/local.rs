//! Local-disk storage, served back through the `/processed/` route.

use std::path::PathBuf;

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use super::StoredImage;
use crate::error::ThumbsmithError;
use crate::render::EncodedThumbnail;

/// Writes thumbnails under the output directory with unique names.
#[derive(Clone, Debug)]
pub struct LocalStore {
    output_dir: PathBuf,
    public_base: String,
}

impl LocalStore {
    /// Builds a store rooted at `output_dir`; URLs are issued under
    /// `public_base`.
    pub fn new(output_dir: PathBuf, public_base: &str) -> Self {
        Self {
            output_dir,
            public_base: public_base.trim_end_matches('/').to_string(),
        }
    }

    pub(crate) async fn put(
        &self,
        thumbnail: &EncodedThumbnail,
    ) -> Result<StoredImage, ThumbsmithError> {
        let filename = format!(
            "thumbnail-{}-{}.{}",
            Utc::now().timestamp_millis(),
            Uuid::new_v4(),
            thumbnail.format.extension()
        );

        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|err| ThumbsmithError::Upload(err.to_string()))?;
        let path = self.output_dir.join(&filename);
        tokio::fs::write(&path, &thumbnail.bytes)
            .await
            .map_err(|err| ThumbsmithError::Upload(err.to_string()))?;
        debug!("Stored thumbnail at {}", path.display());

        Ok(StoredImage {
            url: format!("{}/processed/{}", self.public_base, filename),
        })
    }
}
