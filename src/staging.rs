//! Staged images: remote images copied to a local file for one publish.
//!
//! A [`StagedImage`] owns its file and deletes it when dropped, so the copy
//! is gone after every exit path of an item (published, skipped, or failed).
//! An [`ImageArchive`] keeps a permanent copy elsewhere before publishing.

use crate::error::StageError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

/// Exclusive handle on a temporary image file.
#[derive(Debug)]
pub struct StagedImage {
    path: PathBuf,
}

impl StagedImage {
    /// Take ownership of `path`; whatever is there is removed on drop.
    pub fn claim(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the file now.
    pub fn release(self) {}
}

impl Drop for StagedImage {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed staged image"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Error cleaning up staged image"),
        }
    }
}

/// File name for an item's staged image; anything outside `[A-Za-z0-9_-]`
/// in the id becomes `_`.
pub fn staged_file_name(item_id: &str) -> String {
    let safe: String = item_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("{safe}.jpg")
}

#[async_trait]
pub trait ImageStager: Send + Sync {
    async fn stage(&self, image_url: &str, item_id: &str) -> Result<StagedImage, StageError>;
}

/// Streams images over HTTP into a staging directory.
pub struct HttpImageStager {
    http: reqwest::Client,
    dir: PathBuf,
}

impl HttpImageStager {
    pub fn new(http: reqwest::Client, dir: impl Into<PathBuf>) -> Self {
        Self {
            http,
            dir: dir.into(),
        }
    }
}

#[async_trait]
impl ImageStager for HttpImageStager {
    #[instrument(level = "info", skip(self), fields(dir = %self.dir.display()))]
    async fn stage(&self, image_url: &str, item_id: &str) -> Result<StagedImage, StageError> {
        let mut resp = self.http.get(image_url).send().await?;
        if !resp.status().is_success() {
            warn!(status = %resp.status(), "Image download failed");
            return Err(StageError::Status(resp.status().as_u16()));
        }

        let staged = StagedImage::claim(self.dir.join(staged_file_name(item_id)));
        let mut file = tokio::fs::File::create(staged.path()).await?;
        let mut bytes = 0usize;
        while let Some(chunk) = resp.chunk().await? {
            file.write_all(&chunk).await?;
            bytes += chunk.len();
        }
        file.flush().await?;

        info!(bytes, path = %staged.path().display(), "Staged image");
        Ok(staged)
    }
}

/// Long-term storage for staged images, keyed by [`staged_file_name`].
#[async_trait]
pub trait ImageArchive: Send + Sync {
    async fn archive(&self, image: &StagedImage, item_id: &str) -> Result<(), StageError>;

    fn describe(&self) -> String;
}

/// Archive into an S3 bucket, one object per item.
#[cfg(feature = "aws")]
pub struct S3ImageArchive {
    client: aws_sdk_s3::Client,
    bucket: String,
}

#[cfg(feature = "aws")]
impl S3ImageArchive {
    pub fn new(client: aws_sdk_s3::Client, bucket: String) -> Self {
        Self { client, bucket }
    }
}

#[cfg(feature = "aws")]
#[async_trait]
impl ImageArchive for S3ImageArchive {
    #[instrument(level = "info", skip_all, fields(bucket = %self.bucket, %item_id))]
    async fn archive(&self, image: &StagedImage, item_id: &str) -> Result<(), StageError> {
        let body = aws_sdk_s3::primitives::ByteStream::from_path(image.path())
            .await
            .map_err(|e| StageError::Archive(e.to_string()))?;
        let key = staged_file_name(item_id);
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(body)
            .send()
            .await
            .map_err(|e| StageError::Archive(e.into_service_error().to_string()))?;
        info!(%key, "Archived image");
        Ok(())
    }

    fn describe(&self) -> String {
        format!("s3://{}", self.bucket)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::testing::{direct_client, serve};
    use std::sync::{Arc, Mutex};

    /// Archive that keeps `(key, bytes)` pairs, or refuses everything.
    #[derive(Clone, Default)]
    pub struct RecordingArchive {
        pub stored: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
        pub fail: bool,
    }

    #[async_trait]
    impl ImageArchive for RecordingArchive {
        async fn archive(&self, image: &StagedImage, item_id: &str) -> Result<(), StageError> {
            if self.fail {
                return Err(StageError::Archive("bucket unavailable".to_string()));
            }
            let bytes = std::fs::read(image.path())?;
            self.stored
                .lock()
                .unwrap()
                .push((staged_file_name(item_id), bytes));
            Ok(())
        }

        fn describe(&self) -> String {
            "recording".to_string()
        }
    }

    #[test]
    fn test_drop_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.jpg");
        std::fs::write(&path, b"img").unwrap();

        let staged = StagedImage::claim(path.clone());
        assert!(staged.path().exists());
        staged.release();
        assert!(!path.exists());
    }

    #[test]
    fn test_drop_tolerates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        drop(StagedImage::claim(dir.path().join("never-written.jpg")));
    }

    #[test]
    fn test_staged_file_name_is_sanitized() {
        assert_eq!(staged_file_name("abc-123_x"), "abc-123_x.jpg");
        assert_eq!(staged_file_name("../etc/passwd"), "___etc_passwd.jpg");
    }

    #[tokio::test]
    async fn test_stage_writes_image() {
        let base = serve(vec![("/a.jpg", 200, b"jpegbytes".to_vec())]).await;
        let dir = tempfile::tempdir().unwrap();
        let stager = HttpImageStager::new(direct_client(), dir.path());

        let staged = stager.stage(&format!("{base}/a.jpg"), "item-1").await.unwrap();
        assert_eq!(staged.path(), dir.path().join("item-1.jpg"));
        assert_eq!(std::fs::read(staged.path()).unwrap(), b"jpegbytes");

        let path = staged.path().to_path_buf();
        drop(staged);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_stage_non_success_leaves_nothing() {
        let base = serve(vec![]).await;
        let dir = tempfile::tempdir().unwrap();
        let stager = HttpImageStager::new(direct_client(), dir.path());

        let err = stager.stage(&format!("{base}/missing.jpg"), "item-2").await.unwrap_err();
        assert!(matches!(err, StageError::Status(404)));
        assert!(!dir.path().join("item-2.jpg").exists());
    }
}
