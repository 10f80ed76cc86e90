//! On-disk storage for feature attachments.
//!
//! Files are stored flat under one directory as `<uuid>.<ext>` and served
//! back under `/uploads/<filename>`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use uuid::Uuid;

pub const UPLOAD_ROUTE: &str = "/uploads";

#[derive(Debug, Clone)]
pub struct StoredUpload {
    pub filename: String,
    pub url: String,
    pub size: i64,
}

#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
}

impl UploadStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn ensure_dir(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create upload directory {}", self.dir.display()))
    }

    /// Writes `bytes` under a fresh generated name. The original file name
    /// only contributes its extension.
    pub async fn save(&self, original_name: &str, bytes: &[u8]) -> Result<StoredUpload> {
        self.ensure_dir().await?;
        let filename = match extension(original_name) {
            Some(ext) => format!("{}.{}", Uuid::new_v4(), ext),
            None => Uuid::new_v4().to_string(),
        };
        tokio::fs::write(self.dir.join(&filename), bytes)
            .await
            .with_context(|| format!("Failed to store upload {}", filename))?;

        tracing::debug!(filename = %filename, size = bytes.len(), "stored upload");
        Ok(StoredUpload {
            url: format!("{}/{}", UPLOAD_ROUTE, filename),
            size: bytes.len() as i64,
            filename,
        })
    }

    /// Deletes a stored file. Failures are logged and otherwise ignored.
    pub async fn remove(&self, filename: &str) {
        if Path::new(filename).file_name().and_then(|n| n.to_str()) != Some(filename) {
            tracing::warn!(filename, "refusing to remove upload outside the upload directory");
            return;
        }
        match tokio::fs::remove_file(self.dir.join(filename)).await {
            Ok(()) => tracing::debug!(filename, "removed upload"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => tracing::warn!(filename, error = %err, "failed to remove upload"),
        }
    }
}

fn extension(original_name: &str) -> Option<String> {
    let ext = Path::new(original_name).extension()?.to_str()?;
    if ext.is_empty() || ext.len() > 16 || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}
