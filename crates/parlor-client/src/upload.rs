//! Image upload collaborators.
//!
//! An [`Uploader`] turns raw image bytes into a durable reference string that
//! is stored on a message, group or profile. Sends await the upload before
//! writing anything, so a failed upload never leaves a half-written message.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use tokio::fs;
use tracing::{debug, info};

use crate::error::UploadError;

/// Prefix of references produced by [`BlobDirUploader`].
pub const BLOB_REF_PREFIX: &str = "blob:";

/// A picked image, ready to upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBlob {
    pub bytes: Bytes,
    pub mime: String,
    pub file_name: Option<String>,
}

impl ImageBlob {
    pub fn new(bytes: impl Into<Bytes>, mime: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            mime: mime.into(),
            file_name: None,
        }
    }

    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[async_trait]
pub trait Uploader: Send + Sync {
    /// Store `image` and return the reference to persist.
    async fn upload(&self, image: ImageBlob) -> Result<String, UploadError>;
}

fn check_size(image: &ImageBlob, max: usize) -> Result<(), UploadError> {
    if image.is_empty() {
        return Err(UploadError::Empty);
    }
    if image.len() > max {
        return Err(UploadError::TooLarge {
            size: image.len(),
            max,
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Content-addressed directory
// ---------------------------------------------------------------------------

/// Writes each image to `<dir>/<blake3 hex>`. Identical images share a file.
#[derive(Debug, Clone)]
pub struct BlobDirUploader {
    base_path: PathBuf,
    max_size: usize,
}

impl BlobDirUploader {
    pub async fn new(base_path: PathBuf, max_size: usize) -> Result<Self, UploadError> {
        fs::create_dir_all(&base_path).await?;

        info!(path = %base_path.display(), "Blob directory initialized");

        Ok(Self {
            base_path,
            max_size,
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Local file behind a `blob:` reference, if it is one of ours.
    pub fn path_for(&self, reference: &str) -> Option<PathBuf> {
        let hash = reference.strip_prefix(BLOB_REF_PREFIX)?;
        if hash.len() != 64 || !hash.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        Some(self.base_path.join(hash))
    }

    pub async fn read(&self, reference: &str) -> Result<Bytes, UploadError> {
        let path = self.path_for(reference).ok_or_else(|| {
            UploadError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("not a blob reference: {reference}"),
            ))
        })?;
        Ok(Bytes::from(fs::read(&path).await?))
    }
}

#[async_trait]
impl Uploader for BlobDirUploader {
    async fn upload(&self, image: ImageBlob) -> Result<String, UploadError> {
        check_size(&image, self.max_size)?;

        let hash = blake3::hash(&image.bytes).to_hex();
        let path = self.base_path.join(hash.as_str());

        if fs::try_exists(&path).await? {
            debug!(hash = %hash, "Blob already stored");
        } else {
            fs::write(&path, &image.bytes).await?;
            debug!(hash = %hash, size = image.len(), mime = %image.mime, "Stored blob");
        }

        Ok(format!("{BLOB_REF_PREFIX}{hash}"))
    }
}

// ---------------------------------------------------------------------------
// Inline data URLs
// ---------------------------------------------------------------------------

/// Encodes the image itself into the reference. Needs no storage at all, at
/// the cost of bloating every document that carries it.
#[derive(Debug, Clone)]
pub struct DataUrlUploader {
    max_size: usize,
}

impl DataUrlUploader {
    pub fn new(max_size: usize) -> Self {
        Self { max_size }
    }
}

#[async_trait]
impl Uploader for DataUrlUploader {
    async fn upload(&self, image: ImageBlob) -> Result<String, UploadError> {
        check_size(&image, self.max_size)?;
        debug!(size = image.len(), mime = %image.mime, "Encoding data URL");
        Ok(format!(
            "data:{};base64,{}",
            image.mime,
            STANDARD.encode(&image.bytes)
        ))
    }
}
