//! Nameplate photo storage
//!
//! After a scan the uploaded photo is archived next to the inventory entry,
//! either through the photo service or into a local directory.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::capture::extension_for_mime;
use crate::vision::PreparedImage;

/// Where a photo ended up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredPhoto {
    /// Link or path to the stored file
    pub location: String,
    pub file_id: String,
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("photo service request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("photo service returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("unexpected photo service response: {0}")]
    Malformed(String),

    #[error("photo write failed: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait PhotoStore: Send + Sync {
    async fn store(
        &self,
        photo: &PreparedImage,
        installation_id: &str,
        serial: Option<&str>,
    ) -> Result<StoredPhoto, StorageError>;
}

#[derive(Debug, Deserialize)]
struct SaveResponse {
    drive_link: Option<String>,
    file_id: Option<String>,
}

/// Uploads photos to the `integrations/ocr-save` endpoint of the photo service
pub struct HttpPhotoStore {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpPhotoStore {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, StorageError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/integrations/ocr-save", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl PhotoStore for HttpPhotoStore {
    async fn store(
        &self,
        photo: &PreparedImage,
        installation_id: &str,
        serial: Option<&str>,
    ) -> Result<StoredPhoto, StorageError> {
        let file_name = format!("nameplate.{}", extension_for_mime(&photo.mime));
        let part = Part::bytes(photo.data.clone())
            .file_name(file_name)
            .mime_str(&photo.mime)?;

        let form = Form::new()
            .part("file", part)
            .text("installation_id", installation_id.to_string())
            .text("serial_number", serial.unwrap_or_default().to_string());

        let response = self.client.post(&self.endpoint).multipart(form).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(StorageError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let body: SaveResponse = response
            .json()
            .await
            .map_err(|e| StorageError::Malformed(e.to_string()))?;

        match (body.drive_link, body.file_id) {
            (Some(location), Some(file_id)) => {
                info!("Stored nameplate photo {} at {}", file_id, location);
                Ok(StoredPhoto { location, file_id })
            }
            _ => Err(StorageError::Malformed("missing drive_link or file_id".into())),
        }
    }
}

/// Writes photos into a local directory, one subdirectory per installation.
///
/// Files are named by the SHA-256 of their bytes, so storing the same photo
/// twice yields the same id and a single file.
pub struct LocalPhotoStore {
    root: PathBuf,
}

impl LocalPhotoStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl PhotoStore for LocalPhotoStore {
    async fn store(
        &self,
        photo: &PreparedImage,
        installation_id: &str,
        serial: Option<&str>,
    ) -> Result<StoredPhoto, StorageError> {
        let mut hasher = Sha256::new();
        hasher.update(&photo.data);
        let file_id = format!("{:x}", hasher.finalize());

        let dir = self.root.join(sanitize(installation_id));
        tokio::fs::create_dir_all(&dir).await?;

        let path = dir.join(format!("{}.{}", file_id, extension_for_mime(&photo.mime)));
        if tokio::fs::try_exists(&path).await? {
            debug!("Photo {} already stored", file_id);
        } else {
            tokio::fs::write(&path, &photo.data).await?;
            info!(serial = serial.unwrap_or("-"), "Stored nameplate photo at {:?}", path);
        }

        Ok(StoredPhoto {
            location: path.to_string_lossy().into_owned(),
            file_id,
        })
    }
}

/// Keep installation ids usable as a single path component
fn sanitize(id: &str) -> String {
    let cleaned: String = id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "unassigned".to_string()
    } else {
        cleaned
    }
}
