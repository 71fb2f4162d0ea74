//! Object-storage client used for payment proofs, shipping bills and product images.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Bytes;
use reqwest::{
    header::{AUTHORIZATION, HeaderMap, HeaderValue},
    multipart::{Form, Part},
};
use secrecy::ExposeSecret;
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use crate::config::StorageConfig;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object storage is not configured")]
    Disabled,

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upload rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("invalid upload: {0}")]
    Invalid(String),
}

/// A file received from a multipart form.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

impl UploadedFile {
    pub fn is_image(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.starts_with("image/"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub url: String,
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn upload(&self, folder: &str, file: UploadedFile) -> Result<StoredObject, StorageError>;
}

pub fn from_config(config: Option<&StorageConfig>) -> anyhow::Result<Arc<dyn ObjectStorage>> {
    match config {
        Some(config) => Ok(Arc::new(HttpObjectStorage::new(config)?)),
        None => {
            tracing::info!("object storage not configured, uploads are disabled");
            Ok(Arc::new(DisabledStorage))
        }
    }
}

/// Uploads through an HTTP endpoint that accepts a multipart `file` and answers
/// with the public URL of the stored (and optionally transformed) image.
#[derive(Clone)]
pub struct HttpObjectStorage {
    client: reqwest::Client,
    upload_url: String,
    transformation: Option<String>,
}

#[derive(Deserialize)]
struct UploadResponse {
    #[serde(alias = "url")]
    secure_url: String,
}

impl HttpObjectStorage {
    pub fn new(config: &StorageConfig) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", config.api_key.expose_secret()))?,
        );
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            upload_url: config.upload_url.clone(),
            transformation: config.transformation.clone(),
        })
    }
}

#[async_trait]
impl ObjectStorage for HttpObjectStorage {
    async fn upload(&self, folder: &str, file: UploadedFile) -> Result<StoredObject, StorageError> {
        if file.bytes.is_empty() {
            return Err(StorageError::Invalid("empty file".into()));
        }

        let mut part = Part::stream(file.bytes).file_name(file.file_name);
        if let Some(content_type) = file.content_type.as_deref() {
            part = part.mime_str(content_type)?;
        }

        let mut form = Form::new()
            .part("file", part)
            .text("folder", folder.to_string())
            .text("public_id", Uuid::new_v4().to_string());
        if let Some(transformation) = &self.transformation {
            form = form.text("transformation", transformation.clone());
        }

        let response = self
            .client
            .post(&self.upload_url)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let uploaded: UploadResponse = response.json().await?;
        tracing::debug!(folder, url = %uploaded.secure_url, "file uploaded");
        Ok(StoredObject {
            url: uploaded.secure_url,
        })
    }
}

pub struct DisabledStorage;

#[async_trait]
impl ObjectStorage for DisabledStorage {
    async fn upload(&self, _folder: &str, _file: UploadedFile) -> Result<StoredObject, StorageError> {
        Err(StorageError::Disabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(content_type: Option<&str>) -> UploadedFile {
        UploadedFile {
            file_name: "proof.png".into(),
            content_type: content_type.map(str::to_string),
            bytes: Bytes::from_static(b"\x89PNG"),
        }
    }

    #[test]
    fn detects_images_by_content_type() {
        assert!(file(Some("image/png")).is_image());
        assert!(!file(Some("application/pdf")).is_image());
        assert!(!file(None).is_image());
    }

    #[tokio::test]
    async fn disabled_storage_refuses_uploads() {
        let err = DisabledStorage
            .upload("payment_proofs", file(Some("image/png")))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Disabled));
    }
}
